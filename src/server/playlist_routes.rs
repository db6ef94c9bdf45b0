//! Playlist import workflow.
//!
//! Two steps: fetch the playlist's video list, then a save/skip decision
//! per video. The fetched list travels in the response and comes back with
//! each decision, so there is no server-side workflow state and no cached
//! API key.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::{NewLecture, StoreError};
use crate::youtube::{start_playlist_import, YoutubeClient};

#[derive(Deserialize, Debug)]
struct FetchBody {
    api_key: String,
    playlist_url: String,
}

async fn fetch_playlist(
    State(_store): State<GuardedCatalogStore>,
    Json(body): Json<FetchBody>,
) -> Response {
    let client = YoutubeClient::new(&body.api_key);
    match start_playlist_import(&client, &body.playlist_url).await {
        Ok(import_state) => Json(import_state).into_response(),
        Err(err) => super::external_error_response(err),
    }
}

#[derive(Deserialize, Debug)]
struct SaveVideoBody {
    video: IncomingVideo,
    rank_id: Option<i64>,
    topic_id: Option<i64>,
    #[serde(default)]
    tag_ids: Vec<i64>,
    collection_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct IncomingVideo {
    video_id: String,
    title: String,
    thumbnail_url: Option<String>,
    published_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    duration_seconds: i64,
}

#[derive(Serialize)]
struct SaveVideoResponse {
    created: bool,
    lecture_id: i64,
}

/// Save one playlist video as a lecture. A video that already exists (by
/// YouTube ID) is left untouched and reported back, mirroring the
/// importer's natural-key dedup.
async fn save_video(
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<SaveVideoBody>,
) -> Result<impl IntoResponse, StoreError> {
    if let Some(existing) = store.get_lecture_by_youtube_id(&body.video.video_id)? {
        return Ok(Json(SaveVideoResponse {
            created: false,
            lecture_id: existing.id,
        }));
    }

    let lecture = store.create_lecture(&NewLecture {
        title: body.video.title.clone(),
        youtube_id: body.video.video_id.clone(),
        thumbnail_url: body.video.thumbnail_url.clone(),
        publish_date: body.video.published_at,
        duration_seconds: Some(body.video.duration_seconds),
        rank_id: body.rank_id,
    })?;

    if let Some(topic_id) = body.topic_id {
        store.set_lecture_topics(lecture.id, &[topic_id])?;
    }
    if !body.tag_ids.is_empty() {
        store.set_lecture_tags(lecture.id, &body.tag_ids)?;
    }
    if let Some(collection_id) = body.collection_id {
        store.append_to_collection(collection_id, &[lecture.id], None)?;
    }

    Ok(Json(SaveVideoResponse {
        created: true,
        lecture_id: lecture.id,
    }))
}

pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/playlist-import/fetch", post(fetch_playlist))
        .route("/playlist-import/save", post(save_video))
        .with_state(state)
}