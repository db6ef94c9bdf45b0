//! Lecture edit and delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;

use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::{NewLecture, StoreError};
use crate::youtube::{extract_video_id, offline_video_info, YoutubeClient};

#[derive(Deserialize, Debug)]
struct LectureUpdateBody {
    title: String,
    youtube_url: String,
    rank_id: Option<i64>,
    #[serde(default)]
    topic_ids: Vec<i64>,
    #[serde(default)]
    tag_ids: Vec<i64>,
    #[serde(default)]
    collection_ids: Vec<i64>,
    /// When present and the video changed, fresh metadata is fetched from
    /// the video platform; otherwise the canonical thumbnail URL and the
    /// current time stand in.
    api_key: Option<String>,
}

async fn get_lecture(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    match store.get_resolved_lecture(id)? {
        Some(resolved) => Ok(Json(resolved).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn update_lecture(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<LectureUpdateBody>,
) -> Result<Response, StoreError> {
    let lecture = store.get_lecture(id)?.ok_or(StoreError::NotFound("lecture"))?;

    let video_id = match extract_video_id(&body.youtube_url) {
        Some(video_id) => video_id,
        None => {
            return Err(StoreError::Validation(format!(
                "not a recognizable YouTube URL: {}",
                body.youtube_url
            )))
        }
    };

    let mut fields = NewLecture {
        title: body.title,
        youtube_id: video_id.clone(),
        thumbnail_url: lecture.thumbnail_url,
        publish_date: lecture.publish_date,
        duration_seconds: lecture.duration_seconds,
        rank_id: body.rank_id,
    };

    // Only refetch video metadata when the URL points at a new video
    if video_id != lecture.youtube_id {
        let info = match &body.api_key {
            Some(api_key) => match YoutubeClient::new(api_key).fetch_video(&video_id).await {
                Ok(info) => info,
                Err(err) => return Ok(super::external_error_response(err)),
            },
            None => offline_video_info(&video_id),
        };
        fields.thumbnail_url = info.thumbnail_url;
        fields.publish_date = info.published_at;
        if info.duration_seconds > 0 {
            fields.duration_seconds = Some(info.duration_seconds);
        }
    }

    store.update_lecture(id, &fields)?;
    store.set_lecture_topics(id, &body.topic_ids)?;
    store.set_lecture_tags(id, &body.tag_ids)?;
    store.set_lecture_collections(id, &body.collection_ids)?;

    let resolved = store
        .get_resolved_lecture(id)?
        .ok_or(StoreError::NotFound("lecture"))?;
    Ok(Json(resolved).into_response())
}

async fn delete_lecture(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    store.delete_lecture(id)?;
    Ok(StatusCode::OK)
}

pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/lectures/{id}", get(get_lecture))
        .route("/lectures/{id}", put(update_lecture))
        .route("/lectures/{id}", delete(delete_lecture))
        .with_state(state)
}
