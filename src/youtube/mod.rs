//! YouTube Data API integration.
//!
//! The catalog treats YouTube as a black-box metadata source: given a
//! video or playlist identifier it returns titles, thumbnails, publish
//! timestamps and ISO-8601 durations. Fetches are synchronous per request,
//! unretried, and a failure mid-pagination discards everything fetched in
//! that call.

mod client;
mod duration;
mod models;
mod url;

pub use client::YoutubeClient;
pub use duration::parse_duration_seconds;
pub use models::PlaylistVideo;
pub use url::{extract_playlist_id, extract_video_id};

use anyhow::{anyhow, Result};
use serde::Serialize;

/// Workflow state for a playlist import: the fetched video list travels
/// with the playlist identifier between the fetch step and the per-video
/// save/skip decisions, instead of living in ambient server state.
#[derive(Clone, Debug, Serialize)]
pub struct PlaylistImportState {
    pub playlist_id: String,
    pub videos: Vec<PlaylistVideo>,
}

pub async fn start_playlist_import(
    client: &YoutubeClient,
    playlist_url: &str,
) -> Result<PlaylistImportState> {
    let playlist_id = extract_playlist_id(playlist_url)
        .ok_or_else(|| anyhow!("Invalid YouTube playlist URL: {}", playlist_url))?;
    let videos = client.fetch_playlist_videos(&playlist_id).await?;
    Ok(PlaylistImportState {
        playlist_id,
        videos,
    })
}

/// Video info derivable without an API call: canonical thumbnail URL and
/// the current time as the publish date. Used when editing a lecture's
/// video URL with no API key at hand.
pub fn offline_video_info(video_id: &str) -> PlaylistVideo {
    PlaylistVideo {
        video_id: video_id.to_string(),
        title: String::new(),
        thumbnail_url: Some(format!(
            "https://i.ytimg.com/vi/{}/hqdefault.jpg",
            video_id
        )),
        published_at: chrono::Utc::now(),
        duration_seconds: 0,
    }
}
