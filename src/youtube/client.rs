//! HTTP client for the YouTube Data API.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

use super::duration::parse_duration_seconds;
use super::models::{
    PlaylistItemsResponse, PlaylistVideo, Snippet, VideosResponse,
};
use crate::catalog_store::parse_timestamp;

const YOUTUBE_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Max IDs the `videos` endpoint accepts in one batch.
const VIDEOS_BATCH_LIMIT: usize = 50;

pub struct YoutubeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl YoutubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, YOUTUBE_API_BASE_URL)
    }

    /// Point the client at a different base URL (tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch every video of a playlist, following the continuation token
    /// until it is absent. Durations come from the `videos` endpoint in
    /// batches. Any failure aborts the whole fetch; partial results are
    /// discarded by the caller receiving an error.
    pub async fn fetch_playlist_videos(&self, playlist_id: &str) -> Result<Vec<PlaylistVideo>> {
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/playlistItems", self.base_url))
                .query(&[
                    ("part", "snippet,contentDetails"),
                    ("maxResults", "50"),
                    ("playlistId", playlist_id),
                    ("key", self.api_key.as_str()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .context("Failed to reach the YouTube API")?;

            let page: PlaylistItemsResponse = response
                .json()
                .await
                .context("Failed to parse playlistItems response")?;
            if let Some(error) = page.error {
                bail!("YouTube API error: {}", error.describe());
            }

            let ids: Vec<String> = page
                .items
                .iter()
                .map(|item| item.content_details.video_id.clone())
                .collect();
            let durations = self.fetch_video_durations(&ids).await?;

            for item in &page.items {
                let video_id = &item.content_details.video_id;
                let duration_seconds = durations.get(video_id).copied().unwrap_or(0);
                videos.push(to_playlist_video(&item.snippet, video_id, duration_seconds)?);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(videos)
    }

    /// Fetch metadata for a single video.
    pub async fn fetch_video(&self, video_id: &str) -> Result<PlaylistVideo> {
        let response = self
            .client
            .get(format!("{}/videos", self.base_url))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach the YouTube API")?;

        let body: VideosResponse = response
            .json()
            .await
            .context("Failed to parse videos response")?;
        if let Some(error) = body.error {
            bail!("YouTube API error: {}", error.describe());
        }

        let item = body
            .items
            .into_iter()
            .next()
            .with_context(|| format!("Video {} not found", video_id))?;
        let snippet = item
            .snippet
            .with_context(|| format!("Video {} has no snippet", video_id))?;
        let duration_seconds = item
            .content_details
            .and_then(|details| details.duration)
            .map(|duration| parse_duration_seconds(&duration))
            .unwrap_or(0);

        to_playlist_video(&snippet, &item.id, duration_seconds)
    }

    /// Batched duration lookup; the `videos` endpoint takes up to 50 IDs
    /// per request.
    async fn fetch_video_durations(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        let mut durations = HashMap::new();

        for batch in ids.chunks(VIDEOS_BATCH_LIMIT) {
            let response = self
                .client
                .get(format!("{}/videos", self.base_url))
                .query(&[
                    ("part", "contentDetails"),
                    ("id", batch.join(",").as_str()),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .await
                .context("Failed to reach the YouTube API")?;

            let body: VideosResponse = response
                .json()
                .await
                .context("Failed to parse videos response")?;
            if let Some(error) = body.error {
                bail!("YouTube API error: {}", error.describe());
            }

            for item in body.items {
                let seconds = item
                    .content_details
                    .and_then(|details| details.duration)
                    .map(|duration| parse_duration_seconds(&duration))
                    .unwrap_or(0);
                durations.insert(item.id, seconds);
            }
        }

        Ok(durations)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn to_playlist_video(
    snippet: &Snippet,
    video_id: &str,
    duration_seconds: i64,
) -> Result<PlaylistVideo> {
    let published_at = parse_timestamp(&snippet.published_at)
        .with_context(|| format!("Video {} has malformed publishedAt", video_id))?;
    Ok(PlaylistVideo {
        video_id: video_id.to_string(),
        title: snippet.title.clone(),
        thumbnail_url: snippet.thumbnails.best_url(),
        published_at,
        duration_seconds,
    })
}
