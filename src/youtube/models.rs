//! Typed models for the YouTube Data API responses we consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One video as surfaced to the rest of the system.
#[derive(Clone, Debug, Serialize)]
pub struct PlaylistVideo {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

// =============================================================================
// Wire types (youtube.googleapis.com)
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistItemsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistItem {
    pub snippet: Snippet,
    #[serde(rename = "contentDetails")]
    pub content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Deserialize)]
pub(super) struct PlaylistItemContentDetails {
    #[serde(rename = "videoId")]
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct Snippet {
    pub title: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub default: Option<Thumbnail>,
}

impl Thumbnails {
    /// Highest-quality thumbnail available, matching the original
    /// preference order.
    pub fn best_url(&self) -> Option<String> {
        [&self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .next()
            .map(|thumbnail| thumbnail.url.clone())
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideoItem {
    pub id: String,
    pub snippet: Option<Snippet>,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideoContentDetails {
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiError {
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl ApiError {
    pub fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{} ({})", message, code),
            (_, Some(message)) => message.clone(),
            (Some(code), None) => format!("error code {}", code),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_playlist_items_page() {
        let json = r#"{
            "items": [{
                "snippet": {
                    "title": "Opening principles",
                    "publishedAt": "2023-06-01T10:00:00Z",
                    "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/abc/hq.jpg"}}
                },
                "contentDetails": {"videoId": "abc123def45"}
            }],
            "nextPageToken": "CAUQAA"
        }"#;
        let page: PlaylistItemsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].content_details.video_id, "abc123def45");
        assert_eq!(page.next_page_token.as_deref(), Some("CAUQAA"));
        assert!(page.error.is_none());
    }

    #[test]
    fn parses_error_payload() {
        let json = r#"{"error": {"code": 403, "message": "quotaExceeded"}}"#;
        let page: PlaylistItemsResponse = serde_json::from_str(json).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.error.unwrap().describe(), "quotaExceeded (403)");
    }

    #[test]
    fn thumbnail_preference_order() {
        let thumbnails = Thumbnails {
            high: None,
            medium: Some(Thumbnail {
                url: "medium".to_string(),
            }),
            default: Some(Thumbnail {
                url: "default".to_string(),
            }),
        };
        assert_eq!(thumbnails.best_url().as_deref(), Some("medium"));
    }
}
