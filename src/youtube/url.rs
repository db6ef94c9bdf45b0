//! Video and playlist ID extraction from the URL forms YouTube hands out.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(
        r"(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})"
    )
    .unwrap();
    static ref PLAYLIST_ID_RE: Regex = Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").unwrap();
}

/// Extract an 11-character video ID from watch, short, embed, live and
/// shorts URL forms.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
}

pub fn extract_playlist_id(url: &str) -> Option<String> {
    if !url.contains("youtube.com") && !url.contains("youtu.be") {
        return None;
    }
    PLAYLIST_ID_RE
        .captures(url)
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_watch_url_with_extra_params() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?t=10&v=dQw4w9WgXcQ&feature=share"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_short_url() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=30"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_embed_and_shorts_and_live() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/live/dQw4w9WgXcQ?feature=share"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn rejects_unrelated_url() {
        assert_eq!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(extract_video_id("not a url"), None);
    }

    #[test]
    fn extracts_playlist_id() {
        assert_eq!(
            extract_playlist_id(
                "https://www.youtube.com/playlist?list=PLxyzABC123_-def"
            ),
            Some("PLxyzABC123_-def".to_string())
        );
        assert_eq!(
            extract_playlist_id(
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLxyzABC123"
            ),
            Some("PLxyzABC123".to_string())
        );
    }

    #[test]
    fn rejects_playlist_from_other_domains() {
        assert_eq!(
            extract_playlist_id("https://example.com/playlist?list=PLxyzABC123"),
            None
        );
    }
}
