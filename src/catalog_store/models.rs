//! Catalog entity models.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Lookup entities
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Player rank a lecture is aimed at (e.g. "30k-20k", "5k-1k", "dan").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rank {
    pub id: i64,
    pub name: String,
}

/// The three named lookup kinds share their storage shape; store internals
/// dispatch on this instead of repeating per-table code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupKind {
    Topic,
    Tag,
    Rank,
}

impl LookupKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            LookupKind::Topic => "topics",
            LookupKind::Tag => "tags",
            LookupKind::Rank => "ranks",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            LookupKind::Topic => "topic",
            LookupKind::Tag => "tag",
            LookupKind::Rank => "rank",
        }
    }
}

// =============================================================================
// Core entities
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lecture {
    pub id: i64,
    pub title: String,
    pub youtube_id: String,
    pub thumbnail_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub rank_id: Option<i64>,
}

/// Field set for creating or fully updating a lecture.
#[derive(Clone, Debug, Deserialize)]
pub struct NewLecture {
    pub title: String,
    pub youtube_id: String,
    pub thumbnail_url: Option<String>,
    pub publish_date: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub rank_id: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_gated: bool,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped on every position mutation.
    pub revision: i64,
}

// =============================================================================
// Resolved/composite types (API responses)
// =============================================================================

/// Lecture with its relationships resolved to full records.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedLecture {
    pub lecture: Lecture,
    pub topics: Vec<Topic>,
    pub tags: Vec<Tag>,
    pub rank: Option<Rank>,
}

/// One positioned membership row, resolved.
#[derive(Clone, Debug, Serialize)]
pub struct CollectionEntry {
    pub position: i64,
    pub lecture: ResolvedLecture,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolvedCollection {
    pub collection: Collection,
    pub entries: Vec<CollectionEntry>,
    pub total_duration_seconds: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    Unchanged,
}

// =============================================================================
// Search
// =============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub topic_ids: Vec<i64>,
    pub tag_ids: Vec<i64>,
    pub rank_id: Option<i64>,
    /// When false, lectures appearing in gated collections are excluded.
    pub include_gated: bool,
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            query: None,
            topic_ids: Vec::new(),
            tag_ids: Vec::new(),
            rank_id: None,
            include_gated: true,
            page: 1,
            per_page: 9,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchPage {
    pub lectures: Vec<ResolvedLecture>,
    pub total: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub has_next: bool,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CatalogCounts {
    pub lectures: usize,
    pub topics: usize,
    pub tags: usize,
    pub ranks: usize,
    pub collections: usize,
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a stored or imported timestamp. Accepts RFC 3339 and the naive
/// ISO-8601 form older exports carry (no timezone suffix).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc3339_timestamp() {
        let dt = parse_timestamp("2023-05-15T10:30:00+00:00").unwrap();
        assert_eq!(format_timestamp(&dt), "2023-05-15T10:30:00+00:00");
    }

    #[test]
    fn parse_naive_timestamp() {
        // Older exports serialize without a timezone suffix
        let dt = parse_timestamp("2023-05-15T10:30:00.123456").unwrap();
        assert_eq!(dt.timezone(), Utc);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("not a date").is_err());
    }

    #[test]
    fn timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(now, parsed);
    }
}
