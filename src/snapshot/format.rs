//! Snapshot wire format.
//!
//! Two historical shapes exist for collection memberships: the current one
//! (`lectures`, a list of `{lecture_id, position}` pairs) and a legacy one
//! (`lecture_ids`, a plain ordered list). Both normalize into one internal
//! representation before the merge logic runs, so the importer never
//! sniffs fields mid-merge.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub topics: Vec<NamedRecord>,
    #[serde(default)]
    pub tags: Vec<NamedRecord>,
    #[serde(default)]
    pub ranks: Vec<NamedRecord>,
    #[serde(default)]
    pub collections: Vec<CollectionRecord>,
    #[serde(default)]
    pub lectures: Vec<LectureRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: i64,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub lecture_id: i64,
    pub position: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Gated-access flag; absent in snapshots from the schema version that
    /// predates it.
    #[serde(default, rename = "is_paid", skip_serializing_if = "Option::is_none")]
    pub is_paid: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lectures: Option<Vec<MembershipRecord>>,
    /// Legacy membership shape; ordering is the array order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lecture_ids: Option<Vec<i64>>,
}

#[derive(Clone, Debug)]
pub enum NormalizedMemberships {
    /// Snapshot-recorded positions, replayed as-is.
    Positioned(Vec<MembershipRecord>),
    /// Legacy ordered list, replayed with append semantics.
    Ordered(Vec<i64>),
}

impl CollectionRecord {
    pub fn normalized_memberships(&self) -> NormalizedMemberships {
        if let Some(members) = &self.lectures {
            NormalizedMemberships::Positioned(members.clone())
        } else if let Some(ids) = &self.lecture_ids {
            NormalizedMemberships::Ordered(ids.clone())
        } else {
            NormalizedMemberships::Positioned(Vec::new())
        }
    }

    pub fn gated(&self) -> bool {
        self.is_paid.unwrap_or(false)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LectureRecord {
    pub id: i64,
    pub title: String,
    pub youtube_id: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub publish_date: String,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub rank_id: Option<i64>,
    #[serde(default)]
    pub topic_ids: Vec<i64>,
    #[serde(default)]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub collection_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_positioned_collection_shape() {
        let json = r#"{
            "collections": [{
                "id": 3,
                "name": "Opening theory",
                "description": null,
                "is_paid": true,
                "created_at": "2023-01-01T00:00:00",
                "lectures": [
                    {"lecture_id": 10, "position": 0},
                    {"lecture_id": 20, "position": 1}
                ]
            }]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let collection = &snapshot.collections[0];
        assert!(collection.gated());
        match collection.normalized_memberships() {
            NormalizedMemberships::Positioned(members) => {
                assert_eq!(members.len(), 2);
                assert_eq!(members[0].lecture_id, 10);
                assert_eq!(members[1].position, 1);
            }
            NormalizedMemberships::Ordered(_) => panic!("expected positioned shape"),
        }
    }

    #[test]
    fn deserializes_legacy_collection_shape() {
        let json = r#"{
            "collections": [{"id": 1, "name": "Basics", "lecture_ids": [10, 20, 30]}]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let collection = &snapshot.collections[0];
        assert!(!collection.gated());
        match collection.normalized_memberships() {
            NormalizedMemberships::Ordered(ids) => assert_eq!(ids, vec![10, 20, 30]),
            NormalizedMemberships::Positioned(_) => panic!("expected legacy shape"),
        }
    }

    #[test]
    fn missing_top_level_keys_default_to_empty() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.topics.is_empty());
        assert!(snapshot.lectures.is_empty());
    }

    #[test]
    fn lecture_record_defaults_optional_fields() {
        let json = r#"{
            "lectures": [{
                "id": 7,
                "title": "Ladders",
                "youtube_id": "abc123def45",
                "publish_date": "2024-01-01T00:00:00+00:00"
            }]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let lecture = &snapshot.lectures[0];
        assert!(lecture.duration_seconds.is_none());
        assert!(lecture.rank_id.is_none());
        assert!(lecture.topic_ids.is_empty());
    }
}
