//! SQLite schema for the lecture catalog.
//!
//! Primary keys are integer rowids. Lectures are unique on their YouTube
//! video ID, lookup entities on their name. Junction foreign keys RESTRICT
//! deletion, so removing a referenced topic/tag/rank fails at the store
//! level rather than leaving dangling rows.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};
use anyhow::Result;
use rusqlite::Connection;

const RANKS_FK: ForeignKey = ForeignKey {
    foreign_table: "ranks",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const LECTURES_FK: ForeignKey = ForeignKey {
    foreign_table: "lectures",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const TOPICS_FK: ForeignKey = ForeignKey {
    foreign_table: "topics",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const TAGS_FK: ForeignKey = ForeignKey {
    foreign_table: "tags",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

const COLLECTIONS_FK: ForeignKey = ForeignKey {
    foreign_table: "collections",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Restrict,
};

// =============================================================================
// Core tables
// =============================================================================

const LECTURES_TABLE: Table = Table {
    name: "lectures",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", SqlType::Text, non_null = true),
        sqlite_column!("youtube_id", SqlType::Text, non_null = true),
        sqlite_column!("thumbnail_url", SqlType::Text),
        sqlite_column!("publish_date", SqlType::Text, non_null = true), // RFC 3339
        sqlite_column!("duration_seconds", SqlType::Integer),
        sqlite_column!("rank_id", SqlType::Integer, foreign_key = Some(&RANKS_FK)),
    ],
    indices: &[
        ("idx_lectures_title", "title"),
        ("idx_lectures_youtube_id", "youtube_id"),
        ("idx_lectures_publish_date", "publish_date"),
        ("idx_lectures_rank", "rank_id"),
    ],
    unique_constraints: &[&["youtube_id"]],
};

const TOPICS_TABLE: Table = Table {
    name: "topics",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const TAGS_TABLE: Table = Table {
    name: "tags",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

const RANKS_TABLE: Table = Table {
    name: "ranks",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["name"]],
};

/// Historical collections shape, before the gated-access flag and the
/// revision counter existed.
const COLLECTIONS_TABLE_V0: Table = Table {
    name: "collections",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("description", SqlType::Text),
        sqlite_column!("created_at", SqlType::Text, non_null = true),
    ],
    indices: &[("idx_collections_name", "name")],
    unique_constraints: &[],
};

const COLLECTIONS_TABLE: Table = Table {
    name: "collections",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", SqlType::Text, non_null = true),
        sqlite_column!("description", SqlType::Text),
        sqlite_column!("created_at", SqlType::Text, non_null = true),
        sqlite_column!(
            "is_gated",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "revision",
            SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_collections_name", "name")],
    unique_constraints: &[],
};

// =============================================================================
// Junction tables
// =============================================================================

const LECTURE_TOPICS_TABLE: Table = Table {
    name: "lecture_topics",
    columns: &[
        sqlite_column!(
            "lecture_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&LECTURES_FK)
        ),
        sqlite_column!(
            "topic_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TOPICS_FK)
        ),
    ],
    indices: &[
        ("idx_lecture_topics_lecture", "lecture_id"),
        ("idx_lecture_topics_topic", "topic_id"),
    ],
    unique_constraints: &[&["lecture_id", "topic_id"]],
};

const LECTURE_TAGS_TABLE: Table = Table {
    name: "lecture_tags",
    columns: &[
        sqlite_column!(
            "lecture_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&LECTURES_FK)
        ),
        sqlite_column!(
            "tag_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TAGS_FK)
        ),
    ],
    indices: &[
        ("idx_lecture_tags_lecture", "lecture_id"),
        ("idx_lecture_tags_tag", "tag_id"),
    ],
    unique_constraints: &[&["lecture_id", "tag_id"]],
};

/// Positioned membership: collection <-> lecture with an explicit ordering
/// attribute. Unique per (collection, lecture); position is a sort key and
/// may carry gaps after removals.
const COLLECTION_LECTURES_TABLE: Table = Table {
    name: "collection_lectures",
    columns: &[
        sqlite_column!(
            "collection_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&COLLECTIONS_FK)
        ),
        sqlite_column!(
            "lecture_id",
            SqlType::Integer,
            non_null = true,
            foreign_key = Some(&LECTURES_FK)
        ),
        sqlite_column!("position", SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_collection_lectures_collection", "collection_id"),
        ("idx_collection_lectures_lecture", "lecture_id"),
    ],
    unique_constraints: &[&["collection_id", "lecture_id"]],
};

// =============================================================================
// Versioned schema
// =============================================================================

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "ALTER TABLE collections ADD COLUMN is_gated INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    conn.execute(
        "ALTER TABLE collections ADD COLUMN revision INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            RANKS_TABLE,
            TOPICS_TABLE,
            TAGS_TABLE,
            LECTURES_TABLE,
            COLLECTIONS_TABLE_V0,
            LECTURE_TOPICS_TABLE,
            LECTURE_TAGS_TABLE,
            COLLECTION_LECTURES_TABLE,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            RANKS_TABLE,
            TOPICS_TABLE,
            TAGS_TABLE,
            LECTURES_TABLE,
            COLLECTIONS_TABLE,
            LECTURE_TOPICS_TABLE,
            LECTURE_TAGS_TABLE,
            COLLECTION_LECTURES_TABLE,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn latest() -> &'static VersionedSchema {
        CATALOG_VERSIONED_SCHEMAS.last().unwrap()
    }

    #[test]
    fn schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        latest().create(&conn).unwrap();
        latest().validate(&conn).unwrap();
    }

    #[test]
    fn migration_from_v0_produces_current_shape() {
        let conn = Connection::open_in_memory().unwrap();
        CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        migrate_v0_to_v1(&conn).unwrap();
        latest().validate(&conn).unwrap();
    }

    #[test]
    fn youtube_id_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        latest().create(&conn).unwrap();

        conn.execute(
            "INSERT INTO lectures (title, youtube_id, publish_date) VALUES ('a', 'abc123def45', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO lectures (title, youtube_id, publish_date) VALUES ('b', 'abc123def45', '2024-01-02T00:00:00+00:00')",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn referenced_topic_cannot_be_deleted() {
        let conn = Connection::open_in_memory().unwrap();
        latest().create(&conn).unwrap();

        conn.execute("INSERT INTO topics (name) VALUES ('joseki')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO lectures (title, youtube_id, publish_date) VALUES ('a', 'abc123def45', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO lecture_topics (lecture_id, topic_id) VALUES (
                (SELECT id FROM lectures WHERE youtube_id = 'abc123def45'),
                (SELECT id FROM topics WHERE name = 'joseki'))",
            [],
        )
        .unwrap();

        let result = conn.execute("DELETE FROM topics WHERE name = ?1", params!["joseki"]);
        assert!(result.is_err());
    }

    #[test]
    fn membership_unique_per_collection_and_lecture() {
        let conn = Connection::open_in_memory().unwrap();
        latest().create(&conn).unwrap();

        conn.execute(
            "INSERT INTO lectures (title, youtube_id, publish_date) VALUES ('a', 'abc123def45', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO collections (name, created_at) VALUES ('basics', '2024-01-01T00:00:00+00:00')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO collection_lectures (collection_id, lecture_id, position) VALUES (1, 1, 0)",
            [],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO collection_lectures (collection_id, lecture_id, position) VALUES (1, 1, 1)",
            [],
        );
        assert!(duplicate.is_err());
    }
}
