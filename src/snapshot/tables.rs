//! Table-scoped export/import.
//!
//! Moves one entity kind (or one relationship table) at a time, wrapped as
//! `{"<table_name>": [rows]}`. Dispatch is an exhaustive enum, so adding a
//! kind without handling it everywhere fails to compile. Unlike the full
//! importer, bad or duplicate records are skipped per-record instead of
//! aborting the batch; the `replace` flag clears the target table (and the
//! tables that reference it, in dependency order) before importing.

use super::export;
use super::format::{LectureRecord, NamedRecord};
use crate::catalog_store::{
    parse_timestamp, positions, LookupKind, NewLecture, SqliteCatalogStore, StoreError,
    StoreResult,
};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Topics,
    Tags,
    Ranks,
    Collections,
    Lectures,
    LectureTopics,
    LectureTags,
    CollectionLectures,
}

impl TableKind {
    pub fn from_name(name: &str) -> Option<TableKind> {
        match name {
            "topics" => Some(TableKind::Topics),
            "tags" => Some(TableKind::Tags),
            "ranks" => Some(TableKind::Ranks),
            "collections" => Some(TableKind::Collections),
            "lectures" => Some(TableKind::Lectures),
            "lecture_topics" => Some(TableKind::LectureTopics),
            "lecture_tags" => Some(TableKind::LectureTags),
            "collection_lectures" => Some(TableKind::CollectionLectures),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Topics => "topics",
            TableKind::Tags => "tags",
            TableKind::Ranks => "ranks",
            TableKind::Collections => "collections",
            TableKind::Lectures => "lectures",
            TableKind::LectureTopics => "lecture_topics",
            TableKind::LectureTags => "lecture_tags",
            TableKind::CollectionLectures => "collection_lectures",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TableTransferStats {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TopicLinkRow {
    lecture_id: i64,
    topic_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TagLinkRow {
    lecture_id: i64,
    tag_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MembershipRow {
    collection_id: i64,
    lecture_id: i64,
    position: i64,
}

// =============================================================================
// Export
// =============================================================================

pub fn export_table(store: &SqliteCatalogStore, kind: TableKind) -> StoreResult<serde_json::Value> {
    store.with_read_conn(|conn| {
        let rows = match kind {
            TableKind::Topics => to_json(&export::export_named(conn, LookupKind::Topic)?),
            TableKind::Tags => to_json(&export::export_named(conn, LookupKind::Tag)?),
            TableKind::Ranks => to_json(&export::export_named(conn, LookupKind::Rank)?),
            TableKind::Collections => to_json(&export::export_collections(conn)?),
            TableKind::Lectures => to_json(&export::export_lectures(conn)?),
            TableKind::LectureTopics => to_json(&query_rows(
                conn,
                "SELECT lecture_id, topic_id FROM lecture_topics ORDER BY lecture_id, topic_id",
                |r| {
                    Ok(TopicLinkRow {
                        lecture_id: r.get(0)?,
                        topic_id: r.get(1)?,
                    })
                },
            )?),
            TableKind::LectureTags => to_json(&query_rows(
                conn,
                "SELECT lecture_id, tag_id FROM lecture_tags ORDER BY lecture_id, tag_id",
                |r| {
                    Ok(TagLinkRow {
                        lecture_id: r.get(0)?,
                        tag_id: r.get(1)?,
                    })
                },
            )?),
            TableKind::CollectionLectures => to_json(&query_rows(
                conn,
                "SELECT collection_id, lecture_id, position FROM collection_lectures
                 ORDER BY collection_id, position",
                |r| {
                    Ok(MembershipRow {
                        collection_id: r.get(0)?,
                        lecture_id: r.get(1)?,
                        position: r.get(2)?,
                    })
                },
            )?),
        };
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(kind.name().to_string(), rows);
        Ok(serde_json::Value::Object(wrapper))
    })
}

fn to_json<T: Serialize>(rows: &[T]) -> serde_json::Value {
    serde_json::to_value(rows).expect("table rows serialize to JSON")
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    f: impl FnMut(&rusqlite::Row) -> rusqlite::Result<T>,
) -> StoreResult<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map([], f)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// =============================================================================
// Import
// =============================================================================

pub fn import_table(
    store: &SqliteCatalogStore,
    kind: TableKind,
    payload: &serde_json::Value,
    replace: bool,
) -> StoreResult<TableTransferStats> {
    let rows = payload
        .get(kind.name())
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            StoreError::Validation(format!("payload is missing a {:?} array", kind.name()))
        })?;

    store.with_write_tx(|conn| {
        if replace {
            clear_table(conn, kind)?;
        }
        import_rows(conn, kind, rows)
    })
}

/// Clear a table and everything that references it. Ranks are referenced
/// through a nullable column rather than a junction table, so that column
/// is nulled out instead.
fn clear_table(conn: &Connection, kind: TableKind) -> StoreResult<()> {
    match kind {
        TableKind::Topics => {
            conn.execute("DELETE FROM lecture_topics", [])?;
            conn.execute("DELETE FROM topics", [])?;
        }
        TableKind::Tags => {
            conn.execute("DELETE FROM lecture_tags", [])?;
            conn.execute("DELETE FROM tags", [])?;
        }
        TableKind::Ranks => {
            conn.execute("UPDATE lectures SET rank_id = NULL", [])?;
            conn.execute("DELETE FROM ranks", [])?;
        }
        TableKind::Collections => {
            conn.execute("DELETE FROM collection_lectures", [])?;
            conn.execute("DELETE FROM collections", [])?;
        }
        TableKind::Lectures => {
            conn.execute("DELETE FROM lecture_topics", [])?;
            conn.execute("DELETE FROM lecture_tags", [])?;
            conn.execute("DELETE FROM collection_lectures", [])?;
            conn.execute("DELETE FROM lectures", [])?;
        }
        TableKind::LectureTopics => {
            conn.execute("DELETE FROM lecture_topics", [])?;
        }
        TableKind::LectureTags => {
            conn.execute("DELETE FROM lecture_tags", [])?;
        }
        TableKind::CollectionLectures => {
            conn.execute("DELETE FROM collection_lectures", [])?;
        }
    }
    Ok(())
}

fn import_rows(
    conn: &Connection,
    kind: TableKind,
    rows: &[serde_json::Value],
) -> StoreResult<TableTransferStats> {
    let mut stats = TableTransferStats::default();
    let mut touched_collections = HashSet::new();

    for row in rows {
        let outcome = match kind {
            TableKind::Topics => import_named_row(conn, LookupKind::Topic, row),
            TableKind::Tags => import_named_row(conn, LookupKind::Tag, row),
            TableKind::Ranks => import_named_row(conn, LookupKind::Rank, row),
            TableKind::Collections => import_collection_row(conn, row),
            TableKind::Lectures => import_lecture_row(conn, row),
            TableKind::LectureTopics => import_topic_link_row(conn, row),
            TableKind::LectureTags => import_tag_link_row(conn, row),
            TableKind::CollectionLectures => {
                import_membership_row(conn, row, &mut touched_collections)
            }
        };
        match outcome {
            Ok(true) => stats.imported += 1,
            Ok(false) => stats.skipped += 1,
            Err(e) => {
                warn!("Skipping bad {} record: {}", kind.name(), e);
                stats.skipped += 1;
            }
        }
    }

    for collection_id in touched_collections {
        conn.execute(
            "UPDATE collections SET revision = revision + 1 WHERE id = ?1",
            params![collection_id],
        )?;
    }

    Ok(stats)
}

fn import_named_row(
    conn: &Connection,
    kind: LookupKind,
    row: &serde_json::Value,
) -> StoreResult<bool> {
    let record: NamedRecord = parse_row(row)?;
    if SqliteCatalogStore::find_named_id(conn, kind, &record.name)?.is_some() {
        return Ok(false);
    }
    SqliteCatalogStore::insert_named_row(conn, kind, &record.name)?;
    Ok(true)
}

fn import_collection_row(conn: &Connection, row: &serde_json::Value) -> StoreResult<bool> {
    let record: super::format::CollectionRecord = parse_row(row)?;
    if SqliteCatalogStore::find_collection_by_name(conn, &record.name)?.is_some() {
        return Ok(false);
    }
    let created_at = match record.created_at.as_deref() {
        Some(raw) => parse_timestamp(raw)
            .map_err(|e| StoreError::Validation(format!("malformed created_at: {}", e)))?,
        None => Utc::now(),
    };
    // Membership arrays carry snapshot-local lecture IDs; in table-scoped
    // mode memberships travel via the collection_lectures table instead.
    SqliteCatalogStore::insert_collection_row(
        conn,
        &record.name,
        record.description.as_deref(),
        record.gated(),
        &created_at,
    )?;
    Ok(true)
}

fn import_lecture_row(conn: &Connection, row: &serde_json::Value) -> StoreResult<bool> {
    let record: LectureRecord = parse_row(row)?;
    if SqliteCatalogStore::find_lecture_by_youtube(conn, &record.youtube_id)?.is_some() {
        return Ok(false);
    }
    let publish_date = parse_timestamp(&record.publish_date)
        .map_err(|e| StoreError::Validation(format!("malformed publish_date: {}", e)))?;

    // rank_id is a live ID in table-scoped mode; drop it if it doesn't
    // resolve in this store
    let rank_id = match record.rank_id {
        Some(id) => {
            let mut stmt = conn.prepare_cached("SELECT 1 FROM ranks WHERE id = ?1")?;
            if stmt.exists(params![id])? {
                Some(id)
            } else {
                warn!(
                    "Lecture {} references unknown rank {}, leaving unset",
                    record.youtube_id, id
                );
                None
            }
        }
        None => None,
    };

    SqliteCatalogStore::insert_lecture_row(
        conn,
        &NewLecture {
            title: record.title,
            youtube_id: record.youtube_id,
            thumbnail_url: record.thumbnail_url,
            publish_date,
            duration_seconds: record.duration_seconds,
            rank_id,
        },
    )?;
    Ok(true)
}

fn import_topic_link_row(conn: &Connection, row: &serde_json::Value) -> StoreResult<bool> {
    let record: TopicLinkRow = parse_row(row)?;
    if !row_exists(conn, "lectures", record.lecture_id)?
        || !row_exists(conn, "topics", record.topic_id)?
    {
        return Ok(false);
    }
    if SqliteCatalogStore::lecture_link_exists(
        conn,
        LookupKind::Topic,
        record.lecture_id,
        record.topic_id,
    )? {
        return Ok(false);
    }
    SqliteCatalogStore::insert_lecture_link(
        conn,
        LookupKind::Topic,
        record.lecture_id,
        record.topic_id,
    )?;
    Ok(true)
}

fn import_tag_link_row(conn: &Connection, row: &serde_json::Value) -> StoreResult<bool> {
    let record: TagLinkRow = parse_row(row)?;
    if !row_exists(conn, "lectures", record.lecture_id)?
        || !row_exists(conn, "tags", record.tag_id)?
    {
        return Ok(false);
    }
    if SqliteCatalogStore::lecture_link_exists(
        conn,
        LookupKind::Tag,
        record.lecture_id,
        record.tag_id,
    )? {
        return Ok(false);
    }
    SqliteCatalogStore::insert_lecture_link(
        conn,
        LookupKind::Tag,
        record.lecture_id,
        record.tag_id,
    )?;
    Ok(true)
}

fn import_membership_row(
    conn: &Connection,
    row: &serde_json::Value,
    touched_collections: &mut HashSet<i64>,
) -> StoreResult<bool> {
    let record: MembershipRow = parse_row(row)?;
    if !row_exists(conn, "collections", record.collection_id)?
        || !row_exists(conn, "lectures", record.lecture_id)?
    {
        return Ok(false);
    }
    if positions::is_member(conn, record.collection_id, record.lecture_id)? {
        return Ok(false);
    }
    positions::insert_member_at(conn, record.collection_id, record.lecture_id, record.position)?;
    touched_collections.insert(record.collection_id);
    Ok(true)
}

fn parse_row<T: serde::de::DeserializeOwned>(row: &serde_json::Value) -> StoreResult<T> {
    serde_json::from_value(row.clone())
        .map_err(|e| StoreError::Validation(format!("malformed record: {}", e)))
}

fn row_exists(conn: &Connection, table: &str, id: i64) -> StoreResult<bool> {
    let mut stmt = conn.prepare_cached(&format!("SELECT 1 FROM {} WHERE id = ?1", table))?;
    Ok(stmt.exists(params![id])?)
}

// =============================================================================
// Reset
// =============================================================================

/// Export the full catalog, then clear every table in dependency order.
/// Returns the snapshot as the backup of what was deleted.
pub fn reset_catalog(store: &SqliteCatalogStore) -> StoreResult<super::Snapshot> {
    store.with_write_tx(|conn| {
        let snapshot = export::build_snapshot(conn)?;
        conn.execute("DELETE FROM lecture_topics", [])?;
        conn.execute("DELETE FROM lecture_tags", [])?;
        conn.execute("DELETE FROM collection_lectures", [])?;
        conn.execute("DELETE FROM lectures", [])?;
        conn.execute("DELETE FROM topics", [])?;
        conn.execute("DELETE FROM tags", [])?;
        conn.execute("DELETE FROM ranks", [])?;
        conn.execute("DELETE FROM collections", [])?;
        Ok(snapshot)
    })
}
