//! Snapshot export.
//!
//! Produces the same JSON shape the importer consumes. Collection
//! memberships are exported as `{lecture_id, position}` pairs ascending by
//! position; lectures carry denormalized topic/tag/rank IDs and a derived
//! `collection_ids` list computed by reverse membership lookup. Timestamps
//! are emitted exactly as stored.

use super::format::{CollectionRecord, LectureRecord, MembershipRecord, NamedRecord, Snapshot};
use crate::catalog_store::{positions, LookupKind, SqliteCatalogStore, StoreResult};
use rusqlite::{params, Connection};

pub fn export_snapshot(store: &SqliteCatalogStore) -> StoreResult<Snapshot> {
    store.with_read_conn(build_snapshot)
}

pub(crate) fn build_snapshot(conn: &Connection) -> StoreResult<Snapshot> {
    Ok(Snapshot {
        topics: export_named(conn, LookupKind::Topic)?,
        tags: export_named(conn, LookupKind::Tag)?,
        ranks: export_named(conn, LookupKind::Rank)?,
        collections: export_collections(conn)?,
        lectures: export_lectures(conn)?,
    })
}

pub(crate) fn export_named(conn: &Connection, kind: LookupKind) -> StoreResult<Vec<NamedRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, name FROM {} ORDER BY id",
        kind.table()
    ))?;
    let records = stmt
        .query_map([], |r| {
            Ok(NamedRecord {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub(crate) fn export_collections(conn: &Connection) -> StoreResult<Vec<CollectionRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, description, is_gated, created_at FROM collections ORDER BY id",
    )?;
    let bare = stmt
        .query_map([], |r| {
            Ok(CollectionRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                description: r.get(2)?,
                is_paid: Some(r.get::<_, i64>(3)? != 0),
                created_at: r.get(4)?,
                lectures: None,
                lecture_ids: None,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(bare.len());
    for mut record in bare {
        // member_positions already sorts ascending by position
        let members = positions::member_positions(conn, record.id)?
            .into_iter()
            .map(|(lecture_id, position)| MembershipRecord {
                lecture_id,
                position,
            })
            .collect();
        record.lectures = Some(members);
        records.push(record);
    }
    Ok(records)
}

pub(crate) fn export_lectures(conn: &Connection) -> StoreResult<Vec<LectureRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, title, youtube_id, thumbnail_url, publish_date, duration_seconds, rank_id
         FROM lectures ORDER BY id",
    )?;
    let bare = stmt
        .query_map([], |r| {
            Ok(LectureRecord {
                id: r.get(0)?,
                title: r.get(1)?,
                youtube_id: r.get(2)?,
                thumbnail_url: r.get(3)?,
                publish_date: r.get(4)?,
                duration_seconds: r.get(5)?,
                rank_id: r.get(6)?,
                topic_ids: Vec::new(),
                tag_ids: Vec::new(),
                collection_ids: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(bare.len());
    for mut record in bare {
        record.topic_ids = related_ids(
            conn,
            "SELECT topic_id FROM lecture_topics WHERE lecture_id = ?1 ORDER BY topic_id",
            record.id,
        )?;
        record.tag_ids = related_ids(
            conn,
            "SELECT tag_id FROM lecture_tags WHERE lecture_id = ?1 ORDER BY tag_id",
            record.id,
        )?;
        record.collection_ids = related_ids(
            conn,
            "SELECT collection_id FROM collection_lectures WHERE lecture_id = ?1
             ORDER BY collection_id",
            record.id,
        )?;
        records.push(record);
    }
    Ok(records)
}

fn related_ids(conn: &Connection, sql: &str, id: i64) -> StoreResult<Vec<i64>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let ids = stmt
        .query_map(params![id], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
