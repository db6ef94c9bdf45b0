//! Natural-key snapshot merge.
//!
//! Snapshot IDs are never trusted: every record is looked up by natural
//! key (name for lookup entities and collections, YouTube video ID for
//! lectures) and the snapshot-local ID is mapped to the live one in a
//! per-kind remap table. Relationships are replayed through those tables
//! after all base kinds are resolved. The merge is additive-only: a
//! natural-key hit never updates the existing row.
//!
//! The whole import runs in a single transaction; any error rolls back
//! every change made so far.

use super::format::{NamedRecord, NormalizedMemberships, Snapshot};
use crate::catalog_store::{
    parse_timestamp, positions, LookupKind, NewLecture, SqliteCatalogStore, StoreError,
    StoreResult,
};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Created/merged tally for one entity kind.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct NamedRecordStats {
    pub created: usize,
    pub merged: usize,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ImportStats {
    pub topics: NamedRecordStats,
    pub tags: NamedRecordStats,
    pub ranks: NamedRecordStats,
    pub collections: NamedRecordStats,
    pub lectures: NamedRecordStats,
    pub links_added: usize,
    pub memberships_added: usize,
}

#[derive(Debug, Default)]
struct RemapTables {
    topics: HashMap<i64, i64>,
    tags: HashMap<i64, i64>,
    ranks: HashMap<i64, i64>,
    collections: HashMap<i64, i64>,
    lectures: HashMap<i64, i64>,
}

/// Merge a snapshot into the live store, all-or-nothing.
pub fn import_snapshot(
    store: &SqliteCatalogStore,
    snapshot: &Snapshot,
) -> StoreResult<ImportStats> {
    let stats = store.with_write_tx(|conn| merge_snapshot(conn, snapshot))?;
    info!(
        "Imported snapshot: {} lectures created ({} merged), {} memberships added",
        stats.lectures.created, stats.lectures.merged, stats.memberships_added
    );
    Ok(stats)
}

pub(crate) fn merge_snapshot(conn: &Connection, snapshot: &Snapshot) -> StoreResult<ImportStats> {
    let mut stats = ImportStats::default();
    let mut remap = RemapTables::default();

    // Base kinds in dependency order
    stats.topics = merge_named(conn, LookupKind::Topic, &snapshot.topics, &mut remap.topics)?;
    stats.tags = merge_named(conn, LookupKind::Tag, &snapshot.tags, &mut remap.tags)?;
    stats.ranks = merge_named(conn, LookupKind::Rank, &snapshot.ranks, &mut remap.ranks)?;
    stats.collections = merge_collections(conn, snapshot, &mut remap)?;
    stats.lectures = merge_lectures(conn, snapshot, &mut remap)?;

    // Relationship replay through the remap tables
    stats.links_added = replay_lecture_links(conn, snapshot, &remap)?;
    stats.memberships_added = replay_memberships(conn, snapshot, &remap)?;

    Ok(stats)
}

fn merge_named(
    conn: &Connection,
    kind: LookupKind,
    records: &[NamedRecord],
    remap: &mut HashMap<i64, i64>,
) -> StoreResult<NamedRecordStats> {
    let mut stats = NamedRecordStats::default();
    for record in records {
        match SqliteCatalogStore::find_named_id(conn, kind, &record.name)? {
            Some(existing_id) => {
                remap.insert(record.id, existing_id);
                stats.merged += 1;
            }
            None => {
                let new_id = SqliteCatalogStore::insert_named_row(conn, kind, &record.name)?;
                remap.insert(record.id, new_id);
                stats.created += 1;
            }
        }
    }
    Ok(stats)
}

fn merge_collections(
    conn: &Connection,
    snapshot: &Snapshot,
    remap: &mut RemapTables,
) -> StoreResult<NamedRecordStats> {
    let mut stats = NamedRecordStats::default();
    for record in &snapshot.collections {
        match SqliteCatalogStore::find_collection_by_name(conn, &record.name)? {
            Some(existing_id) => {
                remap.collections.insert(record.id, existing_id);
                stats.merged += 1;
            }
            None => {
                let created_at = match record.created_at.as_deref() {
                    Some(raw) => parse_timestamp(raw).map_err(|e| {
                        StoreError::Validation(format!(
                            "collection {:?} has malformed created_at: {}",
                            record.name, e
                        ))
                    })?,
                    None => Utc::now(),
                };
                let new_id = SqliteCatalogStore::insert_collection_row(
                    conn,
                    &record.name,
                    record.description.as_deref(),
                    record.gated(),
                    &created_at,
                )?;
                remap.collections.insert(record.id, new_id);
                stats.created += 1;
            }
        }
    }
    Ok(stats)
}

fn merge_lectures(
    conn: &Connection,
    snapshot: &Snapshot,
    remap: &mut RemapTables,
) -> StoreResult<NamedRecordStats> {
    let mut stats = NamedRecordStats::default();
    for record in &snapshot.lectures {
        match SqliteCatalogStore::find_lecture_by_youtube(conn, &record.youtube_id)? {
            Some(existing_id) => {
                remap.lectures.insert(record.id, existing_id);
                stats.merged += 1;
            }
            None => {
                let publish_date = parse_timestamp(&record.publish_date).map_err(|e| {
                    StoreError::Validation(format!(
                        "lecture {:?} has malformed publish_date: {}",
                        record.youtube_id, e
                    ))
                })?;

                // An unresolvable rank reference leaves the rank unset
                // rather than failing the import.
                let rank_id = match record.rank_id {
                    Some(snapshot_rank_id) => {
                        let live = remap.ranks.get(&snapshot_rank_id).copied();
                        if live.is_none() {
                            warn!(
                                "Lecture {} references unknown rank {}, leaving unset",
                                record.youtube_id, snapshot_rank_id
                            );
                        }
                        live
                    }
                    None => None,
                };

                let new_id = SqliteCatalogStore::insert_lecture_row(
                    conn,
                    &NewLecture {
                        title: record.title.clone(),
                        youtube_id: record.youtube_id.clone(),
                        thumbnail_url: record.thumbnail_url.clone(),
                        publish_date,
                        duration_seconds: record.duration_seconds,
                        rank_id,
                    },
                )?;
                remap.lectures.insert(record.id, new_id);
                stats.created += 1;
            }
        }
    }
    Ok(stats)
}

fn replay_lecture_links(
    conn: &Connection,
    snapshot: &Snapshot,
    remap: &RemapTables,
) -> StoreResult<usize> {
    let mut added = 0;
    for record in &snapshot.lectures {
        let lecture_id = match remap.lectures.get(&record.id) {
            Some(id) => *id,
            None => continue,
        };
        added += replay_links_of_kind(
            conn,
            LookupKind::Topic,
            lecture_id,
            &record.topic_ids,
            &remap.topics,
        )?;
        added += replay_links_of_kind(
            conn,
            LookupKind::Tag,
            lecture_id,
            &record.tag_ids,
            &remap.tags,
        )?;
    }
    Ok(added)
}

fn replay_links_of_kind(
    conn: &Connection,
    kind: LookupKind,
    lecture_id: i64,
    snapshot_ids: &[i64],
    remap: &HashMap<i64, i64>,
) -> StoreResult<usize> {
    let mut added = 0;
    for snapshot_id in snapshot_ids {
        let live_id = match remap.get(snapshot_id) {
            Some(id) => *id,
            None => {
                warn!(
                    "Lecture {} references unknown {} {}, skipping",
                    lecture_id,
                    kind.singular(),
                    snapshot_id
                );
                continue;
            }
        };
        if !SqliteCatalogStore::lecture_link_exists(conn, kind, lecture_id, live_id)? {
            SqliteCatalogStore::insert_lecture_link(conn, kind, lecture_id, live_id)?;
            added += 1;
        }
    }
    Ok(added)
}

fn replay_memberships(
    conn: &Connection,
    snapshot: &Snapshot,
    remap: &RemapTables,
) -> StoreResult<usize> {
    let mut added = 0;
    let mut touched_collections = HashSet::new();

    for record in &snapshot.collections {
        let collection_id = match remap.collections.get(&record.id) {
            Some(id) => *id,
            None => continue,
        };

        let added_here = match record.normalized_memberships() {
            NormalizedMemberships::Positioned(members) => {
                let mut count = 0;
                for member in members {
                    let lecture_id = match remap.lectures.get(&member.lecture_id) {
                        Some(id) => *id,
                        None => {
                            warn!(
                                "Collection {:?} references unknown lecture {}, skipping",
                                record.name, member.lecture_id
                            );
                            continue;
                        }
                    };
                    if positions::is_member(conn, collection_id, lecture_id)? {
                        continue;
                    }
                    positions::insert_member_at(conn, collection_id, lecture_id, member.position)?;
                    count += 1;
                }
                count
            }
            NormalizedMemberships::Ordered(snapshot_ids) => {
                // Legacy shape: append in array order
                let mut to_append = Vec::new();
                for snapshot_id in snapshot_ids {
                    let lecture_id = match remap.lectures.get(&snapshot_id) {
                        Some(id) => *id,
                        None => {
                            warn!(
                                "Collection {:?} references unknown lecture {}, skipping",
                                record.name, snapshot_id
                            );
                            continue;
                        }
                    };
                    if !positions::is_member(conn, collection_id, lecture_id)? {
                        to_append.push(lecture_id);
                    }
                }
                if to_append.is_empty() {
                    0
                } else {
                    positions::append_lectures(conn, collection_id, &to_append)?
                }
            }
        };

        if added_here > 0 {
            touched_collections.insert(collection_id);
            added += added_here;
        }
    }

    for collection_id in touched_collections {
        conn.execute(
            "UPDATE collections SET revision = revision + 1 WHERE id = ?1",
            params![collection_id],
        )?;
    }

    Ok(added)
}
