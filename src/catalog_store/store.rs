//! SQLite-backed catalog store.
//!
//! One write connection behind a mutex plus a small round-robin pool of
//! read-only connections, all in WAL mode. Multi-row mutations run inside
//! a transaction on the write connection so a mid-sequence failure leaves
//! the catalog in its pre-operation state.

use super::error::{StoreError, StoreResult};
use super::models::*;
use super::positions;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub struct SqliteCatalogStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

fn migrate_if_needed(conn: &mut Connection) -> anyhow::Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating catalog db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    // Databases created before schema versioning report user_version 0.
    // Inspect the collections table to tell which shape they carry.
    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        let has_gated_flag = conn
            .query_row(
                "SELECT 1 FROM pragma_table_info('collections') WHERE name = 'is_gated'",
                [],
                |r| r.get::<_, i32>(0),
            )
            .ok()
            == Some(1);
        if has_gated_flag {
            1
        } else {
            0
        }
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating catalog db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
            current_version = schema.version;
        }
    }
    tx.pragma_update(None, "user_version", BASE_DB_VERSION + current_version)?;
    tx.commit()?;
    Ok(())
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> anyhow::Result<Self> {
        let db_path_ref = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path_ref,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        migrate_if_needed(&mut write_conn)?;
        CATALOG_VERSIONED_SCHEMAS
            .last()
            .expect("schema list is non-empty")
            .validate(&write_conn)?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", true)?;

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path_ref,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.pragma_update(None, "journal_mode", "WAL")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        let store = SqliteCatalogStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        };

        let counts = store.counts()?;
        info!(
            "Opened lecture catalog: {} lectures, {} topics, {} tags, {} ranks, {} collections",
            counts.lectures, counts.topics, counts.tags, counts.ranks, counts.collections
        );

        Ok(store)
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    pub(crate) fn with_read_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let read_conn = self.get_read_conn();
        let conn = read_conn.lock().unwrap();
        f(&conn)
    }

    pub(crate) fn with_write_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.write_conn.lock().unwrap();
        let tx = guard.transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // =========================================================================
    // Internal row helpers
    // =========================================================================

    fn lecture_from_row(row: &rusqlite::Row) -> rusqlite::Result<Lecture> {
        let publish_date_raw: String = row.get(4)?;
        let publish_date = parse_timestamp(&publish_date_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Lecture {
            id: row.get(0)?,
            title: row.get(1)?,
            youtube_id: row.get(2)?,
            thumbnail_url: row.get(3)?,
            publish_date,
            duration_seconds: row.get(5)?,
            rank_id: row.get(6)?,
        })
    }

    const LECTURE_COLUMNS: &'static str =
        "id, title, youtube_id, thumbnail_url, publish_date, duration_seconds, rank_id";

    fn collection_from_row(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
        let created_at_raw: String = row.get(4)?;
        let created_at = parse_timestamp(&created_at_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Collection {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            is_gated: row.get::<_, i64>(3)? != 0,
            created_at,
            revision: row.get(5)?,
        })
    }

    const COLLECTION_COLUMNS: &'static str =
        "id, name, description, is_gated, created_at, revision";

    fn get_lecture_inner(conn: &Connection, id: i64) -> StoreResult<Option<Lecture>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM lectures WHERE id = ?1",
            Self::LECTURE_COLUMNS
        ))?;
        match stmt.query_row(params![id], Self::lecture_from_row) {
            Ok(lecture) => Ok(Some(lecture)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_collection_inner(conn: &Connection, id: i64) -> StoreResult<Option<Collection>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM collections WHERE id = ?1",
            Self::COLLECTION_COLUMNS
        ))?;
        match stmt.query_row(params![id], Self::collection_from_row) {
            Ok(collection) => Ok(Some(collection)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_lecture_inner(conn: &Connection, lecture: Lecture) -> StoreResult<ResolvedLecture> {
        let mut topic_stmt = conn.prepare_cached(
            "SELECT t.id, t.name FROM topics t
             JOIN lecture_topics lt ON lt.topic_id = t.id
             WHERE lt.lecture_id = ?1 ORDER BY t.name",
        )?;
        let topics = topic_stmt
            .query_map(params![lecture.id], |r| {
                Ok(Topic {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tag_stmt = conn.prepare_cached(
            "SELECT t.id, t.name FROM tags t
             JOIN lecture_tags lt ON lt.tag_id = t.id
             WHERE lt.lecture_id = ?1 ORDER BY t.name",
        )?;
        let tags = tag_stmt
            .query_map(params![lecture.id], |r| {
                Ok(Tag {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let rank = match lecture.rank_id {
            Some(rank_id) => {
                let mut rank_stmt =
                    conn.prepare_cached("SELECT id, name FROM ranks WHERE id = ?1")?;
                match rank_stmt.query_row(params![rank_id], |r| {
                    Ok(Rank {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                }) {
                    Ok(rank) => Some(rank),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            }
            None => None,
        };

        Ok(ResolvedLecture {
            lecture,
            topics,
            tags,
            rank,
        })
    }

    // =========================================================================
    // Internal helpers shared with the snapshot importer
    // =========================================================================

    pub(crate) fn find_named_id(
        conn: &Connection,
        kind: LookupKind,
        name: &str,
    ) -> StoreResult<Option<i64>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT id FROM {} WHERE name = ?1",
            kind.table()
        ))?;
        match stmt.query_row(params![name], |r| r.get(0)) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn insert_named_row(
        conn: &Connection,
        kind: LookupKind,
        name: &str,
    ) -> StoreResult<i64> {
        conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", kind.table()),
            params![name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn find_lecture_by_youtube(
        conn: &Connection,
        youtube_id: &str,
    ) -> StoreResult<Option<i64>> {
        let mut stmt =
            conn.prepare_cached("SELECT id FROM lectures WHERE youtube_id = ?1")?;
        match stmt.query_row(params![youtube_id], |r| r.get(0)) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn insert_lecture_row(conn: &Connection, new: &NewLecture) -> StoreResult<i64> {
        conn.execute(
            "INSERT INTO lectures (title, youtube_id, thumbnail_url, publish_date, duration_seconds, rank_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.title,
                new.youtube_id,
                new.thumbnail_url,
                format_timestamp(&new.publish_date),
                new.duration_seconds,
                new.rank_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn find_collection_by_name(
        conn: &Connection,
        name: &str,
    ) -> StoreResult<Option<i64>> {
        let mut stmt = conn.prepare_cached("SELECT id FROM collections WHERE name = ?1")?;
        match stmt.query_row(params![name], |r| r.get(0)) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn insert_collection_row(
        conn: &Connection,
        name: &str,
        description: Option<&str>,
        is_gated: bool,
        created_at: &DateTime<Utc>,
    ) -> StoreResult<i64> {
        conn.execute(
            "INSERT INTO collections (name, description, is_gated, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, description, is_gated as i64, format_timestamp(created_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn lecture_link_exists(
        conn: &Connection,
        kind: LookupKind,
        lecture_id: i64,
        other_id: i64,
    ) -> StoreResult<bool> {
        let (table, column) = Self::link_table(kind)?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT 1 FROM {} WHERE lecture_id = ?1 AND {} = ?2",
            table, column
        ))?;
        Ok(stmt.exists(params![lecture_id, other_id])?)
    }

    pub(crate) fn insert_lecture_link(
        conn: &Connection,
        kind: LookupKind,
        lecture_id: i64,
        other_id: i64,
    ) -> StoreResult<()> {
        let (table, column) = Self::link_table(kind)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (lecture_id, {}) VALUES (?1, ?2)",
                table, column
            ),
            params![lecture_id, other_id],
        )?;
        Ok(())
    }

    fn link_table(kind: LookupKind) -> StoreResult<(&'static str, &'static str)> {
        match kind {
            LookupKind::Topic => Ok(("lecture_topics", "topic_id")),
            LookupKind::Tag => Ok(("lecture_tags", "tag_id")),
            LookupKind::Rank => Err(StoreError::Validation(
                "ranks are referenced by column, not a junction table".to_string(),
            )),
        }
    }

    // =========================================================================
    // Lookup entities (topics, tags, ranks)
    // =========================================================================

    fn list_named(&self, kind: LookupKind) -> StoreResult<Vec<(i64, String)>> {
        self.with_read_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, name FROM {} ORDER BY name",
                kind.table()
            ))?;
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn create_named(&self, kind: LookupKind, name: &str) -> StoreResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_string()));
        }
        let conn = self.write_conn.lock().unwrap();
        Self::insert_named_row(&conn, kind, name)
    }

    fn rename_named(&self, kind: LookupKind, id: i64, name: &str) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_string()));
        }
        let conn = self.write_conn.lock().unwrap();
        let affected = conn.execute(
            &format!("UPDATE {} SET name = ?1 WHERE id = ?2", kind.table()),
            params![name, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(kind.singular()));
        }
        Ok(())
    }

    /// Delete a lookup entity. Not pre-checked: a RESTRICT foreign key
    /// rejects the delete while lectures still reference it, and that
    /// constraint failure is the error signal.
    fn delete_named(&self, kind: LookupKind, id: i64) -> StoreResult<()> {
        let conn = self.write_conn.lock().unwrap();
        let affected = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
            params![id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(kind.singular()));
        }
        Ok(())
    }

    pub fn list_topics(&self) -> StoreResult<Vec<Topic>> {
        Ok(self
            .list_named(LookupKind::Topic)?
            .into_iter()
            .map(|(id, name)| Topic { id, name })
            .collect())
    }

    pub fn create_topic(&self, name: &str) -> StoreResult<Topic> {
        let id = self.create_named(LookupKind::Topic, name)?;
        Ok(Topic {
            id,
            name: name.trim().to_string(),
        })
    }

    pub fn rename_topic(&self, id: i64, name: &str) -> StoreResult<()> {
        self.rename_named(LookupKind::Topic, id, name)
    }

    pub fn delete_topic(&self, id: i64) -> StoreResult<()> {
        self.delete_named(LookupKind::Topic, id)
    }

    pub fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        Ok(self
            .list_named(LookupKind::Tag)?
            .into_iter()
            .map(|(id, name)| Tag { id, name })
            .collect())
    }

    pub fn create_tag(&self, name: &str) -> StoreResult<Tag> {
        let id = self.create_named(LookupKind::Tag, name)?;
        Ok(Tag {
            id,
            name: name.trim().to_string(),
        })
    }

    pub fn rename_tag(&self, id: i64, name: &str) -> StoreResult<()> {
        self.rename_named(LookupKind::Tag, id, name)
    }

    pub fn delete_tag(&self, id: i64) -> StoreResult<()> {
        self.delete_named(LookupKind::Tag, id)
    }

    pub fn list_ranks(&self) -> StoreResult<Vec<Rank>> {
        Ok(self
            .list_named(LookupKind::Rank)?
            .into_iter()
            .map(|(id, name)| Rank { id, name })
            .collect())
    }

    pub fn create_rank(&self, name: &str) -> StoreResult<Rank> {
        let id = self.create_named(LookupKind::Rank, name)?;
        Ok(Rank {
            id,
            name: name.trim().to_string(),
        })
    }

    pub fn rename_rank(&self, id: i64, name: &str) -> StoreResult<()> {
        self.rename_named(LookupKind::Rank, id, name)
    }

    pub fn delete_rank(&self, id: i64) -> StoreResult<()> {
        self.delete_named(LookupKind::Rank, id)
    }

    // =========================================================================
    // Lectures
    // =========================================================================

    pub fn create_lecture(&self, new: &NewLecture) -> StoreResult<Lecture> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_string()));
        }
        if new.youtube_id.trim().is_empty() {
            return Err(StoreError::Validation(
                "youtube_id must not be empty".to_string(),
            ));
        }
        self.with_write_tx(|conn| {
            if Self::find_lecture_by_youtube(conn, &new.youtube_id)?.is_some() {
                return Err(StoreError::Validation(format!(
                    "a lecture with youtube_id {} already exists",
                    new.youtube_id
                )));
            }
            let id = Self::insert_lecture_row(conn, new)?;
            Ok(Lecture {
                id,
                title: new.title.clone(),
                youtube_id: new.youtube_id.clone(),
                thumbnail_url: new.thumbnail_url.clone(),
                publish_date: new.publish_date,
                duration_seconds: new.duration_seconds,
                rank_id: new.rank_id,
            })
        })
    }

    pub fn get_lecture(&self, id: i64) -> StoreResult<Option<Lecture>> {
        self.with_read_conn(|conn| Self::get_lecture_inner(conn, id))
    }

    pub fn get_lecture_by_youtube_id(&self, youtube_id: &str) -> StoreResult<Option<Lecture>> {
        self.with_read_conn(|conn| {
            match Self::find_lecture_by_youtube(conn, youtube_id)? {
                Some(id) => Self::get_lecture_inner(conn, id),
                None => Ok(None),
            }
        })
    }

    pub fn get_resolved_lecture(&self, id: i64) -> StoreResult<Option<ResolvedLecture>> {
        self.with_read_conn(|conn| match Self::get_lecture_inner(conn, id)? {
            Some(lecture) => Ok(Some(Self::resolve_lecture_inner(conn, lecture)?)),
            None => Ok(None),
        })
    }

    pub fn update_lecture(&self, id: i64, fields: &NewLecture) -> StoreResult<()> {
        if fields.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_string()));
        }
        self.with_write_tx(|conn| {
            if let Some(other) = Self::find_lecture_by_youtube(conn, &fields.youtube_id)? {
                if other != id {
                    return Err(StoreError::Validation(format!(
                        "a lecture with youtube_id {} already exists",
                        fields.youtube_id
                    )));
                }
            }
            let affected = conn.execute(
                "UPDATE lectures SET title = ?1, youtube_id = ?2, thumbnail_url = ?3,
                        publish_date = ?4, duration_seconds = ?5, rank_id = ?6
                 WHERE id = ?7",
                params![
                    fields.title,
                    fields.youtube_id,
                    fields.thumbnail_url,
                    format_timestamp(&fields.publish_date),
                    fields.duration_seconds,
                    fields.rank_id,
                    id,
                ],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound("lecture"));
            }
            Ok(())
        })
    }

    pub fn set_lecture_topics(&self, id: i64, topic_ids: &[i64]) -> StoreResult<()> {
        self.set_lecture_links(LookupKind::Topic, id, topic_ids)
    }

    pub fn set_lecture_tags(&self, id: i64, tag_ids: &[i64]) -> StoreResult<()> {
        self.set_lecture_links(LookupKind::Tag, id, tag_ids)
    }

    fn set_lecture_links(&self, kind: LookupKind, id: i64, other_ids: &[i64]) -> StoreResult<()> {
        let (table, _) = Self::link_table(kind)?;
        self.with_write_tx(|conn| {
            if Self::get_lecture_inner(conn, id)?.is_none() {
                return Err(StoreError::NotFound("lecture"));
            }
            conn.execute(
                &format!("DELETE FROM {} WHERE lecture_id = ?1", table),
                params![id],
            )?;
            for other_id in other_ids {
                Self::insert_lecture_link(conn, kind, id, *other_id)?;
            }
            Ok(())
        })
    }

    /// Synchronize a lecture's collection memberships to exactly the given
    /// set: removed from deselected collections, appended to new ones.
    pub fn set_lecture_collections(&self, id: i64, collection_ids: &[i64]) -> StoreResult<()> {
        self.with_write_tx(|conn| {
            if Self::get_lecture_inner(conn, id)?.is_none() {
                return Err(StoreError::NotFound("lecture"));
            }
            let current = Self::collection_ids_for_lecture_inner(conn, id)?;
            for collection_id in &current {
                if !collection_ids.contains(collection_id) {
                    positions::remove_lecture(conn, *collection_id, id)?;
                    Self::bump_revision(conn, *collection_id)?;
                }
            }
            for collection_id in collection_ids {
                if !current.contains(collection_id) {
                    positions::append_lectures(conn, *collection_id, &[id])?;
                    Self::bump_revision(conn, *collection_id)?;
                }
            }
            Ok(())
        })
    }

    /// Delete a lecture. Association rows go first (topic links, tag
    /// links, collection memberships), then the lecture row itself.
    pub fn delete_lecture(&self, id: i64) -> StoreResult<()> {
        self.with_write_tx(|conn| {
            conn.execute(
                "UPDATE collections SET revision = revision + 1 WHERE id IN
                 (SELECT collection_id FROM collection_lectures WHERE lecture_id = ?1)",
                params![id],
            )?;
            conn.execute(
                "DELETE FROM lecture_topics WHERE lecture_id = ?1",
                params![id],
            )?;
            conn.execute("DELETE FROM lecture_tags WHERE lecture_id = ?1", params![id])?;
            conn.execute(
                "DELETE FROM collection_lectures WHERE lecture_id = ?1",
                params![id],
            )?;
            let affected = conn.execute("DELETE FROM lectures WHERE id = ?1", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound("lecture"));
            }
            Ok(())
        })
    }

    fn collection_ids_for_lecture_inner(conn: &Connection, id: i64) -> StoreResult<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT collection_id FROM collection_lectures WHERE lecture_id = ?1
             ORDER BY collection_id",
        )?;
        let ids = stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn collection_ids_for_lecture(&self, id: i64) -> StoreResult<Vec<i64>> {
        self.with_read_conn(|conn| Self::collection_ids_for_lecture_inner(conn, id))
    }

    // =========================================================================
    // Search
    // =========================================================================

    pub fn search_lectures(&self, search: &SearchParams) -> StoreResult<SearchPage> {
        let page = search.page.max(1);
        let per_page = search.per_page.clamp(1, 100);

        let mut clauses: Vec<String> = Vec::new();
        let mut bindings: Vec<Value> = Vec::new();

        if let Some(query) = search.query.as_deref() {
            if !query.is_empty() {
                clauses.push("l.title LIKE ?".to_string());
                bindings.push(Value::from(format!("%{}%", query)));
            }
        }
        if !search.topic_ids.is_empty() {
            let placeholders = vec!["?"; search.topic_ids.len()].join(", ");
            clauses.push(format!(
                "l.id IN (SELECT lecture_id FROM lecture_topics WHERE topic_id IN ({}))",
                placeholders
            ));
            bindings.extend(search.topic_ids.iter().map(|id| Value::from(*id)));
        }
        if !search.tag_ids.is_empty() {
            let placeholders = vec!["?"; search.tag_ids.len()].join(", ");
            clauses.push(format!(
                "l.id IN (SELECT lecture_id FROM lecture_tags WHERE tag_id IN ({}))",
                placeholders
            ));
            bindings.extend(search.tag_ids.iter().map(|id| Value::from(*id)));
        }
        if let Some(rank_id) = search.rank_id {
            clauses.push("l.rank_id = ?".to_string());
            bindings.push(Value::from(rank_id));
        }
        if !search.include_gated {
            clauses.push(
                "l.id NOT IN (SELECT cl.lecture_id FROM collection_lectures cl
                 JOIN collections c ON c.id = cl.collection_id WHERE c.is_gated = 1)"
                    .to_string(),
            );
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        self.with_read_conn(|conn| {
            let count_sql = format!("SELECT COUNT(*) FROM lectures l{}", where_sql);
            let total: usize = conn.query_row(
                &count_sql,
                params_from_iter(bindings.iter()),
                |r| r.get::<_, i64>(0).map(|n| n as usize),
            )?;

            let page_sql = format!(
                "SELECT {} FROM lectures l{} ORDER BY l.publish_date DESC LIMIT ? OFFSET ?",
                Self::LECTURE_COLUMNS
                    .split(", ")
                    .map(|c| format!("l.{}", c))
                    .collect::<Vec<_>>()
                    .join(", "),
                where_sql
            );
            let mut page_bindings = bindings.clone();
            page_bindings.push(Value::from(per_page as i64));
            page_bindings.push(Value::from(((page - 1) * per_page) as i64));

            let mut stmt = conn.prepare(&page_sql)?;
            let rows = stmt
                .query_map(params_from_iter(page_bindings.iter()), Self::lecture_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let lectures = rows
                .into_iter()
                .map(|lecture| Self::resolve_lecture_inner(conn, lecture))
                .collect::<StoreResult<Vec<_>>>()?;

            let total_pages = total.div_ceil(per_page);
            Ok(SearchPage {
                lectures,
                total,
                current_page: page,
                total_pages,
                has_next: page < total_pages,
            })
        })
    }

    // =========================================================================
    // Collections
    // =========================================================================

    pub fn list_collections(&self, gated: Option<bool>) -> StoreResult<Vec<Collection>> {
        self.with_read_conn(|conn| {
            let (sql, filter): (String, Option<i64>) = match gated {
                Some(flag) => (
                    format!(
                        "SELECT {} FROM collections WHERE is_gated = ?1 ORDER BY name",
                        Self::COLLECTION_COLUMNS
                    ),
                    Some(flag as i64),
                ),
                None => (
                    format!(
                        "SELECT {} FROM collections ORDER BY name",
                        Self::COLLECTION_COLUMNS
                    ),
                    None,
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = match filter {
                Some(flag) => stmt
                    .query_map(params![flag], Self::collection_from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map([], Self::collection_from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })
    }

    pub fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
        is_gated: bool,
    ) -> StoreResult<Collection> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_string()));
        }
        let created_at = Utc::now();
        let conn = self.write_conn.lock().unwrap();
        let id = Self::insert_collection_row(&conn, name, description, is_gated, &created_at)?;
        Ok(Collection {
            id,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            is_gated,
            created_at,
            revision: 0,
        })
    }

    pub fn get_collection(&self, id: i64) -> StoreResult<Option<Collection>> {
        self.with_read_conn(|conn| Self::get_collection_inner(conn, id))
    }

    pub fn get_resolved_collection(&self, id: i64) -> StoreResult<Option<ResolvedCollection>> {
        self.with_read_conn(|conn| {
            let collection = match Self::get_collection_inner(conn, id)? {
                Some(c) => c,
                None => return Ok(None),
            };

            let mut entries = Vec::new();
            let mut total_duration_seconds = 0;
            for (lecture_id, position) in positions::member_positions(conn, id)? {
                let lecture = match Self::get_lecture_inner(conn, lecture_id)? {
                    Some(l) => l,
                    None => continue,
                };
                total_duration_seconds += lecture.duration_seconds.unwrap_or(0);
                entries.push(CollectionEntry {
                    position,
                    lecture: Self::resolve_lecture_inner(conn, lecture)?,
                });
            }

            Ok(Some(ResolvedCollection {
                collection,
                entries,
                total_duration_seconds,
            }))
        })
    }

    pub fn update_collection(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        is_gated: bool,
    ) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_string()));
        }
        let conn = self.write_conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE collections SET name = ?1, description = ?2, is_gated = ?3 WHERE id = ?4",
            params![name, description, is_gated as i64, id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound("collection"));
        }
        Ok(())
    }

    /// Delete a collection; membership rows go first.
    pub fn delete_collection(&self, id: i64) -> StoreResult<()> {
        self.with_write_tx(|conn| {
            conn.execute(
                "DELETE FROM collection_lectures WHERE collection_id = ?1",
                params![id],
            )?;
            let affected = conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
            if affected == 0 {
                return Err(StoreError::NotFound("collection"));
            }
            Ok(())
        })
    }

    // =========================================================================
    // Position mutations (revision-checked)
    // =========================================================================

    fn collection_revision(conn: &Connection, id: i64) -> StoreResult<Option<i64>> {
        let mut stmt = conn.prepare_cached("SELECT revision FROM collections WHERE id = ?1")?;
        match stmt.query_row(params![id], |r| r.get(0)) {
            Ok(revision) => Ok(Some(revision)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn bump_revision(conn: &Connection, id: i64) -> StoreResult<()> {
        conn.execute(
            "UPDATE collections SET revision = revision + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Run one position mutation under the optimistic-revision check. The
    /// closure reports whether it wrote anything; the revision only moves
    /// when it did.
    fn position_mutation<T>(
        &self,
        collection_id: i64,
        expected_revision: Option<i64>,
        f: impl FnOnce(&Connection) -> StoreResult<(T, bool)>,
    ) -> StoreResult<(T, i64)> {
        self.with_write_tx(|conn| {
            let revision = Self::collection_revision(conn, collection_id)?
                .ok_or(StoreError::NotFound("collection"))?;
            if let Some(expected) = expected_revision {
                if expected != revision {
                    return Err(StoreError::StaleRevision {
                        expected,
                        actual: revision,
                    });
                }
            }
            let (value, mutated) = f(conn)?;
            let new_revision = if mutated {
                Self::bump_revision(conn, collection_id)?;
                revision + 1
            } else {
                revision
            };
            Ok((value, new_revision))
        })
    }

    /// Bulk-add lectures to the end of a collection. Returns the new
    /// revision.
    pub fn append_to_collection(
        &self,
        collection_id: i64,
        lecture_ids: &[i64],
        expected_revision: Option<i64>,
    ) -> StoreResult<i64> {
        let (_, revision) = self.position_mutation(collection_id, expected_revision, |conn| {
            let added = positions::append_lectures(conn, collection_id, lecture_ids)?;
            Ok(((), added > 0))
        })?;
        Ok(revision)
    }

    pub fn move_in_collection(
        &self,
        collection_id: i64,
        lecture_id: i64,
        new_position: i64,
        expected_revision: Option<i64>,
    ) -> StoreResult<(MoveOutcome, i64)> {
        self.position_mutation(collection_id, expected_revision, |conn| {
            let outcome = positions::move_lecture(conn, collection_id, lecture_id, new_position)?;
            Ok((outcome, outcome == MoveOutcome::Moved))
        })
    }

    pub fn reorder_collection(
        &self,
        collection_id: i64,
        lecture_ids: &[i64],
        expected_revision: Option<i64>,
    ) -> StoreResult<i64> {
        let (_, revision) = self.position_mutation(collection_id, expected_revision, |conn| {
            positions::reorder(conn, collection_id, lecture_ids)?;
            Ok(((), true))
        })?;
        Ok(revision)
    }

    pub fn remove_from_collection(
        &self,
        collection_id: i64,
        lecture_id: i64,
        expected_revision: Option<i64>,
    ) -> StoreResult<i64> {
        let (_, revision) = self.position_mutation(collection_id, expected_revision, |conn| {
            let removed = positions::remove_lecture(conn, collection_id, lecture_id)?;
            Ok(((), removed))
        })?;
        Ok(revision)
    }

    pub fn ordered_collection_lecture_ids(&self, collection_id: i64) -> StoreResult<Vec<i64>> {
        self.with_read_conn(|conn| positions::ordered_lecture_ids(conn, collection_id))
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub fn counts(&self) -> StoreResult<CatalogCounts> {
        // During startup the read pool may not exist yet, so count over the
        // write connection.
        let conn = self.write_conn.lock().unwrap();
        let count = |table: &str| -> StoreResult<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })?;
            Ok(n as usize)
        };
        Ok(CatalogCounts {
            lectures: count("lectures")?,
            topics: count("topics")?,
            tags: count("tags")?,
            ranks: count("ranks")?,
            collections: count("collections")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (SqliteCatalogStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteCatalogStore::new(file.path(), 2).unwrap();
        (store, file)
    }

    fn sample_lecture(youtube_id: &str, title: &str) -> NewLecture {
        NewLecture {
            title: title.to_string(),
            youtube_id: youtube_id.to_string(),
            thumbnail_url: Some(format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", youtube_id)),
            publish_date: parse_timestamp("2024-03-01T12:00:00+00:00").unwrap(),
            duration_seconds: Some(600),
            rank_id: None,
        }
    }

    #[test]
    fn create_and_fetch_lecture() {
        let (store, _file) = test_store();
        let created = store
            .create_lecture(&sample_lecture("dQw4w9WgXcQ", "Opening principles"))
            .unwrap();

        let fetched = store.get_lecture(created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Opening principles");
        assert_eq!(fetched.youtube_id, "dQw4w9WgXcQ");

        let by_youtube = store
            .get_lecture_by_youtube_id("dQw4w9WgXcQ")
            .unwrap()
            .unwrap();
        assert_eq!(by_youtube.id, created.id);
    }

    #[test]
    fn duplicate_youtube_id_rejected() {
        let (store, _file) = test_store();
        store
            .create_lecture(&sample_lecture("dQw4w9WgXcQ", "first"))
            .unwrap();
        let err = store
            .create_lecture(&sample_lecture("dQw4w9WgXcQ", "second"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn referenced_rank_delete_fails_with_integrity_error() {
        let (store, _file) = test_store();
        let rank = store.create_rank("5k-1k").unwrap();
        let mut new = sample_lecture("dQw4w9WgXcQ", "Attack and defense");
        new.rank_id = Some(rank.id);
        store.create_lecture(&new).unwrap();

        let err = store.delete_rank(rank.id).unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn unreferenced_topic_delete_succeeds() {
        let (store, _file) = test_store();
        let topic = store.create_topic("joseki").unwrap();
        store.delete_topic(topic.id).unwrap();
        assert!(store.list_topics().unwrap().is_empty());
    }

    #[test]
    fn lecture_delete_cascades_association_rows() {
        let (store, _file) = test_store();
        let topic = store.create_topic("endgame").unwrap();
        let tag = store.create_tag("beginner-friendly").unwrap();
        let lecture = store
            .create_lecture(&sample_lecture("dQw4w9WgXcQ", "Counting"))
            .unwrap();
        store.set_lecture_topics(lecture.id, &[topic.id]).unwrap();
        store.set_lecture_tags(lecture.id, &[tag.id]).unwrap();
        let collection = store.create_collection("Basics", None, false).unwrap();
        store
            .append_to_collection(collection.id, &[lecture.id], None)
            .unwrap();

        store.delete_lecture(lecture.id).unwrap();

        // Association rows are gone, so the topic is deletable again
        store.delete_topic(topic.id).unwrap();
        store.delete_tag(tag.id).unwrap();
        assert!(store
            .ordered_collection_lecture_ids(collection.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn search_filters_and_paginates() {
        let (store, _file) = test_store();
        let topic = store.create_topic("fuseki").unwrap();
        for i in 0..12 {
            let lecture = store
                .create_lecture(&sample_lecture(
                    &format!("video-{:05}", i),
                    &format!("Fuseki lesson {}", i),
                ))
                .unwrap();
            if i % 2 == 0 {
                store.set_lecture_topics(lecture.id, &[topic.id]).unwrap();
            }
        }
        store
            .create_lecture(&sample_lecture("unrelated01", "Tesuji puzzle"))
            .unwrap();

        let page = store
            .search_lectures(&SearchParams {
                query: Some("fuseki".to_string()),
                per_page: 5,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.lectures.len(), 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);

        let filtered = store
            .search_lectures(&SearchParams {
                topic_ids: vec![topic.id],
                per_page: 50,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.total, 6);
    }

    #[test]
    fn search_excludes_gated_collections_when_asked() {
        let (store, _file) = test_store();
        let open_lecture = store
            .create_lecture(&sample_lecture("video-open01", "Open lecture"))
            .unwrap();
        let gated_lecture = store
            .create_lecture(&sample_lecture("video-gated1", "Gated lecture"))
            .unwrap();
        let gated = store.create_collection("Premium", None, true).unwrap();
        store
            .append_to_collection(gated.id, &[gated_lecture.id], None)
            .unwrap();

        let visible = store
            .search_lectures(&SearchParams {
                include_gated: false,
                per_page: 50,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<i64> = visible.lectures.iter().map(|l| l.lecture.id).collect();
        assert!(ids.contains(&open_lecture.id));
        assert!(!ids.contains(&gated_lecture.id));
    }

    #[test]
    fn stale_revision_is_rejected() {
        let (store, _file) = test_store();
        let collection = store.create_collection("Basics", None, false).unwrap();
        let l1 = store
            .create_lecture(&sample_lecture("video-00001", "one"))
            .unwrap();
        let l2 = store
            .create_lecture(&sample_lecture("video-00002", "two"))
            .unwrap();
        let revision = store
            .append_to_collection(collection.id, &[l1.id, l2.id], Some(0))
            .unwrap();
        assert_eq!(revision, 1);

        // A writer holding the old revision loses
        let err = store
            .reorder_collection(collection.id, &[l2.id, l1.id], Some(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleRevision { .. }));

        // And the current revision wins
        let revision = store
            .reorder_collection(collection.id, &[l2.id, l1.id], Some(revision))
            .unwrap();
        assert_eq!(revision, 2);
        assert_eq!(
            store.ordered_collection_lecture_ids(collection.id).unwrap(),
            vec![l2.id, l1.id]
        );
    }

    #[test]
    fn unchanged_move_does_not_bump_revision() {
        let (store, _file) = test_store();
        let collection = store.create_collection("Basics", None, false).unwrap();
        let l1 = store
            .create_lecture(&sample_lecture("video-00001", "one"))
            .unwrap();
        let revision = store
            .append_to_collection(collection.id, &[l1.id], None)
            .unwrap();

        let (outcome, new_revision) = store
            .move_in_collection(collection.id, l1.id, 0, None)
            .unwrap();
        assert_eq!(outcome, MoveOutcome::Unchanged);
        assert_eq!(new_revision, revision);
    }

    #[test]
    fn set_lecture_collections_syncs_memberships() {
        let (store, _file) = test_store();
        let a = store.create_collection("A", None, false).unwrap();
        let b = store.create_collection("B", None, false).unwrap();
        let lecture = store
            .create_lecture(&sample_lecture("video-00001", "one"))
            .unwrap();

        store.set_lecture_collections(lecture.id, &[a.id]).unwrap();
        assert_eq!(store.collection_ids_for_lecture(lecture.id).unwrap(), vec![a.id]);

        store.set_lecture_collections(lecture.id, &[b.id]).unwrap();
        assert_eq!(store.collection_ids_for_lecture(lecture.id).unwrap(), vec![b.id]);
        assert!(store.ordered_collection_lecture_ids(a.id).unwrap().is_empty());
    }

    #[test]
    fn resolved_collection_orders_and_sums_duration() {
        let (store, _file) = test_store();
        let collection = store.create_collection("Basics", None, false).unwrap();
        let mut first = sample_lecture("video-00001", "one");
        first.duration_seconds = Some(100);
        let mut second = sample_lecture("video-00002", "two");
        second.duration_seconds = Some(250);
        let l1 = store.create_lecture(&first).unwrap();
        let l2 = store.create_lecture(&second).unwrap();
        store
            .append_to_collection(collection.id, &[l2.id, l1.id], None)
            .unwrap();

        let resolved = store.get_resolved_collection(collection.id).unwrap().unwrap();
        assert_eq!(resolved.total_duration_seconds, 350);
        let ids: Vec<i64> = resolved.entries.iter().map(|e| e.lecture.lecture.id).collect();
        assert_eq!(ids, vec![l2.id, l1.id]);
    }
}
