//! Table-scoped export/import and the full reset.

use baduk_catalog_server::catalog_store::{NewLecture, SqliteCatalogStore};
use baduk_catalog_server::snapshot::{export_table, import_table, reset_catalog, TableKind};
use tempfile::NamedTempFile;

fn open_store() -> (SqliteCatalogStore, NamedTempFile) {
    let file = NamedTempFile::new().unwrap();
    let store = SqliteCatalogStore::new(file.path(), 2).unwrap();
    (store, file)
}

fn sample_lecture(youtube_id: &str, title: &str) -> NewLecture {
    NewLecture {
        title: title.to_string(),
        youtube_id: youtube_id.to_string(),
        thumbnail_url: None,
        publish_date: chrono::Utc::now(),
        duration_seconds: Some(300),
        rank_id: None,
    }
}

#[test]
fn export_table_wraps_rows_under_table_name() {
    let (store, _file) = open_store();
    store.create_topic("joseki").unwrap();
    store.create_topic("endgame").unwrap();

    let value = export_table(&store, TableKind::Topics).unwrap();
    let rows = value["topics"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|row| row["name"] == "joseki"));
}

#[test]
fn import_table_deduplicates_by_natural_key() {
    let (store, _file) = open_store();
    store.create_topic("joseki").unwrap();

    let payload = serde_json::json!({
        "topics": [
            {"id": 1, "name": "joseki"},
            {"id": 2, "name": "endgame"}
        ]
    });
    let stats = import_table(&store, TableKind::Topics, &payload, false).unwrap();
    assert_eq!(stats.imported, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(store.list_topics().unwrap().len(), 2);
}

#[test]
fn import_table_skips_bad_records_instead_of_failing() {
    let (store, _file) = open_store();

    let payload = serde_json::json!({
        "tags": [
            {"id": 1, "name": "beginner"},
            {"id": 2},
            {"wrong": "shape"}
        ]
    });
    let stats = import_table(&store, TableKind::Tags, &payload, false).unwrap();
    assert_eq!(stats.imported, 1);
    assert_eq!(stats.skipped, 2);
}

#[test]
fn replace_clears_target_and_dependents() {
    let (store, _file) = open_store();
    let topic = store.create_topic("joseki").unwrap();
    let lecture = store
        .create_lecture(&sample_lecture("video-aaaa01", "a"))
        .unwrap();
    store.set_lecture_topics(lecture.id, &[topic.id]).unwrap();

    let payload = serde_json::json!({"topics": [{"id": 9, "name": "shape"}]});
    let stats = import_table(&store, TableKind::Topics, &payload, true).unwrap();
    assert_eq!(stats.imported, 1);

    let topics = store.list_topics().unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].name, "shape");

    // The old topic's links went with it
    let resolved = store.get_resolved_lecture(lecture.id).unwrap().unwrap();
    assert!(resolved.topics.is_empty());
}

#[test]
fn membership_rows_import_with_positions() {
    let (store, _file) = open_store();
    let collection = store.create_collection("Basics", None, false).unwrap();
    let l1 = store
        .create_lecture(&sample_lecture("video-aaaa01", "a"))
        .unwrap();
    let l2 = store
        .create_lecture(&sample_lecture("video-bbbb02", "b"))
        .unwrap();

    let payload = serde_json::json!({
        "collection_lectures": [
            {"collection_id": collection.id, "lecture_id": l2.id, "position": 0},
            {"collection_id": collection.id, "lecture_id": l1.id, "position": 1},
            // Unknown lecture: skipped, not fatal
            {"collection_id": collection.id, "lecture_id": 999, "position": 2}
        ]
    });
    let stats = import_table(&store, TableKind::CollectionLectures, &payload, false).unwrap();
    assert_eq!(stats.imported, 2);
    assert_eq!(stats.skipped, 1);

    assert_eq!(
        store.ordered_collection_lecture_ids(collection.id).unwrap(),
        vec![l2.id, l1.id]
    );

    // Membership writes moved the collection's revision
    let collection = store.get_collection(collection.id).unwrap().unwrap();
    assert_eq!(collection.revision, 1);
}

#[test]
fn rank_replace_nulls_lecture_references() {
    let (store, _file) = open_store();
    let rank = store.create_rank("5k-1k").unwrap();
    let mut new = sample_lecture("video-aaaa01", "a");
    new.rank_id = Some(rank.id);
    let lecture = store.create_lecture(&new).unwrap();

    let payload = serde_json::json!({"ranks": [{"id": 1, "name": "dan"}]});
    import_table(&store, TableKind::Ranks, &payload, true).unwrap();

    let ranks = store.list_ranks().unwrap();
    assert_eq!(ranks.len(), 1);
    assert_eq!(ranks[0].name, "dan");
    assert!(store.get_lecture(lecture.id).unwrap().unwrap().rank_id.is_none());
}

#[test]
fn reset_returns_backup_and_empties_store() {
    let (store, _file) = open_store();
    store.create_topic("joseki").unwrap();
    let collection = store.create_collection("Basics", None, false).unwrap();
    let lecture = store
        .create_lecture(&sample_lecture("video-aaaa01", "a"))
        .unwrap();
    store
        .append_to_collection(collection.id, &[lecture.id], None)
        .unwrap();

    let backup = reset_catalog(&store).unwrap();
    assert_eq!(backup.topics.len(), 1);
    assert_eq!(backup.lectures.len(), 1);
    assert_eq!(backup.collections[0].lectures.as_ref().unwrap().len(), 1);

    let counts = store.counts().unwrap();
    assert_eq!(counts.topics, 0);
    assert_eq!(counts.lectures, 0);
    assert_eq!(counts.collections, 0);
}
