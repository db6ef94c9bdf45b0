//! Snapshot export/import endpoints, table-scoped transfer, and the
//! export-then-clear reset.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::StoreError;
use crate::snapshot::{
    export_snapshot, export_table, import_snapshot, import_table, reset_catalog, Snapshot,
    TableKind,
};

const EXPORT_DISPOSITION: (header::HeaderName, &str) = (
    header::CONTENT_DISPOSITION,
    "attachment; filename=\"baduk_lectures_export.json\"",
);

const BACKUP_DISPOSITION: (header::HeaderName, &str) = (
    header::CONTENT_DISPOSITION,
    "attachment; filename=\"baduk_lectures_backup.json\"",
);

async fn export(
    State(store): State<GuardedCatalogStore>,
) -> Result<impl IntoResponse, StoreError> {
    let snapshot = export_snapshot(&store)?;
    Ok(([EXPORT_DISPOSITION], Json(snapshot)))
}

async fn import(
    State(store): State<GuardedCatalogStore>,
    Json(snapshot): Json<Snapshot>,
) -> Result<impl IntoResponse, StoreError> {
    let stats = import_snapshot(&store, &snapshot)?;
    Ok(Json(stats))
}

fn table_kind(name: &str) -> Result<TableKind, StoreError> {
    TableKind::from_name(name)
        .ok_or_else(|| StoreError::Validation(format!("unknown table: {}", name)))
}

async fn export_one_table(
    State(store): State<GuardedCatalogStore>,
    Path(table): Path<String>,
) -> Result<impl IntoResponse, StoreError> {
    let kind = table_kind(&table)?;
    Ok(Json(export_table(&store, kind)?))
}

#[derive(Deserialize, Debug)]
struct ImportTableQuery {
    #[serde(default)]
    replace: bool,
}

async fn import_one_table(
    State(store): State<GuardedCatalogStore>,
    Path(table): Path<String>,
    Query(query): Query<ImportTableQuery>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, StoreError> {
    let kind = table_kind(&table)?;
    let stats = import_table(&store, kind, &payload, query.replace)?;
    Ok(Json(stats))
}

/// Clear the whole catalog. The response body is the snapshot of
/// everything that was deleted, as the backup.
async fn reset(State(store): State<GuardedCatalogStore>) -> Result<impl IntoResponse, StoreError> {
    let backup = reset_catalog(&store)?;
    Ok((StatusCode::OK, [BACKUP_DISPOSITION], Json(backup)))
}

pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/export", get(export))
        .route("/import", post(import))
        .route("/export/{table}", get(export_one_table))
        .route("/import/{table}", post(import_one_table))
        .route("/reset", post(reset))
        .with_state(state)
}
