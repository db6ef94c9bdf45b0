//! Collection CRUD and the positioned-membership operations.
//!
//! Every position mutation takes an optional `revision`; when supplied it
//! must match the collection's current revision or the write is rejected
//! with 409. The response carries the new revision so a client can chain
//! edits without refetching.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::{MoveOutcome, StoreError};

#[derive(Deserialize, Debug)]
struct CollectionBody {
    name: String,
    description: Option<String>,
    #[serde(default)]
    is_gated: bool,
}

#[derive(Deserialize, Debug)]
struct ListQuery {
    gated: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct AppendBody {
    lecture_ids: Vec<i64>,
    revision: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct MoveBody {
    lecture_id: i64,
    new_position: i64,
    revision: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct ReorderBody {
    lecture_ids: Vec<i64>,
    revision: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct RevisionQuery {
    revision: Option<i64>,
}

#[derive(Serialize)]
struct RevisionResponse {
    revision: i64,
}

#[derive(Serialize)]
struct MoveResponse {
    outcome: MoveOutcome,
    revision: i64,
}

async fn list_collections(
    State(store): State<GuardedCatalogStore>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(store.list_collections(query.gated)?))
}

async fn create_collection(
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<CollectionBody>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(store.create_collection(
        &body.name,
        body.description.as_deref(),
        body.is_gated,
    )?))
}

async fn get_collection(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    match store.get_resolved_collection(id)? {
        Some(resolved) => Ok(Json(resolved).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn update_collection(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<CollectionBody>,
) -> Result<impl IntoResponse, StoreError> {
    store.update_collection(id, &body.name, body.description.as_deref(), body.is_gated)?;
    Ok(StatusCode::OK)
}

async fn delete_collection(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    store.delete_collection(id)?;
    Ok(StatusCode::OK)
}

async fn append_lectures(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<AppendBody>,
) -> Result<impl IntoResponse, StoreError> {
    let revision = store.append_to_collection(id, &body.lecture_ids, body.revision)?;
    Ok(Json(RevisionResponse { revision }))
}

async fn remove_lecture(
    State(store): State<GuardedCatalogStore>,
    Path((id, lecture_id)): Path<(i64, i64)>,
    Query(query): Query<RevisionQuery>,
) -> Result<impl IntoResponse, StoreError> {
    let revision = store.remove_from_collection(id, lecture_id, query.revision)?;
    Ok(Json(RevisionResponse { revision }))
}

async fn move_lecture(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<MoveBody>,
) -> Result<impl IntoResponse, StoreError> {
    let (outcome, revision) =
        store.move_in_collection(id, body.lecture_id, body.new_position, body.revision)?;
    Ok(Json(MoveResponse { outcome, revision }))
}

async fn reorder_lectures(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<ReorderBody>,
) -> Result<impl IntoResponse, StoreError> {
    let revision = store.reorder_collection(id, &body.lecture_ids, body.revision)?;
    Ok(Json(RevisionResponse { revision }))
}

pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/collections", get(list_collections))
        .route("/collections", post(create_collection))
        .route("/collections/{id}", get(get_collection))
        .route("/collections/{id}", put(update_collection))
        .route("/collections/{id}", delete(delete_collection))
        .route("/collections/{id}/lectures", post(append_lectures))
        .route(
            "/collections/{id}/lectures/{lecture_id}",
            delete(remove_lecture),
        )
        .route("/collections/{id}/move", post(move_lecture))
        .route("/collections/{id}/reorder", post(reorder_lectures))
        .with_state(state)
}
