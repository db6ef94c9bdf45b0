//! CRUD for the named lookup entities (topics, tags, ranks).
//!
//! Deletes are not pre-checked; the store's referential-integrity failure
//! comes back as 409 with the constraint message.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::state::{GuardedCatalogStore, ServerState};
use crate::catalog_store::StoreError;

#[derive(Deserialize, Debug)]
struct NameBody {
    name: String,
}

async fn create_topic(
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(store.create_topic(&body.name)?))
}

async fn rename_topic(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    store.rename_topic(id, &body.name)?;
    Ok(StatusCode::OK)
}

async fn delete_topic(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    store.delete_topic(id)?;
    Ok(StatusCode::OK)
}

async fn create_tag(
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(store.create_tag(&body.name)?))
}

async fn rename_tag(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    store.rename_tag(id, &body.name)?;
    Ok(StatusCode::OK)
}

async fn delete_tag(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    store.delete_tag(id)?;
    Ok(StatusCode::OK)
}

async fn create_rank(
    State(store): State<GuardedCatalogStore>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(store.create_rank(&body.name)?))
}

async fn rename_rank(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse, StoreError> {
    store.rename_rank(id, &body.name)?;
    Ok(StatusCode::OK)
}

async fn delete_rank(
    State(store): State<GuardedCatalogStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, StoreError> {
    store.delete_rank(id)?;
    Ok(StatusCode::OK)
}

pub fn routes(state: ServerState) -> Router {
    Router::new()
        .route("/topics", post(create_topic))
        .route("/topics/{id}", put(rename_topic))
        .route("/topics/{id}", delete(delete_topic))
        .route("/tags", post(create_tag))
        .route("/tags/{id}", put(rename_tag))
        .route("/tags/{id}", delete(delete_tag))
        .route("/ranks", post(create_rank))
        .route("/ranks/{id}", put(rename_rank))
        .route("/ranks/{id}", delete(delete_rank))
        .with_state(state)
}
