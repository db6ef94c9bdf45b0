use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use super::state::{GuardedCatalogStore, ServerState};
use super::{
    collection_routes, lecture_routes, log_requests, metadata_routes, playlist_routes,
    snapshot_routes, ServerConfig,
};
use crate::catalog_store::{SearchParams, SqliteCatalogStore, StoreError};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn status(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    q: Option<String>,
    /// Comma-separated topic IDs.
    topics: Option<String>,
    /// Comma-separated tag IDs.
    tags: Option<String>,
    rank: Option<i64>,
    page: Option<usize>,
    per_page: Option<usize>,
    include_gated: Option<bool>,
}

fn parse_id_list(raw: &Option<String>) -> Vec<i64> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

async fn search(
    State(state): State<ServerState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, StoreError> {
    let params = SearchParams {
        query: query.q,
        topic_ids: parse_id_list(&query.topics),
        tag_ids: parse_id_list(&query.tags),
        rank_id: query.rank,
        include_gated: query.include_gated.unwrap_or(false),
        page: query.page.unwrap_or(1),
        per_page: query
            .per_page
            .unwrap_or(state.config.default_page_size)
            .min(state.config.max_page_size),
    };
    let page = state.catalog_store.search_lectures(&params)?;
    Ok(Json(page))
}

#[derive(Serialize)]
struct MetadataResponse {
    topics: Vec<crate::catalog_store::Topic>,
    tags: Vec<crate::catalog_store::Tag>,
    ranks: Vec<crate::catalog_store::Rank>,
    collections: Vec<crate::catalog_store::Collection>,
}

/// Everything the admin forms need to populate their dropdowns.
async fn metadata(
    State(store): State<GuardedCatalogStore>,
) -> Result<impl IntoResponse, StoreError> {
    Ok(Json(MetadataResponse {
        topics: store.list_topics()?,
        tags: store.list_tags()?,
        ranks: store.list_ranks()?,
        collections: store.list_collections(None)?,
    }))
}

pub fn make_app(config: ServerConfig, catalog_store: Arc<SqliteCatalogStore>) -> Router {
    let frontend_dir_path = config.frontend_dir_path.clone();
    let state = ServerState {
        config,
        start_time: Instant::now(),
        catalog_store,
        hash: env!("GIT_HASH").to_string(),
    };

    let api_routes: Router = Router::new()
        .route("/status", get(status))
        .route("/search", get(search))
        .route("/metadata", get(metadata))
        .with_state(state.clone())
        .merge(metadata_routes::routes(state.clone()))
        .merge(lecture_routes::routes(state.clone()))
        .merge(collection_routes::routes(state.clone()))
        .merge(snapshot_routes::routes(state.clone()))
        .merge(playlist_routes::routes(state.clone()));

    let mut app = Router::new().nest("/api", api_routes);

    if let Some(frontend_path) = frontend_dir_path {
        let static_files_service =
            ServeDir::new(frontend_path).append_index_html_on_directories(true);
        app = app.fallback_service(static_files_service);
    }

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(catalog_store: Arc<SqliteCatalogStore>, config: ServerConfig) -> Result<()> {
    let port = config.port;
    let app = make_app(config, catalog_store);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(3661)), "0d 01:01:01");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[test]
    fn id_list_parsing() {
        assert_eq!(parse_id_list(&Some("1,2,3".to_string())), vec![1, 2, 3]);
        assert_eq!(parse_id_list(&Some(" 4 , x, 5".to_string())), vec![4, 5]);
        assert!(parse_id_list(&None).is_empty());
        assert!(parse_id_list(&Some(String::new())).is_empty());
    }
}
