use axum::extract::FromRef;

use super::ServerConfig;
use crate::catalog_store::SqliteCatalogStore;
use std::sync::Arc;
use std::time::Instant;

pub type GuardedCatalogStore = Arc<SqliteCatalogStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
