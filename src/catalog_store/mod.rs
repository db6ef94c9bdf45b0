mod error;
mod models;
pub(crate) mod positions;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
