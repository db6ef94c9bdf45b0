pub mod config;
mod http_layers;
pub mod state;

mod collection_routes;
mod error;
mod lecture_routes;
mod metadata_routes;
mod playlist_routes;
mod server;
mod snapshot_routes;

pub use config::ServerConfig;
pub use http_layers::{log_requests, RequestsLoggingLevel};
#[allow(unused_imports)] // Used by main.rs
pub use server::{make_app, run_server};

pub(crate) use error::external_error_response;
