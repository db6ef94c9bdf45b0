//! Store-error to HTTP status mapping.

use crate::catalog_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::Validation(_) | StoreError::MembershipMismatch(_) => {
                StatusCode::BAD_REQUEST
            }
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::StaleRevision { .. } | StoreError::Integrity(_) => StatusCode::CONFLICT,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Store error: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// External-dependency failures (the video platform API) surface as 502
/// with the underlying message; no retry is attempted.
pub(crate) fn external_error_response(err: anyhow::Error) -> Response {
    error!("External dependency error: {:#}", err);
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "error": format!("{:#}", err) })),
    )
        .into_response()
}
