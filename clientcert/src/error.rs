//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clientcert_lib::ClientCertError;

pub const MISSING_ISSUER_FIELDS: &str = "Missing certificate or issuer information";
pub const MISSING_CA_FIELDS: &str = "Missing certificate or CA certificates";
pub const INTERNAL_ERROR: &str = "Internal server error during validation";
pub const BODY_TOO_LARGE: &str = "Request body too large";

/// Failure of a validation endpoint. A certificate that fails validation is
/// not an error; it is a `200` with `valid: false`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("validation could not run: {0}")]
    Validation(#[from] ClientCertError),

    #[error("validation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, *message),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE),
            ApiError::Validation(_) | ApiError::Worker(_) => {
                tracing::error!(error = %self, "validation request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
