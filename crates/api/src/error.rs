use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] so handlers and extractors can return it
/// directly. Bodies use the `{"message": ...}` shape clients already parse.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or wrong access token.
    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };

        (status, axum::Json(json!({ "message": message }))).into_response()
    }
}
