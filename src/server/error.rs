//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; the status comes from
//! [`streamgate_common::Error::http_status`].

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use streamgate_common::Error;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<streamgate_codec::Error> for AppError {
    fn from(e: streamgate_codec::Error) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "Server error in handler");
        } else {
            tracing::debug!(status = %status, error = %self.0, "Request rejected");
        }

        let body = json!({
            "error": self.0.to_string(),
            "code": self.0.code(),
        });

        match &self.0 {
            Error::RangeNotSatisfiable { size } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                axum::Json(body),
            )
                .into_response(),
            _ => (status, axum::Json(body)).into_response(),
        }
    }
}
