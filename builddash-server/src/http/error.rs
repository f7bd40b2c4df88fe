//! API error type with IntoResponse
//!
//! Every [`DashError`] becomes a JSON body `{ "error": code, "message": text }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::DashError;

#[derive(Debug)]
pub struct ApiError(pub DashError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DashError::UnknownBackend(_) | DashError::UnknownTable { .. } | DashError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            DashError::DuplicateName(_) | DashError::Validation(_) => StatusCode::BAD_REQUEST,
            DashError::BackendUnavailable { .. } | DashError::PoolExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DashError::QueryFailed(_)
            | DashError::Storage(_)
            | DashError::Config(_)
            | DashError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            // Backend text is returned verbatim so query authors can fix their SQL
            DashError::QueryFailed(msg) => {
                tracing::warn!(error = %msg, "Query failed");
                msg.clone()
            }
            DashError::Storage(_) | DashError::Config(_) | DashError::Io(_) => {
                tracing::error!(error = %self.0, "Internal error");
                "an internal error occurred".to_string()
            }
            DashError::BackendUnavailable { .. } | DashError::PoolExhausted { .. } => {
                tracing::warn!(error = %self.0, "Backend not serving");
                self.0.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": self.0.code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

impl From<DashError> for ApiError {
    fn from(e: DashError) -> Self {
        Self(e)
    }
}
