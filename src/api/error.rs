//! API error types with JSON responses.
//!
//! Every failure renders as `{"error": "<message>"}`. Internal failures are
//! logged with their detail and reported to the client generically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::pipeline::import::ImportError;
use crate::pipeline::ingest::IngestError;
use crate::pipeline::parsers::ParseError;
use crate::pipeline::processor::ProcessError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ApiError::UnsupportedMediaType(detail) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, detail.clone())
            }
            ApiError::NotImplemented(detail) => (StatusCode::NOT_IMPLEMENTED, detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Parse(e @ ParseError::UnsupportedFormat(_)) => {
                ApiError::UnsupportedMediaType(e.to_string())
            }
            ProcessError::Parse(e @ ParseError::MalformedInput { .. }) => {
                ApiError::BadRequest(e.to_string())
            }
            ProcessError::DeferredExtraction(deferred) => {
                ApiError::NotImplemented(deferred.explanation())
            }
            ProcessError::Ingest(e) => e.into(),
            ProcessError::Import(ImportError::EmptyUpload) => {
                ApiError::BadRequest(ImportError::EmptyUpload.to_string())
            }
            ProcessError::Import(e @ ImportError::Io(_)) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::PatientNotFound(_) => ApiError::NotFound(err.to_string()),
            IngestError::Persistence { .. } | IngestError::Cancelled => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
