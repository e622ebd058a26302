//! HTTP error responses.
//!
//! Every error renders as `{"error": "<message>"}` with the matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::Md2PdfError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("File too large")]
    PayloadTooLarge,

    /// The converter ran (or tried to) and did not produce a PDF.
    #[error("{0}")]
    Conversion(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Conversion(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map an extractor rejection: oversized bodies keep their 413, anything
    /// else becomes a 400 with `message`.
    pub fn from_rejection(status: StatusCode, message: &str) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(message.to_string())
        }
    }
}

impl From<Md2PdfError> for ApiError {
    fn from(err: Md2PdfError) -> Self {
        match err {
            Md2PdfError::InvalidParams(_)
            | Md2PdfError::MissingField { .. }
            | Md2PdfError::UnsupportedFileType { .. }
            | Md2PdfError::InvalidFilename(_) => ApiError::BadRequest(err.to_string()),
            Md2PdfError::InputNotFound { .. } => ApiError::NotFound(err.to_string()),
            Md2PdfError::DirectoryUnavailable { .. }
            | Md2PdfError::UploadWriteFailed { .. }
            | Md2PdfError::InvalidConfig(_)
            | Md2PdfError::Internal(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
