//! Error types for the OmniPage server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::engine::EngineError;
use crate::ocr::OcrError;
use crate::staging::StorageError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Request-level error
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Malformed JSON, base64 or multipart payload
    #[error("{0}")]
    Decode(String),

    #[error("Content-Type: \"{0}\" not supported")]
    UnsupportedMedia(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Ocr(OcrError::Engine(err))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedMedia(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match &self {
            AppError::UnsupportedMedia(content_type) => {
                tracing::warn!(content_type = %content_type, "Rejected request");
            }
            _ => tracing::error!(error = %message, "Request failed"),
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}
