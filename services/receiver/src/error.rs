//! Failure taxonomy for the upload path.
//!
//! Every variant is terminal for the request that produced it: it is counted
//! once in the statistics register and rendered as a JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while ingesting a single upload.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid Base64 data: {0}")]
    InvalidEncoding(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid image data: {0}")]
    DecodeFailure(String),

    #[error("Error saving image: {0}")]
    StorageFailure(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IngestError {
    /// HTTP status for this failure: 4xx for client faults, 500 otherwise.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) | Self::InvalidEncoding(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DecodeFailure(_) | Self::StorageFailure(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::InvalidEncoding(_) => "invalid_encoding",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::DecodeFailure(_) => "decode_failure",
            Self::StorageFailure(_) => "storage_failure",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// True when the caller sent something we could not accept.
    pub fn is_client_fault(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Error body returned to the device
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
