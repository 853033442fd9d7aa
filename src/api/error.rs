use crate::services::pipeline::PipelineError;
use crate::services::reporter::{RejectionCategory, ResultReporter};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

const MALFORMED_UPLOAD: &str = "Malformed upload";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            tracing::debug!("Rejected multipart body: {}", e);
            AppError::BadRequest(MALFORMED_UPLOAD.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge => {
                // the request body outran the transport limit; same contract as a streamed overflow
                let (status, body) = ResultReporter::rejected(RejectionCategory::SizeExceeded, None);
                return (status, Json(body)).into_response();
            }
            AppError::Pipeline(PipelineError::ClientAborted) => {
                tracing::warn!("Upload body ended early; staged bytes purged");
                (StatusCode::BAD_REQUEST, MALFORMED_UPLOAD.to_string())
            }
            AppError::Pipeline(e) => {
                tracing::error!("Pipeline error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
