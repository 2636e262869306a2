// src/error.rs
use crate::chat::ChatError;
use crate::llm::LlmError;
use crate::pipeline::PipelineError;
use crate::upload::UploadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session {0} not found")]
    SessionNotFound(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::SessionNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upload(e) => match e {
                UploadError::UnsupportedExtension { .. } | UploadError::MissingExtension(_) => {
                    StatusCode::UNSUPPORTED_MEDIA_TYPE
                }
                UploadError::EmptyFile(_) | UploadError::MissingFile | UploadError::Malformed(_) => {
                    StatusCode::BAD_REQUEST
                }
                UploadError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Pipeline(e) => match e {
                PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Cancelled => StatusCode::CONFLICT,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::Chat(e) => match e {
                ChatError::EmptyQuestion => StatusCode::BAD_REQUEST,
                ChatError::NoAnalysis => StatusCode::CONFLICT,
                ChatError::Assistant(LlmError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::Assistant(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = %status.as_u16(), error = %self, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
