use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use image::ImageError;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;
use uuid::Uuid;

use crate::{codec::DecodeError, interpreter::EngineError};

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    InvalidMedia(#[from] DecodeError),
    #[error("invalid or missing api key")]
    Unauthorized,
    #[error(transparent)]
    Inference(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Worker(#[from] JoinError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidMedia(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable identifier for the failure class.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) | AppError::Multipart(_) => "bad_request",
            AppError::InvalidMedia(_) => "invalid_media",
            AppError::Unauthorized => "unauthorized",
            AppError::Inference(_) => "inference_failed",
            AppError::Io(_) | AppError::Image(_) | AppError::Worker(_) => "internal_error",
        }
    }

    /// The message clients get to see. Server-side failures stay generic; the
    /// details only go to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(message) => message.clone(),
            AppError::InvalidMedia(DecodeError::Base64(_)) => "Payload is not valid base64".into(),
            AppError::InvalidMedia(DecodeError::Image(_)) => "Payload is not a decodable image".into(),
            AppError::Multipart(_) => "Malformed multipart body".into(),
            AppError::Unauthorized => "Unauthorized".into(),
            AppError::Inference(_) => "Inference failed".into(),
            AppError::Io(_) | AppError::Image(_) | AppError::Worker(_) => {
                "Internal server error".into()
            }
        }
    }
}

// This centralizes all the error responses of the service in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let id = Uuid::new_v4();
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error_id = %id, error = ?self, "request failed");
        } else {
            tracing::debug!(error_id = %id, error = %self, "request rejected");
        }

        let body = json!({
            "code": self.code(),
            "error": self.public_message(),
            "error_id": id.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
