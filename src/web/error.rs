use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

use super::page;
use crate::pipeline::FeedbackError;
use crate::resume::ExtractError;

/// Lets handlers return `Result<T, AppError>`; failures render as an HTML page.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("No feedback audio has been generated yet.")]
    NoAudio,

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::NoAudio => StatusCode::NOT_FOUND,
            AppError::Feedback(error) => match error {
                FeedbackError::MissingInput
                | FeedbackError::UnsupportedFormat
                | FeedbackError::Extract(ExtractError::Pdf(_))
                | FeedbackError::Extract(ExtractError::Docx(_))
                | FeedbackError::Extract(ExtractError::NoText(_)) => StatusCode::BAD_REQUEST,
                FeedbackError::Extract(ExtractError::Io(_)) | FeedbackError::Render(_) => {
                    tracing::error!("Feedback failed: {error}");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                FeedbackError::Generate(_) => {
                    tracing::error!("Feedback generation failed: {error}");
                    StatusCode::BAD_GATEWAY
                }
            },
            AppError::Internal(error) => {
                tracing::error!("Internal error: {error:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Html(page::error(&self.to_string()))).into_response()
    }
}
