use axum::{extract::multipart::MultipartError, http::StatusCode};
use thiserror::Error;

pub const INVALID_TYPE_MESSAGE: &str =
    "Invalid file type. Please upload an image (PNG, JPG, GIF, BMP, WebP).";
pub const MODEL_UNAVAILABLE_MESSAGE: &str = "Model failed to load. Please try again later.";
pub const PREDICTION_FAILED_MESSAGE: &str =
    "An error occurred during prediction. Please try again.";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("file extension not allowed: {0}")]
    InvalidExtension(String),
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Malformed multipart request: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Model is not loaded")]
    ModelUnavailable,
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Storing upload failed: {0}")]
    Storage(#[from] std::io::Error),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::Validation(ValidationError::InvalidExtension(_)) => {
                StatusCode::BAD_REQUEST
            }
            PredictError::Validation(ValidationError::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            PredictError::Multipart(err) => err.status(),
            PredictError::ModelUnavailable
            | PredictError::Decode(_)
            | PredictError::Inference(_)
            | PredictError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client, never carries internal detail.
    pub fn user_message(&self) -> String {
        match self {
            PredictError::Validation(ValidationError::InvalidExtension(_)) => {
                INVALID_TYPE_MESSAGE.to_string()
            }
            PredictError::Validation(ValidationError::TooLarge { limit, .. }) => format!(
                "File too large. The maximum upload size is {} MB.",
                limit / (1024 * 1024)
            ),
            PredictError::Multipart(_) => "Bad request".to_string(),
            PredictError::ModelUnavailable => MODEL_UNAVAILABLE_MESSAGE.to_string(),
            PredictError::Decode(_) | PredictError::Inference(_) | PredictError::Storage(_) => {
                PREDICTION_FAILED_MESSAGE.to_string()
            }
        }
    }

    /// Label used for the failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::Validation(_) => "validation",
            PredictError::Multipart(_) => "multipart",
            PredictError::ModelUnavailable => "model_unavailable",
            PredictError::Decode(_) => "decode",
            PredictError::Inference(_) => "inference",
            PredictError::Storage(_) => "storage",
        }
    }
}
