use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Client input error, user-correctable.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired session.
    #[error("Not authenticated")]
    Authentication,

    /// Login with an unknown username or wrong password.
    #[error("Invalid username or password.")]
    InvalidCredentials,

    /// Resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// Bootstrap already completed.
    #[error("{0}")]
    Conflict(String),

    /// Page index outside the archive's image entries.
    #[error("Page {0} out of range")]
    OutOfRange(usize),

    /// Archive has no image entries to use.
    #[error("No image entries found in {0}")]
    NoImages(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Image processing error.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) | AppError::OutOfRange(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // 5xx detail stays server-side; the client gets a generic message.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request error");
            "An unexpected error occurred.".to_string()
        } else {
            tracing::debug!(error = %self, "Request rejected");
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
