//! Error types and handling
//!
//! Common error types used across the application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::capture::CaptureError;
use crate::session::SessionError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Error response for the presentation layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Analysis(e) => e.code(),
            AppError::Capture(e) => e.code(),
            AppError::Session(e) => e.code(),
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_keep_user_message() {
        let response = ErrorResponse::from(AppError::from(SessionError::NoMedia));
        assert_eq!(response.code, "INPUT_ERROR");
        assert_eq!(response.message, "Please select or record a video file.");
    }

    #[test]
    fn test_nested_codes() {
        let error = AppError::from(SessionError::from(CaptureError::PermissionDenied));
        let response = ErrorResponse::from(error);
        assert_eq!(response.code, "DEVICE_ERROR");
        assert_eq!(response.message, "Could not access webcam.");

        let response = ErrorResponse::from(AppError::from(AnalysisError::Service {
            status: 500,
            message: "Upload failed".to_string(),
        }));
        assert_eq!(response.code, "SERVICE_ERROR");
    }

    #[test]
    fn test_local_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let response = ErrorResponse::from(AppError::from(io));
        assert_eq!(response.code, "IO_ERROR");
        assert_eq!(response.message, "IO error: read-only");

        let serde = serde_json::from_str::<u32>("x").unwrap_err();
        let response = ErrorResponse::from(AppError::from(serde));
        assert_eq!(response.code, "SERIALIZATION_ERROR");
    }
}
