//! Analysis client error types.

use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No media was handed to a batch upload
    #[error("Please select or record a video file.")]
    NoMedia,

    #[error("Could not read media: {0}")]
    Media(#[from] std::io::Error),

    /// The request could not be built; nothing was sent
    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Network error: {0}")]
    Transport(reqwest::Error),

    /// Body was empty or not the expected JSON shape
    #[error("Server returned invalid JSON or empty response.")]
    Protocol { detail: String },

    /// Service answered with a non-success status
    #[error("{message}")]
    Service { status: u16, message: String },
}

impl AnalysisError {
    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        AnalysisError::Protocol {
            detail: detail.into(),
        }
    }

    /// Stable code for the presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::NoMedia => "INPUT_ERROR",
            AnalysisError::Media(_) => "MEDIA_ERROR",
            AnalysisError::Request(_) => "REQUEST_ERROR",
            AnalysisError::Transport(_) => "TRANSPORT_ERROR",
            AnalysisError::Protocol { .. } => "PROTOCOL_ERROR",
            AnalysisError::Service { .. } => "SERVICE_ERROR",
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            AnalysisError::Request(error.to_string())
        } else {
            AnalysisError::Transport(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_errors_are_not_transport_errors() {
        let error = reqwest::multipart::Part::bytes(Vec::new())
            .mime_str("video/webm;codecs=vp8,opus")
            .unwrap_err();
        let error = AnalysisError::from(error);

        assert!(matches!(error, AnalysisError::Request(_)));
        assert_eq!(error.code(), "REQUEST_ERROR");
    }
}
