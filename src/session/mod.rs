//! Capture/analysis session
//!
//! The session actor owns all mutable state: which state the session is in,
//! the selected media, the three feedback timelines and the capture
//! resources. Everything else talks to it through messages.

pub mod orchestrator;
pub mod state;
pub mod timeline;

pub use orchestrator::{SessionBuilder, SessionCommand};
pub use state::{Session, SessionEvent, SessionSnapshot, SessionState};
pub use timeline::{FeedbackTimeline, TimelineKind};

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::capture::CaptureError;

/// Errors returned by session actions
#[derive(Error, Debug)]
pub enum SessionError {
    /// Upload requested with nothing selected or recorded
    #[error("Please select or record a video file.")]
    NoMedia,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// The action is not legal in the current state
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },

    /// A newer action replaced this one before it completed
    #[error("Upload was cancelled")]
    Superseded,

    #[error("Session has shut down")]
    Closed,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NoMedia => "INPUT_ERROR",
            SessionError::Capture(e) => e.code(),
            SessionError::Analysis(e) => e.code(),
            SessionError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SessionError::Superseded => "SUPERSEDED",
            SessionError::Closed => "SESSION_CLOSED",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
