//! Remote analysis service
//!
//! Wraps the batch upload-and-analyze call, the single-frame call used by
//! live analysis, and the server push channel that reports progress while an
//! upload is being processed.

pub mod client;
pub mod error;
pub mod push;
pub mod types;

pub use client::{AnalysisClient, AnalysisService};
pub use error::{AnalysisError, AnalysisResult};
pub use push::{PushChannel, PushSubscription};
pub use types::{is_conforming, BatchAnalysis, FrameFeedback, Mode, FRAME_ERROR_MESSAGE, GOOD_POSTURE};
