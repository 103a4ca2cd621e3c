//! Capture trait definitions
//!
//! Platform-agnostic seams between the capture controller and whatever
//! actually talks to the camera hardware and the media encoder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One decoded still from a live stream, packed RGB8
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Capture-related errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Webcam not supported on this device.")]
    DeviceUnavailable,

    #[error("Could not access webcam.")]
    PermissionDenied,

    #[error("A capture session is already acquired")]
    AlreadyAcquired,

    #[error("No active capture session")]
    NoActiveCapture,

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Stable code for the presentation layer
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::DeviceUnavailable | CaptureError::PermissionDenied => "DEVICE_ERROR",
            CaptureError::AlreadyAcquired | CaptureError::NoActiveCapture => "CAPTURE_STATE_ERROR",
            CaptureError::Encoder(_) | CaptureError::Io(_) => "RECORDING_ERROR",
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Anything that can hand out the most recent still image
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `None` when nothing has been decoded yet.
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// A live hardware video stream
#[async_trait]
pub trait VideoStream: FrameSource {
    /// Stream label
    fn label(&self) -> &str;

    /// Whether the recorder can produce this container/codec combination.
    fn supports_mime_type(&self, mime_type: &str) -> bool;

    /// Begin encoding the stream into `mime_type`.
    async fn start_encoder(&self, mime_type: &str) -> CaptureResult<Box<dyn MediaEncoder>>;

    /// Stop all underlying tracks. Must be idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// An in-progress recording of a [`VideoStream`]
#[async_trait]
pub trait MediaEncoder: Send {
    fn mime_type(&self) -> &str;

    /// Flush any buffered-but-undelivered data.
    async fn request_data(&mut self) -> CaptureResult<Vec<u8>>;

    /// Finalize the container and return the remaining bytes.
    async fn finish(&mut self) -> CaptureResult<Vec<u8>>;
}

/// A source of camera streams
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Whether this platform can capture video at all.
    fn is_available(&self) -> bool;

    /// Open the camera. Fails with [`CaptureError::PermissionDenied`] when
    /// access is refused.
    async fn open(&self) -> CaptureResult<Arc<dyn VideoStream>>;

    /// Enumerate cameras
    fn cameras(&self) -> Vec<CameraInfo> {
        Vec::new()
    }
}
