//! Webcam capture
//!
//! The capture controller owns camera acquisition and recording; devices
//! plug in through the traits in [`traits`].

pub mod controller;
pub mod traits;
pub mod virtual_camera;

#[cfg(feature = "native-camera")]
pub mod native;

pub use controller::{
    CaptureController, CaptureSession, CaptureWarning, PreviewSink, RecordingHandle,
    RecordingOutcome,
};
pub use traits::{
    CameraInfo, CaptureDevice, CaptureError, CaptureResult, FrameSource, MediaEncoder, Resolution,
    VideoFrame, VideoStream,
};
pub use virtual_camera::VirtualCamera;
