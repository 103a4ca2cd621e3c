//! Capture controller
//!
//! Owns webcam acquisition/release and the record start/stop lifecycle.
//! Acquisition is exclusive: there is at most one outstanding
//! [`CaptureSession`] at a time.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::traits::{CameraInfo, CaptureDevice, CaptureError, CaptureResult, MediaEncoder, VideoStream};
use crate::media::MediaArtifact;

/// Preferred recorder output
pub const PREFERRED_MIME_TYPE: &str = "video/webm;codecs=vp8,opus";

/// Used when the preferred codec string is not supported
pub const FALLBACK_MIME_TYPE: &str = "video/webm";

/// File name given to every webcam recording
pub const RECORDING_FILE_NAME: &str = "webcam_recording.webm";

/// Recordings shorter than this produce a warning
pub const MIN_RECORDING_DURATION: Duration = Duration::from_secs(1);

/// Non-fatal conditions reported when a recording finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureWarning {
    /// Recording stopped before [`MIN_RECORDING_DURATION`]; the artifact is
    /// still produced.
    RecordingTooShort { duration: Duration },
}

impl fmt::Display for CaptureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureWarning::RecordingTooShort { .. } => {
                f.write_str("Recording was too short. Please record for at least 2 seconds.")
            }
        }
    }
}

/// Live-preview slot the presentation layer reads from
#[derive(Clone, Default)]
pub struct PreviewSink {
    stream: Arc<RwLock<Option<Arc<dyn VideoStream>>>>,
}

impl PreviewSink {
    pub fn bind(&self, stream: Arc<dyn VideoStream>) {
        *self.stream.write() = Some(stream);
    }

    pub fn unbind(&self) {
        *self.stream.write() = None;
    }

    pub fn current(&self) -> Option<Arc<dyn VideoStream>> {
        self.stream.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.stream.read().is_some()
    }
}

/// An acquired camera stream.
///
/// Clones share the same release flag, so releasing any clone releases all
/// of them.
#[derive(Clone)]
pub struct CaptureSession {
    id: Uuid,
    stream: Arc<dyn VideoStream>,
    released: Arc<AtomicBool>,
}

impl CaptureSession {
    fn new(stream: Arc<dyn VideoStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream(&self) -> Arc<dyn VideoStream> {
        self.stream.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("stream", &self.stream.label())
            .field("released", &self.is_released())
            .finish()
    }
}

/// An in-progress recording bound to its capture session
pub struct RecordingHandle {
    session: CaptureSession,
    encoder: Box<dyn MediaEncoder>,
    chunks: Vec<Vec<u8>>,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

impl fmt::Debug for RecordingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingHandle")
            .field("session", &self.session)
            .field("mime_type", &self.encoder.mime_type())
            .field("chunks", &self.chunks.len())
            .field("started_at_utc", &self.started_at_utc)
            .finish()
    }
}

impl RecordingHandle {
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn mime_type(&self) -> &str {
        self.encoder.mime_type()
    }
}

/// What `stop_recording` produces
#[derive(Debug, Clone)]
pub struct RecordingOutcome {
    pub artifact: MediaArtifact,
    pub warning: Option<CaptureWarning>,
}

/// Exclusive owner of the camera
pub struct CaptureController {
    device: Arc<dyn CaptureDevice>,
    preview: PreviewSink,
    outstanding: Option<Uuid>,
    acquire_count: u64,
    release_count: u64,
}

impl CaptureController {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            preview: PreviewSink::default(),
            outstanding: None,
            acquire_count: 0,
            release_count: 0,
        }
    }

    /// Share the preview slot with the presentation layer
    pub fn preview(&self) -> PreviewSink {
        self.preview.clone()
    }

    pub fn cameras(&self) -> Vec<CameraInfo> {
        self.device.cameras()
    }

    pub fn is_acquired(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Number of successful acquisitions so far
    pub fn acquire_count(&self) -> u64 {
        self.acquire_count
    }

    /// Number of effective releases so far
    pub fn release_count(&self) -> u64 {
        self.release_count
    }

    /// Request camera access and bind the stream to the preview sink.
    pub async fn acquire(&mut self) -> CaptureResult<CaptureSession> {
        if self.outstanding.is_some() {
            return Err(CaptureError::AlreadyAcquired);
        }
        if !self.device.is_available() {
            tracing::warn!("No capture device available");
            return Err(CaptureError::DeviceUnavailable);
        }

        let stream = self.device.open().await?;
        let session = CaptureSession::new(stream.clone());

        self.outstanding = Some(session.id);
        self.acquire_count += 1;
        self.preview.bind(stream);

        tracing::info!("Capture session {} acquired ({})", session.id, session.stream.label());
        Ok(session)
    }

    /// Stop every track of the session. Safe to call more than once.
    pub fn release(&mut self, session: &CaptureSession) {
        if session.released.swap(true, Ordering::SeqCst) {
            return;
        }

        session.stream.stop();
        self.release_count += 1;

        if self.outstanding == Some(session.id) {
            self.outstanding = None;
            self.preview.unbind();
        }

        tracing::info!("Capture session {} released", session.id);
    }

    /// Start buffering encoded media from an acquired session.
    pub async fn start_recording(&self, session: &CaptureSession) -> CaptureResult<RecordingHandle> {
        if session.is_released() || self.outstanding != Some(session.id) {
            return Err(CaptureError::NoActiveCapture);
        }

        let mime_type = if session.stream.supports_mime_type(PREFERRED_MIME_TYPE) {
            PREFERRED_MIME_TYPE
        } else {
            FALLBACK_MIME_TYPE
        };

        let encoder = session.stream.start_encoder(mime_type).await?;
        tracing::info!("Recording started ({})", encoder.mime_type());

        Ok(RecordingHandle {
            session: session.clone(),
            encoder,
            chunks: Vec::new(),
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        })
    }

    /// Flush and finalize a recording.
    ///
    /// The owning capture session is released on every exit path, including
    /// encoder failures.
    pub async fn stop_recording(&mut self, handle: RecordingHandle) -> CaptureResult<RecordingOutcome> {
        let RecordingHandle {
            session,
            mut encoder,
            mut chunks,
            started_at,
            started_at_utc,
        } = handle;

        let duration = started_at.elapsed();
        let finished = finalize(encoder.as_mut(), &mut chunks).await;
        self.release(&session);
        finished?;

        let data: Vec<u8> = chunks.concat();
        let warning = (duration < MIN_RECORDING_DURATION)
            .then_some(CaptureWarning::RecordingTooShort { duration });
        if let Some(warning) = &warning {
            tracing::warn!("{} ({:?})", warning, duration);
        }

        tracing::info!(
            "Recording stopped. Duration: {}ms, {} bytes",
            duration.as_millis(),
            data.len()
        );

        Ok(RecordingOutcome {
            artifact: MediaArtifact {
                id: Uuid::new_v4(),
                file_name: RECORDING_FILE_NAME.to_string(),
                mime_type: encoder.mime_type().to_string(),
                data: Arc::new(data),
                duration,
                recorded_at: started_at_utc,
            },
            warning,
        })
    }
}

async fn finalize(encoder: &mut dyn MediaEncoder, chunks: &mut Vec<Vec<u8>>) -> CaptureResult<()> {
    let pending = encoder.request_data().await?;
    if !pending.is_empty() {
        chunks.push(pending);
    }
    let tail = encoder.finish().await?;
    if !tail.is_empty() {
        chunks.push(tail);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::virtual_camera::VirtualCamera;

    fn controller(camera: &Arc<VirtualCamera>) -> CaptureController {
        CaptureController::new(camera.clone())
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let camera = Arc::new(VirtualCamera::new());
        let mut capture = controller(&camera);

        let session = capture.acquire().await.unwrap();
        assert!(capture.is_acquired());
        assert!(capture.preview().is_bound());

        capture.release(&session);
        capture.release(&session);

        assert!(session.is_released());
        assert!(!capture.is_acquired());
        assert!(!capture.preview().is_bound());
        assert_eq!(capture.acquire_count(), 1);
        assert_eq!(capture.release_count(), 1);
        assert_eq!(camera.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_acquire_fails_fast() {
        let camera = Arc::new(VirtualCamera::new());
        let mut capture = controller(&camera);

        let _session = capture.acquire().await.unwrap();
        let err = capture.acquire().await.unwrap_err();

        assert!(matches!(err, CaptureError::AlreadyAcquired));
        assert_eq!(camera.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_device_errors() {
        let mut capture = controller(&Arc::new(VirtualCamera::unavailable()));
        let err = capture.acquire().await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable));
        assert_eq!(err.to_string(), "Webcam not supported on this device.");

        let mut capture = controller(&Arc::new(VirtualCamera::denied()));
        let err = capture.acquire().await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert!(!capture.is_acquired());
    }

    #[tokio::test]
    async fn test_start_recording_requires_active_session() {
        let camera = Arc::new(VirtualCamera::new());
        let mut capture = controller(&camera);

        let session = capture.acquire().await.unwrap();
        capture.release(&session);

        let err = capture.start_recording(&session).await.unwrap_err();
        assert!(matches!(err, CaptureError::NoActiveCapture));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_recording_warns_but_produces_artifact() {
        let camera = Arc::new(VirtualCamera::new());
        let mut capture = controller(&camera);

        let session = capture.acquire().await.unwrap();
        let handle = capture.start_recording(&session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        let outcome = capture.stop_recording(handle).await.unwrap();

        assert!(matches!(
            outcome.warning,
            Some(CaptureWarning::RecordingTooShort { .. })
        ));
        assert!(!outcome.artifact.is_empty());
        assert_eq!(outcome.artifact.file_name, RECORDING_FILE_NAME);
        assert!(session.is_released());
        assert!(!capture.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_prefers_vp8_when_supported() {
        let camera = Arc::new(VirtualCamera::new());
        let mut capture = controller(&camera);

        let session = capture.acquire().await.unwrap();
        let handle = capture.start_recording(&session).await.unwrap();
        assert_eq!(handle.mime_type(), PREFERRED_MIME_TYPE);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let outcome = capture.stop_recording(handle).await.unwrap();
        assert_eq!(outcome.warning, None);
        assert!(outcome.artifact.duration >= Duration::from_millis(1500));

        let camera = Arc::new(VirtualCamera::new().with_mime_types(&[FALLBACK_MIME_TYPE]));
        let mut capture = controller(&camera);
        let session = capture.acquire().await.unwrap();
        let handle = capture.start_recording(&session).await.unwrap();
        assert_eq!(handle.mime_type(), FALLBACK_MIME_TYPE);
    }
}
