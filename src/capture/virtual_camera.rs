//! In-memory synthetic camera
//!
//! Produces a moving gradient test pattern and "records" by buffering the
//! raw RGB frames it served. Used when no native backend is compiled in and
//! as the deterministic device behind the session tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::controller::{FALLBACK_MIME_TYPE, PREFERRED_MIME_TYPE};
use super::traits::{
    CameraInfo, CaptureDevice, CaptureError, CaptureResult, FrameSource, MediaEncoder, Resolution,
    VideoFrame, VideoStream,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Granted,
    Denied,
    Unavailable,
}

/// Synthetic capture device
pub struct VirtualCamera {
    access: Access,
    frames_enabled: bool,
    mime_types: Vec<String>,
    open_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
}

impl Default for VirtualCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualCamera {
    pub fn new() -> Self {
        Self {
            access: Access::Granted,
            frames_enabled: true,
            mime_types: vec![PREFERRED_MIME_TYPE.to_string(), FALLBACK_MIME_TYPE.to_string()],
            open_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A camera whose user declines access
    pub fn denied() -> Self {
        Self {
            access: Access::Denied,
            ..Self::new()
        }
    }

    /// A platform with no capture capability
    pub fn unavailable() -> Self {
        Self {
            access: Access::Unavailable,
            ..Self::new()
        }
    }

    /// A camera that opens but never delivers a frame
    pub fn without_frames(mut self) -> Self {
        self.frames_enabled = false;
        self
    }

    pub fn with_mime_types(mut self, mime_types: &[&str]) -> Self {
        self.mime_types = mime_types.iter().map(|m| m.to_string()).collect();
        self
    }

    /// How many times a stream was opened
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// How many streams were actually stopped
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for VirtualCamera {
    fn is_available(&self) -> bool {
        self.access != Access::Unavailable
    }

    async fn open(&self) -> CaptureResult<Arc<dyn VideoStream>> {
        match self.access {
            Access::Unavailable => return Err(CaptureError::DeviceUnavailable),
            Access::Denied => return Err(CaptureError::PermissionDenied),
            Access::Granted => {}
        }

        self.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(VirtualStream {
            label: format!("virtual-camera-{}", self.open_calls()),
            frames_enabled: self.frames_enabled,
            mime_types: self.mime_types.clone(),
            live: AtomicBool::new(true),
            tick: AtomicU64::new(0),
            served: Arc::new(Mutex::new(None)),
            stop_calls: self.stop_calls.clone(),
        }))
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        vec![CameraInfo {
            id: "virtual".to_string(),
            name: "Virtual test pattern".to_string(),
            supported_resolutions: vec![Resolution {
                width: WIDTH,
                height: HEIGHT,
            }],
        }]
    }
}

struct VirtualStream {
    label: String,
    frames_enabled: bool,
    mime_types: Vec<String>,
    live: AtomicBool,
    tick: AtomicU64,
    /// Frames served since the encoder last drained, when recording
    served: Arc<Mutex<Option<Vec<u8>>>>,
    stop_calls: Arc<AtomicUsize>,
}

fn test_pattern(tick: u64) -> VideoFrame {
    let shift = (tick % 256) as u32;
    let mut rgb = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            rgb.push(((x * 4 + shift) % 256) as u8);
            rgb.push(((y * 5) % 256) as u8);
            rgb.push(((x + y + shift) % 256) as u8);
        }
    }
    VideoFrame {
        width: WIDTH,
        height: HEIGHT,
        rgb,
    }
}

impl FrameSource for VirtualStream {
    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.frames_enabled || !self.live.load(Ordering::SeqCst) {
            return None;
        }
        let frame = test_pattern(self.tick.fetch_add(1, Ordering::SeqCst));
        if let Some(buffer) = self.served.lock().as_mut() {
            buffer.extend_from_slice(&frame.rgb);
        }
        Some(frame)
    }
}

#[async_trait]
impl VideoStream for VirtualStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        self.mime_types.iter().any(|m| m == mime_type)
    }

    async fn start_encoder(&self, mime_type: &str) -> CaptureResult<Box<dyn MediaEncoder>> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(CaptureError::NoActiveCapture);
        }
        if !self.supports_mime_type(mime_type) {
            return Err(CaptureError::Encoder(format!("unsupported MIME type {mime_type}")));
        }

        *self.served.lock() = Some(Vec::new());
        Ok(Box::new(VirtualEncoder {
            mime_type: mime_type.to_string(),
            served: self.served.clone(),
            header_sent: false,
        }))
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

struct VirtualEncoder {
    mime_type: String,
    served: Arc<Mutex<Option<Vec<u8>>>>,
    header_sent: bool,
}

#[async_trait]
impl MediaEncoder for VirtualEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn request_data(&mut self) -> CaptureResult<Vec<u8>> {
        let mut chunk = Vec::new();
        if !self.header_sent {
            // EBML magic so the artifact at least identifies as Matroska/WebM
            chunk.extend_from_slice(&[0x1A, 0x45, 0xDF, 0xA3]);
            self.header_sent = true;
        }
        if let Some(buffer) = self.served.lock().as_mut() {
            chunk.append(buffer);
        }
        Ok(chunk)
    }

    async fn finish(&mut self) -> CaptureResult<Vec<u8>> {
        let rest = self.request_data().await?;
        *self.served.lock() = None;
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_serves_frames_until_stopped() {
        let camera = VirtualCamera::new();
        let stream = camera.open().await.unwrap();

        let frame = stream.current_frame().unwrap();
        assert_eq!(frame.rgb.len(), (frame.width * frame.height * 3) as usize);

        stream.stop();
        stream.stop();
        assert!(stream.current_frame().is_none());
        assert_eq!(camera.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_without_frames() {
        let camera = VirtualCamera::new().without_frames();
        let stream = camera.open().await.unwrap();
        assert!(stream.is_live());
        assert!(stream.current_frame().is_none());
    }

    #[tokio::test]
    async fn test_encoder_collects_served_frames() {
        let camera = VirtualCamera::new();
        let stream = camera.open().await.unwrap();
        let mut encoder = stream.start_encoder(FALLBACK_MIME_TYPE).await.unwrap();

        stream.current_frame().unwrap();
        let first = encoder.request_data().await.unwrap();
        assert_eq!(&first[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(first.len(), 4 + (WIDTH * HEIGHT * 3) as usize);

        let rest = encoder.finish().await.unwrap();
        assert!(rest.is_empty());
    }
}
