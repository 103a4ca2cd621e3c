//! Native webcam capture using nokhwa
//!
//! Frames are decoded to RGB on a dedicated capture thread. Recording pipes
//! those frames into FFmpeg, which muxes a VP8 WebM into a temporary file that
//! is read back when the recording is finalized.

use async_trait::async_trait;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use parking_lot::Mutex;
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::controller::FALLBACK_MIME_TYPE;
use super::traits::{
    CameraInfo, CaptureDevice, CaptureError, CaptureResult, FrameSource, MediaEncoder, Resolution,
    VideoFrame, VideoStream,
};

/// Camera opened through the platform's native API
pub struct NativeCamera {
    index: u32,
}

impl NativeCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

#[async_trait]
impl CaptureDevice for NativeCamera {
    fn is_available(&self) -> bool {
        nokhwa::query(ApiBackend::Auto)
            .map(|cameras| !cameras.is_empty())
            .unwrap_or(false)
    }

    async fn open(&self) -> CaptureResult<Arc<dyn VideoStream>> {
        let shared = Arc::new(Shared {
            label: format!("camera-{}", self.index),
            latest: Mutex::new(None),
            live: AtomicBool::new(true),
            fps: AtomicU32::new(30),
            encoder: Mutex::new(None),
            thread: Mutex::new(None),
        });

        let (opened_tx, opened_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);
        let index = self.index;
        let worker = shared.clone();
        let handle = std::thread::spawn(move || capture_loop(index, worker, opened_tx));
        *shared.thread.lock() = Some(handle);

        let opened = tokio::task::spawn_blocking(move || opened_rx.recv())
            .await
            .map_err(|e| CaptureError::Encoder(e.to_string()))?;

        match opened {
            Ok(Ok(())) => Ok(Arc::new(NativeStream { shared })),
            Ok(Err(reason)) => {
                tracing::warn!("Could not open camera {}: {}", index, reason);
                Err(CaptureError::PermissionDenied)
            }
            Err(_) => Err(CaptureError::PermissionDenied),
        }
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .into_iter()
                .map(|info| {
                    let id = match info.index() {
                        CameraIndex::Index(i) => i.to_string(),
                        CameraIndex::String(s) => s.to_string(),
                    };
                    CameraInfo {
                        id,
                        name: info.human_name().to_string(),
                        supported_resolutions: vec![
                            Resolution { width: 1280, height: 720 },
                            Resolution { width: 640, height: 480 },
                        ],
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }
}

struct Shared {
    label: String,
    latest: Mutex<Option<VideoFrame>>,
    live: AtomicBool,
    fps: AtomicU32,
    encoder: Mutex<Option<FfmpegPipe>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

struct FfmpegPipe {
    process: Child,
    width: u32,
    height: u32,
}

fn capture_loop(
    index: u32,
    shared: Arc<Shared>,
    opened: std::sync::mpsc::SyncSender<Result<(), String>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(e.to_string()));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = opened.send(Err(e.to_string()));
        return;
    }

    shared.fps.store(camera.frame_rate(), Ordering::SeqCst);
    let _ = opened.send(Ok(()));
    tracing::info!("Webcam {} streaming at {}fps", index, camera.frame_rate());

    while shared.live.load(Ordering::SeqCst) {
        // Blocks until the camera delivers the next frame
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::debug!("Failed to capture frame: {:?}", e);
                continue;
            }
        };
        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("Failed to decode frame: {:?}", e);
                continue;
            }
        };

        let frame = VideoFrame {
            width: image.width(),
            height: image.height(),
            rgb: image.into_raw(),
        };

        if let Some(pipe) = shared.encoder.lock().as_mut() {
            if pipe.width == frame.width && pipe.height == frame.height {
                if let Some(stdin) = pipe.process.stdin.as_mut() {
                    if let Err(e) = stdin.write_all(&frame.rgb) {
                        tracing::warn!("FFmpeg write failed: {}", e);
                    }
                }
            }
        }

        *shared.latest.lock() = Some(frame);
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
    tracing::info!("Webcam capture thread stopped");
}

struct NativeStream {
    shared: Arc<Shared>,
}

impl FrameSource for NativeStream {
    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.shared.live.load(Ordering::SeqCst) {
            return None;
        }
        self.shared.latest.lock().clone()
    }
}

#[async_trait]
impl VideoStream for NativeStream {
    fn label(&self) -> &str {
        &self.shared.label
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        // FFmpeg's libvpx produces VP8 WebM; no audio track is captured
        mime_type == FALLBACK_MIME_TYPE
    }

    async fn start_encoder(&self, mime_type: &str) -> CaptureResult<Box<dyn MediaEncoder>> {
        let resolution = self
            .shared
            .latest
            .lock()
            .as_ref()
            .map(VideoFrame::resolution)
            .ok_or_else(|| CaptureError::Encoder("camera has not produced a frame yet".to_string()))?;

        let output = tempfile::Builder::new()
            .prefix("posture-coach-")
            .suffix(".webm")
            .tempfile()?;
        let fps = self.shared.fps.load(Ordering::SeqCst).max(1);

        let process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                &format!("{}x{}", resolution.width, resolution.height),
                "-framerate",
                &fps.to_string(),
                "-i",
                "-",
                "-c:v",
                "libvpx",
                "-b:v",
                "1M",
                "-deadline",
                "realtime",
                "-f",
                "webm",
            ])
            .arg(output.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::Encoder(format!("failed to start ffmpeg: {e}")))?;

        tracing::info!(
            "Started FFmpeg webcam encoder: {}x{} @ {}fps -> {:?}",
            resolution.width,
            resolution.height,
            fps,
            output.path()
        );

        *self.shared.encoder.lock() = Some(FfmpegPipe {
            process,
            width: resolution.width,
            height: resolution.height,
        });

        Ok(Box::new(NativeEncoder {
            mime_type: mime_type.to_string(),
            shared: self.shared.clone(),
            output,
        }))
    }

    fn stop(&self) {
        if !self.shared.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.shared.thread.lock().take() {
            let _ = handle.join();
        }
    }

    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }
}

struct NativeEncoder {
    mime_type: String,
    shared: Arc<Shared>,
    output: NamedTempFile,
}

#[async_trait]
impl MediaEncoder for NativeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn request_data(&mut self) -> CaptureResult<Vec<u8>> {
        // FFmpeg only completes the WebM cues when its input closes
        Ok(Vec::new())
    }

    async fn finish(&mut self) -> CaptureResult<Vec<u8>> {
        let Some(mut pipe) = self.shared.encoder.lock().take() else {
            return Ok(Vec::new());
        };

        drop(pipe.process.stdin.take());
        let output = tokio::task::spawn_blocking(move || pipe.process.wait_with_output())
            .await
            .map_err(|e| CaptureError::Encoder(e.to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status, stderr
            )));
        }

        Ok(tokio::fs::read(self.output.path()).await?)
    }
}
