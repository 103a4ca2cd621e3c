//! Live frame sampler
//!
//! Captures a still from a live source on a fixed cadence, encodes it as a
//! base64 JPEG and hands it to a sink. The recurring timer is the single
//! cancellable resource: once [`SamplerHandle::stop`] returns, the sink is
//! never invoked again.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::capture::{FrameSource, VideoFrame};

const JPEG_QUALITY: u8 = 85;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Frame buffer does not match {width}x{height} RGB")]
    InvalidFrame { width: u32, height: u32 },

    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// One encoded still ready for transmission
#[derive(Debug, Clone)]
pub struct Sample {
    /// Run that produced this sample
    pub run_id: Uuid,

    /// Ordinal within the run, starting at 0
    pub sequence: u64,

    /// Base64 JPEG payload (no data-URL prefix)
    pub payload: String,
}

/// Encode a frame as base64 JPEG.
pub fn encode_frame(frame: &VideoFrame) -> Result<String, SamplerError> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()).ok_or(
        SamplerError::InvalidFrame {
            width: frame.width,
            height: frame.height,
        },
    )?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&image)?;
    Ok(STANDARD.encode(jpeg))
}

/// Starts sampling runs
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    interval: Duration,
}

impl FrameSampler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn a sampling run over `source`. The first tick fires one interval
    /// after start; ticks where the source has no frame are skipped silently.
    pub fn start<S, F>(&self, source: Arc<S>, mut sink: F) -> SamplerHandle
    where
        S: FrameSource + ?Sized + 'static,
        F: FnMut(Sample) + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let stopped = Arc::new(AtomicBool::new(false));
        let samples = Arc::new(AtomicU64::new(0));
        let period = self.interval;

        let task = {
            let stopped = stopped.clone();
            let samples = samples.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    ticker.tick().await;
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }

                    let Some(frame) = source.current_frame() else {
                        tracing::debug!("Sampler {}: no frame yet, skipping tick", run_id);
                        continue;
                    };

                    let payload = match encode_frame(&frame) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!("Sampler {}: {}", run_id, e);
                            continue;
                        }
                    };

                    // A stop may have landed while encoding
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let sequence = samples.fetch_add(1, Ordering::SeqCst);
                    sink(Sample {
                        run_id,
                        sequence,
                        payload,
                    });
                }
            })
        };

        tracing::debug!("Sampler {} started ({:?} cadence)", run_id, period);
        SamplerHandle {
            run_id,
            stopped,
            samples,
            task,
        }
    }
}

/// Owned handle to one sampling run. Dropping it stops the run.
pub struct SamplerHandle {
    run_id: Uuid,
    stopped: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of samples handed to the sink so far
    pub fn samples_taken(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop the run. No sample is delivered after this returns.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.task.abort();
            tracing::debug!(
                "Sampler {} stopped after {} samples",
                self.run_id,
                self.samples_taken()
            );
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
