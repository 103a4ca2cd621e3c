//! Session commands

use std::path::Path;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::analysis::{BatchAnalysis, Mode};
use crate::capture::{PreviewSink, RecordingOutcome};
use crate::media::SourceMedia;
use crate::session::{SessionCommand, SessionError, SessionEvent, SessionResult, SessionSnapshot};

/// Cloneable handle to a running session actor
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    preview: PreviewSink,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        snapshots: watch::Receiver<SessionSnapshot>,
        events: broadcast::Sender<SessionEvent>,
        preview: PreviewSink,
    ) -> Self {
        Self {
            commands,
            snapshots,
            events,
            preview,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<SessionResult<T>>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch every published snapshot
    pub fn subscribe_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to state changes, warnings and errors
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Live camera preview, bound while the webcam is on
    pub fn preview(&self) -> PreviewSink {
        self.preview.clone()
    }

    pub async fn set_mode(&self, mode: Mode) -> SessionResult<()> {
        self.request(|reply| SessionCommand::SetMode { mode, reply })
            .await
    }

    /// Choose a video file for batch analysis
    pub async fn select_file(&self, path: impl AsRef<Path>) -> SessionResult<()> {
        self.select_media(SourceMedia::from_path(path)).await
    }

    pub async fn select_media(&self, media: SourceMedia) -> SessionResult<()> {
        self.request(|reply| SessionCommand::SelectFile { media, reply })
            .await
    }

    pub async fn start_webcam(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartWebcam { reply })
            .await
    }

    /// Turn the webcam off, finishing any recording in progress
    pub async fn stop_webcam(&self) -> SessionResult<Option<RecordingOutcome>> {
        self.request(|reply| SessionCommand::StopWebcam { reply })
            .await
    }

    pub async fn start_recording(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartRecording { reply })
            .await
    }

    /// Finish the recording; it becomes the session's source media
    pub async fn stop_recording(&self) -> SessionResult<RecordingOutcome> {
        self.request(|reply| SessionCommand::StopRecording { reply })
            .await
    }

    pub async fn start_live_analysis(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartLiveAnalysis { reply })
            .await
    }

    pub async fn stop_live_analysis(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StopLiveAnalysis { reply })
            .await
    }

    /// Upload the source media and wait for the batch result
    pub async fn upload(&self) -> SessionResult<BatchAnalysis> {
        self.request(|reply| SessionCommand::Upload {
            recorded_only: false,
            reply,
        })
        .await
    }

    /// Upload the last webcam recording
    pub async fn analyze_recorded(&self) -> SessionResult<BatchAnalysis> {
        self.request(|reply| SessionCommand::Upload {
            recorded_only: true,
            reply,
        })
        .await
    }

    /// Stop the actor, releasing the camera and cancelling any upload
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Shutdown { reply })
            .await
            .is_ok()
        {
            let _ = done.await;
        }
    }
}
