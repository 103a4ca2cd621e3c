//! Session orchestrator
//!
//! A single actor task owns the [`Session`] and every capture resource.
//! User actions arrive as [`SessionCommand`]s; sampler responses, batch
//! completions and push events arrive as messages into the same loop, so no
//! state is ever mutated from two places. Completions carry the run id they
//! belong to and are dropped once that run is over.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{Session, SessionEvent, SessionSnapshot, SessionState};
use super::{SessionError, SessionResult};
use crate::analysis::{AnalysisResult, AnalysisService, BatchAnalysis, FrameFeedback, Mode, PushSubscription};
use crate::capture::{
    CaptureController, CaptureDevice, CaptureError, CaptureSession, RecordingHandle,
    RecordingOutcome, VideoStream,
};
use crate::commands::SessionHandle;
use crate::config::SAMPLE_INTERVAL;
use crate::media::SourceMedia;
use crate::sampler::{FrameSampler, Sample, SamplerHandle};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 100;

type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// Messages accepted by the session actor
pub enum SessionCommand {
    SetMode {
        mode: Mode,
        reply: Reply<()>,
    },
    SelectFile {
        media: SourceMedia,
        reply: Reply<()>,
    },
    StartWebcam {
        reply: Reply<()>,
    },
    StopWebcam {
        reply: Reply<Option<RecordingOutcome>>,
    },
    StartRecording {
        reply: Reply<()>,
    },
    StopRecording {
        reply: Reply<RecordingOutcome>,
    },
    StartLiveAnalysis {
        reply: Reply<()>,
    },
    StopLiveAnalysis {
        reply: Reply<()>,
    },
    /// Answered once the batch run finishes, not when it starts
    Upload {
        recorded_only: bool,
        reply: Reply<BatchAnalysis>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::SetMode { .. } => "set mode",
            SessionCommand::SelectFile { .. } => "select a file",
            SessionCommand::StartWebcam { .. } => "start the webcam",
            SessionCommand::StopWebcam { .. } => "stop the webcam",
            SessionCommand::StartRecording { .. } => "start recording",
            SessionCommand::StopRecording { .. } => "stop recording",
            SessionCommand::StartLiveAnalysis { .. } => "start live analysis",
            SessionCommand::StopLiveAnalysis { .. } => "stop live analysis",
            SessionCommand::Upload { .. } => "upload",
            SessionCommand::Shutdown { .. } => "shut down",
        }
    }
}

/// Work finished outside the actor, tagged with the run that started it
enum Completion {
    FrameAnalyzed {
        run_id: Uuid,
        messages: Vec<String>,
    },
    BatchFinished {
        run_id: Uuid,
        result: AnalysisResult<BatchAnalysis>,
    },
}

/// What the actor currently holds of the camera
enum CaptureSlot {
    Empty,
    Live(CaptureSession),
    Recording(RecordingHandle),
}

struct PendingUpload {
    run_id: Uuid,
    reply: Reply<BatchAnalysis>,
    task: JoinHandle<()>,
}

/// Configures and spawns a session actor
pub struct SessionBuilder {
    service: Arc<dyn AnalysisService>,
    device: Arc<dyn CaptureDevice>,
    push: Option<PushSubscription>,
    sample_interval: Duration,
}

impl SessionBuilder {
    pub fn new(service: Arc<dyn AnalysisService>, device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            service,
            device,
            push: None,
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    /// Feed push-channel progress into the upload timeline
    pub fn with_push(mut self, push: PushSubscription) -> Self {
        self.push = Some(push);
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Spawn the actor on the current runtime.
    pub fn spawn(self) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let session = Session::default();
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let capture = CaptureController::new(self.device);
        let preview = capture.preview();

        let actor = SessionActor {
            session,
            capture,
            slot: CaptureSlot::Empty,
            service: self.service,
            sampler: FrameSampler::new(self.sample_interval),
            live: None,
            upload: None,
            push: self.push,
            commands: command_rx,
            completion_tx,
            completions: completion_rx,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
        };
        tokio::spawn(actor.run());

        SessionHandle::new(command_tx, snapshot_rx, event_tx, preview)
    }
}

struct SessionActor {
    session: Session,
    capture: CaptureController,
    slot: CaptureSlot,
    service: Arc<dyn AnalysisService>,
    sampler: FrameSampler,
    /// Sampling run feeding live feedback
    live: Option<SamplerHandle>,
    upload: Option<PendingUpload>,
    push: Option<PushSubscription>,
    commands: mpsc::Receiver<SessionCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

async fn next_push(push: &mut Option<PushSubscription>) -> Option<FrameFeedback> {
    match push {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self) {
        info!("Session actor started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown { reply }) => {
                        self.teardown();
                        self.publish();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.teardown();
                        break;
                    }
                },
                Some(completion) = self.completions.recv() => self.complete(completion),
                pushed = next_push(&mut self.push), if self.push.is_some() => match pushed {
                    Some(feedback) => self.on_push(feedback),
                    None => {
                        warn!("Push channel ended; live upload progress unavailable");
                        self.push = None;
                    }
                },
            }
            self.publish();
        }

        info!("Session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        let action = command.name();
        let state = self.session.state;
        let invalid = || SessionError::InvalidTransition { action, state };

        match command {
            SessionCommand::SetMode { mode, reply } => {
                let result = if state == SessionState::Uploading {
                    Err(invalid())
                } else {
                    info!("Mode set to {}", mode);
                    self.session.mode = mode;
                    Ok(())
                };
                self.respond(reply, result);
            }
            SessionCommand::SelectFile { media, reply } => {
                let result = if state.holds_webcam() {
                    Err(invalid())
                } else {
                    self.select_file(media);
                    Ok(())
                };
                self.respond(reply, result);
            }
            SessionCommand::StartWebcam { reply } => {
                let result = match state {
                    SessionState::Idle | SessionState::ResultsReady => self.start_webcam().await,
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::StopWebcam { reply } => {
                let result = match state {
                    SessionState::Recording => self.finish_recording().await.map(Some),
                    SessionState::WebcamLive | SessionState::FreeLiveAnalysis => {
                        self.stop_webcam();
                        Ok(None)
                    }
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::StartRecording { reply } => {
                let result = match state {
                    SessionState::WebcamLive => self.start_recording().await,
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::StopRecording { reply } => {
                let result = match state {
                    SessionState::Recording => self.finish_recording().await,
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::StartLiveAnalysis { reply } => {
                let result = match state {
                    SessionState::WebcamLive => self.start_live_analysis(),
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::StopLiveAnalysis { reply } => {
                let result = match state {
                    SessionState::FreeLiveAnalysis => {
                        self.stop_sampler();
                        self.transition(SessionState::WebcamLive);
                        Ok(())
                    }
                    _ => Err(invalid()),
                };
                self.respond(reply, result);
            }
            SessionCommand::Upload {
                recorded_only,
                reply,
            } => match state {
                SessionState::Idle | SessionState::ResultsReady => {
                    self.start_upload(recorded_only, reply);
                }
                _ => self.respond(reply, Err(invalid())),
            },
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn select_file(&mut self, media: SourceMedia) {
        self.cancel_upload();
        info!("Selected media: {}", media.name);

        self.session.source_media = Some(media);
        self.session.clear_results();
        self.session.clear_error();
        self.transition(SessionState::Idle);
    }

    async fn start_webcam(&mut self) -> SessionResult<()> {
        let session = match self.capture.acquire().await {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.session.clear_error();
        self.session.clear_batch();
        self.slot = CaptureSlot::Live(session);
        self.transition(SessionState::WebcamLive);
        Ok(())
    }

    fn stop_webcam(&mut self) {
        self.stop_sampler();
        match std::mem::replace(&mut self.slot, CaptureSlot::Empty) {
            CaptureSlot::Live(session) => self.capture.release(&session),
            CaptureSlot::Recording(handle) => self.capture.release(handle.session()),
            CaptureSlot::Empty => {}
        }
        self.transition(SessionState::Idle);
    }

    async fn start_recording(&mut self) -> SessionResult<()> {
        let Some(session) = self.live_session() else {
            return Err(self.fail(CaptureError::NoActiveCapture.into()));
        };

        let handle = match self.capture.start_recording(&session).await {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.session.clear_error();
        self.session.warning = None;
        self.session.recording_live.clear();
        self.start_sampler(session.stream());
        self.slot = CaptureSlot::Recording(handle);
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Stop the tied live analysis, finalize the recording and release the
    /// camera in one step. The recording timeline is kept.
    async fn finish_recording(&mut self) -> SessionResult<RecordingOutcome> {
        self.stop_sampler();

        let handle = match std::mem::replace(&mut self.slot, CaptureSlot::Empty) {
            CaptureSlot::Recording(handle) => handle,
            other => {
                self.slot = other;
                self.stop_webcam();
                return Err(self.fail(CaptureError::NoActiveCapture.into()));
            }
        };

        let outcome = self.capture.stop_recording(handle).await;
        self.transition(SessionState::Idle);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(e.into())),
        };

        info!(
            "Recorded {} ({} bytes, {} live frames)",
            outcome.artifact.file_name,
            outcome.artifact.len(),
            self.session.recording_live.len()
        );
        self.session.source_media = Some(SourceMedia::from_artifact(&outcome.artifact));
        self.session.clear_batch();

        if let Some(warning) = &outcome.warning {
            let text = warning.to_string();
            self.session.warning = Some(text.clone());
            let _ = self.events.send(SessionEvent::Warning(text));
        }
        Ok(outcome)
    }

    fn start_live_analysis(&mut self) -> SessionResult<()> {
        let Some(session) = self.live_session() else {
            return Err(self.fail(CaptureError::NoActiveCapture.into()));
        };

        self.start_sampler(session.stream());
        self.transition(SessionState::FreeLiveAnalysis);
        Ok(())
    }

    fn live_session(&self) -> Option<CaptureSession> {
        match &self.slot {
            CaptureSlot::Live(session) => Some(session.clone()),
            _ => None,
        }
    }

    fn start_sampler(&mut self, stream: Arc<dyn VideoStream>) {
        self.stop_sampler();

        let service = self.service.clone();
        let completions = self.completion_tx.clone();
        let handle = self.sampler.start(stream, move |sample: Sample| {
            let service = service.clone();
            let completions = completions.clone();
            tokio::spawn(async move {
                let messages = service.analyze_frame_or_degraded(&sample.payload).await;
                let _ = completions.send(Completion::FrameAnalyzed {
                    run_id: sample.run_id,
                    messages,
                });
            });
        });

        info!("Live analysis run {} started", handle.run_id());
        self.live = Some(handle);
    }

    fn stop_sampler(&mut self) {
        if let Some(handle) = self.live.take() {
            handle.stop();
            info!(
                "Live analysis run {} stopped after {} samples",
                handle.run_id(),
                handle.samples_taken()
            );
        }
        self.session.live_feedback.clear();
    }

    fn start_upload(&mut self, recorded_only: bool, reply: Reply<BatchAnalysis>) {
        let media = self
            .session
            .source_media
            .clone()
            .filter(|media| !recorded_only || media.is_recording());
        let Some(media) = media else {
            let error = self.fail(SessionError::NoMedia);
            self.respond(reply, Err(error));
            return;
        };

        self.session.clear_batch();
        self.session.upload_live.clear();
        self.session.clear_error();
        self.session.loading = true;

        let run_id = Uuid::new_v4();
        let mode = self.session.mode;
        info!("Uploading {} for {} analysis (run {})", media.name, mode, run_id);

        let service = self.service.clone();
        let completions = self.completion_tx.clone();
        let task = tokio::spawn(async move {
            let result = service.analyze_batch(Some(&media), mode).await;
            let _ = completions.send(Completion::BatchFinished { run_id, result });
        });

        self.upload = Some(PendingUpload {
            run_id,
            reply,
            task,
        });
        self.transition(SessionState::Uploading);
    }

    fn cancel_upload(&mut self) {
        if let Some(upload) = self.upload.take() {
            upload.task.abort();
            self.session.loading = false;
            let _ = upload.reply.send(Err(SessionError::Superseded));
            info!("Upload run {} cancelled", upload.run_id);
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::FrameAnalyzed { run_id, messages } => {
                if self.live.as_ref().map(SamplerHandle::run_id) != Some(run_id) {
                    debug!("Discarding late frame result from run {}", run_id);
                    return;
                }
                if self.session.state == SessionState::Recording {
                    let frame = self.session.recording_live.push_messages(messages.clone());
                    debug!("Recorded live frame {}", frame);
                }
                self.session.live_feedback = messages;
            }
            Completion::BatchFinished { run_id, result } => {
                if self.upload.as_ref().map(|u| u.run_id) != Some(run_id) {
                    debug!("Discarding result of superseded upload {}", run_id);
                    return;
                }
                let Some(upload) = self.upload.take() else {
                    return;
                };
                self.session.loading = false;

                match result {
                    Ok(analysis) => {
                        info!(
                            "Batch analysis finished: {} frames, {} reps",
                            analysis.frames.len(),
                            analysis.rep_count
                        );
                        let _ = self.events.send(SessionEvent::BatchCompleted {
                            rep_count: analysis.rep_count,
                            frames: analysis.frames.len(),
                        });
                        self.session.apply_batch(analysis.clone());
                        self.transition(SessionState::ResultsReady);
                        self.respond(upload.reply, Ok(analysis));
                    }
                    Err(e) => {
                        warn!("Batch analysis failed: {}", e);
                        self.transition(SessionState::Idle);
                        let error = self.fail(e.into());
                        self.respond(upload.reply, Err(error));
                    }
                }
            }
        }
    }

    fn on_push(&mut self, feedback: FrameFeedback) {
        if self.session.state != SessionState::Uploading {
            debug!("Ignoring pushed frame {} outside an upload", feedback.frame);
            return;
        }
        debug!("Pushed feedback for frame {}", feedback.frame);
        self.session.upload_live.push(feedback);
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        info!("Session state: {:?} -> {:?}", from, to);
        self.session.state = to;
        let _ = self.events.send(SessionEvent::StateChanged { from, to });
    }

    /// Surface an error to the user, replacing any earlier one.
    fn fail(&mut self, error: SessionError) -> SessionError {
        let message = error.to_string();
        warn!("{}", message);
        self.session.set_error(message.clone());
        let _ = self.events.send(SessionEvent::Error(message));
        error
    }

    /// Publish first so the caller sees the state its action produced.
    fn respond<T>(&self, reply: Reply<T>, result: SessionResult<T>) {
        self.publish();
        if reply.send(result).is_err() {
            debug!("Caller went away before the session replied");
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    /// Release everything the session holds.
    fn teardown(&mut self) {
        self.cancel_upload();
        if self.session.state.holds_webcam() {
            self.stop_webcam();
        }
        self.push = None;
    }
}
