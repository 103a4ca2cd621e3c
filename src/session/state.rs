//! Session state management
//!
//! Defines the session state machine states, the root session aggregate and
//! the snapshot handed to the presentation layer.

use serde::{Deserialize, Serialize};

use super::timeline::{FeedbackTimeline, TimelineKind};
use crate::analysis::{BatchAnalysis, Mode};
use crate::media::{MediaSummary, SourceMedia};

/// Current state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Nothing running; media may be selected
    #[default]
    Idle,
    /// Webcam preview only
    WebcamLive,
    /// Recording with live analysis feeding the recording timeline
    Recording,
    /// Live analysis without recording
    FreeLiveAnalysis,
    /// Batch analysis in flight
    Uploading,
    /// Batch results available
    ResultsReady,
}

impl SessionState {
    /// States that own an acquired camera
    pub fn holds_webcam(&self) -> bool {
        matches!(
            self,
            SessionState::WebcamLive | SessionState::Recording | SessionState::FreeLiveAnalysis
        )
    }

    /// States with an active frame sampler
    pub fn is_sampling(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::FreeLiveAnalysis)
    }
}

/// Root aggregate owned by the session actor
#[derive(Debug)]
pub struct Session {
    pub mode: Mode,
    pub source_media: Option<SourceMedia>,
    pub state: SessionState,
    pub last_error: Option<String>,
    pub warning: Option<String>,
    pub loading: bool,
    pub analysis_done: bool,
    pub rep_count: Option<u32>,
    pub batch: FeedbackTimeline,
    pub upload_live: FeedbackTimeline,
    pub recording_live: FeedbackTimeline,
    /// Messages for the most recently analyzed live frame
    pub live_feedback: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            source_media: None,
            state: SessionState::Idle,
            last_error: None,
            warning: None,
            loading: false,
            analysis_done: false,
            rep_count: None,
            batch: FeedbackTimeline::new(TimelineKind::Batch),
            upload_live: FeedbackTimeline::new(TimelineKind::UploadLive),
            recording_live: FeedbackTimeline::new(TimelineKind::RecordingLive),
            live_feedback: Vec::new(),
        }
    }
}

impl Session {
    /// Replace the current error; errors never accumulate.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Drop batch results and the rep count
    pub fn clear_batch(&mut self) {
        self.batch.clear();
        self.rep_count = None;
        self.analysis_done = false;
    }

    /// Drop every timeline and result
    pub fn clear_results(&mut self) {
        self.clear_batch();
        self.upload_live.clear();
        self.recording_live.clear();
        self.live_feedback.clear();
        self.warning = None;
    }

    pub fn apply_batch(&mut self, analysis: BatchAnalysis) {
        self.batch.replace(analysis.frames);
        self.rep_count = Some(analysis.rep_count);
        self.analysis_done = true;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            mode: self.mode,
            source_media: self.source_media.as_ref().map(SourceMedia::summary),
            last_error: self.last_error.clone(),
            warning: self.warning.clone(),
            loading: self.loading,
            analysis_done: self.analysis_done,
            rep_count: self.rep_count,
            batch: self.batch.clone(),
            upload_live: self.upload_live.clone(),
            recording_live: self.recording_live.clone(),
            live_feedback: self.live_feedback.clone(),
        }
    }
}

/// Immutable view of the session published after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub mode: Mode,
    pub source_media: Option<MediaSummary>,
    pub last_error: Option<String>,
    pub warning: Option<String>,
    pub loading: bool,
    pub analysis_done: bool,
    pub rep_count: Option<u32>,
    pub batch: FeedbackTimeline,
    pub upload_live: FeedbackTimeline,
    pub recording_live: FeedbackTimeline,
    pub live_feedback: Vec<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Session::default().snapshot()
    }
}

impl SessionSnapshot {
    /// Local heuristic rep count over the recording timeline
    pub fn recorded_rep_count(&self) -> usize {
        self.recording_live.conforming_count()
    }

    pub fn webcam_active(&self) -> bool {
        self.state.holds_webcam()
    }

    /// Upload progress is only shown while the upload is running
    pub fn shows_upload_live(&self) -> bool {
        self.state == SessionState::Uploading && !self.upload_live.is_empty()
    }

    /// The recorded timeline is shown next to the recorded media once the
    /// webcam is off
    pub fn shows_recording_live(&self) -> bool {
        self.source_media.is_some() && !self.recording_live.is_empty() && !self.webcam_active()
    }

    pub fn shows_batch(&self) -> bool {
        !self.batch.is_empty()
    }

    /// Timelines the presentation layer should render, in display order
    pub fn visible_timelines(&self) -> Vec<&FeedbackTimeline> {
        let mut visible = Vec::new();
        if self.shows_upload_live() {
            visible.push(&self.upload_live);
        }
        if self.shows_batch() {
            visible.push(&self.batch);
        }
        if self.shows_recording_live() {
            visible.push(&self.recording_live);
        }
        visible
    }
}

/// Notifications emitted alongside snapshots
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Warning(String),
    Error(String),
    BatchCompleted {
        rep_count: u32,
        frames: usize,
    },
}
