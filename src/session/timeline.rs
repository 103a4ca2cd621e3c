//! Feedback timelines
//!
//! Three timelines coexist in a session and never merge. They share one type
//! and one render contract, distinguished by [`TimelineKind`].

use serde::{Deserialize, Serialize};

use crate::analysis::FrameFeedback;

/// Which analysis run a timeline belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimelineKind {
    /// Authoritative result of a batch upload
    Batch,
    /// Push-channel progress while an upload is in flight
    UploadLive,
    /// Live feedback gathered while recording
    RecordingLive,
}

impl TimelineKind {
    pub fn title(&self) -> &'static str {
        match self {
            TimelineKind::Batch => "Feedback per Frame",
            TimelineKind::UploadLive => "Live Feedback (Upload in Progress)",
            TimelineKind::RecordingLive => "Feedback Timeline (Recorded)",
        }
    }
}

/// Ordered per-frame feedback for one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackTimeline {
    kind: TimelineKind,
    frames: Vec<FrameFeedback>,
}

impl FeedbackTimeline {
    pub fn new(kind: TimelineKind) -> Self {
        Self {
            kind,
            frames: Vec::new(),
        }
    }

    pub fn from_frames(kind: TimelineKind, frames: Vec<FrameFeedback>) -> Self {
        Self { kind, frames }
    }

    pub fn kind(&self) -> TimelineKind {
        self.kind
    }

    pub fn frames(&self) -> &[FrameFeedback] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a frame tagged by its producer, in arrival order.
    pub fn push(&mut self, feedback: FrameFeedback) {
        self.frames.push(feedback);
    }

    /// Append untagged feedback; the ordinal is its arrival position.
    pub fn push_messages(&mut self, messages: Vec<String>) -> u64 {
        let frame = self.frames.len() as u64;
        self.frames.push(FrameFeedback::new(frame, messages));
        frame
    }

    pub fn replace(&mut self, frames: Vec<FrameFeedback>) {
        self.frames = frames;
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Number of conforming frames
    pub fn conforming_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_conforming()).count()
    }

    /// Frames ordered by their carried ordinal rather than arrival
    pub fn sorted_by_frame(&self) -> Vec<FrameFeedback> {
        let mut frames = self.frames.clone();
        frames.sort_by_key(|f| f.frame);
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recorded_rep_count_example() {
        let mut timeline = FeedbackTimeline::new(TimelineKind::RecordingLive);
        timeline.push_messages(vec![]);
        timeline.push_messages(msgs(&["Good posture"]));
        timeline.push_messages(msgs(&["Knee too far forward"]));
        timeline.push_messages(vec![]);

        assert_eq!(timeline.conforming_count(), 3);
        let ordinals: Vec<u64> = timeline.frames().iter().map(|f| f.frame).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_arrival_order_is_kept() {
        let mut timeline = FeedbackTimeline::new(TimelineKind::UploadLive);
        timeline.push(FrameFeedback::new(5, vec![]));
        timeline.push(FrameFeedback::new(2, msgs(&["Leaning forward"])));

        assert_eq!(timeline.frames()[0].frame, 5);
        assert_eq!(timeline.sorted_by_frame()[0].frame, 2);

        timeline.clear();
        assert!(timeline.is_empty());
        assert_eq!(timeline.kind(), TimelineKind::UploadLive);
    }
}
