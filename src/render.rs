//! Text presentation of session snapshots
//!
//! Rendering only reads a [`SessionSnapshot`]; it never decides state.

use serde::Serialize;
use std::fmt::Write;

use crate::analysis::{FrameFeedback, GOOD_POSTURE};
use crate::session::{FeedbackTimeline, SessionSnapshot, SessionState, TimelineKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Badge {
    Good,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeView {
    pub badge: Badge,
    pub text: String,
}

/// One rendered timeline row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRow {
    pub label: String,
    pub badges: Vec<BadgeView>,
}

/// Badges for one frame's messages. An empty list shows as good posture.
pub fn badges_for(messages: &[String]) -> Vec<BadgeView> {
    if messages.is_empty() {
        return vec![BadgeView {
            badge: Badge::Good,
            text: GOOD_POSTURE.to_string(),
        }];
    }

    messages
        .iter()
        .map(|message| BadgeView {
            badge: if message == GOOD_POSTURE {
                Badge::Good
            } else {
                Badge::Error
            },
            text: message.clone(),
        })
        .collect()
}

fn row(label: u64, feedback: &FrameFeedback) -> FeedbackRow {
    FeedbackRow {
        label: format!("Frame {}:", label),
        badges: badges_for(&feedback.messages),
    }
}

/// Rows for a timeline, in arrival order.
///
/// Recorded rows are labelled by position; the others carry the frame number
/// the service assigned.
pub fn rows(timeline: &FeedbackTimeline) -> Vec<FeedbackRow> {
    timeline
        .frames()
        .iter()
        .enumerate()
        .map(|(index, feedback)| match timeline.kind() {
            TimelineKind::RecordingLive => row(index as u64, feedback),
            TimelineKind::Batch | TimelineKind::UploadLive => row(feedback.frame, feedback),
        })
        .collect()
}

fn badge_text(badges: &[BadgeView]) -> String {
    badges
        .iter()
        .map(|b| match b.badge {
            Badge::Good => format!("[ok] {}", b.text),
            Badge::Error => format!("[!!] {}", b.text),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// Render a snapshot as plain text for a terminal.
pub fn render_text(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Mode: {}  State: {:?}", snapshot.mode.label(), snapshot.state);
    if let Some(media) = &snapshot.source_media {
        let _ = writeln!(out, "Video: {} ({})", media.name, media.url);
    }
    if snapshot.loading {
        let _ = writeln!(out, "Analyzing...");
    }
    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(out, "Error: {}", error);
    }
    if let Some(warning) = &snapshot.warning {
        let _ = writeln!(out, "Warning: {}", warning);
    }

    if snapshot.state.is_sampling() {
        let _ = writeln!(out, "Live Feedback: {}", badge_text(&badges_for(&snapshot.live_feedback)));
    }

    if snapshot.analysis_done && snapshot.state == SessionState::ResultsReady {
        if let Some(reps) = snapshot.rep_count {
            let _ = writeln!(out, "Repetitions Counted: {}", reps);
        }
    }

    for timeline in snapshot.visible_timelines() {
        let _ = writeln!(out, "{}", timeline.kind().title());
        if timeline.kind() == TimelineKind::RecordingLive {
            let _ = writeln!(
                out,
                "Repetitions Counted (Recorded): {}",
                snapshot.recorded_rep_count()
            );
        }
        for row in rows(timeline) {
            let _ = writeln!(out, "  {} {}", row.label, badge_text(&row.badges));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::BatchAnalysis;
    use crate::session::Session;

    fn msgs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_badges() {
        let empty = badges_for(&[]);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].badge, Badge::Good);
        assert_eq!(empty[0].text, "Good posture");

        let mixed = badges_for(&msgs(&["Good posture", "Knee too far forward"]));
        assert_eq!(mixed[0].badge, Badge::Good);
        assert_eq!(mixed[1].badge, Badge::Error);
    }

    #[test]
    fn test_upload_scenario_rows() {
        let mut session = Session::default();
        session.apply_batch(BatchAnalysis {
            frames: vec![
                FrameFeedback::new(0, msgs(&["Good posture"])),
                FrameFeedback::new(1, msgs(&["Leaning forward"])),
            ],
            rep_count: 1,
        });
        session.state = SessionState::ResultsReady;
        let snapshot = session.snapshot();

        let rendered = rows(&snapshot.batch);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].label, "Frame 1:");
        assert_eq!(rendered[1].badges[0].badge, Badge::Error);
        assert_eq!(rendered[1].badges[0].text, "Leaning forward");

        let text = render_text(&snapshot);
        assert!(text.contains("Repetitions Counted: 1"));
        assert!(text.contains("Feedback per Frame"));
    }

    #[test]
    fn test_recorded_rows_use_position() {
        let timeline = FeedbackTimeline::from_frames(
            TimelineKind::RecordingLive,
            vec![FrameFeedback::new(7, vec![]), FrameFeedback::new(3, vec![])],
        );
        let labels: Vec<String> = rows(&timeline).into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["Frame 0:", "Frame 1:"]);
    }

    #[test]
    fn test_error_line_rendered() {
        let mut session = Session::default();
        session.set_error("Please select or record a video file.");
        let text = render_text(&session.snapshot());
        assert!(text.contains("Error: Please select or record a video file."));
    }
}
