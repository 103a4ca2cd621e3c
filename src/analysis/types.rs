//! Analysis service request/response types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message the service uses for a frame with nothing to correct.
pub const GOOD_POSTURE: &str = "Good posture";

/// Synthetic feedback used when a live frame could not be analyzed.
pub const FRAME_ERROR_MESSAGE: &str = "Error analyzing frame";

/// Server-side ruleset selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Squat,
    Pushup,
    Desk,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Squat => "squat",
            Mode::Pushup => "pushup",
            Mode::Desk => "desk",
        }
    }

    /// Label shown in the exercise picker
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Squat => "Squat",
            Mode::Pushup => "Pushup",
            Mode::Desk => "Desk Posture",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "squat" => Ok(Mode::Squat),
            "pushup" => Ok(Mode::Pushup),
            "desk" => Ok(Mode::Desk),
            other => Err(format!("unknown mode '{other}' (expected squat, pushup or desk)")),
        }
    }
}

/// Feedback for one analyzed frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFeedback {
    /// Frame ordinal within its run
    pub frame: u64,

    /// Ordered feedback messages
    #[serde(rename = "feedback", default)]
    pub messages: Vec<String>,
}

impl FrameFeedback {
    pub fn new(frame: u64, messages: Vec<String>) -> Self {
        Self { frame, messages }
    }

    pub fn is_conforming(&self) -> bool {
        is_conforming(&self.messages)
    }
}

/// A frame conforms when it has no messages or exactly `["Good posture"]`.
pub fn is_conforming(messages: &[String]) -> bool {
    match messages {
        [] => true,
        [only] => only == GOOD_POSTURE,
        _ => false,
    }
}

/// Result of a batch upload-and-analyze run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    /// Per-frame feedback, in service order
    pub frames: Vec<FrameFeedback>,

    /// Repetitions counted by the service
    pub rep_count: u32,
}

/// `POST /upload` response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub results: Option<BatchAnalysis>,
}

/// `POST /analyze_frame` request body
#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeFrameRequest<'a> {
    pub image: &'a str,
}

/// `POST /analyze_frame` response body
#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeFrameResponse {
    pub feedback: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_conforming_predicate() {
        assert!(is_conforming(&[]));
        assert!(is_conforming(&msgs(&["Good posture"])));
        assert!(!is_conforming(&msgs(&["Knee too far forward"])));
        assert!(!is_conforming(&msgs(&["Good posture", "Good posture"])));
        assert!(!is_conforming(&msgs(&[FRAME_ERROR_MESSAGE])));
    }

    #[test]
    fn test_mode_round_trips_through_str() {
        assert_eq!("Pushup".parse::<Mode>().unwrap(), Mode::Pushup);
        assert_eq!(Mode::Desk.to_string(), "desk");
        assert!("plank".parse::<Mode>().is_err());
        assert_eq!(Mode::default(), Mode::Squat);
    }

    #[test]
    fn test_frame_feedback_wire_format() {
        let feedback: FrameFeedback =
            serde_json::from_str(r#"{"frame": 4, "feedback": ["Leaning forward"]}"#).unwrap();
        assert_eq!(feedback.frame, 4);
        assert_eq!(feedback.messages, msgs(&["Leaning forward"]));

        let json = serde_json::to_value(&FrameFeedback::new(1, vec![])).unwrap();
        assert_eq!(json, serde_json::json!({"frame": 1, "feedback": []}));
    }
}
