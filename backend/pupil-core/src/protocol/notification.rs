//! Host notifications.
//!
//! Notifications describe host-side state transitions. The engine emits the
//! calibration and recording lifecycle subjects; the dispatcher emits the
//! `should_*` subjects to ask the engine to act.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subject")]
pub enum Notification {
    #[serde(rename = "calibration marker found")]
    CalibrationMarkerFound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "calibration marker sample completed")]
    CalibrationSampleCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "calibration marker moved too quickly")]
    CalibrationMarkerMovedTooQuickly {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "calibration_successful")]
    CalibrationSuccessful {
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "calibration_failed")]
    CalibrationFailed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "rec_started")]
    RecordingStarted {
        rec_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "rec_stopped")]
    RecordingStopped {
        rec_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    #[serde(rename = "should_start_calibration")]
    ShouldStartCalibration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    #[serde(rename = "should_stop_calibration")]
    ShouldStopCalibration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    #[serde(rename = "should_start_recording")]
    ShouldStartRecording {
        session_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    #[serde(rename = "should_stop_recording")]
    ShouldStopRecording {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::CalibrationMarkerFound { .. } => "calibration marker found",
            Notification::CalibrationSampleCompleted { .. } => {
                "calibration marker sample completed"
            }
            Notification::CalibrationMarkerMovedTooQuickly { .. } => {
                "calibration marker moved too quickly"
            }
            Notification::CalibrationSuccessful { .. } => "calibration_successful",
            Notification::CalibrationFailed { .. } => "calibration_failed",
            Notification::RecordingStarted { .. } => "rec_started",
            Notification::RecordingStopped { .. } => "rec_stopped",
            Notification::ShouldStartCalibration { .. } => "should_start_calibration",
            Notification::ShouldStopCalibration { .. } => "should_stop_calibration",
            Notification::ShouldStartRecording { .. } => "should_start_recording",
            Notification::ShouldStopRecording { .. } => "should_stop_recording",
        }
    }

    /// Identity of the node that emitted the notification, when it says so.
    pub fn source(&self) -> Option<&str> {
        match self {
            Notification::RecordingStarted { source, .. }
            | Notification::RecordingStopped { source, .. }
            | Notification::ShouldStartCalibration { source }
            | Notification::ShouldStopCalibration { source }
            | Notification::ShouldStartRecording { source, .. }
            | Notification::ShouldStopRecording { source } => source.as_deref(),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Notification::CalibrationMarkerFound { timestamp }
            | Notification::CalibrationSampleCompleted { timestamp }
            | Notification::CalibrationMarkerMovedTooQuickly { timestamp }
            | Notification::CalibrationSuccessful { timestamp, .. }
            | Notification::CalibrationFailed { timestamp, .. }
            | Notification::RecordingStarted { timestamp, .. }
            | Notification::RecordingStopped { timestamp, .. } => *timestamp,
            _ => None,
        }
    }

    /// True for notifications the given node published itself.
    pub fn is_echo_of(&self, identity: &str) -> bool {
        self.source() == Some(identity)
    }
}

/// A notification as read off the wire.
///
/// Unrecognized subjects, and recognized subjects missing a required field,
/// land in `Unknown` with the raw JSON preserved for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationFrame {
    Known(Notification),
    Unknown(Value),
}

impl From<Value> for NotificationFrame {
    fn from(value: Value) -> Self {
        match Notification::deserialize(&value) {
            Ok(notification) => NotificationFrame::Known(notification),
            Err(_) => NotificationFrame::Unknown(value),
        }
    }
}
