//! Control channel messages.
//!
//! The script sends [`ControlMessage`]s to the host; the host answers start
//! commands with [`TaskResponse`]s tagged by task id. Replies for different
//! tasks interleave on the same channel.

use crate::protocol::status::{
    PROCEDURE_ALREADY_INITIATED, STATUS_UNSPECIFIED, UNSPECIFIED_STATUS_TEXT,
};
use crate::protocol::{ActionKind, TaskId};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum ControlMessage {
    StartCalibration {
        id: TaskId,
        timestamp: f64,
        #[serde(default)]
        context: Option<Value>,
    },
    StopCalibration {
        timestamp: f64,
    },
    StartRecording {
        id: TaskId,
        timestamp: f64,
        /// Session name, when the script supplied one.
        #[serde(default)]
        context: Option<Value>,
    },
    StopRecording {
        timestamp: f64,
    },
    Trigger {
        timestamp: f64,
        #[serde(default, rename = "frameid")]
        frame_id: Option<u64>,
        #[serde(default)]
        context: Option<Value>,
    },
    Exit {
        #[serde(default)]
        timestamp: Option<f64>,
    },
}

impl ControlMessage {
    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            ControlMessage::StartCalibration { .. } | ControlMessage::StopCalibration { .. } => {
                Some(ActionKind::Calibration)
            }
            ControlMessage::StartRecording { .. } | ControlMessage::StopRecording { .. } => {
                Some(ActionKind::Recording)
            }
            ControlMessage::Trigger { .. } | ControlMessage::Exit { .. } => None,
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            ControlMessage::StartCalibration { id, .. }
            | ControlMessage::StartRecording { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// A control message as read off the wire; unknown `cmd` values are kept raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandFrame {
    Known(ControlMessage),
    Unknown(Value),
}

impl From<Value> for CommandFrame {
    fn from(value: Value) -> Self {
        match ControlMessage::deserialize(&value) {
            Ok(message) => CommandFrame::Known(message),
            Err(_) => CommandFrame::Unknown(value),
        }
    }
}

fn default_status() -> String {
    UNSPECIFIED_STATUS_TEXT.to_string()
}

fn default_status_code() -> i32 {
    STATUS_UNSPECIFIED
}

/// Host reply for one task. Missing fields fall back to "unspecified".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub id: Option<TaskId>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(rename = "statusCode", default = "default_status_code")]
    pub status_code: i32,
    #[serde(default)]
    pub result: Option<Value>,
}

impl TaskResponse {
    pub fn new(
        id: TaskId,
        status: impl Into<String>,
        status_code: i32,
        result: Option<Value>,
    ) -> Self {
        Self {
            id: Some(id),
            status: status.into(),
            status_code,
            result,
        }
    }

    /// Policy rejection for a start command whose action slot is taken.
    pub fn already_running(id: TaskId, kind: ActionKind) -> Self {
        let status = match kind {
            ActionKind::Calibration => "Warning: Calibration already running.",
            ActionKind::Recording => "Warning: Recording already running.",
        };
        Self::new(id, status, PROCEDURE_ALREADY_INITIATED, None)
    }
}
