//! Wire types shared by the script side and the host side.
//!
//! Every channel speaks JSON. Each message family has a stable discriminant
//! field (`subject` for notifications, `cmd` for control commands, `topic` for
//! feed frames) and a frame wrapper whose `Unknown` variant keeps messages with
//! an unrecognized or malformed discriminant instead of failing the parse.

pub mod command;
pub mod feed;
pub mod notification;
pub mod status;

pub use command::{CommandFrame, ControlMessage, TaskResponse};
pub use feed::{FeedFrame, NetworkAnnouncement, SubscribeRequest};
pub use notification::{Notification, NotificationFrame};

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier correlating a start command with its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{}", self.0)
    }
}

/// Kinds of long-running host actions. The host allows one active task per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Calibration,
    Recording,
}

impl Display for ActionKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            ActionKind::Calibration => write!(formatter, "calibration"),
            ActionKind::Recording => write!(formatter, "recording"),
        }
    }
}
