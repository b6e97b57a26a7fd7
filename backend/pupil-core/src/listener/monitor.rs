//! Connection-state events for the subscribe socket.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Connected { endpoint: String },
    Disconnected { endpoint: String },
}

impl MonitorEvent {
    pub fn endpoint(&self) -> &str {
        match self {
            MonitorEvent::Connected { endpoint } | MonitorEvent::Disconnected { endpoint } => {
                endpoint
            }
        }
    }
}
