//! Pub/sub feed framing.
//!
//! The publisher sends one [`FeedFrame`] per WebSocket text message. A
//! subscriber announces its topic prefixes with a [`SubscribeRequest`] right
//! after connecting; frames whose topic does not start with one of them are
//! not delivered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GAZE_TOPIC: &str = "gaze_positions";
pub const NOTIFY_TOPIC: &str = "notify";
pub const NETWORK_TOPIC: &str = "network";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedFrame {
    pub topic: String,
    pub payload: Value,
}

impl FeedFrame {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscribe: Vec<String>,
}

/// Peer membership changes announced on [`NETWORK_TOPIC`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetworkAnnouncement {
    PeerJoined { peer: String },
    PeerLeft { peer: String },
}

/// Prefix match, the same rule the publisher applies.
pub fn topic_matches<S: AsRef<str>>(subscriptions: &[S], topic: &str) -> bool {
    subscriptions
        .iter()
        .any(|prefix| topic.starts_with(prefix.as_ref()))
}
