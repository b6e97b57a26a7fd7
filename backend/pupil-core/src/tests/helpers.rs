//! Shared fixtures for unit tests.

use crate::config::{HostConfig, InterfaceConfig};
use crate::event_queue::QueueEntry;
use crate::host::TrackingEngine;
use crate::protocol::Notification;

use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Nothing listens on the discard port, so the listener keeps retrying
/// quietly and never pushes anything on its own.
pub const UNREACHABLE_FEED: &str = "ws://127.0.0.1:9";

pub fn interface_config() -> InterfaceConfig {
    InterfaceConfig {
        sub_address: UNREACHABLE_FEED.to_string(),
        ..InterfaceConfig::default()
    }
}

pub fn host_config() -> HostConfig {
    HostConfig::default()
}

/// Engine double that remembers every notification it was asked to deliver.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingEngine {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl TrackingEngine for RecordingEngine {
    fn notify_all(&mut self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub fn notification_entry(payload: Value) -> QueueEntry {
    QueueEntry::Notification {
        payload,
        received_at: 1.0,
    }
}
