//! Mailbox between the listener thread and the consumer thread.
//!
//! The listener pushes, the consumer drains. Pushes bump a generation counter
//! under the same lock the consumer waits on, so an activity signal that fires
//! between "is there work" and "go to sleep" is never lost: the consumer sees
//! the counter moved and returns without sleeping.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

/// Connection and peer membership changes seen by the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected { endpoint: String },
    Disconnected { endpoint: String },
    PeerJoined { peer: String },
    PeerLeft { peer: String },
}

/// A raw, not yet classified inbound item.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
    Telemetry {
        topic: String,
        payload: Value,
        received_at: f64,
    },
    Notification {
        payload: Value,
        received_at: f64,
    },
    Network {
        event: NetworkEvent,
        received_at: f64,
    },
}

impl QueueEntry {
    pub fn received_at(&self) -> f64 {
        match self {
            QueueEntry::Telemetry { received_at, .. }
            | QueueEntry::Notification { received_at, .. }
            | QueueEntry::Network { received_at, .. } => *received_at,
        }
    }
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    pushes: u64,
    seen: u64,
}

/// Unbounded FIFO with a wake-on-push signal.
///
/// Single producer, single consumer. `push` never blocks for longer than the
/// lock hold and never drops an entry.
#[derive(Default)]
pub struct EventQueue {
    state: Mutex<QueueState>,
    activity: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: QueueEntry) {
        let mut state = self.lock();
        state.entries.push_back(entry);
        state.pushes = state.pushes.wrapping_add(1);
        drop(state);
        self.activity.notify_all();
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&self) -> Vec<QueueEntry> {
        self.lock().entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Block until a push happened since the previous call, or `timeout` elapses.
    ///
    /// `None` waits indefinitely; a zero timeout only checks. Returns whether
    /// any push was observed.
    pub fn wait_for_activity(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.lock();

        if state.pushes == state.seen {
            state = match timeout {
                None => self
                    .activity
                    .wait_while(state, |s| s.pushes == s.seen)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(timeout) if timeout.is_zero() => state,
                Some(timeout) => {
                    self.activity
                        .wait_timeout_while(state, timeout, |s| s.pushes == s.seen)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        let active = state.pushes != state.seen;
        state.seen = state.pushes;
        active
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking producer cannot leave the VecDeque half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
