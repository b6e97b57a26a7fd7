//! Typed events and the classification of raw queue entries.

use crate::event_queue::{NetworkEvent, QueueEntry};
use crate::protocol::feed::GAZE_TOPIC;
use crate::protocol::{Notification, NotificationFrame};

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    GazeReceived,
    CalibrationMarkerFound,
    CalibrationSampleCompleted,
    CalibrationMarkerTooFast,
    CalibrationSucceeded { method: String },
    CalibrationFailed { reason: String },
    RecordingStarted { path: String, session: Option<String> },
    RecordingStopped { path: String },
    NetworkPeerJoined { peer: String },
    NetworkPeerLeft { peer: String },
    Connected { endpoint: String },
    Disconnected { endpoint: String },
    Timeout,
}

/// Fieldless discriminant of [`EventKind`], used to ask for and key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    GazeReceived,
    CalibrationMarkerFound,
    CalibrationSampleCompleted,
    CalibrationMarkerTooFast,
    CalibrationSucceeded,
    CalibrationFailed,
    RecordingStarted,
    RecordingStopped,
    NetworkPeerJoined,
    NetworkPeerLeft,
    Connected,
    Disconnected,
    Timeout,
}

/// Callback slot an event is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Calibration,
    Recording,
    Network,
    Subscription,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::GazeReceived => EventType::GazeReceived,
            EventKind::CalibrationMarkerFound => EventType::CalibrationMarkerFound,
            EventKind::CalibrationSampleCompleted => EventType::CalibrationSampleCompleted,
            EventKind::CalibrationMarkerTooFast => EventType::CalibrationMarkerTooFast,
            EventKind::CalibrationSucceeded { .. } => EventType::CalibrationSucceeded,
            EventKind::CalibrationFailed { .. } => EventType::CalibrationFailed,
            EventKind::RecordingStarted { .. } => EventType::RecordingStarted,
            EventKind::RecordingStopped { .. } => EventType::RecordingStopped,
            EventKind::NetworkPeerJoined { .. } => EventType::NetworkPeerJoined,
            EventKind::NetworkPeerLeft { .. } => EventType::NetworkPeerLeft,
            EventKind::Connected { .. } => EventType::Connected,
            EventKind::Disconnected { .. } => EventType::Disconnected,
            EventKind::Timeout => EventType::Timeout,
        }
    }

    /// Gaze samples and timeout markers have no callback slot.
    pub fn category(&self) -> Option<EventCategory> {
        match self {
            EventKind::CalibrationMarkerFound
            | EventKind::CalibrationSampleCompleted
            | EventKind::CalibrationMarkerTooFast
            | EventKind::CalibrationSucceeded { .. }
            | EventKind::CalibrationFailed { .. } => Some(EventCategory::Calibration),
            EventKind::RecordingStarted { .. } | EventKind::RecordingStopped { .. } => {
                Some(EventCategory::Recording)
            }
            EventKind::NetworkPeerJoined { .. } | EventKind::NetworkPeerLeft { .. } => {
                Some(EventCategory::Network)
            }
            EventKind::Connected { .. } | EventKind::Disconnected { .. } => {
                Some(EventCategory::Subscription)
            }
            EventKind::GazeReceived | EventKind::Timeout => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Seconds since the UNIX epoch; the host's timestamp when it sent one.
    pub timestamp: f64,
    pub payload: Value,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: f64, payload: Value) -> Self {
        Self {
            kind,
            timestamp,
            payload,
        }
    }

    pub fn timeout(timestamp: f64) -> Self {
        Self::new(EventKind::Timeout, timestamp, Value::Null)
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }
}

/// Outcome of classifying one queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Event(Event),
    /// A recording notification this node published itself.
    Echo,
    /// A well-formed notification with no client-side meaning, such as the
    /// host-internal `should_*` requests.
    Ignored,
    /// Malformed or unrecognized input, kept for logging.
    Unknown(Value),
}

pub fn classify(entry: QueueEntry, own_source: &str) -> Classified {
    match entry {
        QueueEntry::Telemetry {
            topic,
            payload,
            received_at,
        } => {
            if topic.starts_with(GAZE_TOPIC) {
                Classified::Event(Event::new(EventKind::GazeReceived, received_at, payload))
            } else {
                Classified::Unknown(payload)
            }
        }
        QueueEntry::Notification {
            payload,
            received_at,
        } => match NotificationFrame::from(payload.clone()) {
            NotificationFrame::Known(notification) => {
                classify_notification(notification, payload, received_at, own_source)
            }
            NotificationFrame::Unknown(raw) => Classified::Unknown(raw),
        },
        QueueEntry::Network { event, received_at } => {
            let kind = match event {
                NetworkEvent::Connected { endpoint } => EventKind::Connected { endpoint },
                NetworkEvent::Disconnected { endpoint } => EventKind::Disconnected { endpoint },
                NetworkEvent::PeerJoined { peer } => EventKind::NetworkPeerJoined { peer },
                NetworkEvent::PeerLeft { peer } => EventKind::NetworkPeerLeft { peer },
            };
            Classified::Event(Event::new(kind, received_at, Value::Null))
        }
    }
}

fn classify_notification(
    notification: Notification,
    payload: Value,
    received_at: f64,
    own_source: &str,
) -> Classified {
    let timestamp = notification.timestamp().unwrap_or(received_at);

    let kind = match notification {
        Notification::CalibrationMarkerFound { .. } => EventKind::CalibrationMarkerFound,
        Notification::CalibrationSampleCompleted { .. } => EventKind::CalibrationSampleCompleted,
        Notification::CalibrationMarkerMovedTooQuickly { .. } => {
            EventKind::CalibrationMarkerTooFast
        }
        Notification::CalibrationSuccessful { method, .. } => {
            EventKind::CalibrationSucceeded { method }
        }
        Notification::CalibrationFailed { reason, .. } => EventKind::CalibrationFailed { reason },
        Notification::RecordingStarted {
            rec_path,
            session_name,
            source,
            ..
        } => {
            if source.as_deref() == Some(own_source) {
                return Classified::Echo;
            }
            EventKind::RecordingStarted {
                path: rec_path,
                session: session_name,
            }
        }
        Notification::RecordingStopped {
            rec_path, source, ..
        } => {
            if source.as_deref() == Some(own_source) {
                return Classified::Echo;
            }
            EventKind::RecordingStopped { path: rec_path }
        }
        Notification::ShouldStartCalibration { .. }
        | Notification::ShouldStopCalibration { .. }
        | Notification::ShouldStartRecording { .. }
        | Notification::ShouldStopRecording { .. } => return Classified::Ignored,
    };

    Classified::Event(Event::new(kind, timestamp, payload))
}
