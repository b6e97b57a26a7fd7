//! Host-side command handling and response correlation.
//!
//! The dispatcher enforces one active task per [`ActionKind`]. A start command
//! for a free slot records its task id and asks the engine to act; engine
//! notifications for that kind are translated into [`TaskResponse`]s tagged
//! with the recorded id until a terminal one frees the slot.

use crate::config::HostConfig;
use crate::host::engine::TrackingEngine;
use crate::protocol::status::{
    CALIBRATION_FAILED, CALIBRATION_MARKER_MOVED_TOO_QUICKLY, CALIBRATION_SAMPLE_COMPLETED,
    CALIBRATION_STEADY_MARKER_FOUND, CALIBRATION_SUCCESSFUL, RECORDING_STARTED,
    RECORDING_STOPPED, is_terminal,
};
use crate::protocol::{
    ActionKind, CommandFrame, ControlMessage, Notification, TaskId, TaskResponse,
};

use log::{debug, info, warn};
use serde_json::Value;

/// Active task per action kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionSlots {
    calibration: Option<TaskId>,
    recording: Option<TaskId>,
}

impl ActionSlots {
    pub fn get(&self, kind: ActionKind) -> Option<TaskId> {
        match kind {
            ActionKind::Calibration => self.calibration,
            ActionKind::Recording => self.recording,
        }
    }

    pub fn is_free(&self, kind: ActionKind) -> bool {
        self.get(kind).is_none()
    }

    fn slot_mut(&mut self, kind: ActionKind) -> &mut Option<TaskId> {
        match kind {
            ActionKind::Calibration => &mut self.calibration,
            ActionKind::Recording => &mut self.recording,
        }
    }
}

/// What the connection loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Send this response to the script right away.
    Reply(TaskResponse),
    /// Forwarded or handled; responses, if any, follow as notifications.
    Accepted,
    /// The script asked to end the session.
    Exit,
    Ignored,
}

pub struct CommandDispatcher<E> {
    identity: String,
    default_session_name: String,
    slots: ActionSlots,
    engine: E,
}

impl<E: TrackingEngine> CommandDispatcher<E> {
    pub fn new(config: &HostConfig, engine: E) -> Self {
        Self {
            identity: config.identity.clone(),
            default_session_name: config.default_session_name.clone(),
            slots: ActionSlots::default(),
            engine,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn slots(&self) -> ActionSlots {
        self.slots
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn handle_frame(&mut self, frame: CommandFrame) -> DispatchOutcome {
        match frame {
            CommandFrame::Known(message) => self.handle_command(message),
            CommandFrame::Unknown(raw) => {
                warn!("Ignoring unknown command: {raw}");
                DispatchOutcome::Ignored
            }
        }
    }

    pub fn handle_command(&mut self, message: ControlMessage) -> DispatchOutcome {
        match message {
            ControlMessage::StartCalibration { id, .. } => {
                let request = Notification::ShouldStartCalibration {
                    source: Some(self.identity.clone()),
                };
                self.start(id, ActionKind::Calibration, request)
            }
            ControlMessage::StartRecording { id, context, .. } => {
                let request = Notification::ShouldStartRecording {
                    session_name: self.session_name(context.as_ref()),
                    source: Some(self.identity.clone()),
                };
                self.start(id, ActionKind::Recording, request)
            }
            ControlMessage::StopCalibration { .. } => {
                self.engine.notify_all(Notification::ShouldStopCalibration {
                    source: Some(self.identity.clone()),
                });
                DispatchOutcome::Accepted
            }
            ControlMessage::StopRecording { .. } => {
                self.engine.notify_all(Notification::ShouldStopRecording {
                    source: Some(self.identity.clone()),
                });
                DispatchOutcome::Accepted
            }
            ControlMessage::Trigger {
                timestamp,
                frame_id,
                context,
            } => {
                info!("Trigger at {timestamp:.6} (frame {frame_id:?}): {context:?}");
                DispatchOutcome::Accepted
            }
            ControlMessage::Exit { .. } => {
                info!("Script requested exit");
                DispatchOutcome::Exit
            }
        }
    }

    /// Translate an engine notification into a response for the active task
    /// of its kind. Returns `None` for echoes, host-internal requests, and
    /// kinds with no active task.
    pub fn on_notify(&mut self, notification: &Notification) -> Option<TaskResponse> {
        if notification.is_echo_of(&self.identity) {
            return None;
        }

        let (kind, status, status_code, result) = match notification {
            Notification::CalibrationMarkerFound { .. } => (
                ActionKind::Calibration,
                "calibration marker found",
                CALIBRATION_STEADY_MARKER_FOUND,
                None,
            ),
            Notification::CalibrationSampleCompleted { .. } => (
                ActionKind::Calibration,
                "calibration marker sample completed",
                CALIBRATION_SAMPLE_COMPLETED,
                None,
            ),
            Notification::CalibrationMarkerMovedTooQuickly { .. } => (
                ActionKind::Calibration,
                "calibration marker moved too quickly",
                CALIBRATION_MARKER_MOVED_TOO_QUICKLY,
                None,
            ),
            Notification::CalibrationSuccessful { method, .. } => (
                ActionKind::Calibration,
                "calibration successful",
                CALIBRATION_SUCCESSFUL,
                Some(Value::String(method.clone())),
            ),
            Notification::CalibrationFailed { reason, .. } => (
                ActionKind::Calibration,
                "calibration failed",
                CALIBRATION_FAILED,
                Some(Value::String(reason.clone())),
            ),
            Notification::RecordingStarted { rec_path, .. } => (
                ActionKind::Recording,
                "recording started",
                RECORDING_STARTED,
                Some(Value::String(rec_path.clone())),
            ),
            Notification::RecordingStopped { rec_path, .. } => (
                ActionKind::Recording,
                "recording stopped",
                RECORDING_STOPPED,
                Some(Value::String(rec_path.clone())),
            ),
            Notification::ShouldStartCalibration { .. }
            | Notification::ShouldStopCalibration { .. }
            | Notification::ShouldStartRecording { .. }
            | Notification::ShouldStopRecording { .. } => return None,
        };

        let Some(task_id) = self.slots.get(kind) else {
            debug!("No active {kind} task for '{}'", notification.subject());
            return None;
        };

        if is_terminal(status_code) {
            debug!("Releasing {kind} slot held by task {task_id}");
            *self.slots.slot_mut(kind) = None;
        }

        Some(TaskResponse::new(task_id, status, status_code, result))
    }

    /// Abandon all active tasks, e.g. when the script disconnects.
    pub fn release_all(&mut self) {
        if self.slots != ActionSlots::default() {
            info!("Releasing action slots: {:?}", self.slots);
        }
        self.slots = ActionSlots::default();
    }

    fn start(&mut self, id: TaskId, kind: ActionKind, request: Notification) -> DispatchOutcome {
        let slot = self.slots.slot_mut(kind);
        if let Some(active) = *slot {
            warn!("Rejecting {kind} task {id}: task {active} still active");
            return DispatchOutcome::Reply(TaskResponse::already_running(id, kind));
        }

        *slot = Some(id);
        info!("Starting {kind} for task {id}");
        self.engine.notify_all(request);
        DispatchOutcome::Accepted
    }

    fn session_name(&self, context: Option<&Value>) -> String {
        context
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_session_name.clone())
    }
}
