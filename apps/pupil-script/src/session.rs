//! Calibrate-then-record session.
//!
//! The script calibrates, starts a recording, keeps the event queue drained
//! for the planned duration, and stops the recording again. Every step is
//! driven through a [`Communicator`]; callbacks only log.

use crate::error::ScriptError;

use pupil_core::communicator::EventCallback;
use pupil_core::deadline::Deadline;
use pupil_core::protocol::status::RECORDING_STARTED;
use pupil_core::{Communicator, Event, EventKind, StatusResponse};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};

const DEFAULT_CALIBRATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RECORDING_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

pub const USAGE: &str = "usage: pupil-script [SESSION_NAME] [RECORDING_SECONDS]";

/// Label of the trigger sent once the recording is running.
pub const START_TRIGGER_LABEL: &str = "session_start";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    /// `None` leaves the name to the configured default.
    pub session_name: Option<String>,
    pub calibration_timeout: Duration,
    pub recording_duration: Duration,
    /// How long to wait for the host to confirm a recording start or stop.
    pub response_timeout: Duration,
}

impl Default for SessionPlan {
    fn default() -> Self {
        Self {
            session_name: None,
            calibration_timeout: DEFAULT_CALIBRATION_TIMEOUT,
            recording_duration: DEFAULT_RECORDING_DURATION,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl SessionPlan {
    /// Build a plan from `[SESSION_NAME] [RECORDING_SECONDS]`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Script`] for a non-numeric duration or extra
    /// arguments.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, ScriptError> {
        let mut plan = Self {
            session_name: args.next(),
            ..Self::default()
        };

        if let Some(seconds) = args.next() {
            let seconds = seconds.parse::<u64>().map_err(|e| ScriptError::Script {
                message: format!("Invalid recording duration '{seconds}' ({e}); {USAGE}"),
                location: ErrorLocation::from(Location::caller()),
            })?;
            plan.recording_duration = Duration::from_secs(seconds);
        }

        if args.next().is_some() {
            return Err(ScriptError::Script {
                message: USAGE.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub calibration_method: String,
    pub recording_path: String,
    pub gaze_samples: usize,
    /// The host stopped the recording before the planned duration was up.
    pub stopped_early: bool,
}

/// Run one full session.
///
/// # Errors
///
/// - [`ScriptError::Calibration`] if calibration fails, is rejected, or times out
/// - [`ScriptError::Recording`] if the recording does not start or stop cleanly
/// - [`ScriptError::Core`] if a command cannot be sent
pub fn run_session(
    communicator: &mut Communicator,
    plan: &SessionPlan,
) -> Result<SessionReport, ScriptError> {
    install_log_callbacks(communicator);

    let calibration_method = calibrate(communicator, plan.calibration_timeout)?;
    info!("Calibrated with {calibration_method}");

    let recording = communicator.start_recording(plan.session_name.as_deref(), None)?;
    let started = recording.wait(Some(plan.response_timeout));
    if started.status_code != RECORDING_STARTED {
        return Err(ScriptError::Recording {
            message: format!("Recording did not start: {}", describe(&started)),
            location: ErrorLocation::from(Location::caller()),
        });
    }
    let recording_path = result_text(&started);
    info!("Recording to {recording_path}");

    communicator.trigger(None, Some(json!({ "label": START_TRIGGER_LABEL })))?;

    let (gaze_samples, stopped_early) = record(communicator, plan.recording_duration);
    if stopped_early {
        warn!("Recording stopped by the host before {:?}", plan.recording_duration);
    } else {
        communicator.stop_recording(None)?;
    }

    let stopped = recording.wait_until_finished(Some(plan.response_timeout));
    if !stopped.is_success() {
        return Err(ScriptError::Recording {
            message: format!("Recording did not stop cleanly: {}", describe(&stopped)),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(SessionReport {
        calibration_method,
        recording_path,
        gaze_samples,
        stopped_early,
    })
}

/// Start calibrating and block until it finishes. Aborts the calibration on
/// timeout.
pub fn calibrate(
    communicator: &mut Communicator,
    timeout: Duration,
) -> Result<String, ScriptError> {
    let status = communicator.start_calibration(None, None)?;
    let response = status.wait_until_finished(Some(timeout));

    if !response.is_finished() {
        communicator.stop_calibration(None)?;
        return Err(ScriptError::Calibration {
            message: format!(
                "Calibration did not finish within {timeout:?}, last status: {}",
                describe(&response)
            ),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    if !response.is_success() {
        return Err(ScriptError::Calibration {
            message: format!("Calibration failed: {}", describe(&response)),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(result_text(&response))
}

/// Drain events until `duration` elapses or the host reports the recording
/// stopped. Returns the number of gaze samples seen and whether it stopped
/// early.
fn record(communicator: &mut Communicator, duration: Duration) -> (usize, bool) {
    let deadline = Deadline::after(Some(duration));
    let queue = communicator.event_queue();
    let mut gaze_samples = 0;

    loop {
        for event in communicator.check_events() {
            match event.kind {
                EventKind::GazeReceived => gaze_samples += 1,
                EventKind::RecordingStopped { .. } => return (gaze_samples, true),
                _ => {}
            }
        }

        if deadline.has_expired() {
            return (gaze_samples, false);
        }
        queue.wait_for_activity(deadline.remaining());
    }
}

fn install_log_callbacks(communicator: &mut Communicator) {
    communicator.set_calibration_callback(log_event("calibration"));
    communicator.set_recording_callback(log_event("recording"));
    communicator.set_network_callback(log_event("network"));
    communicator.set_subscription_callback(Box::new(|event: &Event| match &event.kind {
        EventKind::Connected { endpoint } => info!("Listening on {endpoint}"),
        EventKind::Disconnected { endpoint } => warn!("Lost feed {endpoint}"),
        other => debug!("subscription: {other:?}"),
    }));
}

fn log_event(category: &'static str) -> EventCallback {
    Box::new(move |event: &Event| info!("{category}: {:?}", event.kind))
}

fn describe(response: &StatusResponse) -> String {
    match &response.result {
        Some(result) => format!(
            "{} ({}): {}",
            response.status,
            response.status_code,
            text_of(result)
        ),
        None => format!("{} ({})", response.status, response.status_code),
    }
}

fn result_text(response: &StatusResponse) -> String {
    response.result.as_ref().map(text_of).unwrap_or_default()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
