//! Status codes carried in `TaskResponse::status_code`.
//!
//! Positive codes mean the task is still in progress. Zero is a graceful
//! finish and negative codes are failures; both are terminal.

/// Status of a task that has not heard back from the host yet.
pub const STATUS_PENDING: i32 = 1;
pub const STATUS_UNSPECIFIED: i32 = -1;
pub const PROCEDURE_ALREADY_INITIATED: i32 = -2;

pub const CALIBRATION_MARKER_MOVED_TOO_QUICKLY: i32 = 13;
pub const CALIBRATION_STEADY_MARKER_FOUND: i32 = 12;
pub const CALIBRATION_SAMPLE_COMPLETED: i32 = 11;
pub const CALIBRATION_SUCCESSFUL: i32 = 0;
pub const CALIBRATION_FAILED: i32 = -11;

pub const RECORDING_STARTED: i32 = 21;
pub const RECORDING_STOPPED: i32 = 0;

pub const UNSPECIFIED_STATUS_TEXT: &str = "unspecified";
pub const PENDING_STATUS_TEXT: &str = "pending";

/// A terminal task receives no further updates.
pub const fn is_terminal(status_code: i32) -> bool {
    status_code <= 0
}
