use common::ErrorLocation;

use pupil_core::error::CoreError;

use std::panic::Location;

use thiserror::Error;

/// Errors that end a script run.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Error from this app (logging, arguments, directories)
    #[error("Script Error: {message} {location}")]
    Script {
        message: String,
        location: ErrorLocation,
    },

    /// Error from pupil-core (config, control channel, listener)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Calibration failed, was rejected, or did not finish in time
    #[error("Calibration Error: {message} {location}")]
    Calibration {
        message: String,
        location: ErrorLocation,
    },

    /// Recording failed to start or stop
    #[error("Recording Error: {message} {location}")]
    Recording {
        message: String,
        location: ErrorLocation,
    },
}

impl From<CoreError> for ScriptError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        ScriptError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
