use pupil_script::error::ScriptError;
use pupil_script::logger::initialize as LoggerInitialize;
use pupil_script::session::{SessionPlan, run_session};

use pupil_core::Communicator;
use pupil_core::config::PupilConfig;
use pupil_core::error::CoreError;

use common::ErrorLocation;

use std::env;
use std::fs::create_dir_all;
use std::panic::Location;
use std::process::ExitCode;

use log::{error, info};

const LOG_DIR_NAME: &str = "pupil-interface";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ScriptError> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join(LOG_DIR_NAME)
        .join("logs");
    create_dir_all(&log_dir).map_err(|e| ScriptError::Script {
        message: format!("Failed to create log directory {}: {e}", log_dir.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&log_dir)?;
    info!("Log directory: {}", log_dir.display());

    let plan = SessionPlan::from_args(env::args().skip(1))?;
    let config = PupilConfig::load_default().map_err(CoreError::from)?;
    info!(
        "Connecting to {} (feed {})",
        config.interface.control_address, config.interface.sub_address
    );

    let mut communicator = Communicator::connect(config.interface)?;
    let outcome = run_session(&mut communicator, &plan);
    communicator.close()?;

    let report = outcome?;
    info!(
        "Session done: calibrated with {}, recorded {} gaze samples to {}",
        report.calibration_method, report.gaze_samples, report.recording_path
    );
    Ok(())
}
