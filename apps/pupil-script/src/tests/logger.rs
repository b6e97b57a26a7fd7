// Unit tests for logger module initialization logic

use crate::logger::{LOG_FILE_NAME, build_dispatch, initialize};

use std::path::PathBuf;

use tempfile::tempdir;

/// **VALUE**: Verifies that calling initialize() multiple times doesn't panic or fail.
///
/// **WHY THIS MATTERS**: A script and its helpers may both try to set up logging.
/// fern refuses a second global logger, which must not abort the run.
///
/// **BUG THIS CATCHES**: Would catch if the Once or AtomicBool guards are removed.
#[test]
fn given_logger_initialized_when_called_again_then_returns_ok() {
    // GIVEN: A writable directory
    let dir = tempdir().unwrap();

    // WHEN: Calling initialize twice
    let first = initialize(dir.path());
    let second = initialize(dir.path());

    // THEN: Both return Ok
    assert!(first.is_ok(), "First initialization should succeed");
    assert!(second.is_ok(), "Second initialization should be a no-op");
}

/// **VALUE**: Verifies an unusable log directory yields an error instead of a panic.
///
/// **BUG THIS CATCHES**: Would catch `fern::log_file()` being unwrapped.
#[test]
fn given_invalid_log_dir_when_dispatch_built_then_returns_script_error() {
    // GIVEN: A path under a regular file, which cannot be a directory
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN: Building the dispatch
    let result = build_dispatch(&invalid_dir);

    // THEN: A Script error mentions the directory
    let err = result.err().expect("Should fail for an invalid log directory");
    let text = format!("{err:?}");
    assert!(text.contains("Script"), "{text}");
    assert!(text.contains("/dev/null/invalid-path"), "{text}");
}

#[test]
fn given_writable_dir_when_dispatch_built_then_log_file_created() {
    // GIVEN: A writable directory
    let dir = tempdir().unwrap();

    // WHEN: Building the dispatch
    let result = build_dispatch(dir.path());

    // THEN: The log file exists
    assert!(result.is_ok());
    assert!(dir.path().join(LOG_FILE_NAME).exists());
}
