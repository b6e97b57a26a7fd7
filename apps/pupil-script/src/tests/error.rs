// Unit tests for error module
// Tests conversion from pupil-core errors and display formatting

use crate::error::ScriptError;

use pupil_core::error::CoreError;
use pupil_core::error::channel::ChannelError;

use common::ErrorLocation;

use std::panic::Location;

/// **VALUE**: Verifies core errors keep their message when they become script errors.
///
/// **WHY THIS MATTERS**: `?` on core calls is the main way failures surface in a
/// script; a lossy conversion would hide why a session ended.
///
/// **BUG THIS CATCHES**: Would catch a `From` impl that drops the inner message or
/// maps to the wrong variant.
#[test]
fn given_core_error_when_converted_then_core_variant_keeps_message() {
    // GIVEN: A channel error wrapped in CoreError
    let core = CoreError::from(ChannelError::Closed {
        message: String::from("Pipe peer hung up"),
        location: ErrorLocation::from(Location::caller()),
    });

    // WHEN: Converting to ScriptError
    let err = ScriptError::from(core);

    // THEN: It is the Core variant and still names the cause
    match err {
        ScriptError::Core { message, .. } => {
            assert!(message.contains("Pipe peer hung up"), "{message}");
        }
        other => panic!("Expected Core variant, got {other:?}"),
    }
}

#[test]
fn given_calibration_error_when_displayed_then_prefix_message_and_location() {
    // GIVEN: A calibration error
    let err = ScriptError::Calibration {
        message: String::from("lost pupil"),
        location: ErrorLocation::from(Location::caller()),
    };

    // WHEN: Formatting for the log
    let text = err.to_string();

    // THEN: Prefix, message, and source position are all there
    assert!(text.starts_with("Calibration Error: lost pupil"), "{text}");
    assert!(text.contains("error.rs"), "{text}");
}
