use crate::host::{CommandDispatcher, DispatchOutcome};
use crate::protocol::status::{
    CALIBRATION_FAILED, PROCEDURE_ALREADY_INITIATED, RECORDING_STARTED, RECORDING_STOPPED,
};
use crate::protocol::{ActionKind, CommandFrame, ControlMessage, Notification, TaskId};
use crate::tests::helpers::{RecordingEngine, host_config};

use serde_json::json;

fn dispatcher() -> (CommandDispatcher<RecordingEngine>, RecordingEngine) {
    let engine = RecordingEngine::default();
    (CommandDispatcher::new(&host_config(), engine.clone()), engine)
}

fn start_calibration(id: TaskId) -> ControlMessage {
    ControlMessage::StartCalibration {
        id,
        timestamp: 1.0,
        context: None,
    }
}

fn start_recording(id: TaskId, session: Option<&str>) -> ControlMessage {
    ControlMessage::StartRecording {
        id,
        timestamp: 1.0,
        context: session.map(|name| json!(name)),
    }
}

#[test]
fn given_free_slot_when_start_calibration_then_slot_taken_and_engine_asked() {
    // GIVEN: An idle dispatcher
    let (mut dispatcher, engine) = dispatcher();
    let id = TaskId::new();

    // WHEN: A calibration is requested
    let outcome = dispatcher.handle_command(start_calibration(id));

    // THEN: Accepted, slot recorded, engine asked with our identity as source
    assert_eq!(outcome, DispatchOutcome::Accepted);
    assert_eq!(dispatcher.slots().get(ActionKind::Calibration), Some(id));
    assert_eq!(
        engine.sent(),
        vec![Notification::ShouldStartCalibration {
            source: Some("Script_Loader".to_string()),
        }]
    );
}

/// **VALUE**: Verifies the one-active-task-per-kind policy.
///
/// **WHY THIS MATTERS**: Two overlapping calibrations would fight over the same
/// marker stream and both report garbage.
///
/// **BUG THIS CATCHES**: Would catch a second start being forwarded to the engine,
/// or the rejection overwriting the first task's slot.
#[test]
fn given_active_calibration_when_started_again_then_rejected_without_engine_call() {
    // GIVEN: A running calibration
    let (mut dispatcher, engine) = dispatcher();
    let first = TaskId::new();
    let second = TaskId::new();
    dispatcher.handle_command(start_calibration(first));

    // WHEN: Another calibration is requested
    let outcome = dispatcher.handle_command(start_calibration(second));

    // THEN: Immediate terminal rejection for the second task only
    match outcome {
        DispatchOutcome::Reply(response) => {
            assert_eq!(response.id, Some(second));
            assert_eq!(response.status_code, PROCEDURE_ALREADY_INITIATED);
            assert_eq!(response.status, "Warning: Calibration already running.");
        }
        other => panic!("Expected a rejection reply, got {other:?}"),
    }
    assert_eq!(engine.sent().len(), 1, "Second start must not reach the engine");
    assert_eq!(dispatcher.slots().get(ActionKind::Calibration), Some(first));
}

/// **VALUE**: Walks a failing calibration through the dispatcher.
///
/// **BUG THIS CATCHES**: Would catch progress codes freeing the slot, or a terminal
/// failure leaving it occupied so every later calibration is rejected.
#[test]
fn given_running_calibration_when_engine_reports_progress_then_failure_then_slot_freed() {
    // GIVEN: A running calibration
    let (mut dispatcher, _engine) = dispatcher();
    let id = TaskId::new();
    dispatcher.handle_command(start_calibration(id));

    // WHEN: Marker found, samples completed, then failure
    let found = dispatcher
        .on_notify(&Notification::CalibrationMarkerFound { timestamp: None })
        .unwrap();
    for _ in 0..3 {
        let sample = dispatcher
            .on_notify(&Notification::CalibrationSampleCompleted { timestamp: None })
            .unwrap();
        assert_eq!(sample.status_code, 11);
        assert!(!dispatcher.slots().is_free(ActionKind::Calibration));
    }
    let failed = dispatcher
        .on_notify(&Notification::CalibrationFailed {
            reason: "timeout".to_string(),
            timestamp: None,
        })
        .unwrap();

    // THEN: Every response is tagged with the task id and the failure frees the slot
    assert_eq!(found.id, Some(id));
    assert_eq!(found.status_code, 12);
    assert_eq!(failed.id, Some(id));
    assert_eq!(failed.status_code, CALIBRATION_FAILED);
    assert_eq!(failed.result, Some(json!("timeout")));
    assert!(dispatcher.slots().is_free(ActionKind::Calibration));
}

#[test]
fn given_running_recording_when_started_then_stopped_then_slot_held_until_stop() {
    // GIVEN: A running recording
    let (mut dispatcher, _engine) = dispatcher();
    let id = TaskId::new();
    dispatcher.handle_command(start_recording(id, None));

    // WHEN: The engine reports start
    let started = dispatcher
        .on_notify(&Notification::RecordingStarted {
            rec_path: "/tmp/r1".to_string(),
            session_name: None,
            source: None,
            timestamp: None,
        })
        .unwrap();

    // THEN: Positive code with the path; the slot stays taken
    assert_eq!(started.status_code, RECORDING_STARTED);
    assert_eq!(started.result, Some(json!("/tmp/r1")));
    assert_eq!(dispatcher.slots().get(ActionKind::Recording), Some(id));

    // WHEN: The engine reports stop
    let stopped = dispatcher
        .on_notify(&Notification::RecordingStopped {
            rec_path: "/tmp/r1".to_string(),
            source: Some("Recorder".to_string()),
            timestamp: None,
        })
        .unwrap();

    // THEN: Terminal success frees the slot
    assert_eq!(stopped.status_code, RECORDING_STOPPED);
    assert!(dispatcher.slots().is_free(ActionKind::Recording));
}

#[test]
fn given_own_notification_when_received_then_ignored_as_echo() {
    // GIVEN: A running recording
    let (mut dispatcher, _engine) = dispatcher();
    let id = TaskId::new();
    dispatcher.handle_command(start_recording(id, None));

    // WHEN: A rec_stopped stamped with the dispatcher's own identity comes back
    let response = dispatcher.on_notify(&Notification::RecordingStopped {
        rec_path: "/tmp/r1".to_string(),
        source: Some("Script_Loader".to_string()),
        timestamp: None,
    });

    // THEN: No response and the slot is untouched
    assert_eq!(response, None);
    assert_eq!(dispatcher.slots().get(ActionKind::Recording), Some(id));
}

#[test]
fn given_no_active_task_when_engine_notifies_then_nothing_is_sent() {
    let (mut dispatcher, _engine) = dispatcher();

    let response = dispatcher.on_notify(&Notification::CalibrationSuccessful {
        method: "screen marker".to_string(),
        timestamp: None,
    });

    assert_eq!(response, None);
}

#[test]
fn given_start_recording_context_when_dispatched_then_session_name_forwarded() {
    // GIVEN: One named and one unnamed recording request
    let (mut dispatcher, engine) = dispatcher();
    dispatcher.handle_command(start_recording(TaskId::new(), Some("trial-1")));
    dispatcher.release_all();
    dispatcher.handle_command(start_recording(TaskId::new(), None));

    // THEN: The name is forwarded, or the configured default is used
    let names: Vec<String> = engine
        .sent()
        .into_iter()
        .filter_map(|notification| match notification {
            Notification::ShouldStartRecording { session_name, .. } => Some(session_name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["trial-1", "Script_Loader_Session"]);
}

#[test]
fn given_stop_commands_when_dispatched_then_should_stop_forwarded_with_identity() {
    let (mut dispatcher, engine) = dispatcher();

    dispatcher.handle_command(ControlMessage::StopCalibration { timestamp: 1.0 });
    dispatcher.handle_command(ControlMessage::StopRecording { timestamp: 1.0 });

    assert_eq!(
        engine.sent(),
        vec![
            Notification::ShouldStopCalibration {
                source: Some("Script_Loader".to_string()),
            },
            Notification::ShouldStopRecording {
                source: Some("Script_Loader".to_string()),
            },
        ]
    );
}

#[test]
fn given_unknown_trigger_and_exit_frames_when_dispatched_then_mapped_to_outcomes() {
    let (mut dispatcher, engine) = dispatcher();

    let unknown = dispatcher.handle_frame(CommandFrame::from(json!({ "cmd": "dance" })));
    let trigger = dispatcher.handle_frame(CommandFrame::from(json!({
        "cmd": "trigger",
        "timestamp": 2.0,
        "frameid": 7
    })));
    let exit = dispatcher.handle_frame(CommandFrame::from(json!({ "cmd": "exit" })));

    assert_eq!(unknown, DispatchOutcome::Ignored);
    assert_eq!(trigger, DispatchOutcome::Accepted);
    assert_eq!(exit, DispatchOutcome::Exit);
    assert!(engine.sent().is_empty());
}

#[test]
fn given_active_tasks_when_session_released_then_both_slots_free() {
    let (mut dispatcher, _engine) = dispatcher();
    dispatcher.handle_command(start_calibration(TaskId::new()));
    dispatcher.handle_command(start_recording(TaskId::new(), None));

    dispatcher.release_all();

    assert!(dispatcher.slots().is_free(ActionKind::Calibration));
    assert!(dispatcher.slots().is_free(ActionKind::Recording));
}
