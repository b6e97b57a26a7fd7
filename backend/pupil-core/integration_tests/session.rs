use crate::helpers::{PATIENCE, STEP, TestHost};

use pupil_core::EventKind;
use pupil_core::EventType;
use pupil_core::protocol::Notification;
use pupil_core::protocol::status::{CALIBRATION_FAILED, CALIBRATION_SUCCESSFUL, RECORDING_STARTED};

use std::thread;

use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// End-to-end script sessions against a live host
// ============================================================================

/// **VALUE**: Verifies gaze samples travel from the publisher through the
/// listener thread into the communicator.
///
/// **BUG THIS CATCHES**: Would catch a listener that subscribes to the wrong topic
/// or a communicator that does not keep the latest sample.
#[test]
fn given_connected_script_when_gaze_published_then_latest_gaze_updated() {
    // GIVEN: A connected script
    let host = TestHost::start();
    let mut communicator = host.connect();

    // WHEN: A distinctive sample is published
    let sample = json!([{ "norm_pos": [0.1, 0.9], "confidence": 0.98 }]);
    host.publish_until(&mut communicator, EventType::GazeReceived, || {
        host.publisher.publisher().publish_gaze(sample.clone());
    });

    // THEN: It is the latest gaze the script sees
    assert_eq!(
        communicator.latest_gaze(),
        Some(&json!({ "gaze_positions": sample }))
    );
}

/// **VALUE**: Verifies a whole calibration round trip: command over the control
/// channel, request on the bus, engine notification back as both an event and
/// a terminal task status.
///
/// **WHY THIS MATTERS**: This is the path every experiment script takes before
/// recording anything.
///
/// **BUG THIS CATCHES**: Would catch a dispatcher that never forwards the request,
/// a status mapping that loses the method, or notifications that never reach
/// the feed.
#[test]
fn given_calibration_started_when_engine_succeeds_then_status_and_event_report_method() {
    // GIVEN: A connected script and a view of the bus
    let host = TestHost::start();
    let mut requests = host.bus.subscribe();
    let mut communicator = host.connect();

    // WHEN: The script starts calibrating and the engine finishes
    let status = communicator
        .start_calibration(None, None)
        .expect("Failed to start calibration");
    host.expect_request(&mut requests, "should_start_calibration");
    host.bus.publish(Notification::CalibrationSuccessful {
        method: "screen marker".to_string(),
        timestamp: Some(12.5),
    });

    // THEN: The status callback reports success with the method
    let response = status.wait_until_finished(Some(PATIENCE));
    assert_eq!(response.status_code, CALIBRATION_SUCCESSFUL);
    assert_eq!(response.result, Some(json!("screen marker")));

    // THEN: The same notification arrives as an event
    let events = communicator.wait_any(&[EventType::CalibrationSucceeded], Some(PATIENCE));
    let event = events
        .get(&EventType::CalibrationSucceeded)
        .expect("Calibration event never arrived");
    assert_eq!(
        event.kind,
        EventKind::CalibrationSucceeded {
            method: "screen marker".to_string()
        }
    );
    assert_eq!(event.timestamp, 12.5);
}

#[test]
fn given_calibration_started_when_engine_fails_then_failure_status_and_slot_freed() {
    // GIVEN: A calibration that failed
    let host = TestHost::start();
    let mut requests = host.bus.subscribe();
    let mut communicator = host.connect();
    let first = communicator
        .start_calibration(None, None)
        .expect("Failed to start calibration");
    host.expect_request(&mut requests, "should_start_calibration");
    host.bus.publish(Notification::CalibrationFailed {
        reason: "not enough markers".to_string(),
        timestamp: None,
    });
    let response = first.wait_until_finished(Some(PATIENCE));
    assert_eq!(response.status_code, CALIBRATION_FAILED);
    assert_eq!(response.result, Some(json!("not enough markers")));

    // WHEN: The script tries again
    let _second = communicator
        .start_calibration(None, None)
        .expect("Failed to start calibration");

    // THEN: The host accepts it and forwards a fresh request
    host.expect_request(&mut requests, "should_start_calibration");
}

/// **VALUE**: Verifies a recording stays active after `rec_started` and that the
/// script's own echo is not reported back as an event.
///
/// **BUG THIS CATCHES**: Would catch a dispatcher that frees the recording slot on
/// the positive start code, or a communicator that dispatches the host's
/// echo of its own request.
#[test]
fn given_recording_started_when_engine_confirms_then_path_reported_and_stop_forwarded() {
    // GIVEN: A connected script that starts a named recording
    let host = TestHost::start();
    let mut requests = host.bus.subscribe();
    let mut communicator = host.connect();
    let status = communicator
        .start_recording(Some("pilot 3"), None)
        .expect("Failed to start recording");

    let request = host.expect_request(&mut requests, "should_start_recording");
    assert!(matches!(
        request,
        Notification::ShouldStartRecording { ref session_name, .. } if session_name == "pilot 3"
    ));

    // WHEN: The engine confirms
    host.bus.publish(Notification::RecordingStarted {
        rec_path: "/data/pilot 3/000".to_string(),
        session_name: Some("pilot 3".to_string()),
        source: None,
        timestamp: None,
    });

    // THEN: The status is the non-terminal start code with the path
    let response = status.wait(Some(PATIENCE));
    assert_eq!(response.status_code, RECORDING_STARTED);
    assert_eq!(response.result, Some(json!("/data/pilot 3/000")));
    assert!(!response.is_finished());

    // WHEN: The script stops the recording
    communicator
        .stop_recording(None)
        .expect("Failed to stop recording");

    // THEN: The stop request reaches the engine
    host.expect_request(&mut requests, "should_stop_recording");
}

// ----------------------------------------------------------------------------
// Network membership
// ----------------------------------------------------------------------------

#[test]
fn given_connected_script_when_another_peer_subscribes_then_peer_joined_event() {
    // GIVEN: A connected script
    let host = TestHost::start();
    let mut communicator = host.connect();

    // WHEN: Another subscriber joins the feed
    let address = host.publisher.address();
    let _peer = host.runtime.block_on(async {
        let (mut stream, _) = connect_async(address.as_str())
            .await
            .expect("Failed to connect peer");
        stream
            .send(Message::Text(r#"{"subscribe":["gaze_positions"]}"#.into()))
            .await
            .expect("Failed to subscribe peer");
        stream
    });

    // THEN: The script is told about it
    let events = communicator.wait_any(&[EventType::NetworkPeerJoined], Some(PATIENCE));
    assert!(
        events.contains_key(&EventType::NetworkPeerJoined),
        "Peer join was never announced: {events:?}"
    );
}

// ----------------------------------------------------------------------------
// close()
// ----------------------------------------------------------------------------

/// **VALUE**: Verifies closing a session stops the listener for good.
///
/// **WHY THIS MATTERS**: Scripts run back to back; a listener left alive would
/// keep filling a queue nobody drains.
///
/// **BUG THIS CATCHES**: Would catch a close that returns before the listener
/// thread has exited.
#[test]
fn given_connected_script_when_closed_then_no_further_entries_queued() {
    // GIVEN: A connected script whose queue we keep a handle to
    let host = TestHost::start();
    let communicator = host.connect();
    let queue = communicator.event_queue();

    // WHEN: The session closes and the host keeps publishing
    communicator.close().expect("Close should succeed");
    let before = queue.len();
    for _ in 0..10 {
        host.publisher.publisher().publish_gaze(json!([0]));
        thread::sleep(STEP / 5);
    }

    // THEN: Nothing more was queued
    assert_eq!(queue.len(), before);
}
