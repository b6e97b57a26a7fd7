use crate::helpers::{PATIENCE, STEP, TestHost};

use pupil_core::control::{ControlChannel, WsControlChannel};
use pupil_core::protocol::status::PROCEDURE_ALREADY_INITIATED;
use pupil_core::protocol::{ControlMessage, Notification, SubscribeRequest, TaskId};

use std::thread;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Public API tests for the host servers
// ============================================================================

// ----------------------------------------------------------------------------
// start_publisher()
// ----------------------------------------------------------------------------

/// **VALUE**: Verifies the feed honors topic prefixes.
///
/// **WHY THIS MATTERS**: A gaze-only subscriber must not be flooded with host
/// notifications it never asked for.
///
/// **BUG THIS CATCHES**: Would catch a publisher that broadcasts every frame to every
/// subscriber regardless of the subscribe request.
#[test]
fn given_gaze_only_subscriber_when_notification_and_gaze_published_then_only_gaze_arrives() {
    // GIVEN: A host and a raw subscriber for the gaze topic only
    let host = TestHost::start();
    let address = host.publisher.address();

    let received = host.runtime.block_on(async {
        let (mut stream, _) = connect_async(address.as_str())
            .await
            .expect("Failed to connect subscriber");
        let request = SubscribeRequest {
            subscribe: vec!["gaze_positions".to_string()],
        };
        stream
            .send(Message::Text(
                serde_json::to_string(&request).unwrap().into(),
            ))
            .await
            .expect("Failed to subscribe");

        // WHEN: Notifications and gaze are published until gaze shows up
        let publisher = host.publisher.publisher().clone();
        let noise = Notification::CalibrationMarkerFound { timestamp: None };
        timeout(PATIENCE, async move {
            loop {
                publisher
                    .publish_notification(&noise)
                    .expect("Failed to publish notification");
                publisher.publish_gaze(json!([1]));

                if let Ok(Some(Ok(Message::Text(text)))) = timeout(STEP, stream.next()).await {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap();
                }
            }
        })
        .await
        .expect("No frame within patience")
    });

    // THEN: The first delivered frame is gaze
    assert_eq!(received["topic"], "gaze_positions");
    assert_eq!(received["payload"]["gaze_positions"], json!([1]));
}

// ----------------------------------------------------------------------------
// start_control_server()
// ----------------------------------------------------------------------------

/// **VALUE**: Verifies the control server serves one script session at a time and
/// frees the seat once the session exits.
///
/// **BUG THIS CATCHES**: Would catch two scripts sharing action slots, or a server
/// that stays busy forever after the first script leaves.
#[test]
fn given_active_script_session_when_second_script_connects_then_rejected_until_exit() {
    // GIVEN: A first script connected
    let host = TestHost::start();
    let address = host.control.address();
    let mut first = WsControlChannel::connect(&address).expect("First script should connect");

    // WHEN: A second script tries to connect
    let second = WsControlChannel::connect(&address);

    // THEN: It is turned away
    assert!(second.is_err(), "Only one script session at a time");

    // WHEN: The first script exits
    first
        .send(&ControlMessage::Exit { timestamp: None })
        .expect("Failed to send exit");
    first.close();

    // THEN: A new script gets in
    let started = Instant::now();
    loop {
        if WsControlChannel::connect(&address).is_ok() {
            break;
        }
        assert!(started.elapsed() < PATIENCE, "Seat never freed");
        thread::sleep(STEP);
    }
}

#[test]
fn given_running_calibration_when_second_start_sent_then_rejection_reply() {
    // GIVEN: A script with a calibration already running
    let host = TestHost::start();
    let mut channel =
        WsControlChannel::connect(&host.control.address()).expect("Script should connect");
    let first = TaskId::new();
    let second = TaskId::new();
    for id in [first, second] {
        channel
            .send(&ControlMessage::StartCalibration {
                id,
                timestamp: 1.0,
                context: None,
            })
            .expect("Failed to send start");
    }

    // WHEN: Reading the reply
    let reply = channel
        .recv_timeout(Some(PATIENCE))
        .expect("Channel failed")
        .expect("No reply within patience");

    // THEN: Only the second start is answered, with the policy rejection
    assert_eq!(reply.id, Some(second));
    assert_eq!(reply.status_code, PROCEDURE_ALREADY_INITIATED);
}
