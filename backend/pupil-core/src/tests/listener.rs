use crate::config::InterfaceConfig;
use crate::error::listener::ListenerError;
use crate::event_queue::{EventQueue, NetworkEvent, QueueEntry};
use crate::listener::monitor::MonitorEvent;
use crate::listener::{NetworkListener, handle_frame, handle_monitor};
use crate::tests::helpers::{UNREACHABLE_FEED, interface_config};

use std::sync::Arc;

use serde_json::json;

const ENDPOINT: &str = "ws://127.0.0.1:5000";

fn frame(topic: &str, payload: serde_json::Value) -> String {
    json!({ "topic": topic, "payload": payload }).to_string()
}

// ----------------------------------------------------------------------------
// Frame routing
// ----------------------------------------------------------------------------

#[test]
fn given_gaze_frame_when_handled_then_pushed_as_telemetry() {
    let queue = EventQueue::new();

    handle_frame(&queue, &frame("gaze_positions", json!({ "gaze_positions": [] })));

    match queue.drain().as_slice() {
        [QueueEntry::Telemetry { topic, payload, .. }] => {
            assert_eq!(topic, "gaze_positions");
            assert_eq!(payload, &json!({ "gaze_positions": [] }));
        }
        other => panic!("Expected one telemetry entry, got {other:?}"),
    }
}

/// **VALUE**: Verifies host-internal topics never pose as gaze data.
///
/// **WHY THIS MATTERS**: Notifications and peer announcements ride the same socket as
/// telemetry. Misrouting them would feed JSON objects into gaze consumers.
///
/// **BUG THIS CATCHES**: Would catch a listener that pushes every frame as telemetry.
#[test]
fn given_notify_and_network_frames_when_handled_then_routed_by_topic() {
    // GIVEN: A notification frame and a peer announcement
    let queue = EventQueue::new();
    let notification = json!({ "subject": "calibration marker found" });

    // WHEN: Handling both
    handle_frame(&queue, &frame("notify.calibration marker found", notification.clone()));
    handle_frame(
        &queue,
        &frame("network", json!({ "event": "peer_joined", "peer": "127.0.0.1:40000" })),
    );

    // THEN: One notification entry, one network entry
    match queue.drain().as_slice() {
        [
            QueueEntry::Notification { payload, .. },
            QueueEntry::Network { event, .. },
        ] => {
            assert_eq!(payload, &notification);
            assert_eq!(
                event,
                &NetworkEvent::PeerJoined {
                    peer: "127.0.0.1:40000".to_string()
                }
            );
        }
        other => panic!("Expected notification then network entry, got {other:?}"),
    }
}

#[test]
fn given_malformed_or_unsubscribed_frames_when_handled_then_dropped() {
    let queue = EventQueue::new();

    handle_frame(&queue, "{ not json");
    handle_frame(&queue, &frame("pupil.0", json!({ "diameter": 3.1 })));
    handle_frame(&queue, &frame("network", json!({ "event": "peer_vanished" })));

    assert!(queue.is_empty());
}

#[test]
fn given_monitor_events_when_handled_then_only_configured_endpoint_pushed() {
    // GIVEN: A connect for our endpoint and one for a foreign endpoint
    let queue = EventQueue::new();

    // WHEN: Handling both
    handle_monitor(
        ENDPOINT,
        &queue,
        MonitorEvent::Connected {
            endpoint: ENDPOINT.to_string(),
        },
    );
    handle_monitor(
        ENDPOINT,
        &queue,
        MonitorEvent::Disconnected {
            endpoint: "ws://127.0.0.1:6000".to_string(),
        },
    );

    // THEN: Only our connect is queued
    match queue.drain().as_slice() {
        [QueueEntry::Network { event, .. }] => assert_eq!(
            event,
            &NetworkEvent::Connected {
                endpoint: ENDPOINT.to_string()
            }
        ),
        other => panic!("Expected one connected entry, got {other:?}"),
    }
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn given_non_websocket_address_when_spawned_then_endpoint_error() {
    // GIVEN: Addresses that are not ws:// URLs
    for address in ["http://127.0.0.1:5000", "127.0.0.1 port 5000"] {
        let config = InterfaceConfig {
            sub_address: address.to_string(),
            ..InterfaceConfig::default()
        };

        // WHEN: Spawning
        let result = NetworkListener::spawn(&config, Arc::new(EventQueue::new()));

        // THEN: Rejected synchronously
        assert!(
            matches!(result, Err(ListenerError::Endpoint { .. })),
            "{address} should be rejected"
        );
    }
}

/// **VALUE**: Verifies two-phase shutdown joins the listener thread.
///
/// **WHY THIS MATTERS**: A script exiting while the listener thread still runs leaks
/// the socket and may push into a queue nobody drains.
///
/// **BUG THIS CATCHES**: Would catch a sentinel the loop ignores, or a shutdown that
/// returns before the thread has finished.
#[test]
fn given_running_listener_when_shutdown_then_thread_finished_and_idempotent() {
    // GIVEN: A listener retrying against an unreachable feed
    let mut listener =
        NetworkListener::spawn(&interface_config(), Arc::new(EventQueue::new())).unwrap();
    assert!(listener.is_running());
    assert_eq!(listener.endpoint(), UNREACHABLE_FEED);

    // WHEN: Shutting down twice
    listener.shutdown().expect("listener should exit within the close timeout");
    let second = listener.shutdown();

    // THEN: The thread is gone and the second call is a no-op
    assert!(!listener.is_running());
    assert!(second.is_ok());
}
