use crate::config::HostConfig;
use crate::error::host::HostError;
use crate::host::{NotificationBus, start_control_server, start_publisher};
use crate::protocol::{FeedFrame, Notification, SubscribeRequest};

use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn ephemeral_config() -> HostConfig {
    HostConfig {
        feed_bind: "127.0.0.1:0".to_string(),
        control_bind: "127.0.0.1:0".to_string(),
        ..HostConfig::default()
    }
}

// ----------------------------------------------------------------------------
// NotificationBus
// ----------------------------------------------------------------------------

#[tokio::test]
async fn given_bus_without_subscribers_when_published_then_reaches_nobody() {
    // GIVEN: A fresh bus
    let bus = NotificationBus::new(8);

    // WHEN: Publishing
    let receivers = bus.publish(Notification::ShouldStopRecording { source: None });

    // THEN: Nobody saw it and nothing failed
    assert_eq!(receivers, 0);
}

/// **VALUE**: Verifies every subscriber gets its own copy of a notification.
///
/// **WHY THIS MATTERS**: The publisher, the control session, and the engine all
/// listen on the same bus.
///
/// **BUG THIS CATCHES**: Would catch a work-queue style channel where subscribers
/// compete for messages.
#[tokio::test]
async fn given_two_subscribers_when_published_then_both_receive() {
    // GIVEN: Two subscribers
    let bus = NotificationBus::new(8);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    // WHEN: Publishing one notification
    let notification = Notification::CalibrationFailed {
        reason: "lost pupil".to_string(),
        timestamp: Some(3.0),
    };
    let receivers = bus.publish(notification.clone());

    // THEN: Both get it
    assert_eq!(receivers, 2);
    assert_eq!(first.recv().await.unwrap(), notification);
    assert_eq!(second.recv().await.unwrap(), notification);
}

#[tokio::test]
async fn given_subscriber_dropped_when_counting_then_only_live_subscribers_remain() {
    // GIVEN: Two subscribers
    let bus = NotificationBus::new(8);
    let first = bus.subscribe();
    let _second = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    // WHEN: One goes away
    drop(first);

    // THEN: Only the live one is counted and reached
    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(bus.publish(Notification::ShouldStopRecording { source: None }), 1);
}

// ----------------------------------------------------------------------------
// start_publisher()
// ----------------------------------------------------------------------------

/// **VALUE**: Verifies bus notifications are forwarded to the feed under
/// `notify.<subject>`.
///
/// **BUG THIS CATCHES**: Would catch a publisher that never subscribes to the bus,
/// or one that publishes under a topic the listener does not route.
#[tokio::test]
async fn given_notify_subscriber_when_bus_publishes_then_feed_frame_with_subject_topic() {
    // GIVEN: A running publisher and a client subscribed to notifications
    let config = ephemeral_config();
    let bus = NotificationBus::new(config.bus_capacity);
    let publisher = start_publisher(&config, &bus).await.unwrap();

    let (mut stream, _) = connect_async(publisher.address()).await.unwrap();
    let request = SubscribeRequest {
        subscribe: vec!["notify".to_string()],
    };
    stream
        .send(Message::Text(serde_json::to_string(&request).unwrap().into()))
        .await
        .unwrap();

    // WHEN: The engine publishes until the client sees something
    let notification = Notification::CalibrationSuccessful {
        method: "screen marker".to_string(),
        timestamp: None,
    };
    let frame = timeout(Duration::from_secs(5), async {
        loop {
            bus.publish(notification.clone());
            if let Ok(Some(Ok(Message::Text(text)))) =
                timeout(Duration::from_millis(100), stream.next()).await
            {
                return serde_json::from_str::<FeedFrame>(text.as_str()).unwrap();
            }
        }
    })
    .await
    .expect("No feed frame within 5s");

    // THEN: Topic and payload carry the notification
    assert_eq!(frame.topic, "notify.calibration_successful");
    assert_eq!(
        serde_json::from_value::<Notification>(frame.payload).unwrap(),
        notification
    );
}

#[tokio::test]
async fn given_no_feed_subscribers_when_gaze_published_then_dropped() {
    // GIVEN: A publisher nobody connected to
    let config = ephemeral_config();
    let bus = NotificationBus::new(config.bus_capacity);
    let handle = start_publisher(&config, &bus).await.unwrap();

    // WHEN: Publishing gaze
    let delivered = handle.publisher().publish_gaze(serde_json::json!([]));

    // THEN: Nothing is queued for anyone
    assert_eq!(delivered, 0);
    assert_ne!(handle.local_addr().port(), 0);
}

// ----------------------------------------------------------------------------
// start_control_server()
// ----------------------------------------------------------------------------

#[tokio::test]
async fn given_port_in_use_when_control_server_starts_then_bind_error() {
    // GIVEN: A port already taken
    let taken = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let config = HostConfig {
        control_bind: taken.local_addr().unwrap().to_string(),
        ..ephemeral_config()
    };

    // WHEN: Starting the control server there
    let result = start_control_server(config, NotificationBus::new(8)).await;

    // THEN: It reports a bind error
    assert!(matches!(result, Err(HostError::Bind { .. })));
}

#[tokio::test]
async fn given_control_server_when_handle_dropped_then_port_released() {
    // GIVEN: A running control server
    let config = ephemeral_config();
    let handle = start_control_server(config.clone(), NotificationBus::new(8))
        .await
        .unwrap();
    let addr = handle.local_addr();

    // WHEN: Dropping its handle
    drop(handle);
    sleep(Duration::from_millis(50)).await;

    // THEN: The port can be bound again
    let rebound = HostConfig {
        control_bind: addr.to_string(),
        ..config
    };
    assert!(start_control_server(rebound, NotificationBus::new(8)).await.is_ok());
}
