//! Test helpers for end-to-end tests.
//!
//! A [`TestHost`] runs the feed publisher and the control server on ephemeral
//! localhost ports inside its own multi-thread runtime, so the synchronous
//! script side can be driven from the test thread.

use pupil_core::Communicator;
use pupil_core::EventType;
use pupil_core::config::{HostConfig, InterfaceConfig};
use pupil_core::host::{
    ControlServerHandle, NotificationBus, PublisherHandle, start_control_server, start_publisher,
};
use pupil_core::protocol::Notification;

use std::time::Duration;

use serde_json::json;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;

pub const STEP: Duration = Duration::from_millis(100);
pub const PATIENCE: Duration = Duration::from_secs(5);

pub struct TestHost {
    pub bus: NotificationBus,
    pub publisher: PublisherHandle,
    pub control: ControlServerHandle,
    // Declared last so the handles abort their tasks before the runtime goes.
    pub runtime: Runtime,
}

impl TestHost {
    pub fn start() -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build host runtime");

        let config = HostConfig {
            feed_bind: "127.0.0.1:0".to_string(),
            control_bind: "127.0.0.1:0".to_string(),
            ..HostConfig::default()
        };
        let bus = NotificationBus::new(config.bus_capacity);

        let (publisher, control) = runtime.block_on(async {
            let publisher = start_publisher(&config, &bus)
                .await
                .expect("Failed to start publisher");
            let control = start_control_server(config.clone(), bus.clone())
                .await
                .expect("Failed to start control server");
            (publisher, control)
        });

        Self {
            bus,
            publisher,
            control,
            runtime,
        }
    }

    pub fn interface_config(&self) -> InterfaceConfig {
        InterfaceConfig {
            sub_address: self.publisher.address(),
            control_address: self.control.address(),
            ..InterfaceConfig::default()
        }
    }

    /// Connect a communicator and wait until its feed subscription is live,
    /// proven by a gaze sample making the round trip.
    pub fn connect(&self) -> Communicator {
        let mut communicator =
            Communicator::connect(self.interface_config()).expect("Failed to connect communicator");

        let connected = communicator.wait_any(&[EventType::Connected], Some(PATIENCE));
        assert!(
            connected.contains_key(&EventType::Connected),
            "Listener never connected to the feed"
        );

        self.publish_until(&mut communicator, EventType::GazeReceived, || {
            self.publisher.publisher().publish_gaze(json!([{ "norm_pos": [0.5, 0.5] }]));
        });
        communicator
    }

    /// Repeat `publish` until `wanted` is observed. The publisher only starts
    /// filtering for a subscriber once its subscribe request has been read.
    pub fn publish_until(
        &self,
        communicator: &mut Communicator,
        wanted: EventType,
        mut publish: impl FnMut(),
    ) {
        let attempts = PATIENCE.as_millis() / STEP.as_millis();
        for _ in 0..attempts {
            publish();
            if communicator
                .wait_any(&[wanted], Some(STEP))
                .contains_key(&wanted)
            {
                return;
            }
        }
        panic!("{wanted:?} never arrived");
    }

    /// Block until the dispatcher has forwarded a request matching `subject`
    /// onto the bus.
    pub fn expect_request(
        &self,
        requests: &mut tokio::sync::broadcast::Receiver<Notification>,
        subject: &str,
    ) -> Notification {
        self.runtime.block_on(async {
            timeout(PATIENCE, async {
                loop {
                    let notification = requests.recv().await.expect("bus closed");
                    if notification.subject() == subject {
                        return notification;
                    }
                }
            })
            .await
            .unwrap_or_else(|_| panic!("No '{subject}' request within {PATIENCE:?}"))
        })
    }
}
