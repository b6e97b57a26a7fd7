//! Background network listener.
//!
//! Owns the subscribe socket on a dedicated thread running a current-thread
//! tokio runtime. Inbound frames are normalized into [`QueueEntry`]s and pushed
//! onto the shared [`EventQueue`]; the consumer thread never touches the
//! socket.
//!
//! # Shutdown
//!
//! Two-phase: [`NetworkListener::shutdown`] sends [`SHUTDOWN_SENTINEL`] on the
//! control channel, polls the thread every 10 ms until it has finished or the
//! close timeout runs out, then joins it.

pub mod monitor;
mod subscriber;

use crate::config::InterfaceConfig;
use crate::error::listener::ListenerError;
use crate::event_queue::{EventQueue, NetworkEvent, QueueEntry};
use crate::listener::monitor::MonitorEvent;
use crate::listener::subscriber::{SubscriberSettings, run_subscriber};
use crate::protocol::feed::{GAZE_TOPIC, NETWORK_TOPIC, NOTIFY_TOPIC};
use crate::protocol::{FeedFrame, NetworkAnnouncement};

use common::{ErrorLocation, now_seconds};

use std::panic::Location;
use std::sync::Arc;
use std::thread::{Builder as ThreadBuilder, JoinHandle, sleep};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::spawn as TokioSpawn;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use url::Url;

/// Control message that ends the listener loop.
pub const SHUTDOWN_SENTINEL: &str = "EXIT_THREAD";

const LISTENER_THREAD_NAME: &str = "pupil-listener";
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct NetworkListener {
    endpoint: String,
    control: UnboundedSender<String>,
    thread: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl NetworkListener {
    /// Start the listener thread for `config.sub_address`.
    ///
    /// Connecting happens in the background; an unreachable publisher is not
    /// an error here, it shows up later as missing `Connected` events.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::Endpoint`] if the subscribe address is not a `ws://` URL
    /// - [`ListenerError::Runtime`] if the tokio runtime cannot be built
    /// - [`ListenerError::Spawn`] if the thread cannot be started
    pub fn spawn(config: &InterfaceConfig, queue: Arc<EventQueue>) -> Result<Self, ListenerError> {
        let endpoint = validate_endpoint(&config.sub_address)?;
        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;
        let (control_tx, control_rx) = unbounded_channel();

        let settings = SubscriberSettings {
            endpoint: endpoint.clone(),
            topics: vec![
                GAZE_TOPIC.to_string(),
                NOTIFY_TOPIC.to_string(),
                NETWORK_TOPIC.to_string(),
            ],
            reconnect_max_interval: config.reconnect_max_interval(),
        };

        let thread = ThreadBuilder::new()
            .name(LISTENER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(run(settings, queue, control_rx)))
            .map_err(|e| ListenerError::Spawn {
                message: format!("Failed to start listener thread: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("Network listener started for {endpoint}");

        Ok(Self {
            endpoint,
            control: control_tx,
            thread: Some(thread),
            close_timeout: config.close_timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the listener thread and wait for it to exit.
    ///
    /// Idempotent. After `Ok(())` the thread has been joined and no further
    /// entries are pushed.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Shutdown`] if the thread did not finish within
    /// the close timeout (it is left detached) or if it panicked.
    pub fn shutdown(&mut self) -> Result<(), ListenerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        if self.control.send(SHUTDOWN_SENTINEL.to_string()).is_err() {
            debug!("Listener control channel already closed");
        }

        let started = Instant::now();
        while !thread.is_finished() {
            if started.elapsed() >= self.close_timeout {
                return Err(ListenerError::Shutdown {
                    message: format!(
                        "Listener for {} did not exit within {:?}",
                        self.endpoint, self.close_timeout
                    ),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            sleep(SHUTDOWN_POLL_INTERVAL);
        }

        thread.join().map_err(|_| ListenerError::Shutdown {
            message: format!("Listener thread for {} panicked", self.endpoint),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!("Network listener for {} stopped", self.endpoint);
        Ok(())
    }
}

impl Drop for NetworkListener {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("{e}");
        }
    }
}

#[track_caller]
fn validate_endpoint(address: &str) -> Result<String, ListenerError> {
    let url = Url::parse(address).map_err(|e| ListenerError::Endpoint {
        message: format!("Invalid subscribe address '{address}': {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(address.to_string()),
        scheme => Err(ListenerError::Endpoint {
            message: format!("Unsupported scheme '{scheme}' in subscribe address '{address}'"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

async fn run(
    settings: SubscriberSettings,
    queue: Arc<EventQueue>,
    mut control: UnboundedReceiver<String>,
) {
    let endpoint = settings.endpoint.clone();
    let (frame_tx, mut frames) = unbounded_channel();
    let (monitor_tx, mut monitor) = unbounded_channel();

    let subscriber = TokioSpawn(run_subscriber(settings, frame_tx, monitor_tx));

    loop {
        tokio::select! {
            message = control.recv() => match message {
                Some(message) if message == SHUTDOWN_SENTINEL => break,
                Some(message) => warn!("Ignoring unexpected listener control message: {message}"),
                None => {
                    debug!("Listener control channel dropped");
                    break;
                }
            },
            Some(event) = monitor.recv() => handle_monitor(&endpoint, &queue, event),
            Some(text) = frames.recv() => handle_frame(&queue, &text),
        }
    }

    subscriber.abort();
    debug!("Listener loop for {endpoint} exited");
}

/// Push connection changes of the configured endpoint only.
pub(crate) fn handle_monitor(endpoint: &str, queue: &EventQueue, event: MonitorEvent) {
    if event.endpoint() != endpoint {
        debug!("Ignoring monitor event for foreign endpoint: {event:?}");
        return;
    }

    let event = match event {
        MonitorEvent::Connected { endpoint } => NetworkEvent::Connected { endpoint },
        MonitorEvent::Disconnected { endpoint } => NetworkEvent::Disconnected { endpoint },
    };
    queue.push(QueueEntry::Network {
        event,
        received_at: now_seconds(),
    });
}

/// Route one feed frame by topic. Malformed frames and unsubscribed topics
/// are logged and dropped.
pub(crate) fn handle_frame(queue: &EventQueue, text: &str) {
    let frame = match serde_json::from_str::<FeedFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed feed frame ({e}): {text}");
            return;
        }
    };
    let received_at = now_seconds();

    if frame.topic.starts_with(GAZE_TOPIC) {
        trace!("Gaze frame on {}", frame.topic);
        queue.push(QueueEntry::Telemetry {
            topic: frame.topic,
            payload: frame.payload,
            received_at,
        });
    } else if frame.topic.starts_with(NOTIFY_TOPIC) {
        queue.push(QueueEntry::Notification {
            payload: frame.payload,
            received_at,
        });
    } else if frame.topic.starts_with(NETWORK_TOPIC) {
        let event = match serde_json::from_value::<NetworkAnnouncement>(frame.payload) {
            Ok(NetworkAnnouncement::PeerJoined { peer }) => NetworkEvent::PeerJoined { peer },
            Ok(NetworkAnnouncement::PeerLeft { peer }) => NetworkEvent::PeerLeft { peer },
            Err(e) => {
                warn!("Dropping malformed network announcement: {e}");
                return;
            }
        };
        queue.push(QueueEntry::Network { event, received_at });
    } else {
        debug!("Dropping frame on unsubscribed topic {}", frame.topic);
    }
}
