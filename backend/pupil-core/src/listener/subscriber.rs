//! Feed subscriber task.
//!
//! Connects to the publisher, announces its topics, and forwards raw text
//! frames to the listener loop. Connection changes are reported on the monitor
//! channel. Read errors and disconnects are retried with exponential backoff
//! until the listener loop drops its receivers.

use crate::listener::monitor::MonitorEvent;
use crate::protocol::SubscribeRequest;

use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep as TokioSleep;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::Message;

const INITIAL_RECONNECT_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct SubscriberSettings {
    pub endpoint: String,
    pub topics: Vec<String>,
    pub reconnect_max_interval: Duration,
}

enum SessionEnd {
    /// The connection dropped; try again.
    Disconnected,
    /// The listener loop is gone; stop for good.
    ListenerGone,
}

pub(crate) async fn run_subscriber(
    settings: SubscriberSettings,
    frames: UnboundedSender<String>,
    monitor: UnboundedSender<MonitorEvent>,
) {
    let mut backoff = reconnect_backoff(settings.reconnect_max_interval);

    loop {
        match connect_async(settings.endpoint.as_str()).await {
            Ok((stream, _)) => {
                info!("Subscribed to feed at {}", settings.endpoint);
                backoff.reset();

                let connected = MonitorEvent::Connected {
                    endpoint: settings.endpoint.clone(),
                };
                if monitor.send(connected).is_err() {
                    return;
                }

                let end = read_feed(stream, &settings, &frames).await;

                let disconnected = MonitorEvent::Disconnected {
                    endpoint: settings.endpoint.clone(),
                };
                if matches!(end, SessionEnd::ListenerGone) || monitor.send(disconnected).is_err() {
                    return;
                }
            }
            Err(e) => debug!("Feed at {} not reachable: {e}", settings.endpoint),
        }

        if frames.is_closed() {
            return;
        }

        let delay = backoff
            .next_backoff()
            .unwrap_or(settings.reconnect_max_interval);
        trace!("Reconnecting to {} after {delay:?}", settings.endpoint);
        TokioSleep(delay).await;
    }
}

async fn read_feed<S>(
    stream: WebSocketStream<S>,
    settings: &SubscriberSettings,
    frames: &UnboundedSender<String>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = stream.split();

    let request = SubscribeRequest {
        subscribe: settings.topics.clone(),
    };
    let text = match serde_json::to_string(&request) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode subscribe request: {e}");
            return SessionEnd::Disconnected;
        }
    };
    if let Err(e) = write.send(Message::Text(text.into())).await {
        warn!("Failed to send subscribe request to {}: {e}", settings.endpoint);
        return SessionEnd::Disconnected;
    }

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if frames.send(text.to_string()).is_err() {
                    return SessionEnd::ListenerGone;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Error reading feed from {}: {e}", settings.endpoint);
                break;
            }
        }
    }

    info!("Feed at {} disconnected", settings.endpoint);
    SessionEnd::Disconnected
}

fn reconnect_backoff(max_interval: Duration) -> ExponentialBackoff {
    let initial_interval = INITIAL_RECONNECT_INTERVAL.min(max_interval);
    ExponentialBackoff {
        current_interval: initial_interval,
        initial_interval,
        max_interval,
        max_elapsed_time: None,
        ..Default::default()
    }
}
