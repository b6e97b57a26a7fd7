//! Pub/sub feed server.
//!
//! Publishes gaze telemetry, host notifications (`notify.<subject>`) and peer
//! announcements to every connected subscriber whose topic prefixes match.
//! Delivery is best-effort: a subscriber that lags behind loses frames.

use crate::config::HostConfig;
use crate::error::host::HostError;
use crate::host::bus::NotificationBus;
use crate::protocol::feed::{GAZE_TOPIC, NETWORK_TOPIC, NOTIFY_TOPIC, topic_matches};
use crate::protocol::{FeedFrame, NetworkAnnouncement, Notification, SubscribeRequest};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{self, Sender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type FeedSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type FeedSource = SplitStream<WebSocketStream<TcpStream>>;

/// Cloneable publishing end of the feed.
#[derive(Clone)]
pub struct Publisher {
    frames: Sender<FeedFrame>,
}

impl Publisher {
    fn new(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity.max(1));
        Self { frames }
    }

    /// Returns the number of connected subscribers the frame was queued for,
    /// before topic filtering.
    pub fn publish(&self, frame: FeedFrame) -> usize {
        self.frames.send(frame).unwrap_or(0)
    }

    /// Publish `{"gaze_positions": gaze_positions}` on the gaze topic.
    pub fn publish_gaze(&self, gaze_positions: Value) -> usize {
        self.publish(FeedFrame::new(
            GAZE_TOPIC,
            json!({ "gaze_positions": gaze_positions }),
        ))
    }

    pub fn publish_notification(&self, notification: &Notification) -> Result<usize, HostError> {
        let payload = serde_json::to_value(notification)?;
        let topic = format!("{NOTIFY_TOPIC}.{}", notification.subject());
        Ok(self.publish(FeedFrame::new(topic, payload)))
    }

    fn announce(&self, announcement: &NetworkAnnouncement) {
        match serde_json::to_value(announcement) {
            Ok(payload) => {
                self.publish(FeedFrame::new(NETWORK_TOPIC, payload));
            }
            Err(e) => warn!("Failed to encode network announcement: {e}"),
        }
    }
}

/// Handle to a running feed server. Dropping it stops accepting subscribers
/// and forwarding notifications.
pub struct PublisherHandle {
    local_addr: SocketAddr,
    publisher: Publisher,
    tasks: Vec<JoinHandle<()>>,
}

impl PublisherHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` address subscribers connect to.
    pub fn address(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}

impl Drop for PublisherHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Bind `config.feed_bind`, forward `bus` notifications to the feed, and serve
/// subscribers in the background.
///
/// # Errors
///
/// Returns [`HostError::Bind`] if the address is unavailable.
pub async fn start_publisher(
    config: &HostConfig,
    bus: &NotificationBus,
) -> Result<PublisherHandle, HostError> {
    let listener = TcpListener::bind(&config.feed_bind).await?;
    let local_addr = listener.local_addr()?;
    let publisher = Publisher::new(config.bus_capacity);

    info!("Feed publisher listening on {local_addr}");

    let mut notifications = bus.subscribe();
    let forwarder = {
        let publisher = publisher.clone();
        TokioSpawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => {
                        if let Err(e) = publisher.publish_notification(&notification) {
                            error!("Failed to publish notification: {e}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Feed forwarder missed {skipped} notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let acceptor = {
        let publisher = publisher.clone();
        TokioSpawn(async move {
            while let Ok((stream, addr)) = listener.accept().await {
                let publisher = publisher.clone();
                TokioSpawn(async move {
                    if let Err(e) = handle_subscriber(stream, addr, publisher).await {
                        error!("Subscriber {addr} failed: {e}");
                    }
                });
            }
        })
    };

    Ok(PublisherHandle {
        local_addr,
        publisher,
        tasks: vec![forwarder, acceptor],
    })
}

async fn handle_subscriber(
    stream: TcpStream,
    addr: SocketAddr,
    publisher: Publisher,
) -> Result<(), HostError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback subscriber from {addr}");
        return Ok(());
    }

    let ws_stream = accept_async(stream).await.map_err(|e| HostError::Handshake {
        message: format!("WebSocket handshake failed: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let (write, mut read) = ws_stream.split();

    let topics = match read_subscribe_request(&mut read).await? {
        Some(request) => request.subscribe,
        None => {
            debug!("Subscriber {addr} left before subscribing");
            return Ok(());
        }
    };

    info!("Subscriber {addr} joined with topics {topics:?}");

    let peer = addr.to_string();
    let result = serve_subscriber(write, read, &publisher, topics, &peer).await;

    publisher.announce(&NetworkAnnouncement::PeerLeft { peer });
    info!("Subscriber {addr} disconnected");
    result
}

async fn read_subscribe_request(
    read: &mut FeedSource,
) -> Result<Option<SubscribeRequest>, HostError> {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                return serde_json::from_str::<SubscribeRequest>(text.as_str())
                    .map(Some)
                    .map_err(|e| HostError::Read {
                        message: format!("Invalid subscribe request: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
            }
            Ok(Message::Close(_)) => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                return Err(HostError::Read {
                    message: format!("Error reading subscribe request: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }
    }
    Ok(None)
}

async fn serve_subscriber(
    mut write: FeedSink,
    mut read: FeedSource,
    publisher: &Publisher,
    mut topics: Vec<String>,
    peer: &str,
) -> Result<(), HostError> {
    // Subscribe before announcing so the subscriber's own join is filtered
    // here rather than racing the announcement.
    let mut frames = publisher.frames.subscribe();
    let own_join = serde_json::to_value(NetworkAnnouncement::PeerJoined {
        peer: peer.to_string(),
    })?;
    publisher.announce(&NetworkAnnouncement::PeerJoined {
        peer: peer.to_string(),
    });

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if !topic_matches(&topics, &frame.topic)
                        || (frame.topic == NETWORK_TOPIC && frame.payload == own_join)
                    {
                        continue;
                    }

                    let text = serde_json::to_string(&frame)?;
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| HostError::Send {
                            message: format!("Failed to send feed frame to {peer}: {e}"),
                            location: ErrorLocation::from(Location::caller()),
                        })?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber {peer} skipped {skipped} frames");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SubscribeRequest>(text.as_str()) {
                        Ok(request) => {
                            debug!("Subscriber {peer} resubscribed to {:?}", request.subscribe);
                            topics = request.subscribe;
                        }
                        Err(e) => warn!("Ignoring message from subscriber {peer}: {e}"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(HostError::Read {
                        message: format!("Error reading from subscriber {peer}: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            },
        }
    }
}
