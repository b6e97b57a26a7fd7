//! Host end of the control channel.
//!
//! Accepts one script session at a time on localhost. Each session gets its
//! own [`CommandDispatcher`] wired to the notification bus: commands from the
//! script go through the dispatcher to the engine, and engine notifications
//! come back through the dispatcher as task responses.

use crate::config::HostConfig;
use crate::error::host::HostError;
use crate::host::bus::NotificationBus;
use crate::host::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::protocol::{CommandFrame, TaskResponse};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type ResponseSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Handle to a running control server. Dropping it stops accepting sessions.
pub struct ControlServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ControlServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` address scripts connect to.
    pub fn address(&self) -> String {
        format!("ws://{}", self.local_addr)
    }
}

impl Drop for ControlServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind `config.control_bind` and serve script sessions in the background.
///
/// # Errors
///
/// Returns [`HostError::Bind`] if the address is unavailable.
pub async fn start_control_server(
    config: HostConfig,
    bus: NotificationBus,
) -> Result<ControlServerHandle, HostError> {
    let listener = TcpListener::bind(&config.control_bind).await?;
    let local_addr = listener.local_addr()?;

    info!("Control server listening on {local_addr}");

    let busy = Arc::new(AtomicBool::new(false));
    let task = TokioSpawn(async move {
        while let Ok((stream, addr)) = listener.accept().await {
            if busy.swap(true, Ordering::AcqRel) {
                warn!("Rejected script connection from {addr}: a session is already active");
                continue;
            }

            info!("Script connecting from {addr}");
            let config = config.clone();
            let bus = bus.clone();
            let busy = Arc::clone(&busy);
            TokioSpawn(async move {
                if let Err(e) = handle_connection(stream, addr, config, bus).await {
                    error!("Script session {addr} failed: {e}");
                }
                busy.store(false, Ordering::Release);
            });
        }
    });

    Ok(ControlServerHandle { local_addr, task })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: HostConfig,
    bus: NotificationBus,
) -> Result<(), HostError> {
    if !addr.ip().is_loopback() {
        warn!("Rejected non-loopback connection from {addr}");
        return Ok(());
    }

    let ws_stream = accept_async(stream).await.map_err(|e| HostError::Handshake {
        message: format!("WebSocket handshake failed: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let (mut write, mut read) = ws_stream.split();
    let mut notifications = bus.subscribe();
    let mut dispatcher = CommandDispatcher::new(&config, bus);

    let result = loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let frame = match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(value) => CommandFrame::from(value),
                        Err(e) => {
                            warn!("Dropping malformed command from {addr} ({e}): {text}");
                            continue;
                        }
                    };

                    match dispatcher.handle_frame(frame) {
                        DispatchOutcome::Reply(response) => {
                            if let Err(e) = send_response(&mut write, &response).await {
                                break Err(e);
                            }
                        }
                        DispatchOutcome::Exit => break Ok(()),
                        DispatchOutcome::Accepted | DispatchOutcome::Ignored => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => warn!("Script {addr} sent non-text message"),
                Some(Err(e)) => {
                    break Err(HostError::Read {
                        message: format!("Error reading command: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            },
            notification = notifications.recv() => match notification {
                Ok(notification) => {
                    if let Some(response) = dispatcher.on_notify(&notification) {
                        if let Err(e) = send_response(&mut write, &response).await {
                            break Err(e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Script session {addr} missed {skipped} notifications");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    dispatcher.release_all();
    info!("Script {addr} disconnected");
    result
}

async fn send_response(write: &mut ResponseSink, response: &TaskResponse) -> Result<(), HostError> {
    let text = serde_json::to_string(response)?;

    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| HostError::Send {
            message: format!("Failed to send task response: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}
