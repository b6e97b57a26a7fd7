//! WebSocket transport for the control channel.
//!
//! The script side is synchronous, so the channel carries its own
//! current-thread runtime and drives the socket with `block_on`. It must not be
//! used from inside another tokio runtime.

use crate::control::{ControlChannel, decode_response};
use crate::deadline::Deadline;
use crate::error::channel::ChannelError;
use crate::protocol::{ControlMessage, TaskResponse};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use tokio::time::timeout as TokioTimeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub struct WsControlChannel {
    address: String,
    runtime: Runtime,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsControlChannel {
    /// Connect to the host's control endpoint, e.g. `ws://127.0.0.1:5001`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Connect`] if the runtime cannot be built or the
    /// host does not accept the WebSocket handshake.
    pub fn connect(address: &str) -> Result<Self, ChannelError> {
        let runtime = RuntimeBuilder::new_current_thread().enable_all().build()?;

        let (stream, _) = runtime
            .block_on(connect_async(address))
            .map_err(|e| ChannelError::Connect {
                message: format!("Failed to connect control channel to {address}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        info!("Control channel connected to {address}");

        Ok(Self {
            address: address.to_string(),
            runtime,
            stream,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl ControlChannel for WsControlChannel {
    fn send(&mut self, message: &ControlMessage) -> Result<(), ChannelError> {
        let text = serde_json::to_string(message)?;
        let stream = &mut self.stream;

        self.runtime
            .block_on(stream.send(Message::Text(text.into())))
            .map_err(|e| ChannelError::Send {
                message: format!("Failed to send command: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<TaskResponse>, ChannelError> {
        let deadline = Deadline::after(timeout);
        let stream = &mut self.stream;

        loop {
            let next = match deadline.remaining() {
                None => self.runtime.block_on(stream.next()),
                Some(left) => {
                    // The inner future is polled before the timer, so a zero
                    // timeout still picks up an already buffered frame.
                    match self
                        .runtime
                        .block_on(async { TokioTimeout(left, stream.next()).await })
                    {
                        Ok(next) => next,
                        Err(_) => return Ok(None),
                    }
                }
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    if let Some(response) = decode_response(text.as_str()) {
                        return Ok(Some(response));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ChannelError::Closed {
                        message: format!("Control channel to {} closed", self.address),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                Some(Ok(other)) => debug!("Ignoring non-text control frame: {other:?}"),
                Some(Err(e)) => {
                    return Err(ChannelError::Read {
                        message: format!("Failed to read control channel: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }
        }
    }

    fn close(&mut self) {
        let stream = &mut self.stream;
        if let Err(e) = self.runtime.block_on(stream.close(None)) {
            debug!("Control channel close handshake failed: {e}");
        }
    }
}
