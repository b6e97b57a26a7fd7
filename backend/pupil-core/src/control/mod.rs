//! Script side of the duplex control channel.
//!
//! Commands go out, task responses come back. One complete JSON message per
//! read; ordering is kept within a direction only.

pub mod pipe;
pub mod ws;

pub use pipe::{HostEnd, ScriptEnd, pipe};
pub use ws::WsControlChannel;

use crate::error::channel::ChannelError;
use crate::protocol::{ControlMessage, TaskResponse};

use std::time::Duration;

use log::warn;

pub trait ControlChannel: Send {
    fn send(&mut self, message: &ControlMessage) -> Result<(), ChannelError>;

    /// Next task response. `None` blocks until one arrives; a zero timeout
    /// only takes what is already buffered. `Ok(None)` means the timeout
    /// elapsed.
    fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<TaskResponse>, ChannelError>;

    fn try_recv(&mut self) -> Result<Option<TaskResponse>, ChannelError> {
        self.recv_timeout(Some(Duration::ZERO))
    }

    fn close(&mut self) {}
}

/// Decode one inbound frame. Frames that are not a JSON object are dropped.
pub(crate) fn decode_response(text: &str) -> Option<TaskResponse> {
    match serde_json::from_str::<TaskResponse>(text) {
        Ok(response) => Some(response),
        Err(e) => {
            warn!("Dropping malformed task response ({e}): {text}");
            None
        }
    }
}
