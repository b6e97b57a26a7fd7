//! In-process duplex pipe.
//!
//! Both ends exchange JSON text so the same codec runs as over a socket. Used
//! when the script and the host share a process, and throughout the tests.

use crate::control::{ControlChannel, decode_response};
use crate::deadline::Deadline;
use crate::error::channel::ChannelError;
use crate::protocol::{CommandFrame, ControlMessage, TaskResponse};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use log::warn;
use serde_json::Value;

/// Create a connected pair of ends.
pub fn pipe() -> (ScriptEnd, HostEnd) {
    let (command_tx, command_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    (
        ScriptEnd {
            commands: command_tx,
            responses: response_rx,
        },
        HostEnd {
            commands: command_rx,
            responses: response_tx,
        },
    )
}

pub struct ScriptEnd {
    commands: Sender<String>,
    responses: Receiver<String>,
}

pub struct HostEnd {
    commands: Receiver<String>,
    responses: Sender<String>,
}

/// Blocking receive bounded by `timeout`. `Ok(None)` on timeout.
#[track_caller]
fn receive(
    receiver: &Receiver<String>,
    timeout: Option<Duration>,
) -> Result<Option<String>, ChannelError> {
    let result = match timeout {
        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        Some(timeout) if timeout.is_zero() => receiver.try_recv().map_err(|e| match e {
            TryRecvError::Empty => RecvTimeoutError::Timeout,
            TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
        }),
        Some(timeout) => receiver.recv_timeout(timeout),
    };

    match result {
        Ok(text) => Ok(Some(text)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Closed {
            message: "Pipe peer hung up".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

#[track_caller]
fn transmit(sender: &Sender<String>, text: String) -> Result<(), ChannelError> {
    sender.send(text).map_err(|_| ChannelError::Closed {
        message: "Pipe peer hung up".to_string(),
        location: ErrorLocation::from(Location::caller()),
    })
}

impl ControlChannel for ScriptEnd {
    fn send(&mut self, message: &ControlMessage) -> Result<(), ChannelError> {
        let text = serde_json::to_string(message)?;
        transmit(&self.commands, text)
    }

    fn recv_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<TaskResponse>, ChannelError> {
        let deadline = Deadline::after(timeout);
        loop {
            let Some(text) = receive(&self.responses, deadline.remaining())? else {
                return Ok(None);
            };
            if let Some(response) = decode_response(&text) {
                return Ok(Some(response));
            }
        }
    }
}

impl HostEnd {
    pub fn send_response(&self, response: &TaskResponse) -> Result<(), ChannelError> {
        let text = serde_json::to_string(response)?;
        transmit(&self.responses, text)
    }

    /// Raw text, for exercising the script side with malformed frames.
    pub fn send_raw(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        transmit(&self.responses, text.into())
    }

    pub fn recv_command(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<CommandFrame>, ChannelError> {
        let deadline = Deadline::after(timeout);
        loop {
            let Some(text) = receive(&self.commands, deadline.remaining())? else {
                return Ok(None);
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => return Ok(Some(CommandFrame::from(value))),
                Err(e) => warn!("Dropping malformed command ({e}): {text}"),
            }
        }
    }

    pub fn try_recv_command(&self) -> Result<Option<CommandFrame>, ChannelError> {
        self.recv_command(Some(Duration::ZERO))
    }
}
