pub mod communicator;
pub mod config;
pub mod control;
pub mod deadline;
pub mod error;
pub mod event_queue;
pub mod host;
pub mod listener;
pub mod protocol;
pub mod task_table;

#[cfg(test)]
mod tests;

pub const PUPIL_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_FEED_PORT: u16 = 5000;
pub const DEFAULT_CONTROL_PORT: u16 = 5001;
pub const DEFAULT_SUB_ADDRESS: &str =
    const_format::concatcp!("ws://", PUPIL_HOSTNAME, ":", DEFAULT_FEED_PORT);
pub const DEFAULT_CONTROL_ADDRESS: &str =
    const_format::concatcp!("ws://", PUPIL_HOSTNAME, ":", DEFAULT_CONTROL_PORT);

pub use communicator::{Communicator, Event, EventKind, EventType};
pub use event_queue::{EventQueue, QueueEntry};
pub use task_table::{StatusCallback, StatusResponse, TaskTable};
