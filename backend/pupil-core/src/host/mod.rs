//! Host side: the command dispatcher and the servers it sits behind.
//!
//! # Architecture
//!
//! - [`NotificationBus`]: in-process fan-out shared by the engine and every
//!   dispatcher
//! - [`CommandDispatcher`]: per-session command policy and response correlation
//! - [`start_control_server`]: WebSocket endpoint for script sessions
//! - [`start_publisher`]: WebSocket feed for gaze, notifications and peers
//!
//! # Security
//!
//! Both servers reject non-loopback connections.

pub mod bus;
pub mod control_server;
pub mod dispatcher;
pub mod engine;
pub mod publisher;

pub use bus::NotificationBus;
pub use control_server::{ControlServerHandle, start_control_server};
pub use dispatcher::{ActionSlots, CommandDispatcher, DispatchOutcome};
pub use engine::TrackingEngine;
pub use publisher::{Publisher, PublisherHandle, start_publisher};
