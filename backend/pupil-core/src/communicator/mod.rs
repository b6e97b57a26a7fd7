//! Script-facing façade.
//!
//! A [`Communicator`] issues commands over the control channel, drains the
//! event queue filled by its [`NetworkListener`], classifies entries into
//! [`Event`]s, dispatches the registered callbacks, and offers blocking waits
//! for specific event types.
//!
//! All methods run on the consumer thread. The only state shared with the
//! listener thread is the event queue.

pub mod callbacks;
pub mod events;

pub use callbacks::{Callbacks, EventCallback};
pub use events::{Classified, Event, EventCategory, EventKind, EventType, classify};

use crate::config::InterfaceConfig;
use crate::control::{ControlChannel, WsControlChannel};
use crate::deadline::Deadline;
use crate::error::CoreError;
use crate::event_queue::EventQueue;
use crate::listener::NetworkListener;
use crate::protocol::{ActionKind, ControlMessage, TaskId};
use crate::task_table::{StatusCallback, TaskTable};

use common::now_seconds;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitMode {
    Any,
    All,
}

pub struct Communicator {
    config: InterfaceConfig,
    queue: Arc<EventQueue>,
    listener: Option<NetworkListener>,
    tasks: TaskTable,
    callbacks: Callbacks,
    latest_gaze: Option<Value>,
    closed: bool,
}

impl Communicator {
    /// Connect the control channel to `config.control_address` and start
    /// listening on `config.sub_address`.
    ///
    /// Must not be called from inside a tokio runtime.
    pub fn connect(config: InterfaceConfig) -> Result<Self, CoreError> {
        let channel = WsControlChannel::connect(&config.control_address)?;
        Self::new(config, Box::new(channel))
    }

    /// Start listening on `config.sub_address` and use `channel` for commands.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Listener`] if the listener cannot be started.
    pub fn new(
        config: InterfaceConfig,
        channel: Box<dyn ControlChannel>,
    ) -> Result<Self, CoreError> {
        let queue = Arc::new(EventQueue::new());
        let listener = NetworkListener::spawn(&config, Arc::clone(&queue))?;

        Ok(Self {
            config,
            queue,
            listener: Some(listener),
            tasks: TaskTable::new(channel),
            callbacks: Callbacks::default(),
            latest_gaze: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    /// The queue the listener pushes onto.
    pub fn event_queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(NetworkListener::is_running)
    }

    /// Most recent gaze payload seen by [`check_events`](Self::check_events).
    pub fn latest_gaze(&self) -> Option<&Value> {
        self.latest_gaze.as_ref()
    }

    pub fn set_calibration_callback(&mut self, callback: EventCallback) {
        self.callbacks.set(EventCategory::Calibration, callback);
    }

    pub fn set_recording_callback(&mut self, callback: EventCallback) {
        self.callbacks.set(EventCategory::Recording, callback);
    }

    pub fn set_network_callback(&mut self, callback: EventCallback) {
        self.callbacks.set(EventCategory::Network, callback);
    }

    pub fn set_subscription_callback(&mut self, callback: EventCallback) {
        self.callbacks.set(EventCategory::Subscription, callback);
    }

    /// Drain the queue, classify every entry, and dispatch each event to its
    /// category callback exactly once. Events are returned in arrival order.
    pub fn check_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        for entry in self.queue.drain() {
            match classify(entry, &self.config.recording_source) {
                Classified::Event(event) => {
                    if event.kind == EventKind::GazeReceived {
                        self.latest_gaze = Some(event.payload.clone());
                    } else {
                        debug!("Event: {:?}", event.kind);
                    }
                    self.callbacks.dispatch(&event);
                    events.push(event);
                }
                Classified::Echo => trace!("Skipping own recording notification"),
                Classified::Ignored => trace!("Skipping host-internal notification"),
                Classified::Unknown(raw) => warn!("Unknown queue entry: {raw}"),
            }
        }

        events
    }

    /// Block until at least one of `events` has been observed or `timeout`
    /// elapses. `None` waits indefinitely.
    ///
    /// The result holds the latest event of each observed type, plus an
    /// [`EventType::Timeout`] entry if nothing was observed in time.
    pub fn wait_any(
        &mut self,
        events: &[EventType],
        timeout: Option<Duration>,
    ) -> HashMap<EventType, Event> {
        self.wait_for(events, timeout, WaitMode::Any)
    }

    /// Block until every type in `events` has been observed at least once or
    /// `timeout` elapses. On timeout the result may miss some types and holds
    /// an [`EventType::Timeout`] entry.
    pub fn wait_all(
        &mut self,
        events: &[EventType],
        timeout: Option<Duration>,
    ) -> HashMap<EventType, Event> {
        self.wait_for(events, timeout, WaitMode::All)
    }

    fn wait_for(
        &mut self,
        wanted: &[EventType],
        timeout: Option<Duration>,
        mode: WaitMode,
    ) -> HashMap<EventType, Event> {
        let deadline = Deadline::after(timeout);
        let mut observed = HashMap::new();

        loop {
            for event in self.check_events() {
                let event_type = event.event_type();
                if wanted.contains(&event_type) {
                    observed.insert(event_type, event);
                }
            }

            let complete = match mode {
                WaitMode::Any => !observed.is_empty(),
                WaitMode::All => wanted.iter().all(|t| observed.contains_key(t)),
            };
            if complete {
                return observed;
            }

            if deadline.has_expired() {
                debug!("Wait for {wanted:?} timed out");
                observed.insert(EventType::Timeout, Event::timeout(now_seconds()));
                return observed;
            }

            self.queue.wait_for_activity(deadline.remaining());
        }
    }

    /// Ask the host to calibrate. Never blocks; progress is reported through
    /// the returned status callback and the calibration events.
    ///
    /// `callback`, when given, replaces the calibration callback.
    pub fn start_calibration(
        &mut self,
        callback: Option<EventCallback>,
        context: Option<Value>,
    ) -> Result<StatusCallback, CoreError> {
        if let Some(callback) = callback {
            self.callbacks.set(EventCategory::Calibration, callback);
        }

        let id = TaskId::new();
        let message = ControlMessage::StartCalibration {
            id,
            timestamp: now_seconds(),
            context,
        };
        self.start_task(id, ActionKind::Calibration, &message)
    }

    pub fn stop_calibration(&mut self, callback: Option<EventCallback>) -> Result<(), CoreError> {
        if let Some(callback) = callback {
            self.callbacks.set(EventCategory::Calibration, callback);
        }

        self.tasks.send(&ControlMessage::StopCalibration {
            timestamp: now_seconds(),
        })?;
        Ok(())
    }

    /// Ask the host to record. `None` uses the configured default session name.
    pub fn start_recording(
        &mut self,
        session_name: Option<&str>,
        callback: Option<EventCallback>,
    ) -> Result<StatusCallback, CoreError> {
        if let Some(callback) = callback {
            self.callbacks.set(EventCategory::Recording, callback);
        }

        let session_name = session_name.unwrap_or(&self.config.default_session_name);
        let id = TaskId::new();
        let message = ControlMessage::StartRecording {
            id,
            timestamp: now_seconds(),
            context: Some(Value::String(session_name.to_string())),
        };
        self.start_task(id, ActionKind::Recording, &message)
    }

    pub fn stop_recording(&mut self, callback: Option<EventCallback>) -> Result<(), CoreError> {
        if let Some(callback) = callback {
            self.callbacks.set(EventCategory::Recording, callback);
        }

        self.tasks.send(&ControlMessage::StopRecording {
            timestamp: now_seconds(),
        })?;
        Ok(())
    }

    /// Send an annotation trigger, optionally tied to a frame.
    pub fn trigger(
        &mut self,
        frame_id: Option<u64>,
        context: Option<Value>,
    ) -> Result<(), CoreError> {
        self.tasks.send(&ControlMessage::Trigger {
            timestamp: now_seconds(),
            frame_id,
            context,
        })?;
        Ok(())
    }

    /// Send `exit`, close the control channel, and stop the listener.
    ///
    /// After `Ok(())` the listener thread has been joined.
    pub fn close(mut self) -> Result<(), CoreError> {
        self.shutdown()
    }

    fn start_task(
        &mut self,
        id: TaskId,
        kind: ActionKind,
        message: &ControlMessage,
    ) -> Result<StatusCallback, CoreError> {
        let status = self.tasks.create_callback(id, kind)?;

        if let Err(e) = self.tasks.send(message) {
            self.tasks.forget(id);
            return Err(e.into());
        }

        info!("Requested {kind} (task {id})");
        Ok(status)
    }

    fn shutdown(&mut self) -> Result<(), CoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let exit = ControlMessage::Exit {
            timestamp: Some(now_seconds()),
        };
        if let Err(e) = self.tasks.send(&exit) {
            debug!("Could not send exit: {e}");
        }
        self.tasks.close_channel();

        if let Some(mut listener) = self.listener.take() {
            listener.shutdown()?;
        }

        info!("Communicator closed");
        Ok(())
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("{e}");
        }
    }
}
