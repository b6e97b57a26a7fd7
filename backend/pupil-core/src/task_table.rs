//! Correlation of asynchronous task responses with the tasks that asked for them.
//!
//! One control channel carries replies for every outstanding task. Whoever
//! polls the channel files each reply under its task id; a status callback
//! only returns once it sees its own id, leaving other tasks' replies cached
//! for their callbacks to pick up later.

use crate::control::ControlChannel;
use crate::deadline::Deadline;
use crate::error::channel::ChannelError;
use crate::error::task::TaskError;
use crate::protocol::status::{
    PENDING_STATUS_TEXT, STATUS_PENDING, STATUS_UNSPECIFIED, UNSPECIFIED_STATUS_TEXT, is_terminal,
};
use crate::protocol::{ActionKind, ControlMessage, TaskId, TaskResponse};

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, trace, warn};
use serde_json::Value;

/// What a status callback hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponse {
    /// True if this response carries an update not seen by a previous call.
    pub changed: bool,
    pub status: String,
    pub status_code: i32,
    pub result: Option<Value>,
}

impl StatusResponse {
    /// Answer for a task that is gone, either consumed or never tracked.
    pub fn unspecified() -> Self {
        Self {
            changed: true,
            status: UNSPECIFIED_STATUS_TEXT.to_string(),
            status_code: STATUS_UNSPECIFIED,
            result: None,
        }
    }

    /// Terminal responses are the last ones a task produces.
    pub fn is_finished(&self) -> bool {
        is_terminal(self.status_code)
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 0
    }
}

#[derive(Debug, Clone)]
struct TaskState {
    kind: ActionKind,
    processed: bool,
    status: String,
    status_code: i32,
    result: Option<Value>,
}

impl TaskState {
    fn pending(kind: ActionKind) -> Self {
        Self {
            kind,
            processed: true,
            status: PENDING_STATUS_TEXT.to_string(),
            status_code: STATUS_PENDING,
            result: None,
        }
    }

    fn apply(&mut self, response: TaskResponse) {
        self.processed = false;
        self.status = response.status;
        self.status_code = response.status_code;
        self.result = response.result;
    }

    fn snapshot(&self) -> StatusResponse {
        StatusResponse {
            changed: !self.processed,
            status: self.status.clone(),
            status_code: self.status_code,
            result: self.result.clone(),
        }
    }
}

struct TableInner {
    states: HashMap<TaskId, TaskState>,
    channel: Box<dyn ControlChannel>,
    /// Set once the channel failed or was closed; no further polling happens.
    channel_closed: bool,
}

impl TableInner {
    /// Return the cached state of `task_id` and mark it processed. Terminal
    /// states are removed so the next lookup answers "unspecified".
    fn consume(&mut self, task_id: TaskId) -> StatusResponse {
        let Some(state) = self.states.get_mut(&task_id) else {
            return StatusResponse::unspecified();
        };

        let response = state.snapshot();
        if is_terminal(response.status_code) {
            debug!("Task {task_id} ({}) finished: {}", state.kind, response.status);
            self.states.remove(&task_id);
        } else {
            state.processed = true;
        }
        response
    }

    fn file_response(&mut self, response: TaskResponse) -> Option<TaskId> {
        let Some(response_id) = response.id else {
            debug!("Ignoring task response without id: {}", response.status);
            return None;
        };

        match self.states.get_mut(&response_id) {
            Some(state) => {
                trace!(
                    "Task {response_id} update: {} ({})",
                    response.status, response.status_code
                );
                state.apply(response);
            }
            None => debug!("Response for untracked task {response_id}: {}", response.status),
        }
        Some(response_id)
    }
}

/// Per-caller task table. Owns the control channel because status callbacks
/// poll it directly.
///
/// Cloning shares the table; all clones must be used from one thread at a time.
#[derive(Clone)]
pub struct TaskTable {
    inner: Arc<Mutex<TableInner>>,
}

impl TaskTable {
    pub fn new(channel: Box<dyn ControlChannel>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner {
                states: HashMap::new(),
                channel,
                channel_closed: false,
            })),
        }
    }

    /// Register a pending task and return the callback bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Duplicate`] if `task_id` is already tracked.
    #[track_caller]
    pub fn create_callback(
        &self,
        task_id: TaskId,
        kind: ActionKind,
    ) -> Result<StatusCallback, TaskError> {
        let mut inner = self.lock();
        if inner.states.contains_key(&task_id) {
            return Err(TaskError::Duplicate {
                task_id,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        inner.states.insert(task_id, TaskState::pending(kind));

        Ok(StatusCallback {
            task_id,
            kind,
            table: self.clone(),
        })
    }

    pub fn send(&self, message: &ControlMessage) -> Result<(), ChannelError> {
        self.lock().channel.send(message)
    }

    /// Drop a task without waiting for its terminal response.
    pub fn forget(&self, task_id: TaskId) {
        self.lock().states.remove(&task_id);
    }

    pub fn is_tracked(&self, task_id: TaskId) -> bool {
        self.lock().states.contains_key(&task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().states.is_empty()
    }

    /// True once the control channel has failed or been closed. Cached
    /// states are still readable, but no new replies will arrive.
    pub fn is_channel_closed(&self) -> bool {
        self.lock().channel_closed
    }

    pub(crate) fn close_channel(&self) {
        let mut inner = self.lock();
        inner.channel.close();
        inner.channel_closed = true;
    }

    fn status(&self, task_id: TaskId, deadline: Deadline) -> StatusResponse {
        let mut inner = self.lock();

        let Some(state) = inner.states.get(&task_id) else {
            return StatusResponse::unspecified();
        };

        // Someone else's poll already filed an update for us.
        if !state.processed {
            return inner.consume(task_id);
        }

        while !inner.channel_closed {
            let response = match inner.channel.recv_timeout(deadline.remaining()) {
                Ok(Some(response)) => response,
                Ok(None) => break,
                Err(e) => {
                    warn!("Polling control channel for task {task_id} failed: {e}");
                    inner.channel_closed = true;
                    break;
                }
            };

            if inner.file_response(response) == Some(task_id) {
                return inner.consume(task_id);
            }
        }

        inner
            .states
            .get(&task_id)
            .map(TaskState::snapshot)
            .unwrap_or_else(StatusResponse::unspecified)
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by start commands; reports the progress of one task.
#[derive(Clone)]
pub struct StatusCallback {
    task_id: TaskId,
    kind: ActionKind,
    table: TaskTable,
}

impl StatusCallback {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Non-blocking: file whatever replies are buffered and report.
    pub fn poll(&self) -> StatusResponse {
        self.table.status(self.task_id, Deadline::immediate())
    }

    /// Block until a reply for this task arrives or `timeout` elapses.
    /// `None` waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> StatusResponse {
        self.table.status(self.task_id, Deadline::after(timeout))
    }

    /// Keep waiting through progress updates until the task is terminal,
    /// `timeout` elapses, or the control channel is gone. Returns the last
    /// response seen.
    pub fn wait_until_finished(&self, timeout: Option<Duration>) -> StatusResponse {
        let deadline = Deadline::after(timeout);
        loop {
            let response = self.table.status(self.task_id, deadline);
            if response.is_finished() || deadline.has_expired() || self.table.is_channel_closed()
            {
                return response;
            }
        }
    }
}
