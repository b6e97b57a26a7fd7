//! Monotonic deadlines for blocking waits.

use std::time::{Duration, Instant};

/// Absolute end point of a wait, measured on the monotonic clock.
///
/// Built once per wait so that wakeups which find nothing to do shorten the
/// remaining time instead of restarting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    At(Instant),
}

impl Deadline {
    /// `None` never expires; a zero timeout is already expired.
    pub fn after(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Deadline::Never,
            Some(timeout) => Instant::now()
                .checked_add(timeout)
                .map_or(Deadline::Never, Deadline::At),
        }
    }

    pub fn immediate() -> Self {
        Deadline::At(Instant::now())
    }

    /// Time left, `None` when unbounded. Saturates at zero.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    pub fn has_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }
}
