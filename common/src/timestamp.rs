//! Wall-clock timestamps carried on the wire.
//!
//! Messages exchanged with the host carry seconds since the UNIX epoch as a
//! float. Deadlines never use these values; they use `std::time::Instant`.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch, with sub-second precision.
///
/// A clock set before the epoch yields `0.0`.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
