//! Time utilities for seeding and tick configuration.
//!
//! Safe alternatives to direct SystemTime operations that could panic.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, truncated to 64 bits.
///
/// A clock set before the epoch yields `0` instead of panicking; callers use
/// this only as seed material.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Clamp a tick interval to something `tokio::time::interval` accepts.
pub(crate) fn non_zero_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        Duration::from_nanos(1)
    } else {
        interval
    }
}
