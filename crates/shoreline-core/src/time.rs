//! The single clock source for message timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in nanoseconds since the Unix epoch.
///
/// This is the one place `Msg::time` gets stamped from (the router's
/// `handle_message` step 1); keeping a single call site makes it easy to
/// reason about ordering guarantees and to fake the clock in tests.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_nanos() as i64
}
