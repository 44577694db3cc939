//! A single place for the "milliseconds since the UNIX epoch" clock used
//! throughout the cache, browser and resolver timing logic, so tests can
//! reason about ages without reaching for `std::time::Instant` arithmetic.
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the UNIX epoch")
        .as_millis() as u64
}
