//! Time helpers and logger bootstrap shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Level;

const SECONDS_PER_DAY: u64 = 86_400;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Returns `0` if the system clock is set before the epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Current wall-clock time in whole seconds since the Unix epoch.
///
/// This is the resolution used for queue ordering scores.
pub fn current_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Number of whole UTC days elapsed since the Unix epoch.
pub fn current_utc_day() -> u64 {
    utc_day_of(current_time_secs())
}

/// UTC day number for a timestamp expressed in seconds since the epoch.
#[inline]
pub fn utc_day_of(secs: u64) -> u64 {
    secs / SECONDS_PER_DAY
}

/// Installs a global `tracing` fmt subscriber.
///
/// The maximum level is read from the `LOGLEVEL` environment variable
/// (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`, any case) and defaults to
/// `INFO`. Calling this more than once is harmless: later calls are ignored.
pub fn setup_logger() {
    let level = level_or_default(std::env::var("LOGLEVEL").ok().as_deref());

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn level_or_default(value: Option<&str>) -> Level {
    value
        .and_then(|value| value.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}
