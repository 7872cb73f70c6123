//! Logging sink with a process-wide enable switch.
//!
//! Messages go through `tracing`; the crate macros drop them early when
//! logging has been switched off with [`set_enabled`]. Logging starts enabled.

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Reset the switch to its initial (enabled) state.
pub fn init() {
    ENABLED.store(true, Ordering::SeqCst);
}

/// Enable or disable logging for the whole process.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

/// Format a millisecond duration as `m:ss`.
pub fn format_millis(millis: u128) -> String {
    let total_secs = millis / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

macro_rules! log_debug {
    ($($arg:tt)+) => {
        if $crate::logging::is_enabled() {
            ::tracing::debug!($($arg)+);
        }
    };
}

macro_rules! log_info {
    ($($arg:tt)+) => {
        if $crate::logging::is_enabled() {
            ::tracing::info!($($arg)+);
        }
    };
}

macro_rules! log_error {
    ($($arg:tt)+) => {
        if $crate::logging::is_enabled() {
            ::tracing::error!($($arg)+);
        }
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
