//! Structured logging with event context.
//!
//! Provides a `LogContext` and logging macros that include the event kind
//! and inventory id in every message for easy correlation.

pub mod structured;

pub use structured::*;

/// Initialize the process logger.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger(level: log::LevelFilter) {
    let _ = env_logger::builder()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init();
}
