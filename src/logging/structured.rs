//! Structured logging utilities.
//!
//! Provides context-aware logging with the event kind and inventory id
//! included in every log message.

use std::fmt;

/// Logging context for a single consumed event.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub event: String,
    pub inventory_id: Option<String>,
}

impl LogContext {
    pub fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            inventory_id: None,
        }
    }

    pub fn with_inventory(&self, inventory_id: &str) -> Self {
        Self {
            event: self.event.clone(),
            inventory_id: Some(inventory_id.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inventory_id {
            Some(id) => write!(f, "[event={}] [inventory={}]", self.event, id),
            None => write!(f, "[event={}]", self.event),
        }
    }
}

/// Log at `$level` with context, an upper-case event key and `key=value` pairs.
#[macro_export]
macro_rules! log_event {
    ($level:expr, $ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::log!(
            $level,
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!("" $(, stringify!($key), "={:?} ")*) $(, $value)*)
        )
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::log_event!(log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::log_event!(log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::log_event!(log::Level::Error, $($arg)+) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_accept_context_without_pairs() {
        let ctx = LogContext::new("delete");
        crate::log_warn!(ctx, "NO_ROWS_MODIFIED");
        crate::log_info!(ctx, "DELETE_SUCCESS", count = 1, inventory_id = "abc");
    }

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("created");
        assert_eq!(format!("{}", ctx), "[event=created]");

        let ctx_with_inventory = ctx.with_inventory("00000000-0000-0000-0000-000000000001");
        assert_eq!(
            format!("{}", ctx_with_inventory),
            "[event=created] [inventory=00000000-0000-0000-0000-000000000001]"
        );
    }
}
