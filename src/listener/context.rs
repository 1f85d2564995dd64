//! Per-message context for logging.

use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Context for one consumed broker message.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub message_id: String,
    pub offset: i64,
}

impl MessageContext {
    pub fn new(offset: i64) -> Self {
        Self {
            message_id: format!("msg-{}", &Uuid::new_v4().simple().to_string()[..8]),
            offset,
        }
    }

    /// Log context for the handler `event` selected for this message.
    pub fn log_context(&self, event: &str, inventory_id: Option<&str>) -> LogContext {
        let ctx = LogContext::new(event);
        match inventory_id {
            Some(id) if !id.is_empty() => ctx.with_inventory(id),
            _ => ctx,
        }
    }
}
