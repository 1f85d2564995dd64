//! Event kind routing.
//!
//! Decides which handler an inbound message goes to from its `type` field.

use serde_json::Value;

use crate::logging::structured::LogContext;

pub const WARN_EMPTY_EVENT_TYPE: &str = "empty event type received";
pub const WARN_UNKNOWN_TYPE: &str = "unknown event type received";

/// Handler selected for an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Delete,
    Unknown(String),
    Missing,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Delete => "delete",
            EventKind::Unknown(kind) => kind.as_str(),
            EventKind::Missing => "",
        }
    }

    /// Read the kind from a message parsed as generic JSON.
    ///
    /// A `null` or non-string `type` counts as missing.
    pub fn from_message(message: &Value) -> Self {
        match message.get("type").and_then(Value::as_str) {
            Some("created") => EventKind::Created,
            Some("updated") => EventKind::Updated,
            Some("delete") => EventKind::Delete,
            Some(other) => EventKind::Unknown(other.to_string()),
            None => EventKind::Missing,
        }
    }
}

/// Route a message, logging the messages that have no handler.
pub fn route_message(message: &Value, ctx: &LogContext) -> EventKind {
    let kind = EventKind::from_message(message);
    let inventory_id = message.get("id").and_then(Value::as_str).unwrap_or("");

    match &kind {
        EventKind::Missing => {
            log::warn!(
                "{} ROUTING_DECISION handler=none reason={:?} inventory_id={}",
                ctx,
                WARN_EMPTY_EVENT_TYPE,
                inventory_id
            );
        }
        EventKind::Unknown(other) => {
            log::warn!(
                "{} ROUTING_DECISION handler=none reason={:?} type={} inventory_id={}",
                ctx,
                WARN_UNKNOWN_TYPE,
                other,
                inventory_id
            );
        }
        routed => {
            log::debug!(
                "{} ROUTING_DECISION handler={} inventory_id={}",
                ctx,
                routed.as_str(),
                inventory_id
            );
        }
    }
    kind
}
