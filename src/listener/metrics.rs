//! Listener counters.
//!
//! Counts handled messages by `(event, outcome)` and failed sends by topic.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::event::EventKind;

pub const EVENT_UPLOAD: &str = "upload";
pub const EVENT_DELETE: &str = "delete";
pub const EVENT_OTHER: &str = "other";

pub const SUCCESS_EVAL: &str = "success-eval";
pub const SUCCESS_DELETED: &str = "success-deleted";
pub const ERROR_IDENTITY: &str = "error-identity";
pub const ERROR_PROCESSING: &str = "error-processing";
pub const ERROR_OTHER_TYPE: &str = "error-other-type";
pub const WARN_NO_ROWS: &str = "warn-no-rows";
pub const WARN_BAD_PACKAGES: &str = "warn-bad-packages";

/// Counter label for the handler an event kind is routed to.
pub fn event_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Created | EventKind::Updated => EVENT_UPLOAD,
        EventKind::Delete => EVENT_DELETE,
        EventKind::Unknown(_) | EventKind::Missing => EVENT_OTHER,
    }
}

#[derive(Debug, Default)]
pub struct ListenerCounters {
    received: Mutex<HashMap<(&'static str, &'static str), u64>>,
    send_failures: Mutex<HashMap<String, u64>>,
}

impl ListenerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &'static str, outcome: &'static str) {
        *self.received.lock().entry((event, outcome)).or_insert(0) += 1;
    }

    pub fn get(&self, event: &str, outcome: &str) -> u64 {
        self.received
            .lock()
            .iter()
            .find(|((e, o), _)| *e == event && *o == outcome)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn record_send_failure(&self, topic: &str) {
        *self
            .send_failures
            .lock()
            .entry(topic.to_string())
            .or_insert(0) += 1;
    }

    pub fn send_failures(&self, topic: &str) -> u64 {
        self.send_failures.lock().get(topic).copied().unwrap_or(0)
    }

    /// Sorted `(event, outcome, count)` rows for export.
    pub fn snapshot(&self) -> Vec<(String, String, u64)> {
        let mut rows: Vec<(String, String, u64)> = self
            .received
            .lock()
            .iter()
            .map(|((e, o), c)| (e.to_string(), o.to_string(), *c))
            .collect();
        rows.sort();
        rows
    }
}
