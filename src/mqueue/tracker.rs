//! Payload-tracker audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mqueue::message::{send_json, Writer};

pub const TRACKER_SERVICE: &str = "hostsync";

pub const STATUS_RECEIVED: &str = "received";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadTrackerEvent {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub request_id: Option<String>,
    pub inventory_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_msg: String,
    pub date: Option<DateTime<Utc>>,
}

impl PayloadTrackerEvent {
    pub fn new(inventory_id: &str, org_id: Option<&str>, request_id: Option<&str>) -> Self {
        Self {
            service: TRACKER_SERVICE.to_string(),
            org_id: org_id.map(str::to_string),
            request_id: request_id.map(str::to_string),
            inventory_id: inventory_id.to_string(),
            status: STATUS_RECEIVED.to_string(),
            status_msg: String::new(),
            date: None,
        }
    }

    pub fn with_status(mut self, status: &str, status_msg: &str) -> Self {
        self.status = status.to_string();
        self.status_msg = status_msg.to_string();
        self
    }

    /// Only events tied to a request and an organization are tracked.
    pub fn should_send(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.is_empty());
        present(&self.request_id) && present(&self.org_id)
    }
}

/// Stamp and send the trackable events in one write.
pub async fn write_tracker_events(writer: &dyn Writer, events: &[PayloadTrackerEvent]) -> Result<usize> {
    let now = Utc::now();
    let stamped: Vec<PayloadTrackerEvent> = events
        .iter()
        .filter(|e| e.should_send())
        .map(|e| PayloadTrackerEvent {
            date: Some(now),
            ..e.clone()
        })
        .collect();
    send_json(writer, &stamped).await
}
