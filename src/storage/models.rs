//! Relational records owned by the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Organization mapped to an internal account id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i32,
    pub org_id: String,
}

/// One host known to an account. Unique on (account_id, inventory_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub id: i64,
    pub account_id: i32,
    pub inventory_id: String,
    pub display_name: String,
    pub request_checksum: Option<String>,
    /// Logically deleted; the row is retained.
    pub stale: bool,
    pub stale_timestamp: Option<DateTime<Utc>>,
    pub stale_warning_timestamp: Option<DateTime<Utc>>,
    pub culled_timestamp: Option<DateTime<Utc>>,
    pub last_upload: Option<DateTime<Utc>>,
    pub baseline_id: Option<i64>,
}

/// Mutable fields written by an upload.
///
/// Applying an upsert clears the stale flag and leaves the baseline
/// assignment untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemUpsert {
    pub account_id: i32,
    pub inventory_id: String,
    pub display_name: String,
    pub request_checksum: Option<String>,
    pub stale_timestamp: Option<DateTime<Utc>>,
    pub stale_warning_timestamp: Option<DateTime<Utc>>,
    pub culled_timestamp: Option<DateTime<Utc>>,
    pub last_upload: DateTime<Utc>,
}

/// Marker left by a delete event. Unique on inventory_id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSystem {
    pub inventory_id: String,
    pub when_deleted: DateTime<Utc>,
}

impl DeletedSystem {
    /// True while the marker is younger than `threshold`.
    pub fn is_recent(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now - self.when_deleted < threshold
    }
}
