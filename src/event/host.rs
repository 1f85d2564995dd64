//! Inbound host lifecycle messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ListenerError, Result};
use crate::nevra::Nevra;

/// A lifecycle notification from the inventory service.
///
/// Every field is optional on the wire; handlers decide which ones they
/// require. Delete events only carry `id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub b64_identity: Option<String>,
    #[serde(default)]
    pub host: Option<Host>,
    #[serde(default)]
    pub metadata: Option<HostMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetadata {
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub stale_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stale_warning_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub culled_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reporter: Option<String>,
    #[serde(default)]
    pub system_profile: SystemProfile,
}

/// The host's reported system profile.
///
/// Only the package list is interpreted here; every other key is kept
/// verbatim so the request checksum covers the whole profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_packages: Option<Vec<String>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl HostEvent {
    /// Inventory id of the nested host, falling back to the top-level `id`.
    pub fn inventory_id(&self) -> Option<&str> {
        self.host
            .as_ref()
            .and_then(|h| h.id.as_deref())
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn request_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.request_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

impl Host {
    /// Display name as received, or the inventory id when the name is blank.
    pub fn display_name_or_id(&self, inventory_id: &str) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => inventory_id.to_string(),
        }
    }
}

impl SystemProfile {
    pub fn installed_packages(&self) -> &[String] {
        self.installed_packages.as_deref().unwrap_or(&[])
    }

    /// Check that the first reported package is a valid package identifier.
    ///
    /// An empty package list is accepted.
    pub fn validate_packages(&self) -> Result<()> {
        match self.installed_packages().first() {
            Some(first) => Nevra::parse(first)
                .map(|_| ())
                .map_err(ListenerError::BadPackages),
            None => Ok(()),
        }
    }

    /// Hex SHA-256 of the serialized profile.
    pub fn checksum(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&json)))
    }
}
