//! Identity header decoding.
//!
//! `b64_identity` is base64-encoded JSON of the form
//! `{"identity": {"org_id": .., "account_number": .., "type": ..}}`.

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

use crate::error::{ListenerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
struct IdentityEnvelope {
    identity: Identity,
}

impl Identity {
    /// Decode a base64 identity header.
    pub fn decode(b64_identity: &str) -> Result<Self> {
        let raw = general_purpose::STANDARD
            .decode(b64_identity.trim())
            .or_else(|_| general_purpose::URL_SAFE.decode(b64_identity.trim()))
            .map_err(|e| ListenerError::Identity(format!("base64: {}", e)))?;

        let envelope: IdentityEnvelope = serde_json::from_slice(&raw)
            .map_err(|e| ListenerError::Identity(format!("json: {}", e)))?;
        Ok(envelope.identity)
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref().filter(|org| !org.is_empty())
    }
}
