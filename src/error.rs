//! Error types for the ingestion pipeline.

use thiserror::Error;

use crate::nevra::NevraError;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Message parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid identity: {0}")]
    Identity(String),

    #[error("No account provided in host message")]
    NoAccount,

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Malformed packages: {0}")]
    BadPackages(#[from] NevraError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Unable to send messages to {topic}: {reason}")]
    Send { topic: String, reason: String },

    #[error("Broker read error: {0}")]
    Read(String),

    #[error("Broker read timed out")]
    ReadTimeout,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ListenerError {
    pub fn store(reason: impl ToString) -> Self {
        ListenerError::Store(reason.to_string())
    }

    pub fn send(topic: &str, reason: impl ToString) -> Self {
        ListenerError::Send {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors caused by the message itself; retrying cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ListenerError::Parse(_)
                | ListenerError::Identity(_)
                | ListenerError::NoAccount
                | ListenerError::InvalidHost(_)
                | ListenerError::BadPackages(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
