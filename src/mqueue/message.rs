//! Broker message and the reader/writer seams.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ListenerError, Result};

/// A single broker record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    /// Position in the source partition; 0 for outbound messages.
    pub offset: i64,
}

impl Message {
    pub fn new(value: Vec<u8>) -> Self {
        Self {
            key: None,
            value,
            offset: 0,
        }
    }

    /// Serialize `payload` as the message value.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_vec(payload)?))
    }
}

/// Ordered consumer of one inbound topic.
#[async_trait]
pub trait Reader: Send {
    /// Next message. Returns [`ListenerError::ReadTimeout`] when nothing
    /// arrived within the reader's deadline.
    async fn read_message(&mut self) -> Result<Message>;

    /// Acknowledge `message` and everything before it.
    async fn commit(&mut self, message: &Message) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Producer for one outbound topic. Shared between tasks.
#[async_trait]
pub trait Writer: Send + Sync {
    fn topic(&self) -> &str;

    async fn write_messages(&self, messages: Vec<Message>) -> Result<()>;
}

/// Serialize `payloads` and write them in one call. Nothing is written for
/// an empty slice.
pub async fn send_json<T: Serialize>(writer: &dyn Writer, payloads: &[T]) -> Result<usize> {
    if payloads.is_empty() {
        return Ok(0);
    }
    let messages = payloads
        .iter()
        .map(Message::json)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| ListenerError::send(writer.topic(), e))?;
    let count = messages.len();
    writer.write_messages(messages).await?;
    Ok(count)
}
