//! In-process broker used by tests and local runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::ListenerConfig;
use crate::error::{ListenerError, Result};
use crate::mqueue::message::{Message, Reader, Writer};

/// Records every message written to it. Clones share the same log.
#[derive(Clone)]
pub struct MemoryWriter {
    topic: String,
    messages: Arc<Mutex<Vec<Message>>>,
    calls: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryWriter {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            messages: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make subsequent writes fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Successful `write_messages` calls so far.
    pub fn write_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `write_messages` calls rejected while failing.
    pub fn failed_calls(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Decode every recorded message as JSON.
    pub fn payloads<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.messages
            .lock()
            .iter()
            .map(|m| serde_json::from_slice(&m.value).map_err(ListenerError::from))
            .collect()
    }
}

#[async_trait]
impl Writer for MemoryWriter {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn write_messages(&self, messages: Vec<Message>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(ListenerError::send(&self.topic, "writer unavailable"));
        }
        self.messages.lock().extend(messages);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sending half of a [`MemoryReader`].
#[derive(Clone)]
pub struct MemoryFeed {
    tx: mpsc::UnboundedSender<Result<Message>>,
    next_offset: Arc<AtomicUsize>,
}

impl MemoryFeed {
    /// Queue a raw payload; offsets are assigned in order.
    pub fn push(&self, value: impl Into<Vec<u8>>) -> bool {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst) as i64;
        let message = Message {
            key: None,
            value: value.into(),
            offset,
        };
        self.tx.send(Ok(message)).is_ok()
    }

    /// Queue a read failure.
    pub fn fail(&self, reason: &str) -> bool {
        self.tx.send(Err(ListenerError::Read(reason.to_string()))).is_ok()
    }
}

/// Reader over an in-process queue.
///
/// Returns [`ListenerError::ReadTimeout`] when nothing arrives within the
/// read timeout, and a fatal read error once every feed is dropped.
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Result<Message>>,
    read_timeout: Duration,
    committed: Arc<Mutex<Vec<i64>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryReader {
    pub fn channel(read_timeout: Duration) -> (MemoryFeed, MemoryReader) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = MemoryFeed {
            tx,
            next_offset: Arc::new(AtomicUsize::new(0)),
        };
        let reader = MemoryReader {
            rx,
            read_timeout,
            committed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        (feed, reader)
    }

    /// A channel reader using the configured read timeout.
    pub fn from_config(config: &ListenerConfig) -> (MemoryFeed, MemoryReader) {
        Self::channel(config.read_timeout)
    }

    /// Handle to the committed offsets, usable after the reader moved.
    pub fn committed(&self) -> Arc<Mutex<Vec<i64>>> {
        self.committed.clone()
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl Reader for MemoryReader {
    async fn read_message(&mut self) -> Result<Message> {
        match tokio::time::timeout(self.read_timeout, self.rx.recv()).await {
            Ok(Some(item)) => item,
            Ok(None) => Err(ListenerError::Read("feed closed".to_string())),
            Err(_) => Err(ListenerError::ReadTimeout),
        }
    }

    async fn commit(&mut self, message: &Message) -> Result<()> {
        self.committed.lock().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
        Ok(())
    }
}
