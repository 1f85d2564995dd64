//! Broker consumer loop.
//!
//! One sequential reader per process: read, route, handle, commit. The
//! offset is committed after the handler returns whatever the outcome, so
//! delivery is at-least-once and a bad message never blocks the partition.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::{ListenerError, Result};
use crate::event::{route_message, EventKind};
use crate::listener::buffer::EventBuffer;
use crate::listener::context::MessageContext;
use crate::listener::handlers::Handlers;
use crate::listener::metrics::{event_label, ListenerCounters, ERROR_PROCESSING, EVENT_OTHER};
use crate::mqueue::{Message, Reader};

pub struct Consumer<R: Reader> {
    reader: R,
    handlers: Arc<Handlers>,
    buffer: Arc<EventBuffer>,
    counters: Arc<ListenerCounters>,
    retries: u32,
    retry_delay: Duration,
}

impl<R: Reader> Consumer<R> {
    pub fn new(
        reader: R,
        handlers: Arc<Handlers>,
        buffer: Arc<EventBuffer>,
        counters: Arc<ListenerCounters>,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            reader,
            handlers,
            buffer,
            counters,
            retries,
            retry_delay,
        }
    }

    /// Consume until `shutdown` flips to true (or its sender is dropped) or
    /// the reader fails with a non-timeout error.
    ///
    /// Buffered events are not flushed on shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let timer = self.buffer.spawn_idle_flush();
        log::info!("CONSUMER_STARTED retries={}", self.retries);

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            let read = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                    continue;
                }
                read = self.reader.read_message() => read,
            };

            match read {
                Ok(message) => {
                    self.handle_message(&message).await;
                    if let Err(e) = self.reader.commit(&message).await {
                        log::error!("COMMIT_FAILED offset={} error={}", message.offset, e);
                    }
                }
                Err(ListenerError::ReadTimeout) => {
                    log::debug!("READ_TIMEOUT");
                }
                Err(e) => {
                    log::error!("READ_FAILED error={}", e);
                    break Err(e);
                }
            }
        };

        timer.abort();
        if let Err(e) = self.reader.close().await {
            log::warn!("READER_CLOSE_FAILED error={}", e);
        }
        log::info!("CONSUMER_STOPPED clean={}", result.is_ok());
        result
    }

    /// Route and handle one message. Never fails; failures are logged and
    /// counted.
    pub async fn handle_message(&self, message: &Message) {
        let msg_ctx = MessageContext::new(message.offset);

        let value: Value = match serde_json::from_slice(&message.value) {
            Ok(value) => value,
            Err(e) => {
                log::error!(
                    "{} MESSAGE_INVALID_JSON message_id={} offset={} error={}",
                    msg_ctx.log_context(EVENT_OTHER, None),
                    msg_ctx.message_id,
                    message.offset,
                    e
                );
                self.counters.record(EVENT_OTHER, ERROR_PROCESSING);
                return;
            }
        };

        let inventory_id = value
            .get("host")
            .and_then(|h| h.get("id"))
            .or_else(|| value.get("id"))
            .and_then(Value::as_str);
        let pre_ctx = msg_ctx.log_context("received", inventory_id);
        let kind = route_message(&value, &pre_ctx);
        let event = match &kind {
            EventKind::Missing => "missing",
            other => other.as_str(),
        };
        let ctx = msg_ctx.log_context(event, inventory_id);

        let mut attempt = 0;
        loop {
            match self.handlers.dispatch(&kind, &value, &ctx).await {
                Ok(outcome) => {
                    log::debug!(
                        "{} MESSAGE_HANDLED message_id={} outcome={:?}",
                        ctx,
                        msg_ctx.message_id,
                        outcome
                    );
                    return;
                }
                Err(e) if !e.is_permanent() && attempt < self.retries => {
                    attempt += 1;
                    log::warn!(
                        "{} HANDLER_RETRY message_id={} attempt={} error={}",
                        ctx,
                        msg_ctx.message_id,
                        attempt,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    crate::log_error!(
                        ctx,
                        "HANDLER_FAILED",
                        message_id = msg_ctx.message_id,
                        attempts = attempt + 1,
                        error = e.to_string()
                    );
                    self.counters.record(event_label(&kind), ERROR_PROCESSING);
                    return;
                }
            }
        }
    }
}
