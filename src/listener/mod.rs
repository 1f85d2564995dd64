//! Host lifecycle listener.
//!
//! - `consumer` - Sequential broker loop
//! - `handlers` - Upload and delete handling
//! - `buffer` - Batched evaluator and payload-tracker dispatch
//! - `context` - Per-message logging context
//! - `metrics` - Outcome counters

pub mod buffer;
pub mod consumer;
pub mod context;
pub mod handlers;
pub mod metrics;

pub use buffer::{EventBuffer, FlushReason, FlushReport};
pub use consumer::Consumer;
pub use context::MessageContext;
pub use handlers::{Handlers, Outcome};
pub use metrics::ListenerCounters;

use std::sync::Arc;

use tokio::sync::watch;

use crate::accounts::AccountResolver;
use crate::config::ListenerConfig;
use crate::error::Result;
use crate::mqueue::{Reader, Writer};
use crate::storage::SystemStore;

/// A fully wired listener.
pub struct Listener<R: Reader> {
    consumer: Consumer<R>,
    pub accounts: Arc<AccountResolver>,
    pub buffer: Arc<EventBuffer>,
    pub counters: Arc<ListenerCounters>,
}

impl<R: Reader> Listener<R> {
    pub fn new(
        config: &ListenerConfig,
        store: Arc<dyn SystemStore>,
        reader: R,
        eval_writer: Arc<dyn Writer>,
        tracker_writer: Arc<dyn Writer>,
    ) -> Result<Self> {
        let counters = Arc::new(ListenerCounters::new());
        let accounts = Arc::new(AccountResolver::new(store.clone()));
        let buffer = Arc::new(EventBuffer::new(
            config.event_buffer_size,
            config.eval_batch_size,
            config.upload_eval_timeout,
            eval_writer,
            tracker_writer.clone(),
            counters.clone(),
        ));
        let handlers = Arc::new(Handlers::new(
            store,
            accounts.clone(),
            buffer.clone(),
            tracker_writer,
            counters.clone(),
            config.deletion_threshold,
        )?);
        let consumer = Consumer::new(
            reader,
            handlers,
            buffer.clone(),
            counters.clone(),
            config.handler_retries,
            config.handler_retry_delay,
        );

        log::info!(
            "LISTENER_CONFIGURED upload_topic={} events_topic={} eval_topic={} tracker_topic={} buffer={} batch={} idle_ms={} read_timeout_ms={}",
            config.upload_topic,
            config.events_topic,
            config.eval_topic,
            config.payload_tracker_topic,
            config.event_buffer_size,
            config.eval_batch_size,
            config.upload_eval_timeout.as_millis(),
            config.read_timeout.as_millis()
        );

        Ok(Self {
            consumer,
            accounts,
            buffer,
            counters,
        })
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.run(shutdown).await
    }
}

/// Shutdown signal that flips to true on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("SHUTDOWN_REQUESTED signal=ctrl_c"),
            Err(e) => log::error!("SIGNAL_HANDLER_FAILED error={}", e),
        }
        let _ = tx.send(true);
    });
    rx
}
