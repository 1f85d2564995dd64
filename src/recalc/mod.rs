//! Recalculation fan-in queue.
//!
//! Any number of tasks may request re-evaluation of systems. Requests are
//! handed over through a channel of capacity 1 to a single task that owns
//! the evaluator writer, so writes are serialized and a producer waits
//! while the writer is busy. Failures are logged and counted, and never
//! reach callers.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ListenerConfig;
use crate::listener::metrics::ListenerCounters;
use crate::mqueue::{write_recalc, InventoryAid, Writer};
use crate::storage::SystemStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcRequest {
    Systems(Vec<InventoryAid>),
    /// Every active system of the account on `baseline_id`, or on no
    /// baseline when `None`.
    Baseline {
        account_id: i32,
        baseline_id: Option<i64>,
    },
}

#[derive(Clone)]
pub struct RecalcQueue {
    tx: Option<mpsc::Sender<RecalcRequest>>,
}

impl RecalcQueue {
    /// Start the writer task.
    pub fn spawn(
        writer: Arc<dyn Writer>,
        store: Arc<dyn SystemStore>,
        counters: Arc<ListenerCounters>,
        batch_size: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_writer(rx, writer, store, counters, batch_size));
        (Self { tx: Some(tx) }, handle)
    }

    /// A queue that drops every request.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the writer task unless evaluation requests are disabled.
    pub fn from_config(
        config: &ListenerConfig,
        writer: Arc<dyn Writer>,
        store: Arc<dyn SystemStore>,
        counters: Arc<ListenerCounters>,
    ) -> (Self, Option<JoinHandle<()>>) {
        if !config.enable_evaluation_requests {
            log::info!("RECALC_DISABLED");
            return (Self::disabled(), None);
        }
        let (queue, handle) = Self::spawn(writer, store, counters, config.eval_batch_size);
        (queue, Some(handle))
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue systems for re-evaluation.
    pub async fn recalc(&self, systems: Vec<InventoryAid>) {
        self.submit(RecalcRequest::Systems(systems)).await;
    }

    /// Queue every system assigned to a baseline for re-evaluation.
    pub async fn recalc_baseline(&self, account_id: i32, baseline_id: Option<i64>) {
        self.submit(RecalcRequest::Baseline {
            account_id,
            baseline_id,
        })
        .await;
    }

    async fn submit(&self, request: RecalcRequest) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(request).await {
            log::error!("RECALC_QUEUE_CLOSED request={:?}", e.0);
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<RecalcRequest>,
    writer: Arc<dyn Writer>,
    store: Arc<dyn SystemStore>,
    counters: Arc<ListenerCounters>,
    batch_size: usize,
) {
    while let Some(request) = rx.recv().await {
        let systems = match request {
            RecalcRequest::Systems(systems) => systems,
            RecalcRequest::Baseline {
                account_id,
                baseline_id,
            } => match store.systems_for_baseline(account_id, baseline_id).await {
                Ok(systems) => systems,
                Err(e) => {
                    log::error!(
                        "RECALC_BASELINE_FAILED account_id={} baseline_id={:?} error={}",
                        account_id,
                        baseline_id,
                        e
                    );
                    continue;
                }
            },
        };
        if systems.is_empty() {
            continue;
        }

        match write_recalc(writer.as_ref(), &systems, batch_size).await {
            Ok(sent) => log::debug!("RECALC_SENT systems={} messages={}", systems.len(), sent),
            Err(e) => {
                log::error!("RECALC_SEND_FAILED systems={} error={}", systems.len(), e);
                counters.record_send_failure(writer.topic());
            }
        }
    }
    log::info!("RECALC_WRITER_STOPPED");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqueue::{MemoryWriter, PlatformEvent};
    use crate::storage::{MemoryStore, SystemUpsert};
    use chrono::Utc;

    fn aid(inventory_id: &str, account_id: i32) -> InventoryAid {
        InventoryAid {
            inventory_id: inventory_id.to_string(),
            account_id,
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers_all_written() {
        let writer = MemoryWriter::new("eval");
        let (queue, handle) = RecalcQueue::spawn(
            Arc::new(writer.clone()),
            Arc::new(MemoryStore::new()),
            Arc::new(ListenerCounters::new()),
            4000,
        );

        let producers: Vec<_> = (0..20)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.recalc(vec![aid(&format!("inv-{}", i), 1)]).await })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }
        drop(queue);
        handle.await.unwrap();

        assert_eq!(writer.write_calls(), 20);
        let mut systems: Vec<String> = writer
            .payloads::<PlatformEvent>()
            .unwrap()
            .into_iter()
            .flat_map(|e| e.system_ids)
            .collect();
        systems.sort();
        systems.dedup();
        assert_eq!(systems.len(), 20);
    }

    #[tokio::test]
    async fn test_send_failure_logged_and_counted() {
        let writer = MemoryWriter::new("eval");
        let counters = Arc::new(ListenerCounters::new());
        writer.set_failing(true);
        let (queue, handle) = RecalcQueue::spawn(
            Arc::new(writer.clone()),
            Arc::new(MemoryStore::new()),
            counters.clone(),
            4000,
        );

        queue.recalc(vec![aid("a", 1)]).await;
        while writer.failed_calls() == 0 {
            tokio::task::yield_now().await;
        }
        writer.set_failing(false);
        queue.recalc(vec![aid("b", 1)]).await;
        drop(queue);
        handle.await.unwrap();

        let events: Vec<PlatformEvent> = writer.payloads().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].system_ids, vec!["b"]);
        assert_eq!(writer.failed_calls(), 1);
        assert_eq!(counters.send_failures("eval"), 1);
    }

    #[tokio::test]
    async fn test_baseline_expanded_through_store() {
        let store = Arc::new(MemoryStore::new());
        for inv in ["a", "b", "c"] {
            store
                .upsert_system(&SystemUpsert {
                    account_id: 4,
                    inventory_id: inv.to_string(),
                    display_name: inv.to_string(),
                    request_checksum: None,
                    stale_timestamp: None,
                    stale_warning_timestamp: None,
                    culled_timestamp: None,
                    last_upload: Utc::now(),
                })
                .await
                .unwrap();
        }
        store.set_baseline(4, "b", Some(1));

        let writer = MemoryWriter::new("eval");
        let (queue, handle) = RecalcQueue::spawn(
            Arc::new(writer.clone()),
            store,
            Arc::new(ListenerCounters::new()),
            4000,
        );
        queue.recalc_baseline(4, Some(1)).await;
        queue.recalc_baseline(4, None).await;
        queue.recalc_baseline(99, None).await;
        drop(queue);
        handle.await.unwrap();

        let events: Vec<PlatformEvent> = writer.payloads().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].system_ids, vec!["b"]);
        assert_eq!(events[1].system_ids, vec!["a", "c"]);
        assert_eq!(events[1].account_id, 4);
    }

    #[tokio::test]
    async fn test_disabled_queue_is_noop() {
        let config = ListenerConfig {
            enable_evaluation_requests: false,
            ..ListenerConfig::default()
        };
        let writer = MemoryWriter::new("eval");
        let (queue, handle) = RecalcQueue::from_config(
            &config,
            Arc::new(writer.clone()),
            Arc::new(MemoryStore::new()),
            Arc::new(ListenerCounters::new()),
        );

        assert!(handle.is_none());
        assert!(!queue.is_enabled());
        queue.recalc(vec![aid("a", 1)]).await;
        assert_eq!(writer.write_calls(), 0);
    }
}
