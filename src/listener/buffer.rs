//! Batched dispatch of evaluator requests and audit events.
//!
//! Upload results accumulate in two parallel vectors behind one async
//! mutex. A flush happens when the buffer reaches capacity (inside `add`)
//! or when no event was added for the idle interval (timer task). Both
//! paths flush while holding the same lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::listener::metrics::ListenerCounters;
use crate::mqueue::{write_eval_data, write_tracker_events, EvalData, PayloadTrackerEvent, Writer};

pub const ERROR_KAFKA_SEND: &str = "unable to send evaluation message";
pub const WARN_PAYLOAD_TRACKER: &str = "unable to send message to payload tracker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Full,
    Timeout,
    Manual,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Full => "full",
            FlushReason::Timeout => "timeout",
            FlushReason::Manual => "manual",
        }
    }
}

/// What a flush sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Items taken out of the buffer.
    pub items: usize,
    pub eval_messages: usize,
    pub tracker_messages: usize,
    pub eval_failed: bool,
    pub tracker_failed: bool,
}

struct BufferState {
    eval: Vec<EvalData>,
    tracker: Vec<PayloadTrackerEvent>,
    deadline: Option<Instant>,
}

pub struct EventBuffer {
    state: Mutex<BufferState>,
    rearm: Notify,
    capacity: usize,
    batch_size: usize,
    idle_flush: Duration,
    eval_writer: Arc<dyn Writer>,
    tracker_writer: Arc<dyn Writer>,
    counters: Arc<ListenerCounters>,
}

impl EventBuffer {
    pub fn new(
        capacity: usize,
        batch_size: usize,
        idle_flush: Duration,
        eval_writer: Arc<dyn Writer>,
        tracker_writer: Arc<dyn Writer>,
        counters: Arc<ListenerCounters>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(BufferState {
                eval: Vec::with_capacity(capacity),
                tracker: Vec::with_capacity(capacity),
                deadline: None,
            }),
            rearm: Notify::new(),
            capacity,
            batch_size,
            idle_flush,
            eval_writer,
            tracker_writer,
            counters,
        }
    }

    /// Buffer one upload result. Flushes before returning when the buffer
    /// reached capacity.
    pub async fn add(&self, eval: EvalData, tracker: PayloadTrackerEvent) -> Option<FlushReport> {
        let mut state = self.state.lock().await;
        state.eval.push(eval);
        state.tracker.push(tracker);
        state.deadline = Some(Instant::now() + self.idle_flush);
        self.rearm.notify_one();

        if state.eval.len() >= self.capacity {
            return Some(self.flush_locked(&mut state, FlushReason::Full).await);
        }
        None
    }

    /// Flush whatever is buffered.
    pub async fn flush(&self) -> FlushReport {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state, FlushReason::Manual).await
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.eval.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn flush_locked(&self, state: &mut BufferState, reason: FlushReason) -> FlushReport {
        state.deadline = None;
        let mut report = FlushReport {
            items: state.eval.len(),
            ..FlushReport::default()
        };
        if report.items == 0 {
            return report;
        }

        log::info!(
            "BUFFER_FLUSH reason={} items={} capacity={}",
            reason.as_str(),
            report.items,
            self.capacity
        );

        match write_eval_data(self.eval_writer.as_ref(), &state.eval, self.batch_size).await {
            Ok(sent) => report.eval_messages = sent,
            Err(e) => {
                log::error!(
                    "BUFFER_FLUSH_FAILED topic={} items={} reason={:?} error={}",
                    self.eval_writer.topic(),
                    report.items,
                    ERROR_KAFKA_SEND,
                    e
                );
                self.counters.record_send_failure(self.eval_writer.topic());
                report.eval_failed = true;
            }
        }

        match write_tracker_events(self.tracker_writer.as_ref(), &state.tracker).await {
            Ok(sent) => report.tracker_messages = sent,
            Err(e) => {
                log::warn!(
                    "BUFFER_FLUSH_FAILED topic={} items={} reason={:?} error={}",
                    self.tracker_writer.topic(),
                    state.tracker.len(),
                    WARN_PAYLOAD_TRACKER,
                    e
                );
                self.counters.record_send_failure(self.tracker_writer.topic());
                report.tracker_failed = true;
            }
        }

        state.eval.clear();
        state.tracker.clear();
        report
    }

    /// Start the idle-flush timer. The task runs until aborted.
    pub fn spawn_idle_flush(self: &Arc<Self>) -> JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let deadline = buffer.state.lock().await.deadline;
                match deadline {
                    None => buffer.rearm.notified().await,
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                let mut state = buffer.state.lock().await;
                                // `add` may have pushed the deadline while we slept.
                                if state.deadline.map_or(false, |d| d <= Instant::now()) {
                                    buffer.flush_locked(&mut state, FlushReason::Timeout).await;
                                }
                            }
                            _ = buffer.rearm.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
