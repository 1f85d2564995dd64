//! Upload and delete handlers.
//!
//! Each handler finishes an event in one pass. Problems with the message
//! itself are logged, counted and reported as handled; store failures are
//! returned so the consumer can retry them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::accounts::AccountResolver;
use crate::error::{ListenerError, Result};
use crate::event::{EventKind, Host, HostEvent, Identity};
use crate::listener::buffer::EventBuffer;
use crate::listener::metrics::*;
use crate::logging::structured::LogContext;
use crate::mqueue::{
    write_tracker_events, EvalData, PayloadTrackerEvent, Writer, STATUS_ERROR, STATUS_PROCESSING,
    STATUS_RECEIVED, STATUS_SUCCESS,
};
use crate::storage::{SystemStore, SystemUpsert};

pub const WARN_NO_ROWS_MODIFIED: &str = "no rows modified on delete event";

/// Result of a successfully handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Upload stored and queued for evaluation.
    Evaluated { account_id: i32 },
    /// Upload ignored because the host was deleted recently.
    RecentlyDeleted,
    /// Upload rejected before touching the store.
    Rejected(&'static str),
    /// Delete applied to this many rows.
    Deleted(u64),
    /// No handler for the event kind.
    Skipped,
}

pub struct Handlers {
    store: Arc<dyn SystemStore>,
    accounts: Arc<AccountResolver>,
    buffer: Arc<EventBuffer>,
    tracker: Arc<dyn Writer>,
    counters: Arc<ListenerCounters>,
    deletion_threshold: chrono::Duration,
}

impl Handlers {
    pub fn new(
        store: Arc<dyn SystemStore>,
        accounts: Arc<AccountResolver>,
        buffer: Arc<EventBuffer>,
        tracker: Arc<dyn Writer>,
        counters: Arc<ListenerCounters>,
        deletion_threshold: std::time::Duration,
    ) -> Result<Self> {
        let deletion_threshold = chrono::Duration::from_std(deletion_threshold)
            .map_err(|e| ListenerError::Config(format!("deletion threshold: {}", e)))?;
        Ok(Self {
            store,
            accounts,
            buffer,
            tracker,
            counters,
            deletion_threshold,
        })
    }

    /// Run the handler for `kind` on a message already parsed as JSON.
    pub async fn dispatch(&self, kind: &EventKind, message: &Value, ctx: &LogContext) -> Result<Outcome> {
        match kind {
            EventKind::Missing | EventKind::Unknown(_) => {
                self.counters.record(EVENT_OTHER, ERROR_OTHER_TYPE);
                Ok(Outcome::Skipped)
            }
            EventKind::Delete => {
                let event: HostEvent = serde_json::from_value(message.clone())?;
                self.handle_delete(&event, ctx).await
            }
            EventKind::Created | EventKind::Updated => {
                let event: HostEvent = serde_json::from_value(message.clone())?;
                self.handle_upload(&event, ctx).await
            }
        }
    }

    pub async fn handle_delete(&self, event: &HostEvent, ctx: &LogContext) -> Result<Outcome> {
        let inventory_id = event
            .inventory_id()
            .ok_or_else(|| ListenerError::InvalidHost("delete event without id".to_string()))?;
        let now = Utc::now();

        self.store.upsert_deleted(inventory_id, now).await?;
        let rows = self.store.mark_stale(inventory_id, now).await?;

        if rows == 0 {
            crate::log_warn!(ctx, "DELETE_NO_ROWS", inventory_id = inventory_id, reason = WARN_NO_ROWS_MODIFIED);
            self.counters.record(EVENT_DELETE, WARN_NO_ROWS);
        } else {
            crate::log_info!(ctx, "DELETE_SUCCESS", inventory_id = inventory_id, count = rows);
            self.counters.record(EVENT_DELETE, SUCCESS_DELETED);
        }

        match self.store.prune_deleted(now - self.deletion_threshold).await {
            Ok(0) => {}
            Ok(pruned) => log::debug!("{} DELETED_MARKERS_PRUNED count={}", ctx, pruned),
            Err(e) => log::warn!("{} DELETED_MARKERS_PRUNE_FAILED error={}", ctx, e),
        }

        Ok(Outcome::Deleted(rows))
    }

    pub async fn handle_upload(&self, event: &HostEvent, ctx: &LogContext) -> Result<Outcome> {
        let host = event
            .host
            .as_ref()
            .ok_or_else(|| ListenerError::InvalidHost("upload event without host".to_string()))?;
        let inventory_id = event
            .inventory_id()
            .ok_or_else(|| ListenerError::InvalidHost("host without id".to_string()))?;
        let request_id = event.request_id();

        let org_id = match upload_org_id(event, host) {
            Ok(org_id) => org_id,
            Err(e) => {
                log::warn!("{} UPLOAD_REJECTED reason={} error={}", ctx, ERROR_IDENTITY, e);
                let tracker = PayloadTrackerEvent::new(inventory_id, host.org_id.as_deref(), request_id);
                return Ok(self.reject(tracker, ERROR_IDENTITY, ctx).await);
            }
        };
        let tracker = PayloadTrackerEvent::new(inventory_id, Some(&org_id), request_id);

        if let Err(e) = host.system_profile.validate_packages() {
            log::warn!("{} UPLOAD_REJECTED reason={} error={}", ctx, WARN_BAD_PACKAGES, e);
            return Ok(self.reject(tracker, WARN_BAD_PACKAGES, ctx).await);
        }

        if let Some(marker) = self.store.get_deleted(inventory_id).await? {
            if marker.is_recent(Utc::now(), self.deletion_threshold) {
                log::info!(
                    "{} UPLOAD_IGNORED reason=recently-deleted when_deleted={}",
                    ctx,
                    marker.when_deleted
                );
                self.counters.record(EVENT_UPLOAD, SUCCESS_DELETED);
                self.send_status(tracker.with_status(STATUS_SUCCESS, SUCCESS_DELETED), ctx)
                    .await;
                return Ok(Outcome::RecentlyDeleted);
            }
        }

        let account_id = self.accounts.resolve(&org_id, ctx).await?;
        let upsert = SystemUpsert {
            account_id,
            inventory_id: inventory_id.to_string(),
            display_name: host.display_name_or_id(inventory_id),
            request_checksum: Some(host.system_profile.checksum()?),
            stale_timestamp: host.stale_timestamp,
            stale_warning_timestamp: host.stale_warning_timestamp,
            culled_timestamp: host.culled_timestamp,
            last_upload: Utc::now(),
        };
        let system = self.store.upsert_system(&upsert).await?;

        self.buffer
            .add(
                EvalData {
                    inventory_id: system.inventory_id.clone(),
                    account_id,
                    org_id,
                    request_id: request_id.unwrap_or_default().to_string(),
                },
                tracker.with_status(STATUS_RECEIVED, STATUS_PROCESSING),
            )
            .await;

        crate::log_info!(
            ctx,
            "UPLOAD_SUCCESS",
            inventory_id = inventory_id,
            account_id = account_id,
            system_id = system.id,
            reporter = host.reporter.as_deref().unwrap_or("unknown")
        );
        self.counters.record(EVENT_UPLOAD, SUCCESS_EVAL);
        Ok(Outcome::Evaluated { account_id })
    }

    async fn reject(&self, tracker: PayloadTrackerEvent, outcome: &'static str, ctx: &LogContext) -> Outcome {
        self.counters.record(EVENT_UPLOAD, outcome);
        self.send_status(tracker.with_status(STATUS_ERROR, outcome), ctx)
            .await;
        Outcome::Rejected(outcome)
    }

    /// Send one audit event right away. Failures are only logged.
    async fn send_status(&self, event: PayloadTrackerEvent, ctx: &LogContext) {
        if let Err(e) = write_tracker_events(self.tracker.as_ref(), std::slice::from_ref(&event)).await {
            crate::log_warn!(ctx, "TRACKER_SEND_FAILED", status = event.status, error = e.to_string());
            self.counters.record_send_failure(self.tracker.topic());
        }
    }
}

/// Org id from the host, falling back to the identity header.
fn upload_org_id(event: &HostEvent, host: &Host) -> Result<String> {
    if let Some(org_id) = host.org_id.as_deref().filter(|o| !o.is_empty()) {
        return Ok(org_id.to_string());
    }
    match event.b64_identity.as_deref() {
        Some(header) => Identity::decode(header)?
            .org_id()
            .map(str::to_string)
            .ok_or(ListenerError::NoAccount),
        None => Err(ListenerError::NoAccount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqueue::MemoryWriter;
    use crate::storage::MemoryStore;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;
    use std::time::Duration;

    const INV: &str = "00000000-0000-0000-0000-000000000001";

    struct Fixture {
        handlers: Handlers,
        store: Arc<MemoryStore>,
        buffer: Arc<EventBuffer>,
        eval: MemoryWriter,
        tracker: MemoryWriter,
        counters: Arc<ListenerCounters>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let eval = MemoryWriter::new("eval");
        let tracker = MemoryWriter::new("tracker");
        let counters = Arc::new(ListenerCounters::new());
        let buffer = Arc::new(EventBuffer::new(
            100,
            4000,
            Duration::from_secs(10),
            Arc::new(eval.clone()),
            Arc::new(tracker.clone()),
            counters.clone(),
        ));
        let handlers = Handlers::new(
            store.clone(),
            Arc::new(AccountResolver::new(store.clone())),
            buffer.clone(),
            Arc::new(tracker.clone()),
            counters.clone(),
            Duration::from_secs(3600),
        )
        .unwrap();
        Fixture {
            handlers,
            store,
            buffer,
            eval,
            tracker,
            counters,
        }
    }

    fn upload(display_name: &str) -> Value {
        json!({
            "type": "created",
            "host": {
                "id": INV,
                "display_name": display_name,
                "org_id": "org-1",
                "system_profile": {"installed_packages": ["kernel-5.14.0-362.el9.x86_64"]}
            },
            "metadata": {"request_id": "req-1"}
        })
    }

    async fn dispatch(f: &Fixture, message: Value) -> Result<Outcome> {
        let ctx = LogContext::new("test");
        let kind = EventKind::from_message(&message);
        f.handlers.dispatch(&kind, &message, &ctx).await
    }

    #[tokio::test]
    async fn test_unknown_and_missing_kind() {
        let f = fixture();
        assert_eq!(dispatch(&f, json!({"type": "refresh"})).await.unwrap(), Outcome::Skipped);
        assert_eq!(dispatch(&f, json!({"id": INV})).await.unwrap(), Outcome::Skipped);
        assert_eq!(f.counters.get(EVENT_OTHER, ERROR_OTHER_TYPE), 2);
        assert!(f.store.systems().is_empty());
        assert!(f.store.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_upload_creates_system() {
        let f = fixture();
        let outcome = dispatch(&f, upload("web-01")).await.unwrap();
        let account_id = match outcome {
            Outcome::Evaluated { account_id } => account_id,
            other => panic!("unexpected outcome {:?}", other),
        };

        let system = f.store.system(account_id, INV).unwrap();
        assert_eq!(system.display_name, "web-01");
        assert!(!system.stale);
        assert_eq!(system.request_checksum.as_ref().map(|c| c.len()), Some(64));
        assert_eq!(f.buffer.len().await, 1);
        assert_eq!(f.counters.get(EVENT_UPLOAD, SUCCESS_EVAL), 1);

        let report = f.buffer.flush().await;
        assert_eq!(report.eval_messages, 1);
        assert_eq!(f.eval.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_replay_is_idempotent() {
        let f = fixture();
        for name in ["one", "two", "three"] {
            dispatch(&f, upload(name)).await.unwrap();
        }
        let systems = f.store.systems();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].display_name, "three");
        assert_eq!(f.store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_blank_display_name() {
        let f = fixture();
        dispatch(&f, upload("  ")).await.unwrap();
        assert_eq!(f.store.systems()[0].display_name, INV);
    }

    #[tokio::test]
    async fn test_upload_org_from_identity() {
        let f = fixture();
        let identity = general_purpose::STANDARD
            .encode(r#"{"identity":{"org_id":"org-id","type":"System"}}"#);
        let message = json!({
            "type": "updated",
            "b64_identity": identity,
            "host": {"id": INV, "system_profile": {}},
        });
        dispatch(&f, message).await.unwrap();
        assert_eq!(f.store.accounts()[0].org_id, "org-id");
    }

    #[tokio::test]
    async fn test_upload_without_org_rejected() {
        let f = fixture();
        let message = json!({
            "type": "created",
            "host": {"id": INV},
            "metadata": {"request_id": "req-1"}
        });
        let outcome = dispatch(&f, message).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(ERROR_IDENTITY));
        assert_eq!(f.counters.get(EVENT_UPLOAD, ERROR_IDENTITY), 1);
        assert!(f.store.systems().is_empty());
        // No org id, so the audit event is not trackable.
        assert_eq!(f.tracker.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_bad_packages_rejected() {
        let f = fixture();
        let message = json!({
            "type": "created",
            "host": {
                "id": INV,
                "org_id": "org-1",
                "system_profile": {"installed_packages": ["garbage"]}
            },
            "metadata": {"request_id": "req-1"}
        });
        let outcome = dispatch(&f, message).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(WARN_BAD_PACKAGES));
        assert!(f.store.systems().is_empty());

        let sent: Vec<PayloadTrackerEvent> = f.tracker.payloads().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, STATUS_ERROR);
        assert_eq!(sent[0].status_msg, WARN_BAD_PACKAGES);
    }

    #[tokio::test]
    async fn test_upload_without_host_is_invalid() {
        let f = fixture();
        let err = dispatch(&f, json!({"type": "created", "id": INV})).await.unwrap_err();
        assert!(matches!(err, ListenerError::InvalidHost(_)));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_delete_marks_stale() {
        let f = fixture();
        dispatch(&f, upload("web-01")).await.unwrap();
        let outcome = dispatch(&f, json!({"type": "delete", "id": INV})).await.unwrap();
        assert_eq!(outcome, Outcome::Deleted(1));

        let system = &f.store.systems()[0];
        assert!(system.stale);
        assert!(system.stale_timestamp.is_some());
        assert!(system.culled_timestamp.is_some());
        assert!(f.store.deleted(INV).is_some());
        assert_eq!(f.counters.get(EVENT_DELETE, SUCCESS_DELETED), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_system() {
        let f = fixture();
        let outcome = dispatch(&f, json!({"type": "delete", "id": "missing"})).await.unwrap();
        assert_eq!(outcome, Outcome::Deleted(0));
        assert_eq!(f.counters.get(EVENT_DELETE, WARN_NO_ROWS), 1);
    }

    #[tokio::test]
    async fn test_delete_prunes_old_markers() {
        let f = fixture();
        f.store
            .upsert_deleted("old", Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();
        dispatch(&f, json!({"type": "delete", "id": INV})).await.unwrap();
        assert!(f.store.deleted("old").is_none());
        assert!(f.store.deleted(INV).is_some());
    }

    #[tokio::test]
    async fn test_upload_after_recent_delete_ignored() {
        let f = fixture();
        dispatch(&f, upload("web-01")).await.unwrap();
        dispatch(&f, json!({"type": "delete", "id": INV})).await.unwrap();

        let outcome = dispatch(&f, upload("web-02")).await.unwrap();
        assert_eq!(outcome, Outcome::RecentlyDeleted);
        let system = &f.store.systems()[0];
        assert!(system.stale);
        assert_eq!(system.display_name, "web-01");
        assert_eq!(f.counters.get(EVENT_UPLOAD, SUCCESS_DELETED), 1);
    }

    #[tokio::test]
    async fn test_upload_after_threshold_recreates() {
        let f = fixture();
        dispatch(&f, upload("web-01")).await.unwrap();
        f.store.mark_stale(INV, Utc::now()).await.unwrap();
        f.store
            .upsert_deleted(INV, Utc::now() - chrono::Duration::hours(2))
            .await
            .unwrap();

        let outcome = dispatch(&f, upload("web-02")).await.unwrap();
        assert!(matches!(outcome, Outcome::Evaluated { .. }));
        let system = &f.store.systems()[0];
        assert!(!system.stale);
        assert_eq!(system.display_name, "web-02");
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let f = fixture();
        f.store.set_failing(true);
        let err = dispatch(&f, upload("web-01")).await.unwrap_err();
        assert!(matches!(err, ListenerError::Store(_)));
        assert!(!err.is_permanent());
    }
}
