//! Store seam used by the handlers and the recalculation queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::mqueue::InventoryAid;
use crate::storage::models::{DeletedSystem, SystemRecord, SystemUpsert};

/// Relational store for accounts, systems and deleted markers.
///
/// Every write is an idempotent upsert so replaying an event leaves the
/// same state behind.
#[async_trait]
pub trait SystemStore: Send + Sync {
    /// Insert the organization if missing and return its id. Concurrent
    /// callers for one org all receive the same id.
    async fn upsert_account(&self, org_id: &str) -> Result<i32>;

    /// Insert or overwrite the system keyed by (account, inventory id).
    async fn upsert_system(&self, system: &SystemUpsert) -> Result<SystemRecord>;

    async fn get_deleted(&self, inventory_id: &str) -> Result<Option<DeletedSystem>>;

    async fn upsert_deleted(&self, inventory_id: &str, when: DateTime<Utc>) -> Result<()>;

    /// Mark every system with `inventory_id` stale. Returns rows modified.
    async fn mark_stale(&self, inventory_id: &str, when: DateTime<Utc>) -> Result<u64>;

    /// Remove deleted markers older than `before`. Returns rows removed.
    async fn prune_deleted(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Non-stale systems of `account_id` assigned to `baseline_id`, or to
    /// no baseline when `None`.
    async fn systems_for_baseline(
        &self,
        account_id: i32,
        baseline_id: Option<i64>,
    ) -> Result<Vec<InventoryAid>>;
}
