//! In-process store with the same unique constraints as the relational schema.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{ListenerError, Result};
use crate::mqueue::InventoryAid;
use crate::storage::models::{Account, DeletedSystem, SystemRecord, SystemUpsert};
use crate::storage::store::SystemStore;

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    next_account_id: i32,
    systems: HashMap<(i32, String), SystemRecord>,
    next_system_id: i64,
    deleted: HashMap<String, DeletedSystem>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation, so concurrent callers interleave.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make subsequent operations fail with a store error until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.state.lock().accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        accounts
    }

    pub fn system(&self, account_id: i32, inventory_id: &str) -> Option<SystemRecord> {
        self.state
            .lock()
            .systems
            .get(&(account_id, inventory_id.to_string()))
            .cloned()
    }

    pub fn systems(&self) -> Vec<SystemRecord> {
        let mut systems: Vec<SystemRecord> = self.state.lock().systems.values().cloned().collect();
        systems.sort_by_key(|s| s.id);
        systems
    }

    pub fn deleted(&self, inventory_id: &str) -> Option<DeletedSystem> {
        self.state.lock().deleted.get(inventory_id).cloned()
    }

    /// Assign a system to a baseline. Returns false when the system is unknown.
    pub fn set_baseline(&self, account_id: i32, inventory_id: &str, baseline_id: Option<i64>) -> bool {
        match self
            .state
            .lock()
            .systems
            .get_mut(&(account_id, inventory_id.to_string()))
        {
            Some(system) => {
                system.baseline_id = baseline_id;
                true
            }
            None => false,
        }
    }

    async fn enter(&self, op: &str) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ListenerError::store(format!("{}: connection refused", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl SystemStore for MemoryStore {
    async fn upsert_account(&self, org_id: &str) -> Result<i32> {
        self.enter("upsert_account").await?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(existing) = state.accounts.get(org_id) {
            return Ok(existing.id);
        }
        state.next_account_id += 1;
        let account = Account {
            id: state.next_account_id,
            org_id: org_id.to_string(),
        };
        let id = account.id;
        state.accounts.insert(org_id.to_string(), account);
        Ok(id)
    }

    async fn upsert_system(&self, upsert: &SystemUpsert) -> Result<SystemRecord> {
        self.enter("upsert_system").await?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let key = (upsert.account_id, upsert.inventory_id.clone());

        let (id, baseline_id) = match state.systems.get(&key) {
            Some(existing) => (existing.id, existing.baseline_id),
            None => {
                state.next_system_id += 1;
                (state.next_system_id, None)
            }
        };

        let record = SystemRecord {
            id,
            account_id: upsert.account_id,
            inventory_id: upsert.inventory_id.clone(),
            display_name: upsert.display_name.clone(),
            request_checksum: upsert.request_checksum.clone(),
            stale: false,
            stale_timestamp: upsert.stale_timestamp,
            stale_warning_timestamp: upsert.stale_warning_timestamp,
            culled_timestamp: upsert.culled_timestamp,
            last_upload: Some(upsert.last_upload),
            baseline_id,
        };
        state.systems.insert(key, record.clone());
        Ok(record)
    }

    async fn get_deleted(&self, inventory_id: &str) -> Result<Option<DeletedSystem>> {
        self.enter("get_deleted").await?;
        Ok(self.state.lock().deleted.get(inventory_id).cloned())
    }

    async fn upsert_deleted(&self, inventory_id: &str, when: DateTime<Utc>) -> Result<()> {
        self.enter("upsert_deleted").await?;
        self.state.lock().deleted.insert(
            inventory_id.to_string(),
            DeletedSystem {
                inventory_id: inventory_id.to_string(),
                when_deleted: when,
            },
        );
        Ok(())
    }

    async fn mark_stale(&self, inventory_id: &str, when: DateTime<Utc>) -> Result<u64> {
        self.enter("mark_stale").await?;
        let mut state = self.state.lock();
        let mut modified = 0;
        for system in state
            .systems
            .values_mut()
            .filter(|s| s.inventory_id == inventory_id)
        {
            system.stale = true;
            system.stale_timestamp = Some(when);
            system.culled_timestamp = Some(when);
            modified += 1;
        }
        Ok(modified)
    }

    async fn prune_deleted(&self, before: DateTime<Utc>) -> Result<u64> {
        self.enter("prune_deleted").await?;
        let mut state = self.state.lock();
        let len = state.deleted.len();
        state.deleted.retain(|_, marker| marker.when_deleted >= before);
        Ok((len - state.deleted.len()) as u64)
    }

    async fn systems_for_baseline(
        &self,
        account_id: i32,
        baseline_id: Option<i64>,
    ) -> Result<Vec<InventoryAid>> {
        self.enter("systems_for_baseline").await?;
        let state = self.state.lock();
        let mut systems: Vec<&SystemRecord> = state
            .systems
            .values()
            .filter(|s| s.account_id == account_id && !s.stale && s.baseline_id == baseline_id)
            .collect();
        systems.sort_by_key(|s| s.id);
        Ok(systems
            .into_iter()
            .map(|s| InventoryAid {
                inventory_id: s.inventory_id.clone(),
                account_id: s.account_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(account_id: i32, inventory_id: &str, name: &str) -> SystemUpsert {
        SystemUpsert {
            account_id,
            inventory_id: inventory_id.to_string(),
            display_name: name.to_string(),
            request_checksum: None,
            stale_timestamp: None,
            stale_warning_timestamp: None,
            culled_timestamp: None,
            last_upload: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_account_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.upsert_account("org-a").await.unwrap();
        let b = store.upsert_account("org-b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.upsert_account("org-a").await.unwrap(), a);
        assert_eq!(store.accounts().len(), 2);
    }

    #[tokio::test]
    async fn test_system_upsert_overwrites() {
        let store = MemoryStore::new();
        let first = store.upsert_system(&upsert(1, "inv", "one")).await.unwrap();
        store.set_baseline(1, "inv", Some(5));
        let second = store.upsert_system(&upsert(1, "inv", "two")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "two");
        assert_eq!(second.baseline_id, Some(5));
        assert_eq!(store.systems().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_stale_and_reupload() {
        let store = MemoryStore::new();
        store.upsert_system(&upsert(1, "inv", "one")).await.unwrap();
        let now = Utc::now();

        assert_eq!(store.mark_stale("inv", now).await.unwrap(), 1);
        assert_eq!(store.mark_stale("missing", now).await.unwrap(), 0);

        let system = store.system(1, "inv").unwrap();
        assert!(system.stale);
        assert_eq!(system.culled_timestamp, Some(now));

        let system = store.upsert_system(&upsert(1, "inv", "one")).await.unwrap();
        assert!(!system.stale);
    }

    #[tokio::test]
    async fn test_prune_deleted() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_deleted("old", now - chrono::Duration::hours(2))
            .await
            .unwrap();
        store.upsert_deleted("new", now).await.unwrap();

        let pruned = store
            .prune_deleted(now - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(store.deleted("old").is_none());
        assert!(store.get_deleted("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_systems_for_baseline() {
        let store = MemoryStore::new();
        for inv in ["a", "b", "c"] {
            store.upsert_system(&upsert(1, inv, inv)).await.unwrap();
        }
        store.upsert_system(&upsert(2, "d", "d")).await.unwrap();
        store.set_baseline(1, "a", Some(9));
        store.mark_stale("c", Utc::now()).await.unwrap();

        let with_baseline = store.systems_for_baseline(1, Some(9)).await.unwrap();
        assert_eq!(with_baseline.len(), 1);
        assert_eq!(with_baseline[0].inventory_id, "a");

        let unassigned = store.systems_for_baseline(1, None).await.unwrap();
        let ids: Vec<&str> = unassigned.iter().map(|a| a.inventory_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.upsert_account("org").await,
            Err(ListenerError::Store(_))
        ));
        store.set_failing(false);
        assert!(store.upsert_account("org").await.is_ok());
    }
}
