//! Account resolution.
//!
//! Maps organization ids to internal account ids. The cache is owned by the
//! resolver and shared by handing out clones of an `Arc<AccountResolver>`;
//! entries are only ever added, and the first id cached for an org wins.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ListenerError, Result};
use crate::logging::structured::LogContext;
use crate::storage::SystemStore;

pub struct AccountResolver {
    store: Arc<dyn SystemStore>,
    cache: RwLock<HashMap<String, i32>>,
}

impl AccountResolver {
    pub fn new(store: Arc<dyn SystemStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `org_id` to its account id, creating the account on first use.
    ///
    /// Concurrent first lookups may all reach the store; its upsert returns
    /// the same id to each of them.
    pub async fn resolve(&self, org_id: &str, ctx: &LogContext) -> Result<i32> {
        if org_id.is_empty() {
            return Err(ListenerError::NoAccount);
        }

        if let Some(id) = self.cached(org_id) {
            return Ok(id);
        }

        let id = self.store.upsert_account(org_id).await.map_err(|e| {
            log::error!("{} ACCOUNT_RESOLVE_FAILED org_id={} error={}", ctx, org_id, e);
            e
        })?;

        let cached = *self.cache.write().entry(org_id.to_string()).or_insert(id);
        if cached != id {
            log::warn!(
                "{} ACCOUNT_ID_MISMATCH org_id={} cached={} store={}",
                ctx,
                org_id,
                cached,
                id
            );
        } else {
            log::debug!("{} ACCOUNT_CACHED org_id={} account_id={}", ctx, org_id, id);
        }
        Ok(cached)
    }

    /// Cached id for `org_id`, without touching the store.
    pub fn cached(&self, org_id: &str) -> Option<i32> {
        self.cache.read().get(org_id).copied()
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
