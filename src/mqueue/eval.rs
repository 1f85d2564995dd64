//! Evaluator requests.
//!
//! Systems are grouped per account and each group is chunked into platform
//! events of at most `batch_size` systems.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mqueue::message::{send_json, Writer};

/// A processed upload waiting for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalData {
    pub inventory_id: String,
    pub account_id: i32,
    pub org_id: String,
    pub request_id: String,
}

/// A system addressed by account, used for explicit recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryAid {
    pub inventory_id: String,
    pub account_id: i32,
}

/// Message consumed by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub timestamp: DateTime<Utc>,
    pub account_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default)]
    pub system_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_ids: Vec<String>,
}

#[derive(Default)]
struct AccountGroup {
    org_id: Option<String>,
    system_ids: Vec<String>,
    request_ids: Vec<String>,
}

fn chunk_groups(
    groups: BTreeMap<i32, AccountGroup>,
    batch_size: usize,
    now: DateTime<Utc>,
) -> Vec<PlatformEvent> {
    let batch_size = batch_size.max(1);
    let mut events = Vec::new();
    for (account_id, group) in groups {
        for (i, systems) in group.system_ids.chunks(batch_size).enumerate() {
            let start = i * batch_size;
            let request_ids = if group.request_ids.is_empty() {
                Vec::new()
            } else {
                group.request_ids[start..start + systems.len()].to_vec()
            };
            events.push(PlatformEvent {
                timestamp: now,
                account_id,
                org_id: group.org_id.clone(),
                system_ids: systems.to_vec(),
                request_ids,
            });
        }
    }
    events
}

/// Group upload results into evaluator events.
///
/// Request ids stay aligned with system ids. The org id of the first item
/// seen for an account is used for the whole group.
pub fn eval_events(data: &[EvalData], batch_size: usize, now: DateTime<Utc>) -> Vec<PlatformEvent> {
    let mut groups: BTreeMap<i32, AccountGroup> = BTreeMap::new();
    for item in data {
        let group = groups.entry(item.account_id).or_default();
        if group.org_id.is_none() && !item.org_id.is_empty() {
            group.org_id = Some(item.org_id.clone());
        }
        group.system_ids.push(item.inventory_id.clone());
        group.request_ids.push(item.request_id.clone());
    }
    chunk_groups(groups, batch_size, now)
}

/// Group explicit recalculation targets into evaluator events.
pub fn recalc_events(
    aids: &[InventoryAid],
    batch_size: usize,
    now: DateTime<Utc>,
) -> Vec<PlatformEvent> {
    let mut groups: BTreeMap<i32, AccountGroup> = BTreeMap::new();
    for aid in aids {
        groups
            .entry(aid.account_id)
            .or_default()
            .system_ids
            .push(aid.inventory_id.clone());
    }
    chunk_groups(groups, batch_size, now)
}

/// Send buffered upload results to the evaluator topic in one write.
pub async fn write_eval_data(writer: &dyn Writer, data: &[EvalData], batch_size: usize) -> Result<usize> {
    let events = eval_events(data, batch_size, Utc::now());
    send_json(writer, &events).await
}

/// Send recalculation targets to the evaluator topic in one write.
pub async fn write_recalc(writer: &dyn Writer, aids: &[InventoryAid], batch_size: usize) -> Result<usize> {
    let events = recalc_events(aids, batch_size, Utc::now());
    send_json(writer, &events).await
}
