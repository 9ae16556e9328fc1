//! Worker membership enumeration (§4.3, §9 "avoid ad-hoc scans").
//!
//! Prefers the `workers/general` / `workers/product` set keys; falls back
//! to a bounded `1..=N_MAX` scan when the set key is absent, for
//! compatibility with a coordinator namespace that predates the set keys.

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{CoordinatorBackend, keys, value};

/// All worker ids that have ever registered, read from the set key if
/// present, else swept from `1..=n_max`.
pub async fn enumerate_ids(
    backend: &Arc<dyn CoordinatorBackend>,
    set_key: &str,
    n_max: u32,
) -> Vec<u32> {
    let raw = backend.get(set_key).await.unwrap_or(None);
    match value::parse_json::<Vec<u32>>(raw) {
        value::CoordinatorValue::Present(mut ids) => {
            ids.sort_unstable();
            ids.dedup();
            ids
        }
        value::CoordinatorValue::Absent | value::CoordinatorValue::Invalid(_) => {
            (1..=n_max).collect()
        }
    }
}

/// Whether the worker's heartbeat is within `t_live` of now.
pub async fn is_live(backend: &Arc<dyn CoordinatorBackend>, heartbeat_key: &str, t_live: Duration) -> bool {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let raw = backend.get(heartbeat_key).await.unwrap_or(None);
    match value::parse_u64(raw) {
        value::CoordinatorValue::Present(ts) => {
            let age = now.saturating_sub(ts);
            Duration::from_millis(age) <= t_live
        }
        _ => false,
    }
}

/// The sorted ids of currently-live General workers.
pub async fn live_general_ids(
    backend: &Arc<dyn CoordinatorBackend>,
    n_max: u32,
    t_live: Duration,
) -> Vec<u32> {
    let candidates = enumerate_ids(backend, keys::workers_general(), n_max).await;
    let mut live = Vec::new();
    for id in candidates {
        if is_live(backend, &keys::general_heartbeat(id), t_live).await {
            live.push(id);
        }
    }
    live.sort_unstable();
    live
}

/// The sorted ids of currently-live Product workers.
pub async fn live_product_ids(
    backend: &Arc<dyn CoordinatorBackend>,
    n_max: u32,
    t_live: Duration,
) -> Vec<u32> {
    let candidates = enumerate_ids(backend, keys::workers_product(), n_max).await;
    let mut live = Vec::new();
    for id in candidates {
        if is_live(backend, &keys::product_heartbeat(id), t_live).await {
            live.push(id);
        }
    }
    live.sort_unstable();
    live
}

/// Register this worker's id into the given membership set (idempotent).
pub async fn register_id(backend: &Arc<dyn CoordinatorBackend>, set_key: &str, id: u32) {
    let raw = backend.get(set_key).await.unwrap_or(None);
    let mut ids: Vec<u32> = match value::parse_json::<Vec<u32>>(raw) {
        value::CoordinatorValue::Present(ids) => ids,
        _ => Vec::new(),
    };
    if !ids.contains(&id) {
        ids.push(id);
        ids.sort_unstable();
        if let Ok(json) = serde_json::to_string(&ids) {
            let _ = backend.set(set_key, &json).await;
        }
    }
}
