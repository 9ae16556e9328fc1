//! One manager tick (§4.3): refresh the lock, read total page count,
//! enumerate live General workers, and (re)assign page ranges in either
//! even-distribution or round-robin rotation mode.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::coordinator::{CoordinatorBackend, LockGuard, keys, value};
use crate::events::{CrawlEvent, CrawlEventBus};
use crate::types::PageRange;

use super::membership;
use super::partition;

pub struct ManagerTick {
    backend: Arc<dyn CoordinatorBackend>,
    config: Arc<AppConfig>,
    lock: Arc<LockGuard>,
    events: Arc<CrawlEventBus>,
}

impl ManagerTick {
    #[must_use]
    pub fn new(
        backend: Arc<dyn CoordinatorBackend>,
        config: Arc<AppConfig>,
        lock: Arc<LockGuard>,
        events: Arc<CrawlEventBus>,
    ) -> Self {
        Self {
            backend,
            config,
            lock,
            events,
        }
    }

    /// Run a single tick. Coordinator transport errors are logged and the
    /// tick is effectively retried next period (§4.3 Errors).
    pub async fn run(&self) {
        let still_holder = self
            .lock
            .refresh(AppConfig::LOCK_TTL, AppConfig::LOCK_OWNERSHIP_DRIFT)
            .await;
        if !still_holder {
            log::warn!("manager lock no longer held; skipping tick");
            return;
        }

        let total_pages = match value::parse_u32(self.backend.get(keys::total_pages()).await.unwrap_or(None)) {
            value::CoordinatorValue::Present(n) => n,
            value::CoordinatorValue::Absent => {
                log::debug!("totalPages not yet published; nothing to assign");
                return;
            }
            value::CoordinatorValue::Invalid(raw) => {
                log::warn!("totalPages invalid ('{raw}'); treating as absent this tick");
                return;
            }
        };

        let live_ids = membership::live_general_ids(
            &self.backend,
            self.config.n_max_worker_scan,
            AppConfig::T_LIVE,
        )
        .await;

        if live_ids.is_empty() {
            log::debug!("no live General workers; nothing to assign");
            return;
        }

        if self.config.rotation.enabled {
            self.rotation_tick(total_pages, &live_ids).await;
        } else {
            self.even_tick(total_pages, &live_ids).await;
        }
    }

    async fn worker_pages(&self, id: u32) -> Option<PageRange> {
        let raw = self.backend.get(&keys::general_pages(id)).await.unwrap_or(None);
        match value::parse_json::<PageRange>(raw) {
            value::CoordinatorValue::Present(range) => Some(range),
            _ => None,
        }
    }

    async fn worker_flag(&self, key: &str) -> bool {
        matches!(
            value::parse_flag(self.backend.get(key).await.unwrap_or(None)),
            value::CoordinatorValue::Present(true)
        )
    }

    async fn even_tick(&self, total_pages: u32, live_ids: &[u32]) {
        let mut reassign = false;
        for &id in live_ids {
            match self.worker_pages(id).await {
                None => {
                    reassign = true;
                    break;
                }
                Some(range) => {
                    let complete = self.worker_flag(&keys::general_complete(id)).await;
                    if complete && range.end < total_pages {
                        reassign = true;
                        break;
                    }
                }
            }
        }

        if !reassign {
            return;
        }

        let assignment = partition::even_assignment(total_pages, live_ids);
        let mut published = Vec::with_capacity(assignment.len());
        for (&id, &(start, end)) in &assignment {
            let processing = self.worker_flag(&keys::general_processing(id)).await;
            if processing {
                continue;
            }
            if let Ok(json) = serde_json::to_string(&PageRange::new(start, end)) {
                let _ = self.backend.set(&keys::general_pages(id), &json).await;
            }
            let _ = self.backend.delete(&keys::general_complete(id)).await;
            published.push((id.to_string(), start, end));
        }
        log::info!("even-mode reassignment across {} live workers", live_ids.len());
        let _ = self.events.publish(CrawlEvent::partition_assigned("even", published)).await;
    }

    async fn rotation_tick(&self, total_pages: u32, live_ids: &[u32]) {
        let index = value::parse_u32(self.backend.get(keys::rotation_index()).await.unwrap_or(None))
            .or_default(0);
        let last_assigned = value::parse_u32(
            self.backend
                .get(keys::rotation_last_assigned_page())
                .await
                .unwrap_or(None),
        )
        .or_default(0);

        if partition::rotation_cycle_complete(total_pages, last_assigned) {
            let _ = self.backend.set(keys::rotation_index(), "0").await;
            let _ = self.backend.set(keys::rotation_last_assigned_page(), "0").await;

            for &id in live_ids {
                let _ = self.backend.delete(&keys::general_pages(id)).await;
                let _ = self.backend.delete(&keys::general_complete(id)).await;
            }

            // Safe reset policy (§9): also clear dead-worker residue from the
            // prior cycle so it can't pollute the new one.
            let all_ids = membership::enumerate_ids(
                &self.backend,
                keys::workers_general(),
                self.config.n_max_worker_scan,
            )
            .await;
            for id in all_ids {
                if !live_ids.contains(&id) {
                    let _ = self.backend.delete(&keys::general_pages(id)).await;
                    let _ = self.backend.delete(&keys::general_complete(id)).await;
                    let _ = self.backend.delete(&keys::general_heartbeat(id)).await;
                }
            }
            log::info!("rotation cycle reset at totalPages={total_pages}");
            return;
        }

        let mut should_assign = false;
        for &id in live_ids {
            if self.worker_flag(&keys::general_complete(id)).await {
                should_assign = true;
                break;
            }
            if self.worker_pages(id).await.is_none() {
                should_assign = true;
                break;
            }
        }
        if !should_assign {
            return;
        }

        let batch_size = self.config.rotation.batch_size;
        let Some((worker_id, range, next_index, next_last)) =
            partition::rotation_assignment(total_pages, batch_size, live_ids, index, last_assigned)
        else {
            return;
        };

        if let Ok(json) = serde_json::to_string(&PageRange::from(range)) {
            let _ = self.backend.set(&keys::general_pages(worker_id), &json).await;
        }
        let _ = self.backend.delete(&keys::general_complete(worker_id)).await;
        let _ = self.backend.set(keys::rotation_index(), &next_index.to_string()).await;
        let _ = self
            .backend
            .set(keys::rotation_last_assigned_page(), &next_last.to_string())
            .await;

        log::info!(
            "rotation assigned pages {}..={} to general/{worker_id}",
            range.0,
            range.1
        );
        let _ = self
            .events
            .publish(CrawlEvent::partition_assigned(
                "rotation",
                vec![(worker_id.to_string(), range.0, range.1)],
            ))
            .await;
    }
}
