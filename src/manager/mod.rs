//! Manager: owns the single `lock/manager-1` leader lock and runs the
//! page-range assignment tick loop (§4.3).

pub mod membership;
pub mod partition;
pub mod tick;

pub use tick::ManagerTick;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::coordinator::{CoordinatorBackend, LockGuard};
use crate::events::{CrawlEvent, CrawlEventBus};

/// Acquire the manager lock and run the tick loop until the process is
/// asked to shut down. A failure to acquire the lock is fatal (§7).
pub async fn run(
    backend: Arc<dyn CoordinatorBackend>,
    config: Arc<AppConfig>,
    events: Arc<CrawlEventBus>,
) -> anyhow::Result<()> {
    let lock = Arc::new(LockGuard::new(backend.clone(), "manager", "1"));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE)
        .await
        .map_err(|e| anyhow::anyhow!("failed to acquire manager lock: {e}"))?;
    log::info!("manager lock acquired");
    let _ = events.publish(CrawlEvent::lock_acquired("manager", "1")).await;

    let tick = ManagerTick::new(backend, config.clone(), lock.clone(), events.clone());
    let mut interval = tokio::time::interval(config.manager_tick_interval);
    let mut was_held = true;
    loop {
        interval.tick().await;
        tick.run().await;

        let holder_now = lock.is_held();
        if was_held && !holder_now {
            let _ = events.publish(CrawlEvent::lock_lost("manager", "1")).await;
        }
        was_held = holder_now;
    }
}
