//! Heartbeat and graceful-shutdown helpers shared by the General and
//! Product worker binaries (§5 "Suspension points" / "Cancellation and
//! timeouts").
//!
//! Heartbeats are fire-and-forget per §5: a failed write is logged and
//! retried next period, never fatal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::coordinator::CoordinatorBackend;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Runs until `running` is cleared, writing `now_millis()` to `heartbeat_key`
/// every `interval`. Spawn with `tokio::spawn` alongside the lock-refresh
/// loop; both are independent of the component's main poll loop.
pub async fn heartbeat_loop(
    backend: Arc<dyn CoordinatorBackend>,
    heartbeat_key: String,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    while running.load(Ordering::Acquire) {
        ticker.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }
        if let Err(e) = backend.set(&heartbeat_key, &now_millis().to_string()).await {
            log::warn!("heartbeat write for '{heartbeat_key}' failed: {e}");
        }
    }
}

/// Runs until `running` is cleared, refreshing `lock` every `interval`
/// (§4.2 Refresh). A failed refresh is non-fatal; the lock stops acting as
/// holder but the loop keeps trying in case ownership is regained.
pub async fn lock_refresh_loop(
    lock: Arc<crate::coordinator::LockGuard>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    while running.load(Ordering::Acquire) {
        ticker.tick().await;
        if !running.load(Ordering::Acquire) {
            break;
        }
        let _ = lock
            .refresh(crate::config::AppConfig::LOCK_TTL, crate::config::AppConfig::LOCK_OWNERSHIP_DRIFT)
            .await;
    }
}

/// Delete this worker's coordinator-owned keys on graceful shutdown
/// (§5 "Graceful shutdown"). `extra_keys` covers role-specific state such
/// as a Product worker's `pages` key.
pub async fn cleanup_keys(
    backend: &Arc<dyn CoordinatorBackend>,
    lock_key: &str,
    heartbeat_key: &str,
    extra_keys: &[&str],
) {
    let _ = backend.delete(lock_key).await;
    let _ = backend.delete(heartbeat_key).await;
    for key in extra_keys {
        let _ = backend.delete(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryCoordinator;
    use std::time::Duration;

    #[tokio::test]
    async fn heartbeat_loop_writes_until_stopped() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(heartbeat_loop(
            backend.clone(),
            "general/1/heartbeat".to_string(),
            Duration::from_millis(10),
            running.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::Release);
        let _ = handle.await;
        assert!(backend.get("general/1/heartbeat").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cleanup_deletes_lock_heartbeat_and_extra_keys() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        backend.set("lock/product-1", "123").await.unwrap();
        backend.set("product/1/heartbeat", "123").await.unwrap();
        backend.set("product/1/pages", "[1,2]").await.unwrap();

        cleanup_keys(&backend, "lock/product-1", "product/1/heartbeat", &["product/1/pages"]).await;

        assert!(backend.get("lock/product-1").await.unwrap().is_none());
        assert!(backend.get("product/1/heartbeat").await.unwrap().is_none());
        assert!(backend.get("product/1/pages").await.unwrap().is_none());
    }
}
