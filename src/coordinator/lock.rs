//! Single-leader lock protocol (§4.2), implemented once as [`LockGuard`]
//! and reused verbatim by the Manager and both worker binaries —
//! "polymorphic lock holders".
//!
//! The coordinator offers no compare-and-swap on value, so acquisition
//! leans on conditional-set-with-TTL, and refresh leans on atomic
//! get-and-set plus a clock-drift ownership heuristic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;

use super::backend::CoordinatorBackend;
use super::error::CoordinatorError;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("coordinator error while acquiring lock '{0}': {1}")]
    Transport(String, CoordinatorError),

    #[error("lock '{0}' is held by another instance")]
    HeldByAnother(String),
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A mutual-exclusion lock over a single coordinator key, identified by
/// `(role, id)`. One instance is created per process and held for its
/// lifetime.
pub struct LockGuard {
    backend: Arc<dyn CoordinatorBackend>,
    key: String,
    last_refresh: Mutex<Option<u64>>,
    held: AtomicBool,
}

impl LockGuard {
    #[must_use]
    pub fn new(backend: Arc<dyn CoordinatorBackend>, role: &str, id: &str) -> Self {
        Self {
            backend,
            key: super::keys::lock(role, id),
            last_refresh: Mutex::new(None),
            held: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Attempt to acquire the lock. A failure here is fatal to the process
    /// per §7 ("Lock-contention: fatal to this process with a clear message").
    pub async fn acquire(
        &self,
        ttl: Duration,
        stale_after: Duration,
    ) -> Result<(), LockError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let now = now_millis();
            let now_str = now.to_string();

            let acquired = self
                .backend
                .acquire(&self.key, &now_str, ttl)
                .await
                .map_err(|e| LockError::Transport(self.key.clone(), e))?;
            if acquired {
                *self.last_refresh.lock() = Some(now);
                self.held.store(true, Ordering::Release);
                return Ok(());
            }

            let existing = self
                .backend
                .get(&self.key)
                .await
                .map_err(|e| LockError::Transport(self.key.clone(), e))?;

            let Some(existing) = existing else {
                // Expired during the race; retry from the top.
                if attempts > 3 {
                    return Err(LockError::HeldByAnother(self.key.clone()));
                }
                continue;
            };

            let existing_ts = existing.trim().parse::<u64>().unwrap_or(0);
            let age = now.saturating_sub(existing_ts);
            if Duration::from_millis(age) < stale_after {
                return Err(LockError::HeldByAnother(self.key.clone()));
            }

            // Stale: attempt to steal via atomic swap.
            let old = self
                .backend
                .swap(&self.key, &now_str)
                .await
                .map_err(|e| LockError::Transport(self.key.clone(), e))?;

            match old {
                Some(ref old_val) if *old_val == existing => {
                    self.backend
                        .refresh(&self.key, &now_str, ttl)
                        .await
                        .map_err(|e| LockError::Transport(self.key.clone(), e))?;
                    *self.last_refresh.lock() = Some(now);
                    self.held.store(true, Ordering::Release);
                    return Ok(());
                }
                None => {
                    if attempts > 3 {
                        return Err(LockError::HeldByAnother(self.key.clone()));
                    }
                    continue;
                }
                Some(ref old_val) => {
                    let old_ts = old_val.trim().parse::<u64>().unwrap_or(0);
                    let old_age = now.saturating_sub(old_ts);
                    if Duration::from_millis(old_age) < stale_after {
                        return Err(LockError::HeldByAnother(self.key.clone()));
                    }
                    if attempts > 3 {
                        return Err(LockError::HeldByAnother(self.key.clone()));
                    }
                    continue;
                }
            }
        }
    }

    /// Refresh the lock. A failed refresh is non-fatal per §7: log and
    /// return false; the caller stops acting as holder until the next
    /// acquire.
    pub async fn refresh(&self, ttl: Duration, ownership_drift: Duration) -> bool {
        let last_refresh = *self.last_refresh.lock();
        let Some(last) = last_refresh else {
            return false;
        };

        let cur = match self.backend.get(&self.key).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("lock '{}' refresh: coordinator error: {e}", self.key);
                return true; // transport error: non-fatal, try again next tick
            }
        };

        let Some(cur) = cur else {
            log::warn!("lock '{}' lost: key absent on refresh", self.key);
            self.held.store(false, Ordering::Release);
            return false;
        };

        let cur_ts = cur.trim().parse::<u64>().unwrap_or(0);
        let drift = last.abs_diff(cur_ts);
        if Duration::from_millis(drift) > ownership_drift {
            log::warn!(
                "lock '{}' drift {drift}ms exceeds {ownership_drift:?}: held by another instance",
                self.key
            );
            self.held.store(false, Ordering::Release);
            return false;
        }

        let now = now_millis();
        let now_str = now.to_string();
        let old = match self.backend.swap(&self.key, &now_str).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("lock '{}' refresh swap failed: {e}", self.key);
                return true;
            }
        };

        match old {
            Some(ref old_val) if *old_val == cur => {
                if let Err(e) = self.backend.refresh(&self.key, &now_str, ttl).await {
                    log::warn!("lock '{}' refresh TTL set failed: {e}", self.key);
                }
                *self.last_refresh.lock() = Some(now);
                true
            }
            _ => {
                // Our swap raced with someone else; put back what we displaced.
                if let Some(old_val) = old {
                    let _ = self.backend.set(&self.key, &old_val).await;
                }
                log::warn!("lock '{}' lost during refresh race", self.key);
                self.held.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Release the lock. Called only on graceful shutdown.
    pub async fn release(&self) {
        if let Err(e) = self.backend.delete(&self.key).await {
            log::warn!("lock '{}' release failed: {e}", self.key);
        }
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::memory::MemoryCoordinator;

    fn ttl() -> Duration {
        Duration::from_secs(60)
    }
    fn stale() -> Duration {
        Duration::from_secs(30)
    }
    fn drift() -> Duration {
        Duration::from_secs(20)
    }

    #[tokio::test]
    async fn second_acquire_fails_while_first_is_fresh() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let a = LockGuard::new(backend.clone(), "manager", "1");
        let b = LockGuard::new(backend.clone(), "manager", "1");

        a.acquire(ttl(), stale()).await.unwrap();
        assert!(a.is_held());

        let err = b.acquire(ttl(), stale()).await.unwrap_err();
        assert!(matches!(err, LockError::HeldByAnother(_)));
    }

    #[tokio::test]
    async fn release_then_acquire_succeeds() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let a = LockGuard::new(backend.clone(), "general", "1");
        let b = LockGuard::new(backend.clone(), "general", "1");

        a.acquire(ttl(), stale()).await.unwrap();
        a.release().await;
        assert!(!a.is_held());

        b.acquire(ttl(), stale()).await.unwrap();
        assert!(b.is_held());
    }

    #[tokio::test]
    async fn refresh_keeps_lock_alive() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let a = LockGuard::new(backend.clone(), "product", "1");
        a.acquire(ttl(), stale()).await.unwrap();
        let still_held = a.refresh(ttl(), drift()).await;
        assert!(still_held);
        assert!(a.is_held());
    }

    #[tokio::test]
    async fn refresh_reports_loss_when_key_deleted_externally() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let a = LockGuard::new(backend.clone(), "product", "2");
        a.acquire(ttl(), stale()).await.unwrap();
        backend.delete(a.key()).await.unwrap();
        let still_held = a.refresh(ttl(), drift()).await;
        assert!(!still_held);
        assert!(!a.is_held());
    }
}
