//! In-memory coordinator double used by integration tests (§8 scenarios
//! S1-S6) to exercise the full protocol without a running coordinator
//! process.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::CoordinatorBackend;
use super::error::CoordinatorError;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

/// A single-process, lock-free-enough (guarded by one mutex) stand-in for
/// the coordinator's key-value store. TTLs are honored on read: an expired
/// entry behaves as absent.
#[derive(Default)]
pub struct MemoryCoordinator {
    store: Mutex<HashMap<String, Entry>>,
}

impl MemoryCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<String> {
        let mut store = self.store.lock();
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                store.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl CoordinatorBackend for MemoryCoordinator {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        Ok(self.read(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        self.store.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinatorError> {
        if self.read(key).is_some() {
            return Ok(false);
        }
        self.store.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn swap(&self, key: &str, new_value: &str) -> Result<Option<String>, CoordinatorError> {
        let mut store = self.store.lock();
        let previous = match store.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        };
        let ttl = store.get(key).and_then(|e| e.expires_at);
        store.insert(
            key.to_string(),
            Entry {
                value: new_value.to_string(),
                expires_at: ttl,
            },
        );
        Ok(previous)
    }

    async fn refresh(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError> {
        self.store.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinatorError> {
        self.store.lock().remove(key);
        Ok(())
    }

    async fn reset(&self) -> Result<(), CoordinatorError> {
        self.store.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_acquire_fails_until_deleted() {
        let c = MemoryCoordinator::new();
        assert!(c.acquire("k", "v1", Duration::from_secs(60)).await.unwrap());
        assert!(!c.acquire("k", "v2", Duration::from_secs(60)).await.unwrap());
        c.delete("k").await.unwrap();
        assert!(c.acquire("k", "v3", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_succeeds_after_ttl_expiry() {
        let c = MemoryCoordinator::new();
        assert!(c.acquire("k", "v1", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(c.acquire("k", "v2", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn swap_returns_previous_value() {
        let c = MemoryCoordinator::new();
        c.set("k", "old").await.unwrap();
        let prev = c.swap("k", "new").await.unwrap();
        assert_eq!(prev, Some("old".to_string()));
        assert_eq!(c.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn swap_on_absent_key_returns_none() {
        let c = MemoryCoordinator::new();
        let prev = c.swap("nope", "new").await.unwrap();
        assert_eq!(prev, None);
    }
}
