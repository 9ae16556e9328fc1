//! Backend-agnostic coordinator trait.
//!
//! `manager`, `general`, and `product` all depend on this trait rather
//! than on [`super::client::CoordinatorClient`] directly, so tests can
//! drive the protocol against [`super::memory::MemoryCoordinator`]
//! without a running HTTP server.

use std::time::Duration;

use async_trait::async_trait;

use super::error::CoordinatorError;

#[async_trait]
pub trait CoordinatorBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError>;
    async fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinatorError>;
    async fn swap(&self, key: &str, new_value: &str) -> Result<Option<String>, CoordinatorError>;
    async fn refresh(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError>;
    async fn delete(&self, key: &str) -> Result<(), CoordinatorError>;
    async fn reset(&self) -> Result<(), CoordinatorError>;
}

#[async_trait]
impl CoordinatorBackend for super::client::CoordinatorClient {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        self.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        self.set(key, value).await
    }

    async fn acquire(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinatorError> {
        self.acquire(key, value, ttl).await
    }

    async fn swap(&self, key: &str, new_value: &str) -> Result<Option<String>, CoordinatorError> {
        self.swap(key, new_value).await
    }

    async fn refresh(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError> {
        self.refresh(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinatorError> {
        self.delete(key).await
    }

    async fn reset(&self) -> Result<(), CoordinatorError> {
        self.reset().await
    }
}
