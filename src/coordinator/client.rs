//! HTTP client for the coordinator's key-value primitives.
//!
//! The coordinator exposes no transaction semantics: every primitive below
//! touches exactly one key. All higher-level protocol (locks, partitioning,
//! membership) lives in the callers under `manager`, `general`, and
//! `product` — this module only talks HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::error::CoordinatorError;

/// Thin wrapper over `reqwest::Client` targeting the coordinator's REST-ish
/// primitive endpoints.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct AcquireRequest<'a> {
    value: &'a str,
    ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
struct AcquireResponse {
    acquired: bool,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    previous: Option<String>,
}

impl CoordinatorClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, key: &str) -> String {
        format!(
            "{}/kv/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(key)
        )
    }

    /// `get(k) -> value|nil`
    pub async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        let resp = self.http.get(self.url(key)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body: GetResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::decode(key, e.to_string()))?;
        Ok(body.value)
    }

    /// `set(k, v)` — unconditional.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), CoordinatorError> {
        let resp = self
            .http
            .put(self.url(key))
            .json(&SetRequest {
                value,
                ttl_secs: None,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// `acquire(k, v, ttl) -> acquired:bool` — sets k to v with TTL only if absent.
    pub async fn acquire(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError> {
        let resp = self
            .http
            .post(format!("{}/acquire", self.url(key)))
            .json(&AcquireRequest {
                value,
                ttl_secs: ttl.as_secs(),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body: AcquireResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::decode(key, e.to_string()))?;
        Ok(body.acquired)
    }

    /// `swap(k, v_new) -> v_old|nil` — atomic get-and-set.
    pub async fn swap(&self, key: &str, new_value: &str) -> Result<Option<String>, CoordinatorError> {
        let resp = self
            .http
            .post(format!("{}/swap", self.url(key)))
            .json(&SetRequest {
                value: new_value,
                ttl_secs: None,
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body: SwapResponse = resp
            .json()
            .await
            .map_err(|e| CoordinatorError::decode(key, e.to_string()))?;
        Ok(body.previous)
    }

    /// `refresh(k, v, ttl)` — unconditional set with TTL, used only by a
    /// confirmed lock holder.
    pub async fn refresh(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError> {
        let resp = self
            .http
            .put(self.url(key))
            .json(&SetRequest {
                value,
                ttl_secs: Some(ttl.as_secs()),
            })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// `delete(k)`.
    pub async fn delete(&self, key: &str) -> Result<(), CoordinatorError> {
        let resp = self.http.delete(self.url(key)).send().await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(CoordinatorError::UnexpectedStatus {
                key: key.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// Delete the entire coordinator namespace. Test-harness only.
    pub async fn reset(&self) -> Result<(), CoordinatorError> {
        let resp = self
            .http
            .post(format!("{}/reset", self.base_url.trim_end_matches('/')))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CoordinatorError::UnexpectedStatus {
                key: "*".to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}
