//! Core configuration types for the coordination plane.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which binary this process is running as, and its numeric identity.
///
/// The Manager has no numeric id (the lock key is always `manager-1`);
/// General and Product workers are identified by a small positive integer
/// that becomes part of every coordinator key they own (`general/<id>/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerRole {
    Manager,
    General(u32),
    Product(u32),
}

impl WorkerRole {
    #[must_use]
    pub fn role_str(&self) -> &'static str {
        match self {
            WorkerRole::Manager => "manager",
            WorkerRole::General(_) => "general",
            WorkerRole::Product(_) => "product",
        }
    }

    #[must_use]
    pub fn id_str(&self) -> String {
        match self {
            WorkerRole::Manager => "1".to_string(),
            WorkerRole::General(id) | WorkerRole::Product(id) => id.to_string(),
        }
    }

    /// The lock key for this role, e.g. `lock/general-3`.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!("lock/{}-{}", self.role_str(), self.id_str())
    }
}

/// Tab-open pacing strategy for the General worker's batch loop (§9 Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TabOpenStrategy {
    /// Open tabs one at a time with a random `[min,max]` delay between opens.
    #[default]
    Sequential,
    /// Open all tabs in the batch concurrently with no inter-tab delay.
    Parallel,
}

/// Round-robin rotation settings (§4.3 rotation mode).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RotationConfig {
    pub enabled: bool,
    pub batch_size: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 50,
        }
    }
}

/// Optional HTTP/SOCKS proxy for browser contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Process-wide configuration, loaded once at startup from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub role: WorkerRole,

    /// Base URL of the coordinator's HTTP primitive endpoints.
    pub coordinator_endpoint: String,
    /// Path to the SQLite database file backing the persistence layer.
    pub persistence_path: std::path::PathBuf,

    /// Base URL of the site being crawled, e.g. `https://shop.example.com`.
    pub site_base_url: String,
    /// Listing URL template containing the literal substring `{page}`.
    pub listing_url_template: String,
    /// Script evaluated against the listing page to detect a signed-in
    /// session (§4.6 step 2). Must evaluate to a JSON boolean.
    pub signed_in_check_script: String,

    pub proxy: Option<ProxyConfig>,
    pub rotation: RotationConfig,

    pub tabs_per_batch: u32,
    pub tab_open_strategy: TabOpenStrategy,
    pub tab_open_delay_min_ms: u64,
    pub tab_open_delay_max_ms: u64,

    pub manager_tick_interval: Duration,
    pub general_poll_interval: Duration,
    pub product_poll_interval: Duration,
    pub batch_poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub lock_refresh_interval: Duration,
    pub service_unavailable_backoff: Duration,

    pub n_max_worker_scan: u32,
    pub product_worker_total_fallback: u32,
    pub headless: bool,

    pub log_verbosity: String,
}

impl AppConfig {
    pub const T_LIVE: Duration = Duration::from_secs(60);
    pub const LOCK_TTL: Duration = Duration::from_secs(60);
    pub const LOCK_STALE: Duration = Duration::from_secs(30);
    pub const LOCK_OWNERSHIP_DRIFT: Duration = Duration::from_secs(20);
    pub const CLOSED_BATCH_HISTORY: usize = 2;
    /// Up to 5 minutes waiting for an interactive login (§4.6 step 3).
    pub const SESSION_LOGIN_WAIT: Duration = Duration::from_secs(5 * 60);

    /// Substitute the literal `{page}` placeholder with a 1-based page number.
    #[must_use]
    pub fn listing_url_for_page(&self, page: u32) -> String {
        self.listing_url_template.replace("{page}", &page.to_string())
    }
}
