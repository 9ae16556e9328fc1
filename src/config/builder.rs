//! Environment-variable configuration loading.
//!
//! Validate, default, fail loud on a malformed required value, via a single
//! `load_from_env` entry point, since every field here has a safe default
//! except the worker identity.

use anyhow::{Context, Result, anyhow};
use std::time::Duration;

use super::types::{AppConfig, ProxyConfig, RotationConfig, TabOpenStrategy, WorkerRole};

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be an unsigned integer, got '{v}'")),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<u32>()
            .with_context(|| format!("{key} must be an unsigned integer, got '{v}'")),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_duration_secs(key: &str, default_secs: u64) -> Result<Duration> {
    Ok(Duration::from_secs(env_u64(key, default_secs)?))
}

/// Parse `ROLE` and `WORKER_ID` into a [`WorkerRole`].
///
/// `ROLE` must be one of `manager`, `general`, `product`. `WORKER_ID` is
/// required for `general` and `product` and must be a positive integer.
fn load_role() -> Result<WorkerRole> {
    let role = env_str("ROLE", "");
    match role.as_str() {
        "manager" => Ok(WorkerRole::Manager),
        "general" => {
            let id = std::env::var("WORKER_ID")
                .context("WORKER_ID is required when ROLE=general")?
                .parse::<u32>()
                .context("WORKER_ID must be a positive integer")?;
            Ok(WorkerRole::General(id))
        }
        "product" => {
            let id = std::env::var("WORKER_ID")
                .context("WORKER_ID is required when ROLE=product")?
                .parse::<u32>()
                .context("WORKER_ID must be a positive integer")?;
            Ok(WorkerRole::Product(id))
        }
        other => Err(anyhow!(
            "ROLE must be one of 'manager', 'general', 'product', got '{other}'"
        )),
    }
}

fn load_proxy() -> Option<ProxyConfig> {
    let server = std::env::var("PROXY_SERVER").ok()?;
    Some(ProxyConfig {
        server,
        username: std::env::var("PROXY_USERNAME").ok(),
        password: std::env::var("PROXY_PASSWORD").ok(),
    })
}

fn load_tab_open_strategy() -> TabOpenStrategy {
    match env_str("TAB_OPEN_STRATEGY", "sequential").as_str() {
        "parallel" => TabOpenStrategy::Parallel,
        _ => TabOpenStrategy::Sequential,
    }
}

/// Load and validate the process-wide [`AppConfig`] from environment variables.
///
/// Required: `ROLE` (and `WORKER_ID` for worker roles), `COORDINATOR_ENDPOINT`,
/// `SITE_BASE_URL`, `LISTING_URL_TEMPLATE`. Everything else has a default.
pub fn load_from_env() -> Result<AppConfig> {
    let role = load_role()?;

    let coordinator_endpoint = std::env::var("COORDINATOR_ENDPOINT")
        .context("COORDINATOR_ENDPOINT is required")?;
    let site_base_url =
        std::env::var("SITE_BASE_URL").context("SITE_BASE_URL is required")?;
    let listing_url_template = std::env::var("LISTING_URL_TEMPLATE")
        .context("LISTING_URL_TEMPLATE is required")?;
    if !listing_url_template.contains("{page}") {
        return Err(anyhow!(
            "LISTING_URL_TEMPLATE must contain the literal substring '{{page}}', got '{listing_url_template}'"
        ));
    }

    let persistence_path = std::path::PathBuf::from(env_str(
        "PERSISTENCE_PATH",
        "./listing_crawl_coordinator.sqlite",
    ));

    let rotation = RotationConfig {
        enabled: env_bool("ENABLE_ROUND_ROBIN_ROTATION", false),
        batch_size: env_u32("ROTATION_BATCH_SIZE", 50)?,
    };

    let tab_open_delay_min_ms = env_u64("TAB_OPEN_DELAY_MIN_MS", 1000)?;
    let tab_open_delay_max_ms = env_u64("TAB_OPEN_DELAY_MAX_MS", 3000)?;
    if tab_open_delay_min_ms > tab_open_delay_max_ms {
        return Err(anyhow!(
            "TAB_OPEN_DELAY_MIN_MS ({tab_open_delay_min_ms}) must be <= TAB_OPEN_DELAY_MAX_MS ({tab_open_delay_max_ms})"
        ));
    }

    Ok(AppConfig {
        role,
        coordinator_endpoint,
        persistence_path,
        site_base_url,
        listing_url_template,
        signed_in_check_script: env_str(
            "SIGNED_IN_CHECK_SCRIPT",
            "document.querySelector('[data-signed-in]') !== null",
        ),
        proxy: load_proxy(),
        rotation,
        tabs_per_batch: env_u32("TABS_PER_BATCH", 50)?,
        tab_open_strategy: load_tab_open_strategy(),
        tab_open_delay_min_ms,
        tab_open_delay_max_ms,
        manager_tick_interval: env_duration_secs("MANAGER_TICK_INTERVAL_SECS", 5)?,
        general_poll_interval: env_duration_secs("GENERAL_POLL_INTERVAL_SECS", 5)?,
        product_poll_interval: env_duration_secs("PRODUCT_POLL_INTERVAL_SECS", 2)?,
        batch_poll_interval: env_duration_secs("BATCH_POLL_INTERVAL_SECS", 2)?,
        heartbeat_interval: env_duration_secs("HEARTBEAT_INTERVAL_SECS", 10)?,
        lock_refresh_interval: env_duration_secs("LOCK_REFRESH_INTERVAL_SECS", 7)?,
        service_unavailable_backoff: env_duration_secs(
            "SERVICE_UNAVAILABLE_BACKOFF_SECS",
            5 * 60,
        )?,
        n_max_worker_scan: env_u32("N_MAX_WORKER_SCAN", 20)?,
        product_worker_total_fallback: env_u32("PRODUCT_WORKER_TOTAL", 1)?,
        headless: env_bool("HEADLESS", true),
        log_verbosity: env_str("RUST_LOG", "info"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "ROLE",
            "WORKER_ID",
            "COORDINATOR_ENDPOINT",
            "SITE_BASE_URL",
            "LISTING_URL_TEMPLATE",
            "TAB_OPEN_DELAY_MIN_MS",
            "TAB_OPEN_DELAY_MAX_MS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn rejects_missing_role() {
        clear_env();
        assert!(load_role().is_err());
    }

    #[test]
    fn rejects_worker_role_without_id() {
        clear_env();
        unsafe { std::env::set_var("ROLE", "general") };
        assert!(load_role().is_err());
        clear_env();
    }

    #[test]
    fn parses_general_role_with_id() {
        clear_env();
        unsafe { std::env::set_var("ROLE", "general") };
        unsafe { std::env::set_var("WORKER_ID", "3") };
        assert_eq!(load_role().unwrap(), WorkerRole::General(3));
        clear_env();
    }

    #[test]
    fn listing_url_template_requires_page_placeholder() {
        clear_env();
        unsafe { std::env::set_var("ROLE", "manager") };
        unsafe { std::env::set_var("COORDINATOR_ENDPOINT", "http://localhost:9000") };
        unsafe { std::env::set_var("SITE_BASE_URL", "https://example.com") };
        unsafe { std::env::set_var("LISTING_URL_TEMPLATE", "https://example.com/list") };
        let err = load_from_env().unwrap_err();
        assert!(err.to_string().contains("{page}"));
        clear_env();
    }
}
