//! Exponential backoff with jitter for browser-driver navigation retries
//! (§7: "Browser-driver errors: retried with exponential-ish pacing for
//! navigation"). Used by `browser::chromium_driver`'s tab-open/navigation
//! path; the site-wide "service unavailable" condition (§4.4 edge cases)
//! uses the configured fixed `service_unavailable_backoff` duration
//! directly rather than a wrapper here, since there's no pacing to compute.

use std::time::Duration;

use rand::Rng;

const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 30_000;
const JITTER_PERCENT: f64 = 0.2;

/// Maximum navigation retry attempts before giving up on a tab (§7:
/// individual tab failures demote to warnings and skip the page).
pub const MAX_NAVIGATION_RETRIES: u8 = 5;

/// Exponential backoff delay for the `attempt`-th retry (0-based), with
/// ±20% jitter to avoid a thundering herd of tabs retrying in lockstep.
#[must_use]
pub fn navigation_retry_backoff(attempt: u8) -> Duration {
    let exp_delay = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(5));
    let jitter = rand::rng().random_range(-JITTER_PERCENT..=JITTER_PERCENT);
    let jittered = (exp_delay as f64 * (1.0 + jitter)) as u64;
    Duration::from_millis(jittered.min(MAX_DELAY_MS))
}

/// Whether a navigation error looks like the site's "service unavailable"
/// condition (§4.4 edge cases) rather than an ordinary transient failure.
/// chromiumoxide surfaces HTTP-layer failures as CDP error text rather than
/// a typed status code, so this matches on the error's rendered message.
#[must_use]
pub fn looks_like_service_unavailable(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    lower.contains("503") || lower.contains("service unavailable")
}
