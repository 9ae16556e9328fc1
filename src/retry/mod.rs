//! Retry pacing shared by navigation and service-unavailable handling (§7).

pub mod backoff;

pub use backoff::{MAX_NAVIGATION_RETRIES, looks_like_service_unavailable, navigation_retry_backoff};
