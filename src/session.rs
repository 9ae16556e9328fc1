//! Session-cookie fan-out (§4.6): cookies are the only shared mutable
//! session state, published and consumed through the coordinator so login
//! becomes a cross-worker singleton without electing a dedicated owner.

use std::sync::Arc;
use std::time::Duration;

use crate::browser::{BrowserContextHandle, BrowserDriver, CookieJar};
use crate::coordinator::{CoordinatorBackend, keys, value};

/// Outcome of installing and verifying the shared session in a freshly
/// opened context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Cookies installed and verified against the listing page.
    Valid,
    /// No usable cookies were available, or verification failed.
    Invalid,
}

/// Read `session/cookies` / `session/valid` and install them into `ctx` if
/// present and marked valid (§4.6 step 1).
pub async fn install_shared_cookies(
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    ctx: BrowserContextHandle,
) -> anyhow::Result<bool> {
    let valid = matches!(
        value::parse_flag(backend.get(keys::session_valid()).await.unwrap_or(None)),
        value::CoordinatorValue::Present(true)
    );
    if !valid {
        return Ok(false);
    }

    let raw = backend.get(keys::session_cookies()).await.unwrap_or(None);
    let cookies: CookieJar = match value::parse_json::<CookieJar>(raw) {
        value::CoordinatorValue::Present(cookies) if !cookies.is_empty() => cookies,
        _ => return Ok(false),
    };

    driver.write_cookies(ctx, cookies).await?;
    Ok(true)
}

/// Verify the installed session is actually signed in by evaluating a
/// small indicator script on the listing page, then publish the cookie
/// jar back to the coordinator on success (§4.6 step 2).
///
/// `signed_in_check_script` must evaluate to a JSON boolean.
pub async fn verify_and_publish(
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    ctx: BrowserContextHandle,
    signed_in_check_script: &str,
) -> anyhow::Result<SessionState> {
    let tabs = driver.list_tabs().await?;
    let Some(&tab) = tabs.first() else {
        return Ok(SessionState::Invalid);
    };

    let value = driver.evaluate(tab, signed_in_check_script).await?;
    let signed_in = value.as_bool().unwrap_or(false);

    if signed_in {
        let cookies = driver.read_cookies(ctx).await?;
        let json = serde_json::to_string(&cookies)?;
        backend.set(keys::session_cookies(), &json).await?;
        backend.set(keys::session_valid(), "1").await?;
        Ok(SessionState::Valid)
    } else {
        backend.set(keys::session_valid(), "0").await?;
        Ok(SessionState::Invalid)
    }
}

/// General-worker wait-for-human-login loop (§4.6 step 3): poll
/// `session/valid` for up to `timeout`, returning true if it becomes valid.
pub async fn wait_for_interactive_login(
    backend: &Arc<dyn CoordinatorBackend>,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let valid = matches!(
            value::parse_flag(backend.get(keys::session_valid()).await.unwrap_or(None)),
            value::CoordinatorValue::Present(true)
        );
        if valid {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ProxySettings;
    use crate::coordinator::MemoryCoordinator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubDriver {
        signed_in: AtomicBool,
    }

    #[async_trait]
    impl BrowserDriver for StubDriver {
        async fn open_context(&self, _: Option<ProxySettings>, _: CookieJar) -> anyhow::Result<BrowserContextHandle> {
            Ok(BrowserContextHandle(1))
        }
        async fn close_context(&self, _: BrowserContextHandle) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_contexts(&self) -> anyhow::Result<Vec<BrowserContextHandle>> {
            Ok(vec![BrowserContextHandle(1)])
        }
        async fn open_tab(&self, _: BrowserContextHandle, _: &str) -> anyhow::Result<crate::browser::TabHandle> {
            Ok(crate::browser::TabHandle(1))
        }
        async fn close_tab(&self, _: crate::browser::TabHandle) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_tabs(&self) -> anyhow::Result<Vec<crate::browser::TabHandle>> {
            Ok(vec![crate::browser::TabHandle(1)])
        }
        async fn tab_url(&self, _: crate::browser::TabHandle) -> anyhow::Result<String> {
            Ok("https://example.com/listing".to_string())
        }
        async fn evaluate(&self, _: crate::browser::TabHandle, _: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Bool(self.signed_in.load(Ordering::Relaxed)))
        }
        async fn read_cookies(&self, _: BrowserContextHandle) -> anyhow::Result<CookieJar> {
            Ok(vec![])
        }
        async fn write_cookies(&self, _: BrowserContextHandle, _: CookieJar) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn verify_publishes_cookies_when_signed_in() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let driver: Arc<dyn BrowserDriver> = Arc::new(StubDriver {
            signed_in: AtomicBool::new(true),
        });

        let state = verify_and_publish(&backend, &driver, BrowserContextHandle(1), "true")
            .await
            .unwrap();
        assert_eq!(state, SessionState::Valid);
        assert_eq!(backend.get(keys::session_valid()).await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn verify_marks_invalid_when_not_signed_in() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let driver: Arc<dyn BrowserDriver> = Arc::new(StubDriver {
            signed_in: AtomicBool::new(false),
        });

        let state = verify_and_publish(&backend, &driver, BrowserContextHandle(1), "false")
            .await
            .unwrap();
        assert_eq!(state, SessionState::Invalid);
        assert_eq!(backend.get(keys::session_valid()).await.unwrap(), Some("0".to_string()));
    }

    #[tokio::test]
    async fn install_skips_when_not_marked_valid() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let driver: Arc<dyn BrowserDriver> = Arc::new(StubDriver {
            signed_in: AtomicBool::new(true),
        });
        let installed = install_shared_cookies(&backend, &driver, BrowserContextHandle(1))
            .await
            .unwrap();
        assert!(!installed);
    }

    #[tokio::test]
    async fn wait_for_login_returns_true_once_published() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        backend.set(keys::session_valid(), "1").await.unwrap();
        let ok = wait_for_interactive_login(&backend, Duration::from_secs(1), Duration::from_millis(10)).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn wait_for_login_times_out_when_never_published() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let ok = wait_for_interactive_login(&backend, Duration::from_millis(30), Duration::from_millis(10)).await;
        assert!(!ok);
    }
}
