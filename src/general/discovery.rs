//! Total-page/total-product discovery (§4.4 step 3). The General worker is
//! the sole source of these values: it evaluates a small script against
//! the listing page and republishes the result every iteration, which is
//! idempotent and cheap enough to simply overwrite.

use std::sync::Arc;

use serde::Deserialize;

use crate::browser::{BrowserDriver, TabHandle};
use crate::coordinator::{CoordinatorBackend, keys};

/// Evaluated against a listing tab; the site is expected to expose its
/// pagination and result-count metadata somewhere in the DOM (a `<nav>`
/// with page links, a results-count banner, or similar element carrying
/// `data-total-pages`/`data-total-products`, mirroring the `[data-listing-id]`
/// convention used by the extraction script).
pub const DISCOVERY_SCRIPT: &str = r#"
    (() => {
        const el = document.querySelector('[data-total-pages]');
        const totalPages = el ? parseInt(el.getAttribute('data-total-pages'), 10) : 0;
        const totalProducts = el ? parseInt(el.getAttribute('data-total-products') || '0', 10) : 0;
        return { total_pages: totalPages, total_products: totalProducts };
    })()
"#;

#[derive(Debug, Deserialize)]
struct DiscoveryResult {
    total_pages: u32,
    total_products: u32,
}

/// Evaluate [`DISCOVERY_SCRIPT`] in `tab` and publish `totalPages` /
/// `totalProducts` to the coordinator. Returns the discovered totals.
pub async fn discover_and_publish(
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    tab: TabHandle,
) -> anyhow::Result<(u32, u32)> {
    let value = driver.evaluate(tab, DISCOVERY_SCRIPT).await?;
    let result: DiscoveryResult = serde_json::from_value(value)?;

    if result.total_pages > 0 {
        backend.set(keys::total_pages(), &result.total_pages.to_string()).await?;
    }
    if result.total_products > 0 {
        backend
            .set(keys::total_products(), &result.total_products.to_string())
            .await?;
    }

    Ok((result.total_pages, result.total_products))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserContextHandle, CookieJar, ProxySettings};
    use crate::coordinator::MemoryCoordinator;
    use async_trait::async_trait;

    struct StubDriver;

    #[async_trait]
    impl BrowserDriver for StubDriver {
        async fn open_context(&self, _: Option<ProxySettings>, _: CookieJar) -> anyhow::Result<BrowserContextHandle> {
            Ok(BrowserContextHandle(1))
        }
        async fn close_context(&self, _: BrowserContextHandle) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_contexts(&self) -> anyhow::Result<Vec<BrowserContextHandle>> {
            Ok(vec![])
        }
        async fn open_tab(&self, _: BrowserContextHandle, _: &str) -> anyhow::Result<TabHandle> {
            Ok(TabHandle(1))
        }
        async fn close_tab(&self, _: TabHandle) -> anyhow::Result<()> {
            Ok(())
        }
        async fn list_tabs(&self) -> anyhow::Result<Vec<TabHandle>> {
            Ok(vec![TabHandle(1)])
        }
        async fn tab_url(&self, _: TabHandle) -> anyhow::Result<String> {
            Ok("https://example.com/listing".to_string())
        }
        async fn evaluate(&self, _: TabHandle, _: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({"total_pages": 300, "total_products": 9000}))
        }
        async fn read_cookies(&self, _: BrowserContextHandle) -> anyhow::Result<CookieJar> {
            Ok(vec![])
        }
        async fn write_cookies(&self, _: BrowserContextHandle, _: CookieJar) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_discovered_totals() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let driver: Arc<dyn BrowserDriver> = Arc::new(StubDriver);
        let (pages, products) = discover_and_publish(&backend, &driver, TabHandle(1)).await.unwrap();
        assert_eq!(pages, 300);
        assert_eq!(products, 9000);
        assert_eq!(backend.get(keys::total_pages()).await.unwrap(), Some("300".to_string()));
        assert_eq!(backend.get(keys::total_products()).await.unwrap(), Some("9000".to_string()));
    }
}
