//! The `BrowserDriver` trait (§4.7, §6b): the six operations the
//! coordination protocol needs from a browser automation backend. General
//! workers use the full trait for tab lifecycle; Product workers use only
//! the read-side operations (`list_tabs`, `tab_url`, `evaluate`) and never
//! close anything.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::cookies::CookieJar;

/// Optional proxy configuration for a new browser context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Opaque handle to a browser context (an isolated cookie/cache scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserContextHandle(pub u64);

/// Opaque handle to a single tab (CDP target) within a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabHandle(pub u64);

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open a new context, optionally routed through `proxy`, installing
    /// `cookies` if non-empty.
    async fn open_context(
        &self,
        proxy: Option<ProxySettings>,
        cookies: CookieJar,
    ) -> anyhow::Result<BrowserContextHandle>;

    /// Close a context and every tab within it.
    async fn close_context(&self, ctx: BrowserContextHandle) -> anyhow::Result<()>;

    /// All currently-open contexts.
    async fn list_contexts(&self) -> anyhow::Result<Vec<BrowserContextHandle>>;

    /// Create a tab within `ctx` and navigate to `url`. Navigation is
    /// fire-and-forget: the call returns once the tab exists, not once the
    /// page has loaded (§4.4 b).
    async fn open_tab(&self, ctx: BrowserContextHandle, url: &str) -> anyhow::Result<TabHandle>;

    /// Close a single tab. Idempotent: closing an already-closed tab is not
    /// an error (§4.4 g).
    async fn close_tab(&self, tab: TabHandle) -> anyhow::Result<()>;

    /// All tabs currently open across every context known to this driver.
    async fn list_tabs(&self) -> anyhow::Result<Vec<TabHandle>>;

    /// The tab's current URL, used to match `page=<n>` and batch-range
    /// patterns without tracking a separate side table.
    async fn tab_url(&self, tab: TabHandle) -> anyhow::Result<String>;

    /// Evaluate a script in the tab and deserialize its JSON return value.
    async fn evaluate(&self, tab: TabHandle, script: &str) -> anyhow::Result<serde_json::Value>;

    /// Read the context's current cookie jar.
    async fn read_cookies(&self, ctx: BrowserContextHandle) -> anyhow::Result<CookieJar>;

    /// Overwrite the context's cookie jar.
    async fn write_cookies(&self, ctx: BrowserContextHandle, cookies: CookieJar) -> anyhow::Result<()>;
}
