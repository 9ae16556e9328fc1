//! `chromiumoxide`-backed [`BrowserDriver`]. A "context" here is a whole
//! Chromium process with its own profile directory, since chromiumoxide
//! has no lightweight incognito-context primitive; this also gives the
//! per-batch proxy rotation (§4.4) a natural boundary: a fresh context is
//! a fresh process with a fresh `--proxy-server` argument.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, DeleteCookiesParams};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::browser_profile::{self, BrowserProfile};
use crate::browser_setup::{apply_stealth_measures, launch_browser_with_proxy};
use crate::retry::{MAX_NAVIGATION_RETRIES, looks_like_service_unavailable, navigation_retry_backoff};

use super::cookies::{Cookie, CookieJar};
use super::driver::{BrowserContextHandle, BrowserDriver, ProxySettings, TabHandle};

struct ContextState {
    browser: chromiumoxide::Browser,
    _handler: JoinHandle<()>,
    _profile: BrowserProfile,
}

/// Concrete `BrowserDriver` implementation over `chromiumoxide`.
pub struct ChromiumBrowserDriver {
    headless: bool,
    /// The listing site's base URL (§4.4 edge cases: the service-unavailable
    /// retry branch only triggers for this domain, never for other URLs a
    /// tab might navigate to).
    listing_domain: String,
    /// Fixed sleep before retrying a navigation that hit the listing
    /// domain's "service unavailable" condition (§4.4, default 5 min).
    service_unavailable_backoff: Duration,
    next_context_id: AtomicU64,
    next_tab_id: AtomicU64,
    contexts: DashMap<u64, ContextState>,
    tabs: DashMap<u64, (u64, Page)>,
}

impl ChromiumBrowserDriver {
    #[must_use]
    pub fn new(headless: bool, listing_domain: String, service_unavailable_backoff: Duration) -> Arc<Self> {
        Arc::new(Self {
            headless,
            listing_domain,
            service_unavailable_backoff,
            next_context_id: AtomicU64::new(1),
            next_tab_id: AtomicU64::new(1),
            contexts: DashMap::new(),
            tabs: DashMap::new(),
        })
    }

    /// Whether `url` falls under the listing domain this driver was
    /// configured with (§4.4: "Non-listing URLs do not trigger this branch").
    fn is_listing_url(&self, url: &str) -> bool {
        url.starts_with(&self.listing_domain)
    }

    fn page_for(&self, tab: TabHandle) -> anyhow::Result<Page> {
        self.tabs
            .get(&tab.0)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| anyhow::anyhow!("unknown tab handle {}", tab.0))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumBrowserDriver {
    async fn open_context(
        &self,
        proxy: Option<ProxySettings>,
        cookies: CookieJar,
    ) -> anyhow::Result<BrowserContextHandle> {
        let profile = browser_profile::create_unique_profile_with_prefix("lcc_ctx")?;
        let proxy_server = proxy.as_ref().map(|p| p.server.clone());
        let (browser, handler, _path) =
            launch_browser_with_proxy(self.headless, Some(profile.path().to_path_buf()), proxy_server).await?;

        let id = self.next_context_id.fetch_add(1, Ordering::Relaxed);
        let handle = BrowserContextHandle(id);
        self.contexts.insert(
            id,
            ContextState {
                browser,
                _handler: handler,
                _profile: profile,
            },
        );

        if !cookies.is_empty() {
            self.write_cookies(handle, cookies).await?;
        }

        Ok(handle)
    }

    async fn close_context(&self, ctx: BrowserContextHandle) -> anyhow::Result<()> {
        self.tabs.retain(|_, (owner, _)| *owner != ctx.0);
        if let Some((_, mut state)) = self.contexts.remove(&ctx.0) {
            let _ = state.browser.close().await;
        }
        Ok(())
    }

    async fn list_contexts(&self) -> anyhow::Result<Vec<BrowserContextHandle>> {
        Ok(self.contexts.iter().map(|e| BrowserContextHandle(*e.key())).collect())
    }

    async fn open_tab(&self, ctx: BrowserContextHandle, url: &str) -> anyhow::Result<TabHandle> {
        let page = {
            let mut entry = self
                .contexts
                .get_mut(&ctx.0)
                .ok_or_else(|| anyhow::anyhow!("unknown context handle {}", ctx.0))?;
            entry.browser.new_page("about:blank").await?
        };

        if let Err(e) = apply_stealth_measures(&page).await {
            log::warn!("stealth measures failed for new tab: {e}");
        }

        // Fire-and-forget navigation per §4.4 b: we don't await page load.
        // Retries happen in the background per §4.4 edge cases / §7: a
        // listing-domain "service unavailable" response backs off 5 minutes
        // and retries indefinitely, while any other navigation error gets a
        // bounded exponential-ish retry before the tab is abandoned.
        let goto_page = page.clone();
        let goto_url = url.to_string();
        let is_listing_url = self.is_listing_url(&goto_url);
        let service_unavailable_backoff = self.service_unavailable_backoff;
        tokio::spawn(async move {
            let mut attempt: u8 = 0;
            loop {
                match goto_page.goto(goto_url.as_str()).await {
                    Ok(_) => return,
                    Err(e) => {
                        let message = e.to_string();
                        if is_listing_url && looks_like_service_unavailable(&message) {
                            log::warn!(
                                "listing domain reported service unavailable for {goto_url}; \
                                 backing off {service_unavailable_backoff:?} before retrying"
                            );
                            tokio::time::sleep(service_unavailable_backoff).await;
                            continue;
                        }

                        if attempt >= MAX_NAVIGATION_RETRIES {
                            log::warn!(
                                "navigation to {goto_url} failed after {attempt} retries, giving up: {message}"
                            );
                            return;
                        }

                        let delay = navigation_retry_backoff(attempt);
                        log::warn!(
                            "navigation to {goto_url} failed (attempt {}/{MAX_NAVIGATION_RETRIES}): {message}; retrying in {delay:?}",
                            attempt + 1
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        });

        let tab_id = self.next_tab_id.fetch_add(1, Ordering::Relaxed);
        self.tabs.insert(tab_id, (ctx.0, page));
        Ok(TabHandle(tab_id))
    }

    async fn close_tab(&self, tab: TabHandle) -> anyhow::Result<()> {
        if let Some((_, (_, page))) = self.tabs.remove(&tab.0) {
            // Idempotent: closing an already-closed target is not an error.
            let _ = page.close().await;
        }
        Ok(())
    }

    async fn list_tabs(&self) -> anyhow::Result<Vec<TabHandle>> {
        Ok(self.tabs.iter().map(|e| TabHandle(*e.key())).collect())
    }

    async fn tab_url(&self, tab: TabHandle) -> anyhow::Result<String> {
        let page = self.page_for(tab)?;
        Ok(page.url().await?.unwrap_or_default())
    }

    async fn evaluate(&self, tab: TabHandle, script: &str) -> anyhow::Result<serde_json::Value> {
        let page = self.page_for(tab)?;
        let result = page.evaluate(script).await?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to decode evaluate() result: {e}"))
    }

    async fn read_cookies(&self, ctx: BrowserContextHandle) -> anyhow::Result<CookieJar> {
        let state = self
            .contexts
            .get(&ctx.0)
            .ok_or_else(|| anyhow::anyhow!("unknown context handle {}", ctx.0))?;
        let pages = state.browser.pages().await?;
        let Some(page) = pages.first() else {
            return Ok(Vec::new());
        };
        let raw = page.get_cookies().await?;
        Ok(raw
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn write_cookies(&self, ctx: BrowserContextHandle, cookies: CookieJar) -> anyhow::Result<()> {
        let state = self
            .contexts
            .get(&ctx.0)
            .ok_or_else(|| anyhow::anyhow!("unknown context handle {}", ctx.0))?;
        let pages = state.browser.pages().await?;
        let Some(page) = pages.first() else {
            anyhow::bail!("cannot set cookies: context {} has no open page", ctx.0);
        };

        page.execute(DeleteCookiesParams::builder().name("*").build().map_err(|e| {
            anyhow::anyhow!("failed to build delete-cookies params: {e}")
        })?)
        .await
        .ok();

        let params: Vec<CookieParam> = cookies
            .into_iter()
            .filter_map(|c| {
                CookieParam::builder()
                    .name(c.name)
                    .value(c.value)
                    .domain(c.domain)
                    .path(c.path)
                    .secure(c.secure)
                    .http_only(c.http_only)
                    .build()
                    .ok()
            })
            .collect();

        if !params.is_empty() {
            page.set_cookies(params).await?;
        }
        Ok(())
    }
}
