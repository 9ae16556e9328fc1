//! The General worker's batch loop (§4.4): split an assigned range into
//! `TABS_PER_BATCH`-sized windows, open tabs, hand pages to Product
//! workers, wait for drain, then hand the batch's tabs to a [`BatchCloser`]
//! for deferred closing.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::browser::{BrowserContextHandle, BrowserDriver, TabHandle};
use crate::config::{AppConfig, TabOpenStrategy};
use crate::coordinator::{CoordinatorBackend, keys, value};
use crate::events::{CrawlEvent, CrawlEventBus};
use crate::manager::membership;

use super::rebalance;

/// Split `[start, end]` into consecutive windows of at most `tabs_per_batch`
/// pages each, in ascending order. Pure function, kept free of I/O so the
/// windowing can be tested without a coordinator or browser.
#[must_use]
pub fn batches_for_range(start: u32, end: u32, tabs_per_batch: u32) -> Vec<(u32, u32)> {
    if start > end || tabs_per_batch == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let batch_end = (cursor + tabs_per_batch - 1).min(end);
        out.push((cursor, batch_end));
        cursor = batch_end + 1;
    }
    out
}

/// Partition `[bs..=be]` round-robin by position across `product_ids`
/// (already sorted). Returns a page list per product id; empty if
/// `product_ids` is empty (caller falls back to `PRODUCT_WORKER_TOTAL`,
/// §4.4 edge cases).
#[must_use]
pub fn assign_pages_round_robin(bs: u32, be: u32, product_ids: &[u32]) -> BTreeMap<u32, Vec<u32>> {
    let mut out: BTreeMap<u32, Vec<u32>> = product_ids.iter().map(|&id| (id, Vec::new())).collect();
    if product_ids.is_empty() {
        return out;
    }
    for (i, page) in (bs..=be).enumerate() {
        let id = product_ids[i % product_ids.len()];
        out.get_mut(&id).expect("id inserted above").push(page);
    }
    out
}

/// Drives one batch window `[bs, be]` through steps a-g of §4.4. Returns the
/// tab handles opened for this batch; the caller hands these to a
/// [`BatchCloser`] rather than closing them inline (step g).
pub struct BatchOutcome {
    pub tabs: Vec<(u32, TabHandle)>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_batch(
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    config: &AppConfig,
    events: &Arc<CrawlEventBus>,
    ctx: BrowserContextHandle,
    general_id: u32,
    bs: u32,
    be: u32,
) -> anyhow::Result<BatchOutcome> {
    // a. context is created/reused by the caller; see `general::run`.

    // b. open tabs for every page in the window.
    let mut tabs = Vec::with_capacity((be - bs + 1) as usize);
    for page in bs..=be {
        let url = config.listing_url_for_page(page);
        let tab = driver.open_tab(ctx, &url).await?;
        tabs.push((page, tab));

        if matches!(config.tab_open_strategy, TabOpenStrategy::Sequential) && page < be {
            let delay_ms = rand::rng().random_range(config.tab_open_delay_min_ms..=config.tab_open_delay_max_ms);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    // c. publish the batch window, clearing stale flags.
    backend.set(keys::batch_start(), &bs.to_string()).await?;
    backend.set(keys::batch_end(), &be.to_string()).await?;
    backend.delete(keys::batch_complete()).await?;
    backend.delete(keys::tabs_ready()).await?;

    // d. assign pages to live Product workers (or the configured fallback).
    let live_product_ids = membership::live_product_ids(backend, config.n_max_worker_scan, AppConfig::T_LIVE).await;
    let effective_ids = if live_product_ids.is_empty() {
        (1..=config.product_worker_total_fallback).collect()
    } else {
        live_product_ids.clone()
    };
    let assignment = assign_pages_round_robin(bs, be, &effective_ids);
    for (&id, pages) in &assignment {
        let json = serde_json::to_string(pages)?;
        backend.set(&keys::product_pages(id), &json).await?;
    }
    // Clear assignments for ids that registered but aren't live right now.
    let all_product_ids = membership::enumerate_ids(backend, keys::workers_product(), config.n_max_worker_scan).await;
    for id in all_product_ids {
        if !effective_ids.contains(&id) {
            backend.delete(&keys::product_pages(id)).await?;
        }
    }

    // e. release Product workers.
    backend.set(keys::tabs_ready(), "1").await?;
    backend.set(keys::crawl_trigger(), "1").await?;

    log::info!("general/{general_id} opened batch [{bs},{be}] across {} product workers", effective_ids.len());

    // f. wait for drain, rebalancing opportunistically.
    wait_for_batch_drain(backend, config, events, &effective_ids).await?;

    backend.set(keys::batch_complete(), "1").await?;

    Ok(BatchOutcome { tabs })
}

async fn wait_for_batch_drain(
    backend: &Arc<dyn CoordinatorBackend>,
    config: &AppConfig,
    events: &Arc<CrawlEventBus>,
    product_ids: &[u32],
) -> anyhow::Result<()> {
    let mut live_ids: Vec<u32> = product_ids.to_vec();
    loop {
        // Pick up Product workers that registered after the batch opened,
        // rather than only the ids captured at batch-open time (§4.4 edge
        // cases: "New Product workers appearing mid-batch: next rebalance
        // sweep picks them up").
        for id in membership::live_product_ids(backend, config.n_max_worker_scan, AppConfig::T_LIVE).await {
            if !live_ids.contains(&id) {
                live_ids.push(id);
            }
        }

        let mut pages_by_worker = BTreeMap::new();
        let mut all_empty = true;
        for &id in &live_ids {
            let raw = backend.get(&keys::product_pages(id)).await.unwrap_or(None);
            let pages: Vec<u32> = match value::parse_json::<Vec<u32>>(raw) {
                value::CoordinatorValue::Present(p) => p,
                _ => Vec::new(),
            };
            if !pages.is_empty() {
                all_empty = false;
            }
            pages_by_worker.insert(id, pages);
        }

        if all_empty {
            return Ok(());
        }

        let moves = rebalance::rebalance_once(&pages_by_worker);
        if let Some((&donor_id, _)) = moves
            .iter()
            .min_by_key(|(&id, pages)| pages.len() as i64 - pages_by_worker[&id].len() as i64)
        {
            for (&id, pages) in &moves {
                if id != donor_id && pages.len() > pages_by_worker.get(&id).map_or(0, Vec::len) {
                    let moved = pages.len() - pages_by_worker[&id].len();
                    let _ = events
                        .publish(CrawlEvent::rebalanced(donor_id.to_string(), id.to_string(), moved))
                        .await;
                }
            }
        }
        for (&id, pages) in &moves {
            let json = serde_json::to_string(pages)?;
            backend.set(&keys::product_pages(id), &json).await?;
        }

        tokio::time::sleep(config.batch_poll_interval).await;
    }
}

/// Close every tab whose page falls in `[bs, be]`. Idempotent over
/// already-closed tabs (§4.4 g). Returns the tabs whose close call failed,
/// so a caller can retry them on a later sweep.
pub async fn close_batch_tabs(driver: &Arc<dyn BrowserDriver>, tabs: &[(u32, TabHandle)]) -> Vec<(u32, TabHandle)> {
    let mut failed = Vec::new();
    for &(page, tab) in tabs {
        if let Err(e) = driver.close_tab(tab).await {
            log::warn!("closing tab for page {page} failed, will retry on a later sweep: {e}");
            failed.push((page, tab));
        }
    }
    failed
}

/// Bounded-history background tab closer (§4.4g / §9 "cyclic references
/// across batches"): rather than closing a batch's tabs the moment it
/// drains, each completed batch is pushed onto a queue and only actually
/// closed once it has aged past the last `CLOSED_BATCH_HISTORY` batches.
/// This gives a tab that raced a still-loading navigation time to settle
/// before its close is attempted, and a failed close is simply requeued for
/// the next sweep rather than abandoned.
pub struct BatchCloser {
    tx: tokio::sync::mpsc::UnboundedSender<Vec<(u32, TabHandle)>>,
}

/// Close attempts a batch gets before a stuck tab is logged and dropped.
const MAX_CLOSE_ATTEMPTS: u8 = 3;

impl BatchCloser {
    pub fn spawn(driver: Arc<dyn BrowserDriver>) -> Self {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Vec<(u32, TabHandle)>>();
        tokio::spawn(async move {
            let mut history: VecDeque<(Vec<(u32, TabHandle)>, u8)> = VecDeque::new();
            while let Some(batch) = rx.recv().await {
                history.push_back((batch, 0));
                while history.len() > AppConfig::CLOSED_BATCH_HISTORY {
                    let Some((tabs, attempts)) = history.pop_front() else {
                        break;
                    };
                    let failed = close_batch_tabs(&driver, &tabs).await;
                    if failed.is_empty() {
                        continue;
                    }
                    if attempts + 1 >= MAX_CLOSE_ATTEMPTS {
                        log::warn!(
                            "giving up on closing {} tab(s) after {MAX_CLOSE_ATTEMPTS} attempts",
                            failed.len()
                        );
                        continue;
                    }
                    history.push_back((failed, attempts + 1));
                }
            }
            // Sender dropped (General worker shutting down): drain what's left.
            for (tabs, _) in history {
                close_batch_tabs(&driver, &tabs).await;
            }
        });
        Self { tx }
    }

    /// Hand off a completed batch's tabs to the background closer.
    pub fn enqueue(&self, tabs: Vec<(u32, TabHandle)>) {
        let _ = self.tx.send(tabs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserContextHandle, CookieJar, ProxySettings};
    use crate::coordinator::MemoryCoordinator;
    use crate::events::{CrawlEventBus, EventBusConfig};
    use async_trait::async_trait;

    struct CountingCloseDriver {
        closed: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl BrowserDriver for CountingCloseDriver {
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
            Ok(TabHandle(0))
        }
        async fn close_tab(&self, tab: TabHandle) -> anyhow::Result<()> {
            self.closed.lock().unwrap().push(tab.0 as u32);
            Ok(())
        }
        async fn list_tabs(&self) -> anyhow::Result<Vec<TabHandle>> {
            Ok(vec![])
        }
        async fn tab_url(&self, _: TabHandle) -> anyhow::Result<String> {
            Ok(String::new())
        }
        async fn evaluate(&self, _: TabHandle, _: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!(null))
        }
        async fn read_cookies(&self, _: BrowserContextHandle) -> anyhow::Result<CookieJar> {
            Ok(vec![])
        }
        async fn write_cookies(&self, _: BrowserContextHandle, _: CookieJar) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn batch_closer_defers_close_until_history_window_slides() {
        let closed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver: Arc<dyn BrowserDriver> = Arc::new(CountingCloseDriver { closed: closed.clone() });
        let closer = BatchCloser::spawn(driver);

        // With CLOSED_BATCH_HISTORY == 2, the first two enqueued batches stay
        // pending until a third arrives and pushes the oldest out.
        closer.enqueue(vec![(1, TabHandle(1))]);
        closer.enqueue(vec![(2, TabHandle(2))]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(closed.lock().unwrap().is_empty(), "batches within the history window stay open");

        closer.enqueue(vec![(3, TabHandle(3))]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*closed.lock().unwrap(), vec![1], "oldest batch closes once a third arrives");
    }

    #[tokio::test]
    async fn drain_wait_publishes_rebalanced_event_and_converges() {
        let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
        let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));
        let mut rx = events.subscribe();

        backend.set(&keys::product_pages(1), "[1,2,3,4]").await.unwrap();
        backend.set(&keys::product_pages(2), "[]").await.unwrap();

        // Drain worker 1's remaining half on the next poll so the loop terminates.
        let drain_backend = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drain_backend.set(&keys::product_pages(1), "[]").await.unwrap();
            drain_backend.set(&keys::product_pages(2), "[]").await.unwrap();
        });

        let config = {
            unsafe {
                std::env::set_var("ROLE", "general");
                std::env::set_var("WORKER_ID", "1");
                std::env::set_var("COORDINATOR_ENDPOINT", "http://localhost:9000");
                std::env::set_var("SITE_BASE_URL", "https://example.com");
                std::env::set_var("LISTING_URL_TEMPLATE", "https://example.com/list?page={page}");
                std::env::set_var("BATCH_POLL_INTERVAL_SECS", "0");
            }
            crate::config::load_from_env().unwrap()
        };

        wait_for_batch_drain(&backend, &config, &events, &[1, 2]).await.unwrap();

        let published = rx.try_recv().expect("rebalance event published");
        match published {
            CrawlEvent::Rebalanced { from, to, page_count, .. } => {
                assert_eq!(from, "1");
                assert_eq!(to, "2");
                assert_eq!(page_count, 2);
            }
            other => panic!("expected Rebalanced event, got {other:?}"),
        }
    }

    #[test]
    fn splits_range_into_fixed_size_windows() {
        let batches = batches_for_range(1, 120, 50);
        assert_eq!(batches, vec![(1, 50), (51, 100), (101, 120)]);
    }

    #[test]
    fn single_window_when_range_smaller_than_batch_size() {
        assert_eq!(batches_for_range(1, 30, 50), vec![(1, 30)]);
    }

    #[test]
    fn empty_range_yields_no_batches() {
        assert!(batches_for_range(5, 4, 50).is_empty());
    }

    #[test]
    fn round_robin_distributes_by_position() {
        let assignment = assign_pages_round_robin(1, 6, &[1, 2]);
        assert_eq!(assignment[&1], vec![1, 3, 5]);
        assert_eq!(assignment[&2], vec![2, 4, 6]);
    }

    #[test]
    fn round_robin_with_no_workers_is_empty() {
        assert!(assign_pages_round_robin(1, 10, &[]).is_empty());
    }

    #[test]
    fn round_robin_covers_every_page_exactly_once() {
        let assignment = assign_pages_round_robin(1, 50, &[1, 2, 3]);
        let mut all: Vec<u32> = assignment.values().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (1..=50).collect::<Vec<_>>());
    }
}
