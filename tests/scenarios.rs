//! Black-box end-to-end scenarios (S1-S6) against an in-memory coordinator
//! double, driven entirely through the crate's public API: no toolchain is
//! run as part of this crate's own development, so these exercise the real
//! `manager`/`general`/`product`/`session` entry points rather than private
//! helpers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use listing_crawl_coordinator::browser::{BrowserContextHandle, BrowserDriver, CookieJar, ProxySettings, TabHandle};
use listing_crawl_coordinator::coordinator::{CoordinatorBackend, MemoryCoordinator};
use listing_crawl_coordinator::events::{CrawlEventBus, EventBusConfig};
use listing_crawl_coordinator::extraction::{ChromiumListingExtractor, ListingExtractor};
use listing_crawl_coordinator::general;
use listing_crawl_coordinator::manager::{ManagerTick, membership};
use listing_crawl_coordinator::persistence::{ListingStore, SqliteListingStore};
use listing_crawl_coordinator::session;
use listing_crawl_coordinator::{AppConfig, PageRange};
use listing_crawl_coordinator::coordinator::{LockGuard, keys};

/// An in-memory `BrowserDriver` stub: tracks opened tabs by URL and answers
/// `evaluate` with a fixed JSON value, the same shape the unit tests in
/// `product::tests`/`general::tests` use.
struct TestDriver {
    next_tab: AtomicU64,
    tab_urls: DashMap<u64, String>,
    eval_response: serde_json::Value,
}

impl TestDriver {
    fn new(eval_response: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            next_tab: AtomicU64::new(1),
            tab_urls: DashMap::new(),
            eval_response,
        })
    }
}

#[async_trait]
impl BrowserDriver for TestDriver {
    async fn open_context(&self, _: Option<ProxySettings>, _: CookieJar) -> anyhow::Result<BrowserContextHandle> {
        Ok(BrowserContextHandle(1))
    }
    async fn close_context(&self, _: BrowserContextHandle) -> anyhow::Result<()> {
        Ok(())
    }
    async fn list_contexts(&self) -> anyhow::Result<Vec<BrowserContextHandle>> {
        Ok(vec![BrowserContextHandle(1)])
    }
    async fn open_tab(&self, _: BrowserContextHandle, url: &str) -> anyhow::Result<TabHandle> {
        let id = self.next_tab.fetch_add(1, Ordering::Relaxed);
        self.tab_urls.insert(id, url.to_string());
        Ok(TabHandle(id))
    }
    async fn close_tab(&self, tab: TabHandle) -> anyhow::Result<()> {
        self.tab_urls.remove(&tab.0);
        Ok(())
    }
    async fn list_tabs(&self) -> anyhow::Result<Vec<TabHandle>> {
        Ok(self.tab_urls.iter().map(|e| TabHandle(*e.key())).collect())
    }
    async fn tab_url(&self, tab: TabHandle) -> anyhow::Result<String> {
        Ok(self.tab_urls.get(&tab.0).map(|e| e.value().clone()).unwrap_or_default())
    }
    async fn evaluate(&self, _: TabHandle, _: &str) -> anyhow::Result<serde_json::Value> {
        Ok(self.eval_response.clone())
    }
    async fn read_cookies(&self, _: BrowserContextHandle) -> anyhow::Result<CookieJar> {
        Ok(vec![])
    }
    async fn write_cookies(&self, _: BrowserContextHandle, _: CookieJar) -> anyhow::Result<()> {
        Ok(())
    }
}

fn env_config() {
    unsafe {
        std::env::set_var("COORDINATOR_ENDPOINT", "http://localhost:9000");
        std::env::set_var("SITE_BASE_URL", "https://example.com");
        std::env::set_var("LISTING_URL_TEMPLATE", "https://example.com/list?page={page}");
        std::env::set_var("BATCH_POLL_INTERVAL_SECS", "0");
        std::env::set_var("GENERAL_POLL_INTERVAL_SECS", "0");
        std::env::set_var("PRODUCT_POLL_INTERVAL_SECS", "0");
    }
}

fn manager_config() -> Arc<AppConfig> {
    env_config();
    unsafe { std::env::set_var("ROLE", "manager") };
    Arc::new(listing_crawl_coordinator::config::load_from_env().unwrap())
}

fn worker_config(role: &str, id: u32) -> Arc<AppConfig> {
    env_config();
    unsafe {
        std::env::set_var("ROLE", role);
        std::env::set_var("WORKER_ID", id.to_string());
    }
    Arc::new(listing_crawl_coordinator::config::load_from_env().unwrap())
}

async fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

async fn seed_live_general(backend: &Arc<dyn CoordinatorBackend>, id: u32) {
    let now = now_millis().await;
    backend.set(&keys::general_heartbeat(id), &now.to_string()).await.unwrap();
    membership::register_id(backend, keys::workers_general(), id).await;
}

async fn seed_live_product(backend: &Arc<dyn CoordinatorBackend>, id: u32) {
    let now = now_millis().await;
    backend.set(&keys::product_heartbeat(id), &now.to_string()).await.unwrap();
    membership::register_id(backend, keys::workers_product(), id).await;
}

/// S1: cold start, even-distribution mode — a fresh Manager tick splits the
/// discovered page range evenly across every live General worker.
#[tokio::test]
async fn s1_cold_start_even_mode_splits_range_across_live_workers() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    let config = manager_config();
    backend.set(keys::total_pages(), "100").await.unwrap();
    seed_live_general(&backend, 1).await;
    seed_live_general(&backend, 2).await;

    let lock = Arc::new(LockGuard::new(backend.clone(), "manager", "1"));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE).await.unwrap();
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));
    let tick = ManagerTick::new(backend.clone(), config, lock, events);
    tick.run().await;

    let p1: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap();
    let p2: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(2)).await.unwrap().unwrap()).unwrap();
    assert_eq!(p1, PageRange::new(1, 50));
    assert_eq!(p2, PageRange::new(51, 100));
}

/// S2: a General worker that registers after the first tick is picked up
/// and folded into the next reassignment once the first completes.
#[tokio::test]
async fn s2_worker_joining_after_first_tick_gets_a_share_next_tick() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    let config = manager_config();
    backend.set(keys::total_pages(), "100").await.unwrap();
    seed_live_general(&backend, 1).await;

    let lock = Arc::new(LockGuard::new(backend.clone(), "manager", "1"));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE).await.unwrap();
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));
    let tick = ManagerTick::new(backend.clone(), config.clone(), lock.clone(), events.clone());
    tick.run().await;

    let solo: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap();
    assert_eq!(solo, PageRange::new(1, 100));

    // Worker 2 joins; worker 1 finishes its (now stale, whole-range) batch.
    seed_live_general(&backend, 2).await;
    backend.set(&keys::general_complete(1), "1").await.unwrap();

    tick.run().await;

    let p1: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap();
    let p2: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(2)).await.unwrap().unwrap()).unwrap();
    assert_eq!(p1, PageRange::new(1, 50));
    assert_eq!(p2, PageRange::new(51, 100));
}

/// S3: a General worker whose heartbeat goes stale drops out of the live
/// set and is excluded from the next assignment.
#[tokio::test]
async fn s3_worker_dying_drops_it_from_the_live_set() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    let config = manager_config();
    backend.set(keys::total_pages(), "100").await.unwrap();
    seed_live_general(&backend, 1).await;
    seed_live_general(&backend, 2).await;

    // Worker 2's heartbeat is far older than `T_LIVE`: it is dead.
    let stale = now_millis().await.saturating_sub(AppConfig::T_LIVE.as_millis() as u64 * 10);
    backend.set(&keys::general_heartbeat(2), &stale.to_string()).await.unwrap();

    let live = membership::live_general_ids(&backend, config.n_max_worker_scan, AppConfig::T_LIVE).await;
    assert_eq!(live, vec![1]);

    let lock = Arc::new(LockGuard::new(backend.clone(), "manager", "1"));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE).await.unwrap();
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));
    let tick = ManagerTick::new(backend.clone(), config, lock, events);
    tick.run().await;

    let p1: PageRange = serde_json::from_str(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap();
    assert_eq!(p1, PageRange::new(1, 100), "the sole surviving worker gets the whole range");
    assert!(backend.get(&keys::general_pages(2)).await.unwrap().is_none());
}

/// S4: round-robin rotation assigns fixed-size slices in turn and resets
/// once the cycle completes the full page range.
#[tokio::test]
async fn s4_rotation_cycle_completes_and_resets() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    env_config();
    unsafe {
        std::env::set_var("ROLE", "manager");
        std::env::set_var("ENABLE_ROUND_ROBIN_ROTATION", "true");
        std::env::set_var("ROTATION_BATCH_SIZE", "40");
    }
    let config = Arc::new(listing_crawl_coordinator::config::load_from_env().unwrap());
    backend.set(keys::total_pages(), "100").await.unwrap();
    seed_live_general(&backend, 1).await;

    let lock = Arc::new(LockGuard::new(backend.clone(), "manager", "1"));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE).await.unwrap();
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));
    let tick = ManagerTick::new(backend.clone(), config, lock, events);

    // Tick 1: [1,40]. Mark complete, tick again: [41,80]. Mark complete, tick
    // again: [81,100]. Mark complete, tick again: cycle resets to 0.
    tick.run().await;
    assert_eq!(
        serde_json::from_str::<PageRange>(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap(),
        PageRange::new(1, 40)
    );
    backend.set(&keys::general_complete(1), "1").await.unwrap();

    tick.run().await;
    assert_eq!(
        serde_json::from_str::<PageRange>(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap(),
        PageRange::new(41, 80)
    );
    backend.set(&keys::general_complete(1), "1").await.unwrap();

    tick.run().await;
    assert_eq!(
        serde_json::from_str::<PageRange>(&backend.get(&keys::general_pages(1)).await.unwrap().unwrap()).unwrap(),
        PageRange::new(81, 100)
    );
    backend.set(&keys::general_complete(1), "1").await.unwrap();

    tick.run().await;
    assert_eq!(backend.get(keys::rotation_last_assigned_page()).await.unwrap(), Some("0".to_string()));
    assert!(backend.get(&keys::general_pages(1)).await.unwrap().is_none(), "cleared on cycle reset");
}

/// S5: a Product worker drains its assigned page list end to end — extract,
/// persist, mark complete — against a real SQLite-backed store.
#[tokio::test]
async fn s5_product_worker_drains_assigned_pages() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    let config = worker_config("product", 1);
    let driver = TestDriver::new(serde_json::json!([{
        "id": "ab12cd34EF",
        "url": "https://example.com/item/1",
        "title": "Example item",
        "page": 3,
        "price_minor_units": 1999,
        "currency": "USD",
        "rating": 4.5,
        "rating_count": 12,
        "image_urls": []
    }]));
    driver.open_tab(BrowserContextHandle(1), "https://example.com/list?page=3").await.unwrap();
    let driver: Arc<dyn BrowserDriver> = driver;
    let extractor: Arc<dyn ListingExtractor> = Arc::new(ChromiumListingExtractor::new(driver.clone()));
    let store: Arc<dyn ListingStore> = Arc::new(SqliteListingStore::open_in_memory().await.unwrap());
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));

    backend.set(keys::session_valid(), "1").await.unwrap();
    backend.set(&keys::product_pages(1), "[3]").await.unwrap();

    let task = tokio::spawn(listing_crawl_coordinator::product::run(
        1,
        backend.clone(),
        config,
        driver,
        extractor,
        store.clone(),
        events,
    ));

    // The worker loop polls every tick (0s poll interval in this config);
    // give it a few ticks to drain, then tear it down.
    for _ in 0..150 {
        if store.list_by_page(3).await.unwrap().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    task.abort();
    let _ = task.await;

    let stored = store.list_by_page(3).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "ab12cd34EF");
    assert!(
        backend.get(&keys::product_pages(1)).await.unwrap().is_none()
            || backend.get(&keys::product_pages(1)).await.unwrap() == Some("[]".to_string())
    );
}

/// S6: session recovery — an invalid session blocks the interactive-login
/// wait until `session/valid` flips, at which point a General worker can
/// re-verify and publish the cookie jar.
#[tokio::test]
async fn s6_session_recovery_unblocks_once_login_completes() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    backend.set(keys::session_valid(), "0").await.unwrap();

    // Flip the flag shortly after the wait starts, simulating a human
    // completing interactive login in another process.
    let flip_backend = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        flip_backend.set(keys::session_valid(), "1").await.unwrap();
    });

    let logged_in = session::wait_for_interactive_login(&backend, Duration::from_secs(5), Duration::from_millis(10)).await;
    assert!(logged_in);

    let driver = TestDriver::new(serde_json::Value::Bool(true));
    driver.open_tab(BrowserContextHandle(1), "https://example.com/list?page=1").await.unwrap();
    let driver: Arc<dyn BrowserDriver> = driver;
    let state = session::verify_and_publish(&backend, &driver, BrowserContextHandle(1), "true").await.unwrap();
    assert_eq!(state, session::SessionState::Valid);
    assert_eq!(backend.get(keys::session_valid()).await.unwrap(), Some("1".to_string()));
}

/// Exercises the General worker's live mid-batch Product-worker pickup
/// (§4.4 edge cases: "New Product workers appearing mid-batch") through the
/// real public `general::batch::run_batch` entry point rather than a stub.
#[tokio::test]
async fn general_batch_picks_up_product_worker_that_joins_mid_batch() {
    let backend: Arc<dyn CoordinatorBackend> = Arc::new(MemoryCoordinator::new());
    let config = worker_config("general", 1);
    let driver: Arc<dyn BrowserDriver> = TestDriver::new(serde_json::json!([]));
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));

    seed_live_product(&backend, 1).await;
    // Worker 1 never drains on its own; worker 2 joins shortly after the
    // batch opens and should receive a share once the live set refreshes.
    let drain_backend = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        seed_live_product(&drain_backend, 2).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        drain_backend.set(&keys::product_pages(1), "[]").await.unwrap();
        drain_backend.set(&keys::product_pages(2), "[]").await.unwrap();
    });

    let ctx = driver.open_context(None, vec![]).await.unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        general::batch::run_batch(&backend, &driver, &config, &events, ctx, 1, 1, 10),
    )
    .await
    .expect("batch drain did not converge in time")
    .unwrap();

    assert_eq!(outcome.tabs.len(), 10);
    assert_eq!(backend.get(keys::batch_complete()).await.unwrap(), Some("1".to_string()));
}
