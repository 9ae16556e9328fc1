//! Product worker (§4.5): per-instance extractor. Heartbeats, consumes page
//! numbers assigned to it, locates the corresponding tab owned by a General
//! worker, extracts listing records, persists them, marks completion.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::browser::{BrowserDriver, TabHandle};
use crate::config::AppConfig;
use crate::coordinator::{CoordinatorBackend, LockGuard, keys, value};
use crate::events::{CrawlEvent, CrawlEventBus, ExtractionStatus};
use crate::extraction::{ExtractionSource, ListingExtractor, ListingRecord};
use crate::heartbeat::{cleanup_keys, heartbeat_loop, lock_refresh_loop};
use crate::manager::membership;
use crate::persistence::{CrawlEventRecord, EventStatus, ListingStore};

/// Acquire the `product/<id>` lock and run until shutdown. A failed acquire
/// is fatal to the process (§7).
#[allow(clippy::too_many_arguments)]
pub async fn run(
    id: u32,
    backend: Arc<dyn CoordinatorBackend>,
    config: Arc<AppConfig>,
    driver: Arc<dyn BrowserDriver>,
    extractor: Arc<dyn ListingExtractor>,
    store: Arc<dyn ListingStore>,
    events: Arc<CrawlEventBus>,
) -> anyhow::Result<()> {
    let id_str = id.to_string();
    let lock = Arc::new(LockGuard::new(backend.clone(), "product", &id_str));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE)
        .await
        .map_err(|e| anyhow::anyhow!("failed to acquire product/{id} lock: {e}"))?;
    log::info!("product/{id} lock acquired");
    let _ = events.publish(CrawlEvent::lock_acquired("product", id_str.clone())).await;

    membership::register_id(&backend, keys::workers_product(), id).await;

    let running = Arc::new(AtomicBool::new(true));
    let heartbeat_key = keys::product_heartbeat(id);
    let hb_task = tokio::spawn(heartbeat_loop(
        backend.clone(),
        heartbeat_key.clone(),
        config.heartbeat_interval,
        running.clone(),
    ));
    let refresh_task = tokio::spawn(lock_refresh_loop(lock.clone(), config.lock_refresh_interval, running.clone()));

    let result = run_inner(id, &backend, &config, &driver, &extractor, &store, &events, &lock).await;

    running.store(false, Ordering::Release);
    let _ = hb_task.await;
    let _ = refresh_task.await;

    let pages_key = keys::product_pages(id);
    cleanup_keys(&backend, lock.key(), &heartbeat_key, &[&pages_key]).await;
    lock.release().await;

    result
}

fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_inner(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    config: &Arc<AppConfig>,
    driver: &Arc<dyn BrowserDriver>,
    extractor: &Arc<dyn ListingExtractor>,
    store: &Arc<dyn ListingStore>,
    events: &Arc<CrawlEventBus>,
    lock: &Arc<LockGuard>,
) -> anyhow::Result<()> {
    let mut shutdown = shutdown_signal();

    loop {
        if !lock.is_held() {
            log::warn!("product/{id} lock no longer held; exiting");
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                log::info!("product/{id} received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(config.product_poll_interval) => {}
        }

        let session_ok = matches!(
            value::parse_flag(backend.get(keys::session_valid()).await.unwrap_or(None)),
            value::CoordinatorValue::Present(true)
        );
        if !session_ok {
            log::debug!("product/{id} session not valid; retrying next poll");
            continue;
        }

        if read_pages(backend, id).await.is_empty() {
            // Both pages and crawlTrigger absent/empty: nothing to do this tick.
            continue;
        }

        drain_assigned_pages(id, backend, config, driver, extractor, store, events).await?;

        backend.set(&keys::product_complete(id), "1").await?;
    }

    Ok(())
}

async fn read_pages(backend: &Arc<dyn CoordinatorBackend>, id: u32) -> Vec<u32> {
    let raw = backend.get(&keys::product_pages(id)).await.unwrap_or(None);
    match value::parse_json::<Vec<u32>>(raw) {
        value::CoordinatorValue::Present(pages) => pages,
        _ => Vec::new(),
    }
}

/// Work the assignment list to completion, re-reading before each page so a
/// mid-batch rebalance is picked up (§4.5 "During step 3, re-read...").
#[allow(clippy::too_many_arguments)]
async fn drain_assigned_pages(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    config: &Arc<AppConfig>,
    driver: &Arc<dyn BrowserDriver>,
    extractor: &Arc<dyn ListingExtractor>,
    store: &Arc<dyn ListingStore>,
    events: &Arc<CrawlEventBus>,
) -> anyhow::Result<()> {
    loop {
        let pages = read_pages(backend, id).await;
        let Some(&page) = pages.first() else {
            break;
        };

        match locate_tab_for_page(driver, config, page).await {
            Some(tab) => {
                process_page(id, backend, store, events, extractor, page, tab).await;
            }
            None => {
                log::warn!("product/{id} found no open tab for page {page}; skipping (will be reassigned)");
            }
        }

        pop_page(backend, id, page).await?;
    }

    Ok(())
}

async fn process_page(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    store: &Arc<dyn ListingStore>,
    events: &Arc<CrawlEventBus>,
    extractor: &Arc<dyn ListingExtractor>,
    page: u32,
    tab: TabHandle,
) {
    let records = match extractor.extract(page, ExtractionSource::Tab(tab)).await {
        Ok(records) => records,
        Err(e) => {
            log::warn!("product/{id} extraction failed for page {page}: {e}");
            let _ = store
                .record_event(CrawlEventRecord {
                    identifier: None,
                    url: format!("page={page}"),
                    page_number: page,
                    status: EventStatus::Failed,
                    error: Some(e.to_string()),
                })
                .await;
            let _ = events
                .publish(CrawlEvent::record_extracted(id.to_string(), page, None, ExtractionStatus::Failed))
                .await;
            return;
        }
    };

    if let Err(e) = reconcile_page(store, page, &records).await {
        log::warn!("product/{id} failed to reconcile page {page}: {e}");
        return;
    }

    for record in &records {
        let outcome = store.upsert_record(record).await;
        let status = if outcome.is_ok() { EventStatus::Success } else { EventStatus::Failed };
        let error = outcome.as_ref().err().map(ToString::to_string);
        let _ = store
            .record_event(CrawlEventRecord {
                identifier: Some(record.id.clone()),
                url: record.url.clone(),
                page_number: page,
                status,
                error,
            })
            .await;

        let bus_status = if outcome.is_ok() { ExtractionStatus::Success } else { ExtractionStatus::Failed };
        let _ = events
            .publish(CrawlEvent::record_extracted(id.to_string(), page, Some(record.id.clone()), bus_status))
            .await;

        if let Err(e) = outcome {
            log::warn!("product/{id} upsert failed for record {}: {e}", record.id);
        }
    }
}

/// Delete the page's existing records only if the new identifier set
/// differs from what is already stored (§4.5 step 3).
async fn reconcile_page(store: &Arc<dyn ListingStore>, page: u32, records: &[ListingRecord]) -> anyhow::Result<()> {
    let existing = store.list_by_page(page).await?;
    let existing_ids: BTreeSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let new_ids: BTreeSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

    if existing_ids != new_ids {
        store.delete_by_page(page).await?;
    }
    Ok(())
}

/// Remove `page` from `product/<id>/pages` and write the shortened list
/// back, re-reading first so a concurrent rebalance addition is preserved.
async fn pop_page(backend: &Arc<dyn CoordinatorBackend>, id: u32, page: u32) -> anyhow::Result<()> {
    let mut pages = read_pages(backend, id).await;
    if let Some(pos) = pages.iter().position(|&p| p == page) {
        pages.remove(pos);
    }
    let json = serde_json::to_string(&pages)?;
    backend.set(&keys::product_pages(id), &json).await?;
    Ok(())
}

/// Find an open tab whose URL carries `page=<page_number>`, scanning every
/// context this worker's driver knows about (§4.5 step 3, §4.7).
async fn locate_tab_for_page(
    driver: &Arc<dyn BrowserDriver>,
    config: &Arc<AppConfig>,
    page: u32,
) -> Option<TabHandle> {
    let expected = config.listing_url_for_page(page);
    let tabs = driver.list_tabs().await.ok()?;
    for tab in tabs {
        let Ok(url) = driver.tab_url(tab).await else {
            continue;
        };
        if url == expected || page_param(&url) == Some(page) {
            return Some(tab);
        }
    }
    None
}

fn page_param(raw_url: &str) -> Option<u32> {
    let url = url::Url::parse(raw_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse::<u32>().ok())
}
