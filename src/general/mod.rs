//! General worker (§4.4): per-instance browser driver that discovers the
//! total page count, heartbeats, reads its assigned range, opens tabs in
//! batches, triggers Product workers, and manages the batch lifecycle and
//! session-cookie fan-out.

pub mod batch;
pub mod discovery;
pub mod rebalance;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::browser::{BrowserContextHandle, BrowserDriver, ProxySettings, TabHandle};
use crate::config::AppConfig;
use crate::coordinator::{CoordinatorBackend, LockGuard, keys, value};
use crate::events::{CrawlEvent, CrawlEventBus};
use crate::heartbeat::{cleanup_keys, heartbeat_loop, lock_refresh_loop};
use crate::manager::membership;
use crate::session;
use crate::types::PageRange;

/// Acquire the `general/<id>` lock and run until shutdown. A failed
/// acquire is fatal to the process (§7).
pub async fn run(
    id: u32,
    backend: Arc<dyn CoordinatorBackend>,
    config: Arc<AppConfig>,
    driver: Arc<dyn BrowserDriver>,
    events: Arc<CrawlEventBus>,
) -> anyhow::Result<()> {
    let id_str = id.to_string();
    let lock = Arc::new(LockGuard::new(backend.clone(), "general", &id_str));
    lock.acquire(AppConfig::LOCK_TTL, AppConfig::LOCK_STALE)
        .await
        .map_err(|e| anyhow::anyhow!("failed to acquire general/{id} lock: {e}"))?;
    log::info!("general/{id} lock acquired");
    let _ = events.publish(CrawlEvent::lock_acquired("general", id_str.clone())).await;

    membership::register_id(&backend, keys::workers_general(), id).await;

    let running = Arc::new(AtomicBool::new(true));
    let heartbeat_key = keys::general_heartbeat(id);
    let hb_task = tokio::spawn(heartbeat_loop(
        backend.clone(),
        heartbeat_key.clone(),
        config.heartbeat_interval,
        running.clone(),
    ));
    let refresh_task = tokio::spawn(lock_refresh_loop(lock.clone(), config.lock_refresh_interval, running.clone()));

    let result = run_inner(id, &backend, &config, &driver, &events, &lock).await;

    running.store(false, Ordering::Release);
    let _ = hb_task.await;
    let _ = refresh_task.await;

    let processing_key = keys::general_processing(id);
    cleanup_keys(&backend, lock.key(), &heartbeat_key, &[&processing_key]).await;
    lock.release().await;

    result
}

fn shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

struct Session {
    ctx: BrowserContextHandle,
    anchor_tab: TabHandle,
    verified: bool,
}

async fn open_session(
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    config: &Arc<AppConfig>,
) -> anyhow::Result<Session> {
    let proxy = config.proxy.as_ref().map(|p| ProxySettings {
        server: p.server.clone(),
        username: p.username.clone(),
        password: p.password.clone(),
    });
    let ctx = driver.open_context(proxy, Vec::new()).await?;
    let anchor_tab = driver.open_tab(ctx, &config.listing_url_for_page(1)).await?;
    let _ = session::install_shared_cookies(backend, driver, ctx).await;
    Ok(Session {
        ctx,
        anchor_tab,
        verified: false,
    })
}

/// Attempt to verify the shared session, waiting for interactive login on
/// failure (§4.6 step 3). Returns true once verified.
async fn ensure_logged_in(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    driver: &Arc<dyn BrowserDriver>,
    config: &Arc<AppConfig>,
    events: &Arc<CrawlEventBus>,
    session: &mut Session,
) -> anyhow::Result<bool> {
    if session.verified {
        return Ok(true);
    }

    let state = session::verify_and_publish(backend, driver, session.ctx, &config.signed_in_check_script).await?;
    if state == session::SessionState::Valid {
        session.verified = true;
        let _ = events.publish(CrawlEvent::session_published(id.to_string())).await;
        return Ok(true);
    }

    let _ = events.publish(CrawlEvent::session_invalidated()).await;
    log::warn!("general/{id} session invalid; waiting up to {:?} for interactive login", AppConfig::SESSION_LOGIN_WAIT);

    let logged_in = session::wait_for_interactive_login(backend, AppConfig::SESSION_LOGIN_WAIT, config.batch_poll_interval).await;
    if !logged_in {
        log::warn!("general/{id} still not logged in; will retry next poll");
        return Ok(false);
    }

    let state = session::verify_and_publish(backend, driver, session.ctx, &config.signed_in_check_script).await?;
    session.verified = state == session::SessionState::Valid;
    if session.verified {
        let _ = events.publish(CrawlEvent::session_published(id.to_string())).await;
    }
    Ok(session.verified)
}

async fn run_inner(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    config: &Arc<AppConfig>,
    driver: &Arc<dyn BrowserDriver>,
    events: &Arc<CrawlEventBus>,
    lock: &Arc<LockGuard>,
) -> anyhow::Result<()> {
    let mut session: Option<Session> = None;
    let mut last_completed_range: Option<PageRange> = None;
    let mut shutdown = shutdown_signal();
    let closer = batch::BatchCloser::spawn(driver.clone());

    loop {
        if !lock.is_held() {
            log::warn!("general/{id} lock no longer held; exiting");
            break;
        }

        tokio::select! {
            _ = &mut shutdown => {
                log::info!("general/{id} received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(config.general_poll_interval) => {}
        }

        if session.is_none() {
            session = Some(open_session(backend, driver, config).await?);
        }
        let sess = session.as_mut().expect("just ensured Some");

        match ensure_logged_in(id, backend, driver, config, events, sess).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                log::warn!("general/{id} login check failed: {e}");
                continue;
            }
        }

        if let Err(e) = discovery::discover_and_publish(backend, driver, sess.anchor_tab).await {
            log::warn!("general/{id} totals discovery failed: {e}");
        }

        let raw = backend.get(&keys::general_pages(id)).await.unwrap_or(None);
        let assigned = match value::parse_json::<PageRange>(raw) {
            value::CoordinatorValue::Present(r) => Some(r),
            value::CoordinatorValue::Absent => None,
            value::CoordinatorValue::Invalid(v) => {
                log::warn!("general/{id} pages value invalid ('{v}'); waiting for reassignment");
                None
            }
        };

        let Some(range) = assigned else {
            continue;
        };

        let complete = matches!(
            value::parse_flag(backend.get(&keys::general_complete(id)).await.unwrap_or(None)),
            value::CoordinatorValue::Present(true)
        );
        if complete && last_completed_range == Some(range) {
            continue;
        }

        backend.set(&keys::general_processing(id), "1").await?;
        backend.delete(&keys::general_complete(id)).await?;

        run_assignment(id, backend, config, driver, events, &closer, sess, range).await?;

        backend.set(&keys::general_complete(id), "1").await?;
        backend.delete(&keys::general_processing(id)).await?;
        last_completed_range = Some(range);
        log::info!("general/{id} completed assignment [{},{}]", range.start, range.end);
    }

    if let Some(sess) = session {
        let _ = driver.close_context(sess.ctx).await;
    }
    Ok(())
}

/// Drive the batch loop (§4.4) over the full assigned `[start,end]` range.
#[allow(clippy::too_many_arguments)]
async fn run_assignment(
    id: u32,
    backend: &Arc<dyn CoordinatorBackend>,
    config: &Arc<AppConfig>,
    driver: &Arc<dyn BrowserDriver>,
    events: &Arc<CrawlEventBus>,
    closer: &batch::BatchCloser,
    session: &mut Session,
    range: PageRange,
) -> anyhow::Result<()> {
    let windows = batch::batches_for_range(range.start, range.end, config.tabs_per_batch);

    // A new context per batch forces a new outbound session through the
    // configured proxy (§4.4 "Proxy rotation"), a coarse-grained knob
    // orthogonal to the coordination core.
    let rotate_context_per_batch = config.proxy.is_some();

    for (bs, be) in windows {
        let _ = events.publish(CrawlEvent::batch_opened(id.to_string(), bs, be)).await;
        let start = std::time::Instant::now();

        if rotate_context_per_batch {
            let _ = driver.close_context(session.ctx).await;
            *session = open_session(backend, driver, config).await?;
            session.verified = true; // cookies already confirmed this assignment; reinstall only.
            let _ = session::install_shared_cookies(backend, driver, session.ctx).await;
        }

        let outcome = batch::run_batch(backend, driver, config, events, session.ctx, id, bs, be).await?;
        closer.enqueue(outcome.tabs);

        let _ = events
            .publish(CrawlEvent::batch_completed(id.to_string(), bs, be, start.elapsed()))
            .await;
    }

    Ok(())
}
