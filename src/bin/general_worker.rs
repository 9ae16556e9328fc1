//! General worker binary: discovers total pages, heartbeats, runs the
//! batch loop, and manages session-cookie fan-out (§4.4).

use std::sync::Arc;

use listing_crawl_coordinator::browser::{BrowserDriver, ChromiumBrowserDriver};
use listing_crawl_coordinator::config::{self, WorkerRole};
use listing_crawl_coordinator::coordinator::{CoordinatorBackend, CoordinatorClient};
use listing_crawl_coordinator::events::{CrawlEventBus, EventBusConfig};
use listing_crawl_coordinator::general;

#[tokio::main]
async fn main() {
    let config = match config::load_from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("general-worker: configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    // A single `tracing_subscriber` init also bridges the `log` facade (used
    // throughout the coordination core) via `tracing-log`; a second,
    // independent `env_logger::init()` would panic on the already-set logger.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&config.log_verbosity).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let WorkerRole::General(id) = config.role else {
        log::error!("general-worker: ROLE must be 'general' (got {:?})", config.role);
        std::process::exit(1);
    };

    let backend: Arc<dyn CoordinatorBackend> = Arc::new(CoordinatorClient::new(&config.coordinator_endpoint));
    let driver: Arc<dyn BrowserDriver> = ChromiumBrowserDriver::new(
        config.headless,
        config.site_base_url.clone(),
        config.service_unavailable_backoff,
    );
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));

    if let Err(e) = general::run(id, backend, config, driver, events).await {
        log::error!("general-worker/{id} exiting: {e:#}");
        std::process::exit(1);
    }
}
