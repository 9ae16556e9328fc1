//! Product worker binary: consumes assigned pages, extracts listing
//! records, and persists them (§4.5).

use std::sync::Arc;

use listing_crawl_coordinator::browser::{BrowserDriver, ChromiumBrowserDriver};
use listing_crawl_coordinator::config::{self, WorkerRole};
use listing_crawl_coordinator::coordinator::{CoordinatorBackend, CoordinatorClient};
use listing_crawl_coordinator::events::{CrawlEventBus, EventBusConfig};
use listing_crawl_coordinator::extraction::{ChromiumListingExtractor, ListingExtractor};
use listing_crawl_coordinator::persistence::{ListingStore, SqliteListingStore};
use listing_crawl_coordinator::product;

#[tokio::main]
async fn main() {
    let config = match config::load_from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("product-worker: configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    // A single `tracing_subscriber` init also bridges the `log` facade (used
    // throughout the coordination core) via `tracing-log`; a second,
    // independent `env_logger::init()` would panic on the already-set logger.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&config.log_verbosity).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let WorkerRole::Product(id) = config.role else {
        log::error!("product-worker: ROLE must be 'product' (got {:?})", config.role);
        std::process::exit(1);
    };

    let backend: Arc<dyn CoordinatorBackend> = Arc::new(CoordinatorClient::new(&config.coordinator_endpoint));
    let driver: Arc<dyn BrowserDriver> = ChromiumBrowserDriver::new(
        config.headless,
        config.site_base_url.clone(),
        config.service_unavailable_backoff,
    );
    let extractor: Arc<dyn ListingExtractor> = Arc::new(ChromiumListingExtractor::new(driver.clone()));
    let store: Arc<dyn ListingStore> = match SqliteListingStore::open(&config.persistence_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("product-worker/{id}: failed to open persistence store: {e:#}");
            std::process::exit(1);
        }
    };
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));

    if let Err(e) = product::run(id, backend, config, driver, extractor, store, events).await {
        log::error!("product-worker/{id} exiting: {e:#}");
        std::process::exit(1);
    }
}
