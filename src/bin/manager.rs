//! Manager binary: loads config, wires up the coordinator client, and runs
//! the partitioning tick loop (§4.3). A lock-acquire failure is fatal (§7).

use std::sync::Arc;

use listing_crawl_coordinator::config;
use listing_crawl_coordinator::coordinator::{CoordinatorBackend, CoordinatorClient};
use listing_crawl_coordinator::events::{CrawlEventBus, EventBusConfig};
use listing_crawl_coordinator::manager;

#[tokio::main]
async fn main() {
    let config = match config::load_from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("manager: configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    // A single `tracing_subscriber` init also bridges the `log` facade (used
    // throughout the coordination core) via `tracing-log`; a second,
    // independent `env_logger::init()` would panic on the already-set logger.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(&config.log_verbosity).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let backend: Arc<dyn CoordinatorBackend> = Arc::new(CoordinatorClient::new(&config.coordinator_endpoint));
    let events = Arc::new(CrawlEventBus::with_config(EventBusConfig::default()));

    if let Err(e) = manager::run(backend, config, events).await {
        log::error!("manager exiting: {e:#}");
        std::process::exit(1);
    }
}
