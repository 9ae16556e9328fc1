//! Coordination plane for a fleet of browser-driven listing crawlers.
//!
//! One Manager partitions a dynamically discovered page range across N
//! General workers (`manager`, §4.3). Each General worker opens and
//! maintains browser tabs over its assigned range and hands pages off to
//! Product workers (`general`, §4.4), which extract listing records into
//! persistent storage (`product`, §4.5). All coordination runs through a
//! shared key-value store with only single-key atomic primitives
//! (`coordinator`, §4.2).

pub mod browser;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod extraction;
pub mod general;
pub mod heartbeat;
pub mod manager;
pub mod persistence;
pub mod product;
pub mod retry;
pub mod session;
pub mod types;
pub mod utils;

pub use config::AppConfig;
pub use coordinator::{CoordinatorBackend, CoordinatorClient};
pub use events::CrawlEventBus;
pub use types::PageRange;
