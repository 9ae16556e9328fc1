//! Persistence: the SQLite-backed record store Product workers write into
//! (§4.9, §6d).

pub mod store;

pub use store::{CrawlEventRecord, EventStatus, ListingStore, SqliteListingStore};
