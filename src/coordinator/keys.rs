//! Typed key-name builders for the coordinator keyspace (§3).
//!
//! Keeping every key name behind a function avoids typos scattered across
//! `manager`, `general`, and `product` (a bare string at every call site
//! is how a namespace like this rots).

pub fn total_pages() -> &'static str {
    "totalPages"
}

pub fn total_products() -> &'static str {
    "totalProducts"
}

pub fn general_heartbeat(id: u32) -> String {
    format!("general/{id}/heartbeat")
}

pub fn product_heartbeat(id: u32) -> String {
    format!("product/{id}/heartbeat")
}

pub fn general_pages(id: u32) -> String {
    format!("general/{id}/pages")
}

pub fn general_complete(id: u32) -> String {
    format!("general/{id}/complete")
}

pub fn general_processing(id: u32) -> String {
    format!("general/{id}/processing")
}

pub fn product_pages(id: u32) -> String {
    format!("product/{id}/pages")
}

pub fn product_complete(id: u32) -> String {
    format!("product/{id}/complete")
}

pub fn tabs_ready() -> &'static str {
    "tabsReady"
}

pub fn crawl_trigger() -> &'static str {
    "crawlTrigger"
}

pub fn batch_start() -> &'static str {
    "batch/start"
}

pub fn batch_end() -> &'static str {
    "batch/end"
}

pub fn batch_complete() -> &'static str {
    "batchComplete"
}

pub fn rotation_index() -> &'static str {
    "rotation/index"
}

pub fn rotation_last_assigned_page() -> &'static str {
    "rotation/lastAssignedPage"
}

pub fn session_cookies() -> &'static str {
    "session/cookies"
}

pub fn session_valid() -> &'static str {
    "session/valid"
}

pub fn lock(role: &str, id: &str) -> String {
    format!("lock/{role}-{id}")
}

pub fn workers_general() -> &'static str {
    "workers/general"
}

pub fn workers_product() -> &'static str {
    "workers/product"
}
