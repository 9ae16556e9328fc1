//! The `ListingStore` trait and its SQLite-backed implementation: WAL mode, a
//! bounded connection pool, and idempotent `CREATE TABLE IF NOT EXISTS`
//! migrations run on open.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::extraction::ListingRecord;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    page INTEGER NOT NULL,
    price_minor_units INTEGER,
    currency TEXT,
    rating REAL,
    rating_count INTEGER,
    image_urls TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_listings_page ON listings(page);

CREATE TABLE IF NOT EXISTS crawl_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT,
    url TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    occurred_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_events_page ON crawl_events(page_number);
"#;

/// Extraction-or-navigation outcome recorded for one URL (§6d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Success,
    Failed,
}

impl EventStatus {
    fn as_str(self) -> &'static str {
        match self {
            EventStatus::Success => "success",
            EventStatus::Failed => "failed",
        }
    }
}

/// An append-only audit record (§6d `recordEvent`).
#[derive(Debug, Clone)]
pub struct CrawlEventRecord {
    pub identifier: Option<String>,
    pub url: String,
    pub page_number: u32,
    pub status: EventStatus,
    pub error: Option<String>,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Idempotent by `record.id`.
    async fn upsert_record(&self, record: &ListingRecord) -> Result<()>;
    async fn list_by_page(&self, page_number: u32) -> Result<Vec<ListingRecord>>;
    /// Returns the number of rows deleted.
    async fn delete_by_page(&self, page_number: u32) -> Result<u64>;
    async fn record_event(&self, event: CrawlEventRecord) -> Result<()>;
}

/// SQLite-backed [`ListingStore`], opened in WAL mode.
#[derive(Clone)]
pub struct SqliteListingStore {
    pool: SqlitePool,
}

impl SqliteListingStore {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create persistence directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("failed to open listings database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize listings schema")?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory listings database")?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[async_trait]
impl ListingStore for SqliteListingStore {
    async fn upsert_record(&self, record: &ListingRecord) -> Result<()> {
        let image_urls = serde_json::to_string(&record.image_urls)?;
        sqlx::query(
            r"
            INSERT INTO listings (id, url, title, page, price_minor_units, currency, rating, rating_count, image_urls, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                page = excluded.page,
                price_minor_units = excluded.price_minor_units,
                currency = excluded.currency,
                rating = excluded.rating,
                rating_count = excluded.rating_count,
                image_urls = excluded.image_urls,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(&record.title)
        .bind(record.page)
        .bind(record.price_minor_units)
        .bind(&record.currency)
        .bind(record.rating)
        .bind(record.rating_count)
        .bind(image_urls)
        .bind(now_epoch_secs())
        .execute(&self.pool)
        .await
        .context("failed to upsert listing record")?;
        Ok(())
    }

    async fn list_by_page(&self, page_number: u32) -> Result<Vec<ListingRecord>> {
        let rows = sqlx::query(
            "SELECT id, url, title, page, price_minor_units, currency, rating, rating_count, image_urls FROM listings WHERE page = ?",
        )
        .bind(page_number)
        .fetch_all(&self.pool)
        .await
        .context("failed to query listings by page")?;

        rows.into_iter()
            .map(|row| {
                let image_urls_raw: String = row.try_get("image_urls")?;
                let image_urls = serde_json::from_str(&image_urls_raw).unwrap_or_default();
                Ok(ListingRecord {
                    id: row.try_get("id")?,
                    url: row.try_get("url")?,
                    title: row.try_get("title")?,
                    page: row.try_get::<i64, _>("page")? as u32,
                    price_minor_units: row.try_get("price_minor_units")?,
                    currency: row.try_get("currency")?,
                    rating: row.try_get("rating")?,
                    rating_count: row.try_get("rating_count")?,
                    image_urls,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .context("failed to decode listing rows")
    }

    async fn delete_by_page(&self, page_number: u32) -> Result<u64> {
        let result = sqlx::query("DELETE FROM listings WHERE page = ?")
            .bind(page_number)
            .execute(&self.pool)
            .await
            .context("failed to delete listings by page")?;
        Ok(result.rows_affected())
    }

    async fn record_event(&self, event: CrawlEventRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawl_events (identifier, url, page_number, status, error, occurred_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.identifier)
        .bind(&event.url)
        .bind(event.page_number)
        .bind(event.status.as_str())
        .bind(&event.error)
        .bind(now_epoch_secs())
        .execute(&self.pool)
        .await
        .context("failed to record crawl event")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, page: u32) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            url: format!("https://example.com/item/{id}"),
            title: "Title".to_string(),
            page,
            price_minor_units: Some(1000),
            currency: Some("USD".to_string()),
            rating: Some(4.0),
            rating_count: Some(10),
            image_urls: vec!["https://example.com/a.jpg".to_string()],
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let store = SqliteListingStore::open_in_memory().await.unwrap();
        store.upsert_record(&sample("ab12cd34EF", 1)).await.unwrap();

        let mut updated = sample("ab12cd34EF", 1);
        updated.title = "New Title".to_string();
        store.upsert_record(&updated).await.unwrap();

        let records = store.list_by_page(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "New Title");
    }

    #[tokio::test]
    async fn delete_by_page_removes_only_that_page() {
        let store = SqliteListingStore::open_in_memory().await.unwrap();
        store.upsert_record(&sample("ab12cd34EF", 1)).await.unwrap();
        store.upsert_record(&sample("zz99yy88XX", 2)).await.unwrap();

        let deleted = store.delete_by_page(1).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.list_by_page(1).await.unwrap().is_empty());
        assert_eq!(store.list_by_page(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_event_is_append_only() {
        let store = SqliteListingStore::open_in_memory().await.unwrap();
        store
            .record_event(CrawlEventRecord {
                identifier: Some("ab12cd34EF".to_string()),
                url: "https://example.com/item/1".to_string(),
                page_number: 1,
                status: EventStatus::Success,
                error: None,
            })
            .await
            .unwrap();
        store
            .record_event(CrawlEventRecord {
                identifier: None,
                url: "https://example.com/item/2".to_string(),
                page_number: 1,
                status: EventStatus::Failed,
                error: Some("timeout".to_string()),
            })
            .await
            .unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_events")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 2);
    }
}
