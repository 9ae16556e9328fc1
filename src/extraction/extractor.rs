//! The `ListingExtractor` trait (§4.8) and its two implementations: a
//! live-tab evaluator driving a [`crate::browser::BrowserDriver`], and a
//! `scraper`-based fallback over a raw HTML snapshot for extraction unit
//! tests that don't need a live browser.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::browser::{BrowserDriver, TabHandle};

use super::js_scripts::listing_script_for_page;
use super::record::ListingRecord;

#[async_trait]
pub trait ListingExtractor: Send + Sync {
    async fn extract(&self, page_number: u32, source: ExtractionSource) -> anyhow::Result<Vec<ListingRecord>>;
}

/// Where a [`ListingExtractor`] should pull the listing DOM from.
pub enum ExtractionSource<'a> {
    Tab(TabHandle),
    Html(&'a str),
}

/// Evaluates [`listing_script_for_page`] in a live tab via a `BrowserDriver`.
pub struct ChromiumListingExtractor {
    driver: Arc<dyn BrowserDriver>,
}

impl ChromiumListingExtractor {
    #[must_use]
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl ListingExtractor for ChromiumListingExtractor {
    async fn extract(&self, page_number: u32, source: ExtractionSource<'_>) -> anyhow::Result<Vec<ListingRecord>> {
        let ExtractionSource::Tab(tab) = source else {
            anyhow::bail!("ChromiumListingExtractor requires ExtractionSource::Tab");
        };
        let script = listing_script_for_page(page_number);
        let value = self.driver.evaluate(tab, &script).await?;
        let records: Vec<ListingRecord> = serde_json::from_value(value)?;
        Ok(records)
    }
}

/// Parses a raw HTML snapshot with `scraper`, mirroring the JS selector
/// contract (`[data-listing-id]` elements) without a live browser. Used by
/// extraction unit tests.
#[derive(Default)]
pub struct HtmlListingExtractor;

#[async_trait]
impl ListingExtractor for HtmlListingExtractor {
    async fn extract(&self, page_number: u32, source: ExtractionSource<'_>) -> anyhow::Result<Vec<ListingRecord>> {
        let ExtractionSource::Html(html) = source else {
            anyhow::bail!("HtmlListingExtractor requires ExtractionSource::Html");
        };

        let document = Html::parse_document(html);
        let item_selector = Selector::parse("[data-listing-id]")
            .map_err(|e| anyhow::anyhow!("invalid selector: {e:?}"))?;
        let title_selector = Selector::parse("[data-listing-title]")
            .map_err(|e| anyhow::anyhow!("invalid selector: {e:?}"))?;
        let link_selector =
            Selector::parse("a[href]").map_err(|e| anyhow::anyhow!("invalid selector: {e:?}"))?;
        let img_selector =
            Selector::parse("img[src]").map_err(|e| anyhow::anyhow!("invalid selector: {e:?}"))?;

        let mut records = Vec::new();
        for el in document.select(&item_selector) {
            let Some(id) = el.value().attr("data-listing-id") else {
                continue;
            };

            let title = el
                .select(&title_selector)
                .next()
                .map(|t| t.text().collect::<String>())
                .unwrap_or_else(|| el.text().collect::<String>())
                .trim()
                .to_string();

            let url = el
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default()
                .to_string();

            let price_minor_units = el
                .value()
                .attr("data-price-minor-units")
                .and_then(|v| v.parse::<i64>().ok());
            let currency = el.value().attr("data-currency").map(str::to_string);
            let rating = el.value().attr("data-rating").and_then(|v| v.parse::<f32>().ok());
            let rating_count = el
                .value()
                .attr("data-rating-count")
                .and_then(|v| v.parse::<u32>().ok());

            let image_urls = el
                .select(&img_selector)
                .filter_map(|img| img.value().attr("src"))
                .map(str::to_string)
                .collect();

            records.push(ListingRecord {
                id: id.to_string(),
                url,
                title,
                page: page_number,
                price_minor_units,
                currency,
                rating,
                rating_count,
                image_urls,
            });
        }

        Ok(records)
    }
}
