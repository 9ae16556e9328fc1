//! Extraction: turns a listing tab (or a raw HTML snapshot in tests) into
//! typed [`ListingRecord`]s (§4.8, §6c).

pub mod extractor;
pub mod js_scripts;
pub mod record;

pub use extractor::{ChromiumListingExtractor, ExtractionSource, HtmlListingExtractor, ListingExtractor};
pub use record::ListingRecord;
