//! The `ListingRecord` type (§4.8, §6c): what a listing page extraction
//! yields per item.

use serde::{Deserialize, Serialize};

/// A single extracted listing item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// 10-character alphanumeric primary identifier.
    pub id: String,
    pub url: String,
    pub title: String,
    /// 1-based page number this record was found on.
    pub page: u32,
    /// Price in minor units (e.g. cents), paired with `currency`.
    pub price_minor_units: Option<i64>,
    pub currency: Option<String>,
    pub rating: Option<f32>,
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl ListingRecord {
    /// A record identifier is exactly 10 alphanumeric characters (§6c, GLOSSARY).
    #[must_use]
    pub fn has_valid_id(&self) -> bool {
        self.id.len() == 10 && self.id.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            url: "https://example.com/item/1".to_string(),
            title: "Example item".to_string(),
            page: 1,
            price_minor_units: Some(1999),
            currency: Some("USD".to_string()),
            rating: Some(4.5),
            rating_count: Some(120),
            image_urls: vec!["https://example.com/img.jpg".to_string()],
        }
    }

    #[test]
    fn accepts_ten_char_alphanumeric_id() {
        assert!(sample("ab12cd34EF").has_valid_id());
    }

    #[test]
    fn rejects_wrong_length_or_punctuation() {
        assert!(!sample("short").has_valid_id());
        assert!(!sample("ab12cd34E-").has_valid_id());
    }
}
