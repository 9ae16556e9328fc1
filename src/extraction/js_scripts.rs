//! JavaScript evaluation script for listing extraction: one serialized DOM
//! query returning a JSON array matching [`super::record::ListingRecord`]
//! field-for-field.

/// Serializes every `[data-listing-id]` element on the page into an array
/// of raw JSON objects. `page` is substituted by the caller before
/// evaluation since the page number isn't observable from the DOM alone.
pub const LISTING_SCRIPT_TEMPLATE: &str = r#"
    (() => {
        const page = __PAGE__;
        const items = Array.from(document.querySelectorAll('[data-listing-id]'));
        return items.map(el => {
            const priceAttr = el.getAttribute('data-price-minor-units');
            const ratingAttr = el.getAttribute('data-rating');
            const ratingCountAttr = el.getAttribute('data-rating-count');
            const images = Array.from(el.querySelectorAll('img[src]')).map(img => img.src);
            const link = el.querySelector('a[href]');
            return {
                id: el.getAttribute('data-listing-id'),
                url: link ? link.href : window.location.href,
                title: (el.querySelector('[data-listing-title]') || el).textContent.trim(),
                page: page,
                price_minor_units: priceAttr ? parseInt(priceAttr, 10) : null,
                currency: el.getAttribute('data-currency') || null,
                rating: ratingAttr ? parseFloat(ratingAttr) : null,
                rating_count: ratingCountAttr ? parseInt(ratingCountAttr, 10) : null,
                image_urls: images
            };
        });
    })()
"#;

#[must_use]
pub fn listing_script_for_page(page: u32) -> String {
    LISTING_SCRIPT_TEMPLATE.replace("__PAGE__", &page.to_string())
}
