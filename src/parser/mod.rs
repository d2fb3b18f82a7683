//! Document parsing and sanitization
//!
//! Feeds, sitemaps, article pages and push payloads all enter the hub
//! through this module. Nothing here performs I/O.

pub mod feed;
pub mod html;
pub mod image;
pub mod payload;
pub mod sanitize;
pub mod selectors;
pub mod sitemap;
pub mod xml;

// Re-export main parser entry points
pub use feed::parse_feed;
pub use html::ContentExtractor;
pub use image::{is_valid_image_url, make_absolute_url};
pub use payload::{sanitize_payload, SanitizedPayload};
pub use sitemap::SitemapDocument;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a feed date in any of the formats publishers actually use
///
/// RFC 2822 (`pubDate`) and RFC 3339 (Atom) first, then a few common
/// naive layouts read as UTC. Returns `None` when nothing matches; the
/// caller decides the fallback.
pub fn parse_feed_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    // Offsets without a colon, e.g. 2024-01-02T10:00:00+0000
    if let Ok(dt) = DateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S", // 2024-12-25 15:45:00
        "%Y-%m-%dT%H:%M:%S", // 2024-12-25T15:45:00
        "%Y-%m-%d %H:%M",    // 2024-12-25 15:45
        "%Y/%m/%d %H:%M:%S", // 2024/12/25 15:45:00
    ];

    for format in &formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Some(naive_dt.and_utc());
        }
    }

    // Date only
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
