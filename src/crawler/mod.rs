//! Outbound HTTP: fetching, sitemap crawling and image import
//!
//! All network access of the hub happens in this module. Every request
//! goes through the shared, rate-limited [`HubFetcher`].

pub mod assets;
pub mod fetcher;
pub mod sitemap;
pub mod url;

pub use assets::AssetImporter;
pub use fetcher::{HubFetcher, RequestOptions};
pub use sitemap::{SitemapCrawl, SitemapCrawler};
pub use url::UrlFilter;
