//! Featured image import
//!
//! Probes an image URL with HEAD, downloads it once, stores it in the
//! asset store and attaches it to the item. An item's first imported
//! image is never replaced.
//!
//! Some image hosts block non-browser clients. For those, the HEAD probe
//! and the download carry browser headers, and the probe accepts
//! redirect statuses since the host answers HEAD with a redirect to a
//! signed URL.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE};

use crate::crawler::fetcher::{HubFetcher, RequestOptions};
use crate::error::{Error, Result};
use crate::storage::assets::AssetStore;
use crate::storage::repository::ContentStore;
use crate::utils::error::DownloadError;
use crate::utils::extract_domain;

/// User agent presented to image hosts that block crawlers
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HEAD statuses treated as reachable for browser-only hosts
const REACHABLE_STATUSES: &[u16] = &[200, 301, 302, 303, 307, 308];

/// Imports featured images for stored items
pub struct AssetImporter {
    fetcher: Arc<HubFetcher>,
    assets: Arc<dyn AssetStore>,
    store: Arc<dyn ContentStore>,
    timeout: Duration,
}

impl AssetImporter {
    pub fn new(
        fetcher: Arc<HubFetcher>,
        assets: Arc<dyn AssetStore>,
        store: Arc<dyn ContentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            assets,
            store,
            timeout,
        }
    }

    /// Import `image_url` as the featured image of `item_id`
    ///
    /// Returns the item's existing asset reference untouched when it
    /// already has one.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown item, [`Error::Download`] when
    /// the probe, download or asset write fails.
    pub async fn import_featured_image(&self, item_id: &str, image_url: &str) -> Result<String> {
        let item = self
            .store
            .get(item_id)?
            .ok_or_else(|| Error::not_found("content item", item_id))?;

        if let Some(existing) = item.featured_image_ref {
            tracing::debug!(item_id = %item_id, asset_ref = %existing, "Item already has a featured image");
            return Ok(existing);
        }

        let browser_only = needs_browser_headers(image_url);
        self.probe(image_url, browser_only).await?;

        let options = if browser_only {
            self.browser_options()
        } else {
            RequestOptions::default().with_timeout(self.timeout)
        };
        let download = self
            .fetcher
            .get_bytes(image_url, &options)
            .await
            .map_err(DownloadError::from)?;

        if download.bytes.is_empty() {
            return Err(DownloadError::EmptyBody(image_url.to_string()).into());
        }

        // Final gate for URLs accepted by heuristic alone
        let content_type = download.content_type.to_lowercase();
        if !content_type.is_empty() && !content_type.starts_with("image/") {
            return Err(DownloadError::NotAnImage(download.content_type).into());
        }

        let asset_ref = self
            .assets
            .put(image_url, &download.content_type, download.bytes)
            .await
            .map_err(|e| DownloadError::Store(e.to_string()))?;

        if !self.store.set_featured_image_if_absent(item_id, &asset_ref)? {
            // Another sync attached an image first
            if let Some(current) = self.store.get(item_id)?.and_then(|i| i.featured_image_ref) {
                return Ok(current);
            }
        }

        tracing::info!(item_id = %item_id, image_url = %image_url, asset_ref = %asset_ref, "Featured image imported");
        Ok(asset_ref)
    }

    async fn probe(&self, image_url: &str, browser_only: bool) -> Result<()> {
        let options = if browser_only {
            self.browser_options()
        } else {
            RequestOptions::default().with_timeout(self.timeout)
        };
        let head = self
            .fetcher
            .head(image_url, &options)
            .await
            .map_err(DownloadError::from)?;

        if browser_only {
            if !REACHABLE_STATUSES.contains(&head.status) {
                return Err(DownloadError::NotAccessible(head.status).into());
            }
            return Ok(());
        }

        if head.status != 200 {
            return Err(DownloadError::NotAccessible(head.status).into());
        }
        if !head.content_type.starts_with("image/") {
            return Err(DownloadError::NotAnImage(head.content_type).into());
        }
        Ok(())
    }

    fn browser_options(&self) -> RequestOptions {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("image/*,*/*;q=0.8"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        RequestOptions::default()
            .with_timeout(self.timeout)
            .with_user_agent(BROWSER_USER_AGENT)
            .with_headers(headers)
    }
}

/// Whether a host needs browser headers for image requests
pub fn needs_browser_headers(image_url: &str) -> bool {
    if image_url.contains("notion.so/image") {
        return true;
    }
    extract_domain(image_url).is_some_and(|host| {
        host == "notion.so"
            || host.ends_with(".notion.so")
            || host == "notionusercontent.com"
            || host.ends_with(".notionusercontent.com")
    })
}
