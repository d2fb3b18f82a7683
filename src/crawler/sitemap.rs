//! Sitemap crawling with index flattening and URL filtering

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::crawler::fetcher::{HubFetcher, RequestOptions};
use crate::crawler::url::UrlFilter;
use crate::error::Result;
use crate::models::FilterStats;
use crate::parser::SitemapDocument;

/// Nesting limit for sitemap indexes
const MAX_INDEX_DEPTH: usize = 3;

/// Outcome of crawling one sitemap
#[derive(Debug, Clone)]
pub struct SitemapCrawl {
    /// Every URL found, before filtering
    pub candidates: Vec<String>,
    /// URLs the filter accepted
    pub accepted: Vec<String>,
    pub stats: FilterStats,
}

/// Fetches sitemaps and flattens sitemap indexes
pub struct SitemapCrawler {
    fetcher: Arc<HubFetcher>,
    timeout: Duration,
}

impl SitemapCrawler {
    pub fn new(fetcher: Arc<HubFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Collect all page URLs reachable from `sitemap_url`
    ///
    /// Child sitemaps of an index that fail to fetch or parse are logged
    /// and skipped. Duplicate URLs are dropped, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Fetch or parse failure of the root sitemap.
    pub async fn collect_urls(&self, sitemap_url: &str) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        let mut urls = self.collect(sitemap_url.to_string(), 0, &mut visited).await?;

        let mut seen = HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        Ok(urls)
    }

    /// Collect URLs and run them through `filter`
    pub async fn crawl(&self, sitemap_url: &str, filter: &UrlFilter) -> Result<SitemapCrawl> {
        let candidates = self.collect_urls(sitemap_url).await?;
        let (accepted, stats) = filter.filter(&candidates);

        tracing::info!(
            sitemap_url = %sitemap_url,
            original = stats.original_count,
            accepted = stats.filtered_count,
            excluded = stats.excluded_count,
            mode = stats.filter_mode.as_str(),
            "Sitemap URLs filtered"
        );

        Ok(SitemapCrawl {
            candidates,
            accepted,
            stats,
        })
    }

    fn collect<'a>(
        &'a self,
        url: String,
        depth: usize,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        async move {
            if !visited.insert(url.clone()) {
                return Ok(Vec::new());
            }

            let options = RequestOptions::default().with_timeout(self.timeout);
            let body = self.fetcher.get_text_with(&url, &options).await?;

            match SitemapDocument::parse(&body)? {
                SitemapDocument::UrlSet(urls) => {
                    tracing::debug!(sitemap = %url, count = urls.len(), "Parsed URL set");
                    Ok(urls)
                }
                SitemapDocument::Index(children) => {
                    if depth >= MAX_INDEX_DEPTH {
                        tracing::warn!(sitemap = %url, depth, "Sitemap index nested too deep");
                        return Ok(Vec::new());
                    }

                    let mut all = Vec::new();
                    for child in children {
                        match self.collect(child.clone(), depth + 1, visited).await {
                            Ok(urls) => all.extend(urls),
                            Err(e) => {
                                tracing::warn!(
                                    sitemap = %child,
                                    error = %e,
                                    "Skipping child sitemap"
                                );
                            }
                        }
                    }
                    Ok(all)
                }
            }
        }
        .boxed()
    }
}
