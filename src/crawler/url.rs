//! Article URL classification for sitemap imports
//!
//! Sitemaps list every page of a site: tag archives, pagination, feeds,
//! legal pages. [`UrlFilter`] keeps the ones that look like articles,
//! using one of two per-node strategies:
//! - Exclude mode (default): accept unless a denylist rule matches
//! - Include mode: reject unless an allowlisted segment is followed by
//!   something that looks like an article slug or ID

use std::collections::HashSet;

use chrono::Utc;
use url::Url;

use crate::models::{FilterStats, NodeState, UrlFilterMode, FILTER_SAMPLE_SIZE};

/// Path segments rejected in exclude mode
pub const DEFAULT_EXCLUDED_SEGMENTS: &[&str] = &[
    // Taxonomies
    "tag", "tags", "category", "categories", "cat",
    // Archives
    "archive", "archives", "date", "year", "month",
    // Listing pages
    "page", "pages", "static",
    // Authors
    "author", "authors", "user", "users",
    // Search and feeds
    "search", "feed", "rss", "atom", "sitemap",
    // Admin and API
    "admin", "api", "wp-content", "wp-admin", "wp-json",
    // Site pages
    "about", "contact", "privacy", "terms", "disclaimer",
    "sitemap.xml", "robots.txt", "favicon.ico",
    // Language prefixes
    "zh", "en", "zh-cn", "zh-tw", "en-us",
    "index", "home",
];

/// Allowlist used in include mode when a node configures none
pub const DEFAULT_INCLUDE_SEGMENTS: &[&str] = &["post", "posts", "article", "articles", "blog", "news"];

/// File extensions that are never articles
pub const EXCLUDED_EXTENSIONS: &[&str] = &[
    "xml", "txt", "ico", "png", "jpg", "jpeg", "gif", "css", "js", "pdf",
];

/// Query parameters that mark listing or search pages
pub const EXCLUDED_QUERY_PARAMS: &[&str] = &["page_id", "cat", "tag", "author", "s", "search", "paged"];

/// Upper bound of a bare numeric segment accepted as an article ID
const MAX_PLAUSIBLE_ID: u64 = 10_000;

/// Classifies URLs as article pages
#[derive(Debug, Clone)]
pub struct UrlFilter {
    mode: UrlFilterMode,
    include: Vec<String>,
    exclude: HashSet<String>,
}

impl UrlFilter {
    /// Create a filter from a mode and the node's comma separated lists
    ///
    /// `include_slugs` replaces the default allowlist when non-empty;
    /// `exclusions` extends the default denylist.
    pub fn new(mode: UrlFilterMode, include_slugs: &str, exclusions: &str) -> Self {
        let mut include = split_list(include_slugs);
        if include.is_empty() {
            include = DEFAULT_INCLUDE_SEGMENTS.iter().map(|s| s.to_string()).collect();
        }

        let mut exclude: HashSet<String> =
            DEFAULT_EXCLUDED_SEGMENTS.iter().map(|s| s.to_string()).collect();
        exclude.extend(split_list(exclusions));

        Self {
            mode,
            include,
            exclude,
        }
    }

    /// Filter configured for a node
    pub fn for_node(state: &NodeState) -> Self {
        Self::new(
            state.url_filter_mode,
            &state.url_include_slugs,
            &state.url_exclusion_list,
        )
    }

    pub fn mode(&self) -> UrlFilterMode {
        self.mode
    }

    /// Check whether `url` looks like an article page
    ///
    /// A URL that does not parse, or whose path is empty after trimming
    /// slashes (a home page), is never an article.
    pub fn is_article_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };

        let path = parsed.path().trim_matches('/');
        if path.is_empty() {
            return false;
        }

        let segments: Vec<&str> = path.split('/').collect();

        match self.mode {
            UrlFilterMode::Include => self.check_include(&segments),
            UrlFilterMode::Exclude => self.check_exclude(&parsed, path, &segments),
        }
    }

    /// Split `urls` into accepted URLs and statistics about the rest
    pub fn filter(&self, urls: &[String]) -> (Vec<String>, FilterStats) {
        let (accepted, excluded): (Vec<String>, Vec<String>) =
            urls.iter().cloned().partition(|u| self.is_article_url(u));

        let stats = FilterStats {
            original_count: urls.len(),
            filtered_count: accepted.len(),
            excluded_count: excluded.len(),
            filter_mode: self.mode,
            excluded_urls: excluded.into_iter().take(FILTER_SAMPLE_SIZE).collect(),
            filter_time: Utc::now(),
        };

        (accepted, stats)
    }

    fn check_include(&self, segments: &[&str]) -> bool {
        for (i, segment) in segments.iter().enumerate() {
            if !self.include.iter().any(|s| s == &segment.to_lowercase()) {
                continue;
            }

            // Slug as last segment is an archive page
            let Some(next) = segments.get(i + 1).map(|s| s.trim()) else {
                continue;
            };
            if next.is_empty() {
                continue;
            }

            let Some(number) = parse_numeric(next) else {
                // Looks like a title slug
                return true;
            };

            // Date or ID followed by a slug
            if segments
                .get(i + 2)
                .is_some_and(|third| !third.trim().is_empty())
            {
                return true;
            }

            if (1..=MAX_PLAUSIBLE_ID).contains(&number) {
                return true;
            }
            // Large numbers are dates or pagination; keep scanning
        }
        false
    }

    fn check_exclude(&self, url: &Url, path: &str, segments: &[&str]) -> bool {
        if segments
            .iter()
            .any(|s| !s.is_empty() && self.exclude.contains(&s.to_lowercase()))
        {
            return false;
        }

        let last = segments.last().copied().unwrap_or_default();
        if let Some((_, ext)) = last.rsplit_once('.') {
            if EXCLUDED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                return false;
            }
        }

        if url
            .query_pairs()
            .any(|(k, _)| EXCLUDED_QUERY_PARAMS.contains(&k.as_ref()))
        {
            return false;
        }

        if path.len() < 3 {
            return false;
        }

        // Trailing page number, e.g. /something/2
        if segments.len() > 1 && parse_numeric(last).is_some_and(|n| n > 1) {
            return false;
        }

        true
    }
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(UrlFilterMode::Exclude, "", "")
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_numeric(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Overlong digit runs saturate; they are never plausible IDs
    Some(segment.parse().unwrap_or(u64::MAX))
}
