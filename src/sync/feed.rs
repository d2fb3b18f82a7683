//! Feed polling: per-node sync, the scheduled cycle and health checks

use chrono::{DateTime, Utc};
use serde_json::json;

use super::{PulledItem, SyncOrchestrator};
use crate::crawler::RequestOptions;
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    ConnectionReport, FeedCycleReport, FeedEntry, FeedSyncReport, NodeState, RssHealth,
    SourceType, SyncAction, SyncMode, EXCERPT_WORDS,
};
use crate::parser::sanitize::{html_to_excerpt, sanitize_rich_text, sanitize_text_field, sanitize_url};
use crate::parser::{parse_feed, parse_feed_date};

impl SyncOrchestrator {
    /// Fetch a node's feed and create or update one item per entry
    ///
    /// A fetch or parse failure abandons the whole feed for this cycle and
    /// is returned. Failures of single entries are counted in
    /// [`FeedSyncReport::errors`] and never stop the remaining entries.
    pub async fn sync_feed_updates(&self, node_id: &str) -> Result<FeedSyncReport> {
        let state = self.states.load_or_default(node_id)?;
        let rss_url = feed_url(&state)?;

        let xml = match self.fetcher.get_text(&rss_url).await {
            Ok(xml) => xml,
            Err(e) => {
                self.note_error(
                    node_id,
                    "rss_fetch_failed",
                    &format!("Failed to fetch RSS feed: {e}"),
                    json!({ "rss_url": rss_url }),
                );
                return Err(e.into());
            }
        };

        let entries = match parse_feed(&xml) {
            Ok(entries) => entries,
            Err(e) => {
                self.note_error(
                    node_id,
                    "rss_parse_failed",
                    &format!("Failed to parse RSS feed: {e}"),
                    json!({ "rss_url": rss_url }),
                );
                return Err(e.into());
            }
        };

        let mut report = FeedSyncReport {
            total: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.sync_feed_entry(node_id, &entry).await {
                Ok(action) => report.record(action),
                Err(e) => {
                    report.errors += 1;
                    self.note_error(
                        node_id,
                        "post_creation_failed",
                        &format!("Failed to create or update item: {e}"),
                        json!({ "url": entry.link, "title": entry.title }),
                    );
                }
            }
        }

        let now = Utc::now();
        self.states.update(node_id, &mut |s: &mut NodeState| {
            s.rss_last_sync = Some(now);
        })?;

        tracing::info!(
            node_id = %node_id,
            total = report.total,
            new = report.new,
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "Feed sync completed"
        );
        Ok(report)
    }

    async fn sync_feed_entry(&self, node_id: &str, entry: &FeedEntry) -> Result<SyncAction> {
        let link = sanitize_url(&entry.link).ok_or_else(|| ValidationError::InvalidUrl {
            field: "link",
            value: entry.link.clone(),
        })?;

        let raw_body = if entry.content.trim().is_empty() {
            &entry.description
        } else {
            &entry.content
        };
        let raw_excerpt = if entry.description.trim().is_empty() {
            &entry.content
        } else {
            &entry.description
        };

        let mut title = sanitize_text_field(&entry.title);
        if title.is_empty() {
            title = link.clone();
        }

        let pulled = PulledItem {
            source_type: SourceType::Rss,
            guid: Some(entry.guid.trim().to_string()).filter(|g| !g.is_empty()),
            title,
            body: sanitize_rich_text(raw_body),
            excerpt: html_to_excerpt(raw_excerpt, EXCERPT_WORDS),
            publish_date: parse_feed_date(&entry.pub_date),
            featured_image_url: entry.featured_image_url.as_deref().and_then(sanitize_url),
            source_url: link,
        };

        let (_, action) = self.upsert_pulled(node_id, pulled).await?;
        Ok(action)
    }

    /// Sync every pull-mode node whose feed is due
    ///
    /// A node is due when its last sync is older than the interval of its
    /// sync frequency. One node's failure does not stop the others.
    pub async fn run_feed_sync_cycle(&self, now: DateTime<Utc>) -> Result<FeedCycleReport> {
        let mut report = FeedCycleReport::default();
        let hourly = self.config.sync.feed_min_interval();

        for state in self.states.list()? {
            if state.sync_mode != SyncMode::Pull || feed_url(&state).is_err() {
                continue;
            }

            let interval = state.sync_frequency.min_interval(hourly);
            if let Some(last) = state.rss_last_sync {
                if now - last < interval {
                    tracing::debug!(node_id = %state.node_id, last_sync = %last, "Feed not due");
                    report.skipped += 1;
                    continue;
                }
            }

            match self.sync_feed_updates(&state.node_id).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(node_id = %state.node_id, error = %e, "Feed sync failed");
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            "Feed sync cycle completed"
        );
        Ok(report)
    }

    /// Probe a node's feed URL and store the result as `rss_health`
    ///
    /// Unhealthy results are also written to the node's error log.
    pub async fn check_feed_health(&self, node_id: &str) -> Result<RssHealth> {
        let state = self.states.load_or_default(node_id)?;
        let rss_url = feed_url(&state)?;

        let options = RequestOptions::default()
            .with_timeout(self.config.crawler.health_timeout())
            .with_user_agent(self.config.crawler.health_user_agent.clone());

        let now = Utc::now();
        let health = match self.fetcher.probe_status(&rss_url, &options).await {
            Ok(200) => RssHealth {
                last_check: now,
                is_healthy: true,
                status_code: 200,
                error_message: String::new(),
            },
            Ok(code) => {
                self.note_error(
                    node_id,
                    "health_check_http_error",
                    &format!("RSS URL returned HTTP {code}"),
                    json!({ "rss_url": rss_url, "status_code": code }),
                );
                RssHealth {
                    last_check: now,
                    is_healthy: false,
                    status_code: code,
                    error_message: format!("HTTP {code} response"),
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.note_error(
                    node_id,
                    "health_check_failed",
                    &message,
                    json!({ "rss_url": rss_url }),
                );
                RssHealth {
                    last_check: now,
                    is_healthy: false,
                    status_code: 0,
                    error_message: message,
                }
            }
        };

        let mut stored = Some(health.clone());
        self.states.update(node_id, &mut |s: &mut NodeState| {
            if let Some(h) = stored.take() {
                s.rss_health = Some(h);
            }
        })?;

        tracing::debug!(
            node_id = %node_id,
            healthy = health.is_healthy,
            status_code = health.status_code,
            "Feed health checked"
        );
        Ok(health)
    }

    /// Fetch and parse a feed and/or sitemap without writing anything
    pub async fn test_connection(
        &self,
        rss_url: Option<&str>,
        sitemap_url: Option<&str>,
    ) -> Result<ConnectionReport> {
        let mut report = ConnectionReport::default();

        if let Some(url) = rss_url.filter(|u| !u.trim().is_empty()) {
            let xml = self.fetcher.get_text(url).await?;
            report.rss_items = parse_feed(&xml)?.len();
        }

        if let Some(url) = sitemap_url.filter(|u| !u.trim().is_empty()) {
            report.sitemap_urls = self.sitemaps.collect_urls(url).await?.len();
        }

        tracing::info!(
            rss_items = report.rss_items,
            sitemap_urls = report.sitemap_urls,
            "Connection test passed"
        );
        Ok(report)
    }
}

fn feed_url(state: &NodeState) -> Result<String> {
    state
        .rss_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::not_found("feed URL", &state.node_id))
}
