// Core data structures for the chiral hub

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::utils::normalize_whitespace;

/// Number of words kept in a derived excerpt
pub const EXCERPT_WORDS: usize = 55;

/// Number of rejected URLs kept as examples in [`FilterStats`]
pub const FILTER_SAMPLE_SIZE: usize = 20;

// ============================================================================
// Content Items
// ============================================================================

/// Which ingestion path created an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Structured payload pushed by a node connector
    Push,
    /// Entry from a polled RSS/Atom feed
    Rss,
    /// Page discovered through a sitemap import
    Sitemap,
}

impl SourceType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Rss => "rss",
            Self::Sitemap => "sitemap",
        }
    }

    /// Name of the sync method recorded alongside the item
    pub fn sync_method(&self) -> &'static str {
        match self {
            Self::Push => "push_sync",
            Self::Rss => "rss_crawl",
            Self::Sitemap => "sitemap_import",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(Self::Push),
            "rss" => Some(Self::Rss),
            "sitemap" => Some(Self::Sitemap),
            _ => None,
        }
    }
}

/// Publication status of a stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    Published,
    PendingReview,
    Draft,
    Private,
    Trashed,
}

impl ItemStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PendingReview => "pending-review",
            Self::Draft => "draft",
            Self::Private => "private",
            Self::Trashed => "trashed",
        }
    }

    /// Parse a status as sent by clients
    ///
    /// Accepts both the canonical names and the short forms connectors
    /// send (`publish`, `pending`, `trash`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "published" | "publish" => Some(Self::Published),
            "pending-review" | "pending" => Some(Self::PendingReview),
            "draft" => Some(Self::Draft),
            "private" => Some(Self::Private),
            "trashed" | "trash" => Some(Self::Trashed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Secondary data kept with an item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub original_title: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub original_featured_image_url: Option<String>,
    /// Alternate links, always carries `source`
    pub other_urls: BTreeMap<String, String>,
    pub last_crawl_check: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
}

/// The stored, deduplicated unit of syndicated content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Store-assigned identifier; empty until first insert
    pub id: String,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub source_url: String,
    pub node_id: String,
    /// Remote identifier; empty for pull-mode items
    pub original_item_id: String,
    /// Feed GUID for RSS items
    pub guid: Option<String>,
    pub source_type: SourceType,
    pub content_hash: String,
    pub status: ItemStatus,
    pub featured_image_ref: Option<String>,
    pub publish_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub network_label: String,
    pub slug: String,
    /// Actor that created the item
    pub author_id: String,
    pub metadata: ItemMetadata,
}

impl ContentItem {
    /// Create an unsaved item for the given identity
    pub fn new(
        source_type: SourceType,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
    ) -> Self {
        let now = Utc::now();
        let mut metadata = ItemMetadata::default();
        metadata
            .other_urls
            .insert("source".to_string(), source_url.to_string());

        Self {
            id: String::new(),
            title: String::new(),
            body: String::new(),
            excerpt: String::new(),
            source_url: source_url.to_string(),
            node_id: node_id.to_string(),
            original_item_id: original_item_id.to_string(),
            guid: None,
            source_type,
            content_hash: String::new(),
            status: ItemStatus::Draft,
            featured_image_ref: None,
            publish_date: now,
            modified_date: now,
            network_label: String::new(),
            slug: generate_slug(source_url, now),
            author_id: String::new(),
            metadata,
        }
    }

    /// Recalculate `content_hash` from the current title and body
    pub fn compute_hash(&mut self) {
        self.content_hash = content_hash(&self.title, &self.body);
    }

    /// Whether the item has not been persisted yet
    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }
}

/// Digest of normalized body plus title, used to detect no-op re-syncs
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_whitespace(body).as_bytes());
    hasher.update(title.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Random-looking 10 character slug derived from the source URL and time
pub fn generate_slug(source_url: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    format!("{:x}", hasher.finalize()).chars().take(10).collect()
}

/// Outcome of a create-or-update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
}

// ============================================================================
// Actors
// ============================================================================

/// Kind of principal behind a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// A node's connector identity; subject to publication policy
    AutomatedNode,
    /// A human operator with elevated privilege
    Operator,
}

/// The principal performing a write or delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    /// Node the actor is bound to, if any
    pub node_id: Option<String>,
    pub kind: ActorKind,
}

impl Actor {
    pub fn automated(id: &str, node_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            node_id: node_id.map(str::to_string),
            kind: ActorKind::AutomatedNode,
        }
    }

    pub fn operator(id: &str) -> Self {
        Self {
            id: id.to_string(),
            node_id: None,
            kind: ActorKind::Operator,
        }
    }

    /// Crawler identity used for a pull-mode node's writes
    pub fn for_node(node_id: &str) -> Self {
        Self::automated(&format!("node:{node_id}"), Some(node_id))
    }

    pub fn is_automated(&self) -> bool {
        self.kind == ActorKind::AutomatedNode
    }
}

// ============================================================================
// Parsed Inputs
// ============================================================================

/// One entry of an RSS or Atom feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
    pub guid: String,
    pub content: String,
    pub featured_image_url: Option<String>,
}

/// Result of extracting an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub featured_image_url: Option<String>,
}

// ============================================================================
// Node State
// ============================================================================

/// How a node delivers content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Push,
    Pull,
}

/// How often a pull-mode node's feed is polled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncFrequency {
    #[default]
    Hourly,
    Daily,
}

impl SyncFrequency {
    /// Minimum gap between two syncs, given the hourly gap
    ///
    /// Both frequencies keep the same five minutes of slack so a cron
    /// tick that fires slightly early is not skipped.
    pub fn min_interval(&self, hourly: Duration) -> Duration {
        match self {
            Self::Hourly => hourly,
            Self::Daily => hourly + Duration::hours(23),
        }
    }
}

/// URL classification strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlFilterMode {
    #[default]
    Exclude,
    Include,
}

impl UrlFilterMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclude => "exclude",
            Self::Include => "include",
        }
    }
}

/// Outcome of the last sitemap URL filtering pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub original_count: usize,
    pub filtered_count: usize,
    pub excluded_count: usize,
    pub filter_mode: UrlFilterMode,
    /// First few rejected URLs
    pub excluded_urls: Vec<String>,
    pub filter_time: DateTime<Utc>,
}

/// Result of the last feed health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RssHealth {
    pub last_check: DateTime<Utc>,
    pub is_healthy: bool,
    pub status_code: u16,
    pub error_message: String,
}

/// One entry of a node's error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Bulk sitemap import progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub progress_percent: f64,
    pub current_url: String,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
    pub is_importing: bool,
}

impl ImportJob {
    /// Create a job for `total_items` URLs
    pub fn new(total_items: usize) -> Self {
        let now = Utc::now();
        let mut hasher = Sha256::new();
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let suffix: String = format!("{:x}", hasher.finalize()).chars().take(13).collect();

        Self {
            job_id: format!("import_{suffix}"),
            total_items,
            processed_items: 0,
            success_count: 0,
            error_count: 0,
            progress_percent: 0.0,
            current_url: String::new(),
            started_at: now,
            last_update_at: now,
            is_importing: true,
        }
    }

    /// Mark `url` as the one being worked on
    pub fn begin(&mut self, url: &str) {
        self.current_url = url.to_string();
        self.last_update_at = Utc::now();
    }

    /// Count one processed URL
    pub fn advance(&mut self, succeeded: bool) {
        if succeeded {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
        self.processed_items += 1;
        self.progress_percent = self.compute_progress();
        self.last_update_at = Utc::now();
    }

    /// Mark the job finished
    pub fn finish(&mut self) {
        self.is_importing = false;
        self.progress_percent = 100.0;
        self.current_url.clear();
        self.last_update_at = Utc::now();
    }

    /// Check if every URL has been processed
    pub fn is_complete(&self) -> bool {
        self.processed_items >= self.total_items
    }

    /// Remaining URL count
    pub fn remaining(&self) -> usize {
        self.total_items.saturating_sub(self.processed_items)
    }

    /// Whether a running job has not moved for longer than `threshold`
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.is_importing && now - self.last_update_at > threshold
    }

    fn compute_progress(&self) -> f64 {
        if self.total_items == 0 {
            return 100.0;
        }
        let raw = self.processed_items as f64 / self.total_items as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

/// Per-node persisted state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeState {
    pub node_id: String,
    pub sync_mode: SyncMode,
    pub rss_url: Option<String>,
    pub sitemap_url: Option<String>,
    pub sync_frequency: SyncFrequency,
    pub url_filter_mode: UrlFilterMode,
    /// Comma separated allowlist for include mode
    pub url_include_slugs: String,
    /// Comma separated extra denylist for exclude mode
    pub url_exclusion_list: String,
    pub last_filter_stats: Option<FilterStats>,
    pub rss_health: Option<RssHealth>,
    pub rss_last_sync: Option<DateTime<Utc>>,
    pub import_job: Option<ImportJob>,
    /// Presence flag guarding one import per node
    pub import_in_progress: bool,
    pub import_urls: Vec<String>,
    pub error_log: Vec<ErrorLogEntry>,
}

impl NodeState {
    /// Create empty state for a node
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            ..Default::default()
        }
    }

    /// Append an error, keeping only the newest `capacity` entries
    pub fn push_error(&mut self, entry: ErrorLogEntry, capacity: usize) {
        self.error_log.push(entry);
        if self.error_log.len() > capacity {
            let overflow = self.error_log.len() - capacity;
            self.error_log.drain(..overflow);
        }
    }

    /// Drop log entries older than `cutoff`; returns how many were removed
    pub fn prune_errors(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.error_log.len();
        self.error_log.retain(|e| e.timestamp >= cutoff);
        before - self.error_log.len()
    }

    /// Clear all import bookkeeping
    pub fn clear_import(&mut self) {
        self.import_job = None;
        self.import_in_progress = false;
        self.import_urls.clear();
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Counters returned by a feed sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSyncReport {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl FeedSyncReport {
    /// Count one processed entry
    pub fn record(&mut self, action: SyncAction) {
        match action {
            SyncAction::Created => self.new += 1,
            SyncAction::Updated => self.updated += 1,
            SyncAction::Unchanged => self.skipped += 1,
        }
    }
}

/// Returned when a sitemap import starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStart {
    pub job_id: String,
    pub total_urls: usize,
}

/// Snapshot returned to status pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub job: Option<ImportJob>,
    pub in_progress: bool,
    pub is_stuck: bool,
}

/// Outcome of one bulk import invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportBatchOutcome {
    /// No job for the node; any leftover bookkeeping was cleared
    Idle,
    /// A batch ran and the next one is scheduled
    Continued { processed_items: usize, total_items: usize },
    /// The last batch ran; the job is finished
    Completed { job: ImportJob },
}

/// Counters of a scheduled feed sync pass over all nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCycleReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Counters of a daily patrol pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolReport {
    pub nodes_checked: usize,
    pub errors_pruned: usize,
    pub import_records_dropped: usize,
    pub unhealthy_feeds: usize,
}

/// Counters of one task runner pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRunReport {
    pub ran: usize,
    pub failed: usize,
}

/// Result of a dry-run connection test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub rss_items: usize,
    pub sitemap_urls: usize,
}
