//! Configuration management for the chiral hub
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::policy::PolicySetting;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound HTTP configuration
    pub crawler: CrawlerConfig,

    /// Bulk sitemap import configuration
    pub import: ImportConfig,

    /// Scheduled feed sync configuration
    pub sync: SyncConfig,

    /// Per-node error log configuration
    pub error_log: ErrorLogConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// Organization settings
    pub hub: HubConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Rate limit (requests per second)
    pub requests_per_second: u32,

    /// Request timeout in seconds for feeds, sitemaps, pages and images
    pub request_timeout_secs: u64,

    /// Timeout in seconds for feed health checks
    pub health_timeout_secs: u64,

    /// User agent for crawling
    pub user_agent: String,

    /// User agent for feed health checks
    pub health_user_agent: String,
}

/// Bulk sitemap import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// URLs processed per invocation
    pub batch_size: usize,

    /// Delay before the next batch runs, in seconds
    pub continuation_delay_secs: u64,

    /// A running job without progress for this long is stuck, in minutes
    pub stuck_threshold_mins: i64,

    /// Finished job records are dropped after this many days
    pub status_retention_days: i64,
}

/// Scheduled feed sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum gap between two hourly syncs of a feed, in seconds
    pub feed_min_interval_secs: i64,
}

/// Per-node error log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    /// Entries kept per node
    pub capacity: usize,

    /// Entries older than this many days are pruned
    pub retention_days: i64,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite content store
    pub sqlite_path: PathBuf,

    /// Directory of per-node state files and the task queue
    pub state_dir: PathBuf,

    /// Directory of imported assets
    pub asset_dir: PathBuf,
}

/// Organization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Network name stamped on every item
    pub network_label: String,

    /// Registration policy for automated node writes
    pub policy: PolicySetting,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            request_timeout_secs: 30,
            health_timeout_secs: 15,
            user_agent: format!("Chiral Hub RSS Crawler/{}", env!("CARGO_PKG_VERSION")),
            health_user_agent: format!("Chiral Hub RSS Health Check/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlerConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get health check timeout as Duration
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            continuation_delay_secs: 5,
            stuck_threshold_mins: 30,
            status_retention_days: 7,
        }
    }
}

impl ImportConfig {
    #[must_use]
    pub fn continuation_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.continuation_delay_secs as i64)
    }

    #[must_use]
    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stuck_threshold_mins)
    }

    #[must_use]
    pub fn status_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.status_retention_days)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            feed_min_interval_secs: 3300,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn feed_min_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.feed_min_interval_secs)
    }
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            retention_days: 30,
        }
    }
}

impl ErrorLogConfig {
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/hub.db"),
            state_dir: PathBuf::from("data/state"),
            asset_dir: PathBuf::from("data/assets"),
        }
    }
}

impl StorageConfig {
    /// Task queue file inside the state directory
    #[must_use]
    pub fn task_queue_path(&self) -> PathBuf {
        self.state_dir.join("tasks.json")
    }

    /// Actor directory file inside the state directory
    #[must_use]
    pub fn actors_path(&self) -> PathBuf {
        self.state_dir.join("actors.json")
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            network_label: String::from("Chiral Network"),
            policy: PolicySetting::ReviewRequired,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `CHIRAL_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let policy = match std::env::var("CHIRAL_POLICY") {
            Ok(raw) => PolicySetting::parse(&raw)
                .with_context(|| format!("Invalid CHIRAL_POLICY value: {raw}"))?,
            Err(_) => defaults.hub.policy,
        };

        Ok(Self {
            crawler: CrawlerConfig {
                requests_per_second: env_or(
                    "CHIRAL_REQUESTS_PER_SECOND",
                    defaults.crawler.requests_per_second,
                ),
                request_timeout_secs: env_or(
                    "CHIRAL_REQUEST_TIMEOUT",
                    defaults.crawler.request_timeout_secs,
                ),
                health_timeout_secs: env_or(
                    "CHIRAL_HEALTH_TIMEOUT",
                    defaults.crawler.health_timeout_secs,
                ),
                user_agent: env_or("CHIRAL_USER_AGENT", defaults.crawler.user_agent),
                health_user_agent: env_or(
                    "CHIRAL_HEALTH_USER_AGENT",
                    defaults.crawler.health_user_agent,
                ),
            },
            import: ImportConfig {
                batch_size: env_or("CHIRAL_IMPORT_BATCH_SIZE", defaults.import.batch_size),
                continuation_delay_secs: env_or(
                    "CHIRAL_IMPORT_DELAY",
                    defaults.import.continuation_delay_secs,
                ),
                ..defaults.import
            },
            sync: SyncConfig {
                feed_min_interval_secs: env_or(
                    "CHIRAL_FEED_MIN_INTERVAL",
                    defaults.sync.feed_min_interval_secs,
                ),
            },
            error_log: defaults.error_log,
            storage: StorageConfig {
                sqlite_path: env_or("CHIRAL_SQLITE_PATH", defaults.storage.sqlite_path),
                state_dir: env_or("CHIRAL_STATE_DIR", defaults.storage.state_dir),
                asset_dir: env_or("CHIRAL_ASSET_DIR", defaults.storage.asset_dir),
            },
            hub: HubConfig {
                network_label: env_or("CHIRAL_NETWORK_LABEL", defaults.hub.network_label),
                policy,
            },
            logging: LoggingConfig {
                level: env_or("CHIRAL_LOG_LEVEL", defaults.logging.level),
                format: env_or("CHIRAL_LOG_FORMAT", defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.crawler.request_timeout_secs == 0 || self.crawler.health_timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        if self.crawler.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        if self.import.batch_size == 0 {
            anyhow::bail!("import batch_size must be greater than 0");
        }

        if self.import.stuck_threshold_mins <= 0 {
            anyhow::bail!("import stuck_threshold_mins must be positive");
        }

        if self.error_log.capacity == 0 {
            anyhow::bail!("error_log capacity must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging format must be 'text' or 'json'");
        }

        Ok(())
    }
}
