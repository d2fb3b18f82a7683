//! chiral-hub - Ingestion core of a content-aggregation hub
//!
//! Remote nodes deliver articles to the hub either by pushing structured
//! payloads or by being polled through their RSS/Atom feed and sitemap.
//! Every path ends in the same deduplicated, policy-governed store.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`crawler`] - Rate-limited HTTP, sitemap crawling, URL filtering and image import
//! - [`parser`] - Feed, sitemap and HTML parsing, sanitization and payload validation
//! - [`models`] - Core data structures and types
//! - [`policy`] - Publication policy, settings and the actor directory
//! - [`storage`] - Content store with write hooks, node state, dedup and assets
//! - [`scheduler`] - Durable single-shot task queue
//! - [`sync`] - The orchestrator tying all ingestion paths together
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use chiral_hub::config::Config;
//! use chiral_hub::models::Actor;
//! use chiral_hub::sync::{HubServices, SyncOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let services = HubServices::open(&config).await?;
//!     let hub = SyncOrchestrator::new(&config, services)?;
//!
//!     let payload = serde_json::json!({
//!         "source_url": "https://a.example/p1",
//!         "node_id": "N1",
//!         "original_post_id": "1",
//!         "title": "Hello",
//!     });
//!     let outcome = hub.push_item(&Actor::automated("porter-1", None), payload).await?;
//!     println!("{:?} {}", outcome.action, outcome.item.id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod models;
pub mod parser;
pub mod policy;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, HubErrorTrait, Result};
    pub use crate::models::{Actor, ContentItem, ItemStatus, NodeState, SourceType, SyncAction};
    pub use crate::policy::{PolicyEngine, PolicySetting, SettingsProvider};
    pub use crate::storage::{ContentStore, NodeStateStore};
    pub use crate::sync::{HubServices, SyncOrchestrator};
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{ContentItem, ItemStatus, SyncAction};
