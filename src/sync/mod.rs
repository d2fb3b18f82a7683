//! Sync orchestration
//!
//! [`SyncOrchestrator`] is the single entry point for every ingestion path.
//! Push payloads, feed entries and sitemap pages all flow through the same
//! dedup, hash-compare and policy-guarded write, so an item ends up in the
//! same state whichever path delivered it.
//!
//! ```text
//!  push payload ──┐
//!  feed entry  ───┼──▶ DedupResolver ──▶ hash compare ──▶ ContentStore
//!  sitemap page ──┘                                        (policy hooks)
//!                                                               │
//!                                                       AssetImporter
//! ```
//!
//! The work is split by path:
//!
//! - [`push`]: structured pushes, deletes and the network label refresh
//! - [`feed`]: feed sync, the scheduled sync cycle and health checks
//! - [`import`]: the resumable sitemap import and single-item resync
//! - [`patrol`]: daily maintenance and the task runner

pub mod feed;
pub mod import;
pub mod patrol;
pub mod push;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::crawler::{AssetImporter, HubFetcher, SitemapCrawler};
use crate::error::Result;
use crate::models::{content_hash, Actor, ContentItem, ErrorLogEntry, NodeState, SourceType, SyncAction};
use crate::parser::ContentExtractor;
use crate::policy::{
    ActorDirectory, JsonActorDirectory, MemoryActorDirectory, NetworkLabelStamp, PolicyEngine,
    SettingsProvider, StaticSettings,
};
use crate::scheduler::TaskQueue;
use crate::storage::{
    AssetStore, ContentStore, DedupResolver, FsAssetStore, JsonNodeStateStore,
    MemoryAssetStore, MemoryContentStore, MemoryNodeStateStore, NodeStateStore,
    SqliteContentStore, WriteContext,
};

/// Handler key of a bulk import continuation
pub const SITEMAP_IMPORT_BATCH: &str = "sitemap_import_batch";

// ============================================================================
// Services
// ============================================================================

/// Collaborators the orchestrator is built from
#[derive(Clone)]
pub struct HubServices {
    pub store: Arc<dyn ContentStore>,
    pub states: Arc<dyn NodeStateStore>,
    pub assets: Arc<dyn AssetStore>,
    pub settings: Arc<dyn SettingsProvider>,
    pub directory: Arc<dyn ActorDirectory>,
    pub tasks: Arc<TaskQueue>,
}

impl HubServices {
    /// Memory backends only
    pub fn in_memory(settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            store: Arc::new(MemoryContentStore::new()),
            states: Arc::new(MemoryNodeStateStore::new()),
            assets: Arc::new(MemoryAssetStore::new()),
            settings,
            directory: Arc::new(MemoryActorDirectory::new()),
            tasks: Arc::new(TaskQueue::new()),
        }
    }

    /// Durable backends at the locations named in `config.storage`
    pub async fn open(config: &Config) -> Result<Self> {
        let storage = &config.storage;
        if let Some(parent) = storage.sqlite_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = SqliteContentStore::new(&storage.sqlite_path)?;
        let states = JsonNodeStateStore::new(&storage.state_dir)?;
        let assets = FsAssetStore::new(&storage.asset_dir).await?;
        let directory = JsonActorDirectory::open(&storage.actors_path())?;
        let tasks = TaskQueue::open(storage.task_queue_path()).await?;
        let settings = StaticSettings::new(config.hub.policy, config.hub.network_label.clone());

        Ok(Self {
            store: Arc::new(store),
            states: Arc::new(states),
            assets: Arc::new(assets),
            settings: Arc::new(settings),
            directory: Arc::new(directory),
            tasks: Arc::new(tasks),
        })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Result of a push
#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub item: ContentItem,
    pub action: SyncAction,
}

/// Normalized input of the pull paths (feed entries and sitemap pages)
#[derive(Debug, Clone)]
pub(crate) struct PulledItem {
    pub source_type: SourceType,
    pub source_url: String,
    pub guid: Option<String>,
    pub title: String,
    pub body: String,
    pub excerpt: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub featured_image_url: Option<String>,
}

/// Drives push ingestion, feed sync and sitemap imports
pub struct SyncOrchestrator {
    config: Config,
    store: Arc<dyn ContentStore>,
    states: Arc<dyn NodeStateStore>,
    directory: Arc<dyn ActorDirectory>,
    settings: Arc<dyn SettingsProvider>,
    tasks: Arc<TaskQueue>,
    fetcher: Arc<HubFetcher>,
    policy: Arc<PolicyEngine>,
    dedup: DedupResolver,
    extractor: ContentExtractor,
    sitemaps: SitemapCrawler,
    images: AssetImporter,
}

impl SyncOrchestrator {
    /// Build an orchestrator and register the policy hooks on the store
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built or the hooks cannot be
    /// registered.
    pub fn new(config: &Config, services: HubServices) -> Result<Self> {
        let fetcher = Arc::new(HubFetcher::from_config(&config.crawler)?);
        Self::with_fetcher(config, services, fetcher)
    }

    /// Same as [`SyncOrchestrator::new`] with a caller-provided fetcher
    pub fn with_fetcher(
        config: &Config,
        services: HubServices,
        fetcher: Arc<HubFetcher>,
    ) -> Result<Self> {
        let HubServices {
            store,
            states,
            assets,
            settings,
            directory,
            tasks,
        } = services;

        let policy = Arc::new(PolicyEngine::new(settings.clone()));
        store.add_hook(policy.clone())?;
        store.add_hook(Arc::new(NetworkLabelStamp::new(settings.clone())))?;

        let timeout = config.crawler.request_timeout();

        tracing::debug!(
            policy = %policy.setting().as_str(),
            batch_size = config.import.batch_size,
            "Sync orchestrator ready"
        );

        Ok(Self {
            config: config.clone(),
            dedup: DedupResolver::new(store.clone()),
            extractor: ContentExtractor::new(),
            sitemaps: SitemapCrawler::new(fetcher.clone(), timeout),
            images: AssetImporter::new(fetcher.clone(), assets, store.clone(), timeout),
            store,
            states,
            directory,
            settings,
            tasks,
            fetcher,
            policy,
        })
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn states(&self) -> &Arc<dyn NodeStateStore> {
        &self.states
    }

    pub fn tasks(&self) -> &Arc<TaskQueue> {
        &self.tasks
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Error log
    // ========================================================================

    /// Append an entry to a node's error log, keeping the newest entries
    pub fn record_error(
        &self,
        node_id: &str,
        error_type: &str,
        message: &str,
        context: serde_json::Value,
    ) -> Result<()> {
        tracing::warn!(
            node_id = %node_id,
            error_type = %error_type,
            context = %context,
            "{}",
            message
        );

        let entry = ErrorLogEntry {
            timestamp: Utc::now(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            context,
        };
        let capacity = self.config.error_log.capacity;
        let mut entry = Some(entry);
        self.states.update(node_id, &mut |s: &mut NodeState| {
            if let Some(entry) = entry.take() {
                s.push_error(entry, capacity);
            }
        })?;
        Ok(())
    }

    /// Like [`SyncOrchestrator::record_error`] for callers already on a
    /// failure path; a state write error is only logged
    pub(crate) fn note_error(
        &self,
        node_id: &str,
        error_type: &str,
        message: &str,
        context: serde_json::Value,
    ) {
        if let Err(e) = self.record_error(node_id, error_type, message, context) {
            tracing::error!(node_id = %node_id, error = %e, "Failed to record error log entry");
        }
    }

    // ========================================================================
    // Shared write path
    // ========================================================================

    /// Create or update a pulled item for `node_id`
    ///
    /// Pulled items are written by the node's crawler identity, so the
    /// policy status always applies. A matching hash means no write.
    pub(crate) async fn upsert_pulled(
        &self,
        node_id: &str,
        pulled: PulledItem,
    ) -> Result<(ContentItem, SyncAction)> {
        let existing = self
            .dedup
            .find(&pulled.source_url, node_id, "", pulled.guid.as_deref())?;
        self.write_pulled(node_id, existing, pulled).await
    }

    /// Hash-compare write of `pulled` against an already resolved item
    pub(crate) async fn write_pulled(
        &self,
        node_id: &str,
        existing: Option<ContentItem>,
        pulled: PulledItem,
    ) -> Result<(ContentItem, SyncAction)> {
        let actor = Actor::for_node(node_id);
        let now = Utc::now();
        let hash = content_hash(&pulled.title, &pulled.body);

        let (item, action) = match existing {
            Some(current) if current.content_hash == hash => {
                tracing::debug!(
                    node_id = %node_id,
                    url = %pulled.source_url,
                    item_id = %current.id,
                    "Content unchanged, skipping write"
                );
                (current, SyncAction::Unchanged)
            }
            Some(mut current) => {
                current.title = pulled.title;
                current.body = pulled.body;
                current.excerpt = pulled.excerpt;
                current.modified_date = now;
                current.content_hash = hash;
                current.metadata.last_crawl_check = Some(now);
                if current.guid.is_none() {
                    current.guid = pulled.guid;
                }
                let updated = self
                    .store
                    .update(current, &WriteContext::update(&actor))?;
                (updated, SyncAction::Updated)
            }
            None => {
                let mut item = ContentItem::new(pulled.source_type, &pulled.source_url, node_id, "");
                item.guid = pulled.guid;
                item.metadata.original_title = pulled.title.clone();
                item.title = pulled.title;
                item.body = pulled.body;
                item.excerpt = pulled.excerpt;
                item.publish_date = pulled.publish_date.unwrap_or(now);
                item.modified_date = item.publish_date;
                item.content_hash = hash;
                item.author_id = actor.id.clone();
                item.status = self.policy.enforce(&actor, None);
                item.metadata.last_crawl_check = Some(now);
                item.metadata.original_featured_image_url = pulled.featured_image_url.clone();
                if pulled.source_type == SourceType::Sitemap {
                    item.metadata.imported_at = Some(now);
                }
                let created = self
                    .store
                    .insert(item, &WriteContext::create(&actor))?;
                (created, SyncAction::Created)
            }
        };

        if action != SyncAction::Unchanged {
            let item = self
                .attach_image(item, pulled.featured_image_url.as_deref())
                .await;
            return Ok((item, action));
        }
        Ok((item, action))
    }

    /// Import `image_url` as featured image unless the item already has one
    ///
    /// Failures are logged and never fail the enclosing sync.
    pub(crate) async fn attach_image(&self, item: ContentItem, image_url: Option<&str>) -> ContentItem {
        let Some(image_url) = image_url.filter(|u| !u.is_empty()) else {
            return item;
        };
        if item.featured_image_ref.is_some() {
            return item;
        }

        match self.images.import_featured_image(&item.id, image_url).await {
            Ok(asset_ref) => ContentItem {
                featured_image_ref: Some(asset_ref),
                ..item
            },
            Err(e) => {
                tracing::warn!(
                    item_id = %item.id,
                    node_id = %item.node_id,
                    image_url = %image_url,
                    error = %e,
                    "Featured image import failed"
                );
                item
            }
        }
    }
}
