//! Content store abstraction with write lifecycle hooks
//!
//! The store is treated as a third-party component: it runs its own
//! registered hooks around every write, and those hooks may change an
//! item on the way in. Callers that care about a post-condition (the
//! policy engine, for one) register a [`WriteHook`] and re-assert it
//! after the write.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Sync Orchestrator                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ insert / update
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ContentStore:  before_write hooks → write_raw →            │
//! │                 after_write hooks → status correction       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   ┌──────────┴──────────┐
//!                   ▼                     ▼
//!          ┌─────────────────┐   ┌─────────────────┐
//!          │     SQLite      │   │     Memory      │
//!          └─────────────────┘   └─────────────────┘
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::models::{Actor, ContentItem, ItemMetadata, ItemStatus, SourceType};

// ============================================================================
// Hooks
// ============================================================================

/// Kind of write being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

/// Who is writing and how
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub op: WriteOp,
    pub actor: Actor,
}

impl WriteContext {
    pub fn create(actor: &Actor) -> Self {
        Self {
            op: WriteOp::Create,
            actor: actor.clone(),
        }
    }

    pub fn update(actor: &Actor) -> Self {
        Self {
            op: WriteOp::Update,
            actor: actor.clone(),
        }
    }
}

/// Lifecycle callback run by the store around each write
pub trait WriteHook: Send + Sync {
    /// Hook name for logs
    fn name(&self) -> &str;

    /// Called with the item about to be persisted
    fn before_write(&self, _item: &mut ContentItem, _ctx: &WriteContext) {}

    /// Called with the item as stored
    ///
    /// Returning a status asks the store to correct the stored value.
    fn after_write(&self, _stored: &ContentItem, _ctx: &WriteContext) -> Option<ItemStatus> {
        None
    }
}

/// Ordered list of registered hooks
#[derive(Default)]
pub struct HookChain {
    hooks: RwLock<Vec<Arc<dyn WriteHook>>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn WriteHook>) -> Result<()> {
        let mut hooks = self
            .hooks
            .write()
            .map_err(|_| Error::store("hook registry lock poisoned"))?;
        tracing::debug!(hook = hook.name(), "Registered write hook");
        hooks.push(hook);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Arc<dyn WriteHook>>> {
        self.hooks
            .read()
            .map(|h| h.clone())
            .map_err(|_| Error::store("hook registry lock poisoned"))
    }

    /// Run every `before_write` in registration order
    pub fn run_before(&self, item: &mut ContentItem, ctx: &WriteContext) -> Result<()> {
        for hook in self.snapshot()? {
            hook.before_write(item, ctx);
        }
        Ok(())
    }

    /// Run every `after_write`; the last requested correction wins
    pub fn run_after(&self, stored: &ContentItem, ctx: &WriteContext) -> Result<Option<ItemStatus>> {
        let mut correction = None;
        for hook in self.snapshot()? {
            if let Some(status) = hook.after_write(stored, ctx) {
                correction = Some(status);
            }
        }
        Ok(correction)
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistent storage of content items
///
/// Backends implement the raw operations; `insert` and `update` wrap
/// them with the hook lifecycle. `write_raw` and the `set_*` methods
/// bypass hooks and are meant for metadata-only changes.
pub trait ContentStore: Send + Sync {
    /// Hooks run around `insert` and `update`
    fn hooks(&self) -> &HookChain;

    /// Upsert an item by id without running hooks
    fn write_raw(&self, item: &ContentItem) -> Result<()>;

    /// Get item by id
    fn get(&self, id: &str) -> Result<Option<ContentItem>>;

    /// Non-trashed items matching all three identity keys
    fn find_by_identity(
        &self,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
    ) -> Result<Vec<ContentItem>>;

    /// Non-trashed items of a node matching the GUID or the source URL
    fn find_pull_item(
        &self,
        node_id: &str,
        guid: Option<&str>,
        source_url: &str,
    ) -> Result<Vec<ContentItem>>;

    /// Permanently delete an item; false when it did not exist
    fn delete(&self, id: &str) -> Result<bool>;

    /// All items, oldest first
    fn list(&self) -> Result<Vec<ContentItem>>;

    /// Count stored items
    fn count(&self) -> Result<usize>;

    /// Overwrite the stored status without running hooks
    fn set_status_raw(&self, id: &str, status: ItemStatus) -> Result<()>;

    /// Attach an asset unless the item already has one
    ///
    /// Returns whether the asset was attached.
    fn set_featured_image_if_absent(&self, id: &str, asset_ref: &str) -> Result<bool>;

    /// Rewrite the network label on every item; returns rows changed
    fn set_network_label_all(&self, label: &str) -> Result<usize>;

    fn add_hook(&self, hook: Arc<dyn WriteHook>) -> Result<()> {
        self.hooks().register(hook)
    }

    /// Create an item, assigning its id
    fn insert(&self, mut item: ContentItem, ctx: &WriteContext) -> Result<ContentItem> {
        if item.id.is_empty() {
            item.id = uuid::Uuid::new_v4().to_string();
        }
        self.hooks().run_before(&mut item, ctx)?;
        self.write_raw(&item)?;
        self.settle(item, ctx)
    }

    /// Update an existing item
    fn update(&self, mut item: ContentItem, ctx: &WriteContext) -> Result<ContentItem> {
        if item.is_new() || self.get(&item.id)?.is_none() {
            return Err(Error::not_found("content item", item.id));
        }
        self.hooks().run_before(&mut item, ctx)?;
        self.write_raw(&item)?;
        self.settle(item, ctx)
    }

    /// Run `after_write` hooks and apply a requested correction
    fn settle(&self, mut stored: ContentItem, ctx: &WriteContext) -> Result<ContentItem> {
        if let Some(status) = self.hooks().run_after(&stored, ctx)? {
            if status != stored.status {
                tracing::warn!(
                    item_id = %stored.id,
                    stored = %stored.status,
                    corrected = %status,
                    "Correcting stored status after write"
                );
                self.set_status_raw(&stored.id, status)?;
                stored.status = status;
            }
        }
        Ok(stored)
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`ContentStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteContentStore {
    conn: Mutex<Connection>,
    hooks: HookChain,
}

const ITEM_COLUMNS: &str = "id, title, body, excerpt, source_url, node_id, original_item_id, guid, \
    source_type, content_hash, status, featured_image_ref, publish_date, modified_date, \
    network_label, slug, author_id, metadata";

impl SqliteContentStore {
    /// Open or create a store at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            hooks: HookChain::new(),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite content store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            hooks: HookChain::new(),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::store("SQLite connection lock poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS content_items (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL,
                    excerpt TEXT NOT NULL,
                    source_url TEXT NOT NULL,
                    node_id TEXT NOT NULL,
                    original_item_id TEXT NOT NULL DEFAULT '',
                    guid TEXT,
                    source_type TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    status TEXT NOT NULL,
                    featured_image_ref TEXT,
                    publish_date TEXT NOT NULL,
                    modified_date TEXT NOT NULL,
                    network_label TEXT NOT NULL DEFAULT '',
                    slug TEXT NOT NULL,
                    author_id TEXT NOT NULL DEFAULT '',
                    metadata TEXT NOT NULL DEFAULT '{}'
                );

                CREATE INDEX IF NOT EXISTS idx_content_items_identity
                    ON content_items(node_id, source_url, original_item_id);

                CREATE INDEX IF NOT EXISTS idx_content_items_guid
                    ON content_items(node_id, guid);
                "#,
        )?;

        Ok(())
    }

    fn query_items(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<ContentItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let items = stmt
            .query_map(params, row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    let source_type: String = row.get(8)?;
    let status: String = row.get(10)?;
    let metadata: String = row.get(17)?;

    Ok(ContentItem {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        excerpt: row.get(3)?,
        source_url: row.get(4)?,
        node_id: row.get(5)?,
        original_item_id: row.get(6)?,
        guid: row.get(7)?,
        source_type: SourceType::parse(&source_type)
            .ok_or_else(|| conversion_error(8, format!("unknown source type: {source_type}")))?,
        content_hash: row.get(9)?,
        status: ItemStatus::parse(&status)
            .ok_or_else(|| conversion_error(10, format!("unknown status: {status}")))?,
        featured_image_ref: row.get(11)?,
        publish_date: parse_time(row, 12)?,
        modified_date: parse_time(row, 13)?,
        network_label: row.get(14)?,
        slug: row.get(15)?,
        author_id: row.get(16)?,
        metadata: serde_json::from_str::<ItemMetadata>(&metadata)
            .map_err(|e| conversion_error(17, e))?,
    })
}

impl ContentStore for SqliteContentStore {
    fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    fn write_raw(&self, item: &ContentItem) -> Result<()> {
        let metadata = serde_json::to_string(&item.metadata)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
                INSERT INTO content_items (
                    id, title, body, excerpt, source_url, node_id, original_item_id, guid,
                    source_type, content_hash, status, featured_image_ref, publish_date,
                    modified_date, network_label, slug, author_id, metadata
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    body = excluded.body,
                    excerpt = excluded.excerpt,
                    source_url = excluded.source_url,
                    node_id = excluded.node_id,
                    original_item_id = excluded.original_item_id,
                    guid = excluded.guid,
                    source_type = excluded.source_type,
                    content_hash = excluded.content_hash,
                    status = excluded.status,
                    featured_image_ref = excluded.featured_image_ref,
                    publish_date = excluded.publish_date,
                    modified_date = excluded.modified_date,
                    network_label = excluded.network_label,
                    slug = excluded.slug,
                    author_id = excluded.author_id,
                    metadata = excluded.metadata
                "#,
            params![
                item.id,
                item.title,
                item.body,
                item.excerpt,
                item.source_url,
                item.node_id,
                item.original_item_id,
                item.guid,
                item.source_type.as_str(),
                item.content_hash,
                item.status.as_str(),
                item.featured_image_ref,
                item.publish_date.to_rfc3339(),
                item.modified_date.to_rfc3339(),
                item.network_label,
                item.slug,
                item.author_id,
                metadata,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ContentItem>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM content_items WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn find_by_identity(
        &self,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
    ) -> Result<Vec<ContentItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM content_items
                 WHERE source_url = ?1 AND node_id = ?2 AND original_item_id = ?3
                   AND status != 'trashed'
                 ORDER BY publish_date, id"
            ),
            &[&source_url, &node_id, &original_item_id],
        )
    }

    fn find_pull_item(
        &self,
        node_id: &str,
        guid: Option<&str>,
        source_url: &str,
    ) -> Result<Vec<ContentItem>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM content_items
                 WHERE node_id = ?1 AND status != 'trashed'
                   AND ((?2 IS NOT NULL AND guid = ?2) OR source_url = ?3)
                 ORDER BY publish_date, id"
            ),
            &[&node_id, &guid, &source_url],
        )
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn list(&self) -> Result<Vec<ContentItem>> {
        self.query_items(
            &format!("SELECT {ITEM_COLUMNS} FROM content_items ORDER BY publish_date, id"),
            &[],
        )
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn set_status_raw(&self, id: &str, status: ItemStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE content_items SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    fn set_featured_image_if_absent(&self, id: &str, asset_ref: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE content_items SET featured_image_ref = ?1
             WHERE id = ?2 AND featured_image_ref IS NULL",
            params![asset_ref, id],
        )?;
        Ok(rows > 0)
    }

    fn set_network_label_all(&self, label: &str) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE content_items SET network_label = ?1 WHERE network_label != ?1",
            params![label],
        )?;
        Ok(rows)
    }
}

// ============================================================================
// Memory Implementation
// ============================================================================

/// In-memory implementation of [`ContentStore`]
///
/// Useful for testing without database dependencies.
#[derive(Default)]
pub struct MemoryContentStore {
    items: RwLock<HashMap<String, ContentItem>>,
    hooks: HookChain,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, ContentItem>>> {
        self.items
            .read()
            .map_err(|_| Error::store("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, ContentItem>>> {
        self.items
            .write()
            .map_err(|_| Error::store("memory store lock poisoned"))
    }

    fn select(&self, pred: impl Fn(&ContentItem) -> bool) -> Result<Vec<ContentItem>> {
        let mut items: Vec<ContentItem> = self.read()?.values().filter(|i| pred(i)).cloned().collect();
        items.sort_by(|a, b| (a.publish_date, &a.id).cmp(&(b.publish_date, &b.id)));
        Ok(items)
    }
}

impl ContentStore for MemoryContentStore {
    fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    fn write_raw(&self, item: &ContentItem) -> Result<()> {
        self.write()?.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ContentItem>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn find_by_identity(
        &self,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
    ) -> Result<Vec<ContentItem>> {
        self.select(|i| {
            i.status != ItemStatus::Trashed
                && i.source_url == source_url
                && i.node_id == node_id
                && i.original_item_id == original_item_id
        })
    }

    fn find_pull_item(
        &self,
        node_id: &str,
        guid: Option<&str>,
        source_url: &str,
    ) -> Result<Vec<ContentItem>> {
        self.select(|i| {
            i.status != ItemStatus::Trashed
                && i.node_id == node_id
                && ((guid.is_some() && i.guid.as_deref() == guid) || i.source_url == source_url)
        })
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.write()?.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<ContentItem>> {
        self.select(|_| true)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    fn set_status_raw(&self, id: &str, status: ItemStatus) -> Result<()> {
        if let Some(item) = self.write()?.get_mut(id) {
            item.status = status;
        }
        Ok(())
    }

    fn set_featured_image_if_absent(&self, id: &str, asset_ref: &str) -> Result<bool> {
        let mut items = self.write()?;
        match items.get_mut(id) {
            Some(item) if item.featured_image_ref.is_none() => {
                item.featured_image_ref = Some(asset_ref.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_network_label_all(&self, label: &str) -> Result<usize> {
        let mut changed = 0;
        for item in self.write()?.values_mut() {
            if item.network_label != label {
                item.network_label = label.to_string();
                changed += 1;
            }
        }
        Ok(changed)
    }
}
