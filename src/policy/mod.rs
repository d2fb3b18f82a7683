//! Publication policy for automated node writes
//!
//! Items written by a node's connector never choose their own status.
//! The organization setting decides, and the decision is re-asserted at
//! three points of every write:
//!
//! 1. [`PolicyEngine::intercept_request`] when the request body arrives
//! 2. `before_write` right before the store persists the item
//! 3. `after_write` on the stored item, correcting any drift caused by
//!    other store hooks
//!
//! Operators are not subject to the policy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{Actor, ContentItem, ItemStatus};
use crate::storage::repository::{WriteContext, WriteHook, WriteOp};

// ============================================================================
// Settings
// ============================================================================

/// Organization-wide registration policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicySetting {
    PublishDirectly,
    #[default]
    ReviewRequired,
}

impl PolicySetting {
    /// Status every automated write ends up with
    pub fn effective_status(&self) -> ItemStatus {
        match self {
            Self::PublishDirectly => ItemStatus::Published,
            Self::ReviewRequired => ItemStatus::PendingReview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishDirectly => "publish-directly",
            Self::ReviewRequired => "review-required",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "publish-directly" | "publish" => Some(Self::PublishDirectly),
            "review-required" | "pending" => Some(Self::ReviewRequired),
            _ => None,
        }
    }
}

/// Source of organization settings
pub trait SettingsProvider: Send + Sync {
    fn policy_setting(&self) -> PolicySetting;

    fn network_label(&self) -> String;
}

/// Settings held in memory, changeable at runtime
#[derive(Debug, Default)]
pub struct StaticSettings {
    policy: RwLock<PolicySetting>,
    network_label: RwLock<String>,
}

impl StaticSettings {
    pub fn new(policy: PolicySetting, network_label: impl Into<String>) -> Self {
        Self {
            policy: RwLock::new(policy),
            network_label: RwLock::new(network_label.into()),
        }
    }

    pub fn set_policy(&self, policy: PolicySetting) {
        if let Ok(mut current) = self.policy.write() {
            *current = policy;
        }
    }

    pub fn set_network_label(&self, label: impl Into<String>) {
        if let Ok(mut current) = self.network_label.write() {
            *current = label.into();
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn policy_setting(&self) -> PolicySetting {
        self.policy.read().map(|p| *p).unwrap_or_default()
    }

    fn network_label(&self) -> String {
        self.network_label
            .read()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

// ============================================================================
// Actor Directory
// ============================================================================

/// Maps actor ids to their kind and bound node
pub trait ActorDirectory: Send + Sync {
    fn get(&self, actor_id: &str) -> Result<Option<Actor>>;

    /// Bind an actor to a node, replacing any previous binding
    fn bind_node(&self, actor_id: &str, node_id: &str) -> Result<()>;
}

/// In-memory [`ActorDirectory`]
#[derive(Debug, Default)]
pub struct MemoryActorDirectory {
    actors: RwLock<HashMap<String, Actor>>,
}

impl MemoryActorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, actor: Actor) -> Result<()> {
        self.actors
            .write()
            .map_err(|_| Error::store("actor directory lock poisoned"))?
            .insert(actor.id.clone(), actor);
        Ok(())
    }
}

impl ActorDirectory for MemoryActorDirectory {
    fn get(&self, actor_id: &str) -> Result<Option<Actor>> {
        Ok(self
            .actors
            .read()
            .map_err(|_| Error::store("actor directory lock poisoned"))?
            .get(actor_id)
            .cloned())
    }

    fn bind_node(&self, actor_id: &str, node_id: &str) -> Result<()> {
        let mut actors = self
            .actors
            .write()
            .map_err(|_| Error::store("actor directory lock poisoned"))?;
        let actor = actors
            .get_mut(actor_id)
            .ok_or_else(|| Error::not_found("actor", actor_id))?;
        actor.node_id = Some(node_id.to_string());
        Ok(())
    }
}

/// [`ActorDirectory`] kept in a JSON file
///
/// The whole directory is rewritten on each binding change.
pub struct JsonActorDirectory {
    path: PathBuf,
    inner: MemoryActorDirectory,
}

impl JsonActorDirectory {
    /// Open the directory at `path`; a missing file is an empty directory
    pub fn open(path: &Path) -> Result<Self> {
        let inner = MemoryActorDirectory::new();
        if path.exists() {
            let actors: Vec<Actor> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            for actor in actors {
                inner.insert(actor)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    /// Add or replace an actor and save
    pub fn insert(&self, actor: Actor) -> Result<()> {
        self.inner.insert(actor)?;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut actors: Vec<Actor> = self
            .inner
            .actors
            .read()
            .map_err(|_| Error::store("actor directory lock poisoned"))?
            .values()
            .cloned()
            .collect();
        actors.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(&actors)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl ActorDirectory for JsonActorDirectory {
    fn get(&self, actor_id: &str) -> Result<Option<Actor>> {
        self.inner.get(actor_id)
    }

    fn bind_node(&self, actor_id: &str, node_id: &str) -> Result<()> {
        self.inner.bind_node(actor_id, node_id)?;
        self.save()
    }
}

// ============================================================================
// Policy Engine
// ============================================================================

/// Pure policy decision
///
/// Automated node actors always get the policy status; anyone else keeps
/// what they asked for, defaulting to the policy status.
pub fn enforce(
    actor_is_automated_node: bool,
    setting: PolicySetting,
    requested: Option<ItemStatus>,
) -> ItemStatus {
    if actor_is_automated_node {
        return setting.effective_status();
    }
    requested.unwrap_or_else(|| setting.effective_status())
}

/// Applies the registration policy to writes and deletes
pub struct PolicyEngine {
    settings: Arc<dyn SettingsProvider>,
}

impl PolicyEngine {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self { settings }
    }

    pub fn setting(&self) -> PolicySetting {
        self.settings.policy_setting()
    }

    /// Status the current policy enforces
    pub fn effective_status(&self) -> ItemStatus {
        self.setting().effective_status()
    }

    /// Status an actor's write ends up with
    pub fn enforce(&self, actor: &Actor, requested: Option<ItemStatus>) -> ItemStatus {
        enforce(actor.is_automated(), self.setting(), requested)
    }

    /// Checkpoint 1: rewrite the `status` field of an incoming request
    ///
    /// For automated actors the field is overwritten with the policy
    /// status. Returns the status the write should carry.
    pub fn intercept_request(&self, actor: &Actor, body: &mut Map<String, Value>) -> ItemStatus {
        let requested = body.get("status").and_then(Value::as_str).map(str::to_string);
        let parsed = requested.as_deref().and_then(ItemStatus::parse);
        let status = self.enforce(actor, parsed);

        if !actor.is_automated() {
            return status;
        }

        if let Some(attempted) = requested {
            if parsed != Some(status) {
                tracing::warn!(
                    actor_id = %actor.id,
                    attempted = %attempted,
                    enforced = %status,
                    "Intercepted unauthorized status"
                );
            }
        }
        body.insert("status".to_string(), Value::String(status.as_str().to_string()));
        status
    }

    /// Check whether `actor` may permanently delete `item`
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for automated actors deleting another
    /// node's item or an item awaiting review.
    pub fn authorize_delete(&self, actor: &Actor, item: &ContentItem) -> Result<()> {
        if !actor.is_automated() {
            return Ok(());
        }

        if item.status == ItemStatus::PendingReview {
            return Err(Error::permission_denied(
                &actor.id,
                "items pending review cannot be deleted by a node",
            ));
        }

        let owns = item.author_id == actor.id;
        let same_node = actor.node_id.as_deref() == Some(item.node_id.as_str());
        if owns || same_node {
            Ok(())
        } else {
            Err(Error::permission_denied(
                &actor.id,
                format!("item {} belongs to another node", item.id),
            ))
        }
    }

    fn audit(&self, ctx: &WriteContext, item_id: &str, attempted: ItemStatus, enforced: ItemStatus, stage: &str) {
        let violation = Error::PolicyViolation {
            attempted: attempted.to_string(),
            enforced: enforced.to_string(),
        };
        let op = match ctx.op {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
        };
        tracing::warn!(
            actor_id = %ctx.actor.id,
            item_id = %item_id,
            op,
            stage,
            "{violation}"
        );
    }
}

impl WriteHook for PolicyEngine {
    fn name(&self) -> &str {
        "registration-policy"
    }

    /// Checkpoint 2
    fn before_write(&self, item: &mut ContentItem, ctx: &WriteContext) {
        if !ctx.actor.is_automated() || item.status == ItemStatus::Trashed {
            return;
        }
        let enforced = self.effective_status();
        if item.status != enforced {
            self.audit(ctx, &item.id, item.status, enforced, "before_write");
            item.status = enforced;
        }
    }

    /// Checkpoint 3
    fn after_write(&self, stored: &ContentItem, ctx: &WriteContext) -> Option<ItemStatus> {
        if !ctx.actor.is_automated() || stored.status == ItemStatus::Trashed {
            return None;
        }
        let enforced = self.effective_status();
        if stored.status == enforced {
            return None;
        }
        self.audit(ctx, &stored.id, stored.status, enforced, "after_write");
        Some(enforced)
    }
}

/// Stamps the current network label on every saved item
pub struct NetworkLabelStamp {
    settings: Arc<dyn SettingsProvider>,
}

impl NetworkLabelStamp {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self { settings }
    }
}

impl WriteHook for NetworkLabelStamp {
    fn name(&self) -> &str {
        "network-label"
    }

    fn before_write(&self, item: &mut ContentItem, _ctx: &WriteContext) {
        item.network_label = self.settings.network_label();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::storage::repository::{ContentStore, MemoryContentStore};
    use serde_json::json;

    fn engine(setting: PolicySetting) -> (Arc<StaticSettings>, PolicyEngine) {
        let settings = Arc::new(StaticSettings::new(setting, "Chiral"));
        let engine = PolicyEngine::new(settings.clone());
        (settings, engine)
    }

    fn porter() -> Actor {
        Actor::automated("porter-1", Some("N1"))
    }

    #[test]
    fn test_enforce_table() {
        use ItemStatus::*;
        use PolicySetting::*;
        assert_eq!(enforce(true, ReviewRequired, Some(Published)), PendingReview);
        assert_eq!(enforce(true, PublishDirectly, Some(Draft)), Published);
        assert_eq!(enforce(true, PublishDirectly, None), Published);
        assert_eq!(enforce(false, ReviewRequired, Some(Published)), Published);
        assert_eq!(enforce(false, ReviewRequired, None), PendingReview);
    }

    #[test]
    fn test_policy_setting_parse() {
        assert_eq!(PolicySetting::parse("publish_directly"), Some(PolicySetting::PublishDirectly));
        assert_eq!(PolicySetting::parse("Review-Required"), Some(PolicySetting::ReviewRequired));
        assert_eq!(PolicySetting::parse("maybe"), None);
    }

    #[test]
    fn test_intercept_overwrites_status_for_porter() {
        let (_, engine) = engine(PolicySetting::ReviewRequired);
        let mut body = json!({"title": "T", "status": "publish"}).as_object().unwrap().clone();
        let status = engine.intercept_request(&porter(), &mut body);
        assert_eq!(status, ItemStatus::PendingReview);
        assert_eq!(body["status"], "pending-review");

        let mut body = Map::new();
        engine.intercept_request(&porter(), &mut body);
        assert_eq!(body["status"], "pending-review");
    }

    #[test]
    fn test_intercept_leaves_operator_alone() {
        let (_, engine) = engine(PolicySetting::ReviewRequired);
        let mut body = json!({"status": "draft"}).as_object().unwrap().clone();
        assert_eq!(
            engine.intercept_request(&Actor::operator("admin"), &mut body),
            ItemStatus::Draft
        );
        assert_eq!(body["status"], "draft");
    }

    #[test]
    fn test_policy_change_applies_to_next_write() {
        let (settings, engine) = engine(PolicySetting::ReviewRequired);
        assert_eq!(engine.effective_status(), ItemStatus::PendingReview);
        settings.set_policy(PolicySetting::PublishDirectly);
        assert_eq!(engine.effective_status(), ItemStatus::Published);
    }

    /// Store hook that publishes everything after the fact
    struct RoguePublisher;

    impl WriteHook for RoguePublisher {
        fn name(&self) -> &str {
            "rogue"
        }

        fn before_write(&self, item: &mut ContentItem, _ctx: &WriteContext) {
            item.status = ItemStatus::Published;
        }
    }

    #[test]
    fn test_hooks_correct_rogue_store_hook() {
        let (_, engine) = engine(PolicySetting::ReviewRequired);
        let store = MemoryContentStore::new();
        store.add_hook(Arc::new(engine)).unwrap();
        // Registered later, so it runs after the policy's before_write
        store.add_hook(Arc::new(RoguePublisher)).unwrap();

        let mut item = ContentItem::new(SourceType::Push, "https://a.example/p1", "N1", "1");
        item.status = ItemStatus::Published;
        let stored = store
            .insert(item, &WriteContext::create(&porter()))
            .unwrap();

        assert_eq!(stored.status, ItemStatus::PendingReview);
        assert_eq!(
            store.get(&stored.id).unwrap().unwrap().status,
            ItemStatus::PendingReview
        );
    }

    #[test]
    fn test_hooks_skip_operator_and_trashed() {
        let (_, engine) = engine(PolicySetting::ReviewRequired);
        let ctx = WriteContext::update(&Actor::operator("admin"));
        let mut item = ContentItem::new(SourceType::Push, "https://a.example/p1", "N1", "1");
        item.status = ItemStatus::Published;
        engine.before_write(&mut item, &ctx);
        assert_eq!(item.status, ItemStatus::Published);

        let ctx = WriteContext::update(&porter());
        item.status = ItemStatus::Trashed;
        engine.before_write(&mut item, &ctx);
        assert_eq!(item.status, ItemStatus::Trashed);
        assert_eq!(engine.after_write(&item, &ctx), None);
    }

    #[test]
    fn test_authorize_delete() {
        let (_, engine) = engine(PolicySetting::ReviewRequired);
        let mut item = ContentItem::new(SourceType::Push, "https://a.example/p1", "N1", "1");
        item.id = "42".into();
        item.status = ItemStatus::Published;
        item.author_id = "someone-else".into();

        assert!(engine.authorize_delete(&porter(), &item).is_ok());
        assert!(engine.authorize_delete(&Actor::operator("admin"), &item).is_ok());

        let stranger = Actor::automated("porter-2", Some("N2"));
        assert!(matches!(
            engine.authorize_delete(&stranger, &item),
            Err(Error::PermissionDenied { .. })
        ));

        item.author_id = "porter-2".into();
        assert!(engine.authorize_delete(&stranger, &item).is_ok());

        item.status = ItemStatus::PendingReview;
        assert!(engine.authorize_delete(&porter(), &item).is_err());
        assert!(engine.authorize_delete(&Actor::operator("admin"), &item).is_ok());
    }

    #[test]
    fn test_label_stamp_and_directory() {
        let settings = Arc::new(StaticSettings::new(PolicySetting::ReviewRequired, "Net A"));
        let stamp = NetworkLabelStamp::new(settings.clone());
        let mut item = ContentItem::new(SourceType::Rss, "https://a.example/p1", "N1", "");
        stamp.before_write(&mut item, &WriteContext::create(&porter()));
        assert_eq!(item.network_label, "Net A");

        let directory = MemoryActorDirectory::new();
        directory.insert(Actor::automated("porter-1", None)).unwrap();
        directory.bind_node("porter-1", "N7").unwrap();
        assert_eq!(
            directory.get("porter-1").unwrap().unwrap().node_id.as_deref(),
            Some("N7")
        );
        assert!(directory.bind_node("nobody", "N7").is_err());
    }

    #[test]
    fn test_json_directory_persists_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actors.json");
        {
            let directory = JsonActorDirectory::open(&path).unwrap();
            directory.insert(Actor::automated("porter-1", None)).unwrap();
            directory.bind_node("porter-1", "N3").unwrap();
        }
        let directory = JsonActorDirectory::open(&path).unwrap();
        let actor = directory.get("porter-1").unwrap().unwrap();
        assert_eq!(actor.node_id.as_deref(), Some("N3"));
        assert!(actor.is_automated());
    }
}
