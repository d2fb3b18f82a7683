//! Push ingestion: idempotence, identity and policy enforcement

use std::sync::Arc;

use chiral_hub::models::{ContentItem, ItemStatus, SourceType, SyncAction};
use chiral_hub::policy::{PolicySetting, StaticSettings};
use chiral_hub::storage::{ContentStore, SqliteContentStore, WriteContext, WriteHook};
use chiral_hub::sync::{HubServices, SyncOrchestrator};
use serde_json::json;
use tempfile::TempDir;

use crate::common::{porter, push_payload, test_config, test_hub};

// ============================================================================
// Idempotence and Identity
// ============================================================================

#[tokio::test]
async fn test_identical_push_is_a_noop() {
    let t = test_hub(PolicySetting::ReviewRequired);

    let first = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    let second = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();

    assert_eq!(first.action, SyncAction::Created);
    assert_eq!(second.action, SyncAction::Unchanged);
    assert_eq!(second.item.id, first.item.id);
    assert_eq!(second.item.modified_date, first.item.modified_date);
    assert_eq!(t.hub.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_same_identity_updates_in_place() {
    let t = test_hub(PolicySetting::ReviewRequired);

    let first = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    let mut changed = push_payload("T (edited)");
    changed["modified_date_gmt"] = json!("2024-05-02 10:00:00");
    let second = t.hub.push_item(&porter(), changed).await.unwrap();

    assert_eq!(second.action, SyncAction::Updated);
    assert_eq!(second.item.id, first.item.id);
    assert_eq!(second.item.title, "T (edited)");
    assert_eq!(second.item.slug, first.item.slug);
    assert_ne!(second.item.content_hash, first.item.content_hash);
    assert_eq!(t.hub.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_different_original_id_creates_new_item() {
    let t = test_hub(PolicySetting::ReviewRequired);

    t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    let mut other = push_payload("T");
    other["original_post_id"] = json!("2");
    t.hub.push_item(&porter(), other).await.unwrap();

    assert_eq!(t.hub.store().count().unwrap(), 2);
}

#[tokio::test]
async fn test_trashed_item_does_not_block_identity() {
    let t = test_hub(PolicySetting::PublishDirectly);
    let first = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    t.hub
        .store()
        .set_status_raw(&first.item.id, ItemStatus::Trashed)
        .unwrap();

    let second = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    assert_eq!(second.action, SyncAction::Created);
    assert_ne!(second.item.id, first.item.id);
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn test_attempted_publish_stays_pending() {
    let t = test_hub(PolicySetting::ReviewRequired);

    let mut body = push_payload("T");
    body["status"] = json!("publish");
    let outcome = t.hub.push_item(&porter(), body).await.unwrap();

    assert_eq!(outcome.item.status, ItemStatus::PendingReview);
    let stored = t.hub.store().get(&outcome.item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::PendingReview);
}

#[tokio::test]
async fn test_policy_change_applies_to_next_update() {
    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub.push_item(&porter(), push_payload("T")).await.unwrap();

    t.settings.set_policy(PolicySetting::PublishDirectly);
    let outcome = t.hub.push_item(&porter(), push_payload("T2")).await.unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Published);
}

/// A storage trigger that publishes everything it sees
struct AutoPublishTrigger;

impl WriteHook for AutoPublishTrigger {
    fn name(&self) -> &str {
        "auto-publish"
    }

    fn before_write(&self, item: &mut ContentItem, _ctx: &WriteContext) {
        item.status = ItemStatus::Published;
    }
}

#[tokio::test]
async fn test_storage_trigger_is_corrected_after_write() {
    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .store()
        .add_hook(Arc::new(AutoPublishTrigger))
        .unwrap();

    let outcome = t.hub.push_item(&porter(), push_payload("T")).await.unwrap();
    assert_eq!(outcome.item.status, ItemStatus::PendingReview);
    let stored = t.hub.store().get(&outcome.item.id).unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::PendingReview);
}

// ============================================================================
// Stored Fields
// ============================================================================

#[tokio::test]
async fn test_push_fields_are_stored() {
    let t = test_hub(PolicySetting::PublishDirectly);
    let mut body = push_payload("T");
    body["categories"] = json!(["news", "tech"]);
    body["tags"] = json!(["rust"]);
    body["original_title"] = json!("Original T");

    let item = t.hub.push_item(&porter(), body).await.unwrap().item;

    assert_eq!(item.source_type, SourceType::Push);
    assert_eq!(item.network_label, "Test Net");
    assert_eq!(item.author_id, "porter-1");
    assert_eq!(item.excerpt, "Body of the post");
    assert_eq!(item.metadata.categories, vec!["news", "tech"]);
    assert_eq!(item.metadata.tags, vec!["rust"]);
    assert_eq!(item.metadata.original_title, "Original T");
    assert_eq!(item.publish_date.to_rfc3339(), "2024-05-01T08:30:00+00:00");
}

fn sqlite_hub(db_path: &std::path::Path) -> SyncOrchestrator {
    let settings = Arc::new(StaticSettings::new(PolicySetting::ReviewRequired, "Test Net"));
    let mut services = HubServices::in_memory(settings);
    services.store = Arc::new(SqliteContentStore::new(db_path).unwrap());
    SyncOrchestrator::new(&test_config(), services).unwrap()
}

#[tokio::test]
async fn test_sqlite_backend_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("hub.db");

    let item_id = {
        let hub = sqlite_hub(&db_path);
        hub.push_item(&porter(), push_payload("T")).await.unwrap().item.id
    };

    let hub = sqlite_hub(&db_path);
    let again = hub.push_item(&porter(), push_payload("T")).await.unwrap();
    assert_eq!(again.action, SyncAction::Unchanged);
    assert_eq!(again.item.id, item_id);
    assert_eq!(again.item.status, ItemStatus::PendingReview);
}
