//! Error handling and permission scenarios

use chiral_hub::error::{ErrorCategory, HubErrorTrait};
use chiral_hub::models::{Actor, ItemStatus};
use chiral_hub::policy::PolicySetting;
use chiral_hub::storage::ContentStore;
use chiral_hub::Error;
use serde_json::json;

use crate::common::{porter, push_payload, test_hub};

// ============================================================================
// Push Validation
// ============================================================================

#[tokio::test]
async fn test_invalid_source_url_is_rejected() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body["source_url"] = json!("javascript:alert(1)");

    let err = t.hub.push_item(&porter(), body).await.unwrap_err();
    assert_eq!(err.code(), "invalid_url");
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(!err.is_recoverable());
    assert_eq!(t.hub.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_title_maps_to_missing_data() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body.as_object_mut().unwrap().remove("title");

    let err = t.hub.push_item(&porter(), body).await.unwrap_err();
    let response = err.to_response();
    assert_eq!(response.code, "missing_data");
    assert!(response.message.contains("title"));
}

#[tokio::test]
async fn test_blank_node_id_is_missing() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body["node_id"] = json!("   ");

    let err = t.hub.push_item(&porter(), body).await.unwrap_err();
    assert_eq!(err.code(), "missing_data");
}

#[tokio::test]
async fn test_non_object_payload_is_rejected() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let err = t.hub.push_item(&porter(), json!(["a", "b"])).await.unwrap_err();
    assert_eq!(err.code(), "invalid_payload");
}

// ============================================================================
// Deletes
// ============================================================================

#[tokio::test]
async fn test_node_cannot_delete_foreign_item() {
    let t = test_hub(PolicySetting::PublishDirectly);
    let item = t.hub.push_item(&porter(), push_payload("T")).await.unwrap().item;

    let stranger = Actor::automated("porter-2", Some("N9"));
    let err = t.hub.delete_item(&stranger, &item.id).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    assert_eq!(err.code(), "permission_denied");
    assert!(t.hub.store().get(&item.id).unwrap().is_some());
}

#[tokio::test]
async fn test_owner_and_operator_can_delete() {
    let t = test_hub(PolicySetting::PublishDirectly);
    let first = t.hub.push_item(&porter(), push_payload("T")).await.unwrap().item;
    t.hub.delete_item(&porter(), &first.id).unwrap();
    assert!(t.hub.store().get(&first.id).unwrap().is_none());

    let second = t.hub.push_item(&porter(), push_payload("T")).await.unwrap().item;
    t.hub.delete_item(&Actor::operator("editor"), &second.id).unwrap();
    assert_eq!(t.hub.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_pending_item_is_protected_from_nodes() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let item = t.hub.push_item(&porter(), push_payload("T")).await.unwrap().item;
    assert_eq!(item.status, ItemStatus::PendingReview);

    let err = t.hub.delete_item(&porter(), &item.id).unwrap_err();
    assert_eq!(err.code(), "permission_denied");
}

#[tokio::test]
async fn test_delete_unknown_item() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let err = t.hub.delete_item(&porter(), "does-not-exist").unwrap_err();
    assert_eq!(err.code(), "not_found");
}

// ============================================================================
// Pull Paths
// ============================================================================

#[tokio::test]
async fn test_feed_sync_without_feed_url() {
    let t = test_hub(PolicySetting::ReviewRequired);
    let err = t.hub.sync_feed_updates("unknown-node").await.unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_unreachable_feed_is_recoverable() {
    let t = test_hub(PolicySetting::ReviewRequired);
    crate::common::pull_node(
        t.hub.states().as_ref(),
        "N2",
        Some("http://127.0.0.1:9/feed".to_string()),
    );

    let err = t.hub.sync_feed_updates("N2").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Network);
    assert!(err.is_recoverable());
}
