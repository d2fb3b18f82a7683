//! Featured image import on push and pull paths

use chiral_hub::models::SyncAction;
use chiral_hub::policy::PolicySetting;
use chiral_hub::storage::{AssetStore, ContentStore, NodeStateStore};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{porter, pull_node, push_payload, rss_feed, test_hub, RssItem, PNG_BYTES};

async fn serve_png(server: &MockServer, at: &str, downloads: u64) {
    Mock::given(method("HEAD"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(PNG_BYTES),
        )
        .expect(downloads)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_push_imports_featured_image_once() {
    let server = MockServer::start().await;
    serve_png(&server, "/images/cover.png", 1).await;
    let image_url = format!("{}/images/cover.png", server.uri());

    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body["featured_image_url"] = json!(image_url);
    let created = t.hub.push_item(&porter(), body.clone()).await.unwrap();

    let asset_ref = created.item.featured_image_ref.clone().unwrap();
    let stored = t.services.assets.get(&asset_ref).await.unwrap().unwrap();
    assert_eq!(stored.bytes.as_ref(), PNG_BYTES);
    assert_eq!(stored.content_type, "image/png");

    // An update keeps the first image and downloads nothing
    body["title"] = json!("T (edited)");
    let updated = t.hub.push_item(&porter(), body).await.unwrap();
    assert_eq!(updated.action, SyncAction::Updated);
    assert_eq!(updated.item.featured_image_ref, Some(asset_ref.clone()));

    let item = t.hub.store().get(&created.item.id).unwrap().unwrap();
    assert_eq!(item.featured_image_ref, Some(asset_ref));
    assert_eq!(
        item.metadata.original_featured_image_url.as_deref(),
        Some(image_url.as_str())
    );
}

#[tokio::test]
async fn test_non_image_response_leaves_item_without_image() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/images/cover.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/cover.png"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body["featured_image_url"] = json!(format!("{}/images/cover.png", server.uri()));
    let outcome = t.hub.push_item(&porter(), body).await.unwrap();

    assert_eq!(outcome.action, SyncAction::Created);
    assert!(outcome.item.featured_image_ref.is_none());
    assert_eq!(t.hub.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_unreachable_image_does_not_fail_push() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/images/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    let mut body = push_payload("T");
    body["featured_image_url"] = json!(format!("{}/images/gone.jpg", server.uri()));
    let outcome = t.hub.push_item(&porter(), body).await.unwrap();

    assert!(outcome.item.featured_image_ref.is_none());
}

#[tokio::test]
async fn test_feed_entry_image_is_imported() {
    let server = MockServer::start().await;
    serve_png(&server, "/images/inline.png", 1).await;

    let link = format!("{}/post-1", server.uri());
    let content = format!(
        r#"<p>Intro</p><img src="{}/images/inline.png" alt="x"><p>More</p>"#,
        server.uri()
    );
    let xml = rss_feed(&[RssItem {
        title: "With image",
        link: &link,
        guid: "guid-1",
        content: &content,
    }]);
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml))
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    t.hub.sync_feed_updates("N2").await.unwrap();
    // Unchanged entries never touch the image again
    t.hub.sync_feed_updates("N2").await.unwrap();

    let items = t.hub.store().list().unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].featured_image_ref.is_some());
}
