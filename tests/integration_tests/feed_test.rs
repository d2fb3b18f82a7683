//! Feed sync, scheduled cycles and health checks against a mock site

use chrono::{Duration, Utc};
use chiral_hub::models::{ItemStatus, NodeState, SourceType, SyncFrequency};
use chiral_hub::policy::PolicySetting;
use chiral_hub::storage::{ContentStore, NodeStateStore};
use chiral_hub::Error;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{pull_node, rss_feed, test_hub, RssItem};

async fn serve_feed(server: &MockServer, xml: String) {
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/rss+xml; charset=utf-8")
                .set_body_string(xml),
        )
        .mount(server)
        .await;
}

fn two_items(base: &str, second_body: &str) -> String {
    let link1 = format!("{base}/post-1");
    let link2 = format!("{base}/post-2");
    rss_feed(&[
        RssItem {
            title: "First",
            link: &link1,
            guid: "guid-1",
            content: "<p>First body</p>",
        },
        RssItem {
            title: "Second",
            link: &link2,
            guid: "guid-2",
            content: second_body,
        },
    ])
}

// ============================================================================
// Feed Sync
// ============================================================================

#[tokio::test]
async fn test_feed_sync_creates_then_skips_then_updates() {
    let server = MockServer::start().await;
    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    serve_feed(&server, two_items(&server.uri(), "<p>Second body</p>")).await;
    let first = t.hub.sync_feed_updates("N2").await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.new, 2);
    assert_eq!(first.errors, 0);

    let second = t.hub.sync_feed_updates("N2").await.unwrap();
    assert_eq!(second.new, 0);
    assert_eq!(second.skipped, 2);

    server.reset().await;
    serve_feed(&server, two_items(&server.uri(), "<p>Second body, revised</p>")).await;
    let third = t.hub.sync_feed_updates("N2").await.unwrap();
    assert_eq!(third.updated, 1);
    assert_eq!(third.skipped, 1);

    let items = t.hub.store().list().unwrap();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.source_type, SourceType::Rss);
        assert_eq!(item.node_id, "N2");
        assert_eq!(item.status, ItemStatus::PendingReview);
        assert_eq!(item.network_label, "Test Net");
        assert!(item.guid.is_some());
    }
    let revised = items.iter().find(|i| i.title == "Second").unwrap();
    assert!(revised.body.contains("revised"));

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert!(state.rss_last_sync.is_some());
    assert!(state.error_log.is_empty());
}

#[tokio::test]
async fn test_feed_fetch_failure_is_logged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let err = t.hub.sync_feed_updates("N2").await.unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert_eq!(state.error_log.len(), 1);
    assert_eq!(state.error_log[0].error_type, "rss_fetch_failed");
    assert!(state.rss_last_sync.is_none());
    assert_eq!(t.hub.store().count().unwrap(), 0);
}

#[tokio::test]
async fn test_feed_parse_failure_is_logged() {
    let server = MockServer::start().await;
    serve_feed(&server, "<html><body>Not a feed</body></html>".to_string()).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let err = t.hub.sync_feed_updates("N2").await.unwrap_err();
    assert!(matches!(err, Error::Parse(_)));

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert_eq!(state.error_log[0].error_type, "rss_parse_failed");
}

#[tokio::test]
async fn test_bad_entry_does_not_stop_siblings() {
    let server = MockServer::start().await;
    let good = format!("{}/post-1", server.uri());
    let xml = rss_feed(&[
        RssItem {
            title: "Broken",
            link: "javascript:alert(1)",
            guid: "guid-x",
            content: "<p>x</p>",
        },
        RssItem {
            title: "Good",
            link: &good,
            guid: "guid-1",
            content: "<p>Fine</p>",
        },
    ]);
    serve_feed(&server, xml).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let report = t.hub.sync_feed_updates("N2").await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.new, 1);
    assert_eq!(report.errors, 1);

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert_eq!(state.error_log.len(), 1);
    assert_eq!(state.error_log[0].error_type, "post_creation_failed");
    assert_eq!(state.error_log[0].context["title"], "Broken");
}

#[tokio::test]
async fn test_publish_directly_policy_applies_to_pulled_items() {
    let server = MockServer::start().await;
    serve_feed(&server, two_items(&server.uri(), "<p>Second body</p>")).await;

    let t = test_hub(PolicySetting::PublishDirectly);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    t.hub.sync_feed_updates("N2").await.unwrap();
    for item in t.hub.store().list().unwrap() {
        assert_eq!(item.status, ItemStatus::Published);
    }
}

// ============================================================================
// Scheduled Cycle
// ============================================================================

#[tokio::test]
async fn test_cycle_syncs_only_due_nodes() {
    let server = MockServer::start().await;
    serve_feed(&server, two_items(&server.uri(), "<p>Second body</p>")).await;
    let feed = format!("{}/feed", server.uri());

    let t = test_hub(PolicySetting::ReviewRequired);
    let states = t.hub.states().clone();
    pull_node(states.as_ref(), "never-synced", Some(feed.clone()));
    pull_node(states.as_ref(), "recent", Some(feed.clone()));
    pull_node(states.as_ref(), "daily", Some(feed.clone()));

    let now = Utc::now();
    states
        .update("recent", &mut |s: &mut NodeState| {
            s.rss_last_sync = Some(now - Duration::minutes(10));
        })
        .unwrap();
    states
        .update("daily", &mut |s: &mut NodeState| {
            s.sync_frequency = SyncFrequency::Daily;
            s.rss_last_sync = Some(now - Duration::hours(3));
        })
        .unwrap();

    let report = t.hub.run_feed_sync_cycle(now).await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);

    let later = now + Duration::hours(2);
    let report = t.hub.run_feed_sync_cycle(later).await.unwrap();
    assert_eq!(report.synced, 2, "hourly nodes become due again");
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_cycle_counts_failing_node() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let report = t.hub.run_feed_sync_cycle(Utc::now()).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.synced, 0);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check_healthy() {
    let server = MockServer::start().await;
    serve_feed(&server, two_items(&server.uri(), "<p>x</p>")).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let health = t.hub.check_feed_health("N2").await.unwrap();
    assert!(health.is_healthy);
    assert_eq!(health.status_code, 200);
    assert!(health.error_message.is_empty());

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert_eq!(state.rss_health, Some(health));
    assert!(state.error_log.is_empty());
}

#[tokio::test]
async fn test_health_check_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let t = test_hub(PolicySetting::ReviewRequired);
    pull_node(t.hub.states().as_ref(), "N2", Some(format!("{}/feed", server.uri())));

    let health = t.hub.check_feed_health("N2").await.unwrap();
    assert!(!health.is_healthy);
    assert_eq!(health.status_code, 404);
    assert_eq!(health.error_message, "HTTP 404 response");

    let state = t.hub.states().load("N2").unwrap().unwrap();
    assert_eq!(state.error_log[0].error_type, "health_check_http_error");
    assert_eq!(state.error_log[0].context["status_code"], 404);
}

#[tokio::test]
async fn test_connection_counts_items() {
    let server = MockServer::start().await;
    serve_feed(&server, two_items(&server.uri(), "<p>x</p>")).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    let report = t
        .hub
        .test_connection(Some(&format!("{}/feed", server.uri())), None)
        .await
        .unwrap();
    assert_eq!(report.rss_items, 2);
    assert_eq!(report.sitemap_urls, 0);
    assert_eq!(t.hub.store().count().unwrap(), 0);
}
