//! Resumable sitemap imports driven by the task queue

use chrono::Utc;
use chiral_hub::models::{ImportBatchOutcome, ImportJob, NodeState, SourceType, SyncAction};
use chiral_hub::error::HubErrorTrait;
use chiral_hub::policy::PolicySetting;
use chiral_hub::storage::{ContentStore, NodeStateStore};
use chiral_hub::Error;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{article_page, sitemap_index, test_hub, urlset, TestHub};

async fn serve_xml(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn serve_articles(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/blog/post-\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(article_page("Imported post", "Imported body text")),
        )
        .mount(server)
        .await;
}

fn post_urls(base: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{base}/blog/post-{i}")).collect()
}

/// Run queued tasks until the queue drains, recording progress after each pass
async fn drain_tasks(t: &TestHub, node_id: &str) -> Vec<usize> {
    let mut progress = Vec::new();
    for _ in 0..20 {
        if t.hub.tasks().is_empty().await {
            break;
        }
        let report = t.hub.run_due_tasks(Utc::now()).await.unwrap();
        assert_eq!(report.failed, 0);
        let job = t.hub.get_import_progress(node_id).unwrap().job.unwrap();
        progress.push(job.processed_items);
    }
    progress
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_sitemap_index_is_flattened() {
    let server = MockServer::start().await;
    let base = server.uri();
    serve_xml(
        &server,
        "/sitemap.xml",
        sitemap_index(&[format!("{base}/sitemap-1.xml"), format!("{base}/sitemap-2.xml")]),
    )
    .await;
    let urls = post_urls(&base, 6);
    serve_xml(&server, "/sitemap-1.xml", urlset(&urls[..3])).await;
    serve_xml(&server, "/sitemap-2.xml", urlset(&urls[3..])).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    let start = t
        .hub
        .start_sitemap_import("N3", &format!("{base}/sitemap.xml"))
        .await
        .unwrap();
    assert_eq!(start.total_urls, 6);
    assert!(start.job_id.starts_with("import_"));

    let state = t.hub.states().load("N3").unwrap().unwrap();
    assert!(state.import_in_progress);
    assert_eq!(state.import_urls, urls);
    assert_eq!(state.last_filter_stats.unwrap().original_count, 6);
    assert_eq!(t.hub.tasks().len().await, 1);
}

#[tokio::test]
async fn test_start_refused_while_running() {
    let server = MockServer::start().await;
    serve_xml(&server, "/sitemap.xml", urlset(&post_urls(&server.uri(), 3))).await;
    let sitemap = format!("{}/sitemap.xml", server.uri());

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub.start_sitemap_import("N3", &sitemap).await.unwrap();

    let err = t.hub.start_sitemap_import("N3", &sitemap).await.unwrap_err();
    assert!(matches!(err, Error::JobAlreadyRunning { .. }));
    assert_eq!(t.hub.tasks().len().await, 1);
}

#[tokio::test]
async fn test_no_article_urls_releases_claim() {
    let server = MockServer::start().await;
    let base = server.uri();
    serve_xml(
        &server,
        "/sitemap.xml",
        urlset(&[format!("{base}/tag/rust"), format!("{base}/blog/page/2")]),
    )
    .await;
    let sitemap = format!("{base}/sitemap.xml");

    let t = test_hub(PolicySetting::ReviewRequired);
    let err = t.hub.start_sitemap_import("N3", &sitemap).await.unwrap_err();
    assert!(matches!(err, Error::NoUrlsFound { .. }));

    let state = t.hub.states().load("N3").unwrap().unwrap();
    assert!(!state.import_in_progress);
    assert!(state.import_job.is_none());
    let stats = state.last_filter_stats.unwrap();
    assert_eq!(stats.original_count, 2);
    assert_eq!(stats.excluded_count, 2);

    // The claim was released, so a retry is not refused as a duplicate
    let again = t.hub.start_sitemap_import("N3", &sitemap).await.unwrap_err();
    assert!(matches!(again, Error::NoUrlsFound { .. }));
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn test_import_runs_to_completion_in_batches() {
    let server = MockServer::start().await;
    serve_xml(&server, "/sitemap.xml", urlset(&post_urls(&server.uri(), 12))).await;
    serve_articles(&server).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .start_sitemap_import("N3", &format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();

    let progress = drain_tasks(&t, "N3").await;
    assert_eq!(progress, vec![5, 10, 12]);

    let done = t.hub.get_import_progress("N3").unwrap();
    assert!(!done.in_progress);
    assert!(!done.is_stuck);
    let job = done.job.unwrap();
    assert!(!job.is_importing);
    assert_eq!(job.success_count, 12);
    assert_eq!(job.error_count, 0);
    assert_eq!(job.progress_percent, 100.0);

    let items = t.hub.store().list().unwrap();
    assert_eq!(items.len(), 12);
    for item in &items {
        assert_eq!(item.source_type, SourceType::Sitemap);
        assert_eq!(item.title, "Imported post");
        assert!(item.metadata.imported_at.is_some());
    }

    let state = t.hub.states().load("N3").unwrap().unwrap();
    assert!(state.import_urls.is_empty());
}

#[tokio::test]
async fn test_batch_resumes_at_processed_count() {
    let server = MockServer::start().await;
    let urls = post_urls(&server.uri(), 12);
    for done in &urls[..5] {
        let done_path = done.trim_start_matches(&server.uri()).to_string();
        Mock::given(method("GET"))
            .and(path(done_path))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
    }
    serve_articles(&server).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    let mut job = ImportJob::new(12);
    job.processed_items = 5;
    job.success_count = 5;
    let mut state = NodeState::new("N3");
    state.import_in_progress = true;
    state.import_urls = urls;
    state.import_job = Some(job);
    t.hub.states().save(&state).unwrap();

    let first = t.hub.process_import_batch("N3").await.unwrap();
    assert_eq!(
        first,
        ImportBatchOutcome::Continued {
            processed_items: 10,
            total_items: 12
        }
    );

    let job = match t.hub.process_import_batch("N3").await.unwrap() {
        ImportBatchOutcome::Completed { job } => job,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(job.processed_items, 12);
    assert_eq!(job.success_count, 12);
    assert_eq!(t.hub.store().count().unwrap(), 7);
}

#[tokio::test]
async fn test_failed_page_is_counted_and_logged() {
    let server = MockServer::start().await;
    let base = server.uri();
    let urls = vec![
        format!("{base}/blog/post-1"),
        format!("{base}/blog/missing-post"),
        format!("{base}/blog/post-2"),
    ];
    serve_xml(&server, "/sitemap.xml", urlset(&urls)).await;
    serve_articles(&server).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .start_sitemap_import("N3", &format!("{base}/sitemap.xml"))
        .await
        .unwrap();
    drain_tasks(&t, "N3").await;

    let state = t.hub.states().load("N3").unwrap().unwrap();
    let job = state.import_job.unwrap();
    assert_eq!(job.processed_items, 3);
    assert_eq!(job.success_count, 2);
    assert_eq!(job.error_count, 1);

    assert_eq!(state.error_log.len(), 1);
    assert_eq!(state.error_log[0].error_type, "sitemap_fetch_failed");
    assert_eq!(state.error_log[0].context["url"], urls[1].as_str());
}

#[tokio::test]
async fn test_reset_cancels_pending_batches() {
    let server = MockServer::start().await;
    serve_xml(&server, "/sitemap.xml", urlset(&post_urls(&server.uri(), 8))).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .start_sitemap_import("N3", &format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();
    assert_eq!(t.hub.tasks().len().await, 1);

    t.hub.reset_import_job("N3").await.unwrap();

    assert!(t.hub.tasks().is_empty().await);
    let progress = t.hub.get_import_progress("N3").unwrap();
    assert!(progress.job.is_none());
    assert!(!progress.in_progress);

    let report = t.hub.run_due_tasks(Utc::now()).await.unwrap();
    assert_eq!(report.ran, 0);
    assert_eq!(t.hub.store().count().unwrap(), 0);
}

// ============================================================================
// Single Item Resync
// ============================================================================

#[tokio::test]
async fn test_resync_single_item_picks_up_changes() {
    let server = MockServer::start().await;
    let url = format!("{}/blog/post-1", server.uri());
    serve_xml(&server, "/sitemap.xml", urlset(std::slice::from_ref(&url))).await;
    serve_articles(&server).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .start_sitemap_import("N3", &format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();
    drain_tasks(&t, "N3").await;
    let item = t.hub.store().list().unwrap().remove(0);

    let unchanged = t.hub.resync_single_item(&item.id, &url).await.unwrap();
    assert_eq!(unchanged, SyncAction::Unchanged);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/blog/post-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(article_page("Imported post", "Corrected body text")),
        )
        .mount(&server)
        .await;

    let updated = t.hub.resync_single_item(&item.id, &url).await.unwrap();
    assert_eq!(updated, SyncAction::Updated);

    let stored = t.hub.store().get(&item.id).unwrap().unwrap();
    assert!(stored.body.contains("Corrected"));
    assert_eq!(stored.source_type, SourceType::Sitemap);
    assert_eq!(t.hub.store().count().unwrap(), 1);
}

#[tokio::test]
async fn test_resync_rejects_foreign_url() {
    let server = MockServer::start().await;
    let url = format!("{}/blog/post-1", server.uri());
    serve_xml(&server, "/sitemap.xml", urlset(std::slice::from_ref(&url))).await;
    serve_articles(&server).await;

    let t = test_hub(PolicySetting::ReviewRequired);
    t.hub
        .start_sitemap_import("N3", &format!("{}/sitemap.xml", server.uri()))
        .await
        .unwrap();
    drain_tasks(&t, "N3").await;
    let item = t.hub.store().list().unwrap().remove(0);

    let err = t
        .hub
        .resync_single_item(&item.id, "https://elsewhere.example/x")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_url");
}
