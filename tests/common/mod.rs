//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chiral_hub::config::Config;
use chiral_hub::models::{Actor, NodeState, SyncMode};
use chiral_hub::policy::{MemoryActorDirectory, PolicySetting, StaticSettings};
use chiral_hub::storage::NodeStateStore;
use chiral_hub::sync::{HubServices, SyncOrchestrator};

/// A hub on memory backends
pub struct TestHub {
    pub hub: SyncOrchestrator,
    pub services: HubServices,
    pub settings: Arc<StaticSettings>,
    pub directory: Arc<MemoryActorDirectory>,
}

/// Config tuned for fast tests against a local mock server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.crawler.requests_per_second = 1000;
    config.crawler.request_timeout_secs = 5;
    config.crawler.health_timeout_secs = 5;
    config.import.continuation_delay_secs = 0;
    config.hub.network_label = "Test Net".to_string();
    config
}

pub fn test_hub(policy: PolicySetting) -> TestHub {
    test_hub_with(policy, test_config())
}

pub fn test_hub_with(policy: PolicySetting, config: Config) -> TestHub {
    let settings = Arc::new(StaticSettings::new(policy, config.hub.network_label.clone()));
    let directory = Arc::new(MemoryActorDirectory::new());
    directory.insert(porter()).unwrap();

    let mut services = HubServices::in_memory(settings.clone());
    services.directory = directory.clone();

    let hub = SyncOrchestrator::new(&config, services.clone()).unwrap();
    TestHub {
        hub,
        services,
        settings,
        directory,
    }
}

/// The connector identity used by push tests
pub fn porter() -> Actor {
    Actor::automated("porter-1", None)
}

/// Register a pull-mode node
pub fn pull_node(states: &dyn NodeStateStore, node_id: &str, rss_url: Option<String>) -> NodeState {
    let mut state = NodeState::new(node_id);
    state.sync_mode = SyncMode::Pull;
    state.rss_url = rss_url;
    states.save(&state).unwrap();
    state
}

/// Push payload with the canonical identity of the property tests
pub fn push_payload(title: &str) -> serde_json::Value {
    serde_json::json!({
        "source_url": "https://a.example/p1",
        "node_id": "N1",
        "original_post_id": "1",
        "title": title,
        "content": "<p>Body of the post</p>",
        "publish_date_gmt": "2024-05-01 08:30:00",
    })
}

pub struct RssItem<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub guid: &'a str,
    pub content: &'a str,
}

/// RSS 2.0 document with `content:encoded` bodies
pub fn rss_feed(items: &[RssItem<'_>]) -> String {
    let body: String = items
        .iter()
        .map(|i| {
            format!(
                r#"<item>
  <title>{}</title>
  <link>{}</link>
  <guid>{}</guid>
  <pubDate>Wed, 01 May 2024 08:30:00 GMT</pubDate>
  <description>Summary of {}</description>
  <content:encoded><![CDATA[{}]]></content:encoded>
</item>"#,
                i.title, i.link, i.guid, i.title, i.content
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
<title>Test Feed</title>
<link>https://a.example</link>
{body}
</channel>
</rss>"#
    )
}

/// `<urlset>` listing `urls`
pub fn urlset(urls: &[String]) -> String {
    let body: String = urls
        .iter()
        .map(|u| format!("<url><loc>{u}</loc></url>\n"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{body}</urlset>"#
    )
}

/// `<sitemapindex>` referencing `children`
pub fn sitemap_index(children: &[String]) -> String {
    let body: String = children
        .iter()
        .map(|u| format!("<sitemap><loc>{u}</loc></sitemap>\n"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{body}</sitemapindex>"#
    )
}

/// Article page with an `<article>` region
pub fn article_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body>
<nav><a href="/">Home</a></nav>
<article><p>{body}</p></article>
</body>
</html>"#
    )
}

/// Smallest valid PNG
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];
