use anyhow::Result;

use chiral_hub::config::Config;
use chiral_hub::models::{Actor, NodeState, SyncFrequency, SyncMode, UrlFilterMode};
use chiral_hub::policy::JsonActorDirectory;
use chiral_hub::storage::{JsonNodeStateStore, NodeStateStore};

use super::print_json;

/// Fields of `node set`; `None` keeps the stored value
pub struct NodeSettings {
    pub mode: Option<SyncMode>,
    pub rss_url: Option<String>,
    pub sitemap_url: Option<String>,
    pub frequency: Option<SyncFrequency>,
    pub filter_mode: Option<UrlFilterMode>,
    pub include_slugs: Option<String>,
    pub exclusions: Option<String>,
}

impl NodeSettings {
    fn apply(&mut self, state: &mut NodeState) {
        if let Some(mode) = self.mode {
            state.sync_mode = mode;
        }
        if let Some(url) = self.rss_url.take() {
            state.rss_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(url) = self.sitemap_url.take() {
            state.sitemap_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(frequency) = self.frequency {
            state.sync_frequency = frequency;
        }
        if let Some(mode) = self.filter_mode {
            state.url_filter_mode = mode;
        }
        if let Some(slugs) = self.include_slugs.take() {
            state.url_include_slugs = slugs;
        }
        if let Some(list) = self.exclusions.take() {
            state.url_exclusion_list = list;
        }
    }
}

pub fn node_set(config: &Config, node_id: &str, mut settings: NodeSettings) -> Result<()> {
    let store = JsonNodeStateStore::new(&config.storage.state_dir)?;
    let state = store.update(node_id, &mut |s: &mut NodeState| settings.apply(s))?;

    tracing::info!(node_id = %node_id, mode = ?state.sync_mode, "Node configured");
    println!("Node {node_id} saved");
    Ok(())
}

pub fn node_show(config: &Config, node_id: &str) -> Result<()> {
    let store = JsonNodeStateStore::new(&config.storage.state_dir)?;
    match store.load(node_id)? {
        Some(state) => print_json(&state),
        None => anyhow::bail!("Node '{node_id}' is not configured"),
    }
}

pub fn node_list(config: &Config) -> Result<()> {
    let store = JsonNodeStateStore::new(&config.storage.state_dir)?;
    let states = store.list()?;
    if states.is_empty() {
        println!("No nodes configured");
    }
    for state in states {
        println!(
            "{:<20} {:?} rss={} errors={}",
            state.node_id,
            state.sync_mode,
            state.rss_url.as_deref().unwrap_or("-"),
            state.error_log.len()
        );
    }
    Ok(())
}

pub fn actor_add(config: &Config, actor_id: &str, node_id: Option<&str>, operator: bool) -> Result<()> {
    std::fs::create_dir_all(&config.storage.state_dir)?;
    let directory = JsonActorDirectory::open(&config.storage.actors_path())?;

    let actor = if operator {
        Actor::operator(actor_id)
    } else {
        Actor::automated(actor_id, node_id)
    };
    directory.insert(actor)?;
    println!("Actor {actor_id} registered");
    Ok(())
}
