pub mod admin;
pub mod ingest;
pub mod pull;

use anyhow::{Context, Result};

use chiral_hub::config::Config;
use chiral_hub::models::Actor;
use chiral_hub::policy::ActorDirectory;
use chiral_hub::sync::{HubServices, SyncOrchestrator};

// Re-export command functions for convenience
pub use admin::{actor_add, node_list, node_set, node_show, NodeSettings};
pub use ingest::{delete, push, refresh_label, resync};
pub use pull::{
    feed_sync, import_progress, import_reset, import_start, patrol, run_tasks, test_connection,
};

/// Open the durable backends and build the orchestrator
async fn open_hub(config: &Config) -> Result<(SyncOrchestrator, HubServices)> {
    let services = HubServices::open(config)
        .await
        .context("Failed to open hub storage")?;
    let hub = SyncOrchestrator::new(config, services.clone())?;
    Ok((hub, services))
}

/// Look up an actor registered with `chiral-hub actor add`
fn resolve_actor(directory: &dyn ActorDirectory, actor_id: &str) -> Result<Actor> {
    directory.get(actor_id)?.with_context(|| {
        format!("Unknown actor '{actor_id}', register it with `chiral-hub actor add`")
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
