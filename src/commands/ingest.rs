use anyhow::{Context, Result};
use std::path::Path;

use chiral_hub::config::Config;
use chiral_hub::error::HubErrorTrait;

use super::{open_hub, print_json, resolve_actor};

pub async fn push(config: &Config, payload_path: &Path, actor_id: &str) -> Result<()> {
    let raw = std::fs::read_to_string(payload_path)
        .with_context(|| format!("Failed to read payload: {}", payload_path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Payload is not valid JSON: {}", payload_path.display()))?;

    let (hub, services) = open_hub(config).await?;
    let actor = resolve_actor(services.directory.as_ref(), actor_id)?;

    match hub.push_item(&actor, payload).await {
        Ok(outcome) => {
            println!("Push {:?}: {}", outcome.action, outcome.item.id);
            println!("  Title:  {}", outcome.item.title);
            println!("  Status: {}", outcome.item.status);
            if let Some(image) = &outcome.item.featured_image_ref {
                println!("  Image:  {image}");
            }
            Ok(())
        }
        Err(e) => {
            print_json(&e.to_response())?;
            anyhow::bail!("push rejected ({})", e.code())
        }
    }
}

pub async fn delete(config: &Config, item_id: &str, actor_id: &str) -> Result<()> {
    let (hub, services) = open_hub(config).await?;
    let actor = resolve_actor(services.directory.as_ref(), actor_id)?;
    hub.delete_item(&actor, item_id)?;
    println!("Deleted {item_id}");
    Ok(())
}

pub async fn resync(config: &Config, item_id: &str, source_url: &str) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    let action = hub.resync_single_item(item_id, source_url).await?;
    println!("Resync {item_id}: {action:?}");
    Ok(())
}

pub async fn refresh_label(config: &Config) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    let count = hub.refresh_network_label()?;
    println!("Network label '{}' stamped on {count} items", config.hub.network_label);
    Ok(())
}
