use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

use chiral_hub::config::Config;
use chiral_hub::sync::SyncOrchestrator;

use super::{open_hub, print_json};

pub async fn feed_sync(config: &Config, node: Option<&str>) -> Result<()> {
    let (hub, _) = open_hub(config).await?;

    match node {
        Some(node_id) => {
            let report = hub.sync_feed_updates(node_id).await?;
            println!("Feed sync for {node_id}");
            println!("========================");
            println!("  Total:   {}", report.total);
            println!("  New:     {}", report.new);
            println!("  Updated: {}", report.updated);
            println!("  Skipped: {}", report.skipped);
            println!("  Errors:  {}", report.errors);
        }
        None => {
            let report = hub.run_feed_sync_cycle(Utc::now()).await?;
            println!(
                "Feed sync cycle: {} synced, {} not due, {} failed",
                report.synced, report.skipped, report.failed
            );
        }
    }
    Ok(())
}

pub async fn import_start(config: &Config, node_id: &str, sitemap_url: &str) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    let start = hub.start_sitemap_import(node_id, sitemap_url).await?;
    println!("Import {} started with {} URLs", start.job_id, start.total_urls);
    println!("Run `chiral-hub run-tasks --until-idle` to process the batches.");
    Ok(())
}

pub async fn import_progress(config: &Config, node_id: &str) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    let progress = hub.get_import_progress(node_id)?;
    print_json(&progress)?;
    if progress.is_stuck {
        println!("Import looks stuck; reset it with `chiral-hub import reset {node_id}`");
    }
    Ok(())
}

pub async fn import_reset(config: &Config, node_id: &str) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    hub.reset_import_job(node_id).await?;
    println!("Import state of {node_id} cleared");
    Ok(())
}

pub async fn run_tasks(config: &Config, until_idle: bool) -> Result<()> {
    let (hub, _) = open_hub(config).await?;

    loop {
        let report = hub.run_due_tasks(Utc::now()).await?;
        if report.ran + report.failed > 0 {
            println!("Ran {} tasks ({} failed)", report.ran + report.failed, report.failed);
        }

        if !until_idle {
            break;
        }
        match next_wait(&hub).await {
            Some(wait) => tokio::time::sleep(wait).await,
            None => break,
        }
    }

    println!("{} tasks pending", hub.tasks().len().await);
    Ok(())
}

/// Time until the earliest pending task is due, `None` when the queue is empty
async fn next_wait(hub: &SyncOrchestrator) -> Option<Duration> {
    let next = hub.tasks().pending().await.into_iter().map(|t| t.run_after).min()?;
    Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

pub async fn patrol(config: &Config) -> Result<()> {
    let (hub, _) = open_hub(config).await?;
    let report = hub.run_daily_patrol(Utc::now()).await?;
    print_json(&report)
}

pub async fn test_connection(config: &Config, rss: Option<&str>, sitemap: Option<&str>) -> Result<()> {
    if rss.is_none() && sitemap.is_none() {
        anyhow::bail!("pass --rss and/or --sitemap");
    }
    let (hub, _) = open_hub(config).await?;
    let report = hub.test_connection(rss, sitemap).await?;
    if rss.is_some() {
        println!("Feed OK: {} items", report.rss_items);
    }
    if sitemap.is_some() {
        println!("Sitemap OK: {} URLs", report.sitemap_urls);
    }
    Ok(())
}
