use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chiral_hub::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "chiral-hub",
    version,
    about = "Content hub ingestion: push sync, feed crawling and sitemap imports",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to CHIRAL_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one push payload from a JSON file
    Push {
        /// Payload file
        payload: PathBuf,

        /// Id of the pushing actor in the actor directory
        #[arg(short, long)]
        actor: String,
    },

    /// Sync one node's feed, or every due pull-mode node when omitted
    FeedSync {
        /// Node id
        node: Option<String>,
    },

    /// Bulk sitemap imports
    Import {
        #[command(subcommand)]
        action: ImportAction,
    },

    /// Run queued tasks that are due
    RunTasks {
        /// Keep running until the queue is empty
        #[arg(long, default_value = "false")]
        until_idle: bool,
    },

    /// Daily maintenance: prune logs, drop old import records, check feed health
    Patrol,

    /// Fetch and parse a feed and/or sitemap without storing anything
    TestConnection {
        /// Feed URL
        #[arg(long)]
        rss: Option<String>,

        /// Sitemap URL
        #[arg(long)]
        sitemap: Option<String>,
    },

    /// Re-fetch a stored item's page and update it if it changed
    Resync {
        /// Item id
        item_id: String,

        /// Source URL of the item
        source_url: String,
    },

    /// Permanently delete a stored item
    Delete {
        /// Item id
        item_id: String,

        /// Id of the acting actor in the actor directory
        #[arg(short, long)]
        actor: String,
    },

    /// Rewrite the network label on every stored item
    RefreshLabel,

    /// Node configuration
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Actor directory
    Actor {
        #[command(subcommand)]
        action: ActorAction,
    },
}

#[derive(Subcommand)]
enum ImportAction {
    /// Start importing a sitemap for a node
    Start { node: String, sitemap_url: String },

    /// Show import progress of a node
    Progress { node: String },

    /// Clear a node's import job and its pending batches
    Reset { node: String },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Create or update a node's pull configuration
    Set {
        node: String,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long)]
        rss_url: Option<String>,

        #[arg(long)]
        sitemap_url: Option<String>,

        #[arg(long, value_enum)]
        frequency: Option<FrequencyArg>,

        #[arg(long, value_enum)]
        filter_mode: Option<FilterModeArg>,

        /// Comma separated allowlist for include mode
        #[arg(long)]
        include_slugs: Option<String>,

        /// Comma separated extra denylist for exclude mode
        #[arg(long)]
        exclusions: Option<String>,
    },

    /// Print a node's stored state
    Show { node: String },

    /// List configured nodes
    List,
}

#[derive(Subcommand)]
enum ActorAction {
    /// Register an actor
    Add {
        id: String,

        /// Node the actor is bound to
        #[arg(long)]
        node: Option<String>,

        /// Register as an operator instead of a node connector
        #[arg(long, default_value = "false")]
        operator: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Push,
    Pull,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Hourly,
    Daily,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterModeArg {
    Exclude,
    Include,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chiral-hub starting");

    match cli.command {
        Commands::Push { payload, actor } => {
            tracing::info!(payload = %payload.display(), actor = %actor, "Starting push command");
            commands::push(&config, &payload, &actor).await?;
        }

        Commands::FeedSync { node } => {
            tracing::info!(node = ?node, "Starting feed-sync command");
            commands::feed_sync(&config, node.as_deref()).await?;
        }

        Commands::Import { action } => match action {
            ImportAction::Start { node, sitemap_url } => {
                commands::import_start(&config, &node, &sitemap_url).await?;
            }
            ImportAction::Progress { node } => commands::import_progress(&config, &node).await?,
            ImportAction::Reset { node } => commands::import_reset(&config, &node).await?,
        },

        Commands::RunTasks { until_idle } => commands::run_tasks(&config, until_idle).await?,

        Commands::Patrol => commands::patrol(&config).await?,

        Commands::TestConnection { rss, sitemap } => {
            commands::test_connection(&config, rss.as_deref(), sitemap.as_deref()).await?;
        }

        Commands::Resync {
            item_id,
            source_url,
        } => commands::resync(&config, &item_id, &source_url).await?,

        Commands::Delete { item_id, actor } => commands::delete(&config, &item_id, &actor).await?,

        Commands::RefreshLabel => commands::refresh_label(&config).await?,

        Commands::Node { action } => match action {
            NodeAction::Set {
                node,
                mode,
                rss_url,
                sitemap_url,
                frequency,
                filter_mode,
                include_slugs,
                exclusions,
            } => {
                let settings = commands::NodeSettings {
                    mode: mode.map(Into::into),
                    rss_url,
                    sitemap_url,
                    frequency: frequency.map(Into::into),
                    filter_mode: filter_mode.map(Into::into),
                    include_slugs,
                    exclusions,
                };
                commands::node_set(&config, &node, settings)?;
            }
            NodeAction::Show { node } => commands::node_show(&config, &node)?,
            NodeAction::List => commands::node_list(&config)?,
        },

        Commands::Actor { action } => match action {
            ActorAction::Add { id, node, operator } => {
                commands::actor_add(&config, &id, node.as_deref(), operator)?;
            }
        },
    }

    tracing::info!("chiral-hub completed successfully");
    Ok(())
}

impl From<ModeArg> for chiral_hub::models::SyncMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Push => Self::Push,
            ModeArg::Pull => Self::Pull,
        }
    }
}

impl From<FrequencyArg> for chiral_hub::models::SyncFrequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Hourly => Self::Hourly,
            FrequencyArg::Daily => Self::Daily,
        }
    }
}

impl From<FilterModeArg> for chiral_hub::models::UrlFilterMode {
    fn from(arg: FilterModeArg) -> Self {
        match arg {
            FilterModeArg::Exclude => Self::Exclude,
            FilterModeArg::Include => Self::Include,
        }
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("chiral_hub=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("chiral_hub={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
