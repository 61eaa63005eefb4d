//! Operator CLI for the fork-choice frame index.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use forkchoice_core::{
    AppConfig, ForkChoice, Frame, FrameFilter, FrameMetadata, IndexerConfig, codec,
};
use forkchoice_metadata::Indexer;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "forkchoicectl")]
#[command(about = "Index and query archived fork choice frames")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "FORKCHOICE_CONFIG",
        default_value = "config/forkchoice.toml"
    )]
    config: PathBuf,

    /// Engine for --dsn: sqlite (embedded) or postgres (networked).
    /// Defaults to the configured engine
    #[arg(long, global = true, requires = "dsn")]
    engine: Option<String>,

    /// Connection string replacing the configured indexer: a file path for
    /// SQLite, a URL for PostgreSQL
    #[arg(long, global = true, env = "FORKCHOICE_DSN", hide_env_values = true)]
    dsn: Option<String>,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
struct FilterArgs {
    /// Only frames from this node
    #[arg(long)]
    node: Option<String>,
    /// Only frames captured at this wall clock slot
    #[arg(long)]
    slot: Option<u64>,
    /// Only frames captured in this wall clock epoch
    #[arg(long)]
    epoch: Option<u64>,
    /// Only frames carrying this label (repeatable; all must match)
    #[arg(long = "label", value_name = "LABEL")]
    labels: Vec<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> FrameFilter {
        FrameFilter {
            node: self.node.clone(),
            wall_clock_slot: self.slot.map(Into::into),
            wall_clock_epoch: self.epoch.map(Into::into),
            labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the index schema if needed and check connectivity
    Migrate,
    /// Index the metadata of a frame blob
    Add {
        /// Gzip-compressed frame file
        blob: PathBuf,
        /// Extra label to attach (repeatable)
        #[arg(long = "label", value_name = "LABEL")]
        labels: Vec<String>,
    },
    /// Remove a frame from the index
    Remove { id: String },
    /// Show one indexed frame
    Show { id: String },
    /// List frames, earliest first
    Frames(FilterArgs),
    /// List distinct source nodes
    Nodes(FilterArgs),
    /// List distinct wall clock slots
    Slots(FilterArgs),
    /// List distinct wall clock epochs
    Epochs(FilterArgs),
    /// List distinct labels
    Labels(FilterArgs),
    /// Summarize indexed frames per source node
    Sources,
    /// Decode a frame blob and print its metadata
    Inspect {
        /// Gzip-compressed frame file
        blob: PathBuf,
    },
}

/// Load configuration from an optional TOML file overlaid with
/// `FORKCHOICE_` environment variables.
fn load_config(path: &Path, engine: Option<&str>, dsn: Option<&str>) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path.display());
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("FORKCHOICE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if let Some(dsn) = dsn {
        let engine = engine.unwrap_or(config.indexer.engine().as_str());
        config.indexer =
            IndexerConfig::from_dsn(engine, dsn).context("invalid --engine/--dsn")?;
    }
    config
        .indexer
        .validate()
        .context("invalid indexer configuration")?;
    Ok(config)
}

fn read_frame(path: &Path) -> Result<Frame> {
    let blob =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    codec::decode(&blob).with_context(|| format!("failed to decode {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// What `inspect` reports about a frame.
#[derive(Serialize)]
struct Inspection<'a> {
    metadata: &'a FrameMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    fork_choice: Option<ForkChoiceSummary>,
}

#[derive(Serialize)]
struct ForkChoiceSummary {
    justified_epoch: u64,
    finalized_epoch: u64,
    nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_slot: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    head_root: Option<String>,
}

impl From<&ForkChoice> for ForkChoiceSummary {
    fn from(fork_choice: &ForkChoice) -> Self {
        let head = fork_choice.heaviest_node();
        Self {
            justified_epoch: fork_choice.justified_checkpoint.epoch,
            finalized_epoch: fork_choice.finalized_checkpoint.epoch,
            nodes: fork_choice.fork_choice_nodes.len(),
            head_slot: head.map(|node| node.slot),
            head_root: head.map(|node| node.block_root.clone()),
        }
    }
}

fn inspect(frame: &Frame) -> Inspection<'_> {
    // Payloads that are not a fork choice dump are still reported by metadata.
    let fork_choice = serde_json::from_value::<ForkChoice>(frame.data.clone())
        .ok()
        .map(|fork_choice| ForkChoiceSummary::from(&fork_choice));
    Inspection {
        metadata: &frame.metadata,
        fork_choice,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Inspect { blob } = &cli.command {
        let frame = read_frame(blob)?;
        return print_json(&inspect(&frame));
    }

    let config = load_config(&cli.config, cli.engine.as_deref(), cli.dsn.as_deref())?;

    let cancel = CancellationToken::new();
    if let Some(secs) = cli.timeout_secs {
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            timer.cancel();
        });
    }

    tracing::debug!(engine = %config.indexer.engine(), "Opening frame index");
    let indexer = tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("timed out opening the frame index"),
        indexer = Indexer::open(&config.indexer) => {
            indexer.context("failed to open frame index")?
        }
    };

    run(cli.command, &indexer, &cancel).await
}

async fn run(command: Commands, indexer: &Indexer, cancel: &CancellationToken) -> Result<()> {
    match command {
        Commands::Migrate => {
            indexer
                .health_check(cancel)
                .await
                .context("health check failed")?;
            tracing::info!(engine = %indexer.engine(), "Frame index schema is ready");
        }
        Commands::Add { blob, labels } => {
            let frame = read_frame(&blob)?;
            let mut metadata = frame.metadata;
            metadata.labels.extend(labels);
            indexer
                .add_frame(&metadata, cancel)
                .await
                .with_context(|| format!("failed to index frame {}", metadata.id))?;
            tracing::info!(frame_id = %metadata.id, node = %metadata.node, "Frame indexed");
        }
        Commands::Remove { id } => {
            indexer
                .remove_frame(&id, cancel)
                .await
                .with_context(|| format!("failed to remove frame {id}"))?;
            tracing::info!(frame_id = %id, "Frame removed");
        }
        Commands::Show { id } => {
            let frame = indexer
                .get_frame(&id, cancel)
                .await
                .with_context(|| format!("failed to look up frame {id}"))?
                .with_context(|| format!("frame {id} is not indexed"))?;
            print_json(&frame)?;
        }
        Commands::Frames(filter) => {
            print_json(&indexer.list_frames(&filter.to_filter(), cancel).await?)?;
        }
        Commands::Nodes(filter) => {
            print_json(&indexer.list_distinct_nodes(&filter.to_filter(), cancel).await?)?;
        }
        Commands::Slots(filter) => {
            print_json(&indexer.list_distinct_slots(&filter.to_filter(), cancel).await?)?;
        }
        Commands::Epochs(filter) => {
            print_json(&indexer.list_distinct_epochs(&filter.to_filter(), cancel).await?)?;
        }
        Commands::Labels(filter) => {
            print_json(&indexer.list_distinct_labels(&filter.to_filter(), cancel).await?)?;
        }
        Commands::Sources => {
            print_json(&indexer.list_sources(cancel).await?)?;
        }
        Commands::Inspect { blob } => {
            print_json(&inspect(&read_frame(&blob)?))?;
        }
    }
    Ok(())
}
