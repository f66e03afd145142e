//! vigil: collect, score, persist, and republish threat-indicator feeds.

mod config;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::VigilConfig;
use std::path::PathBuf;
use vigil_collect::Collector;
use vigil_publish::{ListClient, Publisher};
use vigil_store::{DiskKv, IndicatorStore};
use vigil_sync::{SyncConfig, SyncEngine};

#[derive(Parser)]
#[command(
    name = "vigil",
    version,
    about = "Threat-indicator feed aggregation and capacity-aware publishing"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "vigil.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify downstream credentials and write initial feed metadata
    Init,
    /// Run one synchronization cycle
    Run {
        /// Skip the cycle unless the configured interval has elapsed
        #[arg(long)]
        if_needed: bool,
    },
    /// Show feed metadata and the last run result
    Status,
    /// Show the configured sources
    Sources,
    /// Look up one indicator by value
    Lookup {
        /// Raw value; normalized before lookup
        value: String,
    },
    /// Delete every persisted key, chunks included
    Reset {
        /// Confirm the destructive reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = VigilConfig::load(&cli.config)?;

    let problems = cfg.validate();
    if !problems.is_empty() {
        bail!("invalid configuration:\n  - {}", problems.join("\n  - "));
    }
    let token = cfg.resolve_token().context("no API token resolved")?;

    let kv = DiskKv::open(&cfg.data_dir).await?;
    let store = IndicatorStore::new(kv);
    let collector = Collector::new(cfg.sources.clone())?;
    let client = ListClient::new(&cfg.api.base_url, token)?;
    let publisher = Publisher::new(client);
    let engine = SyncEngine::new(
        collector,
        store,
        publisher,
        SyncConfig {
            feed_list_id: cfg.feed.list_id.clone(),
            feed_name: cfg.feed.name.clone(),
            feed_description: cfg.feed.description.clone(),
            update_interval_hours: cfg.feed.update_interval_hours,
        },
    );

    match cli.command {
        Command::Init => {
            let meta = engine.initialize().await?;
            println!("initialized feed '{}' (list {})", meta.name, meta.feed_list_id);
        }
        Command::Run { if_needed } => {
            if if_needed && !engine.is_update_needed(Utc::now()).await? {
                println!("feed is up to date, skipping cycle");
                return Ok(());
            }
            let run = engine.run_cycle().await?;
            println!(
                "cycle finished in {}ms: +{} -{} indicators, {} isolated failure(s)",
                run.duration_ms,
                run.indicators_added,
                run.indicators_removed,
                run.errors.len()
            );
            for error in &run.errors {
                println!("  warning: {error}");
            }
        }
        Command::Status => {
            let status = engine.status(Utc::now()).await?;
            match status.metadata {
                Some(meta) => println!(
                    "feed '{}': {} indicators, list {}",
                    meta.name, meta.indicator_count, meta.feed_list_id
                ),
                None => println!("feed not initialized"),
            }
            match status.last_update {
                Some(when) => println!("last successful update: {}", when.to_rfc3339()),
                None => println!("no successful update yet"),
            }
            if let Some(run) = status.last_run {
                println!(
                    "last run: success={} +{} -{} in {}ms",
                    run.success, run.indicators_added, run.indicators_removed, run.duration_ms
                );
            }
            println!("update needed: {}", status.update_needed);
        }
        Command::Sources => {
            for source in engine.sources() {
                println!(
                    "{} [{}] weight={} enabled={} {}",
                    source.name, source.format, source.weight, source.enabled, source.url
                );
            }
        }
        Command::Lookup { value } => match engine.lookup(&value).await? {
            Some(ind) => println!("{}", serde_json::to_string_pretty(&ind)?),
            None => println!("not found"),
        },
        Command::Reset { yes } => {
            if !yes {
                bail!("reset deletes all persisted state; pass --yes to confirm");
            }
            engine.reset().await?;
            println!("store cleared");
        }
    }

    Ok(())
}
