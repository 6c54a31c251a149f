//! Campaign Harvester CLI
//!
//! `discover` builds the URL list, `extract` turns it into the JSON
//! artifact, `run` does both.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use campaign_harvester_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use campaign_harvester_lib::infrastructure::{AppConfig, ConfigManager, HttpSessionFactory};
use campaign_harvester_lib::HarvestPipeline;

/// Campaign Harvester CLI.
#[derive(Parser)]
#[command(name = "campaign-harvester")]
#[command(about = "Discover crowdfunding project URLs and extract project records")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "CAMPAIGN_HARVESTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file and print its path
    InitConfig,

    /// Discover item URLs from the listing and save the URL list
    Discover {
        /// Number of unique URLs to collect
        #[arg(long)]
        target: Option<usize>,

        /// Listing URL to paginate
        #[arg(long)]
        listing: Option<String>,
    },

    /// Extract records for a saved URL list
    Extract {
        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// URL list to read
        #[arg(long)]
        input: Option<PathBuf>,

        /// Artifact destination
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Discover, then extract
    Run,
}

fn config_manager(path: Option<PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

fn pipeline(config: AppConfig) -> Result<HarvestPipeline<HttpSessionFactory>> {
    config.validate().context("Invalid run parameters")?;
    let factory = Arc::new(HttpSessionFactory::new(config.http.clone()));
    Ok(HarvestPipeline::new(factory, config))
}

async fn execute(cli: Cli) -> Result<()> {
    let manager = config_manager(cli.config)?;

    if let Commands::InitConfig = cli.command {
        let config = manager.reset_to_defaults().await?;
        println!("{}", manager.config_path().display());
        info!(fields = config.schema.len(), "Default configuration written");
        return Ok(());
    }

    let mut config = manager.load_validated().await?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    match cli.command {
        Commands::InitConfig => {}
        Commands::Discover { target, listing } => {
            if let Some(target) = target {
                config.harvest.target_count = target;
            }
            if let Some(listing) = listing {
                config.harvest.listing_url = listing;
            }
            let report = pipeline(config)?.discover().await?;
            info!(
                urls = report.items.len(),
                outcome = ?report.outcome,
                cycles = report.cycles,
                "Discovery complete"
            );
        }
        Commands::Extract {
            workers,
            input,
            output,
        } => {
            if let Some(workers) = workers {
                config.harvest.worker_count = workers;
            }
            if let Some(output) = output {
                config.harvest.output_path = output;
            }
            let input = input.unwrap_or_else(|| config.harvest.url_list_path.clone());
            let records = pipeline(config)?.extract_from_file(&input).await?;
            info!(
                records = records.len(),
                failures = records.failures().len(),
                "Extraction complete"
            );
        }
        Commands::Run => {
            let records = pipeline(config)?.run().await?;
            info!(
                records = records.len(),
                failures = records.failures().len(),
                "Harvest complete"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        error!("Harvest failed: {e:#}");
        return Err(e);
    }
    Ok(())
}
