//! coldcast: drives the cold-start forecasting workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use coldcast_client::{
    Credentials, ForecastApi, HttpForecastClient, LocalObjectStore, ObjectStore, S3ObjectStore,
    SimulatedForecastService,
};
use coldcast_core::{ColdcastConfig, ResourceArn};
use coldcast_runtime::{prepare_inputs, ResourceLedger, WorkflowContext};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SIMULATED_BUCKET: &str = "coldcast-simulated";
const SIMULATED_ROLE: &str = "arn:aws:iam::000000000000:role/coldcast-simulated";

#[derive(Parser)]
#[command(name = "coldcast")]
#[command(about = "Cold-start item forecasting on a managed forecasting service", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, default_value = "coldcast.json", global = true)]
    config: PathBuf,

    /// Run against an in-process simulated service and a local object store
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with default values
    Init,

    /// Split the input CSVs locally without touching the service
    Prepare {
        /// Output directory (default: <data_dir>/prepared)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the whole workflow
    Run {
        /// Leave resources in place instead of tearing them down
        #[arg(long)]
        keep: bool,
    },

    /// Query an existing forecast
    Query {
        #[arg(long)]
        forecast_arn: String,

        /// Item id to query (repeatable)
        #[arg(long = "item", required = true)]
        items: Vec<String>,
    },

    /// Delete every resource recorded in a ledger
    Teardown {
        /// Ledger file (default: <data_dir>/ledger.json)
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// Show the lifecycle status of every resource in a ledger
    Status {
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
}

fn load_config(path: &Path, simulate: bool) -> anyhow::Result<ColdcastConfig> {
    let mut config = ColdcastConfig::load(path)?;
    if simulate {
        if config.bucket.is_empty() {
            config.bucket = SIMULATED_BUCKET.into();
        }
        if config.role_arn.is_empty() {
            config.role_arn = SIMULATED_ROLE.into();
        }
        // Simulated resources settle in a couple of describes.
        config.poll.interval_secs = 1;
    }
    config.validate()?;
    Ok(config)
}

fn build_context(
    config: ColdcastConfig,
    ledger: ResourceLedger,
    simulate: bool,
) -> anyhow::Result<WorkflowContext> {
    let (api, store): (Arc<dyn ForecastApi>, Arc<dyn ObjectStore>) = if simulate {
        let root = config.data_dir.join("simulated-s3");
        info!("Simulated mode: objects under {}", root.display());
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(root));
        let api = SimulatedForecastService::new(store.clone()).with_region(&config.region);
        (Arc::new(api), store)
    } else {
        let credentials = Credentials::from_env()?;
        let api = HttpForecastClient::new(&config, credentials.clone())?;
        let store = S3ObjectStore::new(&config, credentials)?;
        (Arc::new(api), Arc::new(store))
    };
    Ok(WorkflowContext::new(api, store, config, ledger))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            if cli.config.exists() {
                anyhow::bail!("{} already exists", cli.config.display());
            }
            ColdcastConfig::load(&cli.config)?.save()?;
            println!("Wrote {}", cli.config.display());
        }

        Commands::Prepare { out } => {
            let config = ColdcastConfig::load(&cli.config)?;
            let prepared = prepare_inputs(&config)?;
            let out = out.unwrap_or_else(|| config.data_dir.join("prepared"));
            for path in prepared.write_to(&out)? {
                println!("{}", path.display());
            }
            print_json(&prepared.training_summary())?;
        }

        Commands::Run { keep } => {
            let config = load_config(&cli.config, cli.simulate)?;
            let ledger = ResourceLedger::load(config.ledger_path())?;
            if !ledger.is_empty() {
                warn!(
                    "Ledger {} already lists {} resources; new resources are appended",
                    config.ledger_path().display(),
                    ledger.len()
                );
            }
            let mut ctx = build_context(config, ledger, cli.simulate)?;
            let report = ctx.run(keep).await?;
            print_json(&report)?;
            if report.teardown.as_ref().is_some_and(|t| !t.is_clean()) {
                std::process::exit(1);
            }
        }

        Commands::Query {
            forecast_arn,
            items,
        } => {
            let config = load_config(&cli.config, cli.simulate)?;
            let ctx = build_context(config, ResourceLedger::new(), cli.simulate)?;
            let forecasts = ctx
                .query_cold_start(&ResourceArn::new(forecast_arn), &items)
                .await?;
            print_json(&forecasts)?;
        }

        Commands::Teardown { ledger } => {
            let config = load_config(&cli.config, cli.simulate)?;
            let path = ledger.unwrap_or_else(|| config.ledger_path());
            let ledger = ResourceLedger::load(&path)?;
            if ledger.is_empty() {
                println!("Nothing to delete in {}", path.display());
                return Ok(());
            }
            let mut ctx = build_context(config, ledger, cli.simulate)?;
            let report = ctx.teardown().await?;
            print_json(&report)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Status { ledger } => {
            let config = load_config(&cli.config, cli.simulate)?;
            let path = ledger.unwrap_or_else(|| config.ledger_path());
            let ledger = ResourceLedger::load(&path)?;
            let ctx = build_context(config, ledger, cli.simulate)?;
            for state in ctx.status().await? {
                println!(
                    "{:<20} {:<22} {}",
                    state.resource.kind.to_string(),
                    state
                        .status
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "GONE".into()),
                    state.resource.arn
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_and_query() {
        let cli = Cli::parse_from(["coldcast", "--simulate", "run", "--keep"]);
        assert!(cli.simulate);
        assert!(matches!(cli.command, Commands::Run { keep: true }));

        let cli = Cli::parse_from([
            "coldcast",
            "query",
            "--forecast-arn",
            "arn:aws:forecast:us-east-1:1:forecast/f",
            "--item",
            "a",
            "--item",
            "b",
        ]);
        match cli.command {
            Commands::Query { items, .. } => assert_eq!(items, vec!["a", "b"]),
            _ => panic!("expected query"),
        }
        assert_eq!(cli.config, PathBuf::from("coldcast.json"));
    }

    #[test]
    fn test_simulated_config_fills_remote_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json"), true).unwrap();
        assert_eq!(config.bucket, SIMULATED_BUCKET);
        assert_eq!(config.poll.interval_secs, 1);
    }
}
