//! # Pipeline Provisioner
//!
//! Loads the pipeline configuration and runs the region orchestrator, either
//! against AWS (with the `aws` feature) or against the in-memory backend with
//! `--dry-run`. Ctrl-C stops the run before the next region starts.

use clap::Parser;
use recorder_pipeline::config::ConfigManager;
use recorder_pipeline::logging::{flush_logs, init_structured_logging};
use recorder_pipeline::providers::{InMemoryCloud, ProviderSet};
use recorder_pipeline::RegionOrchestrator;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "provision-pipeline")]
#[command(about = "Provision cross-region configuration recorders and their load stream")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Environment section to apply (defaults to PIPELINE_ENV / APP_ENV)
    #[arg(short, long)]
    environment: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long, env = "PIPELINE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Run against a simulated in-memory account
    #[arg(long)]
    dry_run: bool,

    /// Account id used by --dry-run
    #[arg(long, default_value = "123456789012")]
    dry_run_account: String,

    /// Override execution.max_concurrent_regions
    #[arg(long)]
    max_concurrent_regions: Option<usize>,

    /// Report format (table, json)
    #[arg(long, default_value = "table")]
    format: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_structured_logging();

    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = match ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &environment)
    {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            eprintln!("❌ {e}");
            exit_with(2);
        }
    };

    let mut config = manager.config().clone();
    if let Some(max) = cli.max_concurrent_regions {
        config.execution.max_concurrent_regions = max;
    }

    let providers = match build_providers(&cli).await {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("❌ {e}");
            exit_with(2);
        }
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next region");
            signal_token.cancel();
        }
    });

    info!(
        environment = %manager.environment(),
        config = %manager.debug_config(),
        dry_run = cli.dry_run,
        "Starting provisioning run"
    );

    let orchestrator = RegionOrchestrator::from_config(&config, providers);
    let report = orchestrator
        .run_with_cancellation(&config.pipeline, cancel)
        .await;

    match cli.format.as_str() {
        "json" => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("❌ Failed to render report: {e}");
                exit_with(2);
            }
        },
        _ => print!("{report}"),
    }

    if !report.succeeded() {
        exit_with(1);
    }
    flush_logs();
}

fn exit_with(code: i32) -> ! {
    flush_logs();
    process::exit(code)
}

async fn build_providers(cli: &Cli) -> anyhow::Result<ProviderSet> {
    if cli.dry_run {
        let cloud = Arc::new(InMemoryCloud::new(cli.dry_run_account.clone()));
        return Ok(ProviderSet::from_backend(cloud));
    }
    aws_providers().await
}

#[cfg(feature = "aws")]
async fn aws_providers() -> anyhow::Result<ProviderSet> {
    let cloud = recorder_pipeline::providers::aws::AwsCloud::from_env().await;
    Ok(ProviderSet::from_backend(Arc::new(cloud)))
}

#[cfg(not(feature = "aws"))]
async fn aws_providers() -> anyhow::Result<ProviderSet> {
    anyhow::bail!("built without the `aws` feature; rebuild with --features aws or pass --dry-run")
}
