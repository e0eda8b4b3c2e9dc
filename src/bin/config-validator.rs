//! # Pipeline Configuration Validator
//!
//! Command-line tool for validating pipeline configuration files across
//! environments before a provisioning run touches any account.

use clap::{Parser, Subcommand};
use recorder_pipeline::config::{ConfigManager, ProvisionerConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate recorder pipeline configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for `show` (json, yaml)
    #[arg(long, default_value = "json")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate one section (pipeline, identities, execution)
    Component { name: String },

    /// List available environments
    Environments,

    /// Print the effective configuration with secrets masked
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>, Box<dyn std::error::Error>> {
    match ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment) {
        Ok(manager) => {
            println!(
                "✅ Loaded {} ({})",
                manager.config_path().display(),
                manager.environment()
            );
            Ok(manager)
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {e}");
            Err(Box::new(e))
        }
    }
}

fn validate_all_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Pipeline Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = load(cli)?;
    let config = manager.config();

    validate_pipeline_section(config)?;
    validate_identities_section(config)?;
    validate_execution_section(config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Component: {component_name}");
    let manager = load(cli)?;
    let config = manager.config();

    match component_name {
        "pipeline" => validate_pipeline_section(config)?,
        "identities" => validate_identities_section(config)?,
        "execution" => validate_execution_section(config)?,
        other => {
            println!("❌ Unknown component '{other}' (expected pipeline, identities or execution)");
            return Err(format!("unknown component: {other}").into());
        }
    }

    println!("✅ Component '{component_name}' validation passed!");
    Ok(())
}

fn list_environments() -> Result<(), Box<dyn std::error::Error>> {
    println!("📋 Available Environments:");
    for env in ConfigManager::known_environments() {
        println!("  • {env}");
    }
    println!(
        "\nCurrent (PIPELINE_ENV / APP_ENV): {}",
        ConfigManager::detect_environment()
    );
    Ok(())
}

fn show_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manager = load(cli)?;
    let rendered = match cli.format.as_str() {
        "yaml" => serde_yaml::to_string(manager.config())?,
        _ => serde_json::to_string_pretty(&manager.debug_config())?,
    };
    println!("{rendered}");
    Ok(())
}

fn validate_pipeline_section(config: &ProvisionerConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🌍 Validating Pipeline...");
    config.pipeline.validate()?;
    println!(
        "   ✅ Regions: {} (home region {})",
        config.pipeline.regions.join(", "),
        config.pipeline.home_region().unwrap_or("-")
    );
    println!("   ✅ Snapshot bucket: {}", config.pipeline.bucket_name);
    println!("   ✅ Stream: {}", config.pipeline.stream_name);
    println!(
        "   ✅ Warehouse table: {} as {}",
        config.pipeline.warehouse.table_name, config.pipeline.warehouse.username
    );
    Ok(())
}

fn validate_identities_section(
    config: &ProvisionerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔐 Validating Identities...");
    config.identities.validate()?;
    for role in [&config.identities.recorder_role, &config.identities.delivery_role] {
        println!(
            "   ✅ {} trusts {} ({})",
            role.role_name, role.service_principal, role.managed_policy_arn
        );
    }
    Ok(())
}

fn validate_execution_section(
    config: &ProvisionerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("⚙️  Validating Execution...");
    config.execution.validate()?;
    let mode = if config.execution.max_concurrent_regions > 1 {
        "concurrent"
    } else {
        "sequential"
    };
    println!(
        "   ✅ Region scheduling: {mode} (max {} at once)",
        config.execution.max_concurrent_regions
    );
    Ok(())
}
