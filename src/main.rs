//! Staking auto-compounder - withdraws rewards and validator commission and
//! re-delegates them on a fixed schedule
//!
//! # WARNING
//! - This tool signs and broadcasts real transactions with your keys.
//! - The root password is only ever read interactively; never put it in a
//!   config file, flag or environment variable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use fx_compounder::cli::commands;
use fx_compounder::config::Config;

/// Staking auto-compounder for Cosmos SDK chains
#[derive(Parser)]
#[command(name = "compound")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "compounder.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start compounding (prompts for the root password)
    Run,

    /// Encrypt a seed phrase for the config file
    Encrypt,

    /// Check node health
    Health,

    /// Show current configuration (seeds masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fx_compounder=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    // Seed encryption happens before any config exists
    if let Commands::Encrypt = cli.command {
        if let Err(e) = commands::encrypt() {
            error!("Encryption failed: {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Health => commands::health(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Encrypt => Ok(()),
    };

    if let Err(e) = result {
        error!("{}: {:#}", commands::failure_label(&e), e);
        std::process::exit(1);
    }

    Ok(())
}
