//! Tessera Kernel
//!
//! Diagnostic CLI: resolves plugin order and boots discovered plugins
//! against an in-memory store.
//!
//! Usage:
//!   tessera order --plugins-dir ./plugins
//!   tessera boot

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tessera_kernel::config::Config;
use tessera_kernel::plugin::cli;

/// Tessera kernel command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the dependency-resolved plugin load order.
    Order {
        /// Plugin directory (overrides TESSERA_PLUGINS_DIR).
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// Load, install and enable all plugins, then print their states.
    Boot {
        /// Plugin directory (overrides TESSERA_PLUGINS_DIR).
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;

    match args.command {
        Command::Order { plugins_dir } => {
            if let Some(dir) = plugins_dir {
                config.plugins_dir = dir;
            }
            cli::cmd_plugin_order(&config.plugins_dir)
        }
        Command::Boot { plugins_dir } => {
            if let Some(dir) = plugins_dir {
                config.plugins_dir = dir;
            }
            info!(plugins_dir = %config.plugins_dir.display(), "booting plugins");
            cli::cmd_boot(&config).await
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
