//! # sitesync
//!
//! CLI tool for inspecting sitesync state and records.
//!
//! ## Commands
//!
//! - `status`: Show persisted sync identity and watermark
//! - `config`: Validate and print engine configuration
//! - `build`: Dry-run mutations against a snapshot and print the messages
//! - `reset`: Forget persisted sync state
//!
//! ## Example
//!
//! ```bash
//! # Show stored identity
//! sitesync status
//!
//! # Check a config file
//! sitesync config --file sitesync.toml
//!
//! # What would adding site 3 send?
//! sitesync build --state snapshot.json --device-id 0a0b0c '{"type":"addSite","index":3}'
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{build, config, reset, status};

/// CLI tool for inspecting sitesync state and records.
#[derive(Parser, Debug)]
#[command(name = "sitesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding persisted sync state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show persisted sync identity and watermark
    Status,

    /// Validate and print engine configuration
    Config {
        /// Config file (default: sitesync.toml in the data directory)
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Dry-run mutations against a local-state snapshot
    Build {
        /// JSON snapshot of local state
        #[arg(long, short)]
        state: PathBuf,

        /// Device id as hex (default: the persisted one)
        #[arg(long)]
        device_id: Option<String>,

        /// Treat start-up as a first run and include the backfill
        #[arg(long)]
        first_run: bool,

        /// Mutation events as JSON
        mutations: Vec<String>,
    },

    /// Forget persisted sync state
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    match cli.command {
        Commands::Status => {
            status::run(&data_dir).await?;
        }
        Commands::Config { file } => {
            let path = file.unwrap_or_else(|| data_dir.join(config::CONFIG_FILE));
            config::run(&path)?;
        }
        Commands::Build {
            state,
            device_id,
            first_run,
            mutations,
        } => {
            let options = build::BuildOptions {
                state,
                device_id,
                first_run,
                mutations,
                config: data_dir.join(config::CONFIG_FILE),
            };
            build::run(&data_dir, &options).await?;
        }
        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to reset without --yes");
            }
            reset::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for sitesync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "sitesync", "sitesync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
