//! Beacon CLI - accessibility audits for component documentation sites.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Accessibility audits for component documentation sites")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to beacon.toml config file
    #[arg(short, long, default_value = "beacon.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default beacon.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        yes: bool,
    },

    /// Audit every component preview of a built site
    Audit {
        /// Built site to audit (defaults to config or "build")
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Number of browser instances
        #[arg(short = 'n', long)]
        instances: Option<usize>,

        /// Port to serve the site on
        #[arg(short, long)]
        port: Option<u16>,

        /// Give up on a page after this many retries
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Serve a built site without auditing
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Audit {
            dir,
            instances,
            port,
            max_retries,
        } => {
            let overrides = config::Overrides {
                dir,
                instances,
                port,
                max_retries,
            };
            commands::audit::run(&cli.config, overrides).await?;
        }
        Commands::Serve { port, dir } => {
            let overrides = config::Overrides {
                dir,
                port,
                ..Default::default()
            };
            commands::serve::run(&cli.config, overrides).await?;
        }
    }

    Ok(())
}
