//! Command-line interface for copper-sync
//!
//! # Usage Examples
//!
//! ## Discovery
//! ```bash
//! # Print the catalog of extractable streams
//! copper-sync discover --config config.json > catalog.json
//! ```
//!
//! ## Sync
//! ```bash
//! # First run: sync the streams selected in the catalog
//! copper-sync sync \
//!   --config config.json \
//!   --catalog catalog.json \
//!   --state-output state.json > records.jsonl
//!
//! # Later runs: resume from the previous state
//! copper-sync sync \
//!   --config config.json \
//!   --catalog catalog.json \
//!   --state state.json \
//!   --state-output state.json >> records.jsonl
//! ```
//!
//! Protocol messages go to stdout; logs go to stderr. Exit code is non-zero
//! when any stream fails or discovery cannot produce a catalog.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bookmark::BookmarkState;
use copper_sync::{Config, CopperClient, Syncer};
use singer::{Catalog, JsonLinesEmitter};

#[derive(Parser)]
#[command(name = "copper-sync")]
#[command(about = "Extract Copper CRM data as a Singer-style record stream")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover extractable streams and print the catalog
    Discover {
        /// Path to the JSON config file
        #[arg(long, env = "COPPER_SYNC_CONFIG")]
        config: PathBuf,
    },
    /// Sync the streams selected in a catalog
    Sync {
        /// Path to the JSON config file
        #[arg(long, env = "COPPER_SYNC_CONFIG")]
        config: PathBuf,

        /// Catalog file with selection flags
        #[arg(long)]
        catalog: PathBuf,

        /// State file from a previous run
        #[arg(long)]
        state: Option<PathBuf>,

        /// Where to write the final state
        #[arg(long)]
        state_output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing. Logs must go to stderr: stdout carries the
    // protocol messages.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { config } => {
            Config::from_path(&config)?;
            tracing::info!("Starting discover");
            let catalog = copper_sync::discover()?;
            println!("{}", catalog.to_pretty_string()?);
            tracing::info!("Finished discover");
        }
        Commands::Sync {
            config,
            catalog,
            state,
            state_output,
        } => {
            let config = Config::from_path(&config)?;
            let catalog = Catalog::load(&catalog)?;
            let state = match &state {
                Some(path) => bookmark::read_state_file(path)?,
                None => BookmarkState::default(),
            };

            let client = CopperClient::new(&config)?;
            let mut sink = JsonLinesEmitter::new(std::io::stdout());
            let mut syncer = Syncer::new(
                &client,
                &mut sink,
                &catalog,
                state,
                config.start_date_epoch(),
            );

            let result = syncer.run().await;

            // Committed bookmarks survive a failed run, so the state file is
            // written either way before the error propagates.
            if let Some(path) = &state_output {
                bookmark::write_state_file(path, syncer.state())
                    .with_context(|| format!("Failed to persist state to {}", path.display()))?;
            }
            result?;
        }
    }

    Ok(())
}
