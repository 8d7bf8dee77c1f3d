//! dirsnap — point-in-time directory snapshots, delivered.
//!
//! Reads a JSON configuration describing backup jobs, then for each job:
//! builds a snapshot (one archive per first-level subdirectory, assembled
//! into a master archive), copies the master archive to every local
//! destination, uploads it to every configured bucket, and cleans up.

mod config;
mod error;

use crate::error::{ErrorKind, Result};
use clap::Parser;
use dirsnap_snapshot::Destinations;
use dirsnap_transfer::ObjectStoreTransfer;
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dirsnap", version, about = "Snapshot a directory tree and replicate it to local and S3 destinations")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "backup.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The Debug form carries the exn location tree.
            eprintln!("ERROR: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = config::load(&cli.config)?;
    let store = config.object_store.as_ref().map(|settings| ObjectStoreTransfer::new(&settings.to_settings()));

    for job in &config.jobs {
        tracing::info!(source = %job.source.display(), "starting backup job");
        let source = job.source.clone();
        let destinations = Destinations {
            local: job.destinations.local.clone(),
            buckets: job.destinations.buckets.clone(),
        };

        // Snapshot construction is blocking filesystem work; keep it off the
        // async runtime's worker.
        let build = tokio::task::spawn_blocking(move || dirsnap_snapshot::make(&source, destinations))
            .await
            .or_raise(|| ErrorKind::Snapshot)?
            .or_raise(|| ErrorKind::Snapshot)?;

        if !build.coverage.is_complete() {
            tracing::warn!(
                missing = ?build.coverage.missing,
                "snapshot coverage incomplete; delivering what was archived"
            );
        }

        dirsnap_transfer::deliver(&build.snapshot, store.as_ref()).await.or_raise(|| ErrorKind::Transfer)?;
        tracing::info!(run = %build.snapshot.run_name(), "backup job complete");
    }
    Ok(())
}
