//! sima-admin - batch maintenance commands for simannotator
//!
//! Usage:
//!   sima-admin import-annotations <DIR> <USERNAME>
//!   sima-admin export-annotations <DATASET> <OUT_DIR>
//!   sima-admin update-complete <DATASET>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sima_common::config::{RootFolderInitializer, RootFolderResolver};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sima-admin")]
#[command(about = "Batch maintenance commands for simannotator")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import annotations from a directory of <sound>.json files
    ImportAnnotations {
        /// Directory containing the annotation files
        dir: PathBuf,
        /// User recorded as author of the imported annotations
        username: String,
    },
    /// Write one JSON file per annotated sound of a data set
    ExportAnnotations {
        dataset: String,
        out_dir: PathBuf,
    },
    /// Recompute the completion state of every sound in a data set
    UpdateComplete { dataset: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!(
        "sima-admin v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("sima-admin")
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    if !initializer.database_exists() {
        warn!("No database at {}, a new one will be created", initializer.database_path().display());
    }
    initializer.ensure_directory_exists()?;
    let pool = sima_common::db::init_database(&initializer.database_path())
        .await
        .context("opening database")?;

    match args.command {
        Command::ImportAnnotations { dir, username } => {
            let summary = sima_common::import::import_directory(&pool, &dir, &username)
                .await
                .with_context(|| format!("importing annotations from {}", dir.display()))?;
            for path in &summary.failed {
                warn!("Not imported: {}", path.display());
            }
            info!("{} annotations imported from {} files", summary.annotations, summary.files);
        }
        Command::ExportAnnotations { dataset, out_dir } => {
            let summary = sima_common::export::export_data_set(&pool, &dataset, &out_dir)
                .await
                .with_context(|| format!("exporting data set {}", dataset))?;
            info!("{} files written, {} sounds failed", summary.written.len(), summary.failed);
        }
        Command::UpdateComplete { dataset } => {
            let summary = sima_common::completion::refresh_data_set(&pool, &dataset)
                .await
                .with_context(|| format!("updating completion of data set {}", dataset))?;
            info!(
                "{} complete, {} incomplete, {} empty, {} discarded",
                summary.complete, summary.incomplete, summary.empty, summary.discarded
            );
        }
    }

    pool.close().await;
    Ok(())
}
