//! sima-server - annotation task service
//!
//! Serves annotation tasks for the web front-end and keeps related tiers'
//! annotations synchronized on every submission.

use anyhow::Result;
use clap::Parser;
use sima_common::config::{RootFolderInitializer, RootFolderResolver, ServerSettings};
use sima_server::{build_router, AppState};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sima-server")]
#[command(about = "Annotation task service for simannotator")]
#[command(version)]
struct Args {
    /// Root folder holding the database and media files
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Address to bind (overrides config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = RootFolderResolver::new("sima-server").with_cli_arg(args.root_folder);
    let toml_config = resolver.load_toml();

    let default_filter = toml_config.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting simannotator server (sima-server) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolver.resolve_with(&toml_config);
    let initializer = RootFolderInitializer::new(root_folder.clone());
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match sima_common::db::init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let settings = ServerSettings::resolve(&toml_config, args.host, args.port);
    let state = AppState::new(pool, &settings.media_url).with_media_dir(root_folder.join("media"));
    let app = build_router(state);

    let address = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("sima-server listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
