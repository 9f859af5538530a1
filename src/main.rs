//! banana3d — character image to textured 3D model
//!
//! Usage:
//!   banana3d serve  --config config.toml                      # run the HTTP API
//!   banana3d views  --config config.toml --image hero.png     # synthesize views once
//!   banana3d model  --config config.toml                      # reconstruct mesh from stored views

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use banana3d::api::{self, AppState};
use banana3d::config::Config;
use banana3d::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "banana3d", about = "Character image to 3D model pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API until CTRL+C.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Generate the front/back/left views for one image and exit.
    Views {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// Source character image.
        #[arg(long)]
        image: PathBuf,
    },
    /// Reconstruct a mesh from previously generated views and print its URL.
    Model {
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => run_serve(&config).await,
        Command::Views { config, image } => run_views(&config, &image).await,
        Command::Model { config } => run_model(&config).await,
    }
}

/// A missing config file is not an error: defaults plus env keys are enough.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        warn!(path = ?path, "Config file not found, using defaults");
        Ok(Config::from_env()?)
    }
}

async fn run_serve(config_path: &Path) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;

    if cfg.gemini.api_key.is_empty() {
        warn!("No Gemini API key configured (gemini.api_key / GEMINI_API_KEY)");
    }
    if cfg.fal.api_key.is_empty() {
        warn!("No fal.ai API key configured (fal.api_key / FAL_KEY)");
    }

    info!(
        bind = cfg.server.bind,
        port = cfg.server.port,
        base_path = ?cfg.storage.base_path,
        model = cfg.gemini.model,
        app = cfg.fal.app_id,
        "Starting banana3d"
    );

    let pipeline = Pipeline::new(&cfg).context("Failed to start pipeline")?;
    let state = Arc::new(AppState { pipeline: Arc::new(pipeline) });

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, shutting down…"),
            Err(e) => warn!(error = %e, "Signal error"),
        }
    };

    api::start_server(
        state,
        &cfg.server.bind,
        cfg.server.port,
        cfg.server.max_upload_mb.saturating_mul(1024 * 1024),
        shutdown,
    )
    .await
    .context("HTTP server error")?;
    Ok(())
}

async fn run_views(config_path: &Path, image: &Path) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    let pipeline = Pipeline::new(&cfg).context("Failed to start pipeline")?;

    let upload = tokio::fs::read(image)
        .await
        .with_context(|| format!("Cannot read image {image:?}"))?;
    let report = pipeline.generate_views(&upload).await?;

    for view in &report.generated {
        println!("{:<6} {}", view, pipeline.store().view_path(*view).display());
    }
    for view in &report.missing {
        println!("{:<6} (no image returned)", view);
    }
    if !report.is_complete() {
        anyhow::bail!("{} view(s) could not be generated", report.missing.len());
    }
    Ok(())
}

async fn run_model(config_path: &Path) -> anyhow::Result<()> {
    let cfg = load_config(config_path)?;
    let pipeline = Pipeline::new(&cfg).context("Failed to start pipeline")?;

    let url = pipeline.generate_model().await?;
    println!("{url}");
    Ok(())
}
