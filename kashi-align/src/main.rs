//! kashi-align - Lyrics Alignment Microservice
//!
//! Aligns Japanese lyric lines to an audio recording and returns a
//! start/end timestamp per line. Refuses to start unless ffmpeg,
//! espeak-ng and aeneas are all available.

use anyhow::Result;
use clap::Parser;
use kashi_common::config::{ensure_scratch_dir, CliOverrides, ServiceConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kashi_align::fetch::HttpAudioFetcher;
use kashi_align::pipeline::{AlignmentPipeline, PipelineSettings};
use kashi_align::preflight::{default_probes, ensure_ready};
use kashi_align::process::TokioProcessInvoker;
use kashi_align::{build_router, AppState};

const MODULE_NAME: &str = "kashi-align";

/// Command-line arguments (highest configuration priority)
#[derive(Debug, Parser)]
#[command(name = "kashi-align", version, about = "Japanese lyrics forced-alignment service")]
struct Args {
    /// Path to TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Directory for per-request temporary artifacts
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        Self {
            config: args.config,
            host: args.host,
            port: args.port,
            scratch_dir: args.scratch_dir,
            log_level: args.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::resolve(MODULE_NAME, args.into())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting Kashi Lyrics Alignment (kashi-align) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    ensure_scratch_dir(&config.scratch_dir)?;
    info!("Scratch directory: {}", config.scratch_dir.display());

    let invoker = Arc::new(TokioProcessInvoker);

    let probes = default_probes(&config.tools, config.timeouts.preflight());
    if let Err(report) = ensure_ready(invoker.as_ref(), &probes).await {
        eprintln!("{}", report);
        error!(faults = report.faults.len(), "Dependency preflight failed, refusing to start");
        anyhow::bail!("Missing required dependencies. See error messages above.");
    }

    let fetcher = Arc::new(HttpAudioFetcher::new(config.timeouts.fetch())?);
    let pipeline = AlignmentPipeline::new(invoker, fetcher, PipelineSettings::from_config(&config));

    let state = AppState::new(pipeline);
    let app = build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("kashi-align listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app).await?;

    Ok(())
}
