//! # Argus Server
//!
//! HTTP facade over the Argus quality diagnosis engine.
//!
//! ## Overview
//!
//! The server wires the engine services together and exposes them as a
//! JSON API:
//!
//! - **Still frames**: upload, base64, or URL diagnosis through the
//!   frame pipeline
//! - **Video files**: sampled analysis with freeze/scene-change/shake
//!   detection
//! - **Live streams**: RTSP/RTMP ingestion with rolling results
//! - **Scheduled tasks**: cron-driven batch sweeps over directories
//! - **Baselines**: reference images and drift comparison

pub mod api_types;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use argus_config::AppConfig;

use crate::state::AppState;

/// Command line arguments for the Argus server
#[derive(Parser, Debug)]
#[command(name = "argus-server")]
#[command(about = "Video/image quality diagnosis service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "ARGUS_CONFIG")]
    config: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "ARGUS_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "ARGUS_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    let state = AppState::build(config).context("failed to build application state")?;
    state.scheduler.start().context("failed to start scheduler")?;

    let app = routes::router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "argus server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    let streams = Arc::clone(&state.streams);
    let scheduler = Arc::clone(&state.scheduler);
    tokio::task::spawn_blocking(move || {
        streams.stop_all();
        scheduler.shutdown();
    })
    .await
    .ok();
}
