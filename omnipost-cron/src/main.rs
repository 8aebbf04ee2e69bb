//! omnipost-cron - batch trigger for scheduled publishing
//!
//! Exposes the publishing engine two ways: a guarded HTTP endpoint for an
//! external cron service to hit, and a --once mode that runs a single
//! batch and prints the report.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use clap::Parser;
use libomnipost::error::ConfigError;
use libomnipost::{Config, Engine, OmnipostError, Result};
use serde_json::json;
use tracing::{error, info, warn};

const DEFAULT_BIND: &str = "127.0.0.1:8787";

#[derive(Parser, Debug)]
#[command(name = "omnipost-cron")]
#[command(version)]
#[command(about = "Batch trigger for scheduled publishing")]
#[command(long_about = "\
omnipost-cron - batch trigger for scheduled publishing

DESCRIPTION:
    omnipost-cron runs the Omnipost publishing cycle: weekly slots promote
    due drafts to scheduled, then due scheduled posts are dispatched to
    their connected platforms.

    In server mode it listens for POST /cron/run, guarded by a bearer
    secret, so an external cron service can trigger batches. With --once
    it runs a single batch immediately and prints the JSON report.

USAGE:
    # Serve the trigger endpoint
    omnipost-cron

    # Run one batch and exit
    omnipost-cron --once

    # Custom bind address
    omnipost-cron --bind 0.0.0.0:9000

CONFIGURATION:
    Configuration file: ~/.config/omnipost/config.toml
    Database location: ~/.local/share/omnipost/omnipost.db

    The trigger secret comes from OMNIPOST_CRON_SECRET or the [cron]
    section of the config file.

EXIT CODES:
    0 - Clean shutdown / batch succeeded
    1 - Runtime error
    2 - Authentication problem
    3 - Invalid input

For more information, visit: https://github.com/omnipost/omnipost
")]
struct Cli {
    /// Path to config file (overrides OMNIPOST_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    #[arg(help = "Bind address for the trigger endpoint (default: 127.0.0.1:8787)")]
    bind: Option<String>,

    /// Run one batch and exit
    #[arg(long)]
    #[arg(help = "Run a single batch, print the JSON report, and exit")]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

struct AppState {
    engine: Engine,
    secret: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libomnipost::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let engine = Engine::from_config(&config).await?;

    if cli.once {
        let report = engine.run_batch(Utc::now()).await?;
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
        return Ok(());
    }

    let secret = config.cron_secret().ok_or_else(|| {
        OmnipostError::Config(ConfigError::MissingField(
            "cron secret (set OMNIPOST_CRON_SECRET or [cron].secret)".to_string(),
        ))
    })?;

    let bind = cli
        .bind
        .or(config.cron.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let state = Arc::new(AppState { engine, secret });
    let app = Router::new()
        .route("/cron/run", post(run_batch_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| OmnipostError::InvalidInput(format!("cannot bind {bind}: {e}")))?;
    info!("omnipost-cron listening on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| OmnipostError::InvalidInput(format!("server error: {e}")))?;

    info!("omnipost-cron stopped");
    Ok(())
}

async fn run_batch_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !authorized(&headers, &state.secret) {
        warn!("rejected cron trigger with bad or missing secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.engine.run_batch(Utc::now()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!("batch run failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// The Authorization header must carry exactly `Bearer <secret>`.
fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {secret}"))
        .unwrap_or(false)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install shutdown handler: {e}");
    } else {
        info!("shutdown signal received");
    }
}
