use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing, Router};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

use config::Config;
use scanner::{BlocksScanner, ScannerState};
use storage::{create_object_store, Bucket, ObjectStoreBucket};

/// Blocks scanner service
#[derive(Parser, Debug)]
#[command(name = "blocks-scanner")]
#[command(about = "Indexes the blocks stored in a multi-tenant object store", long_about = None)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Clone)]
struct AppState {
    registry: Registry,
    scanner: Arc<BlocksScanner>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    // Set RUST_LOG environment variable to control log level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let cfg = Config::load(args.config.as_deref())?;
    cfg.validate()?;

    tracing::info!(
        bucket = %cfg.s3.base_url(),
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        tenants_concurrency = cfg.scanner.tenants_concurrency,
        metas_concurrency = cfg.scanner.metas_concurrency,
        cache_dir = %cfg.scanner.cache_dir,
        "Configuration loaded"
    );

    let store = create_object_store(&cfg.s3).context("Failed to create object store")?;
    let bucket: Arc<dyn Bucket> = Arc::new(ObjectStoreBucket::new(store, &cfg.s3.prefix));

    let registry = Registry::new();
    let scanner = Arc::new(
        BlocksScanner::new(cfg.scanner.clone(), bucket, &registry)
            .context("Failed to register scanner metrics")?,
    );

    // HTTP server for metrics and readiness
    let http_addr: std::net::SocketAddr = std::env::var("HTTP_LISTEN_ADDRESS")
        .unwrap_or_else(|_| "0.0.0.0:3100".to_string())
        .parse()
        .context("Invalid HTTP_LISTEN_ADDRESS")?;
    tracing::info!(address = %http_addr, "Starting HTTP server");

    let router = create_router(AppState {
        registry,
        scanner: Arc::clone(&scanner),
    });
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .context("Failed to bind HTTP listener")?;
    let http_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router.into_make_service()).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Run the initial scan; a failure here is fatal
    scanner.start().await.context("Blocks scanner failed to start")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for ctrl-c")?;
    tracing::info!("Shutdown signal received, stopping blocks scanner");

    scanner.stop().await;
    http_server.abort();

    tracing::info!("Blocks scanner shut down");
    Ok(())
}

/// Create the HTTP router with the metrics and readiness endpoints
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", routing::get(metrics_handler))
        .route("/ready", routing::get(ready_handler))
        .with_state(state)
}

/// Handler for GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    (StatusCode::OK, buffer)
}

/// Handler for GET /ready
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.scanner.state() {
        ScannerState::Running => (StatusCode::OK, "ready"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}
