use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};

use floodgate::config::ServerConfig;
use floodgate::limiter::{Identity, Limit, RedisLimiter};
use floodgate::metrics::TracingRecorder;

/// Example HTTP server enforcing a per-IP rate limit via Redis.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Redis connection URL (overrides the configuration file).
    #[arg(long)]
    redis_url: Option<String>,

    /// HTTP listen address (overrides the configuration file).
    #[arg(long)]
    listen_addr: Option<SocketAddr>,
}

struct AppState {
    limiter: RedisLimiter,
    limit: Limit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(url) = args.redis_url {
        config.redis_url = url;
    }
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }

    info!("Starting Floodgate example server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.listen_addr,
        redis_url = %config.redis_url,
        "Configuration loaded"
    );

    let client = redis::Client::open(config.redis_url.as_str()).context("invalid redis url")?;
    let limiter = RedisLimiter::connect(client, config.limiter.clone())
        .await
        .context("failed to connect to redis")?
        .with_recorder(Arc::new(TracingRecorder));

    let limit = Limit::new(
        config.rate_per_second,
        Duration::from_secs(1),
        config.burst,
    )?;
    let state = Arc::new(AppState { limiter, limit });

    let app = Router::new().route("/ping", get(ping)).with_state(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Floodgate example server stopped");
    Ok(())
}

async fn ping(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let id = Identity::new("ip", addr.ip().to_string());

    match state.limiter.allow(&id, &state.limit).await {
        Ok(decision) if !decision.allow => {
            let retry_after = decision.retry_after.as_secs_f64().ceil().max(1.0) as u64;
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                "rate limit exceeded\n",
            )
                .into_response()
        }
        Ok(_) => (StatusCode::OK, "pong\n").into_response(),
        Err(err) => {
            // Fail open: prefer availability over protection when Redis is
            // unavailable. Swap this for a 429 to fail closed.
            warn!(error = %err, "limiter unavailable, allowing request");
            (StatusCode::OK, "pong\n").into_response()
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
