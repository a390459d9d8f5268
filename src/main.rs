use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use stratgate::config::{GuardConfig, LogFormat};
use stratgate::http::{self, ApiKeyGuard, AppState, HttpServer};
use stratgate::ratelimit::{now_millis, RateLimiter};

/// Rate limiting and API key guard for the strategy dashboard.
#[derive(Parser, Debug)]
#[command(name = "stratgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log output format, overriding the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GuardConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.addr {
        config.server.http_addr = addr;
    }
    if let Some(format) = cli.log_format {
        config.server.log_format = format;
    }

    init_tracing(config.server.log_format);

    info!("Starting Stratgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Preset overrides are read once, here
    let presets = config.preset_table();
    let rate_limiter = Arc::new(
        RateLimiter::with_presets(presets)
            .with_cleanup_interval(config.rate_limiting.cleanup_interval_ms),
    );
    info!(
        cleanup_interval_ms = config.rate_limiting.cleanup_interval_ms,
        "Rate limiter initialized"
    );

    if let Some(secs) = config.rate_limiting.sweep_interval_secs.filter(|s| *s > 0) {
        spawn_sweeper(Arc::clone(&rate_limiter), Duration::from_secs(secs));
    }

    let guard = ApiKeyGuard::from_config(&config.auth)?;
    if !guard.is_enabled() {
        warn!("No API key configured; /v1 routes are open");
    }

    let router = http::router(
        AppState::new(rate_limiter),
        guard,
        &config.rate_limiting.api_preset,
    );

    HttpServer::new(config.server.http_addr, router)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Stratgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Periodically drop idle entries, in addition to the lazy sweep.
fn spawn_sweeper(limiter: Arc<RateLimiter>, period: Duration) {
    info!(period_secs = period.as_secs(), "Starting background cleanup sweep");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup(now_millis());
            debug!(removed = removed, "Background sweep ran");
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
