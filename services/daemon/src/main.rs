// fetchd: daemon entry point.

use fetchd::config::{self, DaemonConfig};
use fetchd::engine_http::HttpEngine;
use fetchd::runner::Daemon;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let default_filter = if config::env_flag(config::ENV_DEBUG) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    info!(version = fetchd::version::VERSION, "fetchd starting");

    let cfg = DaemonConfig::from_env();
    if cfg.rpc_secret.is_empty() {
        warn!("no {} set; the rpc bridge will reject all requests", config::ENV_RPC_SECRET);
    }

    let engine = Arc::new(HttpEngine::new());
    let (daemon, _state) = match Daemon::start(cfg, engine).await {
        Ok(started) => started,
        Err(e) => {
            eprintln!("FATAL: failed to start daemon: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "signal listener failed; shutting down");
    }
    info!("shutdown requested");
    if let Err(e) = daemon.shutdown(Some(Duration::from_secs(5))).await {
        warn!(error = %e, "shutdown incomplete");
    }
}
