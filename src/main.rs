//! FilterDNS daemon binary.
//!
//! Runs the privileged background service: loopback DNS proxy, system DNS
//! mutation with crash-safe restore, and the Unix control socket the CLI
//! and tray clients drive. Those clients live outside this binary and talk
//! to it through `filterdns_daemon::DaemonClient`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use filterdns_config::{ConfigStore, KeyringSecretStore};
use filterdns_daemon::{Daemon, DaemonOptions};
use filterdns_system::DnsMutator;

#[derive(Parser, Debug)]
#[command(name = "filterdnsd", version, about = "FilterDNS filtering daemon")]
struct Args {
    /// Config file path (defaults to the per-user config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control socket path.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log level override (trace/debug/info/warn/error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!(version = filterdns_core::VERSION, "filterdnsd starting");

    let store = match &args.config {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new()?,
    };
    let mutator = DnsMutator::new()?;

    let mut options = DaemonOptions::default();
    if let Some(socket) = args.socket {
        options.socket_path = socket;
    }

    let daemon = Arc::new(Daemon::new(
        store,
        mutator,
        Arc::new(KeyringSecretStore),
        options,
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    daemon.run(shutdown).await?;
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
