//! api-stub-server - CLI entry point.

use anyhow::{Context, Result};
use api_stub_server::server::{router, AppState, Snapshot};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "api-stub-server",
    about = "Declarative HTTP stub server - request matching and templated responses",
    version
)]
struct Args {
    /// Path to an endpoint definition file, or a directory of .json files
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate endpoint definitions and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(path = ?args.config, "Loading endpoint definitions");
    let snapshot = Snapshot::load(&args.config)
        .with_context(|| format!("failed to load endpoints from {}", args.config.display()))?;

    if args.validate {
        println!(
            "Configuration is valid ({} endpoints defined)",
            snapshot.endpoints.len()
        );
        return Ok(());
    }

    let state = AppState::new(snapshot);
    spawn_reload_task(state.clone(), args.config.clone());

    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    info!(address = %args.addr, "Stub server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stub server stopped");
    Ok(())
}

/// Reload endpoint definitions on SIGHUP. A new snapshot is compiled off
/// to the side and swapped in atomically; a failed reload keeps the old
/// one.
#[cfg(unix)]
fn spawn_reload_task(state: AppState, config_path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(err) => {
                error!(error = %err, "Failed to install SIGHUP handler; reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match Snapshot::load(&config_path) {
                Ok(snapshot) => {
                    info!(
                        endpoints = snapshot.endpoints.len(),
                        "Reloaded endpoint definitions"
                    );
                    state.replace(snapshot);
                }
                Err(err) => {
                    error!(error = %err, "Reload failed; keeping previous endpoints");
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_task(_state: AppState, _config_path: PathBuf) {}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Shutdown signal received");
}
