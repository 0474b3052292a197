//! hlstatsd - UDP telemetry collector for multiplayer game server logs
//!
//! This is the entry point for the collector daemon. It handles:
//! - a UDP ingress for Source-engine-style remote log lines
//! - per-source authentication and backpressure
//! - line parsing, identity resolution, and persistence
//! - player, weapon, match, and ranking handlers

mod app;
mod catalog;
mod config;
mod error;
mod handlers;
mod ingress;
mod parser;
mod processor;
mod store;
mod util;

use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Settings;
use crate::ingress::Ingress;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            // Tracing isn't initialized yet; a config failure at startup is fatal (§7 ConfigError).
            eprintln!("fatal: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&settings.log_level);

    info!("starting hlstatsd");
    info!(port = settings.ingress_port, skip_auth = settings.skip_auth, "ingress configuration");

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    // The production Store adapter lives outside this crate's scope (§1);
    // wiring it in here is the only place that boundary is crossed.
    let state = AppState::in_memory(settings);

    let worker_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);

    let (ingress, workers) = Ingress::bind(
        state.settings.ingress_port,
        state.store.clone(),
        state.processor.clone(),
        state.settings.skip_auth,
        Duration::from_secs(state.settings.grace_period_secs),
        worker_count,
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let ingress_task = tokio::spawn(async move {
        ingress.run(shutdown_rx).await;
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if tokio::time::timeout(Duration::from_secs(state.settings.grace_period_secs), ingress_task)
        .await
        .is_err()
    {
        info!("grace period elapsed; forcing shutdown");
    }

    for worker in workers {
        worker.abort();
    }

    info!("hlstatsd shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for SIGINT/SIGTERM to trigger graceful shutdown (§6 CLI surface).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("received terminate signal, starting graceful shutdown");
        }
    }
}
