//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM and SIGINT (Ctrl+C)
//! - Drive the shutdown coordinator from the runtime, never from signal context
//!
//! # Design Decisions
//! - Uses Tokio's signal streams (async-safe)
//! - A second signal while shutdown is running forces exit

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::ShutdownCoordinator;

/// Exit code for a forced exit on a repeated signal.
pub const FORCED_EXIT_CODE: i32 = 130;

#[cfg(unix)]
async fn next_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not install SIGTERM handler, only Ctrl+C is handled");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn next_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}

/// Spawn the signal listener. It exits on its own once shutdown completes.
pub fn spawn_signal_handler(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = next_signal() => {
                tracing::info!(signal, "Received signal, shutting down");
            }
            _ = coordinator.stopped() => return,
        }

        let running = coordinator.clone();
        let shutdown = tokio::spawn(async move {
            running.shutdown().await;
        });

        tokio::select! {
            _ = shutdown => {}
            signal = next_signal() => {
                tracing::warn!(signal, "Received second signal during shutdown, forcing exit");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    })
}
