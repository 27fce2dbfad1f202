// src/signals.rs

//! OS signals that ask the host to stop.
//!
//! On Unix: SIGINT, SIGTERM and SIGQUIT, plus [`tokio::signal::ctrl_c`] as a
//! fallback. Elsewhere only `ctrl_c` is awaited.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token` on the first shutdown signal. A failure to install the
/// handlers cancels it too.
pub fn spawn_signal_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_shutdown_signal() => {
                match res {
                    Ok(()) => info!("shutdown signal received"),
                    Err(err) => error!(error = %err, "failed to install signal handlers; shutting down"),
                }
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}
