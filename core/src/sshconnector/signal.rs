//! Cooperative cancellation of a connector on SIGINT/SIGTERM.
//!
//! The watcher only flips the connector's shutdown flag. Commands already
//! running (pod creation, readiness wait) finish on their own; the SSH retry
//! loop notices the flag before its next attempt.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SshConnector;

/// Starts a background task that calls `shutdown` on the connector once the
/// process receives SIGINT or SIGTERM.
///
/// The task ends after the first signal. Abort the returned handle once the
/// connector is no longer in use.
pub fn spawn_signal_watcher<C>(connector: Arc<C>) -> JoinHandle<()>
where
    C: SshConnector + 'static,
{
    spawn_shutdown_on(connector, wait_for_signal())
}

/// Calls `shutdown` on the connector when `trigger` resolves.
pub(crate) fn spawn_shutdown_on<C, F>(connector: Arc<C>, trigger: F) -> JoinHandle<()>
where
    C: SshConnector + 'static,
    F: Future<Output = io::Result<&'static str>> + Send + 'static,
{
    tokio::spawn(async move {
        match trigger.await {
            Ok(signal) => {
                debug!(signal = signal, "initiating shutdown");
                connector.shutdown();
            }
            Err(e) => warn!(error = %e, "could not listen for termination signals"),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
