//! SSH connections to cluster nodes.
//!
//! Two strategies share one lifecycle:
//! - [`DirectConnector`]: a single `ssh` invocation against the node address
//! - [`PodConnector`]: a relay pod inside the cluster, a `kubectl port-forward`
//!   to it, and `ssh` against the local end of the tunnel
//!
//! Callers construct a connector, start [`spawn_signal_watcher`] for it, call
//! [`SshConnector::connect`] and then always [`SshConnector::cleanup`].

pub mod direct;
pub mod errors;
pub mod pod;
pub mod process;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use crate::domain::ConnectionTarget;

// Re-export commonly used types
pub use direct::DirectConnector;
pub use errors::{ConnectorError, Result};
pub use pod::{PodConnector, PodConnectorOptions};
pub use process::{CommandRunner, CommandSpec, StdioMode, SystemRunner};
pub use signal::spawn_signal_watcher;

/// `ConnectTimeout` passed to every ssh invocation, in seconds.
pub const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Program used for SSH sessions.
pub const SSH_COMMAND: &str = "ssh";

/// Program used for cluster operations.
pub const KUBECTL_COMMAND: &str = "kubectl";

/// Lifecycle shared by all connection strategies.
pub trait SshConnector: Send + Sync {
    /// Opens the session and resolves when it ends or fails.
    fn connect(&self, target: &ConnectionTarget) -> impl Future<Output = Result<()>> + Send;

    /// Releases whatever `connect` created. Idempotent and best effort: errors
    /// are logged, never returned.
    fn cleanup(&self) -> impl Future<Output = ()> + Send;

    /// Asks the connector to stop retrying. Safe to call at any time, from any
    /// thread, any number of times.
    fn shutdown(&self);
}

/// The `-o` options that disable host key verification.
///
/// Node host keys are never provisioned to clients, so there is nothing to
/// verify against.
pub(crate) fn insecure_host_key_args() -> [String; 4] {
    [
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
    ]
}

pub(crate) fn connect_timeout_arg() -> String {
    format!("ConnectTimeout={}", CONNECTION_TIMEOUT_SECS)
}
