//! Direct SSH connection to a node address.

use std::sync::Arc;

use tracing::{field, info, info_span, Instrument, Span};

use super::errors::{ConnectorError, Result};
use super::process::{CommandRunner, CommandSpec, StdioMode, SystemRunner};
use super::{connect_timeout_arg, insecure_host_key_args, SshConnector, SSH_COMMAND};
use crate::domain::ConnectionTarget;

/// Connects with a single `ssh` invocation. Creates no resources.
pub struct DirectConnector<R: CommandRunner = SystemRunner> {
    runner: Arc<R>,
    span: Span,
}

impl DirectConnector<SystemRunner> {
    /// Creates a connector that runs the system `ssh`.
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner::new()))
    }
}

impl Default for DirectConnector<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> DirectConnector<R> {
    /// Creates a connector with a custom command runner.
    pub fn with_runner(runner: Arc<R>) -> Self {
        Self {
            runner,
            span: info_span!(
                "ssh_connector",
                connection_type = "direct",
                ip_address = field::Empty,
                username = field::Empty,
            ),
        }
    }

    fn ssh_command(target: &ConnectionTarget) -> CommandSpec {
        let mut args = vec!["-o".to_string(), connect_timeout_arg()];
        args.extend(insecure_host_key_args());
        args.extend([
            "-i".to_string(),
            target.private_key_path.display().to_string(),
            "-l".to_string(),
            target.username.clone(),
            "-p".to_string(),
            target.port.to_string(),
            target.ip_address.clone(),
        ]);

        CommandSpec::new(SSH_COMMAND, args, StdioMode::Interactive)
    }
}

impl<R: CommandRunner> SshConnector for DirectConnector<R> {
    async fn connect(&self, target: &ConnectionTarget) -> Result<()> {
        self.span.record("ip_address", target.ip_address.as_str());
        self.span.record("username", target.username.as_str());

        async {
            info!("connecting to node");
            self.runner
                .run(&Self::ssh_command(target))
                .await
                .map_err(ConnectorError::ssh)
        }
        .instrument(self.span.clone())
        .await
    }

    async fn cleanup(&self) {}

    fn shutdown(&self) {}
}
