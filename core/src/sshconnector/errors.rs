//! Error types for the SSH connector subsystem.

use thiserror::Error;

/// Result type alias for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Errors raised while opening a node SSH session.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// An external program could not be started.
    #[error("failed to execute {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An external program ran but exited unsuccessfully.
    #[error("{program} exited with {}", describe_exit(.code))]
    CommandFailed { program: String, code: Option<i32> },

    /// The relay pod could not be created.
    #[error("failed to create pod")]
    CreatePod(#[source] Box<ConnectorError>),

    /// The relay pod never reached the Ready condition.
    #[error("pod did not become ready")]
    PodNotReady(#[source] Box<ConnectorError>),

    /// kubectl port-forward could not be started.
    #[error("failed to start port forward")]
    PortForward(#[source] Box<ConnectorError>),

    /// The direct SSH session failed.
    #[error("ssh connection failed")]
    Ssh(#[source] Box<ConnectorError>),

    /// A signal could not be delivered to a process.
    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    /// The operation is not available on this platform.
    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),
}

impl ConnectorError {
    /// Wraps a failure of the pod creation step.
    pub fn create_pod(err: ConnectorError) -> Self {
        Self::CreatePod(Box::new(err))
    }

    /// Wraps a failure of the readiness wait step.
    pub fn pod_not_ready(err: ConnectorError) -> Self {
        Self::PodNotReady(Box::new(err))
    }

    /// Wraps a failure of the port-forward step.
    pub fn port_forward(err: ConnectorError) -> Self {
        Self::PortForward(Box::new(err))
    }

    /// Wraps a failure of a direct SSH session.
    pub fn ssh(err: ConnectorError) -> Self {
        Self::Ssh(Box::new(err))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}
