//! Error types for the nodessh-core library.

use thiserror::Error;

use crate::sshconnector::ConnectorError;

/// Result type alias for nodessh operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving and opening a node SSH session.
#[derive(Error, Debug)]
pub enum Error {
    /// The control plane answered with a non-success status.
    #[error("API request failed ({status}): {message}")]
    Api { status: u16, message: String },

    /// The control plane could not be reached.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Conflicting or incomplete command-line options.
    #[error("{0}")]
    InvalidOptions(String),

    /// A node, address, secret or username could not be determined.
    #[error("{0}")]
    Resolution(String),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// SSH connector error.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}
