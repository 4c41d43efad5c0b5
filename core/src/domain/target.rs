//! SSH connection target.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and as whom an SSH session should be opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTarget {
    /// IP address of the node.
    pub ip_address: String,
    /// SSH port on the node.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Path of the private key file handed to `ssh -i`.
    pub private_key_path: PathBuf,
}

impl ConnectionTarget {
    /// Create a new connection target.
    pub fn new(
        ip_address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ip_address: ip_address.into(),
            port,
            username: username.into(),
            private_key_path: private_key_path.into(),
        }
    }

    /// Returns the `ip:port` pair of the node.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.address())
    }
}
