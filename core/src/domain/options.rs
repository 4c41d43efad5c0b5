//! Node SSH options and their resolution into a connection mode.

use serde::{Deserialize, Serialize};

use super::AddressKind;
use crate::error::{Error, Result};

/// Namespace the relay pod is created in unless overridden.
pub const DEFAULT_NAMESPACE: &str = "pipeline-system";

/// SSH port of the nodes unless overridden.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How the SSH session reaches the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectMode {
    /// Connect straight to the node address.
    Direct,
    /// Connect through a relay pod and a local port-forward.
    Pod {
        namespace: String,
        use_node_affinity: bool,
    },
}

/// Raw node SSH options as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshOptions {
    pub node_name: Option<String>,
    pub username: Option<String>,
    pub direct_connect: bool,
    pub pod_connect: bool,
    pub punch_through: bool,
    pub namespace: String,
    pub use_node_affinity: bool,
    pub use_internal_ip: bool,
    pub use_external_ip: bool,
    pub ssh_port: u16,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            node_name: None,
            username: None,
            direct_connect: false,
            pod_connect: false,
            punch_through: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            use_node_affinity: false,
            use_internal_ip: false,
            use_external_ip: false,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }
}

/// Options after defaults and shorthands have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSshOptions {
    pub node_name: Option<String>,
    pub username: Option<String>,
    pub mode: ConnectMode,
    pub address_kind: AddressKind,
    pub ssh_port: u16,
}

impl SshOptions {
    /// Applies `--punch-through`, fills in defaults and rejects conflicting flags.
    pub fn resolve(&self) -> Result<ResolvedSshOptions> {
        let mut direct_connect = self.direct_connect;
        let mut pod_connect = self.pod_connect;
        let mut use_internal_ip = self.use_internal_ip;
        let mut use_external_ip = self.use_external_ip;

        if self.punch_through {
            pod_connect = true;
            use_internal_ip = true;
        }

        if !direct_connect && !pod_connect {
            direct_connect = true;
        }
        if direct_connect && pod_connect {
            return Err(Error::InvalidOptions(
                "--direct-connect and --pod-connect are mutually exclusive".to_string(),
            ));
        }

        if !use_internal_ip && !use_external_ip {
            use_external_ip = true;
        }
        if use_internal_ip && use_external_ip {
            return Err(Error::InvalidOptions(
                "--use-internal-ip and --use-external-ip are mutually exclusive".to_string(),
            ));
        }

        let mode = if direct_connect {
            ConnectMode::Direct
        } else {
            ConnectMode::Pod {
                namespace: self.namespace.clone(),
                use_node_affinity: self.use_node_affinity,
            }
        };

        let address_kind = if use_internal_ip {
            AddressKind::Internal
        } else {
            AddressKind::External
        };

        Ok(ResolvedSshOptions {
            node_name: self.node_name.clone().filter(|n| !n.is_empty()),
            username: self.username.clone().filter(|u| !u.is_empty()),
            mode,
            address_kind,
            ssh_port: self.ssh_port,
        })
    }
}
