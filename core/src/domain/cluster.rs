//! Control plane data models for clusters, nodes and secrets.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label carrying the node pool a node belongs to.
pub const NODEPOOL_LABEL: &str = "nodepool.banzaicloud.io/name";

/// Secret type holding the cluster's SSH key pair.
pub const SSH_SECRET_TYPE: &str = "ssh";

// ============================================================================
// Cluster
// ============================================================================

/// A cluster managed by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub distribution: String,
}

impl Cluster {
    /// Returns the login user the distribution's node images ship with.
    pub fn default_username(&self) -> Option<&'static str> {
        match self.distribution.as_str() {
            "oke" => Some("opc"),
            "aks" => Some("aks-user"),
            "eks" => Some("ec2-user"),
            _ => None,
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Kind of node address to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressKind {
    #[serde(rename = "InternalIP")]
    Internal,
    #[default]
    #[serde(rename = "ExternalIP")]
    External,
}

impl AddressKind {
    /// The address type string used in node status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Internal => "InternalIP",
            AddressKind::External => "ExternalIP",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of the node list endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

/// A Kubernetes node of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

/// One address of a node, e.g. `{"type": "InternalIP", "address": "10.0.0.5"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
}

impl Node {
    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the node pool the node belongs to, if labelled.
    pub fn pool_name(&self) -> Option<&str> {
        self.metadata.labels.get(NODEPOOL_LABEL).map(String::as_str)
    }

    /// Returns the last address of the given kind.
    pub fn address(&self, kind: AddressKind) -> Option<&str> {
        self.status
            .addresses
            .iter()
            .rev()
            .find(|a| a.address_type == kind.as_str())
            .map(|a| a.address.as_str())
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// A secret stored by the control plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub secret_type: String,
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
}

impl SecretItem {
    /// Returns a string value of the secret.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(serde_json::Value::as_str)
    }
}
