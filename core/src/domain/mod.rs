//! Domain layer - Pure data models and option resolution.
//!
//! These types have no I/O dependencies and can be tested in isolation.

mod cluster;
mod options;
mod target;

// Re-export all domain types
pub use cluster::{
    AddressKind, Cluster, Node, NodeAddress, NodeList, NodeMetadata, NodeStatus, SecretItem,
    NODEPOOL_LABEL, SSH_SECRET_TYPE,
};
pub use options::{ConnectMode, ResolvedSshOptions, SshOptions, DEFAULT_NAMESPACE, DEFAULT_SSH_PORT};
pub use target::ConnectionTarget;
