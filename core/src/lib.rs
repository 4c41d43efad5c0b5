//! nodessh Core Library
//!
//! Opens SSH sessions to the nodes of Kubernetes clusters managed by a
//! Pipeline control plane. Provides functionality to:
//! - Resolve a node, its address, login user and private key from the API
//! - Connect directly to a node address
//! - Connect through an in-cluster relay pod and a `kubectl port-forward`
//! - Clean up relay resources on exit and on SIGINT/SIGTERM
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models and option resolution
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations
//! - `application`: Use case services
//! - `sshconnector`: Connection strategies and the process runner they share
//!
//! # Platform Support
//! - Linux and macOS: `ssh` and `kubectl` must be on `PATH`
//! - Windows: direct connections only; interrupting the port-forward is unsupported

// Hexagonal architecture layers
pub mod domain;
pub mod ports;
pub mod adapters;
pub mod application;

pub mod config;
pub mod error;
pub mod sshconnector;

// Re-export domain types (primary API)
pub use domain::{AddressKind, Cluster, ConnectMode, ConnectionTarget, Node, SshOptions};

// Re-export other commonly used types
pub use adapters::PipelineClient;
pub use application::{run_session, NodeSshService};
pub use config::{Config, ConfigOverrides, ConfigStore};
pub use error::{Error, Result};
pub use ports::ClusterApi;
pub use sshconnector::{
    spawn_signal_watcher, ConnectorError, DirectConnector, PodConnector, PodConnectorOptions,
    SshConnector,
};
