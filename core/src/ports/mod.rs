//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `adapters`.
//! The process runner port lives with the connectors in
//! [`crate::sshconnector::process`].

mod cluster;

pub use cluster::ClusterApi;
