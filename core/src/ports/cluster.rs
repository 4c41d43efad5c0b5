//! Cluster API port (interface).

use std::future::Future;

use crate::domain::{Cluster, Node, SecretItem};
use crate::error::Result;

/// Port for the control plane's cluster API.
///
/// Organization and cluster IDs are the control plane's numeric identifiers.
pub trait ClusterApi: Send + Sync {
    /// Get a cluster's details.
    fn get_cluster(
        &self,
        org_id: i32,
        cluster_id: i32,
    ) -> impl Future<Output = Result<Cluster>> + Send;

    /// List the nodes of a cluster.
    fn list_nodes(
        &self,
        org_id: i32,
        cluster_id: i32,
    ) -> impl Future<Output = Result<Vec<Node>>> + Send;

    /// Fetch the cluster's kubeconfig file contents.
    fn get_kubeconfig(
        &self,
        org_id: i32,
        cluster_id: i32,
    ) -> impl Future<Output = Result<String>> + Send;

    /// List the secrets attached to a cluster (without values).
    fn list_cluster_secrets(
        &self,
        org_id: i32,
        cluster_id: i32,
    ) -> impl Future<Output = Result<Vec<SecretItem>>> + Send;

    /// Get a secret including its values.
    fn get_secret(
        &self,
        org_id: i32,
        secret_id: &str,
    ) -> impl Future<Output = Result<SecretItem>> + Send;
}
