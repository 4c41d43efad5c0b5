//! CLI command implementations.

pub mod config;
pub mod list;
pub mod ssh;

use anyhow::Result;
use nodessh_core::{Config, ConfigOverrides, ConfigStore, NodeSshService, PipelineClient};

/// Loads the stored configuration with command-line overrides applied.
async fn load_config(overrides: ConfigOverrides) -> Result<Config> {
    let store = ConfigStore::new()?;
    Ok(store.load().await?.with_overrides(overrides))
}

/// Builds the node service for the configured organization and cluster.
async fn node_service(overrides: ConfigOverrides) -> Result<NodeSshService<PipelineClient>> {
    let config = load_config(overrides).await?;
    let org_id = config.require_organization()?;
    let cluster_id = config.require_cluster()?;
    let client = PipelineClient::from_config(&config)?;

    Ok(NodeSshService::new(client, org_id, cluster_id))
}
