//! Node ssh command - open a session to a cluster node.

use anyhow::Result;
use nodessh_core::{ConfigOverrides, SshOptions};
use tracing::debug;

pub async fn run(options: SshOptions, overrides: ConfigOverrides) -> Result<()> {
    // Reject conflicting flags before touching the API
    let resolved = options.resolve()?;
    debug!(mode = ?resolved.mode, address = %resolved.address_kind, "resolved options");

    let service = super::node_service(overrides).await?;
    service.run(&options).await?;
    Ok(())
}
