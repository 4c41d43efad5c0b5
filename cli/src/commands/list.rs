//! Node list command - show the nodes of the cluster.

use anyhow::Result;
use nodessh_core::{AddressKind, ConfigOverrides, Node};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct NodeRow {
    name: String,
    pool: Option<String>,
    internal_ip: Option<String>,
    external_ip: Option<String>,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name().to_string(),
            pool: node.pool_name().map(str::to_string),
            internal_ip: node.address(AddressKind::Internal).map(str::to_string),
            external_ip: node.address(AddressKind::External).map(str::to_string),
        }
    }
}

pub async fn run(overrides: ConfigOverrides, json: bool) -> Result<()> {
    let service = super::node_service(overrides).await?;
    let nodes = service.list_nodes().await?;
    let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No nodes found.");
        return Ok(());
    }

    // Table header
    println!(
        "{:<40} {:<20} {:<16} {}",
        "NAME", "POOL", "INTERNAL-IP", "EXTERNAL-IP"
    );
    println!("{}", "-".repeat(90));

    for row in &rows {
        println!(
            "{:<40} {:<20} {:<16} {}",
            truncate(&row.name, 40),
            truncate(row.pool.as_deref().unwrap_or("-"), 20),
            row.internal_ip.as_deref().unwrap_or("-"),
            row.external_ip.as_deref().unwrap_or("-")
        );
    }

    println!("\nTotal: {} nodes", rows.len());
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
