//! nodessh CLI - SSH into Kubernetes cluster nodes
//!
//! A command-line tool for listing the nodes of a Pipeline-managed cluster
//! and opening SSH sessions to them, directly or through a relay pod.

mod commands;

use std::io;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nodessh_core::domain::{DEFAULT_NAMESPACE, DEFAULT_SSH_PORT};
use nodessh_core::{ConfigOverrides, SshOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodessh")]
#[command(author, version, about = "SSH into Kubernetes cluster nodes")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline API endpoint
    #[arg(long, global = true, env = "NODESSH_ENDPOINT")]
    endpoint: Option<String>,

    /// API token
    #[arg(long, global = true, env = "NODESSH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Organization ID
    #[arg(long, global = true, env = "NODESSH_ORGANIZATION")]
    organization: Option<i32>,

    /// Cluster ID
    #[arg(long, global = true, env = "NODESSH_CLUSTER")]
    cluster: Option<i32>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            organization: self.organization,
            cluster: self.cluster,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Work with cluster nodes
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Manage the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Connect to a node over SSH
    #[command(visible_aliases = ["c", "connect"])]
    Ssh(SshArgs),

    /// List the nodes of the cluster
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Store a configuration value
    Set { key: ConfigKey, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ConfigKey {
    Endpoint,
    Token,
    Organization,
    Cluster,
}

#[derive(Args, Debug)]
struct SshArgs {
    /// Name of the node to connect to
    node: Option<String>,

    /// Name of the node to connect to (when not given as an argument)
    #[arg(long)]
    node_name: Option<String>,

    /// User to log in as (defaults to the distribution's login user)
    #[arg(long)]
    username: Option<String>,

    /// Shorthand for --pod-connect --use-internal-ip
    #[arg(short = 'p', long)]
    punch_through: bool,

    /// Connect straight to the node address
    #[arg(long)]
    direct_connect: bool,

    /// Connect through a relay pod running in the cluster
    #[arg(long)]
    pod_connect: bool,

    /// Namespace of the relay pod
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Schedule the relay pod onto the target node
    #[arg(long)]
    use_node_affinity: bool,

    /// Use the node's internal IP address
    #[arg(long)]
    use_internal_ip: bool,

    /// Use the node's external IP address
    #[arg(long)]
    use_external_ip: bool,

    /// SSH port of the node
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    ssh_port: u16,
}

impl SshArgs {
    fn into_options(self) -> SshOptions {
        let node_name = self
            .node
            .filter(|n| !n.is_empty())
            .or(self.node_name.filter(|n| !n.is_empty()));

        SshOptions {
            node_name,
            username: self.username.filter(|u| !u.is_empty()),
            direct_connect: self.direct_connect,
            pod_connect: self.pod_connect,
            punch_through: self.punch_through,
            namespace: self.namespace,
            use_node_affinity: self.use_node_affinity,
            use_internal_ip: self.use_internal_ip,
            use_external_ip: self.use_external_ip,
            ssh_port: self.ssh_port,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("nodessh=debug,nodessh_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = cli.overrides();

    match cli.command {
        Commands::Node { action } => match action {
            NodeAction::Ssh(args) => commands::ssh::run(args.into_options(), overrides).await?,
            NodeAction::List => commands::list::run(overrides, cli.json).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(overrides, cli.json).await?,
            ConfigAction::Set { key, value } => commands::config::set(key, &value).await?,
        },
    }

    Ok(())
}
