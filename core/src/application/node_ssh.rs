//! Node SSH application service.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::{ConnectMode, ConnectionTarget, Node, SshOptions, SSH_SECRET_TYPE};
use crate::error::{Error, Result};
use crate::ports::ClusterApi;
use crate::sshconnector::{
    spawn_signal_watcher, CommandRunner, DirectConnector, PodConnector, PodConnectorOptions,
    SshConnector, SystemRunner,
};

/// Secret value holding the private key.
const PRIVATE_KEY_FIELD: &str = "private_key_data";

/// Everything needed to open a session, resolved from the control plane.
///
/// The key and kubeconfig files are removed when this value is dropped.
pub struct PreparedSession {
    pub node: Node,
    pub target: ConnectionTarget,
    pub mode: ConnectMode,
    key_file: NamedTempFile,
    kubeconfig_file: Option<NamedTempFile>,
}

impl PreparedSession {
    /// Path of the temporary kubeconfig, present in pod mode only.
    pub fn kubeconfig_path(&self) -> Option<&std::path::Path> {
        self.kubeconfig_file.as_ref().map(NamedTempFile::path)
    }

    /// Path of the temporary private key file.
    pub fn key_path(&self) -> &std::path::Path {
        self.key_file.path()
    }
}

/// Opens SSH sessions to the nodes of one cluster.
pub struct NodeSshService<A: ClusterApi, R: CommandRunner = SystemRunner> {
    api: A,
    runner: Arc<R>,
    org_id: i32,
    cluster_id: i32,
}

impl<A: ClusterApi> NodeSshService<A, SystemRunner> {
    /// Creates a service that runs the system `ssh` and `kubectl`.
    pub fn new(api: A, org_id: i32, cluster_id: i32) -> Self {
        Self::with_runner(api, Arc::new(SystemRunner::new()), org_id, cluster_id)
    }
}

impl<A: ClusterApi, R: CommandRunner + 'static> NodeSshService<A, R> {
    /// Creates a service with a custom command runner.
    pub fn with_runner(api: A, runner: Arc<R>, org_id: i32, cluster_id: i32) -> Self {
        Self {
            api,
            runner,
            org_id,
            cluster_id,
        }
    }

    /// Lists the nodes of the cluster, sorted by name.
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let mut nodes = self.api.list_nodes(self.org_id, self.cluster_id).await?;
        nodes.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(nodes)
    }

    /// Resolves the node, its address, the login user and the key, and writes
    /// the key (and, in pod mode, the kubeconfig) to temporary files.
    pub async fn prepare(&self, options: &SshOptions) -> Result<PreparedSession> {
        let resolved = options.resolve()?;

        let node_name = resolved.node_name.ok_or_else(|| {
            Error::Resolution(
                "no node is selected; use the --node-name option or add node name as an argument"
                    .to_string(),
            )
        })?;

        let node = self.find_node(&node_name).await?;
        let private_key = self.ssh_private_key().await?;
        let key_file = write_temp_file("sshkey", &private_key)?;

        let ip_address = node
            .address(resolved.address_kind)
            .ok_or_else(|| {
                Error::Resolution(format!(
                    "node {} has no {} address",
                    node_name, resolved.address_kind
                ))
            })?
            .to_string();

        let username = match resolved.username {
            Some(username) => username,
            None => {
                let cluster = self.api.get_cluster(self.org_id, self.cluster_id).await?;
                cluster.default_username().map(str::to_string).ok_or_else(|| {
                    Error::Resolution(
                        "can't determine username to use for the connection (you can specify it with an option like --username=ubuntu)"
                            .to_string(),
                    )
                })?
            }
        };

        let kubeconfig_file = match resolved.mode {
            ConnectMode::Direct => None,
            ConnectMode::Pod { .. } => {
                let kubeconfig = self
                    .api
                    .get_kubeconfig(self.org_id, self.cluster_id)
                    .await?;
                Some(write_temp_file("kubeconfig", &kubeconfig)?)
            }
        };

        let target = ConnectionTarget::new(
            ip_address,
            resolved.ssh_port,
            username,
            key_file.path(),
        );
        debug!(node = node.name(), target = %target, "resolved connection target");

        Ok(PreparedSession {
            node,
            target,
            mode: resolved.mode,
            key_file,
            kubeconfig_file,
        })
    }

    /// Opens an SSH session to the node selected by `options` and waits for it
    /// to end.
    pub async fn run(&self, options: &SshOptions) -> Result<()> {
        let session = self.prepare(options).await?;
        info!(node = session.node.name(), "connecting");

        match &session.mode {
            ConnectMode::Direct => {
                let connector = DirectConnector::with_runner(self.runner.clone());
                run_session(Arc::new(connector), &session.target).await
            }
            ConnectMode::Pod {
                namespace,
                use_node_affinity,
            } => {
                let mut connector_options = PodConnectorOptions::new().namespace(namespace.clone());
                if *use_node_affinity {
                    connector_options = connector_options.node_name(session.node.name());
                }

                let kubeconfig = session.kubeconfig_path().ok_or_else(|| {
                    Error::Resolution("kubeconfig is missing for pod connection".to_string())
                })?;

                let connector =
                    PodConnector::with_runner(self.runner.clone(), kubeconfig, connector_options);
                run_session(Arc::new(connector), &session.target).await
            }
        }
    }

    async fn find_node(&self, node_name: &str) -> Result<Node> {
        let nodes = self
            .api
            .list_nodes(self.org_id, self.cluster_id)
            .await
            .map_err(|e| Error::Resolution(format!("could not list nodes: {}", e)))?;

        nodes
            .into_iter()
            .find(|n| n.name() == node_name)
            .ok_or_else(|| Error::Resolution(format!("could not find node: {}", node_name)))
    }

    async fn ssh_private_key(&self) -> Result<String> {
        let secrets = self
            .api
            .list_cluster_secrets(self.org_id, self.cluster_id)
            .await?;

        let Some(item) = secrets.iter().find(|s| s.secret_type == SSH_SECRET_TYPE) else {
            return Err(Error::Resolution(
                "could not find secret for cluster".to_string(),
            ));
        };

        let secret = self.api.get_secret(self.org_id, &item.id).await?;
        secret
            .value(PRIVATE_KEY_FIELD)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Resolution(format!(
                    "secret {} has no {} value",
                    item.name, PRIVATE_KEY_FIELD
                ))
            })
    }
}

/// Runs one connector lifecycle: watch for signals, connect, always clean up.
pub async fn run_session<C>(connector: Arc<C>, target: &ConnectionTarget) -> Result<()>
where
    C: SshConnector + 'static,
{
    let watcher = spawn_signal_watcher(connector.clone());

    let result = connector.connect(target).await;
    connector.cleanup().await;
    watcher.abort();

    result.map_err(Error::from)
}

/// Writes `content` to a new temporary file readable only by the owner.
fn write_temp_file(prefix: &str, content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix(prefix).tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}
