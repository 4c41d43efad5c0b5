//! SSH connection through an ephemeral relay pod.
//!
//! The relay pod runs `socat` inside the cluster and forwards a fixed pod port
//! to the node's SSH port. `kubectl port-forward` makes that pod port
//! reachable locally and `ssh` connects to the local end:
//!
//! ```text
//! ssh -> localhost:12389 -> kubectl port-forward -> pod:2222 -> socat -> node:22
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tracing::{error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::errors::{ConnectorError, Result};
use super::process::{CommandRunner, CommandSpec, StdioMode, SystemRunner};
use super::{connect_timeout_arg, insecure_host_key_args, SshConnector, KUBECTL_COMMAND, SSH_COMMAND};
use crate::domain::{ConnectionTarget, DEFAULT_NAMESPACE};

/// Prefix of generated relay pod names.
pub const POD_NAME_PREFIX: &str = "ssh-pod";

/// Image of the relay pod.
pub const RELAY_IMAGE: &str = "alpine";

/// Port socat listens on inside the relay pod.
pub const RELAY_PORT: u16 = 2222;

/// Local end of the port-forward.
pub const LOCAL_PORT: u16 = 12389;

/// SSH attempts through the port-forward before giving up.
pub const SSH_MAX_ATTEMPTS: u32 = 5;

/// Pause between SSH attempts.
pub const SSH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for deleting the relay pod during cleanup.
const POD_DELETE_TIMEOUT: Duration = Duration::from_secs(60);

/// Optional settings of a [`PodConnector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodConnectorOptions {
    namespace: Option<String>,
    node_name: Option<String>,
}

impl PodConnectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace of the relay pod (default `pipeline-system`).
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Schedules the relay pod onto the named node, tolerating its taints.
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }
}

/// Resources created by `connect`.
#[derive(Debug, Default)]
struct PodState {
    pod_created: bool,
    pod_running: bool,
    port_forward_pid: Option<u32>,
    cleaned_up: bool,
}

/// Connects through a relay pod and a local `kubectl port-forward`.
pub struct PodConnector<R: CommandRunner = SystemRunner> {
    runner: Arc<R>,
    kubeconfig: PathBuf,
    namespace: String,
    node_name: Option<String>,
    pod_name: String,

    state: Mutex<PodState>,
    shutdown: AtomicBool,
    shutdown_notify: Notify,

    span: Span,
}

impl PodConnector<SystemRunner> {
    /// Creates a connector that runs the system `kubectl` and `ssh`.
    pub fn new(kubeconfig: impl Into<PathBuf>, options: PodConnectorOptions) -> Self {
        Self::with_runner(Arc::new(SystemRunner::new()), kubeconfig, options)
    }
}

impl<R: CommandRunner> PodConnector<R> {
    /// Creates a connector with a custom command runner.
    pub fn with_runner(
        runner: Arc<R>,
        kubeconfig: impl Into<PathBuf>,
        options: PodConnectorOptions,
    ) -> Self {
        let namespace = options
            .namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let node_name = options.node_name.filter(|n| !n.is_empty());
        let pod_name = format!("{}-{}", POD_NAME_PREFIX, Uuid::new_v4());

        let span = info_span!(
            "ssh_connector",
            connection_type = "pod",
            pod_name = %pod_name,
            namespace = %namespace,
            use_node_affinity = node_name.is_some(),
            ip_address = field::Empty,
            username = field::Empty,
        );

        Self {
            runner,
            kubeconfig: kubeconfig.into(),
            namespace,
            node_name,
            pod_name,
            state: Mutex::new(PodState::default()),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            span,
        }
    }

    /// Name of the relay pod, fixed for the connector's lifetime.
    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    /// Returns true once the create-pod command has succeeded.
    pub fn is_pod_created(&self) -> bool {
        self.state.lock().pod_created
    }

    /// Returns true once the pod has reached the Ready condition.
    pub fn is_pod_running(&self) -> bool {
        self.state.lock().pod_running
    }

    /// Process ID of the running port-forward, if one was started.
    pub fn port_forward_pid(&self) -> Option<u32> {
        self.state.lock().port_forward_pid
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Connection Steps
    // =========================================================================

    async fn create_pod(&self, target: &ConnectionTarget) -> Result<()> {
        info!("create pod");
        self.runner
            .run(&self.create_pod_command(target))
            .await
            .map_err(ConnectorError::create_pod)?;

        self.state.lock().pod_created = true;
        Ok(())
    }

    async fn wait_for_pod_ready(&self) -> Result<()> {
        info!("wait for pod to be ready");
        self.runner
            .run(&self.wait_command())
            .await
            .map_err(ConnectorError::pod_not_ready)?;

        self.state.lock().pod_running = true;
        Ok(())
    }

    fn start_port_forward(&self) -> Result<()> {
        info!(local_port = LOCAL_PORT, "create port forward with kubectl");
        let pid = self
            .runner
            .spawn(&self.port_forward_command())
            .map_err(ConnectorError::port_forward)?;

        self.state.lock().port_forward_pid = Some(pid);
        Ok(())
    }

    /// Runs ssh through the port-forward until it succeeds, the attempts are
    /// used up, or shutdown is requested.
    async fn ssh_with_retries(&self, target: &ConnectionTarget) -> Result<()> {
        let command = self.ssh_command(target);
        let mut attempt = 1;

        loop {
            if self.is_shutdown_requested() {
                info!("shutdown requested, giving up on connecting");
                return Ok(());
            }

            info!(attempt = attempt, "try connecting to node through port forward");
            match self.runner.run(&command).await {
                Ok(()) => return Ok(()),
                Err(_) if self.is_shutdown_requested() => {
                    info!(attempt = attempt, "shutdown requested during attempt, giving up on connecting");
                    return Ok(());
                }
                Err(e) if attempt >= SSH_MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "ssh through port forward failed");
                    tokio::select! {
                        _ = sleep(SSH_RETRY_DELAY) => {}
                        _ = self.shutdown_notify.notified() => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn remove_pod(&self) {
        info!("remove pod");
        match timeout(POD_DELETE_TIMEOUT, self.runner.run(&self.delete_pod_command())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "failed to remove pod"),
            Err(_) => error!(
                timeout_secs = POD_DELETE_TIMEOUT.as_secs(),
                "timed out removing pod"
            ),
        }
    }

    // =========================================================================
    // Command Lines
    // =========================================================================

    fn kubectl_args(&self) -> Vec<String> {
        vec![
            "--kubeconfig".to_string(),
            self.kubeconfig.display().to_string(),
            "-n".to_string(),
            self.namespace.clone(),
        ]
    }

    fn create_pod_command(&self, target: &ConnectionTarget) -> CommandSpec {
        let mut args = Vec::new();
        if let Some(node_name) = &self.node_name {
            args.push("--overrides".to_string());
            args.push(node_affinity_overrides(node_name));
        }
        args.extend(self.kubectl_args());
        args.extend([
            "run".to_string(),
            "--restart=Never".to_string(),
            "--grace-period=1".to_string(),
            format!("--image={}", RELAY_IMAGE),
            "--command".to_string(),
            self.pod_name.clone(),
            "--".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            relay_script(target),
        ]);

        CommandSpec::new(KUBECTL_COMMAND, args, StdioMode::ErrorsOnly)
    }

    fn wait_command(&self) -> CommandSpec {
        let mut args = self.kubectl_args();
        args.extend([
            "wait".to_string(),
            "--for=condition=Ready".to_string(),
            "pod".to_string(),
            self.pod_name.clone(),
        ]);

        CommandSpec::new(KUBECTL_COMMAND, args, StdioMode::ErrorsOnly)
    }

    fn port_forward_command(&self) -> CommandSpec {
        let mut args = self.kubectl_args();
        args.extend([
            "port-forward".to_string(),
            self.pod_name.clone(),
            format!("{}:{}", LOCAL_PORT, RELAY_PORT),
        ]);

        CommandSpec::new(KUBECTL_COMMAND, args, StdioMode::ErrorsOnly)
    }

    fn ssh_command(&self, target: &ConnectionTarget) -> CommandSpec {
        let mut args = vec![
            "-4".to_string(),
            "-o".to_string(),
            connect_timeout_arg(),
            "-i".to_string(),
            target.private_key_path.display().to_string(),
            "-l".to_string(),
            target.username.clone(),
        ];
        args.extend(insecure_host_key_args());
        args.extend([
            "-p".to_string(),
            LOCAL_PORT.to_string(),
            "localhost".to_string(),
        ]);

        CommandSpec::new(SSH_COMMAND, args, StdioMode::Interactive)
    }

    fn delete_pod_command(&self) -> CommandSpec {
        let mut args = self.kubectl_args();
        args.extend(["delete".to_string(), "po".to_string(), self.pod_name.clone()]);

        CommandSpec::new(KUBECTL_COMMAND, args, StdioMode::ErrorsOnly)
    }
}

impl<R: CommandRunner> SshConnector for PodConnector<R> {
    async fn connect(&self, target: &ConnectionTarget) -> Result<()> {
        self.span.record("ip_address", target.ip_address.as_str());
        self.span.record("username", target.username.as_str());

        async {
            self.create_pod(target).await?;
            self.wait_for_pod_ready().await?;
            self.start_port_forward()?;
            self.ssh_with_retries(target).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn cleanup(&self) {
        self.shutdown();

        let port_forward_pid = {
            let mut state = self.state.lock();
            if !state.pod_created || state.cleaned_up {
                return;
            }
            state.cleaned_up = true;
            state.port_forward_pid.take()
        };

        async {
            if let Some(pid) = port_forward_pid {
                info!(pid = pid, "stop port forwarder");
                if let Err(e) = self.runner.interrupt(pid) {
                    warn!(pid = pid, error = %e, "failed to stop port forwarder");
                }
            }

            self.remove_pod().await;
        }
        .instrument(self.span.clone())
        .await
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }
}

/// Shell command of the relay container: install socat and forward the relay
/// port to the node's SSH port.
fn relay_script(target: &ConnectionTarget) -> String {
    format!(
        "apk --no-cache add socat && socat TCP-LISTEN:{},reuseaddr,fork TCP:{}:{}",
        RELAY_PORT, target.ip_address, target.port
    )
}

/// Pod spec override pinning the pod to `node_name` and tolerating every
/// taint, so cordoned and tainted nodes are reachable too.
fn node_affinity_overrides(node_name: &str) -> String {
    json!({
        "apiVersion": "v1",
        "spec": {
            "tolerations": [
                {"effect": "NoExecute", "operator": "Exists"},
                {"effect": "NoSchedule", "operator": "Exists"}
            ],
            "affinity": {
                "nodeAffinity": {
                    "requiredDuringSchedulingIgnoredDuringExecution": {
                        "nodeSelectorTerms": [{
                            "matchFields": [{
                                "key": "metadata.name",
                                "operator": "In",
                                "values": [node_name]
                            }]
                        }]
                    }
                }
            }
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sshconnector::testing::FakeRunner;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("10.0.0.5", 22, "ubuntu", "/tmp/key")
    }

    fn connector(runner: &Arc<FakeRunner>, options: PodConnectorOptions) -> PodConnector<FakeRunner> {
        PodConnector::with_runner(runner.clone(), "/tmp/kube", options)
    }

    fn contains_sequence(args: &[String], sequence: &[&str]) -> bool {
        args.windows(sequence.len())
            .any(|w| w.iter().zip(sequence).all(|(a, b)| a == b))
    }

    #[test]
    fn test_pod_names_are_unique_and_stable() {
        let runner = Arc::new(FakeRunner::new());
        let a = connector(&runner, PodConnectorOptions::new());
        let b = connector(&runner, PodConnectorOptions::new());

        assert_ne!(a.pod_name(), b.pod_name());
        assert!(a.pod_name().starts_with("ssh-pod-"));
        assert_eq!(a.pod_name().len(), "ssh-pod-".len() + 36);

        let name = a.pod_name().to_string();
        assert_eq!(a.pod_name(), name);
    }

    #[tokio::test]
    async fn test_create_pod_command_line() {
        let runner = Arc::new(FakeRunner::new());
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.connect(&target()).await.unwrap();

        let created = runner.invocations("run");
        assert_eq!(created.len(), 1);
        let spec = &created[0].0;

        assert_eq!(spec.program, "kubectl");
        assert_eq!(spec.arg_after("--kubeconfig"), Some("/tmp/kube"));
        assert!(contains_sequence(&spec.args, &["-n", "pipeline-system", "run"]));
        assert!(spec.has_arg("--image=alpine"));
        assert!(spec.has_arg("--restart=Never"));
        assert!(!spec.has_arg("--overrides"));
        assert!(contains_sequence(&spec.args, &[conn.pod_name(), "--", "sh", "-c"]));
        assert_eq!(
            spec.args.last().map(String::as_str),
            Some("apk --no-cache add socat && socat TCP-LISTEN:2222,reuseaddr,fork TCP:10.0.0.5:22")
        );
    }

    #[tokio::test]
    async fn test_node_affinity_override() {
        let runner = Arc::new(FakeRunner::new());
        let conn = connector(&runner, PodConnectorOptions::new().node_name("node-1"));

        conn.connect(&target()).await.unwrap();

        let created = runner.invocations("run");
        let overrides = created[0].0.arg_after("--overrides").unwrap().to_string();
        assert!(overrides.contains(r#""values":["node-1"]"#));
        assert!(overrides.contains(r#""key":"metadata.name""#));
        assert!(overrides.contains("NoExecute"));
        assert!(overrides.contains("NoSchedule"));

        let parsed: serde_json::Value = serde_json::from_str(&overrides).unwrap();
        assert_eq!(parsed["apiVersion"], "v1");
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_default_namespace() {
        let runner = Arc::new(FakeRunner::new());
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.connect(&target()).await.unwrap();
        assert!(conn.is_pod_created());
        assert!(conn.is_pod_running());
        let pid = conn.port_forward_pid().unwrap();

        conn.cleanup().await;

        assert_eq!(
            runner.verbs(),
            ["run", "wait", "port-forward", "ssh", "interrupt", "delete"]
        );

        for verb in ["run", "wait", "port-forward", "delete"] {
            let spec = &runner.invocations(verb)[0].0;
            assert_eq!(spec.arg_after("-n"), Some("pipeline-system"), "{}", verb);
            assert!(spec.has_arg(conn.pod_name()), "{}", verb);
        }

        let forward = &runner.invocations("port-forward")[0].0;
        assert!(forward.has_arg("12389:2222"));

        let ssh = &runner.invocations("ssh")[0].0;
        assert_eq!(ssh.arg_after("-p"), Some("12389"));
        assert_eq!(ssh.args.last().map(String::as_str), Some("localhost"));
        assert!(ssh.has_arg("-4"));

        assert_eq!(runner.interrupts(), vec![pid]);
    }

    #[tokio::test]
    async fn test_custom_namespace() {
        let runner = Arc::new(FakeRunner::new());
        let conn = connector(&runner, PodConnectorOptions::new().namespace("debug"));

        conn.connect(&target()).await.unwrap();
        conn.cleanup().await;

        for verb in ["run", "wait", "port-forward", "delete"] {
            let spec = &runner.invocations(verb)[0].0;
            assert_eq!(spec.arg_after("-n"), Some("debug"));
        }
    }

    #[tokio::test]
    async fn test_create_failure_skips_cleanup() {
        let runner = Arc::new(FakeRunner::new());
        runner.script("run", &[true]);
        let conn = connector(&runner, PodConnectorOptions::new());

        let err = conn.connect(&target()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::CreatePod(_)));
        assert!(err.to_string().contains("failed to create pod"));
        assert!(!conn.is_pod_created());
        assert!(runner.invocations("wait").is_empty());

        conn.cleanup().await;
        assert!(runner.invocations("delete").is_empty());
        assert!(runner.interrupts().is_empty());
    }

    #[tokio::test]
    async fn test_readiness_failure_still_removes_pod() {
        let runner = Arc::new(FakeRunner::new());
        runner.script("wait", &[true]);
        let conn = connector(&runner, PodConnectorOptions::new());

        let err = conn.connect(&target()).await.unwrap_err();
        assert!(err.to_string().contains("pod did not become ready"));
        assert!(conn.is_pod_created());
        assert!(!conn.is_pod_running());
        assert!(runner.invocations("port-forward").is_empty());

        conn.cleanup().await;
        assert_eq!(runner.invocations("delete").len(), 1);
        assert!(runner.interrupts().is_empty());
    }

    #[tokio::test]
    async fn test_port_forward_failure_is_fatal() {
        let runner = Arc::new(FakeRunner::new());
        runner.script("port-forward", &[true]);
        let conn = connector(&runner, PodConnectorOptions::new());

        let err = conn.connect(&target()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::PortForward(_)));
        assert!(runner.invocations("ssh").is_empty());
        assert_eq!(conn.port_forward_pid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_always("ssh");
        let conn = connector(&runner, PodConnectorOptions::new());

        let err = conn.connect(&target()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::CommandFailed { .. }));

        let attempts = runner.invocations("ssh");
        assert_eq!(attempts.len(), SSH_MAX_ATTEMPTS as usize);
        for pair in attempts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= SSH_RETRY_DELAY);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failed_attempts() {
        let runner = Arc::new(FakeRunner::new());
        runner.script("ssh", &[true, true, false]);
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.connect(&target()).await.unwrap();

        assert_eq!(runner.invocations("ssh").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_retries() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_always("ssh");
        let conn = Arc::new(connector(&runner, PodConnectorOptions::new()));

        let handle = {
            let conn = conn.clone();
            tokio::spawn(async move {
                sleep(Duration::from_secs(7)).await;
                conn.shutdown();
            })
        };

        let started = tokio::time::Instant::now();
        conn.connect(&target()).await.unwrap();
        handle.await.unwrap();

        let attempts = runner.invocations("ssh").len();
        assert!(attempts < SSH_MAX_ATTEMPTS as usize);
        assert_eq!(attempts, 2);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_last_attempt_is_not_an_error() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_always("ssh");
        runner.delay("ssh", Duration::from_secs(1));
        let conn = Arc::new(connector(&runner, PodConnectorOptions::new()));

        // Attempts start at 0s, 6s, 12s, 18s and 24s and each takes 1s.
        let handle = {
            let conn = conn.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(24_500)).await;
                conn.shutdown();
            })
        };

        let result = conn.connect(&target()).await;
        handle.await.unwrap();

        assert!(conn.is_shutdown_requested());
        assert!(result.is_ok(), "unexpected error: {:?}", result);
        assert_eq!(runner.invocations("ssh").len(), SSH_MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_shutdown_before_connect() {
        let runner = Arc::new(FakeRunner::new());
        runner.fail_always("ssh");
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.shutdown();
        conn.shutdown();
        conn.connect(&target()).await.unwrap();

        assert!(runner.invocations("ssh").is_empty());
        assert!(conn.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let runner = Arc::new(FakeRunner::new());
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.cleanup().await;
        assert!(runner.calls().is_empty());

        conn.connect(&target()).await.unwrap();
        conn.cleanup().await;
        conn.cleanup().await;

        assert_eq!(runner.invocations("delete").len(), 1);
        assert_eq!(runner.interrupts().len(), 1);
        assert_eq!(conn.port_forward_pid(), None);
    }

    #[tokio::test]
    async fn test_cleanup_swallows_delete_failure() {
        let runner = Arc::new(FakeRunner::new());
        runner.script("delete", &[true]);
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.connect(&target()).await.unwrap();
        conn.cleanup().await;

        assert_eq!(runner.invocations("delete").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_gives_up_on_stuck_delete() {
        let runner = Arc::new(FakeRunner::new());
        runner.hang("delete");
        let conn = connector(&runner, PodConnectorOptions::new());

        conn.connect(&target()).await.unwrap();

        let started = tokio::time::Instant::now();
        conn.cleanup().await;

        assert!(started.elapsed() >= POD_DELETE_TIMEOUT);
        assert!(started.elapsed() < POD_DELETE_TIMEOUT + Duration::from_secs(1));
        assert_eq!(runner.invocations("delete").len(), 1);
        assert_eq!(runner.verbs().last(), Some(&"delete"));

        // A second cleanup does not wait again.
        let again = tokio::time::Instant::now();
        conn.cleanup().await;
        assert_eq!(again.elapsed(), Duration::ZERO);
        assert_eq!(runner.invocations("delete").len(), 1);
    }
}
