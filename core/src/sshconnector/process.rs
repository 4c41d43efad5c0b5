//! Process runner for the ssh and kubectl invocations of the connectors.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::process::Stdio;

use parking_lot::Mutex;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::errors::{ConnectorError, Result};

/// How the standard streams of an external program are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdioMode {
    /// Stdin, stdout and stderr are inherited from the caller.
    Interactive,
    /// Only stderr is inherited; stdin and stdout are discarded.
    ErrorsOnly,
}

/// An external program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdio: StdioMode,
}

impl CommandSpec {
    /// Creates a new invocation of `program` with the given arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I, stdio: StdioMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdio,
        }
    }

    /// Returns true if the arguments contain `arg`.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Returns the argument following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        match self.stdio {
            StdioMode::Interactive => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            StdioMode::ErrorsOnly => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::inherit());
            }
        }

        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Executes external programs on behalf of a connector.
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion. A non-zero exit is an error.
    fn run(&self, command: &CommandSpec) -> impl Future<Output = Result<()>> + Send;

    /// Starts the command without waiting for it and returns its process ID.
    fn spawn(&self, command: &CommandSpec) -> Result<u32>;

    /// Sends an interrupt signal (SIGINT) to a process started by `spawn`.
    fn interrupt(&self, pid: u32) -> Result<()>;
}

/// Runs commands as real child processes of this program.
pub struct SystemRunner {
    /// Detached processes started by `spawn`, keyed by process ID.
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemRunner {
    /// Creates a new runner.
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of detached processes still tracked.
    pub fn tracked_processes(&self) -> usize {
        self.children.lock().len()
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        debug!(command = %command, "execute");

        let status = command
            .to_command()
            .status()
            .await
            .map_err(|source| ConnectorError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ConnectorError::CommandFailed {
                program: command.program.clone(),
                code: status.code(),
            })
        }
    }

    fn spawn(&self, command: &CommandSpec) -> Result<u32> {
        debug!(command = %command, "execute in background");

        let child = command
            .to_command()
            .spawn()
            .map_err(|source| ConnectorError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        // A child without an ID has already been reaped.
        let pid = child.id().ok_or_else(|| ConnectorError::CommandFailed {
            program: command.program.clone(),
            code: None,
        })?;

        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    fn interrupt(&self, pid: u32) -> Result<()> {
        send_interrupt(pid)?;

        // Dropping the handle leaves reaping to the runtime once the process exits.
        if let Some(mut child) = self.children.lock().remove(&pid) {
            match child.try_wait() {
                Ok(Some(status)) => debug!(pid = pid, status = %status, "process exited"),
                Ok(None) => debug!(pid = pid, "process still shutting down"),
                Err(e) => warn!(pid = pid, error = %e, "could not query process status"),
            }
        }

        Ok(())
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ConnectorError::Signal {
        pid,
        reason: "process ID out of range".to_string(),
    })?;

    kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|errno| ConnectorError::Signal {
        pid,
        reason: errno.desc().to_string(),
    })
}

#[cfg(not(unix))]
fn send_interrupt(_pid: u32) -> Result<()> {
    Err(ConnectorError::UnsupportedPlatform(
        "sending interrupts requires a Unix platform".to_string(),
    ))
}
