//! Recording command runner for connector tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::errors::{ConnectorError, Result};
use super::process::{CommandRunner, CommandSpec};

/// One call made against the fake runner.
#[derive(Debug, Clone)]
pub(crate) enum Call {
    Run(CommandSpec),
    Spawn(CommandSpec),
    Interrupt(u32),
}

/// Command runner that records calls and fails on demand.
///
/// Commands are keyed by their verb: `ssh`, or the kubectl subcommand
/// (`run`, `wait`, `port-forward`, `delete`).
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<(Call, Instant)>>,
    failures: Mutex<HashMap<&'static str, VecDeque<bool>>>,
    always_fail: Mutex<Vec<&'static str>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    hanging: Mutex<Vec<&'static str>>,
    next_pid: Mutex<u32>,
}

const KUBECTL_VERBS: &[&str] = &["run", "wait", "port-forward", "delete"];

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            always_fail: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            hanging: Mutex::new(Vec::new()),
            next_pid: Mutex::new(4242),
        }
    }

    /// Scripts the outcomes of the next invocations of `verb`, `true` meaning failure.
    pub(crate) fn script(&self, verb: &'static str, outcomes: &[bool]) {
        self.failures
            .lock()
            .entry(verb)
            .or_default()
            .extend(outcomes.iter().copied());
    }

    /// Makes every invocation of `verb` fail.
    pub(crate) fn fail_always(&self, verb: &'static str) {
        self.always_fail.lock().push(verb);
    }

    /// Makes every run of `verb` take `delay` before it reports its outcome.
    pub(crate) fn delay(&self, verb: &'static str, delay: Duration) {
        self.delays.lock().insert(verb, delay);
    }

    /// Makes every run of `verb` never finish.
    pub(crate) fn hang(&self, verb: &'static str) {
        self.hanging.lock().push(verb);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
    }

    /// Invocations (run or spawn) of `verb`, with the time they were made.
    pub(crate) fn invocations(&self, verb: &str) -> Vec<(CommandSpec, Instant)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(call, at)| match call {
                Call::Run(spec) | Call::Spawn(spec) if verb_of(spec) == Some(verb) => {
                    Some((spec.clone(), *at))
                }
                _ => None,
            })
            .collect()
    }

    /// Verbs of all calls in the order they were made.
    pub(crate) fn verbs(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .iter()
            .map(|(call, _)| match call {
                Call::Run(spec) | Call::Spawn(spec) => verb_of(spec).unwrap_or("unknown"),
                Call::Interrupt(_) => "interrupt",
            })
            .collect()
    }

    pub(crate) fn interrupts(&self) -> Vec<u32> {
        self.calls
            .lock()
            .iter()
            .filter_map(|(call, _)| match call {
                Call::Interrupt(pid) => Some(*pid),
                _ => None,
            })
            .collect()
    }

    fn outcome(&self, spec: &CommandSpec) -> Result<()> {
        let verb = verb_of(spec).unwrap_or_default();

        let fails = self.always_fail.lock().iter().any(|v| *v == verb)
            || self
                .failures
                .lock()
                .get_mut(verb)
                .and_then(VecDeque::pop_front)
                .unwrap_or(false);

        if fails {
            Err(ConnectorError::CommandFailed {
                program: spec.program.clone(),
                code: Some(1),
            })
        } else {
            Ok(())
        }
    }
}

fn verb_of(spec: &CommandSpec) -> Option<&'static str> {
    if spec.program == "ssh" {
        return Some("ssh");
    }
    KUBECTL_VERBS.iter().copied().find(|v| spec.has_arg(v))
}

impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        self.calls
            .lock()
            .push((Call::Run(command.clone()), Instant::now()));

        let verb = verb_of(command).unwrap_or_default();
        let hangs = self.hanging.lock().contains(&verb);
        if hangs {
            std::future::pending::<()>().await;
        }

        let delay = self.delays.lock().get(verb).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.outcome(command)
    }

    fn spawn(&self, command: &CommandSpec) -> Result<u32> {
        self.calls
            .lock()
            .push((Call::Spawn(command.clone()), Instant::now()));
        self.outcome(command)?;

        let mut pid = self.next_pid.lock();
        *pid += 1;
        Ok(*pid)
    }

    fn interrupt(&self, pid: u32) -> Result<()> {
        self.calls.lock().push((Call::Interrupt(pid), Instant::now()));
        Ok(())
    }
}
