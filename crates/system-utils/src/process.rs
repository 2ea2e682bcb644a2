use std::collections::BTreeMap;
use std::fmt;
use std::process::{Output, Stdio};

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// An external program invocation: argv plus extra environment bindings.
///
/// The bindings are layered over the daemon's own environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCommand {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ExternalCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.timeout = Some(command_timeout);
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Exit code and captured output of one finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl From<Output> for ProcessOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs external commands to completion.
///
/// Implementations must be callable concurrently; every call is independent.
/// Dropping the returned future must stop waiting on (and ideally kill) the
/// child so callers can cancel an in-flight invocation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// A non-zero exit is reported through [`ProcessOutput::exit_code`]; `Err`
    /// means the command could not be run or timed out.
    async fn run(&self, command: &ExternalCommand) -> anyhow::Result<ProcessOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ExternalCommand) -> anyhow::Result<ProcessOutput> {
        let (program, args) = command
            .argv
            .split_first()
            .context("external command has an empty argv")?;
        let mut cmd = Command::new(program);
        cmd.args(args).envs(&command.env);
        let label = program.as_str();
        let output = match command.timeout {
            Some(command_timeout) => {
                run_command_with_timeout(&mut cmd, command_timeout, label).await?
            }
            None => run_command(&mut cmd, label).await?,
        };
        Ok(ProcessOutput::from(output))
    }
}

pub async fn run_command(cmd: &mut Command, label: &str) -> anyhow::Result<Output> {
    prepare(cmd);
    let child = cmd
        .spawn()
        .with_context(|| format!("{label} failed to start"))?;
    child
        .wait_with_output()
        .await
        .with_context(|| format!("{label} failed"))
}

pub async fn run_command_with_timeout(
    cmd: &mut Command,
    command_timeout: Duration,
    label: &str,
) -> anyhow::Result<Output> {
    prepare(cmd);
    let child = cmd
        .spawn()
        .with_context(|| format!("{label} failed to start"))?;
    // kill_on_drop reaps the child when the timeout drops the wait future.
    match timeout(command_timeout, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("{label} failed")),
        Err(_) => anyhow::bail!(
            "{label} timed out after {}ms",
            command_timeout.as_millis()
        ),
    }
}

fn prepare(cmd: &mut Command) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
}
