//! Agent subprocess with process group support
//!
//! Agents are spawned as process group leaders so killing a session also
//! takes down any tools the agent started.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use process_wrap::tokio::{ChildWrapper, CommandWrap, KillOnDrop};
#[cfg(unix)]
use process_wrap::tokio::ProcessGroup;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};

use crate::types::{AgentError, Result};

/// How long `shutdown` waits for the process to exit after the kill signal
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Program, arguments and environment for an agent subprocess
#[derive(Debug, Clone, Default)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Wrapper around process-wrap's `ChildWrapper`
#[derive(Debug)]
pub struct WrappedChild {
    inner: Box<dyn ChildWrapper>,
}

impl WrappedChild {
    pub fn new(inner: Box<dyn ChildWrapper>) -> Self {
        Self { inner }
    }

    /// Kill the process group and wait for exit
    pub async fn kill(&mut self) -> io::Result<()> {
        Pin::from(self.inner.kill()).await
    }

    /// Start killing without waiting for exit
    pub fn start_kill(&mut self) -> io::Result<()> {
        self.inner.start_kill()
    }

    pub async fn wait(&mut self) -> io::Result<std::process::ExitStatus> {
        Pin::from(self.inner.wait()).await
    }

    /// Returns Some(status) if the process has exited
    pub fn try_wait(&mut self) -> io::Result<Option<std::process::ExitStatus>> {
        self.inner.try_wait()
    }

    pub fn id(&self) -> u32 {
        self.inner.id().unwrap_or(0)
    }

    /// Kill and reap, bounded by [`KILL_WAIT`]. Errors are logged, not returned:
    /// the process may already be gone.
    pub async fn shutdown(&mut self) {
        let pid = self.id();
        if let Ok(Some(status)) = self.try_wait() {
            tracing::debug!(pid, ?status, "Agent process already exited");
            return;
        }
        if let Err(e) = self.start_kill() {
            tracing::debug!(pid, error = %e, "Kill signal failed");
        }
        match tokio::time::timeout(KILL_WAIT, self.wait()).await {
            Ok(Ok(status)) => tracing::info!(pid, ?status, "Agent process exited"),
            Ok(Err(e)) => tracing::warn!(pid, error = %e, "Failed to reap agent process"),
            Err(_) => tracing::warn!(pid, "Agent process did not exit after kill"),
        }
    }
}

/// A spawned agent with its stdio handles split out
#[derive(Debug)]
pub struct SpawnedProcess {
    pub child: WrappedChild,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: Option<ChildStderr>,
}

/// Spawn an agent subprocess with piped stdio
pub fn spawn(spec: &SpawnSpec) -> Result<SpawnedProcess> {
    tracing::info!(command = %spec.display(), cwd = %spec.cwd.display(), "Spawning agent process");

    let mut command = CommandWrap::with_new(&spec.program, |cmd| {
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    });
    #[cfg(unix)]
    command.wrap(ProcessGroup::leader());
    command.wrap(KillOnDrop);

    let mut inner = command
        .spawn()
        .map_err(|e| AgentError::spawn_failed(&spec.program, e))?;

    let stdin = inner.stdin().take();
    let stdout = inner.stdout().take();
    let stderr = inner.stderr().take();
    let mut child = WrappedChild::new(inner);

    match (stdin, stdout) {
        (Some(stdin), Some(stdout)) => {
            tracing::debug!(pid = child.id(), "Agent process started");
            Ok(SpawnedProcess {
                child,
                stdin,
                stdout,
                stderr,
            })
        }
        _ => {
            drop(child.start_kill());
            Err(AgentError::spawn_failed(
                &spec.program,
                "stdio pipes unavailable",
            ))
        }
    }
}

/// Forward the agent's stderr into the log
pub fn forward_stderr(stderr: ChildStderr, agent: &'static str) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    tracing::debug!(agent, line = %line, "agent stderr");
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(agent, error = %e, "stderr read failed");
                    break;
                }
            }
        }
    })
}
