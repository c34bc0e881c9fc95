//! Command Executor port.
//!
//! Every interaction with the scheduler's control plane goes through
//! [`CommandExecutor`]. [`LocalExecutor`] spawns the programs on this host
//! under a timeout; a timed-out or dropped invocation kills its child.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{AdapterError, AdapterResult};

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Data written to the child's stdin, then closed.
    pub stdin: Option<String>,
    /// Run as this user (via `su`) instead of the service user.
    pub run_as: Option<String>,
    /// Working directory of the child.
    pub cwd: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            run_as: None,
            cwd: None,
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

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Space-joined rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit code is reported in [`CommandOutput`], not as an error;
    /// errors mean the command could not be run or did not finish in time.
    async fn run(&self, spec: &CommandSpec) -> AdapterResult<CommandOutput>;
}

/// Executes commands on the local host.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut command = match &spec.run_as {
            Some(user) => {
                let mut line = shell_quote(&spec.program);
                for arg in &spec.args {
                    line.push(' ');
                    line.push_str(&shell_quote(arg));
                }
                if let Some(dir) = &spec.cwd {
                    line = format!("cd {} && {line}", shell_quote(dir));
                }
                let mut su = Command::new("su");
                su.args(["-", user.as_str(), "-s", "/bin/bash", "-c", line.as_str()]);
                su
            }
            None => {
                let mut direct = Command::new(&spec.program);
                direct.args(&spec.args);
                if let Some(dir) = &spec.cwd {
                    direct.current_dir(dir);
                }
                direct
            }
        };
        command
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn run(&self, spec: &CommandSpec) -> AdapterResult<CommandOutput> {
        tracing::debug!(command = %spec.display(), run_as = ?spec.run_as, "Running command");

        let mut child = Self::build(spec)
            .spawn()
            .map_err(|e| AdapterError::CommandFailed {
                command: spec.program.clone(),
                message: e.to_string(),
            })?;

        // The stdin write runs under the deadline too.
        let stdin = child.stdin.take();
        let input = spec.stdin.as_deref();
        let run = async move {
            if let (Some(input), Some(mut stdin)) = (input, stdin) {
                stdin.write_all(input.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                AdapterError::Timeout(format!(
                    "{} timed out after {}s",
                    spec.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AdapterError::CommandFailed {
                command: spec.program.clone(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Single-quote a word for `bash -c`.
fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
