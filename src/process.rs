//! Synchronous external command execution
//!
//! Account changes, route additions and CIM method calls with array
//! arguments go through command-line tools. Callers escape their arguments
//! with [`crate::escape::shell_input`] before building a [`CommandLine`];
//! the executor places them on the command line as given.

use crate::OsError;
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

/// A program and its already-escaped arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    secret: Vec<bool>,
}

impl CommandLine {
    /// Start a command line for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self.secret.push(false);
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for arg in args {
            self = self.arg(arg);
        }
        self
    }

    /// Append an argument that must never appear in logs
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self.secret.push(true);
        self
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, secrets included
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

/// Renders the command with secret arguments masked
impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (arg, secret) in self.args.iter().zip(&self.secret) {
            if *secret {
                write!(f, " ***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; -1 when the process was terminated without one
    pub status: i32,
}

impl ProcessOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external commands to completion
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run `command`, wait for it, and capture its output
    async fn execute(&self, command: &CommandLine) -> Result<ProcessOutput, OsError>;
}

/// Executor backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessExecutor;

impl SystemProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for SystemProcessExecutor {
    async fn execute(&self, command: &CommandLine) -> Result<ProcessOutput, OsError> {
        debug!("Executing: {}", command);

        let mut cmd = tokio::process::Command::new(command.program());

        #[cfg(windows)]
        for arg in command.arguments() {
            cmd.raw_arg(quote_windows_arg(arg));
        }

        #[cfg(not(windows))]
        cmd.args(command.arguments());

        let output = cmd
            .output()
            .await
            .map_err(|e| OsError::Command(format!("{}: {}", command.program(), e)))?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }
}

/// Wrap an already-escaped argument in quotes when it contains whitespace
///
/// Trailing backslashes are doubled so they cannot escape the closing quote.
#[cfg_attr(not(windows), allow(dead_code))]
fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t']) {
        return arg.to_string();
    }

    let trimmed = arg.trim_end_matches('\\');
    let trailing = arg.len() - trimmed.len();
    format!("\"{}{}\"", trimmed, "\\".repeat(trailing * 2))
}
