// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One external process call: what to run, where, and what it produced.

use crate::constants::STDERR_TAIL_LINES;
use crate::error::ToolError;
use std::ffi::OsString;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Description of one process call.
///
/// Environment values are overlaid on the caller's environment and never
/// appear in `Debug` output or logs; they may point at secret material.
#[derive(Clone)]
pub struct CommandInvocation {
    pub program: PathBuf,
    pub working_dir: PathBuf,
    pub args: Vec<String>,
    env: Vec<(String, OsString)>,
    pub timeout: Option<Duration>,
    log_output: bool,
}

impl CommandInvocation {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            args,
            env: Vec::new(),
            timeout: None,
            log_output: true,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keep stdout out of the logs, for commands that print secrets
    pub fn without_output_logging(mut self) -> Self {
        self.log_output = false;
        self
    }

    /// Names of the overlaid environment variables
    pub fn env_keys(&self) -> impl Iterator<Item = &str> {
        self.env.iter().map(|(k, _)| k.as_str())
    }

    /// Command line suitable for logs and error messages
    pub fn display_command(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string());

        std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the process to completion, capturing stdout and stderr.
    ///
    /// The child is killed when the invocation is cancelled or exceeds its
    /// timeout. Non-zero exit statuses are returned as `NonZeroExit`.
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<CommandOutput, ToolError> {
        let command_line = self.display_command();

        // spawn reports a missing working directory as NotFound too
        if !self.working_dir.is_dir() {
            return Err(ToolError::Io(format!(
                "working directory {} does not exist",
                self.working_dir.display()
            )));
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            command.env(key, value);
        }

        debug!(
            "Running '{}' in {} with env overlay [{}]",
            command_line,
            self.working_dir.display(),
            self.env_keys().collect::<Vec<_>>().join(", ")
        );

        let child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::NotFound {
                tool: self.program.display().to_string(),
            },
            _ => ToolError::Io(format!("failed to spawn '{}': {}", command_line, e)),
        })?;

        // Dropping the wait future drops the child, and kill_on_drop kills it
        let wait = child.wait_with_output();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelling '{}'", command_line);
                return Err(ToolError::Cancelled { command: command_line });
            }
            output = with_optional_timeout(self.timeout, wait) => match output {
                Some(result) => result.map_err(|e| {
                    ToolError::Io(format!("failed to wait for '{}': {}", command_line, e))
                })?,
                None => {
                    return Err(ToolError::TimedOut {
                        command: command_line,
                        timeout: self.timeout.unwrap_or_default(),
                    })
                }
            },
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            // moved rather than copied so callers can wipe secret output
            stdout: String::from_utf8(output.stdout)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            warnings: Vec::new(),
        };

        if self.log_output {
            for line in result.stdout.lines() {
                info!("{}", line);
            }
        }

        if !output.status.success() {
            for line in result.stderr.lines() {
                warn!("{}", line);
            }
            return Err(ToolError::NonZeroExit {
                command: command_line,
                exit_code: result.exit_code,
                stderr_tail: result.stderr_tail(),
            });
        }

        Ok(result)
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, _)| format!("{}=<redacted>", k))
            .collect();

        f.debug_struct("CommandInvocation")
            .field("program", &self.program)
            .field("working_dir", &self.working_dir)
            .field("args", &self.args)
            .field("env", &env)
            .field("timeout", &self.timeout)
            .field("log_output", &self.log_output)
            .finish()
    }
}

async fn with_optional_timeout<F: std::future::Future>(
    timeout: Option<Duration>,
    future: F,
) -> Option<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

/// Captured result of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Problems that did not change the outcome, such as a failed cleanup
    pub warnings: Vec<String>,
}

impl CommandOutput {
    pub fn stderr_tail(&self) -> String {
        tail(&self.stderr, STDERR_TAIL_LINES)
    }
}

/// Last `lines` non-empty lines of `text`
pub fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}
