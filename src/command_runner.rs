//! Process execution
//!
//! Every external program the installer starts (pacman, yay, git, module
//! commands) goes through a [`CommandRunner`]. The production runner,
//! [`ShellRunner`], spawns each child as its own process group and keeps its
//! PID in the global child registry until it exits.
//!
//! Tests substitute a recording fake so no real process is ever spawned.

use crate::process_guard::{CommandProcessGroup, track_child, untrack_child};
use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Captured result of one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            success: true,
            ..Default::default()
        }
    }

    /// Failed output with `code` and `stderr`
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
            ..Default::default()
        }
    }

    /// Error naming `context` unless the process exited zero.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        let detail = self.stderr.trim();
        let detail = if detail.is_empty() { self.stdout.trim() } else { detail };
        anyhow::bail!(
            "{} failed (exit code {}): {}",
            context,
            self.exit_code.unwrap_or(-1),
            detail
        )
    }

    /// First line of stdout, trimmed
    pub fn first_line(&self) -> &str {
        self.stdout.lines().next().unwrap_or("").trim()
    }
}

/// Runs external programs.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// `Err` means the process could not be started at all; a non-zero exit
    /// is reported through [`CommandOutput::success`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a shell command line through `sh -c`.
    fn run_shell(&self, command: &str) -> Result<CommandOutput> {
        self.run("sh", &["-c", command])
    }
}

/// Spawns real processes, each in its own process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!("exec: {} {:?}", program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group()
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        let pid = child.id();
        track_child(pid);
        let waited = child.wait_with_output();
        untrack_child(pid);

        let output = waited.with_context(|| format!("Failed waiting for {}", program))?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };

        if !result.success {
            info!(
                "{} exited with code {}",
                program,
                result.exit_code.unwrap_or(-1)
            );
        }
        Ok(result)
    }
}
