// crates/agent-e2e-remote/src/executor.rs
// ============================================================================
// Module: Remote Executors
// Description: Shell command execution on local and SSH targets.
// Purpose: Give suites one seam for every command sent to a test host.
// Dependencies: agent-e2e-core
// ============================================================================

//! ## Overview
//! A [`RemoteExecutor`] runs one `sh -c` command line and returns exit code,
//! stdout, and stderr. File helpers are layered on top as provided methods so
//! test doubles only implement [`RemoteExecutor::run`].
//!
//! Invariants:
//! - Arguments interpolated into command lines pass through [`shell_quote`].
//! - A non-zero exit is data for [`RemoteExecutor::run`] and an error for
//!   [`RemoteExecutor::run_checked`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;

use crate::error::RemoteError;

// ============================================================================
// SECTION: Output
// ============================================================================

/// Result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates a successful output with `stdout`.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Creates a failed output with `exit_code` and `stderr`.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true when the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Privilege used for file and service commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    /// Run as the login user.
    #[default]
    User,
    /// Run through `sudo`.
    Root,
}

impl Privilege {
    /// Returns the command prefix for this privilege.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::User => "",
            Self::Root => "sudo ",
        }
    }
}

// ============================================================================
// SECTION: Executor Trait
// ============================================================================

/// Runs shell commands on a test host.
pub trait RemoteExecutor: Send + Sync {
    /// Returns a label for the target host.
    fn host(&self) -> &str;

    /// Runs `command` through `sh -c`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when the command cannot be started.
    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Runs `command` and returns stdout, failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::CommandFailed`] on a non-zero exit.
    fn run_checked(&self, command: &str) -> Result<String, RemoteError> {
        let output = self.run(command)?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(RemoteError::CommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    /// Writes `content` to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the write fails.
    fn write_file(
        &self,
        path: &str,
        content: &str,
        privilege: Privilege,
    ) -> Result<(), RemoteError> {
        let command = format!(
            "printf '%s' {} | {}tee {} > /dev/null",
            shell_quote(content),
            privilege.prefix(),
            shell_quote(path)
        );
        self.run_checked(&command).map(|_| ())
    }

    /// Reads `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the file cannot be read.
    fn read_file(&self, path: &str, privilege: Privilege) -> Result<String, RemoteError> {
        self.run_checked(&format!("{}cat {}", privilege.prefix(), shell_quote(path)))
    }

    /// Returns true when `path` exists.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when the check cannot run.
    fn file_exists(&self, path: &str) -> Result<bool, RemoteError> {
        Ok(self.run(&format!("test -e {}", shell_quote(path)))?.success())
    }

    /// Removes `path` if present.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the removal fails.
    fn remove_file(&self, path: &str, privilege: Privilege) -> Result<(), RemoteError> {
        self.run_checked(&format!("{}rm -f {}", privilege.prefix(), shell_quote(path))).map(|_| ())
    }
}

/// Quotes `value` as a single POSIX shell word.
///
/// ```
/// use agent_e2e_remote::shell_quote;
///
/// assert_eq!(shell_quote("it's"), r"'it'\''s'");
/// ```
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

// ============================================================================
// SECTION: Local Shell
// ============================================================================

/// Executor running commands on the current machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

impl RemoteExecutor for LocalShell {
    fn host(&self) -> &str {
        "localhost"
    }

    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map(CommandOutput::from)
            .map_err(|err| RemoteError::Spawn(err.to_string()))
    }
}

// ============================================================================
// SECTION: SSH
// ============================================================================

/// Executor running commands over the `ssh` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshExecutor {
    /// Target host name or address.
    host: String,
    /// Login user.
    user: String,
    /// SSH port.
    port: u16,
    /// Private key file.
    identity: Option<PathBuf>,
    /// Connection timeout.
    connect_timeout: Duration,
}

impl SshExecutor {
    /// Creates an executor for `user@host` on port 22.
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            identity: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the SSH port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the private key file.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the full `ssh` argument vector for `command`.
    #[must_use]
    pub fn argv(&self, command: &str) -> Vec<String> {
        let mut argv = vec![
            "ssh".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(identity) = &self.identity {
            argv.push("-i".to_string());
            argv.push(identity.display().to_string());
        }
        argv.push(format!("{}@{}", self.user, self.host));
        argv.push("--".to_string());
        argv.push(format!("sh -c {}", shell_quote(command)));
        argv
    }
}

impl RemoteExecutor for SshExecutor {
    fn host(&self) -> &str {
        &self.host
    }

    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let argv = self.argv(command);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RemoteError::Spawn("empty ssh argv".to_string()))?;
        Command::new(program)
            .args(args)
            .output()
            .map(CommandOutput::from)
            .map_err(|err| RemoteError::Spawn(err.to_string()))
    }
}

// ============================================================================
// SECTION: Logging Decorator
// ============================================================================

/// Executor wrapper emitting a [`HarnessEvent::Command`] per command.
///
/// Registered secrets are replaced with `<redacted>` in logged command lines.
pub struct LoggedExecutor<E> {
    /// Wrapped executor.
    inner: E,
    /// Destination for command events.
    sink: Arc<dyn EventSink>,
    /// Values masked in logged commands.
    secrets: Vec<String>,
}

impl<E: RemoteExecutor> LoggedExecutor<E> {
    /// Wraps `inner`, sending events to `sink`.
    pub fn new(inner: E, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner,
            sink,
            secrets: Vec::new(),
        }
    }

    /// Masks `secret` in logged command lines. Empty values are ignored.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Returns the wrapped executor.
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    /// Replaces every registered secret in `line`.
    fn mask(&self, line: &str) -> String {
        self.secrets
            .iter()
            .fold(line.to_string(), |line, secret| line.replace(secret.as_str(), "<redacted>"))
    }
}

impl<E: RemoteExecutor> RemoteExecutor for LoggedExecutor<E> {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let result = self.inner.run(command);
        self.sink.emit(&HarnessEvent::Command {
            host: self.inner.host().to_string(),
            command: self.mask(command),
            exit_code: result.as_ref().ok().and_then(|output| output.exit_code),
        });
        result
    }

    fn run_checked(&self, command: &str) -> Result<String, RemoteError> {
        let output = self.run(command)?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(RemoteError::CommandFailed {
            command: self.mask(command),
            exit_code: output.exit_code,
            stderr: self.mask(output.stderr.trim()),
        })
    }
}
