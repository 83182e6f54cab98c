// crates/agent-e2e-remote/src/error.rs
// ============================================================================
// Module: Remote Errors
// Description: Errors raised while running and decoding remote commands.
// Dependencies: agent-e2e-core, thiserror
// ============================================================================

//! Remote error definitions.

use agent_e2e_core::PollTimeout;
use agent_e2e_core::RuleError;
use agent_e2e_core::SequenceMismatch;
use agent_e2e_core::StatusError;
use thiserror::Error;

/// Errors raised by remote execution and agent CLI wrappers.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The command could not be started.
    #[error("failed to spawn command: {0}")]
    Spawn(String),
    /// The command exited with a non-zero status.
    #[error("command `{command}` failed with {}: {stderr}", describe_exit(*.exit_code))]
    CommandFailed {
        /// Command line that failed.
        command: String,
        /// Exit code when the process exited normally.
        exit_code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },
    /// Command output did not decode.
    #[error("decode error: {0}")]
    Decode(String),
    /// Argument rejected before running anything.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Observed systemd events did not match.
    #[error(transparent)]
    Journal(#[from] SequenceMismatch),
    /// Polling gave up.
    #[error(transparent)]
    Timeout(#[from] PollTimeout),
}

impl From<StatusError> for RemoteError {
    fn from(err: StatusError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<RuleError> for RemoteError {
    fn from(err: RuleError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Renders an exit code for error messages.
fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "no exit code".to_string(), |code| format!("exit code {code}"))
}
