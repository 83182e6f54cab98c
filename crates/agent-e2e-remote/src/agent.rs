// crates/agent-e2e-remote/src/agent.rs
// ============================================================================
// Module: Agent CLI
// Description: Typed wrappers over agent, security-agent, and process-agent.
// Purpose: Read agent state and manage CWS policies on a test host.
// Dependencies: agent-e2e-core, serde_json
// ============================================================================

//! ## Overview
//! [`AgentCli`] builds command lines for the agent binaries, runs them
//! through a [`RemoteExecutor`], and decodes `--json` output into the
//! snapshot types from `agent-e2e-core`. Commands run through `sudo` by
//! default because the agent binaries read root-owned configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use agent_e2e_core::AgentStatus;
use agent_e2e_core::CheckRun;
use agent_e2e_core::Policy;
use agent_e2e_core::ProcessAgentStatus;
use agent_e2e_core::SecurityAgentStatus;
use agent_e2e_core::parse_json_output;
use serde_json::Value;

use crate::error::RemoteError;
use crate::executor::Privilege;
use crate::executor::RemoteExecutor;
use crate::executor::shell_quote;
use crate::paths;

// ============================================================================
// SECTION: Agent CLI
// ============================================================================

/// Agent binaries on one host.
pub struct AgentCli<'a> {
    /// Executor for the host.
    exec: &'a dyn RemoteExecutor,
    /// Privilege for agent commands.
    privilege: Privilege,
}

impl<'a> AgentCli<'a> {
    /// Creates a wrapper running commands as root.
    #[must_use]
    pub fn new(exec: &'a dyn RemoteExecutor) -> Self {
        Self {
            exec,
            privilege: Privilege::Root,
        }
    }

    /// Sets the privilege used for agent commands.
    #[must_use]
    pub const fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &'a dyn RemoteExecutor {
        self.exec
    }

    /// Returns `agent status --json`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails or output does not decode.
    pub fn status(&self) -> Result<AgentStatus, RemoteError> {
        let output = self.run(paths::AGENT_BIN, "status --json")?;
        Ok(parse_json_output(&output)?)
    }

    /// Runs `agent check <name> --json` once.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the name is invalid, the command fails, or
    /// output does not decode.
    pub fn check(&self, name: &str) -> Result<Vec<CheckRun>, RemoteError> {
        validate_check_name(name)?;
        let output = self.run(paths::AGENT_BIN, &format!("check {name} --json"))?;
        Ok(parse_json_output(&output)?)
    }

    /// Returns `agent config` output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn config(&self) -> Result<String, RemoteError> {
        self.run(paths::AGENT_BIN, "config")
    }

    /// Sends a flare for `email` and returns the command output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn flare(&self, email: &str) -> Result<String, RemoteError> {
        self.run(paths::AGENT_BIN, &format!("flare --email {} --send", shell_quote(email)))
    }

    /// Returns `security-agent status --json`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails or output does not decode.
    pub fn security_status(&self) -> Result<SecurityAgentStatus, RemoteError> {
        let output = self.run(paths::SECURITY_AGENT_BIN, "status --json")?;
        Ok(parse_json_output(&output)?)
    }

    /// Returns the policy currently loaded, via `runtime policy download`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails or output is not a
    /// policy.
    pub fn download_policy(&self) -> Result<Policy, RemoteError> {
        let output = self.run(paths::SECURITY_AGENT_BIN, "runtime policy download")?;
        Ok(Policy::parse(&output)?)
    }

    /// Reloads CWS policies with `runtime policy reload`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn reload_policies(&self) -> Result<(), RemoteError> {
        self.run(paths::SECURITY_AGENT_BIN, "runtime policy reload").map(|_| ())
    }

    /// Writes `policy` as `<name>.policy` in the policy directory.
    ///
    /// Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the name is invalid, rendering fails, or
    /// the write fails.
    pub fn write_policy(&self, name: &str, policy: &Policy) -> Result<String, RemoteError> {
        validate_check_name(name)?;
        let path = paths::policy_path(name);
        self.exec.write_file(&path, &policy.render()?, Privilege::Root)?;
        Ok(path)
    }

    /// Removes policy file `<name>.policy`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the name is invalid or removal fails.
    pub fn remove_policy(&self, name: &str) -> Result<(), RemoteError> {
        validate_check_name(name)?;
        self.exec.remove_file(&paths::policy_path(name), Privilege::Root)
    }

    /// Returns `process-agent status --json`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails or output does not decode.
    pub fn process_status(&self) -> Result<ProcessAgentStatus, RemoteError> {
        let output = self.run(paths::PROCESS_AGENT_BIN, "status --json")?;
        Ok(parse_json_output(&output)?)
    }

    /// Runs `process-agent check <name> --json` and returns the raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the name is invalid, the command fails, or
    /// output is not JSON.
    pub fn process_check(&self, name: &str) -> Result<Value, RemoteError> {
        validate_check_name(name)?;
        let output = self.run(paths::PROCESS_AGENT_BIN, &format!("check {name} --json"))?;
        Ok(parse_json_output(&output)?)
    }

    /// Restarts a systemd unit.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when `systemctl` fails.
    pub fn restart(&self, unit: &str) -> Result<(), RemoteError> {
        let command =
            format!("{}systemctl restart {}", self.privilege.prefix(), shell_quote(unit));
        self.exec.run_checked(&command).map(|_| ())
    }

    /// Returns true when `systemctl is-active` reports the unit active.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when the check cannot run.
    pub fn is_active(&self, unit: &str) -> Result<bool, RemoteError> {
        let output = self.exec.run(&format!("systemctl is-active {}", shell_quote(unit)))?;
        Ok(output.success() && output.stdout.trim() == "active")
    }

    /// Runs `<binary> <args>` with the configured privilege.
    fn run(&self, binary: &str, args: &str) -> Result<String, RemoteError> {
        self.exec.run_checked(&format!("{}{binary} {args}", self.privilege.prefix()))
    }
}

/// Accepts check and policy names made of `[A-Za-z0-9_-]`.
fn validate_check_name(name: &str) -> Result<(), RemoteError> {
    let valid = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(RemoteError::InvalidArgument(format!("invalid name: {name}")))
    }
}
