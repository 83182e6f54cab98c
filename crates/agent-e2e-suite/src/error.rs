// crates/agent-e2e-suite/src/error.rs
// ============================================================================
// Module: Suite Errors
// Description: Error type for suite setup, test bodies, and helpers.
// Dependencies: thiserror
// ============================================================================

//! Suite error type.

use agent_e2e_clients::ClientError;
use agent_e2e_config::ConfigError;
use agent_e2e_core::PollTimeout;
use agent_e2e_core::RuleError;
use agent_e2e_provision::ProvisionError;
use agent_e2e_remote::RemoteError;
use thiserror::Error;

/// Errors raised by suites and suite helpers.
#[derive(Debug, Error)]
pub enum SuiteError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A backend or fake intake call failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// A command on a test host failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Provisioning failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// A polled condition never held.
    #[error(transparent)]
    Timeout(#[from] PollTimeout),
    /// A rule definition is invalid.
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// The environment was used before provisioning.
    #[error("suite {0} is not provisioned")]
    NotProvisioned(String),
    /// The environment lacks a resource a helper needs.
    #[error("environment is missing {0}")]
    MissingResource(String),
    /// Artifacts could not be written.
    #[error("artifact error: {0}")]
    Artifacts(String),
    /// A test assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),
}
