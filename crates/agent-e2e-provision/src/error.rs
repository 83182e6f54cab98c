// crates/agent-e2e-provision/src/error.rs
// ============================================================================
// Module: Provision Errors
// Description: Error type for plan construction and application.
// Dependencies: thiserror
// ============================================================================

//! Provisioning error type.

use thiserror::Error;

/// Errors raised while building or applying a provisioning plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// A step id is malformed.
    #[error("invalid step id: {id}")]
    InvalidStepId {
        /// Offending id.
        id: String,
    },
    /// Two steps share an id.
    #[error("duplicate step id: {id}")]
    DuplicateStep {
        /// Duplicated id.
        id: String,
    },
    /// A step depends on a step that is not in the plan.
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Dependent step.
        step: String,
        /// Missing dependency.
        dependency: String,
    },
    /// Dependency edges form a cycle.
    #[error("dependency cycle through steps: {}", steps.join(", "))]
    Cycle {
        /// Steps left unordered by the cycle.
        steps: Vec<String>,
    },
    /// Step parameters are invalid.
    #[error("invalid parameters for step {step}: {error}")]
    InvalidParams {
        /// Step id.
        step: String,
        /// Error details.
        error: String,
    },
    /// The orchestrator failed to apply a step.
    #[error("provisioning step {step} failed: {error}")]
    StepFailed {
        /// Step id.
        step: String,
        /// Error details.
        error: String,
    },
    /// Tearing down a resource failed.
    #[error("teardown of {step} failed: {error}")]
    TeardownFailed {
        /// Step id.
        step: String,
        /// Error details.
        error: String,
    },
}

impl ProvisionError {
    /// Returns a stable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidStepId {
                ..
            } => "invalid_step_id",
            Self::DuplicateStep {
                ..
            } => "duplicate_step",
            Self::UnknownDependency {
                ..
            } => "unknown_dependency",
            Self::Cycle {
                ..
            } => "dependency_cycle",
            Self::InvalidParams {
                ..
            } => "invalid_params",
            Self::StepFailed {
                ..
            } => "step_failed",
            Self::TeardownFailed {
                ..
            } => "teardown_failed",
        }
    }
}
