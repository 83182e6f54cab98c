// crates/agent-e2e-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Provide env doubles without mutating the process environment.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;

use agent_e2e_config::ConfigError;

/// In-memory environment used in place of process variables.
#[derive(Default)]
pub struct FakeEnv {
    vars: BTreeMap<String, String>,
}

impl FakeEnv {
    /// Creates an env with the given pairs.
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            vars: pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        }
    }

    /// Looks up a variable.
    pub fn lookup(&self, name: &str) -> Result<Option<String>, String> {
        Ok(self.vars.get(name).cloned())
    }
}

/// Asserts that `result` failed with a message containing `needle`.
pub fn assert_error_contains<T>(result: Result<T, ConfigError>, needle: &str) {
    let message = result.err().map(|err| err.to_string()).unwrap_or_default();
    assert!(message.contains(needle), "expected error containing {needle}, got '{message}'");
}
