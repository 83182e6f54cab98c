// crates/agent-e2e-suite/src/cws.rs
// ============================================================================
// Module: CWS Rule Sets
// Description: Backend agent and signal rules paired with an on-host policy.
// Purpose: Create rules for a security suite and remove them best-effort.
// Dependencies: agent-e2e-{core,clients,remote}
// ============================================================================

//! ## Overview
//! Every rule added to a [`CwsRuleSet`] exists twice on the backend: as an
//! agent rule and as a signal rule raising signals on its matches. The same
//! rules are rendered into a policy file on the test host so the agent loads
//! them without waiting for remote configuration.
//!
//! Creation is all-or-nothing per rule: when the signal rule cannot be
//! created, the agent rule just created is deleted again. If that delete
//! fails too, the agent rule is kept as an orphan. [`CwsRuleSet::cleanup`]
//! deletes everything it knows about, orphans included, and never stops at
//! the first error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use agent_e2e_clients::RuleApi;
use agent_e2e_clients::SecuritySignal;
use agent_e2e_core::AgentRule;
use agent_e2e_core::Policy;
use agent_e2e_core::PollPolicy;
use agent_e2e_core::SignalRuleSpec;
use agent_e2e_core::eventually;
use agent_e2e_core::poll;
use agent_e2e_remote::AgentCli;

use crate::error::SuiteError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rule created on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedRule {
    /// Agent rule definition.
    pub rule: AgentRule,
    /// Backend id of the agent rule.
    pub agent_rule_backend_id: String,
    /// Backend id of the signal rule.
    pub signal_rule_id: String,
}

/// Agent and signal rules owned by one suite.
pub struct CwsRuleSet<'a> {
    /// Backend rule API.
    api: &'a dyn RuleApi,
    /// Policy file name on the host, without extension.
    policy_name: String,
    /// Rules created so far, in creation order.
    rules: Vec<DeployedRule>,
    /// Agent rule ids whose rollback delete failed.
    orphaned_agent_rules: Vec<String>,
}

// ============================================================================
// SECTION: Rule Set
// ============================================================================

impl<'a> CwsRuleSet<'a> {
    /// Creates an empty rule set whose host policy is `<policy_name>.policy`.
    #[must_use]
    pub fn new(api: &'a dyn RuleApi, policy_name: impl Into<String>) -> Self {
        Self {
            api,
            policy_name: policy_name.into(),
            rules: Vec::new(),
            orphaned_agent_rules: Vec::new(),
        }
    }

    /// Returns the host policy name.
    #[must_use]
    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// Returns the rules created so far.
    #[must_use]
    pub fn rules(&self) -> &[DeployedRule] {
        &self.rules
    }

    /// Returns agent rule ids left behind by failed rollbacks.
    #[must_use]
    pub fn orphaned_agent_rules(&self) -> &[String] {
        &self.orphaned_agent_rules
    }

    /// Creates `rule` and its signal rule on the backend.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Client`] when either creation fails. A failed
    /// signal rule leaves no agent rule behind; when that delete fails as
    /// well, the agent rule is recorded in
    /// [`orphaned_agent_rules`](Self::orphaned_agent_rules) for
    /// [`cleanup`](Self::cleanup).
    pub fn add_rule(&mut self, rule: AgentRule) -> Result<&DeployedRule, SuiteError> {
        let agent_rule_backend_id = self.api.create_agent_rule(&rule)?;
        let spec = SignalRuleSpec::for_agent_rule(&rule.id, &rule.description);
        let signal_rule_id = match self.api.create_signal_rule(&spec) {
            Ok(id) => id,
            Err(err) => {
                if self.api.delete_agent_rule(&agent_rule_backend_id).is_err() {
                    self.orphaned_agent_rules.push(agent_rule_backend_id);
                }
                return Err(err.into());
            }
        };
        let index = self.rules.len();
        self.rules.push(DeployedRule {
            rule,
            agent_rule_backend_id,
            signal_rule_id,
        });
        Ok(&self.rules[index])
    }

    /// Returns the host policy carrying every rule.
    #[must_use]
    pub fn policy(&self) -> Policy {
        Policy::new(self.rules.iter().map(|deployed| deployed.rule.clone()).collect())
    }

    /// Writes the policy on the host and reloads policies.
    ///
    /// Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Remote`] when the write or reload fails.
    pub fn deploy(&self, agent: &AgentCli<'_>) -> Result<String, SuiteError> {
        let path = agent.write_policy(&self.policy_name, &self.policy())?;
        agent.reload_policies()?;
        Ok(path)
    }

    /// Waits until the security agent reports every rule as loaded.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Timeout`] listing the rules still missing.
    pub fn wait_for_rules_loaded(
        &self,
        agent: &AgentCli<'_>,
        policy: PollPolicy,
    ) -> Result<u32, SuiteError> {
        Ok(eventually(policy, |collect| {
            let Some(status) = collect.require_ok(agent.security_status(), "security-agent status")
            else {
                return;
            };
            for deployed in &self.rules {
                let id = &deployed.rule.id;
                collect.check(status.rule_loaded(id), format!("rule {id} is not loaded"));
            }
        })?)
    }

    /// Waits for a signal raised by agent rule `rule_id` within `window`.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Timeout`] when no matching signal appears.
    pub fn wait_for_signal(
        &self,
        rule_id: &str,
        window: Duration,
        policy: PollPolicy,
    ) -> Result<SecuritySignal, SuiteError> {
        let query = SignalRuleSpec::for_agent_rule(rule_id, "").query();
        Ok(poll(policy, || {
            let signals = self.api.search_signals(&query, window).map_err(|err| err.to_string())?;
            signals
                .into_iter()
                .find(|signal| signal.agent_rule_id() == Some(rule_id))
                .ok_or_else(|| format!("no signal for rule {rule_id} yet"))
        })?)
    }

    /// Deletes every backend rule, newest first, then orphaned agent rules,
    /// and the host policy when `agent` is given.
    ///
    /// Returns one message per failed delete.
    pub fn cleanup(&mut self, agent: Option<&AgentCli<'_>>) -> Vec<String> {
        let mut failures = Vec::new();
        while let Some(deployed) = self.rules.pop() {
            if let Err(err) = self.api.delete_signal_rule(&deployed.signal_rule_id) {
                failures.push(format!("delete signal rule {}: {err}", deployed.signal_rule_id));
            }
            if let Err(err) = self.api.delete_agent_rule(&deployed.agent_rule_backend_id) {
                failures.push(format!(
                    "delete agent rule {}: {err}",
                    deployed.agent_rule_backend_id
                ));
            }
        }
        for id in std::mem::take(&mut self.orphaned_agent_rules) {
            if let Err(err) = self.api.delete_agent_rule(&id) {
                failures.push(format!("delete agent rule {id}: {err}"));
            }
        }
        if let Some(agent) = agent {
            if let Err(err) = agent.remove_policy(&self.policy_name) {
                failures.push(format!("remove policy {}: {err}", self.policy_name));
            }
        }
        failures
    }
}
