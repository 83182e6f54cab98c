// crates/agent-e2e-core/src/rules.rs
// ============================================================================
// Module: CWS Rules and Policies
// Description: Agent rule, policy file, and signal rule models.
// Purpose: Build the rule fragments suites create, load, and delete.
// Dependencies: serde, serde_yaml, thiserror
// ============================================================================

//! ## Overview
//! An [`AgentRule`] is a textual CWS rule (id plus SECL expression). Suites
//! either push it through the backend API or render it into a [`Policy`]
//! file written under the runtime-security policy directory. A
//! [`SignalRuleSpec`] describes the backend detection rule that turns agent
//! rule matches into signals.
//!
//! Invariants:
//! - Rule ids contain only lowercase ASCII letters, digits, and `_`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of an agent rule id.
pub const MAX_RULE_ID_LENGTH: usize = 128;
/// Policy version written when none is given.
pub const DEFAULT_POLICY_VERSION: &str = "1.2.3";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when building rules and policies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Rule id is empty, too long, or has forbidden characters.
    #[error("invalid rule id: {0}")]
    InvalidId(String),
    /// Rule expression is empty.
    #[error("rule {0} has an empty expression")]
    EmptyExpression(String),
    /// Policy could not be rendered.
    #[error("policy render failed: {0}")]
    Render(String),
}

// ============================================================================
// SECTION: Agent Rules
// ============================================================================

/// CWS agent rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRule {
    /// Rule identifier.
    pub id: String,
    /// SECL expression, e.g. `open.file.path == "/tmp/x"`.
    pub expression: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Optional rule version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AgentRule {
    /// Creates a rule after validating the id and expression.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the id or expression is invalid.
    pub fn new(id: impl Into<String>, expression: impl Into<String>) -> Result<Self, RuleError> {
        let id = id.into();
        let expression = expression.into();
        validate_rule_id(&id)?;
        if expression.trim().is_empty() {
            return Err(RuleError::EmptyExpression(id));
        }
        Ok(Self {
            id,
            expression,
            description: String::new(),
            version: None,
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the rule version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Validates an agent rule id.
///
/// # Errors
///
/// Returns [`RuleError::InvalidId`] when the id is empty, longer than
/// [`MAX_RULE_ID_LENGTH`], or has characters outside `[a-z0-9_]`.
pub fn validate_rule_id(id: &str) -> Result<(), RuleError> {
    if id.is_empty() || id.len() > MAX_RULE_ID_LENGTH {
        return Err(RuleError::InvalidId(id.to_string()));
    }
    if !id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_') {
        return Err(RuleError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Builds a rule id from a prefix and a per-run suffix.
///
/// Characters outside `[a-z0-9_]` become `_` and the result is truncated to
/// [`MAX_RULE_ID_LENGTH`].
#[must_use]
pub fn rule_id(prefix: &str, suffix: &str) -> String {
    let mut id: String = format!("{prefix}_{suffix}")
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() { lower } else { '_' }
        })
        .collect();
    id.truncate(MAX_RULE_ID_LENGTH);
    id
}

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Policy file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy version.
    pub version: String,
    /// Rules carried by the policy.
    pub rules: Vec<AgentRule>,
}

impl Policy {
    /// Creates a policy with [`DEFAULT_POLICY_VERSION`].
    #[must_use]
    pub fn new(rules: Vec<AgentRule>) -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            rules,
        }
    }

    /// Renders the policy as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Render`] when serialization fails.
    pub fn render(&self) -> Result<String, RuleError> {
        serde_yaml::to_string(self).map_err(|err| RuleError::Render(err.to_string()))
    }

    /// Parses YAML policy content, such as `runtime policy download` output.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Render`] when the document is not a policy.
    pub fn parse(content: &str) -> Result<Self, RuleError> {
        serde_yaml::from_str(content).map_err(|err| RuleError::Render(err.to_string()))
    }

    /// Returns the file name for a policy called `name`.
    #[must_use]
    pub fn file_name(name: &str) -> String {
        format!("{name}.policy")
    }

    /// Returns true when the policy carries `rule_id`.
    #[must_use]
    pub fn contains_rule(&self, rule_id: &str) -> bool {
        self.rules.iter().any(|rule| rule.id == rule_id)
    }
}

// ============================================================================
// SECTION: Signal Rules
// ============================================================================

/// Backend detection rule raising a signal on agent rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRuleSpec {
    /// Rule display name.
    pub name: String,
    /// Signal message template.
    pub message: String,
    /// Agent rule that triggers the signal.
    pub agent_rule_id: String,
    /// Tags attached to the rule.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SignalRuleSpec {
    /// Creates a signal rule for `agent_rule_id`.
    #[must_use]
    pub fn for_agent_rule(agent_rule_id: &str, description: &str) -> Self {
        Self {
            name: format!("e2e signal rule {agent_rule_id}"),
            message: format!("e2e signal for {description}"),
            agent_rule_id: agent_rule_id.to_string(),
            tags: vec!["e2e:true".to_string()],
        }
    }

    /// Returns the signal query matching the agent rule.
    #[must_use]
    pub fn query(&self) -> String {
        format!("@agent.rule_id:{}", self.agent_rule_id)
    }
}
