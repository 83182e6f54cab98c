// crates/agent-e2e-core/src/status.rs
// ============================================================================
// Module: Status Snapshots
// Description: Typed views over agent `--json` command output.
// Purpose: Decode status and check output for assertions.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Agent binaries print JSON for `status --json` and `check <name> --json`,
//! sometimes preceded by log or warning lines. [`parse_json_output`] skips
//! that noise and decodes the first JSON document. The snapshot types keep
//! only the fields suites assert on and default everything else.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while decoding command output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// No line of the output starts a JSON document.
    #[error("no json document in command output")]
    NoJson,
    /// The JSON document did not match the expected shape.
    #[error("invalid json output: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Decodes the first JSON document in `raw`, skipping leading non-JSON lines.
///
/// # Errors
///
/// Returns [`StatusError::NoJson`] when no line starts with `{` or `[`, and
/// [`StatusError::Decode`] when the document does not decode into `T`.
pub fn parse_json_output<T: DeserializeOwned>(raw: &str) -> Result<T, StatusError> {
    let start = json_start(raw).ok_or(StatusError::NoJson)?;
    let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(StatusError::Decode(err.to_string())),
        None => Err(StatusError::NoJson),
    }
}

/// Returns the byte offset of the first line that opens a JSON document.
fn json_start(raw: &str) -> Option<usize> {
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

// ============================================================================
// SECTION: Agent Status
// ============================================================================

/// Snapshot of `agent status --json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStatus {
    /// Agent version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Check runner statistics.
    #[serde(rename = "runnerStats", default)]
    pub runner_stats: RunnerStats,
}

/// Collector runner statistics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerStats {
    /// Check name to instance id to stats.
    #[serde(rename = "Checks", default)]
    pub checks: BTreeMap<String, BTreeMap<String, CheckInstanceStats>>,
}

/// Statistics for one check instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInstanceStats {
    /// Check name.
    #[serde(rename = "CheckName", default)]
    pub check_name: String,
    /// Completed runs.
    #[serde(rename = "TotalRuns", default)]
    pub total_runs: u64,
    /// Runs that returned an error.
    #[serde(rename = "TotalErrors", default)]
    pub total_errors: u64,
    /// Last error message, empty when the last run succeeded.
    #[serde(rename = "LastError", default)]
    pub last_error: String,
    /// Metric samples emitted by the last run.
    #[serde(rename = "MetricSamples", default)]
    pub metric_samples: u64,
}

impl AgentStatus {
    /// Returns every instance of `check`.
    #[must_use]
    pub fn check_instances(&self, check: &str) -> Vec<&CheckInstanceStats> {
        self.runner_stats
            .checks
            .get(check)
            .map(|instances| instances.values().collect())
            .unwrap_or_default()
    }

    /// Returns true when `check` ran at least once and its last run succeeded.
    #[must_use]
    pub fn check_healthy(&self, check: &str) -> bool {
        let instances = self.check_instances(check);
        !instances.is_empty()
            && instances.iter().all(|stats| stats.total_runs > 0 && stats.last_error.is_empty())
    }
}

// ============================================================================
// SECTION: Check Runs
// ============================================================================

/// One instance result of `agent check <name> --json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckRun {
    /// Samples handed to the aggregator.
    #[serde(default)]
    pub aggregator: CheckAggregator,
    /// Runner stats for the run.
    #[serde(default)]
    pub runner: CheckInstanceStats,
}

/// Aggregator payload of a check run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckAggregator {
    /// Metric series.
    #[serde(default)]
    pub metrics: Vec<CheckMetric>,
    /// Service checks.
    #[serde(default)]
    pub service_checks: Vec<ServiceCheck>,
}

/// Metric series emitted by a check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckMetric {
    /// Metric name.
    pub metric: String,
    /// `[timestamp, value]` pairs.
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
    /// Metric tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reporting host.
    #[serde(default)]
    pub host: String,
}

/// Service check emitted by a check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceCheck {
    /// Service check name.
    pub check: String,
    /// Status code: 0 ok, 1 warning, 2 critical, 3 unknown.
    #[serde(default)]
    pub status: u8,
    /// Optional message.
    #[serde(default)]
    pub message: String,
}

impl CheckRun {
    /// Returns the series named `metric`.
    #[must_use]
    pub fn metric(&self, metric: &str) -> Vec<&CheckMetric> {
        self.aggregator.metrics.iter().filter(|series| series.metric == metric).collect()
    }

    /// Returns the distinct metric names in the run.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.aggregator.metrics.iter().map(|series| series.metric.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

// ============================================================================
// SECTION: Security Agent Status
// ============================================================================

/// Snapshot of `security-agent status --json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityAgentStatus {
    /// Runtime security (CWS) section.
    #[serde(rename = "runtimeSecurityStatus", default)]
    pub runtime: RuntimeSecurityStatus,
}

/// Runtime security module state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSecurityStatus {
    /// Whether the security agent is connected to system-probe.
    #[serde(default)]
    pub connected: bool,
    /// Loaded policies.
    #[serde(rename = "policiesStatus", default)]
    pub policies: Vec<PolicyStatus>,
}

/// Load status of one policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyStatus {
    /// Policy name.
    #[serde(alias = "Name", default)]
    pub name: String,
    /// Policy source (`file`, `remote-config`).
    #[serde(alias = "Source", default)]
    pub source: String,
    /// Per-rule load status.
    #[serde(alias = "Status", default)]
    pub rules: Vec<RuleStatus>,
}

/// Load status of one rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleStatus {
    /// Rule identifier.
    #[serde(alias = "ID")]
    pub id: String,
    /// Status label (`loaded`, `error`, ...).
    #[serde(alias = "Status", default)]
    pub status: String,
    /// Error message when the rule failed to load.
    #[serde(alias = "Message", default)]
    pub message: String,
}

impl SecurityAgentStatus {
    /// Returns the status of `rule_id` across all policies.
    #[must_use]
    pub fn rule_status(&self, rule_id: &str) -> Option<&RuleStatus> {
        self.runtime
            .policies
            .iter()
            .flat_map(|policy| policy.rules.iter())
            .find(|rule| rule.id == rule_id)
    }

    /// Returns true when `rule_id` is reported as loaded.
    #[must_use]
    pub fn rule_loaded(&self, rule_id: &str) -> bool {
        self.rule_status(rule_id).is_some_and(|rule| rule.status == "loaded")
    }

    /// Returns the named policy.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<&PolicyStatus> {
        self.runtime.policies.iter().find(|policy| policy.name == name)
    }
}

// ============================================================================
// SECTION: Process Agent Status
// ============================================================================

/// Snapshot of `process-agent status --json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessAgentStatus {
    /// Expvar section published by the process agent.
    #[serde(default)]
    pub expvars: ProcessExpvars,
    /// Remaining fields, kept for diagnostics.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Process agent expvars.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessExpvars {
    /// Checks enabled in the process agent.
    #[serde(default)]
    pub enabled_checks: Vec<String>,
    /// Process agent pid.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Uptime in seconds.
    #[serde(default)]
    pub uptime: Option<u64>,
}

impl ProcessAgentStatus {
    /// Returns true when `check` is enabled.
    #[must_use]
    pub fn check_enabled(&self, check: &str) -> bool {
        self.expvars.enabled_checks.iter().any(|name| name == check)
    }
}
