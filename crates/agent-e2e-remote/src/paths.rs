// crates/agent-e2e-remote/src/paths.rs
// ============================================================================
// Module: Host Paths
// Description: File layout, binaries, and systemd units on a Linux test host.
// Dependencies: agent-e2e-core
// ============================================================================

//! Well-known paths and unit names on a Linux host running the agent.

use agent_e2e_core::Policy;

/// Agent configuration directory.
pub const AGENT_CONFIG_DIR: &str = "/etc/datadog-agent";
/// Main agent configuration file.
pub const AGENT_CONFIG_FILE: &str = "/etc/datadog-agent/datadog.yaml";
/// System-probe configuration file.
pub const SYSTEM_PROBE_CONFIG_FILE: &str = "/etc/datadog-agent/system-probe.yaml";
/// Security agent configuration file.
pub const SECURITY_AGENT_CONFIG_FILE: &str = "/etc/datadog-agent/security-agent.yaml";
/// Directory scanned for CWS policy files.
pub const RUNTIME_POLICY_DIR: &str = "/etc/datadog-agent/runtime-security.d";
/// Root of installer-managed packages.
pub const PACKAGES_DIR: &str = "/opt/datadog-packages";
/// Directory holding systemd unit files written by the installer.
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";

/// Agent binary.
pub const AGENT_BIN: &str = "/opt/datadog-agent/bin/agent/agent";
/// Security agent binary.
pub const SECURITY_AGENT_BIN: &str = "/opt/datadog-agent/embedded/bin/security-agent";
/// Process agent binary.
pub const PROCESS_AGENT_BIN: &str = "/opt/datadog-agent/embedded/bin/process-agent";
/// Installer binary.
pub const INSTALLER_BIN: &str = "/usr/bin/datadog-installer";

/// Core agent unit.
pub const AGENT_UNIT: &str = "datadog-agent.service";
/// Trace agent unit.
pub const TRACE_AGENT_UNIT: &str = "datadog-agent-trace.service";
/// Process agent unit.
pub const PROCESS_AGENT_UNIT: &str = "datadog-agent-process.service";
/// System-probe unit.
pub const SYSTEM_PROBE_UNIT: &str = "datadog-agent-sysprobe.service";
/// Security agent unit.
pub const SECURITY_AGENT_UNIT: &str = "datadog-agent-security.service";
/// Installer daemon unit.
pub const INSTALLER_UNIT: &str = "datadog-installer.service";
/// Experiment core agent unit.
pub const AGENT_EXP_UNIT: &str = "datadog-agent-exp.service";
/// Experiment trace agent unit.
pub const TRACE_AGENT_EXP_UNIT: &str = "datadog-agent-trace-exp.service";
/// Experiment process agent unit.
pub const PROCESS_AGENT_EXP_UNIT: &str = "datadog-agent-process-exp.service";

/// Stable agent units, core first.
pub const STABLE_AGENT_UNITS: [&str; 3] = [AGENT_UNIT, TRACE_AGENT_UNIT, PROCESS_AGENT_UNIT];
/// Experiment agent units, core first.
pub const EXPERIMENT_AGENT_UNITS: [&str; 3] =
    [AGENT_EXP_UNIT, TRACE_AGENT_EXP_UNIT, PROCESS_AGENT_EXP_UNIT];

/// Returns the directory of installer package `package`.
#[must_use]
pub fn package_dir(package: &str) -> String {
    format!("{PACKAGES_DIR}/{package}")
}

/// Returns the `stable` symlink of `package`.
#[must_use]
pub fn stable_link(package: &str) -> String {
    format!("{PACKAGES_DIR}/{package}/stable")
}

/// Returns the `experiment` symlink of `package`.
#[must_use]
pub fn experiment_link(package: &str) -> String {
    format!("{PACKAGES_DIR}/{package}/experiment")
}

/// Returns the unit file path of `unit`.
#[must_use]
pub fn unit_path(unit: &str) -> String {
    format!("{SYSTEMD_UNIT_DIR}/{unit}")
}

/// Returns the policy file path for policy `name`.
#[must_use]
pub fn policy_path(name: &str) -> String {
    format!("{RUNTIME_POLICY_DIR}/{}", Policy::file_name(name))
}
