// crates/agent-e2e-remote/tests/agent.rs
// ============================================================================
// Module: Agent CLI Tests
// Description: Command construction and output decoding for agent binaries.
// Purpose: Ensure wrappers run the right binaries and decode noisy output.
// ============================================================================

//! Agent CLI wrapper tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use agent_e2e_core::AgentRule;
use agent_e2e_core::Policy;
use agent_e2e_remote::AgentCli;
use agent_e2e_remote::CommandOutput;
use agent_e2e_remote::Privilege;
use agent_e2e_remote::RemoteError;
use agent_e2e_remote::paths;
use common::ScriptedExecutor;

mod common;

#[test]
fn status_runs_as_root_and_skips_warnings() {
    let exec = ScriptedExecutor::new()
        .ok("agent status --json", "WARN: config deprecated\n{\"version\": \"7.61.0\"}\n");
    let status = AgentCli::new(&exec).status().unwrap();
    assert_eq!(status.version.as_deref(), Some("7.61.0"));
    assert_eq!(exec.commands(), vec![format!("sudo {} status --json", paths::AGENT_BIN)]);
}

#[test]
fn check_output_decodes_runs() {
    let exec = ScriptedExecutor::new().ok(
        "check nvidia_gpu --json",
        r#"[{"aggregator": {"metrics": [{"metric": "gpu.temperature", "points": [[1, 50]]}]}}]"#,
    );
    let runs = AgentCli::new(&exec).with_privilege(Privilege::User).check("nvidia_gpu").unwrap();
    assert_eq!(runs[0].metric_names(), vec!["gpu.temperature"]);
    assert!(!exec.commands()[0].starts_with("sudo"));
}

#[test]
fn check_names_are_validated() {
    let exec = ScriptedExecutor::new();
    let err = AgentCli::new(&exec).check("cpu; rm -rf /").expect_err("rejected");
    assert!(matches!(err, RemoteError::InvalidArgument(_)));
    assert!(exec.commands().is_empty());
}

#[test]
fn failing_command_is_an_error() {
    let exec = ScriptedExecutor::new()
        .on("status --json", vec![CommandOutput::failed(1, "agent not running")]);
    let err = AgentCli::new(&exec).security_status().expect_err("failed");
    assert!(err.to_string().contains("agent not running"));
}

#[test]
fn write_policy_then_reload() {
    let exec = ScriptedExecutor::new().ok("tee", "").ok("runtime policy reload", "");
    let cli = AgentCli::new(&exec);
    let policy = Policy::new(vec![AgentRule::new("e2e_rule", "exec.file.name == \"ls\"").unwrap()]);
    let path = cli.write_policy("e2e", &policy).unwrap();
    cli.reload_policies().unwrap();
    assert_eq!(path, "/etc/datadog-agent/runtime-security.d/e2e.policy");
    let commands = exec.commands();
    assert!(commands[0].contains("sudo tee '/etc/datadog-agent/runtime-security.d/e2e.policy'"));
    assert!(commands[0].contains("e2e_rule"));
    assert_eq!(commands[1], format!("sudo {} runtime policy reload", paths::SECURITY_AGENT_BIN));
}

#[test]
fn downloaded_policy_is_parsed() {
    let exec = ScriptedExecutor::new().ok(
        "runtime policy download",
        "version: 1.0.0\nrules:\n  - id: e2e_rule\n    expression: exec.file.name == \"ls\"\n",
    );
    let policy = AgentCli::new(&exec).download_policy().unwrap();
    assert!(policy.contains_rule("e2e_rule"));
}

#[test]
fn process_agent_status_and_check() {
    let exec = ScriptedExecutor::new()
        .ok("process-agent status --json", r#"{"expvars": {"enabled_checks": ["process"]}}"#)
        .ok("check process --json", r#"{"processes": [{"pid": 1}]}"#);
    let cli = AgentCli::new(&exec);
    assert!(cli.process_status().unwrap().check_enabled("process"));
    assert_eq!(cli.process_check("process").unwrap()["processes"][0]["pid"], 1);
}

#[test]
fn is_active_requires_active_state() {
    let exec = ScriptedExecutor::new()
        .ok("is-active 'datadog-agent.service'", "active\n")
        .on("is-active 'datadog-agent-exp.service'", vec![CommandOutput::failed(3, "")]);
    let cli = AgentCli::new(&exec);
    assert!(cli.is_active(paths::AGENT_UNIT).unwrap());
    assert!(!cli.is_active(paths::AGENT_EXP_UNIT).unwrap());
}
