// crates/agent-e2e-suite/tests/cws.rs
// ============================================================================
// Module: CWS Rule Set Tests
// Description: Rule pairing, rollback, host policy, signals, and cleanup.
// Purpose: Ensure no backend rule outlives its suite.
// ============================================================================

//! CWS rule set tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use std::time::Duration;

use agent_e2e_core::AgentRule;
use agent_e2e_core::PollPolicy;
use agent_e2e_remote::AgentCli;
use agent_e2e_remote::CommandOutput;
use agent_e2e_suite::CwsRuleSet;
use agent_e2e_suite::SuiteError;
use common::FakeRuleApi;
use common::ScriptedExecutor;
use common::signal_for;

mod common;

fn rule(id: &str) -> AgentRule {
    AgentRule::new(id, format!("open.file.path == \"/tmp/{id}\""))
        .unwrap()
        .with_description(format!("open of /tmp/{id}"))
}

fn fast_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(200), Duration::from_millis(1))
}

const LOADED_STATUS: &str = r#"{"runtimeSecurityStatus": {"connected": true, "policiesStatus": [
    {"name": "e2e", "source": "file", "rules": [
        {"id": "e2e_open", "status": "loaded"},
        {"id": "e2e_exec", "status": "loaded"}
    ]}
]}}"#;

const PARTIAL_STATUS: &str = r#"{"runtimeSecurityStatus": {"policiesStatus": [
    {"name": "e2e", "rules": [{"id": "e2e_open", "status": "loaded"}]}
]}}"#;

#[test]
fn rules_are_created_in_pairs() {
    let api = FakeRuleApi::default();
    let mut rules = CwsRuleSet::new(&api, "e2e");
    let deployed = rules.add_rule(rule("e2e_open")).unwrap().clone();
    assert_eq!(deployed.agent_rule_backend_id, "ar-1");
    assert_eq!(deployed.signal_rule_id, "sr-2");
    assert_eq!(
        *api.signal_rules.lock().unwrap(),
        vec![("sr-2".to_string(), "e2e_open".to_string())]
    );
    assert_eq!(rules.rules().len(), 1);
    assert!(rules.policy().contains_rule("e2e_open"));
}

#[test]
fn failed_signal_rule_rolls_back_agent_rule() {
    let api = FakeRuleApi {
        fail_signal_create: true,
        ..FakeRuleApi::default()
    };
    let mut rules = CwsRuleSet::new(&api, "e2e");
    let err = rules.add_rule(rule("e2e_open")).expect_err("signal creation fails");
    assert!(matches!(err, SuiteError::Client(_)));
    assert!(api.agent_rules.lock().unwrap().is_empty());
    assert!(rules.rules().is_empty());
    assert!(rules.orphaned_agent_rules().is_empty());
}

#[test]
fn failed_rollback_keeps_agent_rule_for_cleanup() {
    let api = FakeRuleApi {
        fail_signal_create: true,
        fail_deletes: true,
        ..FakeRuleApi::default()
    };
    let mut rules = CwsRuleSet::new(&api, "e2e");
    let err = rules.add_rule(rule("e2e_open")).expect_err("signal creation fails");
    assert!(matches!(err, SuiteError::Client(_)));
    assert_eq!(*api.agent_rules.lock().unwrap(), vec![("ar-1".to_string(), "e2e_open".to_string())]);
    assert_eq!(rules.orphaned_agent_rules(), ["ar-1".to_string()]);

    let failures = rules.cleanup(None);
    assert_eq!(failures, vec!["delete agent rule ar-1: invalid request: cannot delete ar-1".to_string()]);
    assert!(rules.orphaned_agent_rules().is_empty());
}

#[test]
fn deploy_writes_policy_and_waits_for_load() {
    let api = FakeRuleApi::default();
    let mut rules = CwsRuleSet::new(&api, "e2e");
    rules.add_rule(rule("e2e_open")).unwrap();
    rules.add_rule(rule("e2e_exec")).unwrap();

    let exec = ScriptedExecutor::new()
        .ok("tee", "")
        .ok("runtime policy reload", "")
        .on(
            "security-agent status --json",
            vec![CommandOutput::ok(PARTIAL_STATUS), CommandOutput::ok(LOADED_STATUS)],
        );
    let agent = AgentCli::new(&exec);
    let path = rules.deploy(&agent).unwrap();
    assert_eq!(path, "/etc/datadog-agent/runtime-security.d/e2e.policy");
    assert_eq!(rules.wait_for_rules_loaded(&agent, fast_policy()).unwrap(), 2);

    let commands = exec.commands();
    assert!(commands[0].contains("e2e_open") && commands[0].contains("e2e_exec"));
    assert!(commands[1].ends_with("runtime policy reload"));
}

#[test]
fn rules_never_loaded_time_out_with_names() {
    let api = FakeRuleApi::default();
    let mut rules = CwsRuleSet::new(&api, "e2e");
    rules.add_rule(rule("e2e_exec")).unwrap();
    let exec = ScriptedExecutor::new().ok("security-agent status --json", PARTIAL_STATUS);

    let err = rules
        .wait_for_rules_loaded(&AgentCli::new(&exec), fast_policy())
        .expect_err("rule never loads");
    let SuiteError::Timeout(timeout) = err else {
        unreachable!("expected a timeout");
    };
    assert_eq!(timeout.last_failures, vec!["rule e2e_exec is not loaded".to_string()]);
}

#[test]
fn signal_wait_matches_rule_id() {
    let api = FakeRuleApi::default();
    api.signal_batches.lock().unwrap().extend([
        Vec::new(),
        vec![signal_for("other_rule")],
        vec![signal_for("other_rule"), signal_for("e2e_open")],
    ]);
    let rules = CwsRuleSet::new(&api, "e2e");
    let signal =
        rules.wait_for_signal("e2e_open", Duration::from_secs(600), fast_policy()).unwrap();
    assert_eq!(signal.id, "sig-e2e_open");
    assert_eq!(signal.agent_rule_id(), Some("e2e_open"));
}

#[test]
fn cleanup_deletes_everything_best_effort() {
    let api = FakeRuleApi::default();
    let mut rules = CwsRuleSet::new(&api, "e2e");
    rules.add_rule(rule("e2e_open")).unwrap();
    rules.add_rule(rule("e2e_exec")).unwrap();
    let exec = ScriptedExecutor::new().ok("rm -f", "");

    let failures = rules.cleanup(Some(&AgentCli::new(&exec)));
    assert!(failures.is_empty());
    assert!(api.agent_rules.lock().unwrap().is_empty());
    assert!(api.signal_rules.lock().unwrap().is_empty());
    assert!(rules.rules().is_empty());
    assert_eq!(
        exec.commands(),
        vec!["sudo rm -f '/etc/datadog-agent/runtime-security.d/e2e.policy'".to_string()]
    );
}

#[test]
fn cleanup_reports_every_failure() {
    let api = FakeRuleApi::default();
    let mut rules = CwsRuleSet::new(&api, "e2e");
    rules.add_rule(rule("e2e_open")).unwrap();
    rules.add_rule(rule("e2e_exec")).unwrap();
    let broken = FakeRuleApi {
        fail_deletes: true,
        ..FakeRuleApi::default()
    };
    let mut leftovers = CwsRuleSet::new(&broken, "e2e");
    leftovers.add_rule(rule("e2e_open")).unwrap();
    leftovers.add_rule(rule("e2e_exec")).unwrap();

    let failures = leftovers.cleanup(None);
    assert_eq!(failures.len(), 4);
    assert!(failures[0].starts_with("delete signal rule sr-4"));
    assert!(failures[1].starts_with("delete agent rule ar-3"));
    assert!(rules.cleanup(None).is_empty());
}
