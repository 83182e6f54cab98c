// crates/agent-e2e-suite/src/assertions.rs
// ============================================================================
// Module: Assertions
// Description: CollectT assertion helpers over the fake intake and test hosts.
// Purpose: One call per common check inside an `eventually` probe.
// Dependencies: agent-e2e-{core,clients,remote}
// ============================================================================

//! ## Overview
//! Each helper queries its source once, records failures on the given
//! [`CollectT`], and returns whether the check held. None of them poll; wrap
//! them in [`crate::BaseSuite::eventually`] or [`agent_e2e_core::eventually`].
//!
//! ```ignore
//! suite.eventually("metric", PollPolicy::standard(), |collect| {
//!     assert_metric_received(collect, &intake, &MetricFilter::named("system.load.1"));
//! })?;
//! ```

use agent_e2e_clients::FakeIntakeClient;
use agent_e2e_clients::MetricFilter;
use agent_e2e_core::CollectT;
use agent_e2e_remote::AgentCli;
use agent_e2e_remote::InstallerCli;
use agent_e2e_remote::RemoteExecutor;

// ============================================================================
// SECTION: Fake Intake
// ============================================================================

/// Checks that the fake intake holds at least one series matching `filter`.
pub fn assert_metric_received(
    collect: &mut CollectT,
    intake: &FakeIntakeClient,
    filter: &MetricFilter,
) -> bool {
    let Some(series) = collect.require_ok(intake.metrics(filter), "fake intake metrics") else {
        return false;
    };
    collect.check(!series.is_empty(), format!("no series matches metric {}", filter.name))
}

/// Checks that a log from `service` containing `needle` reached the fake
/// intake.
pub fn assert_log_received(
    collect: &mut CollectT,
    intake: &FakeIntakeClient,
    service: &str,
    needle: &str,
) -> bool {
    let Some(logs) = collect.require_ok(intake.logs(Some(service)), "fake intake logs") else {
        return false;
    };
    let found = logs.iter().any(|entry| entry.message.contains(needle));
    collect.check(found, format!("no {service} log contains '{needle}' ({} logs)", logs.len()))
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Checks that `check` ran at least once without errors per `agent status`.
pub fn assert_check_healthy(collect: &mut CollectT, agent: &AgentCli<'_>, check: &str) -> bool {
    let Some(status) = collect.require_ok(agent.status(), "agent status") else {
        return false;
    };
    let scheduled = !status.check_instances(check).is_empty();
    if !collect.check(scheduled, format!("check {check} is not scheduled")) {
        return false;
    }
    collect.check(status.check_healthy(check), format!("check {check} is not healthy"))
}

/// Checks that one run of `check` reports every metric in `metrics`.
pub fn assert_check_reports(
    collect: &mut CollectT,
    agent: &AgentCli<'_>,
    check: &str,
    metrics: &[&str],
) -> bool {
    let Some(runs) = collect.require_ok(agent.check(check), &format!("agent check {check}")) else {
        return false;
    };
    let reported: Vec<&str> = runs.iter().flat_map(|run| run.metric_names()).collect();
    let mut ok = collect.check(!runs.is_empty(), format!("check {check} produced no runs"));
    for metric in metrics {
        ok &= collect.check(
            reported.contains(metric),
            format!("check {check} did not report {metric}"),
        );
    }
    ok
}

/// Checks that the security agent reports `rule_id` as loaded.
pub fn assert_rule_loaded(collect: &mut CollectT, agent: &AgentCli<'_>, rule_id: &str) -> bool {
    let Some(status) = collect.require_ok(agent.security_status(), "security-agent status") else {
        return false;
    };
    collect.check(status.rule_loaded(rule_id), format!("rule {rule_id} is not loaded"))
}

/// Checks that every unit in `units` is active.
pub fn assert_units_active(collect: &mut CollectT, agent: &AgentCli<'_>, units: &[&str]) -> bool {
    let mut ok = true;
    for unit in units {
        ok &= match collect.require_ok(agent.is_active(unit), &format!("is-active {unit}")) {
            Some(active) => collect.check(active, format!("unit {unit} is not active")),
            None => false,
        };
    }
    ok
}

// ============================================================================
// SECTION: Host
// ============================================================================

/// Checks the versions behind a package's `stable` and `experiment` links.
///
/// `experiment: None` means no experiment is running: the link may be absent
/// or resolve to the stable version, as it does on an idle package.
pub fn assert_package_state(
    collect: &mut CollectT,
    installer: &InstallerCli<'_>,
    package: &str,
    stable: Option<&str>,
    experiment: Option<&str>,
) -> bool {
    let Some(state) =
        collect.require_ok(installer.package_state(package), &format!("{package} state"))
    else {
        return false;
    };
    let stable_ok =
        collect.check_eq(&stable, &state.stable.as_deref(), &format!("{package} stable version"));
    let experiment_ok = match experiment {
        Some(_) => collect.check_eq(
            &experiment,
            &state.experiment.as_deref(),
            &format!("{package} experiment version"),
        ),
        None => collect.check(
            !state.experiment_active(),
            format!(
                "{package} experiment is running {}",
                state.experiment.as_deref().unwrap_or_default()
            ),
        ),
    };
    stable_ok && experiment_ok
}

/// Checks that `path` exists on the host.
pub fn assert_file_exists(collect: &mut CollectT, exec: &dyn RemoteExecutor, path: &str) -> bool {
    let Some(exists) = collect.require_ok(exec.file_exists(path), &format!("stat {path}")) else {
        return false;
    };
    collect.check(exists, format!("{path} does not exist"))
}
