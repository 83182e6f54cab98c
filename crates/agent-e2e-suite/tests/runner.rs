// crates/agent-e2e-suite/tests/runner.rs
// ============================================================================
// Module: Suite Runner Tests
// Description: Phase ordering, test isolation, teardown, and retention.
// Purpose: Ensure failures stay contained and cleanup always runs.
// ============================================================================

//! Suite lifecycle tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]
#![allow(clippy::panic, reason = "Tests panic inside test methods on purpose.")]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use agent_e2e_core::PollPolicy;
use agent_e2e_provision::AgentInstallParams;
use agent_e2e_provision::ProvisionError;
use agent_e2e_provision::RecordingOrchestrator;
use agent_e2e_provision::VmParams;
use agent_e2e_provision::host_plan;
use agent_e2e_suite::BaseSuite;
use agent_e2e_suite::Suite;
use agent_e2e_suite::SuiteError;
use agent_e2e_suite::TestCase;
use agent_e2e_suite::TestOutcome;
use agent_e2e_suite::run_suite;
use common::RecordingSink;
use common::config_with_run_root;
use serde_json::Value;

mod common;

// ============================================================================
// SECTION: Fixture Suite
// ============================================================================

/// Suite with one passing, failing, panicking, and polling test.
struct DemoSuite {
    base: BaseSuite,
    log: Arc<Mutex<Vec<String>>>,
    fail_setup: bool,
}

impl DemoSuite {
    fn new(run_root: &Path, keep_on_failure: bool, sink: Arc<dyn EventSink>) -> Self {
        let plan = host_plan("e2e-demo", VmParams::default(), AgentInstallParams::new()).unwrap();
        Self {
            base: BaseSuite::new(
                "demo",
                plan,
                config_with_run_root(run_root, keep_on_failure),
                sink,
            ),
            log: Arc::default(),
            fail_setup: false,
        }
    }

    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn test_host_is_known(&mut self) -> Result<(), SuiteError> {
        let host = self.base.environment()?.host().map(ToString::to_string);
        assert_eq!(host.as_deref(), Some("e2e-demo-vm.internal"));
        self.record("host");
        Ok(())
    }

    fn test_metric_missing(&mut self) -> Result<(), SuiteError> {
        self.record("metric");
        Err(SuiteError::Assertion("metric missing".to_string()))
    }

    fn test_panics(&mut self) -> Result<(), SuiteError> {
        self.record("panic");
        panic!("agent crashed");
    }

    fn test_polls_until_ready(&mut self) -> Result<(), SuiteError> {
        let mut attempts = 0;
        let policy = PollPolicy::new(Duration::from_secs(5), Duration::from_millis(1));
        self.base.eventually("agent ready", policy, |collect| {
            attempts += 1;
            collect.check(attempts >= 2, "agent not ready");
        })?;
        self.record("poll");
        Ok(())
    }
}

impl Suite for DemoSuite {
    fn base(&self) -> &BaseSuite {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseSuite {
        &mut self.base
    }

    fn setup(&mut self) -> Result<(), SuiteError> {
        if self.fail_setup {
            return Err(SuiteError::Assertion("setup refused".to_string()));
        }
        let log = Arc::clone(&self.log);
        self.base.defer("setup cleanup", move || {
            log.lock().unwrap().push("setup cleanup".to_string());
            Ok(())
        });
        self.record("setup");
        Ok(())
    }

    fn teardown(&mut self) -> Result<(), SuiteError> {
        self.record("teardown");
        Ok(())
    }

    fn tests() -> Vec<TestCase<Self>> {
        vec![
            TestCase::new("test_host_is_known", Self::test_host_is_known),
            TestCase::new("test_metric_missing", Self::test_metric_missing),
            TestCase::new("test_panics", Self::test_panics),
            TestCase::new("test_polls_until_ready", Self::test_polls_until_ready),
        ]
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn failures_are_isolated_and_everything_is_torn_down() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::shared();
    let mut suite = DemoSuite::new(dir.path(), false, sink.clone());
    let mut orchestrator = RecordingOrchestrator::new();

    let report = run_suite(&mut suite, &mut orchestrator).unwrap();

    let outcomes: Vec<&TestOutcome> = report.results.iter().map(|r| &r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            &TestOutcome::Passed,
            &TestOutcome::Failed("assertion failed: metric missing".to_string()),
            &TestOutcome::Panicked("agent crashed".to_string()),
            &TestOutcome::Passed,
        ]
    );
    assert_eq!((report.passed(), report.failed()), (2, 2));
    assert!(!report.success());
    assert_eq!(report.cleanup_failures, 0);
    assert_eq!(
        suite.log(),
        vec!["setup", "host", "metric", "panic", "poll", "teardown", "setup cleanup"]
    );
    assert_eq!(orchestrator.destroyed(), ["agent", "fake-intake", "vm"]);
    assert!(suite.base().environment().is_err());

    let events = sink.events();
    assert_eq!(
        events.first(),
        Some(&HarnessEvent::SuiteStarted {
            suite: "demo".to_string(),
            environment: "host".to_string(),
        })
    );
    assert_eq!(
        events.last(),
        Some(&HarnessEvent::SuiteFinished {
            suite: "demo".to_string(),
            passed: 2,
            failed: 2,
        })
    );
    let finished: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            HarnessEvent::TestFinished {
                outcome,
                ..
            } => Some(outcome.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec!["passed", "failed", "panicked", "passed"]);
    let poll_attempts = events
        .iter()
        .filter(|event| {
            matches!(event, HarnessEvent::PollAttempt { label, .. } if label == "agent ready")
        })
        .count();
    assert_eq!(poll_attempts, 2);
    assert!(events.iter().any(|event| matches!(event, HarnessEvent::StepApplied { .. })));
}

#[test]
fn artifacts_are_written_per_test_and_per_suite() {
    let dir = tempfile::tempdir().unwrap();
    let mut suite = DemoSuite::new(dir.path(), false, RecordingSink::shared());
    run_suite(&mut suite, &mut RecordingOrchestrator::new()).unwrap();

    let root = dir.path().join("e2e-demo");
    let failed = read_json(&root.join("test_metric_missing").join("summary.json"));
    assert_eq!(failed["status"], "failed");
    assert_eq!(failed["notes"][0], "assertion failed: metric missing");
    let panicked = read_json(&root.join("test_panics").join("summary.json"));
    assert_eq!(panicked["status"], "panicked");

    let report = read_json(&root.join("suite").join("report.json"));
    assert_eq!(report["suite"], "demo");
    assert_eq!(report["results"][2]["outcome"]["status"], "panicked");
    assert_eq!(report["results"][2]["outcome"]["message"], "agent crashed");
}

#[test]
fn failed_suite_keeps_environment_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut suite = DemoSuite::new(dir.path(), true, RecordingSink::shared());
    let mut orchestrator = RecordingOrchestrator::new();
    let report = run_suite(&mut suite, &mut orchestrator).unwrap();
    assert!(!report.success());
    assert!(orchestrator.destroyed().is_empty());
    assert!(suite.log().contains(&"setup cleanup".to_string()));
}

#[test]
fn provisioning_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::shared();
    let mut suite = DemoSuite::new(dir.path(), false, sink.clone());
    let mut orchestrator = RecordingOrchestrator::new().fail_apply("agent");

    let err = run_suite(&mut suite, &mut orchestrator).expect_err("provisioning fails");
    let SuiteError::Provision(ProvisionError::StepFailed {
        step,
        ..
    }) = err
    else {
        unreachable!("expected a step failure");
    };
    assert_eq!(step, "agent");
    assert!(suite.log().is_empty());
    assert!(!sink.events().iter().any(|event| matches!(event, HarnessEvent::TestStarted { .. })));
}

#[test]
fn setup_failure_still_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let mut suite = DemoSuite::new(dir.path(), false, RecordingSink::shared());
    suite.fail_setup = true;
    let mut orchestrator = RecordingOrchestrator::new();

    let err = run_suite(&mut suite, &mut orchestrator).expect_err("setup fails");
    assert!(err.to_string().contains("setup refused"));
    assert_eq!(suite.log(), vec!["teardown"]);
    assert_eq!(orchestrator.destroyed(), ["agent", "fake-intake", "vm"]);
}

#[test]
fn destroy_failures_are_logged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::shared();
    let mut suite = DemoSuite::new(dir.path(), false, sink.clone());
    let mut orchestrator = RecordingOrchestrator::new().fail_destroy("fake-intake");

    let report = run_suite(&mut suite, &mut orchestrator).unwrap();
    assert_eq!(report.cleanup_failures, 1);
    assert_eq!(orchestrator.destroyed(), ["agent", "vm"]);
    let failures = sink.cleanup_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "destroy e2e-demo");
    assert!(failures[0].1.contains("fake-intake"));
}

#[test]
fn unwritable_artifacts_are_not_cleanup_failures() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("not-a-dir");
    fs::write(&blocked, b"").unwrap();
    let sink = RecordingSink::shared();
    let mut suite = DemoSuite::new(&blocked, false, sink.clone());

    let report = run_suite(&mut suite, &mut RecordingOrchestrator::new()).unwrap();
    assert_eq!(report.cleanup_failures, 0);
    assert!(sink.cleanup_failures().is_empty());
    let artifacts: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HarnessEvent::ArtifactFailed {
                artifact,
                ..
            } => Some(artifact),
            _ => None,
        })
        .collect();
    assert_eq!(
        artifacts,
        vec![
            "artifacts for test_host_is_known",
            "artifacts for test_metric_missing",
            "artifacts for test_panics",
            "artifacts for test_polls_until_ready",
            "suite report",
        ]
    );
}

#[test]
fn configured_prefix_names_the_provisioned_stack() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::shared();
    let mut config = config_with_run_root(dir.path(), false);
    config.stack.name_prefix = "ci42".to_string();
    let plan = host_plan("any-name", VmParams::default(), AgentInstallParams::new()).unwrap();
    let mut base = BaseSuite::new("Demo", plan, config, sink.clone());
    assert_eq!(base.plan().name, "ci42-demo");
    assert_eq!(base.artifacts_root(), dir.path().join("ci42-demo"));

    let environment = base.provision(&mut RecordingOrchestrator::new()).unwrap();
    assert_eq!(environment.name, "ci42-demo");
    assert_eq!(environment.host(), Some("ci42-demo-vm.internal"));
    let stacks: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HarnessEvent::StepApplied {
                stack,
                ..
            } => Some(stack),
            _ => None,
        })
        .collect();
    assert_eq!(stacks, vec!["ci42-demo"; 3]);
}

#[test]
fn accessors_require_provisioning() {
    let dir = tempfile::tempdir().unwrap();
    let mut suite = DemoSuite::new(dir.path(), false, RecordingSink::shared());
    assert!(matches!(suite.base().environment(), Err(SuiteError::NotProvisioned(_))));
    assert!(suite.base().host_executor().is_err());

    suite.base_mut().provision(&mut RecordingOrchestrator::new()).unwrap();
    let executor = suite.base().host_executor().unwrap();
    let argv = executor.inner().argv("true");
    assert!(argv.contains(&"ubuntu@e2e-demo-vm.internal".to_string()));
    let intake = suite.base().fake_intake().unwrap();
    assert_eq!(intake.base_url().as_str(), "http://e2e-demo-fakeintake.internal/");
    assert!(matches!(suite.base().backend(), Err(SuiteError::Config(_))));
}
