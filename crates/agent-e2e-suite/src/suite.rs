// crates/agent-e2e-suite/src/suite.rs
// ============================================================================
// Module: Suite Lifecycle
// Description: Base suite state, the suite trait, and the sequential runner.
// Purpose: Provision once, run test methods in order, and always clean up.
// Dependencies: agent-e2e-{core,config,clients,remote,provision}, serde
// ============================================================================

//! ## Overview
//! [`BaseSuite`] holds what every suite needs: its plan, configuration,
//! event sink, the provisioned environment, and a cleanup stack. Client and
//! executor accessors derive from the environment and configuration.
//!
//! [`run_suite`] phases:
//! 1. Provision. Failure is fatal and nothing else runs.
//! 2. [`Suite::setup`]. Failure is fatal; teardown still runs.
//! 3. Every [`TestCase`], sequentially, with panics caught per test.
//! 4. [`Suite::teardown`], the cleanup stack, then environment destruction,
//!    skipped when `stack.keep_on_failure` is set and a test failed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use agent_e2e_clients::BackendClient;
use agent_e2e_clients::FakeIntakeClient;
use agent_e2e_config::HarnessConfig;
use agent_e2e_core::CollectT;
use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use agent_e2e_core::PollEvents;
use agent_e2e_core::PollPolicy;
use agent_e2e_core::eventually_observed;
use agent_e2e_core::events::duration_millis;
use agent_e2e_provision::Orchestrator;
use agent_e2e_provision::ProvisionPlan;
use agent_e2e_provision::ProvisionedEnvironment;
use agent_e2e_provision::apply_plan;
use agent_e2e_provision::destroy_environment;
use agent_e2e_remote::LoggedExecutor;
use agent_e2e_remote::SshExecutor;
use serde::Serialize;

use crate::artifacts::TestArtifacts;
use crate::artifacts::TestReporter;
use crate::artifacts::default_run_root;
use crate::cleanup::CleanupStack;
use crate::error::SuiteError;

// ============================================================================
// SECTION: Base Suite
// ============================================================================

/// SSH user when the environment does not name one.
const DEFAULT_SSH_USER: &str = "ubuntu";

/// State shared by every suite.
pub struct BaseSuite {
    /// Suite name.
    name: String,
    /// Plan applied during provisioning.
    plan: ProvisionPlan,
    /// Harness configuration.
    config: HarnessConfig,
    /// Event destination.
    sink: Arc<dyn EventSink>,
    /// Environment, once provisioned.
    environment: Option<ProvisionedEnvironment>,
    /// Pending cleanup actions.
    cleanup: CleanupStack,
    /// Directory for this suite's artifacts.
    artifacts_root: PathBuf,
}

impl BaseSuite {
    /// Creates suite state for `plan`.
    ///
    /// The plan is renamed to the configured stack name for `name`, so
    /// suites sharing a builder still provision distinct stacks.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mut plan: ProvisionPlan,
        config: HarnessConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let name = name.into();
        plan.name = config.stack.stack_name(&name);
        let artifacts_root = config.artifacts.run_root_or(&default_run_root()).join(&plan.name);
        Self {
            name,
            plan,
            config,
            sink,
            environment: None,
            cleanup: CleanupStack::new(),
            artifacts_root,
        }
    }

    /// Returns the suite name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the provisioning plan.
    #[must_use]
    pub const fn plan(&self) -> &ProvisionPlan {
        &self.plan
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the event sink.
    #[must_use]
    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    /// Returns the directory holding this suite's artifacts.
    #[must_use]
    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    /// Returns the provisioned environment.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::NotProvisioned`] before provisioning.
    pub fn environment(&self) -> Result<&ProvisionedEnvironment, SuiteError> {
        self.environment.as_ref().ok_or_else(|| SuiteError::NotProvisioned(self.name.clone()))
    }

    /// Applies the plan through `orchestrator`.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Provision`] when any step fails.
    pub fn provision(
        &mut self,
        orchestrator: &mut dyn Orchestrator,
    ) -> Result<&ProvisionedEnvironment, SuiteError> {
        let environment = apply_plan(&self.plan, orchestrator, self.sink.as_ref())?;
        Ok(&*self.environment.insert(environment))
    }

    /// Registers a cleanup action, run LIFO during teardown.
    pub fn defer(
        &mut self,
        label: impl Into<String>,
        action: impl FnOnce() -> Result<(), SuiteError> + 'static,
    ) {
        self.cleanup.push(label, action);
    }

    /// Returns `policy` with the configured timeout floor applied.
    #[must_use]
    pub fn policy(&self, policy: PollPolicy) -> PollPolicy {
        self.config.polling.resolve(policy)
    }

    /// Polls `probe` under `policy`, logging every attempt as `label`.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Timeout`] with the last failures.
    pub fn eventually<F>(&self, label: &str, policy: PollPolicy, probe: F) -> Result<u32, SuiteError>
    where
        F: FnMut(&mut CollectT),
    {
        let observer = PollEvents::new(self.sink.as_ref(), label);
        Ok(eventually_observed(self.policy(policy), &observer, probe)?)
    }

    /// Returns a fake intake client, preferring the configured URL over the
    /// provisioned one.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] when no URL is known or the client cannot be
    /// built.
    pub fn fake_intake(&self) -> Result<FakeIntakeClient, SuiteError> {
        let url = match self.config.fake_intake.url()? {
            Some(url) => url.to_string(),
            None => self
                .environment()?
                .fake_intake_url()
                .ok_or_else(|| SuiteError::MissingResource("fake intake url".to_string()))?
                .to_string(),
        };
        Ok(FakeIntakeClient::new(&url)?)
    }

    /// Returns a backend client from the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] when credentials are missing or the client
    /// cannot be built.
    pub fn backend(&self) -> Result<BackendClient, SuiteError> {
        let credentials = self.config.backend.credentials()?;
        let base_url = self.config.backend.api_base_url()?;
        Ok(BackendClient::new(base_url.as_str(), credentials.api_key, credentials.app_key)?)
    }

    /// Returns an SSH executor for the provisioned VM with command logging.
    ///
    /// The API key, when configured, is masked in logged commands.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] when the environment has no VM.
    pub fn host_executor(&self) -> Result<LoggedExecutor<SshExecutor>, SuiteError> {
        let environment = self.environment()?;
        let host = environment
            .host()
            .ok_or_else(|| SuiteError::MissingResource("vm host".to_string()))?;
        let user = environment.output("vm", "user").unwrap_or(DEFAULT_SSH_USER);
        let executor = LoggedExecutor::new(SshExecutor::new(host, user), Arc::clone(&self.sink));
        Ok(match &self.config.backend.api_key {
            Some(api_key) => executor.with_secret(api_key.as_str()),
            None => executor,
        })
    }

    /// Returns a reporter for `test` under the suite's artifact directory.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Artifacts`] when the directory cannot be created.
    pub fn test_reporter(&self, test: &str) -> Result<TestReporter, SuiteError> {
        TestReporter::new(&self.artifacts_root, test)
            .map_err(|err| SuiteError::Artifacts(err.to_string()))
    }
}

// ============================================================================
// SECTION: Suite Trait
// ============================================================================

/// Test method: receives the suite and fails by returning an error.
pub type TestFn<S> = fn(&mut S) -> Result<(), SuiteError>;

/// Named test method.
pub struct TestCase<S> {
    /// Test name.
    pub name: &'static str,
    /// Test body.
    pub run: TestFn<S>,
}

impl<S> TestCase<S> {
    /// Creates a test case.
    #[must_use]
    pub const fn new(name: &'static str, run: TestFn<S>) -> Self {
        Self {
            name,
            run,
        }
    }
}

/// A suite of test methods sharing one environment.
pub trait Suite {
    /// Returns the embedded base state.
    fn base(&self) -> &BaseSuite;

    /// Returns the embedded base state mutably.
    fn base_mut(&mut self) -> &mut BaseSuite;

    /// Runs after provisioning, before the first test.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] to abort the suite.
    fn setup(&mut self) -> Result<(), SuiteError> {
        Ok(())
    }

    /// Runs after the last test, before the cleanup stack.
    ///
    /// # Errors
    ///
    /// Errors are logged and otherwise ignored.
    fn teardown(&mut self) -> Result<(), SuiteError> {
        Ok(())
    }

    /// Returns the test methods in execution order.
    fn tests() -> Vec<TestCase<Self>>
    where
        Self: Sized;
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Outcome of one test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum TestOutcome {
    /// The test returned `Ok`.
    Passed,
    /// The test returned an error.
    Failed(String),
    /// The test panicked.
    Panicked(String),
}

impl TestOutcome {
    /// Returns the outcome label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }

    /// Returns true for [`TestOutcome::Passed`].
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Result of one test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    /// Test name.
    pub name: String,
    /// Outcome.
    pub outcome: TestOutcome,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Results of a suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    /// Suite name.
    pub suite: String,
    /// Per-test results in execution order.
    pub results: Vec<TestResult>,
    /// Cleanup failures, logged and ignored.
    pub cleanup_failures: usize,
}

impl SuiteReport {
    /// Returns the number of passed tests.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|result| result.outcome.passed()).count()
    }

    /// Returns the number of failed or panicked tests.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// Returns true when every test passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Provisions, sets up, runs every test of `suite`, and tears down.
///
/// # Errors
///
/// Returns [`SuiteError`] when provisioning or setup fails. Test failures
/// are reported in the [`SuiteReport`], not as an error.
pub fn run_suite<S: Suite>(
    suite: &mut S,
    orchestrator: &mut dyn Orchestrator,
) -> Result<SuiteReport, SuiteError> {
    let name = suite.base().name().to_string();
    let sink = Arc::clone(&suite.base().sink);
    sink.emit(&HarnessEvent::SuiteStarted {
        suite: name.clone(),
        environment: suite.base().plan().environment.to_string(),
    });

    if let Err(err) = suite.base_mut().provision(orchestrator) {
        suite.base_mut().cleanup.run(&name, sink.as_ref());
        finish(sink.as_ref(), &name, &[]);
        return Err(err);
    }
    if let Err(err) = suite.setup() {
        teardown(suite, orchestrator, true);
        finish(sink.as_ref(), &name, &[]);
        return Err(err);
    }

    let mut results = Vec::new();
    for case in S::tests() {
        results.push(run_test(suite, &case));
    }

    let any_failed = results.iter().any(|result| !result.outcome.passed());
    let cleanup_failures = teardown(suite, orchestrator, any_failed);
    let report = SuiteReport {
        suite: name.clone(),
        results,
        cleanup_failures,
    };
    let written = TestArtifacts::new(suite.base().artifacts_root(), "suite")
        .and_then(|artifacts| artifacts.write_json("report.json", &report));
    if let Err(err) = written {
        sink.emit(&HarnessEvent::ArtifactFailed {
            suite: name.clone(),
            artifact: "suite report".to_string(),
            error: err.to_string(),
        });
    }
    finish(sink.as_ref(), &name, &report.results);
    Ok(report)
}

/// Runs one test with panic isolation and a summary artifact.
fn run_test<S: Suite>(suite: &mut S, case: &TestCase<S>) -> TestResult {
    let name = suite.base().name().to_string();
    let sink = Arc::clone(&suite.base().sink);
    sink.emit(&HarnessEvent::TestStarted {
        suite: name.clone(),
        test: case.name.to_string(),
    });
    let reporter = suite.base().test_reporter(case.name);
    let started = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(|| (case.run)(suite))) {
        Ok(Ok(())) => TestOutcome::Passed,
        Ok(Err(err)) => TestOutcome::Failed(err.to_string()),
        Err(payload) => TestOutcome::Panicked(panic_message(payload.as_ref())),
    };
    let duration_ms = duration_millis(started.elapsed());
    match reporter {
        Ok(mut reporter) => {
            let notes = match &outcome {
                TestOutcome::Passed => Vec::new(),
                TestOutcome::Failed(message) | TestOutcome::Panicked(message) => {
                    vec![message.clone()]
                }
            };
            if let Err(err) = reporter.finish(outcome.label(), notes, Vec::new()) {
                emit_artifact_failure(sink.as_ref(), &name, case.name, &err.to_string());
            }
        }
        Err(err) => emit_artifact_failure(sink.as_ref(), &name, case.name, &err.to_string()),
    }
    sink.emit(&HarnessEvent::TestFinished {
        suite: name,
        test: case.name.to_string(),
        outcome: outcome.label().to_string(),
        duration_ms,
    });
    TestResult {
        name: case.name.to_string(),
        outcome,
        duration_ms,
    }
}

/// Runs suite teardown, the cleanup stack, and environment destruction.
///
/// Returns the number of failures, each already logged.
fn teardown<S: Suite>(suite: &mut S, orchestrator: &mut dyn Orchestrator, failed: bool) -> usize {
    let name = suite.base().name().to_string();
    let sink = Arc::clone(&suite.base().sink);
    let mut failures = 0;
    let teardown_error = match catch_unwind(AssertUnwindSafe(|| suite.teardown())) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(payload) => Some(format!("panicked: {}", panic_message(payload.as_ref()))),
    };
    if let Some(error) = teardown_error {
        failures += 1;
        sink.emit(&HarnessEvent::CleanupFailed {
            suite: name.clone(),
            action: "suite teardown".to_string(),
            error,
        });
    }
    let base = suite.base_mut();
    failures += base.cleanup.run(&name, sink.as_ref());
    let keep = failed && base.config.stack.keep_on_failure;
    if let Some(environment) = base.environment.take() {
        if keep {
            return failures;
        }
        for err in destroy_environment(&environment, orchestrator) {
            failures += 1;
            sink.emit(&HarnessEvent::CleanupFailed {
                suite: name.clone(),
                action: format!("destroy {}", environment.name),
                error: err.to_string(),
            });
        }
    }
    failures
}

/// Emits the suite-finished event.
fn finish(sink: &dyn EventSink, suite: &str, results: &[TestResult]) {
    let passed = results.iter().filter(|result| result.outcome.passed()).count();
    sink.emit(&HarnessEvent::SuiteFinished {
        suite: suite.to_string(),
        passed,
        failed: results.len() - passed,
    });
}

/// Logs an artifact write failure without failing the test.
fn emit_artifact_failure(sink: &dyn EventSink, suite: &str, test: &str, error: &str) {
    sink.emit(&HarnessEvent::ArtifactFailed {
        suite: suite.to_string(),
        artifact: format!("artifacts for {test}"),
        error: error.to_string(),
    });
}

/// Extracts a message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}
