// crates/agent-e2e-suite/tests/common/mod.rs
// =============================================================================
// Module: Suite Test Helpers
// Description: Event recorder, scripted executor, and in-memory rule API.
// Purpose: Drive suites and helpers without hosts or a backend.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::unwrap_used, reason = "Test helpers unwrap uncontended locks.")]

use std::collections::VecDeque;
use std::path::Path;
use std::thread;
use std::thread::JoinHandle;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use agent_e2e_clients::ClientError;
use agent_e2e_clients::RuleApi;
use agent_e2e_clients::SecuritySignal;
use agent_e2e_config::HarnessConfig;
use agent_e2e_core::AgentRule;
use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use agent_e2e_core::SignalRuleSpec;
use agent_e2e_remote::CommandOutput;
use agent_e2e_remote::RemoteError;
use agent_e2e_remote::RemoteExecutor;
use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HarnessEvent>>,
}

impl RecordingSink {
    /// Creates a shared recorder.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the recorded events.
    pub fn events(&self) -> Vec<HarnessEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns `(action, error)` for every cleanup failure.
    pub fn cleanup_failures(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HarnessEvent::CleanupFailed {
                    action,
                    error,
                    ..
                } => Some((action, error)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &HarnessEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration writing artifacts under `run_root`.
pub fn config_with_run_root(run_root: &Path, keep_on_failure: bool) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.artifacts.run_root = Some(run_root.to_path_buf());
    config.stack.keep_on_failure = keep_on_failure;
    config
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Executor answering commands from a script.
///
/// Rules match commands containing their pattern; the last output of a rule
/// repeats once its queue is drained.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    /// Creates an executor with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands containing `pattern` with `outputs`, in order.
    pub fn on(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push((pattern.to_string(), outputs.into()));
        self
    }

    /// Answers commands containing `pattern` with a successful `stdout`.
    pub fn ok(self, pattern: &str, stdout: &str) -> Self {
        self.on(pattern, vec![CommandOutput::ok(stdout)])
    }

    /// Returns every command run so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn host(&self) -> &str {
        "scripted-host"
    }

    fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        self.commands.lock().unwrap().push(command.to_string());
        let mut rules = self.rules.lock().unwrap();
        let Some((_, outputs)) = rules.iter_mut().find(|(pattern, _)| command.contains(pattern))
        else {
            return Ok(CommandOutput::failed(127, format!("unscripted command: {command}")));
        };
        let output = if outputs.len() > 1 { outputs.pop_front() } else { outputs.front().cloned() };
        Ok(output.unwrap_or_default())
    }
}

// ============================================================================
// SECTION: Rule API
// ============================================================================

/// In-memory backend rule store.
#[derive(Default)]
pub struct FakeRuleApi {
    /// Live agent rules as `(backend id, rule id)`.
    pub agent_rules: Mutex<Vec<(String, String)>>,
    /// Live signal rules as `(backend id, agent rule id)`.
    pub signal_rules: Mutex<Vec<(String, String)>>,
    /// Signals returned by searches, one batch per call.
    pub signal_batches: Mutex<VecDeque<Vec<SecuritySignal>>>,
    /// Fail signal rule creation.
    pub fail_signal_create: bool,
    /// Fail every delete.
    pub fail_deletes: bool,
    /// Last id handed out.
    pub next_id: Mutex<u32>,
}

impl FakeRuleApi {
    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{next}")
    }
}

impl RuleApi for FakeRuleApi {
    fn create_agent_rule(&self, rule: &AgentRule) -> Result<String, ClientError> {
        let id = self.next_id("ar");
        self.agent_rules.lock().unwrap().push((id.clone(), rule.id.clone()));
        Ok(id)
    }

    fn delete_agent_rule(&self, id: &str) -> Result<(), ClientError> {
        if self.fail_deletes {
            return Err(ClientError::InvalidRequest(format!("cannot delete {id}")));
        }
        self.agent_rules.lock().unwrap().retain(|(backend_id, _)| backend_id != id);
        Ok(())
    }

    fn create_signal_rule(&self, spec: &SignalRuleSpec) -> Result<String, ClientError> {
        if self.fail_signal_create {
            return Err(ClientError::InvalidRequest("signal rules disabled".to_string()));
        }
        let id = self.next_id("sr");
        self.signal_rules.lock().unwrap().push((id.clone(), spec.agent_rule_id.clone()));
        Ok(id)
    }

    fn delete_signal_rule(&self, id: &str) -> Result<(), ClientError> {
        if self.fail_deletes {
            return Err(ClientError::InvalidRequest(format!("cannot delete {id}")));
        }
        self.signal_rules.lock().unwrap().retain(|(backend_id, _)| backend_id != id);
        Ok(())
    }

    fn search_signals(
        &self,
        _query: &str,
        _window: Duration,
    ) -> Result<Vec<SecuritySignal>, ClientError> {
        let mut batches = self.signal_batches.lock().unwrap();
        let batch = if batches.len() > 1 { batches.pop_front() } else { batches.front().cloned() };
        Ok(batch.unwrap_or_default())
    }
}

/// Signal raised by agent rule `rule_id`.
pub fn signal_for(rule_id: &str) -> SecuritySignal {
    SecuritySignal {
        id: format!("sig-{rule_id}"),
        message: "rule matched".to_string(),
        tags: vec!["source:runtime-security-agent".to_string()],
        custom: serde_json::json!({"agent": {"rule_id": rule_id}}),
    }
}

// ============================================================================
// SECTION: Fake Intake Double
// ============================================================================

/// Serves `bodies` as JSON, one per request, and returns the request URLs.
pub fn fake_intake(bodies: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut urls = Vec::new();
        for body in bodies {
            let Ok(request) = server.recv() else {
                break;
            };
            urls.push(request.url().to_string());
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(Response::from_string(body).with_header(content_type));
        }
        urls
    });
    (format!("http://{addr}"), handle)
}
