// crates/agent-e2e-remote/tests/common/mod.rs
// =============================================================================
// Module: Remote Test Helpers
// Description: Scripted executor double recording every command.
// Purpose: Exercise CLI wrappers without a real host.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(clippy::unwrap_used, reason = "Test helpers unwrap uncontended locks.")]

use std::collections::VecDeque;
use std::sync::Mutex;

use agent_e2e_remote::CommandOutput;
use agent_e2e_remote::RemoteError;
use agent_e2e_remote::RemoteExecutor;

/// Executor answering commands from a script.
///
/// Each rule matches commands containing its pattern. Rules hold a queue of
/// outputs; the last output repeats once the queue is drained.
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
