// crates/agent-e2e-suite/src/cleanup.rs
// ============================================================================
// Module: Cleanup Stack
// Description: LIFO stack of best-effort cleanup actions.
// Purpose: Release suite resources on success and failure paths alike.
// Dependencies: agent-e2e-core
// ============================================================================

//! ## Overview
//! Actions run last-registered first. A failing or panicking action is
//! reported as [`HarnessEvent::CleanupFailed`] and the remaining actions
//! still run. Actions left on the stack when it is dropped run silently.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;

use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use agent_e2e_core::NoopEvents;

use crate::error::SuiteError;
use crate::suite::panic_message;

/// Boxed cleanup action.
type CleanupAction = Box<dyn FnOnce() -> Result<(), SuiteError>>;

/// LIFO stack of cleanup actions.
#[derive(Default)]
pub struct CleanupStack {
    /// Labelled actions in registration order.
    actions: Vec<(String, CleanupAction)>,
}

impl CleanupStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` under `label`.
    pub fn push(
        &mut self,
        label: impl Into<String>,
        action: impl FnOnce() -> Result<(), SuiteError> + 'static,
    ) {
        self.actions.push((label.into(), Box::new(action)));
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every pending action, newest first. Returns the failure count.
    pub fn run(&mut self, suite: &str, sink: &dyn EventSink) -> usize {
        let mut failures = 0;
        while let Some((label, action)) = self.actions.pop() {
            let error = match catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            failures += 1;
            sink.emit(&HarnessEvent::CleanupFailed {
                suite: suite.to_string(),
                action: label,
                error,
            });
        }
        failures
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            self.run("", &NoopEvents);
        }
    }
}
