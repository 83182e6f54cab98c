// crates/agent-e2e-core/src/events.rs
// ============================================================================
// Module: Harness Events
// Description: Structured event records for suite, poll, and cleanup activity.
// Purpose: Provide JSON-line logging without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Harness components emit [`HarnessEvent`] values to an [`EventSink`].
//! [`JsonlEvents`] writes one JSON object per line to any writer; [`NoopEvents`]
//! discards everything. Emission is best-effort: a failed write never fails a
//! test.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::poll::PollObserver;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event emitted by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HarnessEvent {
    /// Suite setup began.
    SuiteStarted {
        /// Suite name.
        suite: String,
        /// Environment description.
        environment: String,
    },
    /// Suite finished, including teardown.
    SuiteFinished {
        /// Suite name.
        suite: String,
        /// Tests that passed.
        passed: usize,
        /// Tests that failed or panicked.
        failed: usize,
    },
    /// Test method began.
    TestStarted {
        /// Suite name.
        suite: String,
        /// Test name.
        test: String,
    },
    /// Test method finished.
    TestFinished {
        /// Suite name.
        suite: String,
        /// Test name.
        test: String,
        /// Outcome label.
        outcome: String,
        /// Test duration in milliseconds.
        duration_ms: u64,
    },
    /// One polling attempt completed.
    PollAttempt {
        /// Poll label.
        label: String,
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Time since polling began, in milliseconds.
        elapsed_ms: u64,
        /// Failures recorded by the attempt.
        failures: Vec<String>,
    },
    /// Provisioning step applied.
    StepApplied {
        /// Stack name.
        stack: String,
        /// Step id.
        step: String,
        /// Step kind label.
        kind: String,
    },
    /// Remote command executed.
    Command {
        /// Target host.
        host: String,
        /// Command line.
        command: String,
        /// Exit code when the process exited normally.
        exit_code: Option<i32>,
    },
    /// Cleanup action failed; the failure is ignored.
    CleanupFailed {
        /// Suite name.
        suite: String,
        /// Cleanup action label.
        action: String,
        /// Error message.
        error: String,
    },
    /// Report or test artifact could not be written; the run continues.
    ArtifactFailed {
        /// Suite name.
        suite: String,
        /// Artifact label, such as the suite report or a test name.
        artifact: String,
        /// Error message.
        error: String,
    },
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Receives harness events.
pub trait EventSink: Send + Sync {
    /// Records an event. Implementations must not panic on write failures.
    fn emit(&self, event: &HarnessEvent);
}

/// Sink that discards every event.
pub struct NoopEvents;

impl EventSink for NoopEvents {
    fn emit(&self, _event: &HarnessEvent) {}
}

// ============================================================================
// SECTION: JSON Lines Sink
// ============================================================================

/// Record written by [`JsonlEvents`].
#[derive(Serialize)]
struct EventRecord<'a> {
    /// Wall-clock time in milliseconds since the epoch.
    ts_ms: u64,
    /// Event payload.
    #[serde(flatten)]
    event: &'a HarnessEvent,
}

/// Sink writing one JSON object per line.
pub struct JsonlEvents<W: Write + Send> {
    /// Output writer for event records.
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlEvents<W> {
    /// Creates a sink over `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the writer.
    ///
    /// Returns `None` when the writer mutex is poisoned.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

impl<W: Write + Send> EventSink for JsonlEvents<W> {
    fn emit(&self, event: &HarnessEvent) {
        let record = EventRecord {
            ts_ms: now_millis(),
            event,
        };
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if serde_json::to_writer(&mut *guard, &record).is_ok() {
            let _ = guard.write_all(b"\n");
            let _ = guard.flush();
        }
    }
}

/// Returns milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Converts a duration to whole milliseconds, saturating.
#[must_use]
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// SECTION: Poll Adapter
// ============================================================================

/// Forwards polling attempts to an [`EventSink`] as [`HarnessEvent::PollAttempt`].
pub struct PollEvents<'a> {
    /// Destination sink.
    sink: &'a dyn EventSink,
    /// Label identifying the polled condition.
    label: &'a str,
}

impl<'a> PollEvents<'a> {
    /// Creates an adapter labelling attempts with `label`.
    #[must_use]
    pub const fn new(sink: &'a dyn EventSink, label: &'a str) -> Self {
        Self {
            sink,
            label,
        }
    }
}

impl PollObserver for PollEvents<'_> {
    fn on_attempt(&self, attempt: u32, elapsed: Duration, failures: &[String]) {
        self.sink.emit(&HarnessEvent::PollAttempt {
            label: self.label.to_string(),
            attempt,
            elapsed_ms: duration_millis(elapsed),
            failures: failures.to_vec(),
        });
    }
}
