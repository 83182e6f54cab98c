// crates/agent-e2e-core/tests/events.rs
// ============================================================================
// Module: Harness Event Tests
// Description: JSON-line event sink and poll adapter.
// Purpose: Ensure events are written one object per line with a timestamp.
// ============================================================================

//! Harness event sink tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use std::io;
use std::io::Write;
use std::time::Duration;

use agent_e2e_core::CollectT;
use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use agent_e2e_core::JsonlEvents;
use agent_e2e_core::PollEvents;
use agent_e2e_core::PollPolicy;
use agent_e2e_core::eventually_observed;
use serde_json::Value;

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lines(sink: JsonlEvents<Vec<u8>>) -> Vec<Value> {
    let bytes = sink.into_inner().expect("writer");
    String::from_utf8(bytes)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn events_are_tagged_json_lines() {
    let sink = JsonlEvents::new(Vec::new());
    sink.emit(&HarnessEvent::TestStarted {
        suite: "cws".to_string(),
        test: "open_rule_fires".to_string(),
    });
    sink.emit(&HarnessEvent::CleanupFailed {
        suite: "cws".to_string(),
        action: "delete agent rule e2e_a".to_string(),
        error: "404".to_string(),
    });
    sink.emit(&HarnessEvent::ArtifactFailed {
        suite: "cws".to_string(),
        artifact: "suite report".to_string(),
        error: "read-only file system".to_string(),
    });
    let records = lines(sink);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["event"], "test_started");
    assert_eq!(records[0]["test"], "open_rule_fires");
    assert!(records[0]["ts_ms"].as_u64().is_some());
    assert_eq!(records[1]["event"], "cleanup_failed");
    assert_eq!(records[2]["event"], "artifact_failed");
    assert_eq!(records[2]["artifact"], "suite report");
}

#[test]
fn write_failures_are_swallowed() {
    let sink = JsonlEvents::new(FailingWriter);
    sink.emit(&HarnessEvent::SuiteStarted {
        suite: "s".to_string(),
        environment: "host".to_string(),
    });
}

#[test]
fn poll_adapter_emits_each_attempt() {
    let sink = JsonlEvents::new(Vec::new());
    let mut calls = 0;
    eventually_observed(
        PollPolicy::new(Duration::from_millis(200), Duration::from_millis(1)),
        &PollEvents::new(&sink, "metric gpu.utilization"),
        |collect: &mut CollectT| {
            calls += 1;
            collect.check(calls > 1, "no series yet");
        },
    )
    .expect("second attempt passes");
    let records = lines(sink);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["event"], "poll_attempt");
    assert_eq!(records[0]["label"], "metric gpu.utilization");
    assert_eq!(records[0]["failures"][0], "no series yet");
    assert_eq!(records[1]["attempt"], 2);
}
