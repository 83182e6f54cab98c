// crates/agent-e2e-suite/src/artifacts.rs
// ============================================================================
// Module: Test Artifacts
// Description: Per-test artifact directories and deterministic summaries.
// Purpose: Leave a JSON and Markdown record of every test, even on panic.
// Dependencies: serde, serde_jcs
// ============================================================================

//! ## Overview
//! [`TestArtifacts`] owns one directory. [`TestReporter`] wraps it for a single
//! test and writes `summary.json` (canonical JCS) and `summary.md` on
//! [`TestReporter::finish`], or from `Drop` when the test never finished.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Paths
// ============================================================================

/// Returns milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Returns a fresh run root under `target/agent-e2e`.
#[must_use]
pub fn default_run_root() -> PathBuf {
    PathBuf::from("target/agent-e2e").join(format!("run_{}", now_millis()))
}

/// Maps `name` to a single safe path component.
fn path_component(name: &str) -> String {
    let component: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') { ch } else { '_' })
        .collect();
    if component.is_empty() { "_".to_string() } else { component }
}

// ============================================================================
// SECTION: Artifact Directory
// ============================================================================

/// Artifact directory for one suite or test.
#[derive(Debug, Clone)]
pub struct TestArtifacts {
    /// Directory holding the artifacts.
    root: PathBuf,
}

impl TestArtifacts {
    /// Creates `parent/<name>`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be created.
    pub fn new(parent: &Path, name: &str) -> io::Result<Self> {
        let root = parent.join(path_component(name));
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
        })
    }

    /// Returns the artifact directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a JSON artifact using canonical JCS serialization.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when serialization or the write fails.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<PathBuf> {
        let path = self.root.join(path_component(name.trim_end_matches(".json")));
        let path = path.with_extension("json");
        let bytes = serde_jcs::to_vec(value).map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Writes a UTF-8 text artifact.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the write fails.
    pub fn write_text(&self, name: &str, value: &str) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, value.as_bytes())?;
        Ok(path)
    }
}

// ============================================================================
// SECTION: Reporter
// ============================================================================

/// Summary record written for each test.
#[derive(Debug, Serialize)]
struct TestSummary {
    /// Test name.
    test_name: String,
    /// Outcome label.
    status: String,
    /// Start time, Unix milliseconds.
    started_at_ms: u64,
    /// End time, Unix milliseconds.
    ended_at_ms: u64,
    /// Duration in milliseconds.
    duration_ms: u64,
    /// Free-form notes, such as the failure message.
    notes: Vec<String>,
    /// Artifact file names.
    artifacts: Vec<String>,
}

/// Writes a test summary even when the test panics.
pub struct TestReporter {
    /// Artifact directory for the test.
    artifacts: TestArtifacts,
    /// Test name.
    test_name: String,
    /// Start time, Unix milliseconds.
    started_at_ms: u64,
    /// Set once a summary is written.
    finalized: bool,
}

impl TestReporter {
    /// Creates a reporter writing under `run_root/<test_name>`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the directory cannot be created.
    pub fn new(run_root: &Path, test_name: &str) -> io::Result<Self> {
        Ok(Self {
            artifacts: TestArtifacts::new(run_root, test_name)?,
            test_name: test_name.to_string(),
            started_at_ms: now_millis(),
            finalized: false,
        })
    }

    /// Returns the artifact directory.
    #[must_use]
    pub const fn artifacts(&self) -> &TestArtifacts {
        &self.artifacts
    }

    /// Writes the final summary.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when either summary file cannot be written.
    pub fn finish(
        &mut self,
        status: &str,
        notes: Vec<String>,
        artifacts: Vec<String>,
    ) -> io::Result<()> {
        let ended_at_ms = now_millis();
        let summary = TestSummary {
            test_name: self.test_name.clone(),
            status: status.to_string(),
            started_at_ms: self.started_at_ms,
            ended_at_ms,
            duration_ms: ended_at_ms.saturating_sub(self.started_at_ms),
            notes,
            artifacts,
        };
        self.artifacts.write_json("summary.json", &summary)?;
        self.artifacts.write_text("summary.md", &summary_markdown(&summary))?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for TestReporter {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let status = if std::thread::panicking() { "panic" } else { "unknown" };
        let _ = self.finish(
            status,
            vec!["test terminated without explicit summary".to_string()],
            Vec::new(),
        );
    }
}

/// Renders the Markdown summary.
fn summary_markdown(summary: &TestSummary) -> String {
    let mut out = String::from("# Agent E2E Test Summary\n\n## Status\n\n");
    let _ = writeln!(out, "- Test: {}", summary.test_name);
    let _ = writeln!(out, "- Status: {}", summary.status);
    let _ = writeln!(out, "- Duration (ms): {}", summary.duration_ms);
    for (heading, items) in [("Notes", &summary.notes), ("Artifacts", &summary.artifacts)] {
        let _ = write!(out, "\n## {heading}\n\n");
        if items.is_empty() {
            out.push_str("- None\n");
        }
        for item in items {
            let _ = writeln!(out, "- {item}");
        }
    }
    out
}
