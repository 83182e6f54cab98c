// crates/agent-e2e-core/src/systemd.rs
// ============================================================================
// Module: Systemd Event Ordering
// Description: Journald parsing and unit-transition sequence matching.
// Purpose: Assert start/stop ordering of stable and experiment units.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Journal output from `journalctl -o json` is classified into unit
//! transitions ([`SystemdEvent`]) and matched against an [`EventSequence`].
//!
//! The matcher is a single greedy pass over the observed events:
//! - unrelated events are skipped,
//! - an ordered expectation matches the next equal event,
//! - an unordered group consumes equal events in any order until every member
//!   has been matched exactly once, then matching moves past the group.
//!
//! There is no backtracking. A group member that repeats in the group must be
//! observed as many times as it is listed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Transitions
// ============================================================================

/// Unit transition recognized in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Start job queued.
    Starting,
    /// Start job completed.
    Started,
    /// Stop job queued.
    Stopping,
    /// Stop job completed.
    Stopped,
    /// Unit entered the failed state.
    Failed,
    /// Job timed out.
    Timed,
    /// SIGTERM stop phase timed out.
    SigtermTimed,
    /// Remaining processes were sent SIGKILL.
    Sigkill,
    /// Job was skipped because a condition failed.
    Skipped,
}

impl Transition {
    /// Returns the stable label for the transition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Timed => "timed",
            Self::SigtermTimed => "sigterm_timed",
            Self::Sigkill => "sigkill",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starting" => Ok(Self::Starting),
            "started" => Ok(Self::Started),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "timed" => Ok(Self::Timed),
            "sigterm_timed" | "sigterm-timed" => Ok(Self::SigtermTimed),
            "sigkill" => Ok(Self::Sigkill),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown transition: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One unit transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemdEvent {
    /// Unit name, e.g. `datadog-agent.service`.
    pub unit: String,
    /// Transition observed for the unit.
    pub transition: Transition,
}

impl SystemdEvent {
    /// Creates an event for `unit`.
    #[must_use]
    pub fn new(unit: impl Into<String>, transition: Transition) -> Self {
        Self {
            unit: unit.into(),
            transition,
        }
    }
}

impl fmt::Display for SystemdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transition, self.unit)
    }
}

impl FromStr for SystemdEvent {
    type Err = String;

    /// Parses `transition:unit`, e.g. `started:datadog-agent.service`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (transition, unit) =
            value.split_once(':').ok_or_else(|| format!("expected transition:unit, got {value}"))?;
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(format!("missing unit in {value}"));
        }
        Ok(Self::new(unit, transition.parse()?))
    }
}

// ============================================================================
// SECTION: Expected Sequences
// ============================================================================

/// One step of an expected sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Event that must follow the previous step.
    Event(SystemdEvent),
    /// Events that must all occur, in any order, before the next step.
    Unordered(Vec<SystemdEvent>),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(event) => write!(f, "{event}"),
            Self::Unordered(events) => {
                let labels: Vec<String> = events.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", labels.join(","))
            }
        }
    }
}

impl FromStr for Expectation {
    type Err = String;

    /// Parses `transition:unit` or a braced group `{a:u1,b:u2}`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Some(inner) = trimmed.strip_prefix('{') {
            let inner =
                inner.strip_suffix('}').ok_or_else(|| format!("unterminated group: {value}"))?;
            let events = inner
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<SystemdEvent>, String>>()?;
            return Ok(Self::Unordered(events));
        }
        Ok(Self::Event(trimmed.parse()?))
    }
}

/// Ordered list of expectations built with chained calls.
///
/// ```
/// use agent_e2e_core::EventSequence;
/// use agent_e2e_core::SystemdEvent;
/// use agent_e2e_core::Transition;
///
/// let expected = EventSequence::new()
///     .stopping("datadog-agent.service")
///     .unordered(vec![
///         SystemdEvent::new("datadog-agent-trace.service", Transition::Stopped),
///         SystemdEvent::new("datadog-agent-process.service", Transition::Stopped),
///     ])
///     .stopped("datadog-agent.service");
/// assert_eq!(expected.steps().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSequence {
    /// Expectations in match order.
    steps: Vec<Expectation>,
}

impl EventSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            steps: Vec::new(),
        }
    }

    /// Builds a sequence from parsed expectations.
    #[must_use]
    pub const fn from_steps(steps: Vec<Expectation>) -> Self {
        Self {
            steps,
        }
    }

    /// Appends an ordered event.
    #[must_use]
    pub fn then(mut self, event: SystemdEvent) -> Self {
        self.steps.push(Expectation::Event(event));
        self
    }

    /// Appends an unordered group.
    #[must_use]
    pub fn unordered(mut self, events: Vec<SystemdEvent>) -> Self {
        self.steps.push(Expectation::Unordered(events));
        self
    }

    /// Appends `starting` for `unit`.
    #[must_use]
    pub fn starting(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Starting))
    }

    /// Appends `started` for `unit`.
    #[must_use]
    pub fn started(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Started))
    }

    /// Appends `stopping` for `unit`.
    #[must_use]
    pub fn stopping(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Stopping))
    }

    /// Appends `stopped` for `unit`.
    #[must_use]
    pub fn stopped(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Stopped))
    }

    /// Appends `failed` for `unit`.
    #[must_use]
    pub fn failed(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Failed))
    }

    /// Appends `skipped` for `unit`.
    #[must_use]
    pub fn skipped(self, unit: &str) -> Self {
        self.then(SystemdEvent::new(unit, Transition::Skipped))
    }

    /// Returns the expectations in order.
    #[must_use]
    pub fn steps(&self) -> &[Expectation] {
        &self.steps
    }
}

// ============================================================================
// SECTION: Journal Parsing
// ============================================================================

/// Journal fields used for classification.
///
/// `journalctl -o json` writes fields holding non-printable or non-UTF-8
/// bytes as arrays of numbers, and repeated fields as arrays of strings;
/// every field goes through [`journal_field`].
#[derive(Debug, Deserialize)]
struct JournalRecord {
    /// Unit the message refers to.
    #[serde(rename = "UNIT", default, deserialize_with = "journal_field")]
    unit: Option<String>,
    /// Human-readable message.
    #[serde(rename = "MESSAGE", default, deserialize_with = "journal_field")]
    message: Option<String>,
    /// Job type (`start`, `stop`, ...).
    #[serde(rename = "JOB_TYPE", default, deserialize_with = "journal_field")]
    job_type: Option<String>,
    /// Job result (`done`, `failed`, `timeout`, ...).
    #[serde(rename = "JOB_RESULT", default, deserialize_with = "journal_field")]
    job_result: Option<String>,
}

/// Decodes a journal field written as a string, a byte array, or an array
/// of values (first value wins). Anything else reads as absent.
fn journal_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(field_text))
}

/// Renders one journal field value as text.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) if items.iter().all(Value::is_u64) => {
            let bytes = items
                .iter()
                .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
                .collect::<Option<Vec<u8>>>()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Value::Array(items) => items.first().and_then(field_text),
        _ => None,
    }
}

/// Parses `journalctl -o json` output into unit transitions.
///
/// Lines that are not JSON objects, have no `UNIT`, or carry no recognizable
/// transition are ignored.
#[must_use]
pub fn parse_journal(output: &str) -> Vec<SystemdEvent> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<JournalRecord>(line).ok())
        .filter_map(|record| {
            let transition = classify(&record)?;
            let unit = record.unit?;
            Some(SystemdEvent::new(unit, transition))
        })
        .collect()
}

/// Maps a journal record to a transition.
fn classify(record: &JournalRecord) -> Option<Transition> {
    let message = record.message.as_deref().unwrap_or_default();
    if message.contains("State 'stop-sigterm' timed out") {
        return Some(Transition::SigtermTimed);
    }
    if message.contains("Killing process") && message.contains("SIGKILL") {
        return Some(Transition::Sigkill);
    }
    if message.contains("Failed with result") {
        return Some(Transition::Failed);
    }
    let job_type = record.job_type.as_deref();
    match record.job_result.as_deref() {
        Some("done") => match job_type {
            Some("start") => Some(Transition::Started),
            Some("stop") => Some(Transition::Stopped),
            _ => None,
        },
        Some("failed") => Some(Transition::Failed),
        Some("timeout") => Some(Transition::Timed),
        Some("skipped") => Some(Transition::Skipped),
        Some(_) => None,
        None => match job_type {
            Some("start") => Some(Transition::Starting),
            Some("stop") => Some(Transition::Stopping),
            _ => None,
        },
    }
}

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Returned when observed events do not satisfy the expected sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMismatch {
    /// Number of steps fully matched.
    pub matched_steps: usize,
    /// Expectations never observed, in order.
    pub missing: Vec<String>,
    /// Every transition seen in the journal window.
    pub observed: Vec<SystemdEvent>,
}

impl fmt::Display for SequenceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed: Vec<String> = self.observed.iter().map(ToString::to_string).collect();
        write!(
            f,
            "missing systemd events after {} matched step(s): [{}]; observed: [{}]",
            self.matched_steps,
            self.missing.join(", "),
            observed.join(", ")
        )
    }
}

impl std::error::Error for SequenceMismatch {}

/// Matches `observed` against `expected`.
///
/// # Errors
///
/// Returns [`SequenceMismatch`] listing the expectations left unmatched.
pub fn match_sequence(
    expected: &EventSequence,
    observed: &[SystemdEvent],
) -> Result<(), SequenceMismatch> {
    let steps = expected.steps();
    let mut index = skip_empty_groups(steps, 0);
    let mut pending = pending_members(steps, index);
    for event in observed {
        let Some(step) = steps.get(index) else {
            break;
        };
        let satisfied = match step {
            Expectation::Event(want) => want == event,
            Expectation::Unordered(_) => {
                if let Some(position) = pending.iter().position(|want| want == event) {
                    pending.swap_remove(position);
                }
                pending.is_empty()
            }
        };
        if satisfied {
            index = skip_empty_groups(steps, index + 1);
            pending = pending_members(steps, index);
        }
    }
    if index >= steps.len() {
        return Ok(());
    }
    let mut missing = Vec::new();
    if let Some(Expectation::Unordered(_)) = steps.get(index) {
        let labels: Vec<String> = pending.iter().map(ToString::to_string).collect();
        missing.push(format!("{{{}}}", labels.join(",")));
    } else if let Some(step) = steps.get(index) {
        missing.push(step.to_string());
    }
    missing.extend(steps.iter().skip(index + 1).map(ToString::to_string));
    Err(SequenceMismatch {
        matched_steps: index,
        missing,
        observed: observed.to_vec(),
    })
}

/// Advances past empty unordered groups, which are trivially satisfied.
fn skip_empty_groups(steps: &[Expectation], mut index: usize) -> usize {
    while let Some(Expectation::Unordered(events)) = steps.get(index) {
        if !events.is_empty() {
            break;
        }
        index += 1;
    }
    index
}

/// Returns the members still to match when `index` is an unordered group.
fn pending_members(steps: &[Expectation], index: usize) -> Vec<SystemdEvent> {
    match steps.get(index) {
        Some(Expectation::Unordered(events)) => events.clone(),
        _ => Vec::new(),
    }
}
