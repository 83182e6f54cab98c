// crates/agent-e2e-remote/src/journal.rs
// ============================================================================
// Module: Journal Capture
// Description: Reads systemd job transitions from journald on a test host.
// Purpose: Feed the event-order matcher with what systemd actually did.
// Dependencies: agent-e2e-core, time
// ============================================================================

//! ## Overview
//! A suite records a [`JournalTimestamp`] from the host clock before an
//! action, then reads every PID 1 journal entry since that moment as JSON
//! and classifies it with [`parse_journal`]. Timestamps come from the host,
//! never the runner, so clock skew between them cannot hide events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use agent_e2e_core::EventSequence;
use agent_e2e_core::PollPolicy;
use agent_e2e_core::SystemdEvent;
use agent_e2e_core::match_sequence;
use agent_e2e_core::parse_journal;
use agent_e2e_core::poll;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::RemoteError;
use crate::executor::Privilege;
use crate::executor::RemoteExecutor;

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Point in time on the host clock, with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JournalTimestamp(OffsetDateTime);

impl JournalTimestamp {
    /// Creates a timestamp from Unix seconds.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Decode`] when the value is out of range.
    pub fn from_unix(seconds: i64) -> Result<Self, RemoteError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }

    /// Reads the current time on the host behind `exec`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when `date` fails or prints a non-number.
    pub fn host_now(exec: &dyn RemoteExecutor) -> Result<Self, RemoteError> {
        let output = exec.run_checked("date +%s")?;
        let seconds: i64 = output
            .trim()
            .parse()
            .map_err(|_| RemoteError::Decode(format!("invalid epoch seconds: {}", output.trim())))?;
        Self::from_unix(seconds)
    }

    /// Returns Unix seconds.
    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Returns the `--since` argument for `journalctl`.
    #[must_use]
    pub fn since_arg(self) -> String {
        format!("@{}", self.unix_seconds())
    }
}

impl fmt::Display for JournalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "@{}", self.unix_seconds()),
        }
    }
}

// ============================================================================
// SECTION: Capture
// ============================================================================

/// Returns systemd transitions logged since `since`.
///
/// When `units` is non-empty only events for those units are returned.
///
/// # Errors
///
/// Returns [`RemoteError`] when `journalctl` fails.
pub fn journal_events_since(
    exec: &dyn RemoteExecutor,
    since: JournalTimestamp,
    units: &[&str],
) -> Result<Vec<SystemdEvent>, RemoteError> {
    let command = format!(
        "{}journalctl _PID=1 --since {} -o json --no-pager",
        Privilege::Root.prefix(),
        since.since_arg()
    );
    let output = exec.run_checked(&command)?;
    let mut events = parse_journal(&output);
    if !units.is_empty() {
        events.retain(|event| units.contains(&event.unit.as_str()));
    }
    Ok(events)
}

/// Checks once that transitions since `since` match `expected`.
///
/// # Errors
///
/// Returns [`RemoteError::Journal`] on a mismatch, or the capture error.
pub fn assert_systemd_events(
    exec: &dyn RemoteExecutor,
    since: JournalTimestamp,
    expected: &EventSequence,
) -> Result<(), RemoteError> {
    let observed = journal_events_since(exec, since, &[])?;
    match_sequence(expected, &observed)?;
    Ok(())
}

/// Polls until transitions since `since` match `expected`.
///
/// Returns the number of attempts.
///
/// # Errors
///
/// Returns [`RemoteError::Timeout`] carrying the last mismatch when the
/// policy runs out.
pub fn eventually_systemd_events(
    exec: &dyn RemoteExecutor,
    since: JournalTimestamp,
    expected: &EventSequence,
    policy: PollPolicy,
) -> Result<u32, RemoteError> {
    let mut attempts = 0u32;
    poll(policy, || {
        attempts = attempts.saturating_add(1);
        assert_systemd_events(exec, since, expected)
    })?;
    Ok(attempts)
}
