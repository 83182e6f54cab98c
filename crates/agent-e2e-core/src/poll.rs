// crates/agent-e2e-core/src/poll.rs
// ============================================================================
// Module: Polling Assertions
// Description: Fixed-interval polling with soft-failure collection.
// Purpose: Wait for remote side effects without arbitrary sleeps.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! A probe runs repeatedly until one cycle records no failures or the timeout
//! elapses. Each cycle gets a fresh [`CollectT`], so several independent checks
//! can report in the same pass. On timeout the failures of the last cycle are
//! returned in [`PollTimeout`] for diagnostics.
//!
//! Invariants:
//! - The probe runs at least once, even with a zero timeout.
//! - The interval is fixed; there is no backoff.
//! - The final sleep is clamped so one last attempt lands at the deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::future::Future;
use std::thread;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Timeout and interval for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total time budget for the loop.
    pub timeout: Duration,
    /// Fixed delay between attempts.
    pub interval: Duration,
}

impl PollPolicy {
    /// Creates a policy from a timeout and interval.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
        }
    }

    /// Quick checks against local state: 30s total, 1s interval.
    #[must_use]
    pub const fn short() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(1))
    }

    /// Default for remote side effects: 2m total, 5s interval.
    #[must_use]
    pub const fn standard() -> Self {
        Self::new(Duration::from_secs(120), Duration::from_secs(5))
    }

    /// Intake and backend propagation: 10m total, 10s interval.
    #[must_use]
    pub const fn long() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(10))
    }

    /// Raises the timeout to `floor` when one is configured.
    ///
    /// A global override acts as a minimum so it never shortens a timeout a
    /// test asked for explicitly.
    #[must_use]
    pub fn with_minimum_timeout(self, floor: Option<Duration>) -> Self {
        match floor {
            Some(floor) => Self::new(self.timeout.max(floor), self.interval),
            None => self,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// SECTION: Failure Collection
// ============================================================================

/// Accumulates assertion failures for one polling cycle.
///
/// # Invariants
/// - Recording a failure never aborts the probe; the caller keeps checking.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectT {
    /// Failure messages recorded during the cycle.
    failures: Vec<String>,
}

impl CollectT {
    /// Creates an empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failures: Vec::new(),
        }
    }

    /// Records a failure message.
    pub fn errorf(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    /// Records `message` when `condition` is false. Returns `condition`.
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.errorf(message);
        }
        condition
    }

    /// Records a failure when `expected != actual`. Returns whether they matched.
    #[allow(clippy::use_debug, reason = "Assertion messages render arbitrary values.")]
    pub fn check_eq<T: PartialEq + Debug + ?Sized>(
        &mut self,
        expected: &T,
        actual: &T,
        context: &str,
    ) -> bool {
        if expected == actual {
            return true;
        }
        self.errorf(format!("{context}: expected {expected:?}, got {actual:?}"));
        false
    }

    /// Records a failure when `haystack` does not contain `needle`.
    pub fn check_contains(&mut self, haystack: &str, needle: &str, context: &str) -> bool {
        if haystack.contains(needle) {
            return true;
        }
        self.errorf(format!("{context}: '{needle}' not found in '{haystack}'"));
        false
    }

    /// Unwraps `result`, recording the error and returning `None` on failure.
    pub fn require_ok<T, E: Display>(&mut self, result: Result<T, E>, context: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errorf(format!("{context}: {err}"));
                None
            }
        }
    }

    /// Returns true when at least one failure was recorded.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Consumes the collector and returns its failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<String> {
        self.failures
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Returned when a polling loop reaches its deadline without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout {
    /// Number of probe invocations.
    pub attempts: u32,
    /// Time spent polling.
    pub elapsed: Duration,
    /// Failures recorded by the last attempt.
    pub last_failures: Vec<String>,
}

impl Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "condition not met after {} attempt(s) in {}ms",
            self.attempts,
            self.elapsed.as_millis()
        )?;
        if self.last_failures.is_empty() {
            return Ok(());
        }
        write!(f, "; last failures: {}", self.last_failures.join("; "))
    }
}

impl std::error::Error for PollTimeout {}

// ============================================================================
// SECTION: Observer
// ============================================================================

/// Receives one callback per polling attempt.
pub trait PollObserver {
    /// Called after each attempt with the failures it recorded.
    fn on_attempt(&self, attempt: u32, elapsed: Duration, failures: &[String]);
}

/// Observer that ignores every attempt.
pub struct NoopObserver;

impl PollObserver for NoopObserver {
    fn on_attempt(&self, _attempt: u32, _elapsed: Duration, _failures: &[String]) {}
}

// ============================================================================
// SECTION: Polling Loops
// ============================================================================

/// Runs `probe` until a cycle records no failures or the policy times out.
///
/// Returns the number of attempts on success.
///
/// # Errors
///
/// Returns [`PollTimeout`] carrying the last cycle's failures when the
/// deadline passes.
pub fn eventually<F>(policy: PollPolicy, probe: F) -> Result<u32, PollTimeout>
where
    F: FnMut(&mut CollectT),
{
    eventually_observed(policy, &NoopObserver, probe)
}

/// Same as [`eventually`], reporting each attempt to `observer`.
///
/// # Errors
///
/// Returns [`PollTimeout`] when the deadline passes.
pub fn eventually_observed<F>(
    policy: PollPolicy,
    observer: &dyn PollObserver,
    mut probe: F,
) -> Result<u32, PollTimeout>
where
    F: FnMut(&mut CollectT),
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        let mut collect = CollectT::new();
        probe(&mut collect);
        let elapsed = start.elapsed();
        observer.on_attempt(attempts, elapsed, collect.failures());
        if !collect.failed() {
            return Ok(attempts);
        }
        if elapsed >= policy.timeout {
            return Err(PollTimeout {
                attempts,
                elapsed,
                last_failures: collect.into_failures(),
            });
        }
        thread::sleep(next_delay(policy, elapsed));
    }
}

/// Polls a fallible probe until it returns `Ok`.
///
/// # Errors
///
/// Returns [`PollTimeout`] with the last probe error when the deadline passes.
pub fn poll<T, E, F>(policy: PollPolicy, mut probe: F) -> Result<T, PollTimeout>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        let err = match probe() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(PollTimeout {
                attempts,
                elapsed,
                last_failures: vec![err.to_string()],
            });
        }
        thread::sleep(next_delay(policy, elapsed));
    }
}

/// Async variant of [`poll`] for probes that await network calls.
///
/// # Errors
///
/// Returns [`PollTimeout`] with the last probe error when the deadline passes.
pub async fn poll_async<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<T, PollTimeout>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        let err = match probe().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(PollTimeout {
                attempts,
                elapsed,
                last_failures: vec![err.to_string()],
            });
        }
        tokio::time::sleep(next_delay(policy, elapsed)).await;
    }
}

/// Returns the sleep before the next attempt, clamped to the deadline.
fn next_delay(policy: PollPolicy, elapsed: Duration) -> Duration {
    policy.interval.min(policy.timeout.saturating_sub(elapsed))
}
