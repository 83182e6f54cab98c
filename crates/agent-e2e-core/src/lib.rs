// crates/agent-e2e-core/src/lib.rs
// ============================================================================
// Module: Agent E2E Core Library
// Description: Pure helpers shared by agent end-to-end suites.
// Purpose: Provide polling, matching, parsing, and escaping primitives.
// Dependencies: serde, serde_json, serde_yaml, thiserror, tokio
// ============================================================================

//! ## Overview
//! Core helpers for agent end-to-end suites. Nothing here talks to a network
//! or a remote host: the crate holds the fixed-interval polling loop with its
//! soft-failure collector, the journald event-order matcher, typed status
//! snapshots decoded from agent `--json` output, CWS rule and policy models,
//! SQL literal escaping, and the structured harness event log.
//!
//! Invariants:
//! - Polling never backs off; it sleeps a fixed interval until the deadline.
//! - Assertion failures are accumulated, never raised, inside a poll cycle.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod events;
pub mod poll;
pub mod rules;
pub mod sql;
pub mod status;
pub mod systemd;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use events::EventSink;
pub use events::HarnessEvent;
pub use events::JsonlEvents;
pub use events::NoopEvents;
pub use events::PollEvents;
pub use poll::CollectT;
pub use poll::NoopObserver;
pub use poll::PollObserver;
pub use poll::PollPolicy;
pub use poll::PollTimeout;
pub use poll::eventually;
pub use poll::eventually_observed;
pub use poll::poll;
pub use poll::poll_async;
pub use rules::AgentRule;
pub use rules::Policy;
pub use rules::RuleError;
pub use rules::SignalRuleSpec;
pub use sql::escape_sql_string;
pub use sql::quote_sql_literal;
pub use status::AgentStatus;
pub use status::CheckRun;
pub use status::ProcessAgentStatus;
pub use status::SecurityAgentStatus;
pub use status::StatusError;
pub use status::parse_json_output;
pub use systemd::EventSequence;
pub use systemd::Expectation;
pub use systemd::SequenceMismatch;
pub use systemd::SystemdEvent;
pub use systemd::Transition;
pub use systemd::match_sequence;
pub use systemd::parse_journal;
