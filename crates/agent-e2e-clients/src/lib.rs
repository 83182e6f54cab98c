// crates/agent-e2e-clients/src/lib.rs
// ============================================================================
// Module: Agent E2E Clients
// Description: HTTP clients for the backend REST API and the fake intake.
// Purpose: Give suites typed access to the systems they assert against.
// Dependencies: agent-e2e-core, reqwest, serde, url
// ============================================================================

//! ## Overview
//! [`BackendClient`] manages CWS agent rules and signal rules and searches
//! logs, signals, and tables in the monitoring backend. [`FakeIntakeClient`]
//! reads the payloads an agent sent to a fake intake. Both clients are
//! blocking and fail closed on non-success status codes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod error;
pub mod fakeintake;
mod http;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::BackendClient;
pub use backend::LogEvent;
pub use backend::RuleApi;
pub use backend::SecuritySignal;
pub use backend::TableQuery;
pub use error::ClientError;
pub use fakeintake::FakeIntakeClient;
pub use fakeintake::LogEntry;
pub use fakeintake::MetricFilter;
pub use fakeintake::MetricSeries;
pub use fakeintake::Payload;
