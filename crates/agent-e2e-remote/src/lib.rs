// crates/agent-e2e-remote/src/lib.rs
// ============================================================================
// Module: Agent E2E Remote
// Description: Command execution on test hosts and typed agent CLIs.
// Purpose: Drive agent, security-agent, process-agent, and installer
//          binaries on a provisioned host and read back their state.
// Dependencies: agent-e2e-core, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! Every interaction with a host goes through [`RemoteExecutor`], which runs
//! one shell command and returns its output. [`LocalShell`] runs commands on
//! the current machine and [`SshExecutor`] shells out to the `ssh` binary.
//! [`AgentCli`] and [`InstallerCli`] wrap the agent binaries; the journal
//! module reads systemd transitions for event-order assertions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agent;
pub mod error;
pub mod executor;
pub mod installer;
pub mod journal;
pub mod paths;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use agent::AgentCli;
pub use error::RemoteError;
pub use executor::CommandOutput;
pub use executor::LocalShell;
pub use executor::LoggedExecutor;
pub use executor::Privilege;
pub use executor::RemoteExecutor;
pub use executor::SshExecutor;
pub use executor::shell_quote;
pub use installer::InstallScript;
pub use installer::InstallerCli;
pub use installer::PackageState;
pub use journal::JournalTimestamp;
pub use journal::assert_systemd_events;
pub use journal::eventually_systemd_events;
pub use journal::journal_events_since;
