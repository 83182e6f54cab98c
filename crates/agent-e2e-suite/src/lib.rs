// crates/agent-e2e-suite/src/lib.rs
// ============================================================================
// Module: Agent E2E Suite
// Description: Suite lifecycle on top of provisioning, clients, and executors.
// Purpose: Run test methods sequentially against one provisioned environment
//          with best-effort cleanup and per-test artifacts.
// Dependencies: agent-e2e-{core,config,clients,remote,provision}, serde_jcs
// ============================================================================

//! ## Overview
//! A suite embeds a [`BaseSuite`] and implements [`Suite`]. [`run_suite`]
//! provisions the environment, runs setup, runs every [`TestCase`] in order
//! (a failing or panicking test does not stop the others), then tears down:
//! suite teardown, the LIFO [`CleanupStack`], and environment destruction.
//! Cleanup failures are logged as events and never fail the run.
//!
//! [`CwsRuleSet`] manages backend and on-host CWS rules for security suites;
//! [`assertions`] holds the `CollectT` assertion helpers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifacts;
pub mod assertions;
pub mod cleanup;
pub mod cws;
pub mod error;
pub mod suite;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifacts::TestArtifacts;
pub use artifacts::TestReporter;
pub use cleanup::CleanupStack;
pub use cws::CwsRuleSet;
pub use cws::DeployedRule;
pub use error::SuiteError;
pub use suite::BaseSuite;
pub use suite::Suite;
pub use suite::SuiteReport;
pub use suite::TestCase;
pub use suite::TestOutcome;
pub use suite::TestResult;
pub use suite::run_suite;
