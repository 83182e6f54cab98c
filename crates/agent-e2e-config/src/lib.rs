// crates/agent-e2e-config/src/lib.rs
// ============================================================================
// Module: Agent E2E Config Library
// Description: Harness configuration model and validation.
// Purpose: Single source of truth for agent-e2e.toml semantics.
// Dependencies: agent-e2e-core, serde, toml, url
// ============================================================================

//! ## Overview
//! `agent-e2e-config` loads the harness configuration from TOML, applies
//! `AGENT_E2E_*` environment overrides, and validates the result. Invalid
//! configuration fails closed before any environment is provisioned.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
