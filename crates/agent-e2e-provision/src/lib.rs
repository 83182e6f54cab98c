// crates/agent-e2e-provision/src/lib.rs
// ============================================================================
// Module: Agent E2E Provision
// Description: Declarative environment plans and their application.
// Purpose: Describe test infrastructure as ordered steps and hand each step to
//          an external orchestration engine.
// Dependencies: agent-e2e-core, agent-e2e-remote, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`ProvisionPlan`] lists named [`Step`]s with dependency edges. Builders in
//! [`builders`] produce the standard plans for host, GPU host, Docker host,
//! Kind, and ECS environments. [`apply_plan`] walks a plan in deterministic
//! topological order and hands each step to an [`Orchestrator`]; the first
//! failing step aborts the run.
//!
//! Security posture: plans never carry the backend API key. It is injected
//! when an orchestrator renders the install step.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod builders;
pub mod error;
pub mod orchestrator;
pub mod plan;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use builders::DockerHostOptions;
pub use builders::EcsOptions;
pub use builders::GpuOptions;
pub use builders::KindOptions;
pub use builders::docker_host_plan;
pub use builders::ecs_plan;
pub use builders::gpu_host_plan;
pub use builders::host_plan;
pub use builders::kind_plan;
pub use error::ProvisionError;
pub use orchestrator::Orchestrator;
pub use orchestrator::ProvisionedEnvironment;
pub use orchestrator::RecordingOrchestrator;
pub use orchestrator::ResourceHandle;
pub use orchestrator::StepContext;
pub use orchestrator::apply_plan;
pub use orchestrator::destroy_environment;
pub use plan::AgentInstallParams;
pub use plan::EnvironmentKind;
pub use plan::ProvisionPlan;
pub use plan::Step;
pub use plan::StepKind;
pub use plan::VmParams;
