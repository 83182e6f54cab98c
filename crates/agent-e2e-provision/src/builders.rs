// crates/agent-e2e-provision/src/builders.rs
// ============================================================================
// Module: Environment Builders
// Description: Standard plans for host, GPU host, Docker host, Kind, and ECS.
// Purpose: Give suites one call per environment shape.
// Dependencies: crate::plan
// ============================================================================

//! ## Overview
//! Each builder returns a validated [`ProvisionPlan`] with a fake intake and
//! the agent wired to it. Step ids are stable so suites and orchestrators can
//! look up handles by name (see [`step_ids`]).

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::ProvisionError;
use crate::plan::AgentInstallParams;
use crate::plan::EnvironmentKind;
use crate::plan::ProvisionPlan;
use crate::plan::Step;
use crate::plan::StepKind;
use crate::plan::VmParams;

// ============================================================================
// SECTION: Step Ids
// ============================================================================

/// Step ids used by the standard builders.
pub mod step_ids {
    /// Virtual machine.
    pub const VM: &str = "vm";
    /// Fake intake.
    pub const FAKE_INTAKE: &str = "fake-intake";
    /// Agent installation or deployment.
    pub const AGENT: &str = "agent";
    /// Docker engine.
    pub const DOCKER: &str = "docker";
    /// ECR credential helper.
    pub const ECR_CREDENTIALS: &str = "ecr-credentials";
    /// GPU device validation.
    pub const GPU_VALIDATION: &str = "gpu-validation";
    /// Image pre-pull.
    pub const IMAGE_PRE_PULL: &str = "image-pre-pull";
    /// Kind cluster.
    pub const KIND_CLUSTER: &str = "kind-cluster";
    /// ECS cluster.
    pub const ECS_CLUSTER: &str = "ecs-cluster";
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options for [`gpu_host_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuOptions {
    /// Devices the host must expose.
    pub expected_devices: u32,
    /// Images to pull once Docker is ready, such as CUDA workloads.
    pub images: Vec<String>,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            expected_devices: 1,
            images: vec!["nvidia/cuda:12.4.1-base-ubuntu22.04".to_string()],
        }
    }
}

/// Options for [`docker_host_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerHostOptions {
    /// Agent container image.
    pub agent_image: String,
}

impl Default for DockerHostOptions {
    fn default() -> Self {
        Self {
            agent_image: "gcr.io/datadoghq/agent:7".to_string(),
        }
    }
}

/// Options for [`kind_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOptions {
    /// Kubernetes version for the Kind node image.
    pub kubernetes_version: String,
    /// Helm values for the agent chart.
    pub helm_values: String,
    /// Namespace for the release.
    pub namespace: String,
}

impl Default for KindOptions {
    fn default() -> Self {
        Self {
            kubernetes_version: "v1.30.0".to_string(),
            helm_values: String::new(),
            namespace: "datadog".to_string(),
        }
    }
}

/// Options for [`ecs_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcsOptions {
    /// Fargate capacity instead of EC2 instances.
    pub fargate: bool,
    /// Task family for the agent task.
    pub task_family: String,
    /// Images in the agent task.
    pub images: Vec<String>,
}

impl Default for EcsOptions {
    fn default() -> Self {
        Self {
            fargate: false,
            task_family: "datadog-agent".to_string(),
            images: vec!["public.ecr.aws/datadog/agent:7".to_string()],
        }
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// VM, fake intake, and the agent installed from packages.
///
/// # Errors
///
/// Returns [`ProvisionError`] when `agent` parameters are invalid.
pub fn host_plan(
    stack: &str,
    vm: VmParams,
    agent: AgentInstallParams,
) -> Result<ProvisionPlan, ProvisionError> {
    let mut plan = ProvisionPlan::new(stack, EnvironmentKind::Host);
    plan.add_step(Step::new(step_ids::VM, StepKind::Vm(vm)))?;
    plan.add_step(Step::new(step_ids::FAKE_INTAKE, StepKind::FakeIntake))?;
    plan.add_step(
        Step::new(step_ids::AGENT, StepKind::AgentInstall(agent))
            .after(step_ids::VM)
            .after(step_ids::FAKE_INTAKE),
    )?;
    Ok(plan)
}

/// GPU VM where Docker waits for the ECR credential helper and GPU
/// validation, images are pre-pulled, and the agent installs last.
///
/// # Errors
///
/// Returns [`ProvisionError`] when parameters are invalid.
pub fn gpu_host_plan(
    stack: &str,
    vm: VmParams,
    agent: AgentInstallParams,
    gpu: GpuOptions,
) -> Result<ProvisionPlan, ProvisionError> {
    let mut plan = ProvisionPlan::new(stack, EnvironmentKind::Host);
    plan.add_step(Step::new(step_ids::VM, StepKind::Vm(vm)))?;
    plan.add_step(Step::new(step_ids::FAKE_INTAKE, StepKind::FakeIntake))?;
    plan.add_step(
        Step::new(step_ids::ECR_CREDENTIALS, StepKind::EcrCredentialHelper).after(step_ids::VM),
    )?;
    plan.add_step(
        Step::new(
            step_ids::GPU_VALIDATION,
            StepKind::GpuValidation {
                expected_devices: gpu.expected_devices,
            },
        )
        .after(step_ids::VM),
    )?;
    plan.add_step(
        Step::new(step_ids::DOCKER, StepKind::DockerInstall)
            .after(step_ids::ECR_CREDENTIALS)
            .after(step_ids::GPU_VALIDATION),
    )?;
    let mut agent_step = Step::new(step_ids::AGENT, StepKind::AgentInstall(agent))
        .after(step_ids::DOCKER)
        .after(step_ids::FAKE_INTAKE);
    if !gpu.images.is_empty() {
        plan.add_step(
            Step::new(
                step_ids::IMAGE_PRE_PULL,
                StepKind::ImagePrePull {
                    images: gpu.images,
                },
            )
            .after(step_ids::DOCKER),
        )?;
        agent_step = agent_step.after(step_ids::IMAGE_PRE_PULL);
    }
    plan.add_step(agent_step)?;
    Ok(plan)
}

/// VM running the agent as a container next to a fake intake.
///
/// # Errors
///
/// Returns [`ProvisionError`] when parameters are invalid.
pub fn docker_host_plan(
    stack: &str,
    vm: VmParams,
    agent: AgentInstallParams,
    options: DockerHostOptions,
) -> Result<ProvisionPlan, ProvisionError> {
    let mut plan = ProvisionPlan::new(stack, EnvironmentKind::DockerHost);
    plan.add_step(Step::new(step_ids::VM, StepKind::Vm(vm)))?;
    plan.add_step(Step::new(step_ids::FAKE_INTAKE, StepKind::FakeIntake))?;
    plan.add_step(Step::new(step_ids::DOCKER, StepKind::DockerInstall).after(step_ids::VM))?;
    plan.add_step(
        Step::new(step_ids::AGENT, StepKind::AgentInstall(agent.with_image(options.agent_image)))
            .after(step_ids::DOCKER)
            .after(step_ids::FAKE_INTAKE),
    )?;
    Ok(plan)
}

/// Kind cluster on a VM with the agent chart released through Helm.
///
/// # Errors
///
/// Returns [`ProvisionError`] when parameters are invalid.
pub fn kind_plan(
    stack: &str,
    vm: VmParams,
    options: KindOptions,
) -> Result<ProvisionPlan, ProvisionError> {
    let mut plan = ProvisionPlan::new(stack, EnvironmentKind::Kind);
    plan.add_step(Step::new(step_ids::VM, StepKind::Vm(vm)))?;
    plan.add_step(Step::new(step_ids::FAKE_INTAKE, StepKind::FakeIntake))?;
    plan.add_step(
        Step::new(
            step_ids::KIND_CLUSTER,
            StepKind::KindCluster {
                kubernetes_version: options.kubernetes_version,
            },
        )
        .after(step_ids::VM),
    )?;
    plan.add_step(
        Step::new(
            step_ids::AGENT,
            StepKind::HelmRelease {
                release: "datadog-agent".to_string(),
                chart: "datadog/datadog".to_string(),
                namespace: options.namespace,
                values: options.helm_values,
            },
        )
        .after(step_ids::KIND_CLUSTER)
        .after(step_ids::FAKE_INTAKE),
    )?;
    Ok(plan)
}

/// ECS cluster running the agent as a task.
///
/// # Errors
///
/// Returns [`ProvisionError`] when parameters are invalid.
pub fn ecs_plan(stack: &str, options: EcsOptions) -> Result<ProvisionPlan, ProvisionError> {
    let mut plan = ProvisionPlan::new(stack, EnvironmentKind::Ecs);
    plan.add_step(Step::new(
        step_ids::ECS_CLUSTER,
        StepKind::EcsCluster {
            fargate: options.fargate,
        },
    ))?;
    plan.add_step(Step::new(step_ids::FAKE_INTAKE, StepKind::FakeIntake))?;
    plan.add_step(
        Step::new(
            step_ids::AGENT,
            StepKind::EcsTask {
                family: options.task_family,
                images: options.images,
            },
        )
        .after(step_ids::ECS_CLUSTER)
        .after(step_ids::FAKE_INTAKE),
    )?;
    Ok(plan)
}
