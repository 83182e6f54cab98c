// crates/agent-e2e-provision/src/orchestrator.rs
// ============================================================================
// Module: Plan Application
// Description: Orchestrator seam, plan application, and a recording dry run.
// Purpose: Apply plans step by step with context, and tear environments down.
// Dependencies: agent-e2e-core, serde
// ============================================================================

//! ## Overview
//! [`Orchestrator`] is the seam to the external engine that actually creates
//! resources. [`apply_plan`] validates the plan, walks it in execution order,
//! hands every step the handles of its dependencies, and aborts on the first
//! failure with the step id attached. Nothing is rolled back on failure; the
//! caller discards the environment.
//!
//! [`RecordingOrchestrator`] applies nothing and returns synthetic handles,
//! for dry runs and tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use agent_e2e_core::EventSink;
use agent_e2e_core::HarnessEvent;
use serde::Serialize;

use crate::builders::step_ids;
use crate::error::ProvisionError;
use crate::plan::EnvironmentKind;
use crate::plan::ProvisionPlan;
use crate::plan::Step;
use crate::plan::StepKind;

// ============================================================================
// SECTION: Handles
// ============================================================================

/// Output of one applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceHandle {
    /// Step id.
    pub step: String,
    /// Step kind label.
    pub kind: String,
    /// Named outputs, such as `host` or `url`.
    pub outputs: BTreeMap<String, String>,
}

impl ResourceHandle {
    /// Creates a handle without outputs.
    #[must_use]
    pub fn new(step: &Step) -> Self {
        Self {
            step: step.id.clone(),
            kind: step.kind.label().to_string(),
            outputs: BTreeMap::new(),
        }
    }

    /// Adds an output.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Returns output `key`.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// What an orchestrator sees when applying one step.
pub struct StepContext<'a> {
    /// Stack name.
    pub stack: &'a str,
    /// Environment kind.
    pub environment: EnvironmentKind,
    /// Step to apply.
    pub step: &'a Step,
    /// Handles of the step's dependencies, in declaration order.
    pub dependencies: Vec<&'a ResourceHandle>,
}

impl StepContext<'_> {
    /// Returns the handle of dependency `step`.
    #[must_use]
    pub fn dependency(&self, step: &str) -> Option<&ResourceHandle> {
        self.dependencies.iter().copied().find(|handle| handle.step == step)
    }

    /// Returns the first dependency output named `key`.
    #[must_use]
    pub fn dependency_output(&self, key: &str) -> Option<&str> {
        self.dependencies.iter().find_map(|handle| handle.output(key))
    }
}

// ============================================================================
// SECTION: Orchestrator Seam
// ============================================================================

/// External engine creating and destroying resources.
pub trait Orchestrator {
    /// Creates the resource for `context.step`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the resource cannot be created.
    fn apply(&mut self, context: &StepContext<'_>) -> Result<ResourceHandle, ProvisionError>;

    /// Destroys a resource created by [`Orchestrator::apply`].
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the resource cannot be destroyed.
    fn destroy(&mut self, handle: &ResourceHandle) -> Result<(), ProvisionError>;
}

// ============================================================================
// SECTION: Provisioned Environment
// ============================================================================

/// Handles of a fully applied plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedEnvironment {
    /// Stack name.
    pub name: String,
    /// Environment kind.
    pub environment: EnvironmentKind,
    /// Handles in apply order.
    pub handles: Vec<ResourceHandle>,
}

impl ProvisionedEnvironment {
    /// Returns the handle of `step`.
    #[must_use]
    pub fn handle(&self, step: &str) -> Option<&ResourceHandle> {
        self.handles.iter().find(|handle| handle.step == step)
    }

    /// Returns output `key` of `step`.
    #[must_use]
    pub fn output(&self, step: &str, key: &str) -> Option<&str> {
        self.handle(step).and_then(|handle| handle.output(key))
    }

    /// Returns the VM address, when the environment has one.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.output(step_ids::VM, "host")
    }

    /// Returns the fake intake URL.
    #[must_use]
    pub fn fake_intake_url(&self) -> Option<&str> {
        self.output(step_ids::FAKE_INTAKE, "url")
    }
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies `plan` in execution order.
///
/// # Errors
///
/// Returns the validation error, or [`ProvisionError::StepFailed`] for the
/// first step the orchestrator rejects. Steps already applied stay in place.
pub fn apply_plan(
    plan: &ProvisionPlan,
    orchestrator: &mut dyn Orchestrator,
    sink: &dyn EventSink,
) -> Result<ProvisionedEnvironment, ProvisionError> {
    plan.validate()?;
    let order = plan.execution_order()?;
    let mut handles: Vec<ResourceHandle> = Vec::with_capacity(order.len());
    for step in order {
        let handle = {
            let dependencies = step
                .depends_on
                .iter()
                .filter_map(|id| handles.iter().find(|handle| &handle.step == id))
                .collect();
            let context = StepContext {
                stack: &plan.name,
                environment: plan.environment,
                step,
                dependencies,
            };
            orchestrator.apply(&context).map_err(|err| match err {
                ProvisionError::StepFailed {
                    ..
                } => err,
                other => ProvisionError::StepFailed {
                    step: step.id.clone(),
                    error: other.to_string(),
                },
            })?
        };
        sink.emit(&HarnessEvent::StepApplied {
            stack: plan.name.clone(),
            step: step.id.clone(),
            kind: step.kind.label().to_string(),
        });
        handles.push(handle);
    }
    Ok(ProvisionedEnvironment {
        name: plan.name.clone(),
        environment: plan.environment,
        handles,
    })
}

/// Destroys `environment` in reverse apply order.
///
/// Every handle is attempted; failures are collected rather than returned
/// early.
pub fn destroy_environment(
    environment: &ProvisionedEnvironment,
    orchestrator: &mut dyn Orchestrator,
) -> Vec<ProvisionError> {
    environment
        .handles
        .iter()
        .rev()
        .filter_map(|handle| {
            orchestrator.destroy(handle).err().map(|err| match err {
                ProvisionError::TeardownFailed {
                    ..
                } => err,
                other => ProvisionError::TeardownFailed {
                    step: handle.step.clone(),
                    error: other.to_string(),
                },
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Recording Orchestrator
// ============================================================================

/// Placeholder substituted for the API key in dry-run install commands.
pub const DRY_RUN_API_KEY: &str = "<api-key>";

/// Dry-run orchestrator returning synthetic handles.
#[derive(Debug, Default)]
pub struct RecordingOrchestrator {
    /// Steps applied, in order.
    applied: Vec<String>,
    /// Steps destroyed, in order.
    destroyed: Vec<String>,
    /// Steps whose apply fails.
    fail_apply: BTreeSet<String>,
    /// Steps whose destroy fails.
    fail_destroy: BTreeSet<String>,
}

impl RecordingOrchestrator {
    /// Creates an orchestrator where every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes applying `step` fail.
    #[must_use]
    pub fn fail_apply(mut self, step: impl Into<String>) -> Self {
        self.fail_apply.insert(step.into());
        self
    }

    /// Makes destroying `step` fail.
    #[must_use]
    pub fn fail_destroy(mut self, step: impl Into<String>) -> Self {
        self.fail_destroy.insert(step.into());
        self
    }

    /// Returns applied step ids in order.
    #[must_use]
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// Returns destroyed step ids in order.
    #[must_use]
    pub fn destroyed(&self) -> &[String] {
        &self.destroyed
    }

    /// Builds the synthetic handle for `context.step`.
    fn synthesize(context: &StepContext<'_>) -> Result<ResourceHandle, ProvisionError> {
        let step = context.step;
        let handle = ResourceHandle::new(step);
        let handle = match &step.kind {
            StepKind::Vm(vm) => handle
                .with_output("host", format!("{}-{}.internal", context.stack, step.id))
                .with_output("user", "ubuntu")
                .with_output("os", vm.os.as_str())
                .with_output("arch", vm.arch.as_str()),
            StepKind::FakeIntake => {
                handle.with_output("url", format!("http://{}-fakeintake.internal", context.stack))
            }
            StepKind::AgentInstall(params) => {
                let script = params.install_script(DRY_RUN_API_KEY, "datadoghq.com")?;
                let command = script.command().map_err(|err| ProvisionError::InvalidParams {
                    step: step.id.clone(),
                    error: err.to_string(),
                })?;
                let files: Vec<&str> = params.config_files().iter().map(|(path, _)| *path).collect();
                let handle = handle
                    .with_output("install_command", command)
                    .with_output("config_files", files.join(","));
                match context.dependency_output("url") {
                    Some(url) => handle.with_output("dd_url", url),
                    None => handle,
                }
            }
            StepKind::KindCluster {
                kubernetes_version,
            } => handle
                .with_output("kubeconfig", format!("/home/ubuntu/.kube/{}.yaml", context.stack))
                .with_output("kubernetes_version", kubernetes_version.as_str()),
            StepKind::HelmRelease {
                release,
                namespace,
                ..
            } => handle
                .with_output("release", release.as_str())
                .with_output("namespace", namespace.as_str()),
            StepKind::EcsCluster {
                ..
            } => handle.with_output(
                "cluster_arn",
                format!("arn:aws:ecs:us-east-1:000000000000:cluster/{}", context.stack),
            ),
            StepKind::EcsTask {
                family,
                ..
            } => handle.with_output("family", family.as_str()),
            StepKind::DockerInstall
            | StepKind::EcrCredentialHelper
            | StepKind::GpuValidation {
                ..
            }
            | StepKind::ImagePrePull {
                ..
            } => handle,
        };
        Ok(handle)
    }
}

impl Orchestrator for RecordingOrchestrator {
    fn apply(&mut self, context: &StepContext<'_>) -> Result<ResourceHandle, ProvisionError> {
        let step = &context.step.id;
        if self.fail_apply.contains(step) {
            return Err(ProvisionError::StepFailed {
                step: step.clone(),
                error: "injected failure".to_string(),
            });
        }
        let handle = Self::synthesize(context)?;
        self.applied.push(step.clone());
        Ok(handle)
    }

    fn destroy(&mut self, handle: &ResourceHandle) -> Result<(), ProvisionError> {
        if self.fail_destroy.contains(&handle.step) {
            return Err(ProvisionError::TeardownFailed {
                step: handle.step.clone(),
                error: "injected failure".to_string(),
            });
        }
        self.destroyed.push(handle.step.clone());
        Ok(())
    }
}
