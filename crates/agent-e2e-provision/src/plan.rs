// crates/agent-e2e-provision/src/plan.rs
// ============================================================================
// Module: Provision Plan
// Description: Steps, step parameters, and dependency ordering for test
//              environments.
// Purpose: Describe infrastructure declaratively and order it deterministically.
// Dependencies: agent-e2e-remote, serde
// ============================================================================

//! ## Overview
//! A [`ProvisionPlan`] is a named list of [`Step`]s. Each step carries a
//! [`StepKind`] with its parameters and the ids of the steps it waits for.
//!
//! Invariants:
//! - Step ids are unique within a plan and match `[a-z0-9-]{1,64}`.
//! - [`ProvisionPlan::add_step`] only accepts dependencies already in the
//!   plan, so plans built through it are acyclic.
//! - [`ProvisionPlan::execution_order`] is a topological order that breaks
//!   ties by insertion order, so the same plan always applies the same way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use agent_e2e_remote::InstallScript;
use agent_e2e_remote::paths;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ProvisionError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum step id length.
pub const MAX_STEP_ID_LENGTH: usize = 64;

/// Environment variables the harness sets itself at apply time.
const RESERVED_ENV: [&str; 2] = ["DD_API_KEY", "DD_SITE"];

// ============================================================================
// SECTION: Environment Kinds
// ============================================================================

/// Kind of environment a plan stands up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentKind {
    /// Single VM with the agent installed from packages.
    Host,
    /// Kind cluster on a VM with the agent deployed through Helm.
    Kind,
    /// ECS cluster running the agent as a task.
    Ecs,
    /// VM running the agent as a Docker container.
    DockerHost,
}

impl EnvironmentKind {
    /// Every environment kind.
    pub const ALL: [Self; 4] = [Self::Host, Self::Kind, Self::Ecs, Self::DockerHost];

    /// Returns the kebab-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Kind => "kind",
            Self::Ecs => "ecs",
            Self::DockerHost => "docker-host",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| format!("unknown environment kind: {value}"))
    }
}

// ============================================================================
// SECTION: Step Parameters
// ============================================================================

/// Virtual machine shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VmParams {
    /// OS image descriptor, e.g. `ubuntu-22.04`.
    pub os: String,
    /// Instance type.
    pub instance_type: String,
    /// CPU architecture.
    pub arch: String,
}

impl Default for VmParams {
    fn default() -> Self {
        Self {
            os: "ubuntu-22.04".to_string(),
            instance_type: "t3.medium".to_string(),
            arch: "x86_64".to_string(),
        }
    }
}

impl VmParams {
    /// Returns a GPU-capable VM shape.
    #[must_use]
    pub fn gpu() -> Self {
        Self {
            instance_type: "g4dn.xlarge".to_string(),
            ..Self::default()
        }
    }
}

/// Parameters for installing the agent under test.
///
/// The backend API key is deliberately absent; orchestrators inject it when
/// rendering the install command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentInstallParams {
    /// Agent version, e.g. `7.61.0`; latest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// CI pipeline to install from, instead of a release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// Contents of `datadog.yaml`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_config: String,
    /// Contents of `system-probe.yaml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_probe_config: Option<String>,
    /// Contents of `security-agent.yaml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_agent_config: Option<String>,
    /// `DD_*` variables passed to the install script.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Container images the install step pulls or runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl AgentInstallParams {
    /// Creates empty parameters: latest release, default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the agent version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Installs from a CI pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    /// Sets `datadog.yaml` contents.
    #[must_use]
    pub fn with_agent_config(mut self, config: impl Into<String>) -> Self {
        self.agent_config = config.into();
        self
    }

    /// Sets `system-probe.yaml` contents.
    #[must_use]
    pub fn with_system_probe_config(mut self, config: impl Into<String>) -> Self {
        self.system_probe_config = Some(config.into());
        self
    }

    /// Sets `security-agent.yaml` contents.
    #[must_use]
    pub fn with_security_agent_config(mut self, config: impl Into<String>) -> Self {
        self.security_agent_config = Some(config.into());
        self
    }

    /// Sets an install script environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enables or disables remote updates through `DD_REMOTE_UPDATES`.
    #[must_use]
    pub fn with_remote_updates(self, enabled: bool) -> Self {
        self.with_env("DD_REMOTE_UPDATES", if enabled { "true" } else { "false" })
    }

    /// Points the installer at a package registry.
    #[must_use]
    pub fn with_installer_registry(self, url: impl Into<String>, auth: Option<&str>) -> Self {
        let params = self.with_env("DD_INSTALLER_REGISTRY_URL", url);
        match auth {
            Some(auth) => params.with_env("DD_INSTALLER_REGISTRY_AUTH", auth),
            None => params,
        }
    }

    /// Adds a container image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    /// Returns `(path, contents)` for every configuration file to write.
    #[must_use]
    pub fn config_files(&self) -> Vec<(&'static str, &str)> {
        let mut files = Vec::new();
        if !self.agent_config.is_empty() {
            files.push((paths::AGENT_CONFIG_FILE, self.agent_config.as_str()));
        }
        if let Some(config) = &self.system_probe_config {
            files.push((paths::SYSTEM_PROBE_CONFIG_FILE, config.as_str()));
        }
        if let Some(config) = &self.security_agent_config {
            files.push((paths::SECURITY_AGENT_CONFIG_FILE, config.as_str()));
        }
        files
    }

    /// Renders the install script invocation with credentials injected.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidParams`] when the parameters are
    /// invalid or `api_key` is empty.
    pub fn install_script(&self, api_key: &str, site: &str) -> Result<InstallScript, ProvisionError> {
        self.validate("agent-install")?;
        if api_key.is_empty() {
            return Err(invalid("agent-install", "api key is empty"));
        }
        let mut script = InstallScript::new().env("DD_API_KEY", api_key).env("DD_SITE", site);
        for (key, value) in &self.env {
            script = script.env(key.as_str(), value.as_str());
        }
        if let Some(version) = &self.version {
            let (major, minor) = version.split_once('.').unwrap_or((version.as_str(), ""));
            script = script.env("DD_AGENT_MAJOR_VERSION", major);
            if !minor.is_empty() {
                script = script.env("DD_AGENT_MINOR_VERSION", minor);
            }
        }
        if let Some(pipeline_id) = &self.pipeline_id {
            script = script.env("DD_PIPELINE_ID", pipeline_id.as_str());
        }
        Ok(script)
    }

    /// Checks variable names, reserved variables, and version shape.
    fn validate(&self, step: &str) -> Result<(), ProvisionError> {
        for key in self.env.keys() {
            let valid = !key.is_empty()
                && key.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
            if !valid {
                return Err(invalid(step, &format!("invalid env name: {key}")));
            }
            if RESERVED_ENV.contains(&key.as_str()) {
                return Err(invalid(step, &format!("{key} is set by the harness")));
            }
        }
        if let Some(version) = &self.version {
            let valid = version.starts_with(|c: char| c.is_ascii_digit())
                && version.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '~'));
            if !valid {
                return Err(invalid(step, &format!("invalid agent version: {version}")));
            }
        }
        if self.version.is_some() && self.pipeline_id.is_some() {
            return Err(invalid(step, "version and pipeline are mutually exclusive"));
        }
        Ok(())
    }
}

/// Builds an [`ProvisionError::InvalidParams`].
fn invalid(step: &str, error: &str) -> ProvisionError {
    ProvisionError::InvalidParams {
        step: step.to_string(),
        error: error.to_string(),
    }
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// What a step provisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Virtual machine.
    Vm(VmParams),
    /// Fake intake receiving agent payloads.
    FakeIntake,
    /// Agent installation.
    AgentInstall(AgentInstallParams),
    /// Docker engine installation.
    DockerInstall,
    /// ECR credential helper installation.
    EcrCredentialHelper,
    /// GPU device validation.
    GpuValidation {
        /// Devices `nvidia-smi` must list.
        expected_devices: u32,
    },
    /// Image pre-pull.
    ImagePrePull {
        /// Images to pull.
        images: Vec<String>,
    },
    /// Kind cluster.
    KindCluster {
        /// Kubernetes version for the node image.
        kubernetes_version: String,
    },
    /// Helm release of the agent chart.
    HelmRelease {
        /// Release name.
        release: String,
        /// Chart reference.
        chart: String,
        /// Target namespace.
        namespace: String,
        /// Values file contents.
        values: String,
    },
    /// ECS cluster.
    EcsCluster {
        /// Fargate capacity instead of EC2 instances.
        fargate: bool,
    },
    /// ECS task definition and service.
    EcsTask {
        /// Task family.
        family: String,
        /// Container images in the task.
        images: Vec<String>,
    },
}

impl StepKind {
    /// Returns the snake-case label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Vm(_) => "vm",
            Self::FakeIntake => "fake_intake",
            Self::AgentInstall(_) => "agent_install",
            Self::DockerInstall => "docker_install",
            Self::EcrCredentialHelper => "ecr_credential_helper",
            Self::GpuValidation {
                ..
            } => "gpu_validation",
            Self::ImagePrePull {
                ..
            } => "image_pre_pull",
            Self::KindCluster {
                ..
            } => "kind_cluster",
            Self::HelmRelease {
                ..
            } => "helm_release",
            Self::EcsCluster {
                ..
            } => "ecs_cluster",
            Self::EcsTask {
                ..
            } => "ecs_task",
        }
    }

    /// Checks parameters for step `step`.
    fn validate(&self, step: &str) -> Result<(), ProvisionError> {
        match self {
            Self::AgentInstall(params) => params.validate(step),
            Self::GpuValidation {
                expected_devices: 0,
            } => Err(invalid(step, "expected_devices must be non-zero")),
            Self::ImagePrePull {
                images,
            } if images.is_empty() => Err(invalid(step, "no images to pull")),
            Self::HelmRelease {
                release,
                chart,
                ..
            } if release.is_empty() || chart.is_empty() => {
                Err(invalid(step, "release and chart are required"))
            }
            Self::EcsTask {
                family,
                images,
            } if family.is_empty() || images.is_empty() => {
                Err(invalid(step, "family and images are required"))
            }
            _ => Ok(()),
        }
    }
}

/// One provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Step id, unique within the plan.
    pub id: String,
    /// Resource to provision.
    pub kind: StepKind,
    /// Steps that must be applied first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Step {
    /// Creates a step without dependencies.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on: Vec::new(),
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// Named, ordered set of provisioning steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionPlan {
    /// Stack name.
    pub name: String,
    /// Environment kind.
    pub environment: EnvironmentKind,
    /// Steps in insertion order.
    steps: Vec<Step>,
}

impl ProvisionPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: EnvironmentKind) -> Self {
        Self {
            name: name.into(),
            environment,
            steps: Vec::new(),
        }
    }

    /// Returns steps in insertion order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the step with `id`.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Appends `step`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the id is malformed or taken, a
    /// dependency is not already in the plan, or parameters are invalid.
    pub fn add_step(&mut self, step: Step) -> Result<(), ProvisionError> {
        validate_step_id(&step.id)?;
        if self.step(&step.id).is_some() {
            return Err(ProvisionError::DuplicateStep {
                id: step.id,
            });
        }
        for dependency in &step.depends_on {
            if self.step(dependency).is_none() {
                return Err(ProvisionError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        step.kind.validate(&step.id)?;
        self.steps.push(step);
        Ok(())
    }

    /// Makes `step` wait for `dependency`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when either step is unknown or the edge
    /// would close a cycle; the plan is left unchanged.
    pub fn add_dependency(&mut self, step: &str, dependency: &str) -> Result<(), ProvisionError> {
        if self.step(dependency).is_none() {
            return Err(ProvisionError::UnknownDependency {
                step: step.to_string(),
                dependency: dependency.to_string(),
            });
        }
        let index = self.steps.iter().position(|candidate| candidate.id == step).ok_or_else(|| {
            ProvisionError::UnknownDependency {
                step: dependency.to_string(),
                dependency: step.to_string(),
            }
        })?;
        if self.steps[index].depends_on.iter().any(|existing| existing == dependency) {
            return Ok(());
        }
        self.steps[index].depends_on.push(dependency.to_string());
        if let Err(err) = self.execution_order() {
            self.steps[index].depends_on.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Checks the whole plan, including plans that were deserialized.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] found.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let mut seen = BTreeSet::new();
        for step in &self.steps {
            validate_step_id(&step.id)?;
            if !seen.insert(step.id.as_str()) {
                return Err(ProvisionError::DuplicateStep {
                    id: step.id.clone(),
                });
            }
            step.kind.validate(&step.id)?;
        }
        for step in &self.steps {
            for dependency in &step.depends_on {
                if !seen.contains(dependency.as_str()) {
                    return Err(ProvisionError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        self.execution_order().map(|_| ())
    }

    /// Returns steps in dependency order, ties broken by insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Cycle`] naming the steps that could not be
    /// ordered.
    pub fn execution_order(&self) -> Result<Vec<&Step>, ProvisionError> {
        let mut done: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.steps.len());
        while order.len() < self.steps.len() {
            let next = self.steps.iter().find(|step| {
                !done.contains(step.id.as_str())
                    && step.depends_on.iter().all(|dependency| done.contains(dependency.as_str()))
            });
            let Some(step) = next else {
                return Err(ProvisionError::Cycle {
                    steps: self
                        .steps
                        .iter()
                        .filter(|step| !done.contains(step.id.as_str()))
                        .map(|step| step.id.clone())
                        .collect(),
                });
            };
            done.insert(step.id.as_str());
            order.push(step);
        }
        Ok(order)
    }
}

/// Accepts ids made of `[a-z0-9-]`, up to [`MAX_STEP_ID_LENGTH`] bytes.
fn validate_step_id(id: &str) -> Result<(), ProvisionError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_STEP_ID_LENGTH
        && id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidStepId {
            id: id.to_string(),
        })
    }
}
