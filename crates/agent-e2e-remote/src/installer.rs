// crates/agent-e2e-remote/src/installer.rs
// ============================================================================
// Module: Installer CLI
// Description: Package install, experiment, and state inspection commands.
// Purpose: Drive the installer under test and read package symlinks.
// Dependencies: agent-e2e-core
// ============================================================================

//! ## Overview
//! The installer keeps each package under `/opt/datadog-packages/<pkg>`
//! with `stable` and `experiment` symlinks pointing at version directories.
//! [`InstallerCli::package_state`] resolves both links; a missing link reads
//! as `None`. [`InstallScript`] renders the environment-driven install script
//! invocation used to bootstrap hosts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::executor::Privilege;
use crate::executor::RemoteExecutor;
use crate::executor::shell_quote;
use crate::paths;

// ============================================================================
// SECTION: Package State
// ============================================================================

/// Versions a package's symlinks resolve to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageState {
    /// Version behind `stable`.
    pub stable: Option<String>,
    /// Version behind `experiment`.
    pub experiment: Option<String>,
}

impl PackageState {
    /// Returns true when an experiment is running on a different version.
    #[must_use]
    pub fn experiment_active(&self) -> bool {
        self.experiment.is_some() && self.experiment != self.stable
    }
}

// ============================================================================
// SECTION: Installer CLI
// ============================================================================

/// Installer binary on one host.
pub struct InstallerCli<'a> {
    /// Executor for the host.
    exec: &'a dyn RemoteExecutor,
}

impl<'a> InstallerCli<'a> {
    /// Creates a wrapper over `exec`.
    #[must_use]
    pub fn new(exec: &'a dyn RemoteExecutor) -> Self {
        Self {
            exec,
        }
    }

    /// Runs `installer bootstrap`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn bootstrap(&self) -> Result<(), RemoteError> {
        self.run("bootstrap")
    }

    /// Installs the package at `url` as stable.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn install(&self, url: &str) -> Result<(), RemoteError> {
        self.run(&format!("install {}", shell_quote(url)))
    }

    /// Removes `package`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn remove(&self, package: &str) -> Result<(), RemoteError> {
        self.run(&format!("remove {}", package_arg(package)?))
    }

    /// Installs the package at `url` as an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn install_experiment(&self, url: &str) -> Result<(), RemoteError> {
        self.run(&format!("install-experiment {}", shell_quote(url)))
    }

    /// Promotes the running experiment of `package` to stable.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn promote_experiment(&self, package: &str) -> Result<(), RemoteError> {
        self.run(&format!("promote-experiment {}", package_arg(package)?))
    }

    /// Stops and removes the experiment of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the command fails.
    pub fn remove_experiment(&self, package: &str) -> Result<(), RemoteError> {
        self.run(&format!("remove-experiment {}", package_arg(package)?))
    }

    /// Resolves the `stable` and `experiment` links of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the package name is invalid or `readlink`
    /// cannot run.
    pub fn package_state(&self, package: &str) -> Result<PackageState, RemoteError> {
        package_arg(package)?;
        Ok(PackageState {
            stable: self.link_version(&paths::stable_link(package))?,
            experiment: self.link_version(&paths::experiment_link(package))?,
        })
    }

    /// Runs the install script described by `script`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] when the script fails.
    pub fn run_install_script(&self, script: &InstallScript) -> Result<(), RemoteError> {
        self.exec.run_checked(&script.command()?).map(|_| ())
    }

    /// Returns the version directory `link` resolves to.
    fn link_version(&self, link: &str) -> Result<Option<String>, RemoteError> {
        let output = self.exec.run(&format!("readlink -f {}", shell_quote(link)))?;
        if !output.success() {
            return Ok(None);
        }
        let target = output.stdout.trim();
        if target.is_empty() || target == link {
            return Ok(None);
        }
        Ok(target.rsplit('/').next().map(ToString::to_string))
    }

    /// Runs `installer <args>` as root.
    fn run(&self, args: &str) -> Result<(), RemoteError> {
        let command = format!("{}{} {args}", Privilege::Root.prefix(), paths::INSTALLER_BIN);
        self.exec.run_checked(&command).map(|_| ())
    }
}

/// Validates a package name and returns it.
fn package_arg(package: &str) -> Result<&str, RemoteError> {
    let valid = !package.is_empty()
        && package.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if valid {
        Ok(package)
    } else {
        Err(RemoteError::InvalidArgument(format!("invalid package name: {package}")))
    }
}

// ============================================================================
// SECTION: Install Script
// ============================================================================

/// Default agent install script.
pub const DEFAULT_INSTALL_SCRIPT_URL: &str =
    "https://install.datadoghq.com/scripts/install_script_agent7.sh";

/// Install script invocation driven by `DD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallScript {
    /// Script URL.
    pub url: String,
    /// Environment passed to the script.
    pub env: BTreeMap<String, String>,
}

impl Default for InstallScript {
    fn default() -> Self {
        Self {
            url: DEFAULT_INSTALL_SCRIPT_URL.to_string(),
            env: BTreeMap::new(),
        }
    }
}

impl InstallScript {
    /// Creates an invocation of the default script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Renders the shell command.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidArgument`] when a variable name is not
    /// `[A-Z0-9_]+`.
    pub fn command(&self) -> Result<String, RemoteError> {
        let mut parts = Vec::with_capacity(self.env.len() + 1);
        for (key, value) in &self.env {
            let valid = !key.is_empty()
                && key.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
            if !valid {
                return Err(RemoteError::InvalidArgument(format!("invalid env name: {key}")));
            }
            parts.push(format!("{key}={}", shell_quote(value)));
        }
        parts.push(format!("bash -c \"$(curl -fsSL {})\"", shell_quote(&self.url)));
        Ok(parts.join(" "))
    }
}
