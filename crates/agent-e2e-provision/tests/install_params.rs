// crates/agent-e2e-provision/tests/install_params.rs
// ============================================================================
// Module: Agent Install Parameter Tests
// Description: Install script rendering and parameter validation.
// Purpose: Ensure credentials are injected at apply time and DD_* inputs are checked.
// ============================================================================

//! Agent install parameter tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use agent_e2e_provision::AgentInstallParams;
use agent_e2e_provision::ProvisionError;
use agent_e2e_remote::paths;

#[test]
fn install_script_injects_credentials_and_version() {
    let params = AgentInstallParams::new()
        .with_version("7.61.0")
        .with_remote_updates(true)
        .with_installer_registry("install.datad0g.com", Some("GCR"));
    let script = params.install_script("secret-key", "datadoghq.eu").unwrap();
    assert_eq!(script.env["DD_API_KEY"], "secret-key");
    assert_eq!(script.env["DD_SITE"], "datadoghq.eu");
    assert_eq!(script.env["DD_AGENT_MAJOR_VERSION"], "7");
    assert_eq!(script.env["DD_AGENT_MINOR_VERSION"], "61.0");
    assert_eq!(script.env["DD_REMOTE_UPDATES"], "true");
    assert_eq!(script.env["DD_INSTALLER_REGISTRY_URL"], "install.datad0g.com");
    assert_eq!(script.env["DD_INSTALLER_REGISTRY_AUTH"], "GCR");
}

#[test]
fn pipeline_installs_set_pipeline_id() {
    let params = AgentInstallParams::new().with_pipeline("41234567");
    let script = params.install_script("key", "datadoghq.com").unwrap();
    assert_eq!(script.env["DD_PIPELINE_ID"], "41234567");
    assert!(!script.env.contains_key("DD_AGENT_MAJOR_VERSION"));
}

#[test]
fn api_key_cannot_be_set_in_plan_env() {
    let params = AgentInstallParams::new().with_env("DD_API_KEY", "leaked");
    let err = params.install_script("key", "datadoghq.com").expect_err("reserved");
    assert_eq!(err.code(), "invalid_params");
}

#[test]
fn empty_api_key_is_rejected() {
    let err = AgentInstallParams::new().install_script("", "datadoghq.com").expect_err("empty");
    assert!(matches!(err, ProvisionError::InvalidParams { .. }));
}

#[test]
fn bad_env_names_and_versions_are_rejected() {
    let bad_env = AgentInstallParams::new().with_env("dd_site", "x");
    assert!(bad_env.install_script("key", "datadoghq.com").is_err());
    let bad_version = AgentInstallParams::new().with_version("latest; reboot");
    assert!(bad_version.install_script("key", "datadoghq.com").is_err());
    let both = AgentInstallParams::new().with_version("7.61.0").with_pipeline("1");
    assert!(both.install_script("key", "datadoghq.com").is_err());
}

#[test]
fn config_files_map_to_agent_paths() {
    let params = AgentInstallParams::new()
        .with_agent_config("log_level: debug\n")
        .with_security_agent_config("runtime_security_config:\n  enabled: true\n");
    assert_eq!(
        params.config_files(),
        vec![
            (paths::AGENT_CONFIG_FILE, "log_level: debug\n"),
            (paths::SECURITY_AGENT_CONFIG_FILE, "runtime_security_config:\n  enabled: true\n"),
        ]
    );
    assert!(AgentInstallParams::new().config_files().is_empty());
}
