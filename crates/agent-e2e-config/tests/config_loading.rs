// crates/agent-e2e-config/tests/config_loading.rs
// =============================================================================
// Module: Config Loading Tests
// Description: File resolution, defaults, and environment overrides.
// Purpose: Ensure configuration loads deterministically and fails closed.
// =============================================================================

//! Config loading tests for agent-e2e-config.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]
#![allow(clippy::use_debug, reason = "Redaction test inspects Debug output.")]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use agent_e2e_config::CONFIG_ENV_VAR;
use agent_e2e_config::ConfigError;
use agent_e2e_config::HarnessConfig;
use agent_e2e_config::HarnessEnv;
use common::FakeEnv;
use common::assert_error_contains;

mod common;

const FULL_CONFIG: &str = r#"
[backend]
site = "datadoghq.eu"
api_key = "file-api-key"
app_key = "file-app-key"

[fake_intake]
url = "http://10.0.0.5:80"

[polling]
timeout_secs = 120
interval_secs = 5

[stack]
name_prefix = "ci"
keep_on_failure = true

[artifacts]
run_root = "/tmp/agent-e2e"
"#;

#[test]
fn explicit_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-e2e.toml");
    fs::write(&path, FULL_CONFIG).unwrap();
    let env = FakeEnv::default();
    let config = HarnessConfig::load_with(Some(&path), &|name| env.lookup(name)).unwrap();
    assert_eq!(config.backend.site, "datadoghq.eu");
    assert_eq!(config.backend.api_base_url().unwrap().as_str(), "https://api.datadoghq.eu/");
    assert_eq!(config.polling.policy().timeout, Duration::from_secs(120));
    assert!(config.stack.keep_on_failure);
    assert_eq!(config.artifacts.run_root, Some(PathBuf::from("/tmp/agent-e2e")));
}

#[test]
fn missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let env = FakeEnv::default();
    let result = HarnessConfig::load_with(Some(&dir.path().join("absent.toml")), &|name| {
        env.lookup(name)
    });
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn config_env_var_selects_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[stack]\nname_prefix = \"nightly\"\n").unwrap();
    let env = FakeEnv::with(&[(CONFIG_ENV_VAR, path.to_str().unwrap())]);
    let config = HarnessConfig::load_with(None, &|name| env.lookup(name)).unwrap();
    assert_eq!(config.stack.name_prefix, "nightly");
}

#[test]
fn env_overrides_replace_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-e2e.toml");
    fs::write(&path, FULL_CONFIG).unwrap();
    let env = FakeEnv::with(&[
        (HarnessEnv::ApiKey.as_str(), "env-api-key"),
        (HarnessEnv::Site.as_str(), "us3.datadoghq.com"),
        (HarnessEnv::FakeIntakeUrl.as_str(), "http://127.0.0.1:8080"),
        (HarnessEnv::TimeoutSeconds.as_str(), "900"),
        (HarnessEnv::KeepStacks.as_str(), "0"),
        (HarnessEnv::RunRoot.as_str(), "/var/tmp/runs"),
    ]);
    let config = HarnessConfig::load_with(Some(&path), &|name| env.lookup(name)).unwrap();
    let credentials = config.backend.credentials().unwrap();
    assert_eq!(credentials.api_key, "env-api-key");
    assert_eq!(credentials.app_key, "file-app-key");
    assert_eq!(config.backend.site, "us3.datadoghq.com");
    assert_eq!(config.fake_intake.url.as_deref(), Some("http://127.0.0.1:8080"));
    assert_eq!(config.polling.policy().timeout, Duration::from_secs(900));
    assert!(!config.stack.keep_on_failure);
    assert_eq!(config.artifacts.run_root, Some(PathBuf::from("/var/tmp/runs")));
}

#[test]
fn empty_env_value_is_rejected() {
    let env = FakeEnv::with(&[(HarnessEnv::AppKey.as_str(), "  ")]);
    let mut config = HarnessConfig::default();
    assert_error_contains(config.apply_overrides(&|name| env.lookup(name)), "must not be empty");
}

#[test]
fn malformed_env_values_are_rejected() {
    let env = FakeEnv::with(&[(HarnessEnv::TimeoutSeconds.as_str(), "0")]);
    let mut config = HarnessConfig::default();
    assert_error_contains(config.apply_overrides(&|name| env.lookup(name)), "greater than zero");

    let env = FakeEnv::with(&[(HarnessEnv::KeepStacks.as_str(), "yes")]);
    let mut config = HarnessConfig::default();
    assert_error_contains(config.apply_overrides(&|name| env.lookup(name)), "1, 0, true, or false");
}

#[test]
fn unreadable_env_value_is_an_env_error() {
    let mut config = HarnessConfig::default();
    let result = config.apply_overrides(&|name| {
        if name == HarnessEnv::ApiKey.as_str() {
            Err(format!("{name} must be valid UTF-8"))
        } else {
            Ok(None)
        }
    });
    assert!(matches!(result, Err(ConfigError::Env(_))));
}

#[test]
fn oversized_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.toml");
    let padding = format!("# {}\n", "x".repeat(300 * 1024));
    fs::write(&path, padding).unwrap();
    let env = FakeEnv::default();
    assert_error_contains(
        HarnessConfig::load_with(Some(&path), &|name| env.lookup(name)),
        "size limit",
    );
}

#[test]
fn credentials_require_both_keys() {
    let config = HarnessConfig::from_toml_str("[backend]\napi_key = \"k\"\n").unwrap();
    assert_error_contains(config.backend.credentials(), "backend.app_key");
}

#[test]
fn debug_output_redacts_keys() {
    let config =
        HarnessConfig::from_toml_str("[backend]\napi_key = \"secret-a\"\napp_key = \"secret-b\"\n")
            .unwrap();
    let rendered = format!("{:?}", config.backend);
    assert!(!rendered.contains("secret-a"));
    assert!(!rendered.contains("secret-b"));
    assert!(rendered.contains("redacted"));
}
