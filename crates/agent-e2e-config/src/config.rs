// crates/agent-e2e-config/src/config.rs
// ============================================================================
// Module: Harness Configuration
// Description: Configuration loading, env overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: agent-e2e-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is read from `agent-e2e.toml` (or the file named by
//! `AGENT_E2E_CONFIG`), then overlaid with `AGENT_E2E_*` environment values.
//! A missing default file yields defaults; a missing explicit file is an
//! error. Environment values are read with strict UTF-8 and must not be empty.
//! Backend secrets never appear in `Debug` output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use agent_e2e_core::PollPolicy;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "agent-e2e.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "AGENT_E2E_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of an API or application key.
pub(crate) const MAX_SECRET_LENGTH: usize = 256;
/// Maximum length of a backend site name.
pub(crate) const MAX_SITE_LENGTH: usize = 253;
/// Maximum length of the stack name prefix.
pub(crate) const MAX_NAME_PREFIX_LENGTH: usize = 32;
/// Default backend site.
pub const DEFAULT_SITE: &str = "datadoghq.com";
/// Default polling timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
/// Default polling interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;
/// Default stack name prefix.
pub const DEFAULT_NAME_PREFIX: &str = "e2e";

// ============================================================================
// SECTION: Environment Keys
// ============================================================================

/// Environment keys overriding configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessEnv {
    /// Backend API key.
    ApiKey,
    /// Backend application key.
    AppKey,
    /// Backend site, e.g. `datadoghq.eu`.
    Site,
    /// Fake intake base URL.
    FakeIntakeUrl,
    /// Polling timeout floor in seconds (positive integer).
    TimeoutSeconds,
    /// Artifact run root.
    RunRoot,
    /// Keep stacks after failed suites (`true`/`false` or `1`/`0`).
    KeepStacks,
}

impl HarnessEnv {
    /// Every override key, in application order.
    pub const ALL: [Self; 7] = [
        Self::ApiKey,
        Self::AppKey,
        Self::Site,
        Self::FakeIntakeUrl,
        Self::TimeoutSeconds,
        Self::RunRoot,
        Self::KeepStacks,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "AGENT_E2E_API_KEY",
            Self::AppKey => "AGENT_E2E_APP_KEY",
            Self::Site => "AGENT_E2E_SITE",
            Self::FakeIntakeUrl => "AGENT_E2E_FAKE_INTAKE_URL",
            Self::TimeoutSeconds => "AGENT_E2E_TIMEOUT_SEC",
            Self::RunRoot => "AGENT_E2E_RUN_ROOT",
            Self::KeepStacks => "AGENT_E2E_KEEP_STACKS",
        }
    }
}

/// Environment lookup used by [`HarnessConfig::load_with`].
///
/// Returns `Ok(None)` when the variable is unset and `Err` when it is set but
/// unreadable.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Result<Option<String>, String>;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Agent E2E harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Backend API configuration.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Fake intake configuration.
    #[serde(default)]
    pub fake_intake: FakeIntakeConfig,
    /// Default polling configuration.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Stack naming and retention.
    #[serde(default)]
    pub stack: StackConfig,
    /// Artifact output configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

impl HarnessConfig {
    /// Loads configuration from disk and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, &read_env_strict)
    }

    /// Loads configuration using `lookup` for environment values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load_with(path: Option<&Path>, lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path, lookup)?;
        validate_path(&resolved)?;
        let mut config = if !explicit && !resolved.exists() {
            Self::default()
        } else {
            read_config_file(&resolved)?
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `AGENT_E2E_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when a value is unreadable, empty, or
    /// malformed.
    pub fn apply_overrides(&mut self, lookup: EnvLookup<'_>) -> Result<(), ConfigError> {
        for key in HarnessEnv::ALL {
            let Some(value) = read_nonempty(lookup, key.as_str())? else {
                continue;
            };
            match key {
                HarnessEnv::ApiKey => self.backend.api_key = Some(value),
                HarnessEnv::AppKey => self.backend.app_key = Some(value),
                HarnessEnv::Site => self.backend.site = value.trim().to_string(),
                HarnessEnv::FakeIntakeUrl => self.fake_intake.url = Some(value.trim().to_string()),
                HarnessEnv::TimeoutSeconds => {
                    self.polling.timeout_override_secs =
                        Some(parse_timeout_seconds(key.as_str(), &value)?);
                }
                HarnessEnv::RunRoot => self.artifacts.run_root = Some(PathBuf::from(value)),
                HarnessEnv::KeepStacks => {
                    self.stack.keep_on_failure = parse_bool(key.as_str(), &value)?;
                }
            }
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;
        self.fake_intake.validate()?;
        self.polling.validate()?;
        self.stack.validate()?;
        self.artifacts.validate()?;
        Ok(())
    }
}

/// Backend API configuration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend site, e.g. `datadoghq.com`.
    pub site: String,
    /// API key.
    pub api_key: Option<String>,
    /// Application key.
    pub app_key: Option<String>,
    /// Explicit API base URL, replacing `https://api.<site>`.
    pub base_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            site: DEFAULT_SITE.to_string(),
            api_key: None,
            app_key: None,
            base_url: None,
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("site", &self.site)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// API and application keys for backend calls.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendCredentials {
    /// API key sent as `DD-API-KEY`.
    pub api_key: String,
    /// Application key sent as `DD-APPLICATION-KEY`.
    pub app_key: String,
}

impl fmt::Debug for BackendCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendCredentials(<redacted>)")
    }
}

impl BackendConfig {
    /// Returns the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL does not parse.
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.base_url.clone().unwrap_or_else(|| format!("https://api.{}", self.site));
        parse_http_url("backend.base_url", &raw)
    }

    /// Returns both keys, failing when either is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the missing key.
    pub fn credentials(&self) -> Result<BackendCredentials, ConfigError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "backend.api_key must be set (or {})",
                HarnessEnv::ApiKey.as_str()
            ))
        })?;
        let app_key = self.app_key.clone().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "backend.app_key must be set (or {})",
                HarnessEnv::AppKey.as_str()
            ))
        })?;
        Ok(BackendCredentials {
            api_key,
            app_key,
        })
    }

    /// Validates the backend section.
    fn validate(&self) -> Result<(), ConfigError> {
        let site = self.site.trim();
        if site.is_empty() || site.len() > MAX_SITE_LENGTH {
            return Err(ConfigError::Invalid("backend.site must be a host name".to_string()));
        }
        if site.contains("://") || site.contains('/') {
            return Err(ConfigError::Invalid(
                "backend.site must not include a scheme or path".to_string(),
            ));
        }
        validate_secret("backend.api_key", self.api_key.as_deref())?;
        validate_secret("backend.app_key", self.app_key.as_deref())?;
        self.api_base_url()?;
        Ok(())
    }
}

/// Fake intake configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FakeIntakeConfig {
    /// Fake intake base URL; provisioned per stack when unset.
    pub url: Option<String>,
}

impl FakeIntakeConfig {
    /// Returns the parsed base URL when configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL does not parse.
    pub fn url(&self) -> Result<Option<Url>, ConfigError> {
        self.url.as_deref().map(|raw| parse_http_url("fake_intake.url", raw)).transpose()
    }

    /// Validates the fake intake section.
    fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;
        Ok(())
    }
}

/// Default polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Default timeout in seconds.
    pub timeout_secs: u64,
    /// Default interval in seconds.
    pub interval_secs: u64,
    /// Timeout floor applied to every poll.
    pub timeout_override_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            timeout_override_secs: None,
        }
    }
}

impl PollingConfig {
    /// Returns the configured default policy, with the timeout floor applied.
    #[must_use]
    pub fn policy(&self) -> PollPolicy {
        self.resolve(PollPolicy::new(
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.interval_secs),
        ))
    }

    /// Applies the timeout floor to a policy chosen by a test.
    #[must_use]
    pub fn resolve(&self, policy: PollPolicy) -> PollPolicy {
        policy.with_minimum_timeout(self.timeout_override())
    }

    /// Returns the timeout floor, if any.
    #[must_use]
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout_override_secs.map(Duration::from_secs)
    }

    /// Validates the polling section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.interval_secs > self.timeout_secs {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must not exceed polling.timeout_secs".to_string(),
            ));
        }
        if self.timeout_override_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "polling.timeout_override_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stack naming and retention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Prefix for provisioned stack names.
    pub name_prefix: String,
    /// Keep stacks whose suite failed, for debugging.
    pub keep_on_failure: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            keep_on_failure: false,
        }
    }
}

impl StackConfig {
    /// Returns the stack name for `suite`.
    ///
    /// Characters outside `[a-z0-9-]` in the suite name become `-`.
    #[must_use]
    pub fn stack_name(&self, suite: &str) -> String {
        let suite: String = suite
            .chars()
            .map(|ch| {
                let lower = ch.to_ascii_lowercase();
                if lower.is_ascii_lowercase() || lower.is_ascii_digit() { lower } else { '-' }
            })
            .collect();
        format!("{}-{}", self.name_prefix, suite.trim_matches('-'))
    }

    /// Validates the stack section.
    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.name_prefix;
        if prefix.is_empty() || prefix.len() > MAX_NAME_PREFIX_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "stack.name_prefix must be 1-{MAX_NAME_PREFIX_LENGTH} characters"
            )));
        }
        let valid = prefix.starts_with(|ch: char| ch.is_ascii_lowercase())
            && prefix.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid {
            return Err(ConfigError::Invalid(
                "stack.name_prefix must start with a letter and use [a-z0-9-]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Artifact output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Root directory for per-run artifacts.
    pub run_root: Option<PathBuf>,
}

impl ArtifactsConfig {
    /// Returns the configured run root or `fallback`.
    #[must_use]
    pub fn run_root_or(&self, fallback: &Path) -> PathBuf {
        self.run_root.clone().unwrap_or_else(|| fallback.to_path_buf())
    }

    /// Validates the artifacts section.
    fn validate(&self) -> Result<(), ConfigError> {
        match &self.run_root {
            Some(root) => validate_path(root),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Invalid environment override.
    #[error("invalid environment: {0}")]
    Env(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads a variable through `lookup` and rejects empty values.
fn read_nonempty(lookup: EnvLookup<'_>, name: &str) -> Result<Option<String>, ConfigError> {
    match lookup(name).map_err(ConfigError::Env)? {
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::Env(format!("{name} must not be empty")))
        }
        other => Ok(other),
    }
}

/// Parses a positive number of seconds.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<u64, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        ConfigError::Env(format!("{name} must be a positive integer number of seconds"))
    })?;
    if secs == 0 {
        return Err(ConfigError::Env(format!("{name} must be greater than zero")));
    }
    Ok(secs)
}

/// Parses `true`/`false`/`1`/`0`.
fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(ConfigError::Env(format!("{name} must be 1, 0, true, or false")))
}

/// Resolves the config path; the flag is true when the path was requested.
fn resolve_path(
    path: Option<&Path>,
    lookup: EnvLookup<'_>,
) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Some(env_path) = read_nonempty(lookup, CONFIG_ENV_VAR)? {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("path exceeds max length: {text}")));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("path component too long".to_string()));
        }
    }
    Ok(())
}

/// Reads and parses a config file with the size limit enforced.
fn read_config_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let bytes = fs::read(path)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
}

/// Validates an optional secret's length.
fn validate_secret(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    if value.len() > MAX_SECRET_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds {MAX_SECRET_LENGTH} bytes")));
    }
    Ok(())
}

/// Parses an `http` or `https` URL.
fn parse_http_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url =
        Url::parse(raw.trim()).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid(format!("{field}: unsupported scheme {other}"))),
    }
}
