// crates/agent-e2e-cli/src/main.rs
// ============================================================================
// Module: Agent E2E CLI Entry Point
// Description: Command dispatcher for harness utilities.
// Purpose: Offline helpers for journal checks, plan dry runs, rule cleanup,
//          and configuration validation.
// Dependencies: clap, agent-e2e-{core,config,clients,provision}, serde_json
// ============================================================================

//! ## Overview
//! `agent-e2e` exposes the harness building blocks that are useful outside a
//! test run: escaping SQL literals, checking a captured journal against an
//! expected unit sequence, rendering provisioning plans through a dry-run
//! orchestrator, and deleting backend rules left behind by aborted suites.
//! Inputs are untrusted; file reads are size-bounded.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use agent_e2e_clients::BackendClient;
use agent_e2e_clients::RuleApi;
use agent_e2e_config::HarnessConfig;
use agent_e2e_core::EventSequence;
use agent_e2e_core::EventSink;
use agent_e2e_core::Expectation;
use agent_e2e_core::JsonlEvents;
use agent_e2e_core::NoopEvents;
use agent_e2e_core::escape_sql_string;
use agent_e2e_core::match_sequence;
use agent_e2e_core::parse_journal;
use agent_e2e_core::quote_sql_literal;
use agent_e2e_provision::AgentInstallParams;
use agent_e2e_provision::DockerHostOptions;
use agent_e2e_provision::EcsOptions;
use agent_e2e_provision::GpuOptions;
use agent_e2e_provision::KindOptions;
use agent_e2e_provision::ProvisionError;
use agent_e2e_provision::ProvisionPlan;
use agent_e2e_provision::ProvisionedEnvironment;
use agent_e2e_provision::RecordingOrchestrator;
use agent_e2e_provision::VmParams;
use agent_e2e_provision::apply_plan;
use agent_e2e_provision::docker_host_plan;
use agent_e2e_provision::ecs_plan;
use agent_e2e_provision::gpu_host_plan;
use agent_e2e_provision::host_plan;
use agent_e2e_provision::kind_plan;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum journal capture size accepted by `journal-check`.
const MAX_JOURNAL_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "agent-e2e", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Escape a value for a single-quoted SQL literal.
    EscapeSql(EscapeSqlCommand),
    /// Check a captured journal against an expected unit sequence.
    JournalCheck(JournalCheckCommand),
    /// Render a provisioning plan through a dry-run apply.
    Plan(PlanCommand),
    /// Delete backend rules left behind by aborted suites.
    CleanupRules(CleanupRulesCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `escape-sql`.
#[derive(Args, Debug)]
struct EscapeSqlCommand {
    /// Raw value.
    value: String,
    /// Wrap the escaped value in single quotes.
    #[arg(long)]
    quote: bool,
}

/// Arguments for `journal-check`.
#[derive(Args, Debug)]
struct JournalCheckCommand {
    /// File holding `journalctl -o json` output.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
    /// Expected step: `started:unit`, or `{stopped:a,stopped:b}` for a group.
    #[arg(long = "expect", value_name = "SPEC", required = true)]
    expect: Vec<String>,
}

/// Environment shapes `plan` can render.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum PlanKind {
    /// VM with the agent installed from packages.
    Host,
    /// GPU VM with Docker, image pre-pull, and the agent.
    GpuHost,
    /// VM running the agent container.
    DockerHost,
    /// Kind cluster with the agent Helm chart.
    Kind,
    /// ECS cluster with the agent task.
    Ecs,
}

/// Arguments for `plan`.
#[derive(Args, Debug)]
struct PlanCommand {
    /// Environment shape.
    #[arg(value_enum)]
    kind: PlanKind,
    /// Stack name.
    #[arg(long, value_name = "NAME")]
    stack: String,
    /// Agent version to install, e.g. `7.61.0`.
    #[arg(long, value_name = "VERSION")]
    agent_version: Option<String>,
    /// Write provisioning events as JSON lines to stderr.
    #[arg(long)]
    log_events: bool,
}

/// Arguments for `cleanup-rules`.
#[derive(Args, Debug)]
struct CleanupRulesCommand {
    /// Backend id of an agent rule to delete.
    #[arg(long = "agent-rule", value_name = "ID")]
    agent_rules: Vec<String>,
    /// Backend id of a signal rule to delete.
    #[arg(long = "signal-rule", value_name = "ID")]
    signal_rules: Vec<String>,
    /// Configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate(ConfigValidateCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// CLI error wrapper carrying the message shown to the user.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::EscapeSql(command) => {
            write_output(&escape_sql_output(&command))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::JournalCheck(command) => command_journal_check(&command),
        Commands::Plan(command) => command_plan(&command),
        Commands::CleanupRules(command) => command_cleanup_rules(&command),
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(command) => command_config_validate(&command),
        },
    }
}

// ============================================================================
// SECTION: Escape Command
// ============================================================================

/// Renders the `escape-sql` output.
fn escape_sql_output(command: &EscapeSqlCommand) -> String {
    if command.quote {
        quote_sql_literal(&command.value)
    } else {
        escape_sql_string(&command.value)
    }
}

// ============================================================================
// SECTION: Journal Command
// ============================================================================

/// Executes `journal-check`.
fn command_journal_check(command: &JournalCheckCommand) -> CliResult<ExitCode> {
    let bytes = read_bytes_with_limit(&command.file, MAX_JOURNAL_BYTES)?;
    let journal = String::from_utf8(bytes).map_err(|_| {
        CliError::new(format!("journal {} is not UTF-8", command.file.display()))
    })?;
    let expected = parse_expectations(&command.expect)?;
    write_output(&check_journal(&journal, &expected)?)?;
    Ok(ExitCode::SUCCESS)
}

/// Parses `--expect` values into a sequence.
fn parse_expectations(specs: &[String]) -> CliResult<EventSequence> {
    let steps = specs
        .iter()
        .map(|spec| {
            spec.parse::<Expectation>()
                .map_err(|err| CliError::new(format!("invalid expectation {spec}: {err}")))
        })
        .collect::<CliResult<Vec<_>>>()?;
    Ok(EventSequence::from_steps(steps))
}

/// Matches `journal` against `expected` and describes the result.
fn check_journal(journal: &str, expected: &EventSequence) -> CliResult<String> {
    let observed = parse_journal(journal);
    match_sequence(expected, &observed).map_err(|err| CliError::new(err.to_string()))?;
    Ok(format!(
        "matched {} expectation(s) against {} event(s)",
        expected.steps().len(),
        observed.len()
    ))
}

// ============================================================================
// SECTION: Plan Command
// ============================================================================

/// Output of `plan`.
#[derive(Debug, Serialize)]
struct PlanReport {
    /// Validated plan.
    plan: ProvisionPlan,
    /// Step ids in apply order.
    order: Vec<String>,
    /// Dry-run handles.
    environment: ProvisionedEnvironment,
}

/// Executes `plan`.
fn command_plan(command: &PlanCommand) -> CliResult<ExitCode> {
    let report = if command.log_events {
        render_plan(command, &JsonlEvents::new(std::io::stderr()))?
    } else {
        render_plan(command, &NoopEvents)?
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("failed to serialize plan: {err}")))?;
    write_output(&json)?;
    Ok(ExitCode::SUCCESS)
}

/// Builds the plan for `command` and applies it with a dry-run orchestrator.
fn render_plan(command: &PlanCommand, sink: &dyn EventSink) -> CliResult<PlanReport> {
    let plan = build_plan(command)
        .map_err(|err| CliError::new(format!("invalid plan [{}]: {err}", err.code())))?;
    let order = plan
        .execution_order()
        .map_err(|err| CliError::new(err.to_string()))?
        .into_iter()
        .map(|step| step.id.clone())
        .collect();
    let environment = apply_plan(&plan, &mut RecordingOrchestrator::new(), sink)
        .map_err(|err| CliError::new(format!("dry run failed: {err}")))?;
    Ok(PlanReport {
        plan,
        order,
        environment,
    })
}

/// Builds the plan selected by `command` with default options.
fn build_plan(command: &PlanCommand) -> Result<ProvisionPlan, ProvisionError> {
    let mut agent = AgentInstallParams::new();
    if let Some(version) = &command.agent_version {
        agent = agent.with_version(version.as_str());
    }
    let stack = command.stack.as_str();
    match command.kind {
        PlanKind::Host => host_plan(stack, VmParams::default(), agent),
        PlanKind::GpuHost => gpu_host_plan(stack, VmParams::gpu(), agent, GpuOptions::default()),
        PlanKind::DockerHost => {
            docker_host_plan(stack, VmParams::default(), agent, DockerHostOptions::default())
        }
        PlanKind::Kind => kind_plan(stack, VmParams::default(), KindOptions::default()),
        PlanKind::Ecs => ecs_plan(stack, EcsOptions::default()),
    }
}

// ============================================================================
// SECTION: Rule Cleanup Command
// ============================================================================

/// Executes `cleanup-rules`.
fn command_cleanup_rules(command: &CleanupRulesCommand) -> CliResult<ExitCode> {
    if command.agent_rules.is_empty() && command.signal_rules.is_empty() {
        return Err(CliError::new("no rules given".to_string()));
    }
    let config = load_config(command.config.as_deref())?;
    let credentials = config
        .backend
        .credentials()
        .map_err(|err| CliError::new(format!("backend credentials: {err}")))?;
    let base_url = config
        .backend
        .api_base_url()
        .map_err(|err| CliError::new(format!("backend url: {err}")))?;
    let client = BackendClient::new(base_url.as_str(), credentials.api_key, credentials.app_key)
        .map_err(|err| CliError::new(format!("backend client: {err}")))?;
    let failures = delete_rules(&client, &command.signal_rules, &command.agent_rules);
    let deleted = command.agent_rules.len() + command.signal_rules.len() - failures.len();
    write_output(&format!("deleted {deleted} rule(s)"))?;
    if failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    for failure in &failures {
        let _ = write_stderr_line(failure);
    }
    Ok(ExitCode::FAILURE)
}

/// Deletes signal rules, then agent rules. Returns one message per failure.
fn delete_rules(api: &dyn RuleApi, signal_rules: &[String], agent_rules: &[String]) -> Vec<String> {
    let signals = signal_rules.iter().filter_map(|id| {
        api.delete_signal_rule(id).err().map(|err| format!("signal rule {id}: {err}"))
    });
    let agents = agent_rules.iter().filter_map(|id| {
        api.delete_agent_rule(id).err().map(|err| format!("agent rule {id}: {err}"))
    });
    signals.chain(agents).collect()
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    write_output(&format!(
        "config ok: site {}, stack prefix {}",
        config.backend.site, config.stack.name_prefix
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration from `path`, the environment, or defaults.
fn load_config(path: Option<&Path>) -> CliResult<HarnessConfig> {
    HarnessConfig::load(path).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

// ============================================================================
// SECTION: IO Helpers
// ============================================================================

/// Reads `path`, failing when it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let describe = |err: std::io::Error| {
        CliError::new(format!("failed to read {}: {err}", path.display()))
    };
    let file = File::open(path).map_err(describe)?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(describe)?;
    if bytes.len() > max_bytes {
        return Err(CliError::new(format!(
            "{} exceeds the {max_bytes} byte limit",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Writes a line to stdout, mapping failures to [`CliError`].
fn write_output(message: &str) -> CliResult<()> {
    write_stdout_line(message)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
