// crates/agent-e2e-remote/tests/executor.rs
// ============================================================================
// Module: Executor Tests
// Description: Local shell execution, ssh argv, quoting, and file helpers.
// Purpose: Ensure commands reach the shell exactly as intended.
// ============================================================================

//! Remote executor tests.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]
#![allow(clippy::panic, reason = "Tests panic on unexpected error variants.")]

use std::sync::Arc;
use std::time::Duration;

use agent_e2e_core::JsonlEvents;
use agent_e2e_remote::LocalShell;
use agent_e2e_remote::LoggedExecutor;
use agent_e2e_remote::Privilege;
use agent_e2e_remote::RemoteError;
use agent_e2e_remote::RemoteExecutor;
use agent_e2e_remote::SshExecutor;
use agent_e2e_remote::shell_quote;
use common::ScriptedExecutor;

mod common;

#[test]
fn local_shell_captures_output_and_exit_code() {
    let output = LocalShell.run("printf out; printf err >&2; exit 3").unwrap();
    assert_eq!(output.stdout, "out");
    assert_eq!(output.stderr, "err");
    assert_eq!(output.exit_code, Some(3));
    assert!(!output.success());
}

#[test]
fn run_checked_reports_failures() {
    let err = LocalShell.run_checked("echo boom >&2; exit 2").expect_err("non-zero exit");
    match err {
        RemoteError::CommandFailed {
            exit_code,
            stderr,
            ..
        } => {
            assert_eq!(exit_code, Some(2));
            assert_eq!(stderr, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn quoting_survives_the_shell() {
    let tricky = "it's $HOME `date` \"quoted\" \\ ;|&";
    let echoed = LocalShell.run_checked(&format!("printf '%s' {}", shell_quote(tricky))).unwrap();
    assert_eq!(echoed, tricky);
}

#[test]
fn file_helpers_round_trip_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy 'a'.policy");
    let path = path.to_str().unwrap();
    let content = "rules:\n  - id: it's\n";
    assert!(!LocalShell.file_exists(path).unwrap());
    LocalShell.write_file(path, content, Privilege::User).unwrap();
    assert!(LocalShell.file_exists(path).unwrap());
    assert_eq!(LocalShell.read_file(path, Privilege::User).unwrap(), content);
    LocalShell.remove_file(path, Privilege::User).unwrap();
    assert!(!LocalShell.file_exists(path).unwrap());
}

#[test]
fn ssh_argv_wraps_command_in_one_word() {
    let ssh = SshExecutor::new("10.0.0.7", "ubuntu")
        .with_port(2222)
        .with_identity("/keys/id_ed25519")
        .with_connect_timeout(Duration::from_secs(5));
    let argv = ssh.argv("echo 'hi'");
    assert_eq!(argv[0], "ssh");
    assert!(argv.contains(&"BatchMode=yes".to_string()));
    assert!(argv.contains(&"ConnectTimeout=5".to_string()));
    assert!(argv.windows(2).any(|pair| pair == ["-p", "2222"]));
    assert!(argv.windows(2).any(|pair| pair == ["-i", "/keys/id_ed25519"]));
    assert_eq!(argv[argv.len() - 3], "ubuntu@10.0.0.7");
    assert_eq!(argv[argv.len() - 1], r"sh -c 'echo '\''hi'\'''");
    assert_eq!(ssh.host(), "10.0.0.7");
}

#[test]
fn privileged_writes_use_sudo_tee() {
    let exec = ScriptedExecutor::new().ok("tee", "");
    exec.write_file("/etc/x.yaml", "a: 1", Privilege::Root).unwrap();
    assert_eq!(exec.commands(), vec!["printf '%s' 'a: 1' | sudo tee '/etc/x.yaml' > /dev/null"]);
}

#[test]
fn logged_executor_emits_masked_commands() {
    let sink = Arc::new(JsonlEvents::new(Vec::new()));
    let exec = LoggedExecutor::new(ScriptedExecutor::new().ok("install", ""), sink.clone())
        .with_secret("sekret-key");
    exec.run_checked("DD_API_KEY=sekret-key install").unwrap();
    let err = exec.run_checked("other sekret-key").expect_err("unscripted");
    assert!(!err.to_string().contains("sekret-key"));
    drop(exec);

    let sink = Arc::into_inner(sink).expect("sole owner");
    let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("DD_API_KEY=<redacted> install"));
    assert!(!text.contains("sekret-key"));
    assert!(text.contains("\"exit_code\":0"));
}
