//! Integration tests for ralphloop
//!
//! These drive real `sh` agents and gates through the loop engine and the `rl`
//! binary against temporary projects.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use contextstore::{ContextCategory, ContextStore};
use predicates::prelude::*;
use ralphloop::agent::CommandAgent;
use ralphloop::domain::{SpecDocument, SpecStatus, TaskState};
use ralphloop::r#loop::{LoopConfig, LoopEngine, QualityGate};
use ralphloop::report::RunStatus;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_spec(root: &Path, name: &str, body: &str) -> PathBuf {
    let dir = root.join("specs").join(name);
    fs::create_dir_all(&dir).expect("Failed to create spec dir");
    let path = dir.join("spec.md");
    fs::write(&path, format!("---\nname: {}\nstatus: pending\n---\n# {}\n\n{}", name, name, body))
        .expect("Failed to write spec");
    path
}

fn fast_config() -> LoopConfig {
    LoopConfig {
        iteration_delay_secs: 0,
        retry_backoff_secs: 0,
        iteration_timeout_secs: 30,
        ..LoopConfig::default()
    }
}

fn sh_agent(script: &str) -> Arc<CommandAgent> {
    Arc::new(CommandAgent::new("sh", vec!["-c".to_string(), script.to_string()]))
}

/// `rl` isolated from the user's config and data directories
fn rl(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rl").expect("rl binary should build");
    cmd.current_dir(project)
        .env("XDG_CONFIG_HOME", project.join(".xdg-config"))
        .env("XDG_DATA_HOME", project.join(".xdg-data"))
        .env("ITERATION_DELAY", "0")
        .env("RETRY_BACKOFF", "0")
        .env_remove("MAX_ITERATIONS")
        .env_remove("MAX_RETRIES");
    cmd
}

// =============================================================================
// Loop engine with command agents
// =============================================================================

#[tokio::test]
async fn test_engine_completes_spec_with_gates() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let spec = write_spec(temp.path(), "auth", "- [ ] Add login\n- [ ] Add logout\n");

    let agent = sh_agent(
        "cat >/dev/null; echo \"task $RALPHLOOP_TASK\" >> work.log; echo \"PATTERN: keep handlers small\"",
    );
    let engine = LoopEngine::new(&spec, temp.path(), fast_config(), agent)
        .expect("engine should build")
        .with_gates(vec!["test=test -f work.log".parse::<QualityGate>().expect("valid gate")]);

    let (_tx, mut rx) = mpsc::channel(1);
    let summary = engine.run(&mut rx).await.expect("run should succeed");

    assert_eq!(summary.status, RunStatus::Complete);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.spec, "auth");

    let work = fs::read_to_string(temp.path().join("work.log")).expect("agent wrote work log");
    assert_eq!(work, "task 1\ntask 2\n");

    let doc = SpecDocument::load(&spec).expect("spec reloads");
    assert_eq!(doc.status(), SpecStatus::Complete);
    assert_eq!(doc.iteration_count(), 2);
    assert!(doc.tasks().iter().all(|t| t.state == TaskState::Done));
    assert!(doc.body().contains("## Iteration Log"));

    let store = ContextStore::load(temp.path().join(".ralphloop/context.json"));
    assert_eq!(store.count(ContextCategory::Pattern), 2);
}

#[tokio::test]
async fn test_engine_heals_on_second_attempt() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let spec = write_spec(temp.path(), "parser", "- [ ] Parse headers\n");

    // Fails on the first attempt, succeeds once the error has been fed back
    let agent = sh_agent(
        "cat >/dev/null; if [ \"$RALPHLOOP_ATTEMPT\" = 1 ]; then echo 'expected token at line 3' >&2; exit 1; fi; echo 'FIX: close the bracket'",
    );
    let engine = LoopEngine::new(&spec, temp.path(), fast_config(), agent).expect("engine should build");

    let (_tx, mut rx) = mpsc::channel(1);
    let summary = engine.run(&mut rx).await.expect("run should succeed");
    assert_eq!(summary.status, RunStatus::Complete);

    let store = ContextStore::load(temp.path().join(".ralphloop/context.json"));
    let fixes: Vec<_> = store.entries(ContextCategory::ErrorFix).collect();
    assert_eq!(fixes.len(), 1);
    assert!(
        fixes[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("expected token at line 3"))
    );
}

#[tokio::test]
async fn test_engine_blocks_on_unfixable_error() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let spec = write_spec(temp.path(), "deploy", "- [ ] Push image\n");
    let marker = temp.path().join("attempts");

    let agent = sh_agent(&format!(
        "cat >/dev/null; echo x >> {}; echo 'Error: 401 Unauthorized' >&2; exit 1",
        marker.display()
    ));
    let engine = LoopEngine::new(&spec, temp.path(), fast_config(), agent).expect("engine should build");

    let (_tx, mut rx) = mpsc::channel(1);
    let summary = engine.run(&mut rx).await.expect("run should succeed");

    assert_eq!(summary.status, RunStatus::Blocked);
    // Unfixable errors are never retried
    let attempts = fs::read_to_string(&marker).expect("agent ran");
    assert_eq!(attempts.lines().count(), 1);

    let doc = SpecDocument::load(&spec).expect("spec reloads");
    assert_eq!(doc.tasks()[0].state, TaskState::Blocked);
    assert_eq!(doc.status(), SpecStatus::Blocked);
    assert!(doc.body().contains("> Blocked:"));
}

// =============================================================================
// rl binary
// =============================================================================

#[test]
fn test_cli_status_empty_project_json() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    rl(temp.path())
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_cli_init_creates_layout() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    rl(temp.path()).arg("init").assert().success().stdout(predicate::str::contains("created"));

    assert!(temp.path().join("specs").is_dir());
    assert!(temp.path().join(".ralphloop/context.json").is_file());

    // Idempotent
    rl(temp.path()).arg("init").assert().success().stdout(predicate::str::contains("exists"));
}

#[test]
fn test_cli_tasks_shows_tree() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    write_spec(
        temp.path(),
        "auth",
        "- [x] Schema\n- [ ] Handlers\n  - [ ] login\n<!-- CONTINUATION: start with login -->\n",
    );

    rl(temp.path())
        .args(["tasks", "auth"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("2     Handlers"))
        .stdout(predicate::str::contains("2.1   login"))
        .stdout(predicate::str::contains("continuation: start with login"));
}

#[test]
fn test_cli_tasks_unknown_spec_fails() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    rl(temp.path()).args(["tasks", "nope"]).assert().code(1).stderr(predicate::str::contains("error:"));
}

#[test]
fn test_cli_run_complete_json() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    write_spec(temp.path(), "auth", "- [ ] Add login\n");
    fs::write(
        temp.path().join(".ralphloop.yml"),
        "agent:\n  command: sh\n  args: [\"-c\", \"cat >/dev/null; echo 'LEARNING: sessions live in redis'\"]\n",
    )
    .expect("Failed to write config");

    let output = rl(temp.path())
        .args(["run", "auth", "--format", "json", "--gate", "build=true"])
        .output()
        .expect("rl runs");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("summary is JSON");
    assert_eq!(summary["status"], "complete");
    assert_eq!(summary["iterations"], 1);
    assert_eq!(summary["learnings"], 1);

    rl(temp.path())
        .args(["status", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"complete\""));
}

#[test]
fn test_cli_run_blocked_by_gate_exits_one() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    write_spec(temp.path(), "auth", "- [ ] Add login\n");
    fs::write(
        temp.path().join(".ralphloop.yml"),
        "agent:\n  command: sh\n  args: [\"-c\", \"cat >/dev/null\"]\nloop:\n  max-attempts: 2\n",
    )
    .expect("Failed to write config");

    rl(temp.path())
        .args(["run", "auth", "--format", "json", "--gate", "test=exit 3"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"status\": \"blocked\""));

    let doc = SpecDocument::load(temp.path().join("specs/auth/spec.md")).expect("spec reloads");
    assert_eq!(doc.tasks()[0].state, TaskState::Blocked);
}

#[test]
fn test_cli_invalid_env_override_fails() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    write_spec(temp.path(), "auth", "- [ ] Add login\n");
    rl(temp.path())
        .args(["run", "auth"])
        .env("MAX_ITERATIONS", "lots")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MAX_ITERATIONS"));
}
