//! End-to-end tests for the `cs` binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use contextstore::{ContextCategory, ContextStore};
use predicates::prelude::*;
use tempfile::TempDir;

fn cs(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cs").expect("cs binary should build");
    cmd.current_dir(dir).env("XDG_CONFIG_HOME", dir.join(".xdg-config"));
    cmd
}

#[test]
fn test_show_empty_store() {
    let temp = TempDir::new().unwrap();
    cs(temp.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("### Learnings"))
        .stdout(predicate::str::contains("### Error Fixes"));
}

#[test]
fn test_add_then_show() {
    let temp = TempDir::new().unwrap();
    cs(temp.path())
        .args(["add", "error_fix", "clone before the loop", "--error", "E0382 use of moved value"])
        .args(["--spec", "auth", "-i", "4"])
        .assert()
        .success();

    let store = ContextStore::load(temp.path().join(".ralphloop/context.json"));
    assert_eq!(store.count(ContextCategory::ErrorFix), 1);

    cs(temp.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("E0382 use of moved value → clone before the loop (auth #4)"));
}

#[test]
fn test_add_unknown_category_fails() {
    let temp = TempDir::new().unwrap();
    cs(temp.path())
        .args(["add", "rumor", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}

#[test]
fn test_prune_with_config_limits() {
    let temp = TempDir::new().unwrap();
    let store_path = temp.path().join("ctx.json");
    fs::write(temp.path().join("contextstore.yml"), "limits:\n  learning: 2\n").unwrap();

    for text in ["one", "two", "three"] {
        cs(temp.path())
            .args(["--store", "ctx.json", "add", "learning", text])
            .assert()
            .success();
    }

    // Adding already prunes to the limit, oldest first
    let store = ContextStore::load(&store_path);
    let texts: Vec<_> = store.entries(ContextCategory::Learning).map(|e| e.text.clone()).collect();
    assert_eq!(texts, vec!["two".to_string(), "three".to_string()]);

    cs(temp.path())
        .args(["--store", "ctx.json", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Evicted 0 entries"));

    cs(temp.path())
        .args(["--store", "ctx.json", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total"));
}

#[test]
fn test_corrupt_store_is_reported_and_moved_aside() {
    let temp = TempDir::new().unwrap();
    let store_dir = temp.path().join(".ralphloop");
    fs::create_dir_all(&store_dir).unwrap();
    fs::write(store_dir.join("context.json"), "{ not json").unwrap();

    cs(temp.path())
        .env_remove("RUST_LOG")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("### Learnings"))
        .stderr(predicate::str::contains("Context store is corrupt"));

    assert!(store_dir.join("context.json.corrupt").exists());
}
