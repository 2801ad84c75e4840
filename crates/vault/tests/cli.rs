//! End-to-end CLI tests driving the compiled `vault` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vault_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vault");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[db]
path = "{}/data/vault.sqlite"
"#,
        root.display()
    );

    let config_path = root.join("vault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vault(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_vault(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_vault(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_list_empty_vault() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (stdout, _, success) = run_vault(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("Vault is empty."));
}

#[test]
fn test_add_without_embedding_provider_fails_cleanly() {
    let (tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let note = tmp.path().join("note.txt");
    fs::write(&note, "A note about nothing in particular.").unwrap();

    let (stdout, stderr, success) = run_vault(&config_path, &["add", note.to_str().unwrap()]);
    assert!(!success);
    let combined = format!("{stdout}{stderr}");
    assert!(
        combined.contains("embedding provider"),
        "expected a clear embedding message, got: {combined}"
    );
}

#[test]
fn test_search_without_embedding_provider_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (stdout, stderr, success) = run_vault(&config_path, &["search", "anything"]);
    assert!(!success);
    let combined = format!("{stdout}{stderr}");
    assert!(combined.contains("embedding provider"));
}

#[test]
fn test_empty_query_returns_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (stdout, _, success) = run_vault(&config_path, &["search", "   "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_show_missing_item_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (_, stderr, success) = run_vault(&config_path, &["show", "nope"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(
        &bad,
        "[db]\npath = \"/tmp/x\"\n[retrieval]\nsemantic_weight = 3.0\n",
    )
    .unwrap();

    let (_, stderr, success) = run_vault(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("semantic_weight"));
}

#[test]
fn test_sweep_on_empty_vault() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (stdout, _, success) = run_vault(&config_path, &["sweep-connections"]);
    assert!(success);
    assert!(stdout.contains("sweep complete: 0 connection(s)"));
}

#[test]
fn test_consolidate_requires_llm() {
    let (_tmp, config_path) = setup_test_env();

    run_vault(&config_path, &["init"]);
    let (_, stderr, success) = run_vault(&config_path, &["consolidate"]);
    assert!(!success);
    assert!(stderr.contains("generative service"));
}
