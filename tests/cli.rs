// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rexflow contributors

//! CLI integration tests for the rexflow binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the rexflow binary, run inside `dir`
fn rexflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rexflow").unwrap();
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    cmd
}

/// A temp directory holding `rexfile.yaml`
fn project(rexfile: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("rexfile.yaml"), rexfile).unwrap();
    dir
}

const PIPELINE: &str = r#"
name: demo
env:
  GREETING: hello
tasks:
  - id: build
    uses: shell
    with:
      run: echo "$GREETING from build"
  - id: test
    uses: shell
    needs: [build]
    with:
      run: echo testing
jobs:
  - id: release
    tasks:
      - id: tag
        uses: shell
        with: { run: echo tagged }
deployments:
  - id: web
    uses: shell
    with:
      deploy: echo deploying web
    hooks:
      before:deploy:
        - id: migrate
          uses: shell
          with: { run: echo migrating }
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    rexflow(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("task"))
        .stdout(predicate::str::contains("job"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("graph"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    rexflow(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rexflow"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_task_run_succeeds() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .arg("task")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from build"))
        .stdout(predicate::str::contains("testing"))
        .stdout(predicate::str::contains("Run succeeded (2 succeeded)"));
}

#[test]
fn test_task_target_runs_only_its_dependencies() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .args(["task", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from build"))
        .stdout(predicate::str::contains("testing").not());
}

#[test]
fn test_unknown_target_fails() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .args(["task", "nope"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Run failed"));
}

#[test]
fn test_failed_task_skips_followers() {
    let dir = project(
        r#"
tasks:
  - id: broken
    uses: shell
    with: { run: "echo boom >&2; exit 3" }
  - id: after
    uses: shell
    needs: [broken]
    with: { run: echo never }
"#,
    );
    rexflow(&dir)
        .args(["task", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""status": "failure""#))
        .stdout(predicate::str::contains(r#""status": "skipped""#))
        .stdout(predicate::str::contains("Exit code 3: boom"));
}

#[test]
fn test_json_summary() {
    let dir = project(PIPELINE);
    let output = rexflow(&dir).args(["task", "--json"]).output().unwrap();

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["results"].as_array().unwrap().len(), 2);
    assert_eq!(summary["results"][0]["id"], "build");
    assert_eq!(summary["results"][0]["outputs"]["stdout"], "hello from build");
}

#[test]
fn test_timeout_cancels_run() {
    let dir = project(
        r#"
tasks:
  - id: slow
    uses: shell
    with: { run: sleep 5 }
"#,
    );
    rexflow(&dir)
        .args(["task", "--json", "--timeout", "0.2"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""status": "cancelled""#))
        .stdout(predicate::str::contains("Timed out after 0.200s"));
}

#[test]
fn test_secrets_are_masked() {
    let dir = project(
        r#"
secrets: [REXFLOW_IT_TOKEN]
tasks:
  - id: leak
    uses: shell
    with: { run: echo "token=$REXFLOW_IT_TOKEN" }
"#,
    );
    rexflow(&dir)
        .arg("task")
        .env("REXFLOW_IT_TOKEN", "s3cr3t-value")
        .assert()
        .success()
        .stdout(predicate::str::contains("token=***"))
        .stdout(predicate::str::contains("s3cr3t-value").not());
}

#[test]
fn test_json_summary_masks_secrets() {
    let dir = project(
        r#"
secrets: [REXFLOW_IT_TOKEN]
tasks:
  - id: leak
    uses: shell
    with: { run: echo "token=$REXFLOW_IT_TOKEN" }
"#,
    );
    let output = rexflow(&dir)
        .args(["task", "--json"])
        .env("REXFLOW_IT_TOKEN", "s3cr3t-value")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("s3cr3t-value"), "{}", stdout);
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["results"][0]["outputs"]["stdout"], "token=***");
}

#[test]
fn test_job_and_deploy_run() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .arg("job")
        .assert()
        .success()
        .stdout(predicate::str::contains("tagged"));

    rexflow(&dir)
        .args(["deploy", "--env", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("migrating"))
        .stdout(predicate::str::contains("deploying web"));
}

#[test]
fn test_unsupported_directive_fails() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .arg("rollback")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not supported"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Validate, Graph and List Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_rexfile() {
    let dir = TempDir::new().unwrap();
    rexflow(&dir)
        .arg("task")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rexfile not found"));
}

#[test]
fn test_validate_reports_cycle() {
    let dir = project(
        r#"
tasks:
  - id: a
    uses: shell
    needs: [b]
    with: { run: "true" }
  - id: b
    uses: shell
    needs: [a]
    with: { run: "true" }
"#,
    );
    rexflow(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Circular dependency between tasks"));
}

#[test]
fn test_validate_valid_rexfile() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rexfile is valid!"));
}

#[test]
fn test_graph_mermaid() {
    let dir = project(PIPELINE);
    rexflow(&dir)
        .args(["graph", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph TD"))
        .stdout(predicate::str::contains("build --> test"));
}

#[test]
fn test_graph_with_custom_file_and_short_flags() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ci.yaml"), PIPELINE).unwrap();
    rexflow(&dir)
        .args(["-f", "ci.yaml", "graph", "-k", "tasks", "-o", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph rexflow"))
        .stdout(predicate::str::contains(r#""build" -> "test";"#));
}

#[test]
fn test_list_with_custom_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ci.yaml"), PIPELINE).unwrap();
    rexflow(&dir)
        .args(["--file", "ci.yaml", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("test (shell) [needs: build]"))
        .stdout(predicate::str::contains("release (job)"));
}
