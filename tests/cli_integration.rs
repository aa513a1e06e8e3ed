// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Integration tests for the combograph CLI commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const DATASET: &str = r#"{
    "metadata": {"source": "fixture", "version": "1"},
    "combos": [
        {"id": "C1", "card_names": ["Sol Ring", "Isochron Scepter"], "color_identity": "C"},
        {"id": "C2", "card_names": ["Isochron Scepter", "Dramatic Reversal"], "color_identity": "U"},
        {"id": "C3", "card_names": ["Kiki-Jiki", "Restoration Angel"], "color_identity": "R"},
        {"id": "broken", "card_names": [], "color_identity": "U"}
    ]
}"#;

/// Write the fixture dataset into a fresh directory
fn dataset() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("combos.json");
    fs::write(&path, DATASET).unwrap();
    (dir, path)
}

/// The binary with config isolated from the host environment
fn combograph(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("combograph").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("COMBOGRAPH_CONFIG")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .arg("--quiet");
    cmd
}

#[test]
fn test_query_distance1() {
    let (dir, path) = dataset();
    let output = combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["query", "getDistance1Combos", r#"{"comboId": "C1"}"#])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["total"], 1);
    assert_eq!(result["combos"][0]["id"], "C2");
}

#[test]
fn test_query_unknown_combo_is_null() {
    let (dir, path) = dataset();
    combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["query", "getComboById", r#"{"comboId": "nonexistent"}"#])
        .assert()
        .success()
        .stdout(predicate::eq("null").trim());
}

#[test]
fn test_query_not_found_fails() {
    let (dir, path) = dataset();
    combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["query", "getRelatedCombos", r#"{"comboId": "nope"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("combo not found: nope"));
}

#[test]
fn test_stats_json_and_report() {
    let (dir, path) = dataset();
    let output = combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["--json", "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total_combos"], 3);
    assert_eq!(stats["dataset"]["skipped_records"], 1);

    combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["--no-color", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Most versatile cards"))
        .stdout(predicate::str::contains("Isochron Scepter"));
}

#[test]
fn test_export_dot_to_file() {
    let (dir, path) = dataset();
    let out = dir.path().join("graph.dot");
    combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["export", "--format", "dot", "--output"])
        .arg(&out)
        .assert()
        .success();

    let dot = fs::read_to_string(&out).unwrap();
    assert!(dot.starts_with("graph combos {"));
    assert!(dot.contains("\"C1\" -- \"C2\""));
}

#[test]
fn test_export_rejects_unknown_format() {
    let (dir, path) = dataset();
    combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["export", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export format"));
}

#[test]
fn test_missing_dataset_fails() {
    let dir = TempDir::new().unwrap();
    combograph(&dir)
        .arg("--dataset")
        .arg(dir.path().join("absent.json"))
        .args(["query", "getGraphStatistics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load combo dataset"));
}

#[test]
fn test_config_file_and_key() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("combograph.toml");
    fs::write(&config, "[server]\nport = 9555\n").unwrap();

    combograph(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "server.port"])
        .assert()
        .success()
        .stdout(predicate::eq("9555").trim());
}

#[test]
fn test_config_env_override() {
    let dir = TempDir::new().unwrap();
    combograph(&dir)
        .env("COMBOGRAPH_QUERY__MAX_CHAIN_DEPTH", "4")
        .args(["config", "query.max_chain_depth"])
        .assert()
        .success()
        .stdout(predicate::eq("4").trim());
}

#[test]
fn test_completions() {
    let dir = TempDir::new().unwrap();
    combograph(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("combograph"));
}

#[test]
fn test_stdio_session() {
    let (dir, path) = dataset();
    let input = concat!(
        r#"{"id": 1, "method": "getDistance1Combos", "params": {"comboId": "C1"}}"#,
        "\n",
        r#"{"id": 2, "method": "getComboById", "params": {"comboId": "nonexistent"}}"#,
        "\n",
    );

    let output = combograph(&dir)
        .arg("--dataset")
        .arg(&path)
        .args(["serve", "--stdio"])
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let responses: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses.len(), 2);

    let first = responses.iter().find(|r| r["id"] == 1).unwrap();
    assert_eq!(first["result"]["combos"][0]["id"], "C2");
    let second = responses.iter().find(|r| r["id"] == 2).unwrap();
    assert!(second["result"].is_null());
}

#[test]
fn test_stdio_failed_load_exits_with_open_stdin() {
    let dir = TempDir::new().unwrap();
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("combograph"))
        .env_remove("RUST_LOG")
        .env_remove("COMBOGRAPH_CONFIG")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .arg("--quiet")
        .arg("--dataset")
        .arg(dir.path().join("absent.json"))
        .args(["serve", "--stdio"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    // Held open for the whole wait, like a parent process would
    let _stdin = child.stdin.take().unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() >= deadline {
            child.kill().unwrap();
            panic!("service kept running after its dataset failed to load");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(!status.success());
}

#[test]
fn test_stdio_failed_load_exits_at_eof() {
    let dir = TempDir::new().unwrap();
    combograph(&dir)
        .arg("--dataset")
        .arg(dir.path().join("absent.json"))
        .args(["serve", "--stdio"])
        .write_stdin("")
        .timeout(Duration::from_secs(15))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Combo graph could not be loaded"));
}
