//! `sigil list`, `sigil approve`, `sigil reject`.

use std::path::Path;

use anyhow::{Context, Result};
use sigil_core::config::PathsConfig;
use sigil_engine::quarantine::{Actor, Decision, PurgeIntent};

use super::EXIT_OK;
use crate::observability;

pub fn list(pending_only: bool) -> Result<i32> {
    let paths = PathsConfig::from_env();
    let store = super::open_store(&paths)?;
    let entries = store.list(pending_only)?;

    if entries.is_empty() {
        println!("No quarantined scans{}.", if pending_only { " pending a decision" } else { "" });
        return Ok(EXIT_OK);
    }

    println!(
        "{:<10} {:<9} {:>5} {:<10} {:<17} TARGET",
        "ID", "VERDICT", "SCORE", "DECISION", "CREATED"
    );
    for (scan, record) in &entries {
        let decision = match record.decision {
            Decision::Undecided => "pending".to_string(),
            decided => decided.to_string(),
        };
        println!(
            "{:<10} {:<9} {:>5} {:<10} {:<17} {}",
            short_id(&scan.id),
            scan.verdict,
            scan.score,
            decision,
            scan.created_at.format("%Y-%m-%d %H:%M"),
            scan.target_identity
        );
    }
    Ok(EXIT_OK)
}

pub fn approve(id: &str, name: &str, force_override: bool, pipeline: bool, reason: Option<String>) -> Result<i32> {
    let paths = PathsConfig::from_env();
    let store = super::open_store(&paths)?;
    let id = store.resolve_id(id)?;

    let actor = if force_override {
        Actor::Override(name.to_string())
    } else if pipeline {
        Actor::Pipeline(name.to_string())
    } else {
        Actor::User(name.to_string())
    };
    let record = store
        .approve(&id, &actor, reason)
        .with_context(|| format!("Cannot approve scan {}", id))?;
    observability::audit_decision(&record, &actor);
    println!("Approved {} as {}", id, actor.label());
    Ok(EXIT_OK)
}

pub fn reject(id: &str, name: &str, reason: Option<String>) -> Result<i32> {
    let paths = PathsConfig::from_env();
    let store = super::open_store(&paths)?;
    let id = store.resolve_id(id)?;

    let actor = Actor::User(name.to_string());
    let (record, intent) = store
        .reject(&id, &actor, reason)
        .with_context(|| format!("Cannot reject scan {}", id))?;
    observability::audit_decision(&record, &actor);
    println!("Rejected {} as {}", id, actor.label());

    if purge(&intent, &paths.quarantine_dir)? {
        println!("Purged {}", intent.path.display());
    }
    Ok(EXIT_OK)
}

/// Delete the quarantined material. Only paths inside the quarantine
/// directory are ever removed. Returns whether anything was deleted.
fn purge(intent: &PurgeIntent, quarantine_dir: &Path) -> Result<bool> {
    if !intent.path.starts_with(quarantine_dir) || intent.path == quarantine_dir {
        tracing::warn!(
            scan_id = %intent.scan_id,
            "not purging {}: outside the quarantine directory",
            intent.path.display()
        );
        return Ok(false);
    }
    if !intent.path.exists() {
        tracing::debug!(scan_id = %intent.scan_id, "nothing to purge at {}", intent.path.display());
        return Ok(false);
    }
    let removed = if intent.path.is_dir() {
        std::fs::remove_dir_all(&intent.path)
    } else {
        std::fs::remove_file(&intent.path)
    };
    removed.with_context(|| format!("Failed to purge {}", intent.path.display()))?;
    observability::audit_purge(&intent.scan_id, &intent.path);
    Ok(true)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(path: &Path) -> PurgeIntent {
        PurgeIntent {
            scan_id: "3f2a9c1e".to_string(),
            path: path.to_path_buf(),
        }
    }

    #[test]
    fn test_purge_removes_quarantined_dir() {
        let q = tempfile::tempdir().unwrap();
        let target = q.path().join("3f2a9c1e");
        std::fs::create_dir_all(target.join("pkg")).unwrap();
        std::fs::write(target.join("pkg/setup.py"), "x").unwrap();

        assert!(purge(&intent(&target), q.path()).unwrap());
        assert!(!target.exists());
    }

    #[test]
    fn test_purge_refuses_paths_outside_store() {
        let q = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        assert!(!purge(&intent(elsewhere.path()), q.path()).unwrap());
        assert!(elsewhere.path().exists());
        assert!(!purge(&intent(q.path()), q.path()).unwrap());
        assert!(q.path().exists());
    }

    #[test]
    fn test_purge_missing_path_is_noop() {
        let q = tempfile::tempdir().unwrap();
        assert!(!purge(&intent(&q.path().join("gone")), q.path()).unwrap());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("3f2a9c1e-0000-4000"), "3f2a9c1e");
        assert_eq!(short_id("abc"), "abc");
    }
}
