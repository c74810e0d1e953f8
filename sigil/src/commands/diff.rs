//! `sigil diff OLD NEW`

use std::path::Path;

use anyhow::{Context, Result};
use sigil_engine::{diff, Report};

use super::EXIT_OK;

/// Failed scans carry no score and cannot be compared.
fn read_report(path: &Path) -> Result<Report> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let report =
        Report::from_json(&raw).with_context(|| format!("{} is not a sigil JSON report", path.display()))?;
    if report.is_failed() {
        anyhow::bail!("{} is a failed scan and has no score to compare", path.display());
    }
    Ok(report)
}

pub fn run(old: &Path, new: &Path, json: bool) -> Result<i32> {
    let old = read_report(old)?;
    let new = read_report(new)?;
    if old.target != new.target {
        tracing::warn!("comparing reports of different targets: {} vs {}", old.target, new.target);
    }
    let comparison = diff::diff(&old, &new);
    if json {
        println!("{}", serde_json::to_string_pretty(&comparison).context("Failed to serialize diff")?);
    } else {
        print!("{}", comparison.render_text());
    }
    Ok(EXIT_OK)
}
