//! Report emitter: the structured artifact every integration consumes.

pub mod sarif;
pub mod text;

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PhaseError;
use crate::quarantine::{FailureCause, ScanRecord, ScanStatus};
use crate::runner::RunOutcome;
use crate::scoring::{self, Verdict};
use crate::types::{Finding, Phase, SourceKind};

pub use sarif::SarifReporter;
pub use text::TextReporter;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result of one scan, as handed to callers and written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub engine_version: String,
    pub scan_id: String,
    pub target: String,
    pub source_kind: SourceKind,
    pub status: ScanStatus,
    /// Absent for failed scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub phases: Vec<Phase>,
    pub files_scanned: usize,
    /// Phase declaration order, then emission order within a phase.
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub phase_errors: Vec<PhaseError>,
    pub quarantine_path: Option<PathBuf>,
    pub failure: Option<FailureCause>,
    pub duration_ms: u64,
    pub generated_at: DateTime<Utc>,
    /// True when findings were served from the scan cache.
    #[serde(default)]
    pub cached: bool,
}

impl Report {
    /// Report for a completed scan.
    pub fn completed(scan: &ScanRecord, outcome: &RunOutcome, duration_ms: u64) -> Self {
        Self {
            phase_errors: outcome.phase_errors.clone(),
            files_scanned: outcome.files_scanned,
            ..Self::base(scan, outcome.phases.clone(), duration_ms)
        }
    }

    /// Report for a failed scan. Carries the cause and no findings.
    pub fn failed(scan: &ScanRecord, phases: Vec<Phase>, duration_ms: u64) -> Self {
        Self::base(scan, phases, duration_ms)
    }

    fn base(scan: &ScanRecord, phases: Vec<Phase>, duration_ms: u64) -> Self {
        let scored = scan.status != ScanStatus::Failed;
        Self {
            engine_version: ENGINE_VERSION.to_string(),
            scan_id: scan.id.clone(),
            target: scan.target_identity.clone(),
            source_kind: scan.source_kind,
            status: scan.status,
            score: scored.then_some(scan.score),
            verdict: scored.then_some(scan.verdict),
            phases,
            files_scanned: 0,
            findings: scan.findings.clone(),
            phase_errors: Vec::new(),
            quarantine_path: scan.quarantine_path.clone(),
            failure: scan.failure.clone(),
            duration_ms,
            generated_at: Utc::now(),
            cached: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == ScanStatus::Failed
    }

    /// Findings with blocking severity (`[FAIL]` lines).
    pub fn blocking_count(&self) -> usize {
        self.findings.iter().filter(|f| f.severity.is_blocking()).count()
    }

    pub fn advisory_count(&self) -> usize {
        self.findings.len() - self.blocking_count()
    }

    /// Score recomputed from the findings; equals `score` for any completed
    /// report the engine produced.
    pub fn recomputed_score(&self) -> u64 {
        scoring::total_score(&self.findings)
    }

    pub fn findings_for(&self, phase: Phase) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.phase == phase)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => TextReporter.render(self),
            ReportFormat::Json => JsonReporter.render(self),
            ReportFormat::Sarif => SarifReporter.render(self),
        }
    }
}

/// Renders a report into one output format.
pub trait Reporter {
    fn render(&self, report: &Report) -> String;
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn render(&self, report: &Report) -> String {
        report
            .to_json()
            .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize report: {}"}}"#, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Sarif,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "sarif" => Ok(ReportFormat::Sarif),
            other => Err(format!("unknown report format '{}' (text, json, sarif)", other)),
        }
    }
}
