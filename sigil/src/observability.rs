//! Observability: tracing init and the audit log.
//!
//! Uses sigil_core::config::ObservabilityConfig for SIGIL_QUIET, SIGIL_LOG_LEVEL,
//! SIGIL_LOG_JSON and SIGIL_AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use serde_json::json;
use sigil_core::config::ObservabilityConfig;
use sigil_engine::quarantine::{Actor, QuarantineRecord};
use sigil_engine::Report;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing on stderr. Call at process startup.
/// When SIGIL_QUIET=1, only WARN and above are logged.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();
    let level = if cfg.quiet {
        "sigil=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn audit_path() -> Option<&'static str> {
    static PATH: OnceLock<Option<String>> = OnceLock::new();
    PATH.get_or_init(|| {
        let path = ObservabilityConfig::from_env().audit_log.clone()?;
        if path.is_empty() {
            return None;
        }
        if let Some(parent) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Some(path)
    })
    .as_deref()
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: scan_completed / scan_failed
pub fn audit_scan(report: &Report) {
    let Some(path) = audit_path() else { return };
    let record = if report.is_failed() {
        json!({
            "ts": now(),
            "event": "scan_failed",
            "scan_id": report.scan_id,
            "target": report.target,
            "source_kind": report.source_kind,
            "cause": report.failure.as_ref().map(|c| c.to_string()),
            "duration_ms": report.duration_ms,
        })
    } else {
        json!({
            "ts": now(),
            "event": "scan_completed",
            "scan_id": report.scan_id,
            "target": report.target,
            "source_kind": report.source_kind,
            "score": report.score,
            "verdict": report.verdict,
            "findings": report.findings.len(),
            "quarantine_path": report.quarantine_path,
            "cached": report.cached,
            "duration_ms": report.duration_ms,
        })
    };
    append_jsonl(path, &record);
}

/// Audit: quarantine_approved / quarantine_rejected
pub fn audit_decision(record: &QuarantineRecord, actor: &Actor) {
    let Some(path) = audit_path() else { return };
    let event = match record.decision {
        sigil_engine::quarantine::Decision::Approved => "quarantine_approved",
        _ => "quarantine_rejected",
    };
    append_jsonl(
        path,
        &json!({
            "ts": now(),
            "event": event,
            "scan_id": record.scan_id,
            "actor": actor.name(),
            "actor_kind": actor.kind(),
            "rationale": record.rationale,
        }),
    );
}

/// Audit: purge_performed
pub fn audit_purge(scan_id: &str, purged: &Path) {
    let Some(path) = audit_path() else { return };
    append_jsonl(
        path,
        &json!({
            "ts": now(),
            "event": "purge_performed",
            "scan_id": scan_id,
            "path": purged.display().to_string(),
        }),
    );
}
