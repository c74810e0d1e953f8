//! Line-oriented text report.
//!
//! Consumers without a JSON parser count `[FAIL]` and `[warn]` line prefixes
//! and read the `Risk Score:` line, so those tokens are fixed.

use std::fmt::Write;

use super::{Report, Reporter};
use crate::types::Phase;

pub const FAIL_TAG: &str = "[FAIL]";
pub const WARN_TAG: &str = "[warn]";
pub const PHASE_ERROR_TAG: &str = "[phase-error]";

pub struct TextReporter;

impl Reporter for TextReporter {
    fn render(&self, report: &Report) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write_report(&mut out, report);
        out
    }
}

fn write_report(out: &mut String, report: &Report) -> std::fmt::Result {
    writeln!(out, "Sigil scan report")?;
    writeln!(out, "Target:  {} ({})", report.target, report.source_kind)?;
    writeln!(out, "Scan ID: {}", report.scan_id)?;
    let phases: Vec<&str> = report.phases.iter().map(|p| p.slug()).collect();
    writeln!(out, "Phases:  {}", phases.join(", "))?;

    if let Some(cause) = &report.failure {
        writeln!(out)?;
        writeln!(out, "Scan failed: {}", cause)?;
        return Ok(());
    }

    writeln!(
        out,
        "Files:   {}{}",
        report.files_scanned,
        if report.cached { " (cached)" } else { "" }
    )?;

    for phase in Phase::ALL {
        if !report.phases.contains(&phase) {
            continue;
        }
        writeln!(out)?;
        writeln!(out, "== {} ({}x) ==", phase.name(), phase.multiplier())?;
        let mut any = false;
        for error in report.phase_errors.iter().filter(|e| e.phase == phase) {
            writeln!(out, "{} {}", PHASE_ERROR_TAG, error)?;
            any = true;
        }
        for finding in report.findings_for(phase) {
            let tag = if finding.severity.is_blocking() { FAIL_TAG } else { WARN_TAG };
            writeln!(
                out,
                "{} {} {} [{}] {}",
                tag,
                finding.location(),
                finding.rule_id,
                finding.severity,
                finding.description
            )?;
            if !finding.matched_snippet.is_empty() {
                writeln!(out, "       {}", finding.matched_snippet)?;
            }
            any = true;
        }
        if !any {
            writeln!(out, "  no findings")?;
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "Findings: {} blocking, {} advisory",
        report.blocking_count(),
        report.advisory_count()
    )?;
    if let (Some(score), Some(verdict)) = (report.score, report.verdict) {
        writeln!(out, "Risk Score: {}", score)?;
        writeln!(out, "Verdict: {}", verdict)?;
    }
    if let Some(path) = &report.quarantine_path {
        writeln!(out, "Quarantine: {} (pending decision)", path.display())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{finding, report};
    use super::*;
    use crate::error::{PhaseError, PhaseErrorKind};
    use crate::quarantine::{FailureCause, ScanStatus};
    use crate::types::Severity;

    #[test]
    fn test_tags_and_score_line() {
        let r = report(vec![
            finding(Phase::InstallHooks, "INSTALL-003", Severity::High, "package.json", Some(3), 1.0),
            finding(Phase::NetworkExfil, "NET-001", Severity::Medium, "a.py", Some(7), 1.0),
        ]);
        let text = TextReporter.render(&r);
        let fails = text.lines().filter(|l| l.starts_with(FAIL_TAG)).count();
        let warns = text.lines().filter(|l| l.starts_with(WARN_TAG)).count();
        assert_eq!((fails, warns), (1, 1));
        assert!(text.contains("[FAIL] package.json:3 INSTALL-003 [high]"));
        assert!(text.contains("Risk Score: 13\n"));
        assert!(text.contains("Verdict: MEDIUM\n"));
        assert!(text.contains("Quarantine: /q/3f2a9c1e"));
    }

    #[test]
    fn test_sections_follow_phase_order() {
        let r = report(vec![finding(Phase::Credentials, "CRED-001", Severity::High, "a.py", Some(1), 1.0)]);
        let text = TextReporter.render(&r);
        let install = text.find("== Install Hooks").unwrap();
        let creds = text.find("== Credentials").unwrap();
        let skill = text.find("== Skill Security").unwrap();
        assert!(install < creds && creds < skill);
    }

    #[test]
    fn test_phase_error_line() {
        let mut r = report(Vec::new());
        r.phase_errors.push(PhaseError {
            phase: Phase::Obfuscation,
            kind: PhaseErrorKind::NoSignatures,
        });
        let text = TextReporter.render(&r);
        assert!(text.contains("[phase-error] Obfuscation phase failed: no signatures loaded for this phase"));
        assert!(text.contains("Risk Score: 0\n"));
    }

    #[test]
    fn test_failed_scan_has_cause_and_no_score() {
        let mut r = report(Vec::new());
        r.status = ScanStatus::Failed;
        r.score = None;
        r.verdict = None;
        r.failure = Some(FailureCause::Timeout { elapsed_ms: 30000 });
        let text = TextReporter.render(&r);
        assert!(text.contains("Scan failed: Timeout after 30000ms"));
        assert!(!text.contains("Risk Score"));
    }
}
