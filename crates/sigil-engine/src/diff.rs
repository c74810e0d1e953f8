//! Compare two reports of the same target: which findings appeared, which
//! were resolved, and how the score moved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::report::Report;
use crate::scoring::Verdict;
use crate::types::Finding;

/// Findings are matched on rule, file and line. Snippets may change between
/// versions without making a finding new.
type FindingKey<'a> = (&'a str, &'a str, Option<usize>);

fn key(finding: &Finding) -> FindingKey<'_> {
    (finding.rule_id.as_str(), finding.file_path.as_str(), finding.line_number)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDiff {
    pub old_scan_id: String,
    pub new_scan_id: String,
    pub old_score: u64,
    pub new_score: u64,
    pub score_delta: i64,
    pub old_verdict: Verdict,
    pub new_verdict: Verdict,
    pub new_findings: Vec<Finding>,
    pub resolved_findings: Vec<Finding>,
    pub unchanged: usize,
}

impl ReportDiff {
    pub fn verdict_changed(&self) -> bool {
        self.old_verdict != self.new_verdict
    }

    /// True if the new report is worse: a higher band or any new finding.
    pub fn is_regression(&self) -> bool {
        self.new_verdict > self.old_verdict || !self.new_findings.is_empty()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str(&format!("Compare {} -> {}\n", self.old_scan_id, self.new_scan_id));
        out.push_str(&format!(
            "Risk Score: {} -> {} ({:+})\n",
            self.old_score, self.new_score, self.score_delta
        ));
        if self.verdict_changed() {
            out.push_str(&format!("Verdict: {} -> {}\n", self.old_verdict, self.new_verdict));
        } else {
            out.push_str(&format!("Verdict: {} (unchanged)\n", self.new_verdict));
        }
        for f in &self.new_findings {
            out.push_str(&format!("+ {} {} [{}] {}\n", f.location(), f.rule_id, f.severity, f.description));
        }
        for f in &self.resolved_findings {
            out.push_str(&format!("- {} {} [{}] {}\n", f.location(), f.rule_id, f.severity, f.description));
        }
        out.push_str(&format!(
            "{} new, {} resolved, {} unchanged\n",
            self.new_findings.len(),
            self.resolved_findings.len(),
            self.unchanged
        ));
        out
    }
}

/// Multiset difference of `old` and `new` findings, keeping report order.
pub fn diff(old: &Report, new: &Report) -> ReportDiff {
    let mut remaining: HashMap<FindingKey<'_>, usize> = HashMap::new();
    for f in &old.findings {
        *remaining.entry(key(f)).or_insert(0) += 1;
    }

    let mut new_findings = Vec::new();
    let mut unchanged = 0;
    for f in &new.findings {
        match remaining.get_mut(&key(f)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                unchanged += 1;
            }
            _ => new_findings.push(f.clone()),
        }
    }

    let mut resolved_findings = Vec::new();
    for f in old.findings.iter().rev() {
        if let Some(count) = remaining.get_mut(&key(f)) {
            if *count > 0 {
                *count -= 1;
                resolved_findings.push(f.clone());
            }
        }
    }
    resolved_findings.reverse();

    let (old_score, old_verdict) = settled(old);
    let (new_score, new_verdict) = settled(new);
    ReportDiff {
        old_scan_id: old.scan_id.clone(),
        new_scan_id: new.scan_id.clone(),
        old_score,
        new_score,
        score_delta: new_score as i64 - old_score as i64,
        old_verdict,
        new_verdict,
        new_findings,
        resolved_findings,
        unchanged,
    }
}

/// Score and verdict as stored, or recomputed from the findings when the
/// report carries none.
fn settled(report: &Report) -> (u64, Verdict) {
    let score = report.score.unwrap_or_else(|| report.recomputed_score());
    (score, report.verdict.unwrap_or_else(|| Verdict::from_score(score)))
}
