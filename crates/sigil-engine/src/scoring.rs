//! Risk aggregation and verdict banding.
//!
//! Each finding contributes `weight × phase multiplier`. Contributions are
//! summed exactly in integer milli-points and the total is rounded half-to-even
//! to an integer score, so a score recomputed from stored findings always
//! reproduces the stored value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::Finding;

/// Discrete risk band derived from the score. Never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Clean,
    Low,
    Medium,
    High,
    Critical,
}

impl Verdict {
    /// Half-open bands: 0 | [1,10) | [10,25) | [25,50) | [50,∞).
    pub fn from_score(score: u64) -> Self {
        match score {
            0 => Verdict::Clean,
            1..=9 => Verdict::Low,
            10..=24 => Verdict::Medium,
            25..=49 => Verdict::High,
            _ => Verdict::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Clean => "CLEAN",
            Verdict::Low => "LOW",
            Verdict::Medium => "MEDIUM",
            Verdict::High => "HIGH",
            Verdict::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milli-points contributed by one finding.
pub fn contribution_millis(finding: &Finding) -> u64 {
    let raw = finding.weight * finding.phase.multiplier() * 1000.0;
    if raw.is_finite() && raw > 0.0 {
        raw.round() as u64
    } else {
        0
    }
}

/// Integer division by 1000 with round-half-to-even.
fn millis_to_score(total: u64) -> u64 {
    let quotient = total / 1000;
    let remainder = total % 1000;
    if remainder > 500 || (remainder == 500 && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// Aggregate score of a finding set.
pub fn total_score(findings: &[Finding]) -> u64 {
    millis_to_score(findings.iter().map(contribution_millis).sum())
}

/// `(score, verdict)` for a finding set.
pub fn score(findings: &[Finding]) -> (u64, Verdict) {
    let total = total_score(findings);
    (total, Verdict::from_score(total))
}

/// Caller-supplied failure threshold for the process exit code.
/// Independent of verdict computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    Low,
    Medium,
    High,
    Critical,
}

impl Threshold {
    pub fn min_score(self) -> u64 {
        match self {
            Threshold::Low => 1,
            Threshold::Medium => 10,
            Threshold::High => 25,
            Threshold::Critical => 50,
        }
    }

    /// True when `score` is at or above the threshold.
    pub fn is_exceeded_by(self, score: u64) -> bool {
        score >= self.min_score()
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Threshold::Low),
            "medium" => Ok(Threshold::Medium),
            "high" => Ok(Threshold::High),
            "critical" => Ok(Threshold::Critical),
            other => Err(format!(
                "invalid threshold '{}' (expected low, medium, high or critical)",
                other
            )),
        }
    }
}
