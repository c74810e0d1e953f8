//! Phase detectors.
//!
//! Every phase is a stateless [`PhaseDetector`] value: the phase tag plus the
//! structural probes it owns. Regex signatures are evaluated the same way for
//! all phases; probes cover what a line regex cannot (manifests, git metadata,
//! entropy, invisible characters). Detectors never look at another phase's
//! output.

pub mod code_patterns;
pub mod credentials;
pub mod install_hooks;
pub mod network;
pub mod obfuscation;
pub mod prompt_injection;
pub mod provenance;
pub mod skill_security;

use std::collections::VecDeque;

use crate::cancel::CancelToken;
use crate::catalog::{truncate_snippet, Catalog, Signature};
use crate::tree::{FileTree, TreeEntry};
use crate::types::{Finding, Phase};

/// What a detector needs to run: the scan it reports for, the catalog and the
/// tree snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub scan_id: &'a str,
    pub catalog: &'a Catalog,
    pub tree: &'a FileTree,
}

/// A probe result before it is bound to a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeHit {
    pub file_path: String,
    pub line_number: Option<usize>,
    pub snippet: String,
}

impl ProbeHit {
    pub fn at(file_path: &str, line_number: Option<usize>, snippet: impl Into<String>) -> Self {
        Self {
            file_path: file_path.to_string(),
            line_number,
            snippet: snippet.into(),
        }
    }
}

/// Runs once per tree.
pub type TreeProbeFn = fn(&FileTree) -> Vec<ProbeHit>;
/// Runs once per file.
pub type FileProbeFn = fn(&TreeEntry) -> Vec<ProbeHit>;

#[derive(Clone, Copy)]
pub enum ProbeFn {
    Tree(TreeProbeFn),
    File(FileProbeFn),
}

/// A named structural check. Probe signatures reference it by `name`.
pub struct Probe {
    pub name: &'static str,
    pub run: ProbeFn,
}

pub struct PhaseDetector {
    pub phase: Phase,
    pub probes: &'static [Probe],
}

impl std::fmt::Debug for PhaseDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseDetector")
            .field("phase", &self.phase)
            .field("probes", &self.probes.iter().map(|p| p.name).collect::<Vec<_>>())
            .finish()
    }
}

/// The detector for `phase`.
pub fn detector(phase: Phase) -> &'static PhaseDetector {
    match phase {
        Phase::InstallHooks => &install_hooks::DETECTOR,
        Phase::CodePatterns => &code_patterns::DETECTOR,
        Phase::NetworkExfil => &network::DETECTOR,
        Phase::Credentials => &credentials::DETECTOR,
        Phase::Obfuscation => &obfuscation::DETECTOR,
        Phase::Provenance => &provenance::DETECTOR,
        Phase::PromptInjection => &prompt_injection::DETECTOR,
        Phase::SkillSecurity => &skill_security::DETECTOR,
    }
}

/// Phase that owns the probe called `name`.
pub fn probe_owner(name: &str) -> Option<Phase> {
    Phase::ALL
        .into_iter()
        .find(|&phase| detector(phase).probe(name).is_some())
}

impl PhaseDetector {
    fn probe(&self, name: &str) -> Option<&Probe> {
        self.probes.iter().find(|p| p.name == name)
    }

    fn finding(&self, ctx: PhaseContext<'_>, sig: &Signature, hit: ProbeHit) -> Finding {
        Finding {
            scan_id: ctx.scan_id.to_string(),
            phase: self.phase,
            rule_id: sig.id.clone(),
            severity: sig.severity,
            file_path: hit.file_path,
            line_number: hit.line_number,
            matched_snippet: truncate_snippet(&hit.snippet),
            weight: sig.weight,
            description: sig.description.clone(),
        }
    }

    /// Findings from tree-level probes (git metadata, manifest presence).
    pub fn tree_findings(&self, ctx: PhaseContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for sig in ctx.catalog.probes(self.phase) {
            if let Some(Probe {
                run: ProbeFn::Tree(probe),
                ..
            }) = self.probe(&sig.pattern)
            {
                for hit in probe(ctx.tree) {
                    findings.push(self.finding(ctx, sig, hit));
                }
            }
        }
        findings
    }

    /// Findings for one file: path signatures, then content signatures in line
    /// order, then file probes.
    pub fn file_findings(&self, ctx: PhaseContext<'_>, entry: &TreeEntry) -> Vec<Finding> {
        let mut findings: Vec<Finding> = ctx
            .catalog
            .matches(self.phase, entry)
            .into_iter()
            .map(|hit| {
                let probe_hit = ProbeHit {
                    file_path: entry.rel_path.clone(),
                    line_number: hit.line_number,
                    snippet: hit.snippet,
                };
                self.finding(ctx, hit.signature, probe_hit)
            })
            .collect();

        for sig in ctx.catalog.probes(self.phase) {
            if !sig.applies_to(entry.language, entry.file_name()) {
                continue;
            }
            if let Some(Probe {
                run: ProbeFn::File(probe),
                ..
            }) = self.probe(&sig.pattern)
            {
                for hit in probe(entry) {
                    findings.push(self.finding(ctx, sig, hit));
                }
            }
        }
        findings
    }

    /// Lazy stream over this phase's findings for the whole tree.
    pub fn detect<'a>(&'static self, ctx: PhaseContext<'a>) -> FindingStream<'a> {
        FindingStream::new(self, ctx, None)
    }

    /// Like [`detect`](Self::detect), stopping at the next file boundary once
    /// `cancel` trips.
    pub fn detect_until<'a>(&'static self, ctx: PhaseContext<'a>, cancel: &'a CancelToken) -> FindingStream<'a> {
        FindingStream::new(self, ctx, Some(cancel))
    }
}

/// Finite, lazy sequence of one phase's findings.
///
/// Files are processed one at a time as the stream is pulled. Restarting
/// (via [`restart`](Self::restart) or a fresh `detect`) over the same tree and
/// catalog yields the same sequence.
#[derive(Debug, Clone)]
pub struct FindingStream<'a> {
    detector: &'static PhaseDetector,
    ctx: PhaseContext<'a>,
    cancel: Option<&'a CancelToken>,
    next_file: usize,
    tree_done: bool,
    cancelled: bool,
    pending: VecDeque<Finding>,
}

impl<'a> FindingStream<'a> {
    fn new(detector: &'static PhaseDetector, ctx: PhaseContext<'a>, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            detector,
            ctx,
            cancel,
            next_file: 0,
            tree_done: false,
            cancelled: false,
            pending: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.detector.phase
    }

    /// True if the stream ended early because of cancellation.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// A fresh stream from the first file.
    pub fn restart(&self) -> Self {
        Self::new(self.detector, self.ctx, self.cancel)
    }
}

impl Iterator for FindingStream<'_> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            if let Some(finding) = self.pending.pop_front() {
                return Some(finding);
            }
            if self.cancelled {
                return None;
            }
            if !self.tree_done {
                self.tree_done = true;
                self.pending.extend(self.detector.tree_findings(self.ctx));
                continue;
            }
            let entry = self.ctx.tree.entries().get(self.next_file)?;
            if self.cancel.is_some_and(CancelToken::is_cancelled) {
                self.cancelled = true;
                return None;
            }
            self.next_file += 1;
            self.pending.extend(self.detector.file_findings(self.ctx, entry));
        }
    }
}

/// 1-based number of the first line containing `needle`.
pub(crate) fn line_of(text: &str, needle: &str) -> Option<usize> {
    text.split('\n').position(|l| l.contains(needle)).map(|i| i + 1)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Run one phase with the builtin catalog over in-memory entries.
    pub fn run_builtin(phase: Phase, entries: Vec<TreeEntry>) -> Vec<Finding> {
        run_tree(phase, FileTree::from_entries("/virtual", entries, None))
    }

    pub fn run_tree(phase: Phase, tree: FileTree) -> Vec<Finding> {
        let catalog = Catalog::builtin().unwrap();
        let ctx = PhaseContext {
            scan_id: "test-scan",
            catalog: &catalog,
            tree: &tree,
        };
        detector(phase).detect(ctx).collect()
    }

    pub fn rule_ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.rule_id.as_str()).collect()
    }
}
