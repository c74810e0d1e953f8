//! Quarantine store: the per-scan lifecycle state machine and the write-once
//! approve/reject decision.
//!
//! ```text
//! pending ──begin──▶ scanning ──finish──▶ completed ──(verdict ≠ CLEAN)──▶ record[undecided]
//!    │                  │                                                   │
//!    └──────fail────────┴──▶ failed                          approve / reject (once)
//! ```
//!
//! Every transition runs under the store lock: reload the index (persistent
//! mode), validate, apply to a copy, write the copy atomically, then publish
//! it. A failed write leaves the previous state untouched.
//!
//! A persistent store keeps a copy of every held (non-CLEAN) snapshot under
//! `<root>/<scan id>`; that copy is what a rejection purges. Settled scans
//! (CLEAN or failed) are only kept for the newest [`RETAINED_SETTLED_SCANS`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuarantineError, ScanError};
use crate::scoring::{self, Verdict};
use crate::tree::{FileContent, FileTree};
use crate::types::{Finding, SourceKind, Target};

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// CLEAN and failed scans kept in the index; older ones are pruned.
pub const RETAINED_SETTLED_SCANS: usize = 64;

/// Recorded as `approved_by` on CLEAN scans, which never get a record.
pub const AUTO_APPROVER: &str = "auto:clean";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Scanning,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a scan ended in `failed`. Always carries a specific cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureCause {
    Timeout { elapsed_ms: u64 },
    TargetUnreadable(String),
    Internal(String),
}

impl FailureCause {
    pub fn from_scan_error(err: &ScanError) -> Self {
        match err {
            ScanError::Timeout { elapsed_ms } => FailureCause::Timeout {
                elapsed_ms: *elapsed_ms,
            },
            ScanError::TargetUnreadable { path, reason } => {
                FailureCause::TargetUnreadable(format!("{}: {}", path.display(), reason))
            }
            other => FailureCause::Internal(other.to_string()),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Timeout { elapsed_ms } => write!(f, "Timeout after {}ms", elapsed_ms),
            FailureCause::TargetUnreadable(reason) => write!(f, "Target unreadable: {}", reason),
            FailureCause::Internal(reason) => write!(f, "Internal error: {}", reason),
        }
    }
}

/// One scan and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub target_identity: String,
    pub source_kind: SourceKind,
    pub location: PathBuf,
    pub status: ScanStatus,
    pub score: u64,
    pub verdict: Verdict,
    pub findings: Vec<Finding>,
    /// Set iff the scan completed with a verdict other than CLEAN.
    pub quarantine_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub failure: Option<FailureCause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Undecided,
    Approved,
    Rejected,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Undecided => "undecided",
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        })
    }
}

/// Quarantine projection of a non-CLEAN completed scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub scan_id: String,
    pub decision: Decision,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rationale: Option<String>,
}

/// Who is asking for a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Actor {
    /// An automatic caller such as a CI pipeline.
    Pipeline(String),
    /// A named human.
    User(String),
    /// A named human explicitly overriding the policy for HIGH.
    Override(String),
}

impl Actor {
    pub fn name(&self) -> &str {
        match self {
            Actor::Pipeline(n) | Actor::User(n) | Actor::Override(n) => n,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Actor::Pipeline(_) => "pipeline",
            Actor::User(_) => "user",
            Actor::Override(_) => "override",
        }
    }

    /// `kind:name`, as stored in `decided_by`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.kind(), self.name())
    }
}

/// Emitted by `reject`: the materializer should delete `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeIntent {
    pub scan_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    scans: BTreeMap<String, ScanRecord>,
    records: BTreeMap<String, QuarantineRecord>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(flatten)]
    state: StoreState,
}

impl StoreState {
    fn scan_mut(&mut self, id: &str) -> Result<&mut ScanRecord, QuarantineError> {
        self.scans
            .get_mut(id)
            .ok_or_else(|| QuarantineError::NotFound(id.to_string()))
    }
}

/// Scan lifecycle and quarantine decisions, optionally persisted to
/// `<root>/index.json`.
///
/// Handles in one process serialize through the index: each transition
/// reloads it under the handle's lock before writing. Separate processes
/// sharing a root are not locked against each other; the last writer wins.
#[derive(Debug)]
pub struct QuarantineStore {
    root: PathBuf,
    index_path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

fn persistence<E: fmt::Display>(context: &'static str) -> impl FnOnce(E) -> QuarantineError {
    move |e| QuarantineError::Persistence(format!("{}: {}", context, e))
}

impl QuarantineStore {
    /// Open (or create) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, QuarantineError> {
        let root = dir.into();
        fs::create_dir_all(&root).map_err(persistence("create quarantine dir"))?;
        let index_path = root.join(INDEX_FILE);
        let state = read_index(&index_path)?.unwrap_or_default();
        tracing::debug!("quarantine store opened at {} ({} scans)", root.display(), state.scans.len());
        Ok(Self {
            root,
            index_path: Some(index_path),
            state: Mutex::new(state),
        })
    }

    /// A store that lives only in memory. Quarantine paths are reported under
    /// `root` but nothing is written there.
    pub fn in_memory(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_persistent(&self) -> bool {
        self.index_path.is_some()
    }

    /// Copy the scanned snapshot into `<root>/<id>` so the held material
    /// survives the scan and a rejection has something to purge. Files are
    /// staged beside the destination and renamed into place. In-memory
    /// stores write nothing.
    pub fn hold(&self, id: &str, tree: &FileTree) -> Result<Option<PathBuf>, QuarantineError> {
        if !self.is_persistent() {
            return Ok(None);
        }
        let dest = self.root.join(id);
        let staging = self.root.join(format!(".{}.partial", id));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(persistence("clear hold staging"))?;
        }
        if let Err(e) = copy_snapshot(tree, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(persistence("replace held snapshot"))?;
        }
        fs::rename(&staging, &dest).map_err(persistence("publish held snapshot"))?;
        tracing::debug!(scan_id = id, files = tree.len(), "snapshot held at {}", dest.display());
        Ok(Some(dest))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, QuarantineError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| QuarantineError::Persistence("store lock poisoned".to_string()))?;
        if let Some(path) = &self.index_path {
            if let Some(fresh) = read_index(path)? {
                *guard = fresh;
            }
        }
        Ok(guard)
    }

    fn transition<T>(&self, apply: impl FnOnce(&mut StoreState) -> Result<T, QuarantineError>) -> Result<T, QuarantineError> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = apply(&mut next)?;
        if let Some(path) = &self.index_path {
            write_index(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }

    /// Register a new scan in `pending`.
    pub fn create(&self, target: &Target) -> Result<ScanRecord, QuarantineError> {
        let scan = ScanRecord {
            id: uuid::Uuid::new_v4().to_string(),
            target_identity: target.identity.clone(),
            source_kind: target.source_kind,
            location: target.location.clone(),
            status: ScanStatus::Pending,
            score: 0,
            verdict: Verdict::Clean,
            findings: Vec::new(),
            quarantine_path: None,
            created_at: Utc::now(),
            completed_at: None,
            approved_by: None,
            approved_at: None,
            failure: None,
        };
        self.transition(|state| {
            state.scans.insert(scan.id.clone(), scan.clone());
            Ok(scan)
        })
    }

    /// `pending → scanning`.
    pub fn begin(&self, id: &str) -> Result<ScanRecord, QuarantineError> {
        self.transition(|state| {
            let scan = state.scan_mut(id)?;
            if scan.status != ScanStatus::Pending {
                return Err(QuarantineError::AlreadyRunning(id.to_string()));
            }
            scan.status = ScanStatus::Scanning;
            Ok(scan.clone())
        })
    }

    /// `scanning → completed`. The supplied score and verdict must agree with
    /// the findings; a non-CLEAN verdict opens an undecided record.
    pub fn finish(
        &self,
        id: &str,
        findings: Vec<Finding>,
        score: u64,
        verdict: Verdict,
    ) -> Result<ScanRecord, QuarantineError> {
        if let Some(foreign) = findings.iter().find(|f| f.scan_id != id) {
            return Err(QuarantineError::ForeignFinding {
                id: id.to_string(),
                other: foreign.scan_id.clone(),
            });
        }
        let recomputed = scoring::total_score(&findings);
        if recomputed != score {
            return Err(QuarantineError::InconsistentScore {
                id: id.to_string(),
                stored: score,
                recomputed,
            });
        }
        let expected = Verdict::from_score(score);
        if expected != verdict {
            return Err(QuarantineError::InconsistentVerdict {
                id: id.to_string(),
                supplied: verdict,
                expected,
            });
        }

        let quarantine_path = self.root.join(id);
        let scan = self.transition(|state| {
            let scan = state.scan_mut(id)?;
            if scan.status != ScanStatus::Scanning {
                return Err(QuarantineError::InvalidTransition {
                    id: id.to_string(),
                    from: scan.status.to_string(),
                    to: ScanStatus::Completed.to_string(),
                });
            }
            let now = Utc::now();
            scan.status = ScanStatus::Completed;
            scan.findings = findings;
            scan.score = score;
            scan.verdict = verdict;
            scan.completed_at = Some(now);
            if verdict == Verdict::Clean {
                scan.approved_by = Some(AUTO_APPROVER.to_string());
                scan.approved_at = Some(now);
            } else {
                scan.quarantine_path = Some(quarantine_path);
            }
            let scan = scan.clone();
            if verdict == Verdict::Clean {
                prune_settled(state, id);
            } else {
                state.records.insert(
                    id.to_string(),
                    QuarantineRecord {
                        scan_id: id.to_string(),
                        decision: Decision::Undecided,
                        decided_by: None,
                        decided_at: None,
                        rationale: None,
                    },
                );
            }
            Ok(scan)
        })?;
        tracing::info!(scan_id = id, score, verdict = %verdict, "scan completed");
        Ok(scan)
    }

    /// `pending | scanning → failed`. Any findings are dropped.
    pub fn fail(&self, id: &str, cause: FailureCause) -> Result<ScanRecord, QuarantineError> {
        self.transition(|state| {
            let scan = state.scan_mut(id)?;
            if !matches!(scan.status, ScanStatus::Pending | ScanStatus::Scanning) {
                return Err(QuarantineError::InvalidTransition {
                    id: id.to_string(),
                    from: scan.status.to_string(),
                    to: ScanStatus::Failed.to_string(),
                });
            }
            scan.status = ScanStatus::Failed;
            scan.findings.clear();
            scan.score = 0;
            scan.verdict = Verdict::Clean;
            scan.completed_at = Some(Utc::now());
            scan.failure = Some(cause);
            let scan = scan.clone();
            prune_settled(state, id);
            Ok(scan)
        })
    }

    /// Approve a quarantined scan.
    ///
    /// | verdict  | allowed actors        |
    /// |----------|-----------------------|
    /// | LOW      | any                   |
    /// | MEDIUM   | `User`, `Override`    |
    /// | HIGH     | `Override`            |
    /// | CRITICAL | none                  |
    pub fn approve(&self, id: &str, actor: &Actor, rationale: Option<String>) -> Result<QuarantineRecord, QuarantineError> {
        let record = self.transition(|state| {
            let verdict = undecided_verdict(state, id)?;
            check_actor(actor)?;
            match verdict {
                Verdict::Critical => return Err(QuarantineError::CriticalOverrideDenied(id.to_string())),
                Verdict::High if !matches!(actor, Actor::Override(_)) => {
                    return Err(QuarantineError::OverrideRequired {
                        id: id.to_string(),
                        verdict,
                    })
                }
                Verdict::Medium if matches!(actor, Actor::Pipeline(_)) => {
                    return Err(QuarantineError::ExplicitActorRequired {
                        id: id.to_string(),
                        verdict,
                    })
                }
                _ => {}
            }
            let now = Utc::now();
            let scan = state.scan_mut(id)?;
            scan.approved_by = Some(actor.label());
            scan.approved_at = Some(now);
            decide(state, id, Decision::Approved, actor, rationale, now)
        })?;
        tracing::info!(scan_id = id, actor = %actor.label(), "quarantine approved");
        Ok(record)
    }

    /// Reject a quarantined scan. Any actor may reject.
    pub fn reject(
        &self,
        id: &str,
        actor: &Actor,
        rationale: Option<String>,
    ) -> Result<(QuarantineRecord, PurgeIntent), QuarantineError> {
        let root = self.root.clone();
        let out = self.transition(|state| {
            undecided_verdict(state, id)?;
            check_actor(actor)?;
            let path = state
                .scans
                .get(id)
                .and_then(|s| s.quarantine_path.clone())
                .unwrap_or_else(|| root.join(id));
            let record = decide(state, id, Decision::Rejected, actor, rationale, Utc::now())?;
            Ok((
                record,
                PurgeIntent {
                    scan_id: id.to_string(),
                    path,
                },
            ))
        })?;
        tracing::info!(scan_id = id, actor = %actor.label(), "quarantine rejected");
        Ok(out)
    }

    pub fn get(&self, id: &str) -> Result<Option<ScanRecord>, QuarantineError> {
        Ok(self.lock()?.scans.get(id).cloned())
    }

    pub fn record(&self, id: &str) -> Result<Option<QuarantineRecord>, QuarantineError> {
        Ok(self.lock()?.records.get(id).cloned())
    }

    /// Resolve a full id or a unique prefix of one.
    pub fn resolve_id(&self, prefix: &str) -> Result<String, QuarantineError> {
        let state = self.lock()?;
        if state.scans.contains_key(prefix) {
            return Ok(prefix.to_string());
        }
        let mut matches = state.scans.keys().filter(|id| !prefix.is_empty() && id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(QuarantineError::AmbiguousId(prefix.to_string())),
            (None, _) => Err(QuarantineError::NotFound(prefix.to_string())),
        }
    }

    /// Quarantined scans with their records, newest first.
    pub fn list(&self, pending_only: bool) -> Result<Vec<(ScanRecord, QuarantineRecord)>, QuarantineError> {
        let state = self.lock()?;
        let mut out: Vec<(ScanRecord, QuarantineRecord)> = state
            .records
            .values()
            .filter(|r| !pending_only || r.decision == Decision::Undecided)
            .filter_map(|r| state.scans.get(&r.scan_id).map(|s| (s.clone(), r.clone())))
            .collect();
        out.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at).then_with(|| a.0.id.cmp(&b.0.id)));
        Ok(out)
    }
}

/// Drop the oldest CLEAN and failed scans beyond [`RETAINED_SETTLED_SCANS`].
/// `keep` is never dropped. Held scans and their records are untouched.
fn prune_settled(state: &mut StoreState, keep: &str) {
    let mut settled: Vec<(Option<DateTime<Utc>>, String)> = state
        .scans
        .values()
        .filter(|s| s.id != keep && !state.records.contains_key(&s.id))
        .filter(|s| matches!(s.status, ScanStatus::Completed | ScanStatus::Failed))
        .map(|s| (s.completed_at, s.id.clone()))
        .collect();
    let budget = RETAINED_SETTLED_SCANS.saturating_sub(1);
    if settled.len() <= budget {
        return;
    }
    settled.sort();
    let excess = settled.len() - budget;
    for (_, id) in settled.into_iter().take(excess) {
        state.scans.remove(&id);
    }
    tracing::debug!(pruned = excess, "pruned settled scans from quarantine index");
}

/// Copy every readable entry of `tree` under `dest`, keeping relative paths.
fn copy_snapshot(tree: &FileTree, dest: &Path) -> Result<(), QuarantineError> {
    fs::create_dir_all(dest).map_err(persistence("create hold dir"))?;
    for entry in tree.entries() {
        if matches!(entry.content, FileContent::Unreadable(_)) {
            continue;
        }
        let source = if tree.is_single_file() {
            tree.root().to_path_buf()
        } else {
            entry.rel_path.split('/').fold(tree.root().to_path_buf(), |p, part| p.join(part))
        };
        let target = entry.rel_path.split('/').fold(dest.to_path_buf(), |p, part| p.join(part));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(persistence("create hold dir"))?;
        }
        fs::copy(&source, &target)
            .map_err(|e| QuarantineError::Persistence(format!("hold {}: {}", entry.rel_path, e)))?;
    }
    Ok(())
}

/// Verdict of a completed scan whose record is still undecided.
fn undecided_verdict(state: &StoreState, id: &str) -> Result<Verdict, QuarantineError> {
    let scan = state
        .scans
        .get(id)
        .ok_or_else(|| QuarantineError::NotFound(id.to_string()))?;
    let record = state
        .records
        .get(id)
        .ok_or_else(|| QuarantineError::NotQuarantined(id.to_string()))?;
    if record.decision != Decision::Undecided {
        return Err(QuarantineError::AlreadyDecided(id.to_string()));
    }
    Ok(scan.verdict)
}

fn check_actor(actor: &Actor) -> Result<(), QuarantineError> {
    if actor.name().trim().is_empty() {
        return Err(QuarantineError::InvalidActor);
    }
    Ok(())
}

fn decide(
    state: &mut StoreState,
    id: &str,
    decision: Decision,
    actor: &Actor,
    rationale: Option<String>,
    at: DateTime<Utc>,
) -> Result<QuarantineRecord, QuarantineError> {
    let record = state
        .records
        .get_mut(id)
        .ok_or_else(|| QuarantineError::NotQuarantined(id.to_string()))?;
    record.decision = decision;
    record.decided_by = Some(actor.label());
    record.decided_at = Some(at);
    record.rationale = rationale;
    Ok(record.clone())
}

fn read_index(path: &Path) -> Result<Option<StoreState>, QuarantineError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(persistence("read index"))?;
    let index: IndexFile = serde_json::from_str(&raw).map_err(persistence("parse index"))?;
    if index.version != INDEX_VERSION {
        return Err(QuarantineError::Persistence(format!(
            "unsupported index version {} (expected {})",
            index.version, INDEX_VERSION
        )));
    }
    Ok(Some(index.state))
}

/// Write to a temp file in the same directory, then rename over the index.
fn write_index(path: &Path, state: &StoreState) -> Result<(), QuarantineError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let index = IndexFile {
        version: INDEX_VERSION,
        state: state.clone(),
    };
    let body = serde_json::to_vec_pretty(&index).map_err(persistence("serialize index"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persistence("create temp index"))?;
    tmp.write_all(&body).map_err(persistence("write temp index"))?;
    tmp.as_file().sync_all().map_err(persistence("sync temp index"))?;
    tmp.persist(path).map_err(persistence("replace index"))?;
    Ok(())
}
