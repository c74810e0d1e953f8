//! One scan, end to end: register it, snapshot the tree, run the phases,
//! score, complete the quarantine record and build the report.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sigil_core::config::DEFAULT_MAX_FILE_BYTES;
use sigil_core::scan_cache;

use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::error::ScanError;
use crate::quarantine::{FailureCause, QuarantineStore};
use crate::report::{Report, ENGINE_VERSION};
use crate::runner::{self, RunOutcome};
use crate::scoring::{self, Verdict};
use crate::tree::{FileTree, TreeOptions};
use crate::types::{Phase, Target};

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: Target,
    /// `None` runs every phase.
    pub phases: Option<Vec<Phase>>,
    pub exclude_globs: Vec<String>,
    pub timeout: Option<Duration>,
    pub max_file_bytes: u64,
    /// Where to cache run outcomes; `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
}

impl ScanRequest {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            phases: None,
            exclude_globs: Vec::new(),
            timeout: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            cache_dir: None,
        }
    }

    pub fn phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = Some(phases);
        self
    }

    pub fn exclude(mut self, globs: Vec<String>) -> Self {
        self.exclude_globs = globs;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    pub fn cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    fn enabled_phases(&self) -> Vec<Phase> {
        let mut phases = self.phases.clone().unwrap_or_else(|| Phase::ALL.to_vec());
        phases.sort();
        phases.dedup();
        phases
    }

    /// Filtered or excluded scans bypass the cache.
    fn cacheable(&self) -> Option<&PathBuf> {
        let full = self.enabled_phases().len() == Phase::ALL.len();
        self.cache_dir
            .as_ref()
            .filter(|_| full && self.exclude_globs.is_empty())
    }
}

/// Run a scan. Target and timeout failures produce a `failed` report; only
/// store misuse, catalog problems and bad exclude globs are errors.
pub fn scan(request: &ScanRequest, catalog: &Catalog, store: &QuarantineStore) -> Result<Report, ScanError> {
    let started = Instant::now();
    let phases = request.enabled_phases();
    let scan = store.create(&request.target)?;
    let scan_id = scan.id.clone();
    store.begin(&scan_id)?;
    tracing::debug!(scan_id = %scan_id, target = %request.target.identity, "scan started");

    let cancel = request
        .timeout
        .map(CancelToken::with_timeout)
        .unwrap_or_default();

    let options = TreeOptions {
        exclude_globs: request.exclude_globs.clone(),
        max_file_bytes: request.max_file_bytes,
    };
    let tree = match FileTree::load(&request.target.location, &options) {
        Ok(tree) => tree,
        Err(err) => return fail_scan(store, &scan_id, err, phases, started),
    };

    let cache = request.cacheable().map(|dir| (dir, cache_key(catalog, &phases, request, &tree)));
    let cached = cache
        .as_ref()
        .and_then(|(dir, key)| lookup(dir, key, &scan_id));
    let hit = cached.is_some();

    let outcome = match cached {
        Some(outcome) => outcome,
        None => match runner::run(&tree, catalog, &phases, &scan_id, &cancel) {
            Ok(outcome) => outcome,
            Err(err) => return fail_scan(store, &scan_id, err, phases, started),
        },
    };

    let (score, verdict) = scoring::score(&outcome.findings);
    if verdict != Verdict::Clean {
        if let Err(err) = store.hold(&scan_id, &tree) {
            return fail_scan(store, &scan_id, err.into(), phases, started);
        }
    }
    let finished = store.finish(&scan_id, outcome.findings.clone(), score, verdict)?;
    let mut report = Report::completed(&finished, &outcome, started.elapsed().as_millis() as u64);
    report.cached = hit;

    if let (Some((dir, key)), false) = (&cache, hit) {
        if let Err(e) = scan_cache::put_cached(dir, key, &outcome) {
            tracing::warn!("failed to write scan cache: {:#}", e);
        }
    }

    tracing::info!(
        scan_id = %scan_id,
        score,
        verdict = %verdict,
        findings = report.findings.len(),
        cached = hit,
        "scan finished"
    );
    Ok(report)
}

fn fail_scan(
    store: &QuarantineStore,
    scan_id: &str,
    err: ScanError,
    phases: Vec<Phase>,
    started: Instant,
) -> Result<Report, ScanError> {
    let cause = FailureCause::from_scan_error(&err);
    tracing::warn!(scan_id, "scan failed: {}", cause);
    let failed = store.fail(scan_id, cause)?;
    match err {
        ScanError::TargetUnreadable { .. } | ScanError::Timeout { .. } => {
            Ok(Report::failed(&failed, phases, started.elapsed().as_millis() as u64))
        }
        other => Err(other),
    }
}

/// Keyed on the canonical target location and every entry's content digest,
/// so same-shape trees never share an outcome.
fn cache_key(catalog: &Catalog, phases: &[Phase], request: &ScanRequest, tree: &FileTree) -> String {
    let location = std::fs::canonicalize(&request.target.location)
        .unwrap_or_else(|_| request.target.location.clone());
    let header = [
        "sigil-scan".to_string(),
        location.display().to_string(),
        ENGINE_VERSION.to_string(),
        catalog.digest().to_string(),
        phases.iter().map(|p| p.slug()).collect::<Vec<_>>().join(","),
        request.max_file_bytes.to_string(),
    ];
    scan_cache::cache_key(header.into_iter().chain(tree.listing()))
}

/// Cached outcome re-stamped with the current scan id.
fn lookup(dir: &Path, key: &str, scan_id: &str) -> Option<RunOutcome> {
    match scan_cache::get_cached::<RunOutcome>(dir, key) {
        Ok(Some(mut outcome)) => {
            for finding in &mut outcome.findings {
                finding.scan_id = scan_id.to_string();
            }
            tracing::debug!(scan_id, "scan cache hit");
            Some(outcome)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("scan cache lookup failed: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quarantine::ScanStatus;
    use std::fs;

    #[test]
    fn test_cache_hit_is_restamped() {
        let target = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::write(target.path().join("a.py"), "eval(x)\n").unwrap();
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");
        let request = ScanRequest::new(Target::local(target.path())).cache_dir(cache.path().to_path_buf());

        let first = scan(&request, &catalog, &store).unwrap();
        let second = scan(&request, &catalog, &store).unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_ne!(first.scan_id, second.scan_id);
        assert_eq!(first.score, second.score);
        assert!(second.findings.iter().all(|f| f.scan_id == second.scan_id));
        assert_eq!(store.get(&second.scan_id).unwrap().unwrap().status, ScanStatus::Completed);
    }

    fn pin_mtime(path: &Path) {
        let pinned = std::time::UNIX_EPOCH + Duration::from_secs(499_162_500);
        fs::File::options().write(true).open(path).unwrap().set_modified(pinned).unwrap();
    }

    #[test]
    fn test_same_shape_rewrite_misses_cache() {
        let target = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let file = target.path().join("a.py");
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");
        let request = ScanRequest::new(Target::local(target.path())).cache_dir(cache.path().to_path_buf());

        fs::write(&file, "print()\n").unwrap();
        pin_mtime(&file);
        let benign = scan(&request, &catalog, &store).unwrap();

        // Same name, size and mtime; different bytes.
        fs::write(&file, "eval(x)\n").unwrap();
        pin_mtime(&file);
        let evil = scan(&request, &catalog, &store).unwrap();

        assert!(!evil.cached);
        assert!(evil.findings.iter().any(|f| f.rule_id == "CODE-001"));
        assert!(!benign.findings.iter().any(|f| f.rule_id == "CODE-001"));
    }

    #[test]
    fn test_same_shape_trees_do_not_share_cache() {
        let benign = tempfile::tempdir().unwrap();
        let evil = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::write(benign.path().join("a.py"), "print()\n").unwrap();
        fs::write(evil.path().join("a.py"), "eval(x)\n").unwrap();
        pin_mtime(&benign.path().join("a.py"));
        pin_mtime(&evil.path().join("a.py"));
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");

        let first = scan(
            &ScanRequest::new(Target::local(benign.path())).cache_dir(cache.path().to_path_buf()),
            &catalog,
            &store,
        )
        .unwrap();
        let second = scan(
            &ScanRequest::new(Target::local(evil.path())).cache_dir(cache.path().to_path_buf()),
            &catalog,
            &store,
        )
        .unwrap();
        assert!(!first.cached);
        assert!(!second.cached);
        assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_filtered_scans_skip_cache() {
        let target = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        fs::write(target.path().join("a.py"), "eval(x)\n").unwrap();
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");
        let request = ScanRequest::new(Target::local(target.path()))
            .cache_dir(cache.path().to_path_buf())
            .phases(vec![Phase::CodePatterns]);
        scan(&request, &catalog, &store).unwrap();
        assert!(!scan(&request, &catalog, &store).unwrap().cached);
        assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_exclude_is_an_error() {
        let target = tempfile::tempdir().unwrap();
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");
        let request = ScanRequest::new(Target::local(target.path())).exclude(vec!["a{".to_string()]);
        let err = scan(&request, &catalog, &store).unwrap_err();
        assert!(matches!(err, ScanError::InvalidExclude { .. }));
    }

    #[test]
    fn test_unreadable_target_fails_with_cause() {
        let catalog = Catalog::builtin().unwrap();
        let store = QuarantineStore::in_memory("/q");
        let request = ScanRequest::new(Target::local("/definitely/not/here"));
        let report = scan(&request, &catalog, &store).unwrap();
        assert!(report.is_failed());
        assert_eq!(report.verdict, None);
        assert_eq!(report.score, None);
        assert!(report.failure.unwrap().to_string().starts_with("Target unreadable:"));
    }
}
