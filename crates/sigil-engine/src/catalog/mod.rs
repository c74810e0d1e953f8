//! Signature catalog: loading, validation and matching.
//!
//! A `Catalog` is built once from an ordered list of sources and is read-only
//! afterwards, so phase detectors share it across threads without locking.
//! Catalogs are passed explicitly; there is no process-wide instance.

pub mod builtin;
pub mod signature;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CatalogError;
use crate::tree::TreeEntry;
use crate::types::Phase;
pub use signature::{FalsePositiveLikelihood, Scope, Signature};

/// Matched snippets are cut to this many characters.
pub const MAX_SNIPPET_CHARS: usize = 200;

/// Where signatures come from. Applied in order by [`Catalog::load`].
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// The compiled-in default set.
    Builtin,
    /// A signature file: `{version, last_updated, signatures: [...]}` or a bare array.
    JsonFile(PathBuf),
    /// Same as `JsonFile`, already in memory (e.g. fetched from the remote feed).
    JsonText { origin: String, text: String },
    /// YAML overlay with `use_default_rules`, `disabled_rules` and extra `rules`.
    RulesYaml(PathBuf),
}

/// YAML overlay file.
///
/// ```yaml
/// use_default_rules: true
/// disabled_rules:
///   - CODE-005
/// rules:
///   - id: custom-001
///     category: code_patterns
///     phase: code-patterns
///     severity: high
///     pattern: "dangerous_function\\s*\\("
///     description: "Custom dangerous function"
///     language: ["python"]
/// ```
#[derive(Debug, Deserialize)]
pub struct RulesOverlay {
    #[serde(default)]
    pub rules: Vec<Value>,
    #[serde(default)]
    pub disabled_rules: Vec<String>,
    #[serde(default = "default_use_defaults")]
    pub use_default_rules: bool,
}

fn default_use_defaults() -> bool {
    true
}

impl RulesOverlay {
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|e| CatalogError::Yaml {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Probe,
}

/// A validated signature with its compiled matcher.
#[derive(Debug, Clone)]
pub struct CompiledSignature {
    pub signature: Signature,
    matcher: Matcher,
}

impl CompiledSignature {
    fn is_match(&self, haystack: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(haystack),
            Matcher::Probe => false,
        }
    }
}

/// One signature hit inside one file.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit<'c> {
    pub signature: &'c Signature,
    pub line_number: Option<usize>,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    signatures: Vec<CompiledSignature>,
    by_phase: BTreeMap<Phase, Vec<usize>>,
    version: Option<String>,
    digest: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Origin {
    Builtin,
    External,
}

impl Catalog {
    /// Build a catalog from sources. Any invalid entry or duplicate id fails the
    /// whole load.
    pub fn load(sources: &[CatalogSource]) -> Result<Self, CatalogError> {
        let mut acc: Vec<(Signature, Origin)> = Vec::new();
        let mut version = None;

        for source in sources {
            match source {
                CatalogSource::Builtin => {
                    acc.extend(builtin::builtin_signatures().into_iter().map(|s| (s, Origin::Builtin)));
                }
                CatalogSource::JsonFile(path) => {
                    let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    let (sigs, v) = parse_document(&text, path)?;
                    acc.extend(sigs.into_iter().map(|s| (s, Origin::External)));
                    version = v.or(version);
                }
                CatalogSource::JsonText { origin, text } => {
                    let (sigs, v) = parse_document(text, Path::new(origin))?;
                    acc.extend(sigs.into_iter().map(|s| (s, Origin::External)));
                    version = v.or(version);
                }
                CatalogSource::RulesYaml(path) => {
                    let overlay = RulesOverlay::load_from_file(path)?;
                    apply_overlay(&mut acc, overlay)?;
                }
            }
        }

        let catalog = Self::from_signatures(acc.into_iter().map(|(s, _)| s).collect(), version)?;
        tracing::debug!(
            "catalog loaded: {} signatures, digest {}",
            catalog.len(),
            &catalog.digest[..12]
        );
        Ok(catalog)
    }

    /// The compiled-in default set only.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::load(&[CatalogSource::Builtin])
    }

    /// Validate and compile an explicit signature list.
    pub fn from_signatures(signatures: Vec<Signature>, version: Option<String>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(signatures.len());
        let mut by_phase: BTreeMap<Phase, Vec<usize>> = BTreeMap::new();
        let mut hasher = Sha256::new();

        for sig in signatures {
            if !seen.insert(sig.id.clone()) {
                return Err(CatalogError::DuplicateId(sig.id));
            }
            if !(0.0..=signature::MAX_WEIGHT).contains(&sig.weight) {
                return Err(CatalogError::Schema {
                    id: sig.id.clone(),
                    reason: format!("weight {} outside 0-{}", sig.weight, signature::MAX_WEIGHT),
                });
            }
            let matcher = match sig.scope {
                Scope::Content | Scope::Path => {
                    let re = Regex::new(&sig.pattern).map_err(|e| CatalogError::InvalidPattern {
                        id: sig.id.clone(),
                        reason: e.to_string(),
                    })?;
                    Matcher::Regex(re)
                }
                Scope::Probe => {
                    match crate::phases::probe_owner(&sig.pattern) {
                        None => {
                            return Err(CatalogError::UnknownProbe {
                                id: sig.id.clone(),
                                probe: sig.pattern.clone(),
                            })
                        }
                        Some(owner) if owner != sig.phase => {
                            return Err(CatalogError::Schema {
                                id: sig.id.clone(),
                                reason: format!(
                                    "probe '{}' belongs to the {} phase, not {}",
                                    sig.pattern, owner, sig.phase
                                ),
                            })
                        }
                        Some(_) => Matcher::Probe,
                    }
                }
            };
            hasher.update(serde_json::to_vec(&sig).unwrap_or_default());
            by_phase.entry(sig.phase).or_default().push(compiled.len());
            compiled.push(CompiledSignature {
                signature: sig,
                matcher,
            });
        }

        Ok(Self {
            signatures: compiled,
            by_phase,
            version,
            digest: hex::encode(hasher.finalize()),
        })
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Version string from the signature file, if one was loaded.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// SHA256 over every signature in load order.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn get(&self, id: &str) -> Option<&Signature> {
        self.signatures
            .iter()
            .find(|c| c.signature.id == id)
            .map(|c| &c.signature)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter().map(|c| &c.signature)
    }

    /// Signatures bound to `phase`, in load order.
    pub fn for_phase(&self, phase: Phase) -> impl Iterator<Item = &CompiledSignature> {
        self.by_phase
            .get(&phase)
            .into_iter()
            .flatten()
            .map(move |&i| &self.signatures[i])
    }

    pub fn phase_count(&self, phase: Phase) -> usize {
        self.by_phase.get(&phase).map_or(0, Vec::len)
    }

    /// Probe signatures of `phase`.
    pub fn probes(&self, phase: Phase) -> impl Iterator<Item = &Signature> {
        self.for_phase(phase)
            .filter(|c| c.signature.scope == Scope::Probe)
            .map(|c| &c.signature)
    }

    /// Path hits for a file. At most one hit per signature.
    pub fn match_path(&self, phase: Phase, rel_path: &str, language: &str) -> Vec<MatchHit<'_>> {
        let file_name = file_name_of(rel_path);
        self.for_phase(phase)
            .filter(|c| c.signature.scope == Scope::Path && c.signature.applies_to(language, file_name))
            .filter(|c| c.is_match(rel_path))
            .map(|c| MatchHit {
                signature: &c.signature,
                line_number: None,
                snippet: truncate_snippet(rel_path),
            })
            .collect()
    }

    /// Content hits, line by line. Each distinct signature matching a line
    /// yields its own hit.
    pub fn match_content(&self, phase: Phase, rel_path: &str, language: &str, text: &str) -> Vec<MatchHit<'_>> {
        let file_name = file_name_of(rel_path);
        let applicable: Vec<&CompiledSignature> = self
            .for_phase(phase)
            .filter(|c| c.signature.scope == Scope::Content && c.signature.applies_to(language, file_name))
            .collect();
        if applicable.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for (idx, line) in text.split('\n').enumerate() {
            for compiled in &applicable {
                if compiled.is_match(line) {
                    hits.push(MatchHit {
                        signature: &compiled.signature,
                        line_number: Some(idx + 1),
                        snippet: truncate_snippet(line.trim()),
                    });
                }
            }
        }
        hits
    }

    /// Path and content hits for one tree entry. Binary or unread files only
    /// get path hits.
    pub fn matches(&self, phase: Phase, entry: &TreeEntry) -> Vec<MatchHit<'_>> {
        let mut hits = self.match_path(phase, &entry.rel_path, entry.language);
        if let Some(text) = entry.text_content() {
            hits.extend(self.match_content(phase, &entry.rel_path, entry.language, text));
        }
        hits
    }
}

fn file_name_of(rel_path: &str) -> &str {
    rel_path.rsplit('/').next().unwrap_or(rel_path)
}

/// Cut to [`MAX_SNIPPET_CHARS`] characters without splitting a code point.
pub(crate) fn truncate_snippet(s: &str) -> String {
    match s.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

fn parse_document(text: &str, origin: &Path) -> Result<(Vec<Signature>, Option<String>), CatalogError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| CatalogError::Json {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    })?;
    let (entries, version) = match &doc {
        Value::Array(items) => (items.as_slice(), None),
        Value::Object(obj) => match obj.get("signatures") {
            Some(Value::Array(items)) => (
                items.as_slice(),
                obj.get("version").and_then(Value::as_str).map(str::to_string),
            ),
            _ => {
                return Err(CatalogError::Json {
                    path: origin.to_path_buf(),
                    reason: "expected a 'signatures' array".to_string(),
                })
            }
        },
        _ => {
            return Err(CatalogError::Json {
                path: origin.to_path_buf(),
                reason: "expected an object or an array of signatures".to_string(),
            })
        }
    };
    let sigs = entries
        .iter()
        .enumerate()
        .map(|(i, v)| signature::parse_signature(v, i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((sigs, version))
}

fn apply_overlay(acc: &mut Vec<(Signature, Origin)>, overlay: RulesOverlay) -> Result<(), CatalogError> {
    if !overlay.use_default_rules {
        acc.retain(|(_, origin)| *origin != Origin::Builtin);
    }
    for id in &overlay.disabled_rules {
        let before = acc.len();
        acc.retain(|(s, _)| &s.id != id);
        if acc.len() == before {
            tracing::warn!("disabled rule '{}' is not in the catalog", id);
        }
    }
    for (i, value) in overlay.rules.iter().enumerate() {
        acc.push((signature::parse_signature(value, i)?, Origin::External));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use std::io::Write;

    #[test]
    fn test_builtin_loads_and_covers_every_phase() {
        let catalog = Catalog::builtin().unwrap();
        for phase in Phase::ALL {
            assert!(catalog.phase_count(phase) > 0, "no builtin signatures for {}", phase);
        }
        assert_eq!(catalog.digest().len(), 64);
    }

    #[test]
    fn test_duplicate_id_fails() {
        let sig = Signature::new("DUP-1", Phase::CodePatterns, Severity::Low, "x", "d");
        let err = Catalog::from_signatures(vec![sig.clone(), sig], None).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "DUP-1"));
    }

    #[test]
    fn test_invalid_regex_fails() {
        let sig = Signature::new("BAD-1", Phase::CodePatterns, Severity::Low, "(unclosed", "d");
        assert!(matches!(
            Catalog::from_signatures(vec![sig], None),
            Err(CatalogError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_probe_fails() {
        let sig = Signature::probe("P-1", Phase::Provenance, Severity::Low, "no-such-probe", "d");
        assert!(matches!(
            Catalog::from_signatures(vec![sig], None),
            Err(CatalogError::UnknownProbe { .. })
        ));
    }

    #[test]
    fn test_probe_bound_to_wrong_phase_fails() {
        let sig = Signature::probe("P-2", Phase::Credentials, Severity::Low, "large-file", "d");
        assert!(matches!(
            Catalog::from_signatures(vec![sig], None),
            Err(CatalogError::Schema { .. })
        ));
    }

    #[test]
    fn test_json_document_with_version() {
        let text = r#"{
            "version": "2024.06",
            "last_updated": "2024-06-01",
            "signatures": [{
                "id": "sig-net-100",
                "category": "network_exfil",
                "phase": "network_exfil",
                "severity": "high",
                "pattern": "evil\\.example",
                "description": "Known C2 host",
                "weight": 2.5,
                "malware_families": ["demo"]
            }]
        }"#;
        let catalog = Catalog::load(&[CatalogSource::JsonText {
            origin: "feed".into(),
            text: text.into(),
        }])
        .unwrap();
        assert_eq!(catalog.version(), Some("2024.06"));
        assert_eq!(catalog.get("sig-net-100").unwrap().weight, 2.5);
    }

    #[test]
    fn test_json_duplicate_with_builtin_fails() {
        let text = r#"[{"id": "CODE-001", "category": "c", "phase": "code-patterns",
            "severity": "low", "pattern": "x", "description": "d"}]"#;
        let err = Catalog::load(&[
            CatalogSource::Builtin,
            CatalogSource::JsonText {
                origin: "extra".into(),
                text: text.into(),
            },
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(_)));
    }

    #[test]
    fn test_malformed_entry_fails_whole_load() {
        let text = r#"[{"id": "ok-1", "category": "c", "phase": "credentials",
            "severity": "low", "pattern": "x", "description": "d"},
            {"id": "bad-1", "category": "c", "phase": "credentials",
            "severity": "low", "pattern": "x", "description": "d", "cve": "CVE-1"}]"#;
        let err = Catalog::load(&[CatalogSource::JsonText {
            origin: "f".into(),
            text: text.into(),
        }])
        .unwrap_err();
        assert!(matches!(err, CatalogError::Schema { id, .. } if id == "bad-1"));
    }

    #[test]
    fn test_rules_overlay_disables_and_adds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(
            f,
            "disabled_rules:\n  - CODE-005\nrules:\n  - id: custom-001\n    category: code\n    phase: code-patterns\n    severity: high\n    pattern: 'dangerous_function\\s*\\('\n    description: custom\n    language: [python]"
        )
        .unwrap();
        let catalog = Catalog::load(&[CatalogSource::Builtin, CatalogSource::RulesYaml(path)]).unwrap();
        assert!(catalog.get("CODE-005").is_none());
        assert!(catalog.get("custom-001").is_some());
    }

    #[test]
    fn test_overlay_without_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        fs::write(&path, "use_default_rules: false\n").unwrap();
        let catalog = Catalog::load(&[CatalogSource::Builtin, CatalogSource::RulesYaml(path)]).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_match_content_case_sensitive_per_line() {
        let catalog = Catalog::from_signatures(
            vec![
                Signature::new("A", Phase::CodePatterns, Severity::High, r"\beval\(", "eval"),
                Signature::new("B", Phase::CodePatterns, Severity::Low, r"eval", "any eval"),
            ],
            None,
        )
        .unwrap();
        let hits = catalog.match_content(Phase::CodePatterns, "a.py", "python", "x = 1\neval(y)\nEVAL(z)");
        let ids: Vec<_> = hits.iter().map(|h| (h.signature.id.as_str(), h.line_number)).collect();
        assert_eq!(ids, vec![("A", Some(2)), ("B", Some(2))]);
    }

    #[test]
    fn test_match_respects_language() {
        let catalog = Catalog::from_signatures(
            vec![Signature::new("PY", Phase::CodePatterns, Severity::High, r"exec\(", "exec").for_languages(&["python"])],
            None,
        )
        .unwrap();
        assert!(catalog.match_content(Phase::CodePatterns, "a.js", "javascript", "exec(x)").is_empty());
        assert_eq!(catalog.match_content(Phase::CodePatterns, "a.py", "python", "exec(x)").len(), 1);
    }

    #[test]
    fn test_truncate_snippet_char_boundary() {
        let s = "é".repeat(300);
        let cut = truncate_snippet(&s);
        assert_eq!(cut.chars().count(), MAX_SNIPPET_CHARS);
    }
}
