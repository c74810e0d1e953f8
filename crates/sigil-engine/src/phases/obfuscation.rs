//! Obfuscation: encoded payloads, char-code reconstruction, decode-and-exec
//! chains, and high-entropy blobs.

use std::collections::HashMap;

use super::{PhaseDetector, Probe, ProbeFn, ProbeHit};
use crate::tree::TreeEntry;
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::Obfuscation,
    probes: &[Probe {
        name: "high-entropy-line",
        run: ProbeFn::File(high_entropy_line),
    }],
};

/// Shortest unbroken token considered for the entropy check.
const MIN_TOKEN_CHARS: usize = 80;
/// Bits per character above which a token is treated as encoded data.
const ENTROPY_THRESHOLD: f64 = 4.5;

/// Lock files and source maps carry integrity hashes and mappings by design.
fn is_exempt(entry: &TreeEntry) -> bool {
    let name = entry.file_name();
    name.ends_with(".lock")
        || name.ends_with("-lock.json")
        || name.ends_with("-lock.yaml")
        || name.ends_with(".map")
        || name == "go.sum"
}

/// Shannon entropy of `s` in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// One hit per line holding a long whitespace-free token with high entropy.
fn high_entropy_line(entry: &TreeEntry) -> Vec<ProbeHit> {
    let Some(text) = entry.text_content() else {
        return Vec::new();
    };
    if is_exempt(entry) {
        return Vec::new();
    }
    text.split('\n')
        .enumerate()
        .filter_map(|(idx, line)| {
            let token = line
                .split_whitespace()
                .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
                .find(|t| shannon_entropy(t) >= ENTROPY_THRESHOLD)?;
            Some(ProbeHit::at(&entry.rel_path, Some(idx + 1), token))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{rule_ids, run_builtin};
    use super::*;

    const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    #[test]
    fn test_entropy_bounds() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy(&"a".repeat(100)), 0.0);
        assert!((shannon_entropy(&ALPHABET.repeat(2)) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_encoded_blob_flagged() {
        let src = format!("x = 1\npayload = \"{}\"\n", ALPHABET.repeat(2));
        let hits = high_entropy_line(&TreeEntry::text("a.py", &src));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_number, Some(2));
    }

    #[test]
    fn test_low_entropy_and_lockfiles_ignored() {
        let long_dashes = format!("# {}\n", "-=".repeat(60));
        assert!(high_entropy_line(&TreeEntry::text("a.py", &long_dashes)).is_empty());
        let lock = format!("integrity sha512-{}\n", ALPHABET.repeat(2));
        assert!(high_entropy_line(&TreeEntry::text("yarn.lock", &lock)).is_empty());
    }

    #[test]
    fn test_decode_and_exec() {
        let src = "import base64\nexec(base64.b64decode(blob))\n";
        let findings = run_builtin(Phase::Obfuscation, vec![TreeEntry::text("stage.py", src)]);
        assert_eq!(rule_ids(&findings), vec!["OBFUSC-001", "OBFUSC-012"]);
        assert!(findings.iter().all(|f| f.line_number == Some(2)));
    }
}
