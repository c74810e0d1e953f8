//! Install-time hooks: setup.py cmdclass, npm lifecycle scripts, Makefile
//! install targets, `.pth` files.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{line_of, PhaseDetector, Probe, ProbeFn, ProbeHit};
use crate::tree::TreeEntry;
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::InstallHooks,
    probes: &[Probe {
        name: "npm-lifecycle-exec",
        run: ProbeFn::File(npm_lifecycle_exec),
    }],
};

/// Scripts npm runs without being asked.
const LIFECYCLE_SCRIPTS: &[&str] = &["preinstall", "install", "postinstall", "prepare", "prepublish"];

fn download_or_exec() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:curl|wget|Invoke-WebRequest|iwr|powershell|pwsh)\b|\bnode\s+-e\b|\bpython[0-9.]*\s+-c\b|\b(?:sh|bash|zsh)\s+-c\b|\|\s*(?:sh|bash|zsh|node)\b",
        )
        .expect("lifecycle regex is valid")
    })
}

/// Flags lifecycle scripts in `package.json` that download or execute code.
fn npm_lifecycle_exec(entry: &TreeEntry) -> Vec<ProbeHit> {
    if entry.file_name() != "package.json" {
        return Vec::new();
    }
    let Some(text) = entry.text_content() else {
        return Vec::new();
    };
    let Ok(manifest) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    let Some(scripts) = manifest.get("scripts").and_then(Value::as_object) else {
        return Vec::new();
    };

    LIFECYCLE_SCRIPTS
        .iter()
        .filter_map(|&name| {
            let command = scripts.get(name)?.as_str()?;
            if !download_or_exec().is_match(command) {
                return None;
            }
            let line = line_of(text, &format!("\"{}\"", name));
            Some(ProbeHit::at(
                &entry.rel_path,
                line,
                format!("\"{}\": \"{}\"", name, command),
            ))
        })
        .collect()
}
