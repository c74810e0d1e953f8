//! Provenance: where the tree came from and what it carries that source
//! review would miss. Hidden files, compiled artifacts, binary content behind
//! source extensions, unreadable or oversized files, and git history shape.

use super::{PhaseDetector, Probe, ProbeFn, ProbeHit};
use crate::tree::{FileContent, FileTree, TreeEntry};
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::Provenance,
    probes: &[
        Probe {
            name: "hidden-file",
            run: ProbeFn::File(hidden_file),
        },
        Probe {
            name: "binary-artifact",
            run: ProbeFn::File(binary_artifact),
        },
        Probe {
            name: "binary-content",
            run: ProbeFn::File(binary_content),
        },
        Probe {
            name: "unreadable-file",
            run: ProbeFn::File(unreadable_file),
        },
        Probe {
            name: "large-file",
            run: ProbeFn::File(large_file),
        },
        Probe {
            name: "shallow-history",
            run: ProbeFn::Tree(shallow_history),
        },
        Probe {
            name: "missing-history",
            run: ProbeFn::Tree(missing_history),
        },
        Probe {
            name: "single-author",
            run: ProbeFn::Tree(single_author),
        },
    ],
};

/// Dotfiles and dot-directories that are routine in source repositories.
const HIDDEN_ALLOWLIST: &[&str] = &[
    ".gitignore",
    ".gitattributes",
    ".gitkeep",
    ".gitmodules",
    ".github",
    ".gitlab-ci.yml",
    ".editorconfig",
    ".npmignore",
    ".dockerignore",
    ".prettierrc",
    ".prettierignore",
    ".eslintrc",
    ".eslintrc.json",
    ".eslintrc.js",
    ".eslintignore",
    ".nvmrc",
    ".python-version",
    ".pre-commit-config.yaml",
    ".flake8",
    ".clang-format",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "pyc", "pyo", "class", "jar", "o", "a", "node", "wasm",
];

/// Build output directories where compiled artifacts are expected.
const BUILD_DIRS: &[&str] = &["bin", "dist", "build", "target"];

/// Files that make a tree a publishable package.
const MANIFESTS: &[&str] = &["package.json", "setup.py", "pyproject.toml", "setup.cfg"];

pub const LARGE_FILE_BYTES: u64 = 5 * 1024 * 1024;

fn hidden_file(entry: &TreeEntry) -> Vec<ProbeHit> {
    let first_hidden = entry
        .rel_path
        .split('/')
        .find(|c| c.starts_with('.') && *c != "." && *c != "..");
    match first_hidden {
        Some(component) if !HIDDEN_ALLOWLIST.contains(&component) => {
            vec![ProbeHit::at(&entry.rel_path, None, entry.rel_path.as_str())]
        }
        _ => Vec::new(),
    }
}

fn binary_artifact(entry: &TreeEntry) -> Vec<ProbeHit> {
    let Some(ext) = entry.extension() else {
        return Vec::new();
    };
    if !BINARY_EXTENSIONS.contains(&ext.as_str()) {
        return Vec::new();
    }
    let mut dirs = entry.rel_path.split('/').rev().skip(1);
    if dirs.any(|d| BUILD_DIRS.contains(&d)) {
        return Vec::new();
    }
    vec![ProbeHit::at(&entry.rel_path, None, entry.rel_path.as_str())]
}

/// Binary bytes in a file whose name says it is source or has no extension.
fn binary_content(entry: &TreeEntry) -> Vec<ProbeHit> {
    if entry.content != FileContent::Binary {
        return Vec::new();
    }
    if entry.language != "unknown" || entry.extension().is_none() {
        return vec![ProbeHit::at(
            &entry.rel_path,
            None,
            format!("{} ({} bytes, binary)", entry.rel_path, entry.size),
        )];
    }
    Vec::new()
}

fn unreadable_file(entry: &TreeEntry) -> Vec<ProbeHit> {
    match &entry.content {
        FileContent::Unreadable(reason) => vec![ProbeHit::at(&entry.rel_path, None, reason.as_str())],
        _ => Vec::new(),
    }
}

fn large_file(entry: &TreeEntry) -> Vec<ProbeHit> {
    if entry.size >= LARGE_FILE_BYTES || entry.content == FileContent::Oversized {
        return vec![ProbeHit::at(
            &entry.rel_path,
            None,
            format!("{} bytes", entry.size),
        )];
    }
    Vec::new()
}

fn shallow_history(tree: &FileTree) -> Vec<ProbeHit> {
    match tree.git() {
        Some(git) if git.shallow => vec![ProbeHit::at(".git/shallow", None, "shallow clone")],
        _ => Vec::new(),
    }
}

fn missing_history(tree: &FileTree) -> Vec<ProbeHit> {
    if tree.git().is_some() || tree.is_single_file() {
        return Vec::new();
    }
    tree.entries()
        .iter()
        .find(|e| !e.rel_path.contains('/') && MANIFESTS.contains(&e.rel_path.as_str()))
        .map(|manifest| {
            vec![ProbeHit::at(
                &manifest.rel_path,
                None,
                format!("{} present, no .git directory", manifest.rel_path),
            )]
        })
        .unwrap_or_default()
}

fn single_author(tree: &FileTree) -> Vec<ProbeHit> {
    match tree.git() {
        Some(git) if git.has_reflog && git.authors.len() == 1 && (1..=2).contains(&git.commits) => {
            let author = git.authors.iter().next().map(String::as_str).unwrap_or("");
            vec![ProbeHit::at(
                ".git",
                None,
                format!("1 author ({}), {} commit(s)", author, git.commits),
            )]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{rule_ids, run_builtin, run_tree};
    use super::*;
    use crate::tree::GitHistory;

    #[test]
    fn test_hidden_files() {
        assert_eq!(hidden_file(&TreeEntry::text(".env.local", "A=1")).len(), 1);
        assert_eq!(hidden_file(&TreeEntry::text("lib/.cache/x.py", "")).len(), 1);
        assert!(hidden_file(&TreeEntry::text(".gitignore", "target")).is_empty());
        assert!(hidden_file(&TreeEntry::text(".github/workflows/ci.yml", "")).is_empty());
        assert!(hidden_file(&TreeEntry::text("src/main.py", "")).is_empty());
    }

    #[test]
    fn test_binary_artifacts_outside_build_dirs() {
        let blob = |p: &str| TreeEntry::with_content(p, 4, FileContent::Binary);
        assert_eq!(binary_artifact(&blob("lib/helper.so")).len(), 1);
        assert!(binary_artifact(&blob("dist/helper.so")).is_empty());
        assert!(binary_artifact(&blob("logo.png")).is_empty());
    }

    #[test]
    fn test_binary_content_behind_source_extension() {
        assert_eq!(binary_content(&TreeEntry::with_content("setup.py", 9, FileContent::Binary)).len(), 1);
        assert_eq!(binary_content(&TreeEntry::with_content("runme", 9, FileContent::Binary)).len(), 1);
        assert!(binary_content(&TreeEntry::with_content("logo.png", 9, FileContent::Binary)).is_empty());
        assert!(binary_content(&TreeEntry::text("setup.py", "x")).is_empty());
    }

    #[test]
    fn test_unreadable_and_large() {
        let unreadable = TreeEntry::with_content("a.py", 0, FileContent::Unreadable("denied".into()));
        assert_eq!(unreadable_file(&unreadable)[0].snippet, "denied");
        let big = TreeEntry::with_content("data.csv", LARGE_FILE_BYTES, FileContent::Oversized);
        assert_eq!(large_file(&big).len(), 1);
        assert!(large_file(&TreeEntry::text("a.py", "x")).is_empty());
    }

    #[test]
    fn test_history_probes() {
        let manifest = || vec![TreeEntry::text("package.json", "{}")];
        let no_git = run_tree(Phase::Provenance, FileTree::from_entries("/v", manifest(), None));
        assert_eq!(rule_ids(&no_git), vec!["PROV-007"]);

        let git = GitHistory {
            shallow: true,
            authors: ["dev@example.com".to_string()].into_iter().collect(),
            commits: 1,
            has_reflog: true,
        };
        let with_git = run_tree(Phase::Provenance, FileTree::from_entries("/v", manifest(), Some(git)));
        assert_eq!(rule_ids(&with_git), vec!["PROV-006", "PROV-008"]);
    }

    #[test]
    fn test_suspicious_name_and_minified() {
        let findings = run_builtin(
            Phase::Provenance,
            vec![
                TreeEntry::text("tools/reverse_shell.py", "print(1)"),
                TreeEntry::text("web/app.min.js", "x"),
            ],
        );
        assert_eq!(rule_ids(&findings), vec!["PROV-009", "PROV-010"]);
    }
}
