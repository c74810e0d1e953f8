//! Read-only snapshot of a materialized scan target.
//!
//! The snapshot is taken once per scan; every phase reads the same entries in
//! the same order, which keeps findings stable regardless of phase scheduling.

use ignore::overrides::{Override, OverrideBuilder};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::error::ScanError;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
];

/// Bytes inspected for NUL when classifying binary files.
const BINARY_SNIFF_BYTES: usize = 8192;

/// Content of one file as seen by detectors.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    /// Newline-normalised text. Invalid UTF-8 sequences are replaced.
    Text(String),
    Binary,
    /// Larger than the configured limit; not read.
    Oversized,
    /// I/O failed; the reason is kept for the provenance finding.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    /// `/`-separated path relative to the tree root.
    pub rel_path: String,
    pub language: &'static str,
    pub size: u64,
    /// Modification time in seconds since the epoch, when available.
    pub modified: Option<u64>,
    pub content: FileContent,
}

impl TreeEntry {
    /// Build an in-memory text entry. Used by tests and library callers that
    /// scan content without touching disk.
    pub fn text(rel_path: &str, text: &str) -> Self {
        let normalized = normalize_newlines(text);
        Self {
            rel_path: rel_path.to_string(),
            language: detect_language(Path::new(rel_path)),
            size: normalized.len() as u64,
            modified: None,
            content: FileContent::Text(normalized),
        }
    }

    pub fn with_content(rel_path: &str, size: u64, content: FileContent) -> Self {
        Self {
            rel_path: rel_path.to_string(),
            language: detect_language(Path::new(rel_path)),
            size,
            modified: None,
            content,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            FileContent::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Hex sha256 of the text as detectors see it. Non-text entries are
    /// identified by their kind only.
    pub fn content_digest(&self) -> String {
        match &self.content {
            FileContent::Text(t) => hex::encode(Sha256::digest(t.as_bytes())),
            FileContent::Binary => "binary".to_string(),
            FileContent::Oversized => "oversized".to_string(),
            FileContent::Unreadable(_) => "unreadable".to_string(),
        }
    }

    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }

    /// Lowercased extension without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let idx = name.rfind('.')?;
        if idx == 0 || idx + 1 == name.len() {
            return None;
        }
        Some(name[idx + 1..].to_ascii_lowercase())
    }
}

/// Git metadata recovered from `.git/` without invoking git.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitHistory {
    pub shallow: bool,
    pub authors: BTreeSet<String>,
    pub commits: usize,
    /// False when `.git` exists but reflogs were not available.
    pub has_reflog: bool,
}

#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub exclude_globs: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            exclude_globs: Vec::new(),
            max_file_bytes: sigil_core::config::DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileTree {
    root: PathBuf,
    entries: Vec<TreeEntry>,
    git: Option<GitHistory>,
    single_file: bool,
}

impl FileTree {
    /// Snapshot `root`. A missing or unreadable root is `TargetUnreadable`; an
    /// empty directory is a valid empty tree.
    pub fn load(root: &Path, options: &TreeOptions) -> Result<Self, ScanError> {
        let unreadable = |reason: String| ScanError::TargetUnreadable {
            path: root.to_path_buf(),
            reason,
        };
        let meta = fs::metadata(root).map_err(|e| unreadable(e.to_string()))?;

        if meta.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| unreadable("target has no file name".to_string()))?;
            let entry = read_entry(root, name, &meta, options.max_file_bytes);
            return Ok(Self {
                root: root.to_path_buf(),
                entries: vec![entry],
                git: None,
                single_file: true,
            });
        }
        if !meta.is_dir() {
            return Err(unreadable("neither a file nor a directory".to_string()));
        }
        fs::read_dir(root).map_err(|e| unreadable(e.to_string()))?;

        let excludes = build_excludes(root, &options.exclude_globs)?;
        let mut entries = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let is_dir = e.file_type().is_dir();
                if is_dir && SKIP_DIRS.iter().any(|d| e.file_name() == *d) {
                    return false;
                }
                !excludes
                    .as_ref()
                    .is_some_and(|ov| ov.matched(e.path(), is_dir).is_ignore())
            });

        for item in walker {
            match item {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let rel = relative(root, entry.path());
                    match entry.metadata() {
                        Ok(meta) => entries.push(read_entry(entry.path(), rel, &meta, options.max_file_bytes)),
                        Err(e) => entries.push(TreeEntry::with_content(&rel, 0, FileContent::Unreadable(e.to_string()))),
                    }
                }
                Err(err) => {
                    if err.depth() == 0 {
                        return Err(unreadable(err.to_string()));
                    }
                    // An unreadable subdirectory or file is recorded and skipped.
                    let rel = err
                        .path()
                        .map(|p| relative(root, p))
                        .unwrap_or_else(|| "<unknown>".to_string());
                    tracing::debug!("walk error at {}: {}", rel, err);
                    entries.push(TreeEntry::with_content(&rel, 0, FileContent::Unreadable(err.to_string())));
                }
            }
        }

        let git = read_git_history(&root.join(".git"));
        tracing::debug!("tree snapshot: {} files under {}", entries.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            entries,
            git,
            single_file: false,
        })
    }

    /// Build a tree from prepared entries.
    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<TreeEntry>, git: Option<GitHistory>) -> Self {
        Self {
            root: root.into(),
            entries,
            git,
            single_file: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn git(&self) -> Option<&GitHistory> {
        self.git.as_ref()
    }

    /// True when the target was a single file rather than a directory.
    pub fn is_single_file(&self) -> bool {
        self.single_file
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(path, content, language-hint)` triples in enumeration order.
    pub fn triples(&self) -> impl Iterator<Item = (&str, &FileContent, &'static str)> {
        self.entries
            .iter()
            .map(|e| (e.rel_path.as_str(), &e.content, e.language))
    }

    /// Stable listing used for cache keys: `path|size|mtime|digest` per entry.
    pub fn listing(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "{}|{}|{}|{}",
                    e.rel_path,
                    e.size,
                    e.modified.unwrap_or(0),
                    e.content_digest()
                )
            })
            .collect()
    }
}

fn build_excludes(root: &Path, globs: &[String]) -> Result<Option<Override>, ScanError> {
    if globs.is_empty() {
        return Ok(None);
    }
    let mut builder = OverrideBuilder::new(root);
    for glob in globs {
        builder
            .add(&format!("!{}", glob))
            .map_err(|e| ScanError::InvalidExclude {
                glob: glob.clone(),
                reason: e.to_string(),
            })?;
    }
    builder.build().map(Some).map_err(|e| ScanError::InvalidExclude {
        glob: globs.join(","),
        reason: e.to_string(),
    })
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_entry(path: &Path, rel_path: String, meta: &fs::Metadata, max_bytes: u64) -> TreeEntry {
    let size = meta.len();
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    let content = if size > max_bytes {
        FileContent::Oversized
    } else {
        match fs::read(path) {
            Ok(bytes) => classify(&bytes),
            Err(e) => FileContent::Unreadable(e.to_string()),
        }
    };
    TreeEntry {
        language: detect_language(Path::new(&rel_path)),
        rel_path,
        size,
        modified,
        content,
    }
}

fn classify(bytes: &[u8]) -> FileContent {
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return FileContent::Binary;
    }
    FileContent::Text(normalize_newlines(&String::from_utf8_lossy(bytes)))
}

/// Unify CRLF and lone CR line endings to LF.
pub fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Language hint from the file name or extension; `"unknown"` otherwise.
pub fn detect_language(path: &Path) -> &'static str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    match name {
        "Makefile" | "makefile" | "GNUmakefile" => return "make",
        "Dockerfile" | "Containerfile" => return "docker",
        _ => {}
    }
    if name.starts_with("Dockerfile.") {
        return "docker";
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| match ext.to_ascii_lowercase().as_str() {
            "py" | "pyw" => "python",
            "pth" => "pth",
            "js" | "mjs" | "cjs" | "jsx" => "javascript",
            "ts" | "tsx" | "mts" | "cts" => "typescript",
            "sh" | "bash" | "zsh" => "shell",
            "json" | "jsonc" => "json",
            "yml" | "yaml" => "yaml",
            "toml" => "toml",
            "md" | "markdown" | "mdx" => "markdown",
            "txt" | "rst" => "text",
            "rb" => "ruby",
            "go" => "go",
            "rs" => "rust",
            "php" => "php",
            "pl" | "pm" => "perl",
            "ps1" | "psm1" => "powershell",
            "bat" | "cmd" => "batch",
            "html" | "htm" => "html",
            _ => "unknown",
        })
        .unwrap_or("unknown")
}

/// Parse `.git/shallow` and `.git/logs/HEAD`. `None` when there is no `.git`.
fn read_git_history(git_path: &Path) -> Option<GitHistory> {
    if !git_path.exists() {
        return None;
    }
    let mut history = GitHistory {
        shallow: git_path.join("shallow").is_file(),
        ..GitHistory::default()
    };
    if let Ok(log) = fs::read_to_string(git_path.join("logs").join("HEAD")) {
        history.has_reflog = true;
        for line in log.lines() {
            let (meta, message) = line.split_once('\t').unwrap_or((line, ""));
            if let (Some(start), Some(end)) = (meta.find('<'), meta.find('>')) {
                if start < end {
                    history.authors.insert(meta[start + 1..end].to_string());
                }
            }
            if message.starts_with("commit") {
                history.commits += 1;
            }
        }
    }
    Some(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileTree::load(&dir.path().join("nope"), &TreeOptions::default()).unwrap_err();
        assert!(matches!(err, ScanError::TargetUnreadable { .. }));
    }

    #[test]
    fn test_empty_dir_is_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let tree = FileTree::load(dir.path(), &TreeOptions::default()).unwrap();
        assert!(tree.is_empty());
        assert!(tree.git().is_none());
    }

    #[test]
    fn test_sorted_enumeration_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/x")).unwrap();
        fs::write(dir.path().join("src/b.py"), "b").unwrap();
        fs::write(dir.path().join("src/a.py"), "a").unwrap();
        fs::write(dir.path().join("README.md"), "r").unwrap();
        fs::write(dir.path().join("node_modules/x/index.js"), "x").unwrap();
        let tree = FileTree::load(dir.path(), &TreeOptions::default()).unwrap();
        let paths: Vec<_> = tree.entries().iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/a.py", "src/b.py"]);
        assert_eq!(tree.entries()[1].language, "python");
    }

    #[test]
    fn test_exclude_globs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/t.py"), "t").unwrap();
        fs::write(dir.path().join("main.py"), "m").unwrap();
        fs::write(dir.path().join("notes.log"), "n").unwrap();
        let options = TreeOptions {
            exclude_globs: vec!["tests/**".into(), "*.log".into()],
            ..TreeOptions::default()
        };
        let tree = FileTree::load(dir.path(), &options).unwrap();
        let paths: Vec<_> = tree.entries().iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["main.py"]);
    }

    #[test]
    fn test_binary_and_oversized_classification() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.py"), [0x7fu8, b'E', b'L', b'F', 0, 1, 2]).unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(64)).unwrap();
        fs::write(dir.path().join("crlf.sh"), "a\r\nb\rc").unwrap();
        let options = TreeOptions {
            max_file_bytes: 32,
            ..TreeOptions::default()
        };
        let tree = FileTree::load(dir.path(), &options).unwrap();
        let by_name = |n: &str| tree.entries().iter().find(|e| e.rel_path == n).unwrap();
        assert_eq!(by_name("big.txt").content, FileContent::Oversized);
        assert_eq!(by_name("blob.py").content, FileContent::Binary);
        assert_eq!(by_name("crlf.sh").text_content(), Some("a\nb\nc"));
    }

    #[test]
    fn test_single_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("setup.py");
        fs::write(&file, "import os").unwrap();
        let tree = FileTree::load(&file, &TreeOptions::default()).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.entries()[0].rel_path, "setup.py");
    }

    #[test]
    fn test_git_history_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        fs::create_dir_all(git.join("logs")).unwrap();
        fs::write(git.join("shallow"), "abc\n").unwrap();
        fs::write(
            git.join("logs/HEAD"),
            "0000 1111 Eve <eve@example.com> 1700000000 +0000\tcommit (initial): init\n\
             1111 2222 Eve <eve@example.com> 1700000100 +0000\tcommit: more\n\
             2222 3333 Bob <bob@example.com> 1700000200 +0000\tcheckout: moving\n",
        )
        .unwrap();
        let tree = FileTree::load(dir.path(), &TreeOptions::default()).unwrap();
        let history = tree.git().unwrap();
        assert!(history.shallow);
        assert_eq!(history.commits, 2);
        assert_eq!(history.authors.len(), 2);
        assert!(tree.is_empty(), ".git internals are not tree entries");
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Path::new("Makefile")), "make");
        assert_eq!(detect_language(Path::new("a/b/index.MJS")), "javascript");
        assert_eq!(detect_language(Path::new("SKILL.md")), "markdown");
        assert_eq!(detect_language(Path::new("LICENSE")), "unknown");
    }

    #[test]
    fn test_extension() {
        let e = TreeEntry::text("lib/x.Tar.GZ", "");
        assert_eq!(e.extension().as_deref(), Some("gz"));
        assert_eq!(TreeEntry::text(".env", "").extension(), None);
    }

    #[test]
    fn test_listing_tracks_content() {
        let benign = FileTree::from_entries("/t", vec![TreeEntry::text("package.json", "{\"a\": 1}")], None);
        let evil = FileTree::from_entries("/t", vec![TreeEntry::text("package.json", "{\"b\": 2}")], None);
        assert_eq!(benign.entries()[0].size, evil.entries()[0].size);
        assert_ne!(benign.listing(), evil.listing());
        assert_eq!(
            TreeEntry::with_content("a.bin", 4, FileContent::Binary).content_digest(),
            "binary"
        );
    }
}
