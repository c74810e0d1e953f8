//! CLI commands. Each returns the process exit code on success; errors map to
//! [`EXIT_ERROR`] in `main`.
//!
//!   scan        scan, score, quarantine, report
//!   quarantine  list / approve / reject
//!   cache       clear-cache
//!   fetch       fetch-signatures (feature `remote`)
//!   diff        compare two JSON reports
//!   phases      phase table with signature counts

pub mod cache;
pub mod diff;
pub mod fetch;
pub mod phases;
pub mod quarantine;
pub mod scan;

use std::path::Path;

use anyhow::{Context, Result};
use sigil_core::config::PathsConfig;
use sigil_engine::{Catalog, CatalogSource, QuarantineStore};

pub const EXIT_OK: i32 = 0;
/// Score at or above the caller's threshold.
pub const EXIT_THRESHOLD: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Builtin signatures, then the signature file (flag, or the configured one
/// if it exists), then the rules overlay (flag or SIGIL_RULES).
pub fn load_catalog(paths: &PathsConfig, signatures: Option<&Path>, rules: Option<&Path>) -> Result<Catalog> {
    let mut sources = vec![CatalogSource::Builtin];
    match signatures {
        Some(path) => sources.push(CatalogSource::JsonFile(path.to_path_buf())),
        None if paths.signatures_path.is_file() => {
            sources.push(CatalogSource::JsonFile(paths.signatures_path.clone()))
        }
        None => {}
    }
    if let Some(path) = rules.map(Path::to_path_buf).or_else(|| paths.rules_path.clone()) {
        sources.push(CatalogSource::RulesYaml(path));
    }
    let catalog = Catalog::load(&sources).context("Failed to load signature catalog")?;
    tracing::debug!(signatures = catalog.len(), digest = catalog.digest(), "catalog loaded");
    Ok(catalog)
}

pub fn open_store(paths: &PathsConfig) -> Result<QuarantineStore> {
    QuarantineStore::open(paths.quarantine_dir.clone())
        .with_context(|| format!("Failed to open quarantine store at {}", paths.quarantine_dir.display()))
}
