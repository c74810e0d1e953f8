//! `sigil clear-cache`

use anyhow::{Context, Result};
use sigil_core::config::PathsConfig;
use sigil_core::scan_cache;

use super::EXIT_OK;

pub fn clear() -> Result<i32> {
    let paths = PathsConfig::from_env();
    let removed = scan_cache::clear_cache(&paths.cache_dir)
        .with_context(|| format!("Failed to clear cache at {}", paths.cache_dir.display()))?;
    println!("Removed {} cached scan result(s) from {}", removed, paths.cache_dir.display());
    Ok(EXIT_OK)
}
