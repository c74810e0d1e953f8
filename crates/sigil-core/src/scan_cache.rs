//! On-disk scan result cache.
//!
//! One JSON file per key under the cache directory. The key is a SHA256 over
//! whatever identifies a scan input (catalog digest, phase set, tree listing),
//! so a changed file or catalog simply misses.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Bump when the payload layout changes; older entries become misses.
pub const CACHE_VERSION: u32 = 1;

/// The directory is pruned to this many entries after every write.
pub const MAX_ENTRIES: usize = 100;

#[derive(Serialize, Deserialize)]
struct CachedEntry<T> {
    version: u32,
    created_at: String,
    payload: T,
}

/// Compute the cache key for a sequence of input parts.
pub fn cache_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn entry_path(cache_dir: &Path, key: &str) -> PathBuf {
    cache_dir.join(format!("{}.json", key))
}

/// Look up a cached payload. Missing, corrupt or outdated entries are `None`.
pub fn get_cached<T: DeserializeOwned>(cache_dir: &Path, key: &str) -> Result<Option<T>> {
    let path = entry_path(cache_dir, key);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("read cache entry {}", path.display()))?;
    match serde_json::from_str::<CachedEntry<T>>(&content) {
        Ok(entry) if entry.version == CACHE_VERSION => Ok(Some(entry.payload)),
        Ok(entry) => {
            tracing::debug!("cache entry {} has version {}, ignoring", key, entry.version);
            Ok(None)
        }
        Err(e) => {
            tracing::debug!("cache entry {} unreadable: {}", key, e);
            Ok(None)
        }
    }
}

/// Store a payload under `key`, then prune the directory.
pub fn put_cached<T: Serialize>(cache_dir: &Path, key: &str, payload: &T) -> Result<()> {
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("create cache dir {}", cache_dir.display()))?;
    let entry = CachedEntry {
        version: CACHE_VERSION,
        created_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        payload,
    };
    let content = serde_json::to_string(&entry)?;
    let path = entry_path(cache_dir, key);
    fs::write(&path, content).with_context(|| format!("write cache entry {}", path.display()))?;
    prune(cache_dir, MAX_ENTRIES)?;
    Ok(())
}

fn cache_entries(cache_dir: &Path) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
    if !cache_dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::UNIX_EPOCH);
        entries.push((path, modified));
    }
    Ok(entries)
}

/// Keep the `keep` most recently written entries.
fn prune(cache_dir: &Path, keep: usize) -> Result<usize> {
    let mut entries = cache_entries(cache_dir)?;
    if entries.len() <= keep {
        return Ok(0);
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut removed = 0;
    for (path, _) in entries.into_iter().skip(keep) {
        if fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    tracing::debug!("pruned {} cache entries", removed);
    Ok(removed)
}

/// Remove every cached entry. Returns how many were removed.
pub fn clear_cache(cache_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for (path, _) in cache_entries(cache_dir)? {
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_deterministic() {
        let k1 = cache_key(["catalog", "all", "a.py|10|0"]);
        let k2 = cache_key(["catalog", "all", "a.py|10|0"]);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn test_cache_key_part_boundaries_matter() {
        assert_ne!(cache_key(["ab", "c"]), cache_key(["a", "bc"]));
    }

    #[test]
    fn test_cache_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let key = cache_key(["x"]);
        assert!(get_cached::<Vec<u32>>(dir.path(), &key).unwrap().is_none());
        put_cached(dir.path(), &key, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(
            get_cached::<Vec<u32>>(dir.path(), &key).unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(clear_cache(dir.path()).unwrap(), 1);
        assert!(get_cached::<Vec<u32>>(dir.path(), &key).unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let key = cache_key(["old"]);
        fs::write(
            entry_path(dir.path(), &key),
            r#"{"version":0,"created_at":"","payload":[1]}"#,
        )
        .unwrap();
        assert!(get_cached::<Vec<u32>>(dir.path(), &key).unwrap().is_none());
    }

    #[test]
    fn test_prune_keeps_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("{}.json", i)), "{}").unwrap();
        }
        assert_eq!(prune(dir.path(), 3).unwrap(), 2);
        assert_eq!(cache_entries(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn test_clear_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clear_cache(&dir.path().join("nope")).unwrap(), 0);
    }
}
