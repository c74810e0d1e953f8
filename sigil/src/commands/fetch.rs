//! `sigil fetch-signatures`: replace the local signature file with the remote feed.

use anyhow::Result;

#[cfg(feature = "remote")]
pub fn fetch_signatures() -> Result<i32> {
    use anyhow::Context;
    use sigil_core::config::{PathsConfig, RemoteConfig};

    let paths = PathsConfig::from_env();
    let remote = RemoteConfig::from_env();
    let fetched = sigil_engine::remote::fetch_signatures(&remote)?;

    let dest = &paths.signatures_path;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    // Atomic replace; the previous file stays in place until the rename.
    let tmp = dest.with_extension("json.tmp");
    std::fs::write(&tmp, &fetched.body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, dest).with_context(|| format!("Failed to replace {}", dest.display()))?;

    println!(
        "Fetched {} signatures (version {}) into {}",
        fetched.count,
        fetched.version.as_deref().unwrap_or("unversioned"),
        dest.display()
    );
    Ok(super::EXIT_OK)
}

#[cfg(not(feature = "remote"))]
pub fn fetch_signatures() -> Result<i32> {
    anyhow::bail!("fetch-signatures requires the `remote` feature")
}
