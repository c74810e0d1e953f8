//! Typed configuration structs built from the environment.

use std::path::PathBuf;

use super::env_keys::{observability as obv_keys, paths as path_keys, remote as remote_keys, scan as scan_keys};
use super::loader::{env_bool, env_optional, env_or, env_u64};

/// Default directory name under the user's home.
const SIGIL_DIR: &str = ".sigil";

/// Files at or above this size are flagged and not loaded for content matching.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Logging and audit settings. Read once per process.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            Self {
                quiet: env_bool(obv_keys::SIGIL_QUIET, obv_keys::QUIET_ALIASES, false),
                log_level: env_or(obv_keys::SIGIL_LOG_LEVEL, obv_keys::LOG_LEVEL_ALIASES, || {
                    "sigil=info".to_string()
                }),
                log_json: env_bool(obv_keys::SIGIL_LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::SIGIL_AUDIT_LOG, &[]),
            }
        })
    }
}

/// Where sigil keeps quarantined material, cached results and catalogs.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub home: PathBuf,
    pub quarantine_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Signature JSON; only used when the file exists.
    pub signatures_path: PathBuf,
    /// Optional YAML overlay.
    pub rules_path: Option<PathBuf>,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let home = env_optional(path_keys::SIGIL_HOME, &[])
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        Self::with_home(home)
    }

    /// Derive every path from `home`, still honouring per-path overrides.
    pub fn with_home(home: PathBuf) -> Self {
        let quarantine_dir = env_optional(
            path_keys::SIGIL_QUARANTINE_DIR,
            path_keys::QUARANTINE_DIR_ALIASES,
        )
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("quarantine"));
        let cache_dir = env_optional(path_keys::SIGIL_CACHE_DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("cache"));
        let signatures_path = env_optional(path_keys::SIGIL_SIGNATURES, path_keys::SIGNATURES_ALIASES)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("signatures.json"));
        let rules_path = env_optional(path_keys::SIGIL_RULES, &[]).map(PathBuf::from);
        Self {
            home,
            quarantine_dir,
            cache_dir,
            signatures_path,
            rules_path,
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SIGIL_DIR)
}

/// Limits applied to a single scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub timeout_secs: u64,
    pub max_file_bytes: u64,
    pub use_cache: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            use_cache: true,
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            timeout_secs: env_u64(
                scan_keys::SIGIL_SCAN_TIMEOUT_SECS,
                scan_keys::SCAN_TIMEOUT_ALIASES,
                DEFAULT_SCAN_TIMEOUT_SECS,
            ),
            max_file_bytes: env_u64(scan_keys::SIGIL_MAX_FILE_BYTES, &[], DEFAULT_MAX_FILE_BYTES),
            use_cache: !env_bool(scan_keys::SIGIL_NO_CACHE, &[], false),
        }
    }
}

/// Remote signature feed and report submission.
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            api_url: env_optional(remote_keys::SIGIL_API_URL, remote_keys::API_URL_ALIASES)
                .map(|u| u.trim_end_matches('/').to_string()),
            api_token: env_optional(remote_keys::SIGIL_API_TOKEN, remote_keys::API_TOKEN_ALIASES),
            timeout_secs: env_u64(
                remote_keys::SIGIL_API_TIMEOUT_SECS,
                &[],
                DEFAULT_API_TIMEOUT_SECS,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_derive_from_home() {
        let home = PathBuf::from("/tmp/sigil-home-test");
        let paths = PathsConfig::with_home(home.clone());
        assert_eq!(paths.home, home);
        if std::env::var(path_keys::SIGIL_QUARANTINE_DIR).is_err()
            && std::env::var("SIGIL_QUARANTINE").is_err()
        {
            assert_eq!(paths.quarantine_dir, home.join("quarantine"));
        }
        if std::env::var(path_keys::SIGIL_CACHE_DIR).is_err() {
            assert_eq!(paths.cache_dir, home.join("cache"));
        }
    }

    #[test]
    fn test_scan_config_default() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.max_file_bytes, 5 * 1024 * 1024);
        assert!(cfg.use_cache);
    }
}
