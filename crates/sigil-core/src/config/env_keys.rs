//! Environment variable keys and their aliases.
//!
//! Primary keys use the `SIGIL_*` prefix. Aliases are accepted for the
//! variables older wrappers (CI action, npm shim) export.

/// Data directories
pub mod paths {
    pub const SIGIL_HOME: &str = "SIGIL_HOME";

    pub const SIGIL_QUARANTINE_DIR: &str = "SIGIL_QUARANTINE_DIR";
    pub const QUARANTINE_DIR_ALIASES: &[&str] = &["SIGIL_QUARANTINE"];

    pub const SIGIL_CACHE_DIR: &str = "SIGIL_CACHE_DIR";

    /// Signature catalog JSON
    pub const SIGIL_SIGNATURES: &str = "SIGIL_SIGNATURES";
    pub const SIGNATURES_ALIASES: &[&str] = &["SIGIL_SIGNATURES_PATH"];

    /// YAML overlay (disabled_rules / extra rules)
    pub const SIGIL_RULES: &str = "SIGIL_RULES";
}

/// Scan execution limits
pub mod scan {
    pub const SIGIL_SCAN_TIMEOUT_SECS: &str = "SIGIL_SCAN_TIMEOUT_SECS";
    pub const SCAN_TIMEOUT_ALIASES: &[&str] = &["SIGIL_TIMEOUT"];

    pub const SIGIL_MAX_FILE_BYTES: &str = "SIGIL_MAX_FILE_BYTES";

    pub const SIGIL_NO_CACHE: &str = "SIGIL_NO_CACHE";
}

/// Remote signature / report service
pub mod remote {
    pub const SIGIL_API_URL: &str = "SIGIL_API_URL";
    pub const API_URL_ALIASES: &[&str] = &["SIGIL_API"];

    pub const SIGIL_API_TOKEN: &str = "SIGIL_API_TOKEN";
    pub const API_TOKEN_ALIASES: &[&str] = &["SIGIL_TOKEN"];

    pub const SIGIL_API_TIMEOUT_SECS: &str = "SIGIL_API_TIMEOUT_SECS";
}

/// Logging and audit
pub mod observability {
    pub const SIGIL_QUIET: &str = "SIGIL_QUIET";
    pub const QUIET_ALIASES: &[&str] = &["SIGIL_SILENT"];

    pub const SIGIL_LOG_LEVEL: &str = "SIGIL_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["SIGIL_LOG"];

    pub const SIGIL_LOG_JSON: &str = "SIGIL_LOG_JSON";

    pub const SIGIL_AUDIT_LOG: &str = "SIGIL_AUDIT_LOG";
}
