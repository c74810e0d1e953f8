//! Sigil configuration layer.
//!
//! Every environment read lives here; the rest of the workspace consumes the
//! typed structs from `schema`.
//!
//! - `loader`: env_or, env_optional, env_bool, env_u64, load_dotenv
//! - `schema`: ObservabilityConfig, PathsConfig, ScanConfig, RemoteConfig
//! - `env_keys`: key constants and aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_u64, load_dotenv};
pub use schema::{
    ObservabilityConfig, PathsConfig, RemoteConfig, ScanConfig, DEFAULT_MAX_FILE_BYTES,
    DEFAULT_SCAN_TIMEOUT_SECS,
};
