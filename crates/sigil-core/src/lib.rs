//! Sigil core: configuration and the on-disk scan result cache.

pub mod config;
pub mod scan_cache;
