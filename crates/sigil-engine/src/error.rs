//! Error taxonomy for catalog loading, scanning and quarantine transitions.

use std::path::PathBuf;
use thiserror::Error;

use crate::scoring::Verdict;
use crate::types::Phase;

/// Catalog could not be built. Fatal at startup; no partial catalog is used.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read signature source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {reason}")]
    Json { path: PathBuf, reason: String },

    #[error("Invalid rules overlay {path}: {reason}")]
    Yaml { path: PathBuf, reason: String },

    #[error("Signature '{id}' failed validation: {reason}")]
    Schema { id: String, reason: String },

    #[error("Signature '{id}' has an invalid pattern: {reason}")]
    InvalidPattern { id: String, reason: String },

    #[error("Duplicate signature id '{0}'")]
    DuplicateId(String),

    #[error("Signature '{id}' names unknown probe '{probe}'")]
    UnknownProbe { id: String, probe: String },
}

/// Why a whole phase produced no results.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PhaseErrorKind {
    /// The catalog holds no signatures bound to the phase.
    NoSignatures,
    /// The detector panicked; the message is the panic payload.
    Crashed(String),
}

/// A whole-phase failure. Sibling phases are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("{phase} phase failed: {}", describe_kind(.kind))]
pub struct PhaseError {
    pub phase: Phase,
    pub kind: PhaseErrorKind,
}

fn describe_kind(kind: &PhaseErrorKind) -> String {
    match kind {
        PhaseErrorKind::NoSignatures => "no signatures loaded for this phase".to_string(),
        PhaseErrorKind::Crashed(msg) => format!("detector crashed: {}", msg),
    }
}

/// Failures that end a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Target unreadable: {path}: {reason}")]
    TargetUnreadable { path: PathBuf, reason: String },

    #[error("Invalid exclude glob '{glob}': {reason}")]
    InvalidExclude { glob: String, reason: String },

    #[error("Scan timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
}

/// Quarantine state machine misuse. Reported to the caller, never retried.
#[derive(Debug, Error, PartialEq)]
pub enum QuarantineError {
    #[error("Scan {0} is not pending; it has already been started")]
    AlreadyRunning(String),

    #[error("Scan {0} already has a quarantine decision")]
    AlreadyDecided(String),

    #[error("Scan {0} is not quarantined (clean or not completed)")]
    NotQuarantined(String),

    #[error("Scan {0} has a CRITICAL verdict and cannot be approved")]
    CriticalOverrideDenied(String),

    #[error("Scan {id} ({verdict}) needs an explicit actor; automatic approval is not allowed")]
    ExplicitActorRequired { id: String, verdict: Verdict },

    #[error("Scan {id} ({verdict}) needs an explicit override actor")]
    OverrideRequired { id: String, verdict: Verdict },

    #[error("Actor name must not be empty")]
    InvalidActor,

    #[error("Scan {id} cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Scan {id}: supplied score {stored} does not match recomputed score {recomputed}")]
    InconsistentScore { id: String, stored: u64, recomputed: u64 },

    #[error("Scan {id}: verdict {supplied} does not match score band {expected}")]
    InconsistentVerdict { id: String, supplied: Verdict, expected: Verdict },

    #[error("Scan {id}: finding belongs to scan {other}")]
    ForeignFinding { id: String, other: String },

    #[error("No scan with id '{0}'")]
    NotFound(String),

    #[error("Scan id prefix '{0}' matches more than one scan")]
    AmbiguousId(String),

    #[error("Quarantine store persistence failed: {0}")]
    Persistence(String),
}
