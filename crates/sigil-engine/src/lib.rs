//! Sigil scan engine.
//!
//! Pipeline: [`tree::FileTree`] snapshot → [`runner::run`] over the eight
//! [`phases`] with a [`catalog::Catalog`] → [`scoring::score`] →
//! [`quarantine::QuarantineStore`] → [`report::Report`]. [`scan::scan`] drives
//! the whole sequence.

pub mod cancel;
pub mod catalog;
pub mod diff;
pub mod error;
pub mod phases;
pub mod quarantine;
pub mod report;
pub mod runner;
pub mod scan;
pub mod scoring;
pub mod tree;
pub mod types;

#[cfg(feature = "remote")]
pub mod remote;

pub use catalog::{Catalog, CatalogSource};
pub use error::{CatalogError, PhaseError, QuarantineError, ScanError};
pub use quarantine::{Actor, QuarantineStore};
pub use report::{Report, ReportFormat};
pub use scan::{scan, ScanRequest};
pub use scoring::{Threshold, Verdict};
pub use types::{Finding, Phase, Severity, SourceKind, Target};
