use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sigil_engine::{ReportFormat, SourceKind, Threshold};

/// Sigil - scan third-party code before it runs
#[derive(Parser, Debug)]
#[command(name = "sigil")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory or file and quarantine it unless it is clean
    Scan(ScanArgs),

    /// List quarantined scans, newest first
    List {
        /// Only scans still waiting for a decision
        #[arg(long)]
        pending: bool,
    },

    /// Approve a quarantined scan (LOW: anyone, MEDIUM: a named user, HIGH: --override, CRITICAL: never)
    Approve {
        /// Scan id or a unique prefix of one
        #[arg(value_name = "ID")]
        id: String,

        /// Name recorded as the decision maker
        #[arg(long = "as", value_name = "NAME", env = "SIGIL_ACTOR")]
        actor: String,

        /// Record the decision as an explicit policy override (required for HIGH)
        #[arg(long = "override", conflicts_with = "pipeline")]
        force_override: bool,

        /// Record the decision as an automated pipeline (LOW only)
        #[arg(long)]
        pipeline: bool,

        /// Free-text rationale stored with the decision
        #[arg(long, value_name = "TEXT")]
        reason: Option<String>,
    },

    /// Reject a quarantined scan and purge its quarantined material
    Reject {
        /// Scan id or a unique prefix of one
        #[arg(value_name = "ID")]
        id: String,

        /// Name recorded as the decision maker
        #[arg(long = "as", value_name = "NAME", env = "SIGIL_ACTOR")]
        actor: String,

        /// Free-text rationale stored with the decision
        #[arg(long, value_name = "TEXT")]
        reason: Option<String>,
    },

    /// Remove every cached scan result
    ClearCache,

    /// Download the signature feed from SIGIL_API_URL into the signatures file
    FetchSignatures,

    /// Compare two JSON reports of the same target
    Diff {
        #[arg(value_name = "OLD")]
        old: PathBuf,

        #[arg(value_name = "NEW")]
        new: PathBuf,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the scan phases, their weights and loaded signature counts
    Phases {
        /// Signature file to load instead of the configured one
        #[arg(long, value_name = "FILE")]
        signatures: Option<PathBuf>,

        /// Rules overlay (YAML)
        #[arg(long, value_name = "FILE")]
        rules: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory or file to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Comma-separated phases to run (default: all)
    #[arg(long, value_name = "PHASES")]
    pub phases: Option<String>,

    /// Glob of paths to skip (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Output format: text, json, sarif
    #[arg(long, default_value = "text")]
    pub format: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit 1 when the score is at or above this band: low, medium, high, critical
    #[arg(long)]
    pub threshold: Option<Threshold>,

    /// Where the target came from: pip, npm, git, local
    #[arg(long, default_value = "local")]
    pub source: SourceKind,

    /// Name recorded for the target (default: the path)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Scan deadline in seconds, 0 for none (default: from env or 300)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Signature file to load instead of the configured one
    #[arg(long, value_name = "FILE")]
    pub signatures: Option<PathBuf>,

    /// Rules overlay (YAML)
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Do not read or write the scan result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Submit the report to SIGIL_API_URL after scanning
    #[arg(long)]
    pub submit: bool,
}
