//! `sigil scan`: run the pipeline over a target and map the result to an exit code.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sigil_core::config::{PathsConfig, ScanConfig};
use sigil_engine::types::parse_phase_list;
use sigil_engine::{scan, Report, ScanRequest, Target, Threshold};

use super::{EXIT_ERROR, EXIT_OK, EXIT_THRESHOLD};
use crate::cli::ScanArgs;
use crate::observability;

pub fn run(args: ScanArgs) -> Result<i32> {
    let paths = PathsConfig::from_env();
    let config = ScanConfig::from_env();

    let catalog = super::load_catalog(&paths, args.signatures.as_deref(), args.rules.as_deref())?;
    let store = super::open_store(&paths)?;

    let target = Target {
        identity: args
            .name
            .clone()
            .unwrap_or_else(|| args.path.display().to_string()),
        source_kind: args.source,
        location: args.path.clone(),
    };
    let mut request = ScanRequest::new(target)
        .exclude(args.exclude.clone())
        .max_file_bytes(config.max_file_bytes);
    if let Some(raw) = &args.phases {
        request = request.phases(parse_phase_list(raw).map_err(anyhow::Error::msg)?);
    }
    let timeout_secs = args.timeout.unwrap_or(config.timeout_secs);
    if timeout_secs > 0 {
        request = request.timeout(Duration::from_secs(timeout_secs));
    }
    if config.use_cache && !args.no_cache {
        request = request.cache_dir(paths.cache_dir.clone());
    }

    let report = scan(&request, &catalog, &store).context("Scan aborted")?;
    observability::audit_scan(&report);

    emit(&report.render(args.format), args.output.as_deref())?;

    if args.submit {
        submit(&report);
    }

    Ok(exit_code(&report, args.threshold))
}

/// Failed scans are errors; otherwise the threshold alone decides.
pub fn exit_code(report: &Report, threshold: Option<Threshold>) -> i32 {
    if report.is_failed() {
        return EXIT_ERROR;
    }
    match (threshold, report.score) {
        (Some(t), Some(score)) if t.is_exceeded_by(score) => EXIT_THRESHOLD,
        _ => EXIT_OK,
    }
}

fn emit(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => {
            print!("{}", rendered);
            if !rendered.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

#[cfg(feature = "remote")]
fn submit(report: &Report) {
    let remote = sigil_core::config::RemoteConfig::from_env();
    match sigil_engine::remote::submit_report(&remote, report) {
        Ok(()) => tracing::info!(scan_id = %report.scan_id, "report submitted"),
        Err(e) => tracing::warn!(scan_id = %report.scan_id, "report submission failed: {:#}", e),
    }
}

#[cfg(not(feature = "remote"))]
fn submit(report: &Report) {
    tracing::warn!(scan_id = %report.scan_id, "--submit ignored: built without the `remote` feature");
}
