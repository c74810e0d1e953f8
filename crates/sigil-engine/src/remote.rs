//! Remote signature feed and report submission.
//!
//! Both calls are blocking with connect and read deadlines. A failed submit
//! never changes the local result.

use std::time::Duration;

use anyhow::{Context, Result};
use sigil_core::config::RemoteConfig;

use crate::catalog::{Catalog, CatalogSource};
use crate::report::Report;

/// A signature document fetched and validated, ready to be stored.
#[derive(Debug, Clone)]
pub struct FetchedSignatures {
    pub body: String,
    pub count: usize,
    pub version: Option<String>,
}

fn make_agent(config: &RemoteConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(config.timeout_secs))
        .build()
}

fn api_base(config: &RemoteConfig) -> Result<&str> {
    config
        .api_url
        .as_deref()
        .map(|u| u.trim_end_matches('/'))
        .filter(|u| !u.is_empty())
        .context("No API URL configured. Set SIGIL_API_URL.")
}

fn with_auth(request: ureq::Request, config: &RemoteConfig) -> ureq::Request {
    match &config.api_token {
        Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
        None => request,
    }
}

fn describe(err: ureq::Error, base: &str) -> anyhow::Error {
    match &err {
        ureq::Error::Status(code, _) => anyhow::anyhow!("Sigil API returned HTTP {}: {}", code, err),
        ureq::Error::Transport(_) => anyhow::anyhow!("Cannot reach Sigil API at {}: {}", base, err),
    }
}

/// GET `{api}/v1/signatures`. The body must parse as a signature document on
/// its own before it is returned.
pub fn fetch_signatures(config: &RemoteConfig) -> Result<FetchedSignatures> {
    let base = api_base(config)?;
    let url = format!("{}/v1/signatures", base);
    let agent = make_agent(config);
    let response = with_auth(agent.get(&url), config)
        .call()
        .map_err(|e| describe(e, base))?;
    let body = response
        .into_string()
        .context("Failed to read signature feed body")?;

    let catalog = Catalog::load(&[CatalogSource::JsonText {
        origin: url.clone(),
        text: body.clone(),
    }])
    .with_context(|| format!("Signature feed from {} failed validation", url))?;
    tracing::info!(count = catalog.len(), "fetched signature feed");
    Ok(FetchedSignatures {
        count: catalog.len(),
        version: catalog.version().map(str::to_string),
        body,
    })
}

/// POST the report to `{api}/v1/scans`.
pub fn submit_report(config: &RemoteConfig, report: &Report) -> Result<()> {
    let base = api_base(config)?;
    let url = format!("{}/v1/scans", base);
    let agent = make_agent(config);
    let body = serde_json::to_value(report).context("Failed to serialize report")?;
    with_auth(agent.post(&url), config)
        .send_json(body)
        .map_err(|e| describe(e, base))?;
    tracing::info!(scan_id = %report.scan_id, "report submitted");
    Ok(())
}
