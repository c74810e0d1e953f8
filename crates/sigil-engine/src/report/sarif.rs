//! SARIF 2.1.0 output for code-scanning dashboards.

use std::collections::HashMap;

use serde::Serialize;

use super::{Report, Reporter, ENGINE_VERSION};
use crate::types::{Finding, Severity};

const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
const INFORMATION_URI: &str = "https://github.com/sigil-scan/sigil";

pub struct SarifReporter;

impl Reporter for SarifReporter {
    fn render(&self, report: &Report) -> String {
        serde_json::to_string_pretty(&SarifLog::from_report(report))
            .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize SARIF: {}"}}"#, e))
    }
}

#[derive(Debug, Serialize)]
pub struct SarifLog {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize)]
pub struct SarifRun {
    pub tool: SarifTool,
    pub invocations: Vec<SarifInvocation>,
    pub results: Vec<SarifResult>,
    pub properties: SarifRunProperties,
}

#[derive(Debug, Serialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    pub name: String,
    pub version: String,
    pub information_uri: String,
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    pub short_description: SarifMessage,
    pub default_configuration: SarifConfiguration,
    pub properties: SarifRuleProperties,
}

#[derive(Debug, Serialize)]
pub struct SarifConfiguration {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct SarifRuleProperties {
    pub phase: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifInvocation {
    pub execution_successful: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_execution_notifications: Vec<SarifNotification>,
}

#[derive(Debug, Serialize)]
pub struct SarifNotification {
    pub level: String,
    pub message: SarifMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub rule_index: usize,
    pub level: String,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    pub properties: SarifResultProperties,
}

#[derive(Debug, Serialize)]
pub struct SarifResultProperties {
    pub phase: String,
    pub severity: String,
    pub weight: f64,
    pub snippet: String,
}

#[derive(Debug, Serialize)]
pub struct SarifMessage {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Serialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRegion {
    pub start_line: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRunProperties {
    pub scan_id: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

fn level(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "note",
        Severity::Medium => "warning",
        Severity::High | Severity::Critical => "error",
    }
}

fn rule_for(finding: &Finding) -> SarifRule {
    SarifRule {
        id: finding.rule_id.clone(),
        short_description: SarifMessage {
            text: finding.description.clone(),
        },
        default_configuration: SarifConfiguration {
            level: level(finding.severity).to_string(),
        },
        properties: SarifRuleProperties {
            phase: finding.phase.slug().to_string(),
            tags: vec!["security".to_string(), finding.phase.slug().to_string()],
        },
    }
}

impl SarifLog {
    pub fn from_report(report: &Report) -> Self {
        let mut rules: Vec<SarifRule> = Vec::new();
        let mut rule_index: HashMap<&str, usize> = HashMap::new();
        let mut results = Vec::with_capacity(report.findings.len());

        for finding in &report.findings {
            let index = *rule_index.entry(finding.rule_id.as_str()).or_insert_with(|| {
                rules.push(rule_for(finding));
                rules.len() - 1
            });
            results.push(SarifResult {
                rule_id: finding.rule_id.clone(),
                rule_index: index,
                level: level(finding.severity).to_string(),
                message: SarifMessage {
                    text: finding.description.clone(),
                },
                locations: vec![SarifLocation {
                    physical_location: SarifPhysicalLocation {
                        artifact_location: SarifArtifactLocation {
                            uri: finding.file_path.clone(),
                        },
                        region: finding.line_number.map(|start_line| SarifRegion { start_line }),
                    },
                }],
                properties: SarifResultProperties {
                    phase: finding.phase.slug().to_string(),
                    severity: finding.severity.to_string(),
                    weight: finding.weight,
                    snippet: finding.matched_snippet.clone(),
                },
            });
        }

        let mut notifications: Vec<SarifNotification> = report
            .phase_errors
            .iter()
            .map(|e| SarifNotification {
                level: "warning".to_string(),
                message: SarifMessage { text: e.to_string() },
            })
            .collect();
        if let Some(cause) = &report.failure {
            notifications.push(SarifNotification {
                level: "error".to_string(),
                message: SarifMessage {
                    text: format!("Scan failed: {}", cause),
                },
            });
        }

        SarifLog {
            schema: SARIF_SCHEMA.to_string(),
            version: "2.1.0".to_string(),
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: "sigil".to_string(),
                        version: ENGINE_VERSION.to_string(),
                        information_uri: INFORMATION_URI.to_string(),
                        rules,
                    },
                },
                invocations: vec![SarifInvocation {
                    execution_successful: report.failure.is_none(),
                    tool_execution_notifications: notifications,
                }],
                results,
                properties: SarifRunProperties {
                    scan_id: report.scan_id.clone(),
                    target: report.target.clone(),
                    score: report.score,
                    verdict: report.verdict.map(|v| v.to_string()),
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{finding, report};
    use super::*;
    use crate::types::Phase;

    #[test]
    fn test_rules_deduplicated_and_indexed() {
        let r = report(vec![
            finding(Phase::CodePatterns, "CODE-001", Severity::High, "a.py", Some(1), 1.0),
            finding(Phase::Provenance, "PROV-001", Severity::Low, ".env", None, 1.0),
            finding(Phase::CodePatterns, "CODE-001", Severity::High, "b.py", Some(4), 1.0),
        ]);
        let json: serde_json::Value = serde_json::from_str(&SarifReporter.render(&r)).unwrap();
        let run = &json["runs"][0];
        assert_eq!(json["version"], "2.1.0");
        assert_eq!(run["tool"]["driver"]["rules"].as_array().unwrap().len(), 2);
        assert_eq!(run["results"][2]["ruleIndex"], 0);
        assert_eq!(run["results"][1]["level"], "note");
        assert!(run["results"][1]["locations"][0]["physicalLocation"]
            .get("region")
            .is_none());
        assert_eq!(run["results"][0]["locations"][0]["physicalLocation"]["region"]["startLine"], 1);
        assert_eq!(run["invocations"][0]["executionSuccessful"], true);
    }

    #[test]
    fn test_failed_run_has_no_score_properties() {
        let mut r = report(Vec::new());
        r.status = crate::quarantine::ScanStatus::Failed;
        r.score = None;
        r.verdict = None;
        r.failure = Some(crate::quarantine::FailureCause::Internal("boom".to_string()));
        let json: serde_json::Value = serde_json::from_str(&SarifReporter.render(&r)).unwrap();
        let run = &json["runs"][0];
        assert!(run["properties"].get("score").is_none());
        assert!(run["properties"].get("verdict").is_none());
        assert_eq!(run["invocations"][0]["executionSuccessful"], false);
    }
}
