//! Signature definitions and schema validation for catalog sources.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::CatalogError;
use crate::types::{Phase, Severity};

/// Upper bound accepted for a signature weight.
pub const MAX_WEIGHT: f64 = 20.0;

/// What a signature's `pattern` is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Regex over each line of text content.
    #[default]
    Content,
    /// Regex over the relative path.
    Path,
    /// Name of a structural check owned by the phase detector.
    Probe,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(Scope::Content),
            "path" => Ok(Scope::Path),
            "probe" => Ok(Scope::Probe),
            other => Err(format!("invalid scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FalsePositiveLikelihood {
    Low,
    Medium,
    High,
}

impl FromStr for FalsePositiveLikelihood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("invalid false_positive_likelihood '{}'", other)),
        }
    }
}

/// A detection rule bound to exactly one phase. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: String,
    pub category: String,
    pub phase: Phase,
    pub severity: Severity,
    pub pattern: String,
    pub description: String,
    pub weight: f64,
    /// Languages the signature applies to; `"*"` applies everywhere.
    pub language: Vec<String>,
    #[serde(default)]
    pub cve: Vec<String>,
    #[serde(default)]
    pub malware_families: Vec<String>,
    /// Restrict to files with these basenames (e.g. `package.json`).
    #[serde(default)]
    pub file_names: Vec<String>,
    #[serde(default)]
    pub false_positive_likelihood: Option<FalsePositiveLikelihood>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub scope: Scope,
}

impl Signature {
    /// Create a content signature that applies to every language.
    pub fn new(id: &str, phase: Phase, severity: Severity, pattern: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            category: phase.slug().replace('-', "_"),
            phase,
            severity,
            pattern: pattern.to_string(),
            description: description.to_string(),
            weight: 1.0,
            language: vec!["*".to_string()],
            cve: Vec::new(),
            malware_families: Vec::new(),
            file_names: Vec::new(),
            false_positive_likelihood: None,
            created: None,
            updated_at: None,
            scope: Scope::Content,
        }
    }

    /// Create a probe signature; `probe` names the structural check.
    pub fn probe(id: &str, phase: Phase, severity: Severity, probe: &str, description: &str) -> Self {
        let mut sig = Self::new(id, phase, severity, probe, description);
        sig.scope = Scope::Probe;
        sig
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn for_languages(mut self, languages: &[&str]) -> Self {
        self.language = languages.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn in_files(mut self, names: &[&str]) -> Self {
        self.file_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn on_path(mut self) -> Self {
        self.scope = Scope::Path;
        self
    }

    pub fn likelihood(mut self, fp: FalsePositiveLikelihood) -> Self {
        self.false_positive_likelihood = Some(fp);
        self
    }

    pub fn families(mut self, families: &[&str]) -> Self {
        self.malware_families = families.iter().map(|s| s.to_string()).collect();
        self
    }

    /// True if the signature applies to a file of `language` named `file_name`.
    pub fn applies_to(&self, language: &str, file_name: &str) -> bool {
        if !self.file_names.is_empty() && !self.file_names.iter().any(|n| n == file_name) {
            return false;
        }
        self.language
            .iter()
            .any(|l| l == "*" || normalize_language(l) == language)
    }
}

/// Map language aliases used by signature authors onto tree language names.
pub fn normalize_language(raw: &str) -> &str {
    match raw {
        "py" => "python",
        "js" | "node" | "nodejs" => "javascript",
        "ts" => "typescript",
        "sh" | "bash" | "zsh" => "shell",
        "yml" => "yaml",
        "md" => "markdown",
        "makefile" => "make",
        other => other,
    }
}

fn schema_err(id: &str, reason: impl Into<String>) -> CatalogError {
    CatalogError::Schema {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn required_str<'a>(obj: &'a serde_json::Map<String, Value>, id: &str, field: &str) -> Result<&'a str, CatalogError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(schema_err(id, format!("field '{}' is empty", field))),
        Some(_) => Err(schema_err(id, format!("field '{}' must be a string", field))),
        None => Err(schema_err(id, format!("missing required field '{}'", field))),
    }
}

fn optional_str(obj: &serde_json::Map<String, Value>, id: &str, field: &str) -> Result<Option<String>, CatalogError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(schema_err(id, format!("field '{}' must be a string", field))),
    }
}

fn string_list(obj: &serde_json::Map<String, Value>, id: &str, field: &str) -> Result<Option<Vec<String>>, CatalogError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                _ => Err(schema_err(id, format!("field '{}' must contain only strings", field))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(schema_err(id, format!("field '{}' must be a JSON array", field))),
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Validate one raw catalog entry. `index` names the entry when it has no usable id.
pub fn parse_signature(value: &Value, index: usize) -> Result<Signature, CatalogError> {
    let fallback_id = format!("#{}", index);
    let obj = value
        .as_object()
        .ok_or_else(|| schema_err(&fallback_id, "entry must be a JSON object"))?;

    let id = match obj.get("id") {
        Some(Value::String(s)) if valid_id(s) => s.clone(),
        Some(Value::String(s)) => return Err(schema_err(s, "id must match [A-Za-z0-9_.:-]{1,128}")),
        Some(_) => return Err(schema_err(&fallback_id, "field 'id' must be a string")),
        None => return Err(schema_err(&fallback_id, "missing required field 'id'")),
    };

    let category = required_str(obj, &id, "category")?.to_string();
    let phase: Phase = required_str(obj, &id, "phase")?
        .parse()
        .map_err(|e: String| schema_err(&id, e))?;
    let severity: Severity = required_str(obj, &id, "severity")?
        .parse()
        .map_err(|e: String| schema_err(&id, e))?;
    let pattern = required_str(obj, &id, "pattern")?.to_string();
    let description = required_str(obj, &id, "description")?.to_string();

    let weight = match obj.get("weight") {
        None | Some(Value::Null) => 1.0,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| schema_err(&id, "weight is not representable"))?,
        Some(_) => return Err(schema_err(&id, "weight must be a number")),
    };
    if !(0.0..=MAX_WEIGHT).contains(&weight) {
        return Err(schema_err(&id, format!("weight {} outside 0-{}", weight, MAX_WEIGHT)));
    }

    let language = string_list(obj, &id, "language")?.unwrap_or_else(|| vec!["*".to_string()]);
    if language.is_empty() {
        return Err(schema_err(&id, "language must not be empty (use [\"*\"])"));
    }
    let cve = string_list(obj, &id, "cve")?.unwrap_or_default();
    let malware_families = string_list(obj, &id, "malware_families")?.unwrap_or_default();
    let file_names = string_list(obj, &id, "file_names")?.unwrap_or_default();

    let false_positive_likelihood = optional_str(obj, &id, "false_positive_likelihood")?
        .map(|s| s.parse::<FalsePositiveLikelihood>())
        .transpose()
        .map_err(|e| schema_err(&id, e))?;
    let scope = optional_str(obj, &id, "scope")?
        .map(|s| s.parse::<Scope>())
        .transpose()
        .map_err(|e| schema_err(&id, e))?
        .unwrap_or_default();

    Ok(Signature {
        category,
        phase,
        severity,
        pattern,
        description,
        weight,
        language,
        cve,
        malware_families,
        file_names,
        false_positive_likelihood,
        created: optional_str(obj, &id, "created")?,
        updated_at: optional_str(obj, &id, "updated_at")?,
        scope,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "id": "sig-net-001",
            "category": "network_exfil",
            "phase": "network_exfil",
            "severity": "HIGH",
            "pattern": "requests\\.post",
            "description": "POST request",
        })
    }

    #[test]
    fn test_parse_minimal_defaults() {
        let sig = parse_signature(&base(), 0).unwrap();
        assert_eq!(sig.phase, Phase::NetworkExfil);
        assert_eq!(sig.severity, Severity::High);
        assert_eq!(sig.weight, 1.0);
        assert_eq!(sig.language, vec!["*"]);
        assert_eq!(sig.scope, Scope::Content);
    }

    #[test]
    fn test_missing_pattern_rejected() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("pattern");
        let err = parse_signature(&v, 3).unwrap_err();
        assert!(err.to_string().contains("pattern"), "{}", err);
    }

    #[test]
    fn test_invalid_severity_rejected() {
        let mut v = base();
        v["severity"] = json!("info");
        assert!(matches!(parse_signature(&v, 0), Err(CatalogError::Schema { .. })));
    }

    #[test]
    fn test_non_array_fields_rejected() {
        for field in ["language", "cve", "malware_families"] {
            let mut v = base();
            v[field] = json!("python");
            let err = parse_signature(&v, 0).unwrap_err();
            assert!(err.to_string().contains("JSON array"), "{}: {}", field, err);
        }
    }

    #[test]
    fn test_weight_bounds() {
        let mut v = base();
        v["weight"] = json!(20.5);
        assert!(parse_signature(&v, 0).is_err());
        v["weight"] = json!(1.5);
        assert_eq!(parse_signature(&v, 0).unwrap().weight, 1.5);
    }

    #[test]
    fn test_applies_to_language_and_file_name() {
        let sig = Signature::new("X", Phase::InstallHooks, Severity::High, "x", "d")
            .for_languages(&["js", "python"])
            .in_files(&["package.json", "setup.py"]);
        assert!(sig.applies_to("python", "setup.py"));
        assert!(!sig.applies_to("python", "main.py"));
        assert!(!sig.applies_to("ruby", "setup.py"));
        let any = Signature::new("Y", Phase::CodePatterns, Severity::Low, "y", "d");
        assert!(any.applies_to("unknown", "README"));
    }
}
