//! Core scan types: phases, severities, findings, target descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of detection phases, in declaration order.
///
/// `Ord` follows declaration order; reports group findings by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InstallHooks,
    CodePatterns,
    NetworkExfil,
    Credentials,
    Obfuscation,
    Provenance,
    PromptInjection,
    SkillSecurity,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::InstallHooks,
        Phase::CodePatterns,
        Phase::NetworkExfil,
        Phase::Credentials,
        Phase::Obfuscation,
        Phase::Provenance,
        Phase::PromptInjection,
        Phase::SkillSecurity,
    ];

    /// Weight multiplier applied to every finding of this phase.
    pub fn multiplier(self) -> f64 {
        match self {
            Phase::InstallHooks => 10.0,
            Phase::CodePatterns => 5.0,
            Phase::NetworkExfil => 3.0,
            Phase::Credentials => 2.0,
            Phase::Obfuscation => 5.0,
            // 1-3x range is carried by provenance signature weights
            Phase::Provenance => 1.0,
            Phase::PromptInjection => 10.0,
            Phase::SkillSecurity => 5.0,
        }
    }

    /// Human-readable name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Phase::InstallHooks => "Install Hooks",
            Phase::CodePatterns => "Code Patterns",
            Phase::NetworkExfil => "Network/Exfiltration",
            Phase::Credentials => "Credentials",
            Phase::Obfuscation => "Obfuscation",
            Phase::Provenance => "Provenance",
            Phase::PromptInjection => "Prompt Injection",
            Phase::SkillSecurity => "Skill Security",
        }
    }

    /// Name accepted by `--phases` and printed by `sigil phases`.
    pub fn slug(self) -> &'static str {
        match self {
            Phase::InstallHooks => "install-hooks",
            Phase::CodePatterns => "code-patterns",
            Phase::NetworkExfil => "network-exfil",
            Phase::Credentials => "credentials",
            Phase::Obfuscation => "obfuscation",
            Phase::Provenance => "provenance",
            Phase::PromptInjection => "prompt-injection",
            Phase::SkillSecurity => "skill-security",
        }
    }

    /// One-line summary of what the phase looks for.
    pub fn detects(self) -> &'static str {
        match self {
            Phase::InstallHooks => "packaging-time hooks that run network or exec during install",
            Phase::CodePatterns => "dynamic eval, unsafe deserialization, subprocess spawning, auto-approve flags",
            Phase::NetworkExfil => "outbound HTTP, webhooks, tunnel services, DNS exfiltration",
            Phase::Credentials => "secret environment access, SSH and cloud credential paths, embedded keys",
            Phase::Obfuscation => "base64/hex decoding, char-code reconstruction, packed payloads",
            Phase::Provenance => "git history anomalies, hidden, oversized or binary files",
            Phase::PromptInjection => "instructions aimed at AI agents, system prompt overrides, tool-call markers",
            Phase::SkillSecurity => "permission-escalating skill and MCP manifests, undeclared capabilities",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    /// Accepts `install-hooks`, `install_hooks`, `INSTALL_HOOKS` and `Install Hooks`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let phase = match norm.as_str() {
            "installhooks" | "install" => Phase::InstallHooks,
            "codepatterns" | "code" => Phase::CodePatterns,
            "networkexfil" | "networkexfiltration" | "network" => Phase::NetworkExfil,
            "credentials" | "creds" => Phase::Credentials,
            "obfuscation" => Phase::Obfuscation,
            "provenance" => Phase::Provenance,
            "promptinjection" | "prompt" => Phase::PromptInjection,
            "skillsecurity" | "skill" => Phase::SkillSecurity,
            _ => return Err(format!("unknown phase '{}'", s.trim())),
        };
        Ok(phase)
    }
}

/// Parse a comma-separated phase list. The result is deduplicated and in
/// declaration order; an empty list is an error.
pub fn parse_phase_list(raw: &str) -> Result<Vec<Phase>, String> {
    let mut phases = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let phase: Phase = part.parse()?;
        if !phases.contains(&phase) {
            phases.push(phase);
        }
    }
    if phases.is_empty() {
        return Err("no phases given".to_string());
    }
    phases.sort();
    Ok(phases)
}

/// Severity of a signature and the findings it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High and critical findings are tagged `[FAIL]` in text reports.
    pub fn is_blocking(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("invalid severity '{}'", other)),
        }
    }
}

/// A single signature match recorded against a file (and line, for content matches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub scan_id: String,
    pub phase: Phase,
    pub rule_id: String,
    pub severity: Severity,
    /// Relative, `/`-separated path inside the scanned tree.
    pub file_path: String,
    pub line_number: Option<usize>,
    pub matched_snippet: String,
    /// Signature weight, before the phase multiplier.
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

impl Finding {
    /// `file:line`, or just the file for path and tree findings.
    pub fn location(&self) -> String {
        match self.line_number {
            Some(line) => format!("{}:{}", self.file_path, line),
            None => self.file_path.clone(),
        }
    }
}

/// How the scanned tree was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pip,
    Npm,
    Git,
    #[default]
    Local,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Pip => "pip",
            SourceKind::Npm => "npm",
            SourceKind::Git => "git",
            SourceKind::Local => "local",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pip" | "pypi" => Ok(SourceKind::Pip),
            "npm" => Ok(SourceKind::Npm),
            "git" => Ok(SourceKind::Git),
            "local" | "path" => Ok(SourceKind::Local),
            other => Err(format!("unknown source kind '{}'", other)),
        }
    }
}

/// Identity of a scan target: what was requested and where it sits on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Package name, URL or path as the caller named it.
    pub identity: String,
    pub source_kind: SourceKind,
    /// Materialized tree on disk.
    pub location: std::path::PathBuf,
}

impl Target {
    pub fn local(path: impl Into<std::path::PathBuf>) -> Self {
        let location = path.into();
        Self {
            identity: location.display().to_string(),
            source_kind: SourceKind::Local,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names_roundtrip() {
        for phase in Phase::ALL {
            assert_eq!(phase.slug().parse::<Phase>(), Ok(phase));
            assert_eq!(phase.name().parse::<Phase>(), Ok(phase));
        }
        assert_eq!("NETWORK_EXFIL".parse::<Phase>(), Ok(Phase::NetworkExfil));
        assert_eq!("prompt_injection".parse::<Phase>(), Ok(Phase::PromptInjection));
        assert!("dynamic-analysis".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_order_is_declaration_order() {
        let mut shuffled = vec![Phase::SkillSecurity, Phase::InstallHooks, Phase::Provenance];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Phase::InstallHooks, Phase::Provenance, Phase::SkillSecurity]
        );
    }

    #[test]
    fn test_parse_phase_list() {
        let phases = parse_phase_list("credentials, install-hooks,credentials").unwrap();
        assert_eq!(phases, vec![Phase::InstallHooks, Phase::Credentials]);
        assert!(parse_phase_list(" , ").is_err());
        assert!(parse_phase_list("install-hooks,bogus").is_err());
    }

    #[test]
    fn test_multipliers() {
        assert_eq!(Phase::InstallHooks.multiplier(), 10.0);
        assert_eq!(Phase::NetworkExfil.multiplier(), 3.0);
        assert_eq!(Phase::Credentials.multiplier(), 2.0);
        assert_eq!(Phase::PromptInjection.multiplier(), 10.0);
    }

    #[test]
    fn test_severity_parse_any_case() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert!("info".parse::<Severity>().is_err());
        assert!(Severity::Critical.is_blocking());
        assert!(!Severity::Medium.is_blocking());
    }
}
