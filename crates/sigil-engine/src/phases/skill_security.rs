//! Agent skill and MCP configuration risks: wildcard tool grants in SKILL.md
//! front matter, MCP servers started through `sh -c`, blanket permission
//! requests and tool poisoning.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{line_of, PhaseDetector, Probe, ProbeFn, ProbeHit};
use crate::tree::TreeEntry;
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::SkillSecurity,
    probes: &[
        Probe {
            name: "skill-tool-wildcard",
            run: ProbeFn::File(skill_tool_wildcard),
        },
        Probe {
            name: "mcp-shell-server",
            run: ProbeFn::File(mcp_shell_server),
        },
    ],
};

const SHELL_TOOLS: &[&str] = &["bash", "shell", "exec", "terminal"];
const SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "fish", "cmd", "powershell", "pwsh"];
const SHELL_EXEC_FLAGS: &[&str] = &["-c", "/c", "-command", "/k"];

/// One entry of an `allowed-tools` list, e.g. `Bash(npm:*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolGrant {
    pub tool: String,
    /// Text inside the parentheses, if any.
    pub scope: Option<String>,
}

impl ToolGrant {
    /// Command prefix of a scoped grant: `npm` for `Bash(npm:*)`.
    pub fn command_prefix(&self) -> Option<&str> {
        let scope = self.scope.as_deref()?;
        Some(scope.split(':').next().unwrap_or(scope).trim())
    }

    /// True for `*`, a bare shell tool, or a shell tool scoped to `*`.
    pub fn is_unrestricted(&self) -> bool {
        if self.tool == "*" {
            return true;
        }
        if !SHELL_TOOLS.contains(&self.tool.to_ascii_lowercase().as_str()) {
            return false;
        }
        match self.command_prefix() {
            None => true,
            Some(prefix) => prefix.is_empty() || prefix == "*",
        }
    }
}

fn grant_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([\w*-]+)\s*(?:\(([^)]*)\))?$").expect("allowed-tools regex is valid"))
}

fn front_matter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---").expect("front matter regex is valid"))
}

/// Split on commas that are not inside parentheses.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Parse an `allowed-tools` value such as `Read, Bash(git:*), Bash(npm:*)`.
pub fn parse_allowed_tools(raw: &str) -> Vec<ToolGrant> {
    split_top_level(raw)
        .into_iter()
        .filter_map(|token| {
            let caps = grant_pattern().captures(token)?;
            Some(ToolGrant {
                tool: caps.get(1)?.as_str().to_string(),
                scope: caps.get(2).map(|m| m.as_str().trim().to_string()),
            })
        })
        .collect()
}

/// `allowed-tools` from SKILL.md front matter, as a string or a YAML list.
fn allowed_tools_value(front_matter: &str) -> Option<String> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(front_matter).ok()?;
    match yaml.get("allowed-tools")? {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Sequence(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

fn skill_tool_wildcard(entry: &TreeEntry) -> Vec<ProbeHit> {
    if !entry.file_name().eq_ignore_ascii_case("SKILL.md") {
        return Vec::new();
    }
    let Some(text) = entry.text_content() else {
        return Vec::new();
    };
    let Some(front_matter) = front_matter_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };
    let Some(raw) = allowed_tools_value(front_matter) else {
        return Vec::new();
    };
    let wide: Vec<String> = parse_allowed_tools(&raw)
        .into_iter()
        .filter(ToolGrant::is_unrestricted)
        .map(|g| match g.scope {
            Some(scope) => format!("{}({})", g.tool, scope),
            None => g.tool,
        })
        .collect();
    if wide.is_empty() {
        return Vec::new();
    }
    vec![ProbeHit::at(
        &entry.rel_path,
        line_of(text, "allowed-tools"),
        format!("allowed-tools: {}", wide.join(", ")),
    )]
}

/// Server table in the common MCP config layouts.
fn mcp_servers(config: &Value) -> Option<&serde_json::Map<String, Value>> {
    config
        .get("mcpServers")
        .or_else(|| config.get("servers"))
        .or_else(|| config.get("mcp").and_then(|m| m.get("servers")))
        .and_then(Value::as_object)
}

fn command_line(server: &Value) -> Vec<String> {
    let strings = |v: &Value| -> Vec<String> {
        v.as_array()
            .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };
    let mut argv = match server.get("command") {
        Some(Value::String(cmd)) => cmd.split_whitespace().map(str::to_string).collect(),
        Some(cmd @ Value::Array(_)) => strings(cmd),
        _ => Vec::new(),
    };
    if let Some(args) = server.get("args") {
        argv.extend(strings(args));
    }
    argv
}

fn is_shell_exec(argv: &[String]) -> bool {
    let Some(program) = argv.first() else {
        return false;
    };
    let base = program.rsplit(['/', '\\']).next().unwrap_or(program).to_ascii_lowercase();
    let base = base.strip_suffix(".exe").unwrap_or(&base);
    SHELLS.contains(&base)
        && argv[1..]
            .iter()
            .any(|a| SHELL_EXEC_FLAGS.contains(&a.to_ascii_lowercase().as_str()))
}

fn mcp_shell_server(entry: &TreeEntry) -> Vec<ProbeHit> {
    if entry.language != "json" {
        return Vec::new();
    }
    let Some(text) = entry.text_content() else {
        return Vec::new();
    };
    let Ok(config) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    let Some(servers) = mcp_servers(&config) else {
        return Vec::new();
    };
    servers
        .iter()
        .filter_map(|(name, server)| {
            let argv = command_line(server);
            if !is_shell_exec(&argv) {
                return None;
            }
            Some(ProbeHit::at(
                &entry.rel_path,
                line_of(text, &format!("\"{}\"", name)),
                format!("{}: {}", name, argv.join(" ")),
            ))
        })
        .collect()
}
