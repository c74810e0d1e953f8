//! Built-in signature set, one list per phase.
//!
//! Patterns are case-sensitive unless they embed `(?i)`. Probe signatures name
//! a structural check implemented by the owning phase detector.

use super::signature::{FalsePositiveLikelihood as Fp, Signature};
use crate::types::{Phase, Severity};

const SCRIPT_LANGS: &[&str] = &["python", "javascript", "typescript", "ruby", "php", "perl"];
const JS_LANGS: &[&str] = &["javascript", "typescript"];

pub fn install_hook_signatures() -> Vec<Signature> {
    let p = Phase::InstallHooks;
    vec![
        Signature::new(
            "INSTALL-001",
            p,
            Severity::Critical,
            r"cmdclass\s*=\s*\{",
            "setup.py overrides cmdclass; custom code runs during install",
        )
        .for_languages(&["python"]),
        Signature::new(
            "INSTALL-002",
            p,
            Severity::Critical,
            r#""(?:preinstall|install|postinstall)"\s*:"#,
            "npm lifecycle script runs automatically on install",
        )
        .in_files(&["package.json"]),
        Signature::new(
            "INSTALL-003",
            p,
            Severity::High,
            r"\b(?:curl|wget)\s+[^|\n]*\|\s*(?:sudo\s+)?(?:sh|bash|zsh)\b",
            "Remote content piped straight into a shell",
        ),
        Signature::new(
            "INSTALL-004",
            p,
            Severity::Medium,
            r"^install\s*:",
            "Makefile install target",
        )
        .in_files(&["Makefile", "makefile", "GNUmakefile"])
        .weight(0.5)
        .likelihood(Fp::High),
        Signature::new(
            "INSTALL-005",
            p,
            Severity::High,
            r"^\[tool\.setuptools\.cmdclass\]",
            "pyproject.toml registers custom setuptools commands",
        )
        .in_files(&["pyproject.toml"]),
        Signature::new(
            "INSTALL-006",
            p,
            Severity::Critical,
            r"\bsubprocess\.|\bos\.(?:system|popen)\s*\(",
            "setup.py executes commands at install time",
        )
        .in_files(&["setup.py"])
        .weight(1.2),
        Signature::new(
            "INSTALL-007",
            p,
            Severity::High,
            r"^import\s",
            ".pth file executes code at interpreter startup",
        )
        .for_languages(&["pth"]),
        Signature::probe(
            "INSTALL-008",
            p,
            Severity::Critical,
            "npm-lifecycle-exec",
            "npm lifecycle script downloads or executes code",
        )
        .weight(1.5)
        .families(&["npm-install-dropper"]),
    ]
}

pub fn code_pattern_signatures() -> Vec<Signature> {
    let p = Phase::CodePatterns;
    vec![
        Signature::new("CODE-001", p, Severity::High, r"\beval\s*\(", "Dynamic code execution via eval()")
            .for_languages(SCRIPT_LANGS),
        Signature::new("CODE-002", p, Severity::High, r"\bexec\s*\(", "Dynamic code execution via exec()")
            .for_languages(&["python"]),
        Signature::new(
            "CODE-003",
            p,
            Severity::High,
            r"\bpickle\.(?:loads?|Unpickler)\s*\(",
            "Deserialization of untrusted data with pickle",
        )
        .for_languages(&["python"]),
        Signature::new("CODE-004", p, Severity::High, r"\bmarshal\.loads?\s*\(", "marshal deserialization")
            .for_languages(&["python"]),
        Signature::new(
            "CODE-005",
            p,
            Severity::Medium,
            r"\byaml\.(?:unsafe_)?load\s*\(",
            "yaml.load can construct arbitrary objects",
        )
        .for_languages(&["python"])
        .weight(0.5)
        .likelihood(Fp::Medium),
        Signature::new(
            "CODE-006",
            p,
            Severity::High,
            r#"require\(\s*['"](?:node:)?child_process['"]\s*\)|from\s+['"](?:node:)?child_process['"]"#,
            "child_process module imported",
        )
        .for_languages(JS_LANGS),
        Signature::new("CODE-007", p, Severity::High, r"\bnew\s+Function\s*\(", "Code constructed with new Function()")
            .for_languages(JS_LANGS),
        Signature::new(
            "CODE-008",
            p,
            Severity::Medium,
            r"__import__\s*\(|\bimportlib\.import_module\s*\(",
            "Dynamic module import",
        )
        .for_languages(&["python"])
        .weight(0.5),
        Signature::new(
            "CODE-009",
            p,
            Severity::Medium,
            r"\bsubprocess\.(?:Popen|call|run|check_output|check_call|getoutput)\s*\(",
            "Subprocess spawned",
        )
        .for_languages(&["python"]),
        Signature::new(
            "CODE-010",
            p,
            Severity::High,
            r"\bos\.(?:system|popen|execl|execlp|execv|execvp|execve|spawnl)\s*\(",
            "Shell command executed through os module",
        )
        .for_languages(&["python"]),
        Signature::new("CODE-011", p, Severity::High, r"\bshell\s*=\s*True\b", "Subprocess invoked with shell=True")
            .for_languages(&["python"]),
        Signature::new(
            "CODE-012",
            p,
            Severity::High,
            r#"\bcompile\s*\([^)]*['"]exec['"]"#,
            "Code object compiled for exec",
        )
        .for_languages(&["python"]),
        Signature::new(
            "CODE-013",
            p,
            Severity::Medium,
            r#"(?i)\b(?:auto[_-]?approve|skip[_-]?confirm(?:ation)?|no[_-]?confirm|yolo[_-]?mode)\b['"]?\s*[:=]\s*['"]?(?:true|1|yes)\b"#,
            "Auto-approve or skip-confirmation flag enabled",
        ),
        Signature::new(
            "CODE-014",
            p,
            Severity::High,
            r"--dangerously-skip-permissions\b",
            "Agent launched with permission checks disabled",
        ),
        Signature::new(
            "CODE-015",
            p,
            Severity::Medium,
            r"\b(?:execSync|spawnSync|execFileSync)\s*\(",
            "Synchronous child process execution",
        )
        .for_languages(JS_LANGS),
    ]
}

pub fn network_signatures() -> Vec<Signature> {
    let p = Phase::NetworkExfil;
    vec![
        Signature::new(
            "NET-001",
            p,
            Severity::Medium,
            r"\brequests\.(?:get|post|put|patch|delete|request)\s*\(",
            "Outbound HTTP request via requests",
        )
        .for_languages(&["python"]),
        Signature::new("NET-002", p, Severity::Medium, r"\burlopen\s*\(", "Outbound HTTP request via urllib")
            .for_languages(&["python"]),
        Signature::new(
            "NET-003",
            p,
            Severity::Medium,
            r#"\bfetch\s*\(\s*['"`]https?://"#,
            "Outbound HTTP request via fetch",
        )
        .for_languages(JS_LANGS),
        Signature::new(
            "NET-004",
            p,
            Severity::Medium,
            r"\baxios(?:\.(?:get|post|put|patch|request))?\s*\(",
            "Outbound HTTP request via axios",
        )
        .for_languages(JS_LANGS),
        Signature::new(
            "NET-005",
            p,
            Severity::High,
            r"discord(?:app)?\.com/api/webhooks|hooks\.slack\.com/services|webhook\.site",
            "Webhook endpoint commonly used for exfiltration",
        )
        .weight(1.5),
        Signature::new(
            "NET-006",
            p,
            Severity::High,
            r"(?i)\b[a-z0-9-]+\.(?:ngrok\.io|ngrok-free\.app|pipedream\.net|requestbin\.(?:com|net)|hookbin\.com|burpcollaborator\.net|interact\.sh|oast\.(?:fun|me|live|site))\b",
            "Tunnel or request-capture service",
        )
        .weight(1.5),
        Signature::new(
            "NET-007",
            p,
            Severity::Medium,
            r"\bsocket\.socket\s*\(|\bnet\.createConnection\s*\(|\bnew\s+net\.Socket\s*\(",
            "Raw socket connection",
        )
        .for_languages(&["python", "javascript", "typescript"]),
        Signature::new(
            "NET-008",
            p,
            Severity::Medium,
            r"\bdns\.(?:resolve\w*|lookup|query)\s*\(|\bgetaddrinfo\s*\(",
            "Programmatic DNS lookup (possible DNS exfiltration)",
        ),
        Signature::new(
            "NET-009",
            p,
            Severity::Medium,
            r#"\b(?:curl|wget)\s+(?:-{1,2}[A-Za-z-]+\s+)*['"]?https?://"#,
            "Command-line download",
        )
        .weight(0.5),
        Signature::new(
            "NET-010",
            p,
            Severity::Medium,
            r"https?://(?:\d{1,3}\.){3}\d{1,3}\b",
            "Hard-coded IP address endpoint",
        ),
        Signature::new(
            "NET-011",
            p,
            Severity::High,
            r"api\.telegram\.org/bot",
            "Telegram bot API used as a data sink",
        )
        .weight(1.5),
        Signature::new(
            "NET-012",
            p,
            Severity::Medium,
            r"\bhttpx\.(?:get|post|put|request|Client|AsyncClient)\s*\(",
            "Outbound HTTP request via httpx",
        )
        .for_languages(&["python"]),
    ]
}

pub fn credential_signatures() -> Vec<Signature> {
    let p = Phase::Credentials;
    vec![
        Signature::new(
            "CRED-001",
            p,
            Severity::High,
            r#"(?:os\.environ|os\.getenv|process\.env|ENV)\s*[\[.(]?\s*['"]?[A-Z0-9_]*(?:SECRET|TOKEN|PASSWORD|PASSWD|API_KEY|PRIVATE_KEY|AWS_)"#,
            "Secret read from environment variables",
        ),
        Signature::new("CRED-002", p, Severity::High, r"\.aws/credentials", "AWS credentials file path")
            .weight(1.5),
        Signature::new("CRED-003", p, Severity::Critical, r"\bAKIA[0-9A-Z]{16}\b", "Embedded AWS access key id")
            .weight(2.0),
        Signature::new(
            "CRED-004",
            p,
            Severity::High,
            r"\.ssh/(?:id_(?:rsa|dsa|ecdsa|ed25519)|authorized_keys|known_hosts)",
            "SSH key or config path",
        )
        .weight(1.5),
        Signature::new(
            "CRED-005",
            p,
            Severity::Critical,
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |ENCRYPTED )?PRIVATE KEY-----",
            "Embedded private key",
        )
        .weight(2.0),
        Signature::new(
            "CRED-006",
            p,
            Severity::High,
            r#"(?i)\b(?:api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|password)\b['"]?\s*[:=]\s*['"][A-Za-z0-9+/=_\-]{16,}['"]"#,
            "Hard-coded credential",
        )
        .likelihood(Fp::Medium),
        Signature::new(
            "CRED-007",
            p,
            Severity::High,
            r#""type"\s*:\s*"service_account""#,
            "GCP service account key",
        )
        .for_languages(&["json"])
        .weight(1.5),
        Signature::new("CRED-008", p, Severity::Critical, r"\bgh[pousr]_[A-Za-z0-9]{36}\b", "Embedded GitHub token")
            .weight(2.0),
        Signature::new(
            "CRED-009",
            p,
            Severity::High,
            r#"(?i)authorization['"]?\s*[:=]\s*['"]bearer\s+[A-Za-z0-9._\-]{20,}"#,
            "Hard-coded bearer token",
        ),
        Signature::new(
            "CRED-010",
            p,
            Severity::High,
            r"(?:^|/)(?:id_rsa|id_ed25519|\.netrc|\.pgpass|credentials\.json|\.pypirc)$|\.(?:pem|p12|pfx|key)$",
            "Credential file shipped in the tree",
        )
        .on_path(),
        Signature::new(
            "CRED-011",
            p,
            Severity::High,
            r"\.config/gcloud|\.kube/config|\.docker/config\.json|Library/Keychains|\.gnupg/|\.npmrc",
            "Reads a local credential store",
        ),
        Signature::new("CRED-012", p, Severity::Critical, r"\bxox[abprs]-[A-Za-z0-9-]{10,}", "Embedded Slack token")
            .weight(2.0),
    ]
}

pub fn obfuscation_signatures() -> Vec<Signature> {
    let p = Phase::Obfuscation;
    vec![
        Signature::new(
            "OBFUSC-001",
            p,
            Severity::Medium,
            r"\bbase64\.(?:b64decode|decodebytes|urlsafe_b64decode|b32decode)\s*\(",
            "Base64 decoding",
        )
        .for_languages(&["python"]),
        Signature::new("OBFUSC-002", p, Severity::Medium, r"\batob\s*\(", "Base64 decoding via atob()")
            .for_languages(JS_LANGS),
        Signature::new(
            "OBFUSC-003",
            p,
            Severity::Medium,
            r#"Buffer\.from\s*\([^)]*['"](?:base64|hex)['"]"#,
            "Buffer decoded from base64/hex",
        )
        .for_languages(JS_LANGS),
        Signature::new(
            "OBFUSC-004",
            p,
            Severity::Medium,
            r"String\.fromCharCode\s*\(",
            "String reconstructed from char codes",
        )
        .for_languages(JS_LANGS),
        Signature::new(
            "OBFUSC-005",
            p,
            Severity::High,
            r"(?:\bchr\s*\(\s*\d+\s*\)\s*\+\s*){3,}",
            "String reconstructed from chr() calls",
        )
        .for_languages(&["python"]),
        Signature::new("OBFUSC-006", p, Severity::High, r"(?:\\x[0-9a-fA-F]{2}){8,}", "Long hex escape sequence"),
        Signature::new(
            "OBFUSC-007",
            p,
            Severity::Medium,
            r"\[\s*(?:0x[0-9a-fA-F]{1,2}\s*,\s*){8,}",
            "Byte array literal",
        ),
        Signature::new("OBFUSC-008", p, Severity::Medium, r"(?:\\u[0-9a-fA-F]{4}){6,}", "Long unicode escape sequence"),
        Signature::new(
            "OBFUSC-009",
            p,
            Severity::High,
            r#"\bcodecs\.decode\s*\([^)]*['"](?:rot_?13|hex|base64)['"]"#,
            "codecs-based string decoding",
        )
        .for_languages(&["python"]),
        Signature::new(
            "OBFUSC-010",
            p,
            Severity::Medium,
            r"\b(?:zlib|gzip|lzma|bz2)\.decompress\s*\(",
            "Compressed payload unpacked at runtime",
        )
        .for_languages(&["python"])
        .weight(0.5),
        Signature::new("OBFUSC-011", p, Severity::Medium, r"\bbytes\.fromhex\s*\(", "Bytes decoded from hex")
            .for_languages(&["python"])
            .weight(0.5),
        Signature::new(
            "OBFUSC-012",
            p,
            Severity::Critical,
            r"\b(?:eval|exec)\s*\(\s*(?:base64\.\w*decode|atob|Buffer\.from|zlib\.decompress|bytes\.fromhex|codecs\.decode|unescape)",
            "Decoded payload executed directly",
        )
        .weight(2.0)
        .families(&["stage-loader"]),
        Signature::new(
            "OBFUSC-013",
            p,
            Severity::Medium,
            r#"\[::-1\]|\.split\(\s*['"]{2}\s*\)\s*\.reverse\(\)\s*\.join\("#,
            "Reversed string reconstruction",
        )
        .weight(0.5)
        .likelihood(Fp::High),
        Signature::probe(
            "OBFUSC-014",
            p,
            Severity::Medium,
            "high-entropy-line",
            "High-entropy line, likely an encoded payload",
        ),
    ]
}

pub fn provenance_signatures() -> Vec<Signature> {
    let p = Phase::Provenance;
    vec![
        Signature::probe("PROV-001", p, Severity::Low, "hidden-file", "Hidden file"),
        Signature::probe("PROV-002", p, Severity::Medium, "binary-artifact", "Compiled binary in source tree")
            .weight(2.0),
        Signature::probe(
            "PROV-003",
            p,
            Severity::High,
            "binary-content",
            "Binary content behind a source-file extension",
        )
        .weight(3.0),
        Signature::probe("PROV-004", p, Severity::Low, "unreadable-file", "File could not be read and was skipped"),
        Signature::probe("PROV-005", p, Severity::Low, "large-file", "Oversized file (5 MiB or more)"),
        Signature::probe("PROV-006", p, Severity::Low, "shallow-history", "Shallow git clone; history truncated"),
        Signature::probe(
            "PROV-007",
            p,
            Severity::Medium,
            "missing-history",
            "Package manifest without any version-control history",
        )
        .weight(2.0),
        Signature::probe(
            "PROV-008",
            p,
            Severity::Low,
            "single-author",
            "Entire history from one author in at most two commits",
        ),
        Signature::new(
            "PROV-009",
            p,
            Severity::High,
            r"(?i)backdoor|exploit|payload|reverse[_-]?shell|keylogger|stealer|trojan|rootkit|(?:^|/)c2[_-]|(?:^|/)rat[_-]",
            "Suspicious file name",
        )
        .on_path()
        .weight(3.0),
        Signature::new("PROV-010", p, Severity::Low, r"\.min\.(?:js|css)$", "Minified file, hard to audit").on_path(),
    ]
}

pub fn prompt_injection_signatures() -> Vec<Signature> {
    let p = Phase::PromptInjection;
    vec![
        Signature::new(
            "PROMPT-001",
            p,
            Severity::Critical,
            r"(?i)\b(?:ignore|disregard|forget|bypass|override)\s+(?:all\s+)?(?:of\s+)?(?:the\s+|your\s+)?(?:previous|prior|above|earlier|system|initial)\s+(?:instructions?|prompts?|rules?|guidelines?|directions?)",
            "Instruction override aimed at an AI agent",
        ),
        Signature::new(
            "PROMPT-002",
            p,
            Severity::Critical,
            r"(?i)\b(?:from now on,?|you are now|pretend (?:to be|you are)|act as if you are|roleplay as)\s+(?:an?\s+)?(?:unrestricted|unfiltered|jailbroken|uncensored|evil|developer mode)",
            "Role reassignment to escape restrictions",
        ),
        Signature::new(
            "PROMPT-003",
            p,
            Severity::High,
            r"(?i)</system>|</instructions>|<\|im_start\|>\s*system|END_SYSTEM_PROMPT|\[/?SYSTEM\]",
            "Delimiter injection to escape the system context",
        ),
        Signature::new(
            "PROMPT-004",
            p,
            Severity::Critical,
            r"(?i)\bDAN mode\b|\bdo anything now\b|\bdeveloper mode (?:enabled|on)\b|\bjailbreak(?:ed)? mode\b",
            "Known jailbreak phrase",
        ),
        Signature::new(
            "PROMPT-005",
            p,
            Severity::High,
            r"(?i)\b(?:reveal|print|output|repeat|show|leak)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+prompt|initial\s+instructions|hidden\s+instructions)",
            "System prompt exfiltration request",
        ),
        Signature::new(
            "PROMPT-006",
            p,
            Severity::High,
            r#"<tool_call>|<function_calls>|<invoke\s+name=|"tool_use"\s*:|<\|tool_call\|>"#,
            "Tool-call markup embedded in content",
        ),
        Signature::new(
            "PROMPT-007",
            p,
            Severity::Critical,
            r"(?i)\b(?:send|post|upload|forward|exfiltrate)\s+(?:all\s+|the\s+)?(?:conversation|chat history|credentials|api keys?|secrets|env(?:ironment)? variables)\s+to\b",
            "Instruction to send sensitive data elsewhere",
        ),
        Signature::new(
            "PROMPT-008",
            p,
            Severity::High,
            r"(?i)\bif (?:you are|you're) (?:an? )?(?:ai|llm|assistant|language model|coding agent|agent)\b",
            "Conditional trigger aimed at AI agents",
        ),
        Signature::new(
            "PROMPT-009",
            p,
            Severity::Medium,
            r"<!--[^>]*(?i:ignore|instruction|assistant|system prompt|you must)",
            "Instruction hidden in an HTML comment",
        ),
        Signature::new(
            "PROMPT-010",
            p,
            Severity::High,
            r"(?i)\b(?:run|execute|paste)\b[^\n]{0,40}\b(?:curl|wget)\s+[^|\n]+\|\s*(?:sh|bash)\b",
            "Documentation tells the reader to pipe a download into a shell",
        )
        .for_languages(&["markdown", "text"]),
        Signature::probe(
            "PROMPT-011",
            p,
            Severity::High,
            "invisible-unicode",
            "Invisible or bidi-override characters hiding text",
        ),
        Signature::new(
            "PROMPT-012",
            p,
            Severity::High,
            r"(?i)\b(?:do not|don't|never) (?:tell|inform|alert|notify) the user\b",
            "Instruction to hide actions from the user",
        ),
    ]
}

pub fn skill_security_signatures() -> Vec<Signature> {
    let p = Phase::SkillSecurity;
    vec![
        Signature::probe(
            "SKILL-001",
            p,
            Severity::High,
            "skill-tool-wildcard",
            "Skill grants unrestricted shell or wildcard tools",
        ),
        Signature::probe(
            "SKILL-002",
            p,
            Severity::Critical,
            "mcp-shell-server",
            "MCP server launched through a shell with -c",
        ),
        Signature::new(
            "SKILL-003",
            p,
            Severity::High,
            r#""permissions"\s*:\s*\[[^\]]*"(?i:all|sudo|root|admin|unrestricted|\*)""#,
            "Manifest requests blanket permissions",
        )
        .for_languages(&["json"]),
        Signature::new(
            "SKILL-004",
            p,
            Severity::Medium,
            r"(?i)^\s*(?:allowed-tools|tools)\s*:.*\b(?:Bash|Shell|Exec|Terminal)\b",
            "Skill declares a shell-capable tool",
        )
        .for_languages(&["markdown", "yaml"])
        .weight(0.5),
        Signature::new(
            "SKILL-005",
            p,
            Severity::High,
            r"(?i)\b(?:when|whenever|before|after)\s+(?:the user|you)\s+(?:runs?|calls?|uses?|invokes?)\s+(?:git|npm|pip|ssh|curl|docker)\b[^\n]{0,80}\b(?:instead|also|first|silently)\b",
            "Tool poisoning: redefines a common command's behaviour",
        ),
        Signature::new(
            "SKILL-006",
            p,
            Severity::Medium,
            r#"(?i)\brequires[_-]?elevated[_-]?permissions\b['"]?\s*:\s*true"#,
            "Skill requests elevated permissions",
        )
        .for_languages(&["markdown", "yaml", "json"]),
        Signature::new(
            "SKILL-007",
            p,
            Severity::Medium,
            r"\$\{?[A-Z0-9_]*(?:TOKEN|SECRET|API_KEY|PASSWORD)\}?",
            "Skill instructions reference secret environment variables",
        )
        .for_languages(&["markdown"]),
        Signature::new(
            "SKILL-008",
            p,
            Severity::Medium,
            r"[A-Za-z0-9+/]{120,}={0,2}",
            "Large base64 blob inside skill documentation",
        )
        .for_languages(&["markdown"]),
        Signature::new(
            "SKILL-009",
            p,
            Severity::High,
            r#""(?:defaultMode|permissionMode)"\s*:\s*"bypassPermissions"|"dangerouslyAllowAll"\s*:\s*true"#,
            "Agent settings bypass permission prompts",
        )
        .for_languages(&["json"]),
    ]
}

/// The full built-in set in phase declaration order.
pub fn builtin_signatures() -> Vec<Signature> {
    let mut all = install_hook_signatures();
    all.extend(code_pattern_signatures());
    all.extend(network_signatures());
    all.extend(credential_signatures());
    all.extend(obfuscation_signatures());
    all.extend(provenance_signatures());
    all.extend(prompt_injection_signatures());
    all.extend(skill_security_signatures());
    all
}
