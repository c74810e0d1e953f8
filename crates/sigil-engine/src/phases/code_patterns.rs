//! Dangerous code constructs: dynamic evaluation, unsafe deserialization,
//! process spawning. Pure signature phase.

use super::PhaseDetector;
use crate::types::Phase;

pub static DETECTOR: PhaseDetector = PhaseDetector {
    phase: Phase::CodePatterns,
    probes: &[],
};

#[cfg(test)]
mod tests {
    use super::super::test_support::{rule_ids, run_builtin};
    use super::*;
    use crate::tree::TreeEntry;

    #[test]
    fn test_python_constructs() {
        let src = "import pickle, subprocess\ndata = pickle.loads(blob)\nsubprocess.run(cmd, shell=True)\n";
        let findings = run_builtin(Phase::CodePatterns, vec![TreeEntry::text("app.py", src)]);
        assert_eq!(rule_ids(&findings), vec!["CODE-003", "CODE-009", "CODE-011"]);
        assert_eq!(findings[1].line_number, Some(3));
    }

    #[test]
    fn test_language_scoping() {
        // exec( is only meaningful for Python sources.
        let findings = run_builtin(Phase::CodePatterns, vec![TreeEntry::text("notes.md", "call exec(x) here")]);
        assert!(findings.is_empty());
        let findings = run_builtin(
            Phase::CodePatterns,
            vec![TreeEntry::text("index.js", "const cp = require('child_process');\n")],
        );
        assert_eq!(rule_ids(&findings), vec!["CODE-006"]);
    }

    #[test]
    fn test_agent_permission_bypass_anywhere() {
        let findings = run_builtin(
            Phase::CodePatterns,
            vec![TreeEntry::text("run.sh", "claude --dangerously-skip-permissions -p go\n")],
        );
        assert_eq!(rule_ids(&findings), vec!["CODE-014"]);
    }
}
