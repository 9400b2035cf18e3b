//! Grading results, serializable for storage and rendering.

use gradecraft_types::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::certification::Callout;

/// The result of checking one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Human-readable description of the criterion.
    pub criterion: String,
    pub function: String,
    pub passed: bool,
    /// Why the criterion failed, or what was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Verdict {
    pub fn pass(criterion: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            function: function.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(
        criterion: impl Into<String>,
        function: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            criterion: criterion.into(),
            function: function.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// How the execution stage went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// An earlier stage rejected the submission.
    Skipped,
    Completed,
    TimedOut(String),
    Faulted(String),
}

impl ExecutionOutcome {
    /// The message namespace-dependent criteria fail with, if execution did
    /// not complete.
    pub fn failure(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Completed | ExecutionOutcome::Skipped => None,
            ExecutionOutcome::TimedOut(message) | ExecutionOutcome::Faulted(message) => {
                Some(message)
            }
        }
    }
}

/// Everything learned about one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub assignment: String,
    /// Hex SHA-256 of the submission text.
    pub submission_sha256: String,
    pub diagnostics: Vec<Diagnostic>,
    /// Rendered syntax-error block; empty when the submission parses.
    pub syntax_feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_violation: Option<String>,
    pub execution: ExecutionOutcome,
    pub verdicts: Vec<Verdict>,
    pub callouts: Vec<Callout>,
}

impl GradeReport {
    pub(crate) fn new(assignment: &str, submission: &str) -> Self {
        Self {
            assignment: assignment.to_string(),
            submission_sha256: sha256_hex(submission.as_bytes()),
            diagnostics: Vec::new(),
            syntax_feedback: String::new(),
            import_violation: None,
            execution: ExecutionOutcome::Skipped,
            verdicts: Vec::new(),
            callouts: Vec::new(),
        }
    }

    pub fn passed(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed).count()
    }

    pub fn total(&self) -> usize {
        self.verdicts.len()
    }

    pub fn all_passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(hasher.finalize().as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ExecutionOutcome::TimedOut("Timeout".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "timed_out", "detail": "Timeout" }));
        let json = serde_json::to_value(ExecutionOutcome::Completed).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "completed" }));
    }

    #[test]
    fn counts_follow_verdicts() {
        let mut report = GradeReport::new("lab", "x = 1\n");
        report.verdicts.push(Verdict::pass("a", "f"));
        report.verdicts.push(Verdict::fail("b", "f", "nope"));
        assert_eq!((report.passed(), report.total()), (1, 2));
        assert!(!report.all_passed());

        let back: GradeReport = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
