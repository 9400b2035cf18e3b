//! Academic-integrity statement checks.
//!
//! A submission must contain exactly one of two fixed certification
//! statements and end with a signature line that contains the student's
//! last name.

use serde::{Deserialize, Serialize};

/// Statement for work that used documented sources.
pub const CERTIFICATION_ASSISTANCE: &str = "I CERTIFY THAT I HAVE COMPLETELY DOCUMENTED ALL SOURCES THAT I USED TO COMPLETE THIS ASSIGNMENT";

/// Statement for work done without outside sources.
pub const CERTIFICATION_NO_ASSISTANCE: &str = "I CERTIFY THAT I DID NOT USE ANY SOURCES OR RECEIVE ANY ASSISTANCE REQUIRING DOCUMENTATION WHILE COMPLETING THIS ASSIGNMENT";

const CERTIFICATION_MARKER: &str = "I CERTIFY THAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Important,
    Warning,
}

/// A remark attached to a report, rendered as a callout box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callout {
    pub severity: Severity,
    pub message: String,
}

impl Callout {
    pub fn important(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Important,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Check the certification statement and signature in `contents`.
///
/// Returns no callouts for a compliant submission. A missing statement is
/// reported on its own; the other checks only run when some statement is
/// present. The signature check is skipped when `last_name` is `None` or
/// empty.
pub fn check_certification(contents: &str, last_name: Option<&str>) -> Vec<Callout> {
    let mut callouts = Vec::new();

    if !contents.lines().any(|line| line.contains(CERTIFICATION_MARKER)) {
        callouts.push(Callout::important("Missing certification statement."));
        return callouts;
    }

    let assisted = contents.contains(CERTIFICATION_ASSISTANCE);
    let unassisted = contents.contains(CERTIFICATION_NO_ASSISTANCE);
    if assisted && unassisted {
        callouts.push(Callout::important("Found both certification statements."));
    } else if !assisted && !unassisted {
        callouts.push(Callout::important("Certification statement has been modified."));
    }

    if let Some(expected) = last_name.filter(|name| !name.is_empty()) {
        let signature = signature(contents);
        if !signature.contains(&expected.to_lowercase()) {
            callouts.push(Callout::important(format!(
                "Last name not found in signature. Expected: `{expected}`, Found: `{signature}`"
            )));
        }
    }

    callouts
}

/// The last line, reduced to lowercase ASCII letters.
fn signature(contents: &str) -> String {
    contents
        .lines()
        .last()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(statement: &str, signature: &str) -> String {
        format!("def main():\n    pass\n\n# JD {statement}\n# {signature}\n")
    }

    #[test]
    fn compliant_submission_has_no_callouts() {
        let text = submission(CERTIFICATION_NO_ASSISTANCE, "Jane Doe");
        assert!(check_certification(&text, Some("Doe")).is_empty());
    }

    #[test]
    fn missing_statement_short_circuits() {
        let callouts = check_certification("print('hi')\n# Jane Doe\n", Some("Smith"));
        assert_eq!(callouts, vec![Callout::important("Missing certification statement.")]);
    }

    #[test]
    fn both_statements_are_flagged() {
        let text = format!(
            "# {CERTIFICATION_ASSISTANCE}\n# {CERTIFICATION_NO_ASSISTANCE}\n# Jane Doe\n"
        );
        let callouts = check_certification(&text, None);
        assert_eq!(callouts, vec![Callout::important("Found both certification statements.")]);
    }

    #[test]
    fn modified_statement_is_flagged() {
        let text = submission("I CERTIFY THAT I DID MY BEST", "Jane Doe");
        let callouts = check_certification(&text, None);
        assert_eq!(
            callouts,
            vec![Callout::important("Certification statement has been modified.")]
        );
    }

    #[test]
    fn signature_must_contain_last_name() {
        let text = submission(CERTIFICATION_ASSISTANCE, "J. O'Brien-Smith 2024");
        assert!(check_certification(&text, Some("OBrien")).is_empty());
        assert!(check_certification(&text, Some("")).is_empty());

        let callouts = check_certification(&text, Some("Doe"));
        assert_eq!(
            callouts,
            vec![Callout::important(
                "Last name not found in signature. Expected: `Doe`, Found: `jobriensmith`"
            )]
        );
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Callout::warning("x")).unwrap();
        assert_eq!(json, r#"{"severity":"warning","message":"x"}"#);
    }
}
