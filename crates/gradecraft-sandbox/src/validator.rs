//! Syntax validation and the feedback block shown to students.

use std::fmt::Write as _;

use gradecraft_parser::{parse_source, ParseResult};
use gradecraft_types::ast::Module;
use gradecraft_types::{Diagnostic, SourceFile};
use tracing::debug;

use crate::executor::on_execution_stack;
use crate::SandboxError;

/// Spaces added to a diagnostic's column so the caret lines up under the
/// source text, which is indented by the line-number gutter.
pub const CARET_MARGIN: usize = 4;

/// File name diagnostics are attributed to.
pub const SUBMISSION_NAME: &str = "main.py";

/// All syntax diagnostics for `source`, in source order. Never executes code.
pub fn validate(source: &str) -> Vec<Diagnostic> {
    let diagnostics = parse_submission(source).errors.into_sorted();
    debug!(diagnostics = diagnostics.len(), "validated submission");
    diagnostics
}

pub fn is_valid(source: &str) -> bool {
    parse_submission(source).module.is_some()
}

/// Parse `source`, failing with every diagnostic when it is malformed.
pub fn parse(source: &str) -> Result<Module, SandboxError> {
    let result = parse_submission(source);
    match result.module {
        Some(module) => {
            debug!(diagnostics = 0, statements = module.body.len(), "parsed submission");
            Ok(module)
        }
        None => {
            let diagnostics = result.errors.into_sorted();
            debug!(diagnostics = diagnostics.len(), "submission rejected by parser");
            Err(SandboxError::Syntax(diagnostics))
        }
    }
}

/// Deeply nested expressions recurse through every precedence level, so
/// parsing gets the execution stack too.
fn parse_submission(source: &str) -> ParseResult {
    let sf = SourceFile::new(SUBMISSION_NAME, source);
    on_execution_stack(|| parse_source(&sf)).unwrap_or_else(|_| parse_source(&sf))
}

/// Render the `Syntax Errors:` block: each offending line behind a
/// right-aligned line number, followed by a caret under the error column.
///
/// Returns an empty string when there is nothing to report.
pub fn render_feedback(source: &str, diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }
    let sf = SourceFile::new(SUBMISSION_NAME, source);
    let mut out = String::from("Syntax Errors:\n\n");
    for diagnostic in diagnostics {
        let line = diagnostic.line();
        let text = sf.line(line).unwrap_or(diagnostic.source_line.as_str());
        let _ = writeln!(out, "{line:>3} {text} ## {}", diagnostic.message);
        let indent = diagnostic.column() as usize + CARET_MARGIN;
        let _ = writeln!(out, "{}^", " ".repeat(indent));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_has_no_diagnostics() {
        let source = "def add(a, b):\n    return a + b\n";
        assert!(validate(source).is_empty());
        assert!(is_valid(source));
        assert!(parse(source).is_ok());
    }

    #[test]
    fn invalid_source_reports_its_line() {
        let source = "x = 1\ndef broken(:\n    pass\n";
        let diagnostics = validate(source);
        assert!(!diagnostics.is_empty());
        assert_eq!(diagnostics[0].line(), 2);
        assert!(!is_valid(source));
        assert!(matches!(parse(source), Err(SandboxError::Syntax(d)) if d == diagnostics));
    }

    #[test]
    fn mixed_tab_and_space_indentation_is_rejected() {
        let diagnostics = validate("if x:\n\tpass\n        pass\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "inconsistent use of tabs and spaces in indentation"
        );
        assert_eq!(diagnostics[0].line(), 3);
    }

    #[test]
    fn feedback_puts_the_caret_under_the_column() {
        let source = "x = 1\ny = )\n";
        let diagnostics = validate(source);
        let feedback = render_feedback(source, &diagnostics);
        let mut lines = feedback.lines();
        assert_eq!(lines.next(), Some("Syntax Errors:"));
        assert_eq!(lines.next(), Some(""));
        let reported = lines.next().unwrap_or_default();
        assert!(reported.starts_with("  2 y = ) ## "), "{reported}");
        let caret = lines.next().unwrap_or_default();
        let column = diagnostics[0].column() as usize;
        assert_eq!(caret, format!("{}^", " ".repeat(column + CARET_MARGIN)));
    }

    #[test]
    fn no_diagnostics_renders_nothing() {
        assert_eq!(render_feedback("x = 1\n", &[]), "");
    }
}
