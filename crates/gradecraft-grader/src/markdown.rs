//! Quarto-flavoured markdown for a [`GradeReport`].

use std::fmt::Write as _;

use crate::certification::{Callout, Severity};
use crate::report::{ExecutionOutcome, GradeReport};

/// A fenced callout block, e.g. `::: {.callout-important}`.
pub fn callout(severity: Severity, message: &str) -> String {
    let kind = match severity {
        Severity::Important => "important",
        Severity::Warning => "warning",
    };
    format!("\n::: {{.callout-{kind}}}\n{message}\n:::\n")
}

pub fn callouts(items: &[Callout]) -> String {
    items
        .iter()
        .map(|c| callout(c.severity, &c.message))
        .collect()
}

/// A fenced code block with an optional language class.
pub fn code_block(code: &str, language: &str) -> String {
    format!("\n```{{.{language}}}\n{code}\n```\n")
}

/// Render the whole report: callouts first, then syntax feedback, execution
/// problems and one line per criterion.
pub fn render(report: &GradeReport) -> String {
    let mut out = format!("\n# {}\n", report.assignment);
    out.push_str(&callouts(&report.callouts));

    if !report.syntax_feedback.is_empty() {
        out.push_str(&code_block(report.syntax_feedback.trim_end(), "default"));
    }
    if let Some(module) = &report.import_violation {
        out.push_str(&callout(
            Severity::Important,
            &format!("Attempted to import {module}"),
        ));
    }
    match &report.execution {
        ExecutionOutcome::TimedOut(message) | ExecutionOutcome::Faulted(message) => {
            out.push_str(&callout(
                Severity::Important,
                &format!("Error:\n```\n{message}\n```"),
            ));
        }
        ExecutionOutcome::Skipped | ExecutionOutcome::Completed => {}
    }

    let _ = writeln!(out, "\n## Criteria ({}/{})\n", report.passed(), report.total());
    for verdict in &report.verdicts {
        let mark = if verdict.passed { "x" } else { " " };
        let _ = write!(out, "- [{mark}] {}", verdict.criterion);
        match &verdict.detail {
            Some(detail) if !verdict.passed => {
                let _ = writeln!(out, ": {}", detail.replace('\n', "\n  "));
            }
            _ => out.push('\n'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Verdict;

    #[test]
    fn callout_uses_severity_class() {
        assert_eq!(
            callout(Severity::Warning, "Check this."),
            "\n::: {.callout-warning}\nCheck this.\n:::\n"
        );
    }

    #[test]
    fn report_lists_every_verdict() {
        let mut report = GradeReport::new("lab-1", "x = 1\n");
        report.execution = ExecutionOutcome::Completed;
        report.verdicts = vec![
            Verdict::pass("`f` is defined", "f"),
            Verdict::fail("`f` returns a value", "f", "`f` has no return statement."),
        ];
        let md = render(&report);
        assert!(md.contains("# lab-1"));
        assert!(md.contains("## Criteria (1/2)"));
        assert!(md.contains("- [x] `f` is defined\n"));
        assert!(md.contains("- [ ] `f` returns a value: `f` has no return statement.\n"));
        assert!(!md.contains("callout"));
    }
}
