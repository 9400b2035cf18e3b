//! End-to-end grading passes: config → Grader::grade → GradeReport.

use gradecraft_grader::{
    markdown, AssignmentConfig, Callout, Criterion, ExecutionOutcome, GradeReport, Grader,
    CERTIFICATION_NO_ASSISTANCE, SYNTAX_FAILURE,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const LAB_CONFIG: &str = r#"
name = "lab-2"
allowed_imports = ["math"]

[[criteria]]
kind = "function_exists"
function = "main"

[[criteria]]
kind = "arity"
function = "area"
params = 1

[[criteria]]
kind = "calls"
function = "main"
callee = "describe"

[[criteria]]
kind = "returns"
function = "describe"

[[criteria]]
kind = "call_result"
function = "area"
args = [2]
expected = 12.566370614359172
tolerance = 1e-9

[[criteria]]
kind = "printed_output"
function = "describe"
args = [1]
expected = "area 3.14"

[[criteria]]
kind = "function_exists"
function = "missing"
"#;

fn lab_submission() -> String {
    format!(
        "\
import math

def area(r):
    return math.pi * r ** 2

def describe(r):
    print(\"area\", round(area(r), 2))

def main():
    describe(1)

main()

# JD {CERTIFICATION_NO_ASSISTANCE}
# Jane Doe
"
    )
}

fn grader(toml: &str) -> Grader {
    Grader::new(AssignmentConfig::from_toml_str(toml).expect("test config is valid"))
}

/// Config with the given limits and criteria.
fn config_with(deadline_secs: f64, criteria: Vec<Criterion>) -> AssignmentConfig {
    let mut config = AssignmentConfig::new("unit");
    config.deadline_secs = deadline_secs;
    config.criteria = criteria;
    config
}

fn exists(function: &str) -> Criterion {
    Criterion::FunctionExists {
        function: function.into(),
    }
}

fn call_result(function: &str, args: serde_json::Value, expected: serde_json::Value) -> Criterion {
    Criterion::CallResult {
        function: function.into(),
        args: args.as_array().cloned().unwrap_or_default(),
        expected,
        tolerance: None,
    }
}

fn details(report: &GradeReport) -> Vec<Option<&str>> {
    report.verdicts.iter().map(|v| v.detail.as_deref()).collect()
}

// ══════════════════════════════════════════════════════════════════════════════
// Full passes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn lab_submission_is_graded_per_criterion() {
    let report = grader(LAB_CONFIG).grade(&lab_submission(), Some("Doe"));

    assert_eq!(report.assignment, "lab-2");
    assert_eq!(report.execution, ExecutionOutcome::Completed);
    assert!(report.diagnostics.is_empty());
    assert!(report.syntax_feedback.is_empty());
    assert!(report.callouts.is_empty());
    assert_eq!(report.submission_sha256.len(), 64);

    let passed: Vec<bool> = report.verdicts.iter().map(|v| v.passed).collect();
    assert_eq!(passed, vec![true, true, true, false, true, true, false]);
    assert_eq!(
        report.verdicts[3].detail.as_deref(),
        Some("`describe` has no return statement.")
    );
    assert_eq!(
        report.verdicts[6].detail.as_deref(),
        Some("Function 'missing' not found.")
    );
    assert_eq!((report.passed(), report.total()), (5, 7));
}

#[test]
fn syntax_errors_fail_every_criterion() {
    let report = grader(LAB_CONFIG).grade("def area(r:\n    return r\n", None);

    assert!(!report.diagnostics.is_empty());
    assert!(report.syntax_feedback.starts_with("Syntax Errors:\n\n"));
    assert_eq!(report.execution, ExecutionOutcome::Skipped);
    assert_eq!(report.total(), 7);
    assert!(details(&report).iter().all(|d| *d == Some(SYNTAX_FAILURE)));
    assert_eq!(
        report.callouts,
        vec![Callout::important("Missing certification statement.")]
    );
}

#[test]
fn import_violation_fails_every_criterion_with_its_message() {
    let source = "import math\nimport os\nimport sys\ndef main():\n    return 1\n";
    let report = grader(LAB_CONFIG).grade(source, None);

    assert_eq!(report.import_violation.as_deref(), Some("os"));
    assert_eq!(report.execution, ExecutionOutcome::Skipped);
    assert!(details(&report)
        .iter()
        .all(|d| *d == Some("Attempted to import os")));
}

#[test]
fn timeout_fails_namespace_criteria_but_not_structural_ones() {
    let source = "def spin():\n    while True:\n        pass\n\nx = spin()\n";
    let config = config_with(
        0.2,
        vec![
            Criterion::Arity {
                function: "spin".into(),
                params: 0,
            },
            exists("spin"),
        ],
    );
    let report = Grader::new(config).grade(source, None);

    assert_eq!(report.execution, ExecutionOutcome::TimedOut("Timeout".into()));
    assert!(report.verdicts[0].passed);
    assert_eq!(report.verdicts[1].detail.as_deref(), Some("Timeout"));
}

#[test]
fn runtime_fault_is_recorded_with_type_and_line() {
    let source = "def f():\n    return 1\n\nx = 1 / 0\n";
    let report = Grader::new(config_with(1.0, vec![exists("f")])).grade(source, None);

    match &report.execution {
        ExecutionOutcome::Faulted(message) => {
            assert_eq!(message, "ZeroDivisionError: division by zero (line 4)")
        }
        other => panic!("expected a fault, got {other:?}"),
    }
    assert_eq!(
        report.verdicts[0].detail.as_deref(),
        Some("ZeroDivisionError: division by zero (line 4)")
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Call-based criteria
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn wrong_result_shows_expected_and_actual() {
    let source = "def add(a, b):\n    return a - b\n";
    let config = config_with(
        1.0,
        vec![call_result("add", serde_json::json!([2, 3]), serde_json::json!(5))],
    );
    let report = Grader::new(config).grade(source, None);
    assert_eq!(details(&report), vec![Some("Expected 5, got -1")]);
}

#[test]
fn tuples_and_dicts_compare_against_json() {
    let source = "\
def pair(a, b):
    return a, b

def tally(words):
    counts = {}
    for w in words:
        counts[w] = counts.get(w, 0) + 1
    return counts
";
    let config = config_with(
        1.0,
        vec![
            call_result("pair", serde_json::json!([1, "x"]), serde_json::json!([1, "x"])),
            call_result(
                "tally",
                serde_json::json!([["a", "b", "a"]]),
                serde_json::json!({ "a": 2, "b": 1 }),
            ),
        ],
    );
    let report = Grader::new(config).grade(source, None);
    assert!(report.all_passed(), "{:?}", report.verdicts);
}

#[test]
fn hanging_call_times_out_with_configured_message() {
    let source = "def solve(n):\n    while True:\n        n += 1\n";
    let mut config = config_with(
        0.2,
        vec![call_result("solve", serde_json::json!([1]), serde_json::json!(2))],
    );
    config.timeout_message = "Too slow".into();
    let report = Grader::new(config).grade(source, None);

    assert_eq!(report.execution, ExecutionOutcome::Completed);
    assert_eq!(details(&report), vec![Some("Too slow")]);
}

#[test]
fn deep_recursion_is_caught_not_crashed() {
    let source = "def depth(n):\n    return 0 if n == 0 else 1 + depth(n - 1)\n";
    let config = config_with(
        2.0,
        vec![
            call_result("depth", serde_json::json!([150]), serde_json::json!(150)),
            call_result("depth", serde_json::json!([100000]), serde_json::json!(100000)),
        ],
    );
    let report = Grader::new(config).grade(source, None);

    assert!(report.verdicts[0].passed);
    let detail = report.verdicts[1].detail.as_deref().unwrap_or_default();
    assert!(detail.starts_with("RecursionError"), "{detail}");
}

#[test]
fn module_level_output_is_not_attributed_to_calls() {
    let source = "print('loading')\ndef hello():\n    print('hi')\n";
    let config = config_with(
        1.0,
        vec![Criterion::PrintedOutput {
            function: "hello".into(),
            args: Vec::new(),
            expected: "hi".into(),
        }],
    );
    let report = Grader::new(config).grade(source, None);
    assert!(report.all_passed(), "{:?}", report.verdicts);
}

// ══════════════════════════════════════════════════════════════════════════════
// Certification, serialization, determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn wrong_signature_is_called_out() {
    let report = grader(LAB_CONFIG).grade(&lab_submission(), Some("Smith"));
    assert_eq!(
        report.callouts,
        vec![Callout::important(
            "Last name not found in signature. Expected: `Smith`, Found: `janedoe`"
        )]
    );
}

#[test]
fn report_round_trips_through_json() {
    let report = grader(LAB_CONFIG).grade("def broken(:\n", Some("Doe"));
    let json = report.to_json().unwrap();
    let back: GradeReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
    assert!(json.contains("\"submission_sha256\""));
}

#[test]
fn markdown_includes_feedback_and_callouts() {
    let report = grader(LAB_CONFIG).grade("def broken(:\n", None);
    let md = markdown::render(&report);
    assert!(md.contains("Syntax Errors:"));
    assert!(md.contains("::: {.callout-important}\nMissing certification statement.\n:::"));
    assert!(md.contains("## Criteria (0/7)"));
}

#[test]
fn grading_is_deterministic() {
    let grader = grader(LAB_CONFIG);
    let submission = lab_submission();
    let first = grader.grade(&submission, Some("Doe"));
    for _ in 0..3 {
        assert_eq!(grader.grade(&submission, Some("Doe")), first);
    }
}

#[test]
fn graders_run_independently_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let source = format!("def value():\n    return {i}\n");
                let config = config_with(
                    1.0,
                    vec![call_result("value", serde_json::json!([]), serde_json::json!(i))],
                );
                Grader::new(config).grade(&source, None).all_passed()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
}
