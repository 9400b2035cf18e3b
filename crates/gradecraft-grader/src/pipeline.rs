//! The grading pass: validate → filter → inspect → execute → extract.

use gradecraft_eval::{Dict, Value};
use gradecraft_sandbox::{
    calls, defines, extract, filter, has_arity, parse, render_feedback, returns, Executor,
    FilteredModule, Namespace, SandboxError,
};
use tracing::{info, warn};

use crate::certification::check_certification;
use crate::config::{AssignmentConfig, Criterion};
use crate::report::{ExecutionOutcome, GradeReport, Verdict};

/// Stack for the grading thread. Interpreted recursion is capped well below
/// what this holds.
pub const GRADER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Detail attached to every criterion of a submission that does not parse.
pub const SYNTAX_FAILURE: &str = "Submission has syntax errors.";

/// Grades submissions against one assignment.
#[derive(Debug, Clone)]
pub struct Grader {
    config: AssignmentConfig,
}

impl Grader {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Grade one submission.
    ///
    /// The pass runs on its own thread with a large stack; interpreter
    /// state never leaves it. Every failure, including a crashed worker,
    /// is reported as failed verdicts.
    pub fn grade(&self, submission: &str, last_name: Option<&str>) -> GradeReport {
        let config = self.config.clone();
        let text = submission.to_string();
        let name = last_name.map(str::to_string);
        let worker = std::thread::Builder::new()
            .name("gradecraft-grader".into())
            .stack_size(GRADER_STACK_SIZE)
            .spawn(move || grade_submission(&config, &text, name.as_deref()));

        let failure = match worker {
            Ok(handle) => match handle.join() {
                Ok(report) => return report,
                Err(_) => "grading worker panicked".to_string(),
            },
            Err(err) => format!("could not start grading worker: {err}"),
        };
        warn!(assignment = %self.config.name, reason = %failure, "grading pass aborted");
        let mut report = GradeReport::new(&self.config.name, submission);
        report.execution = ExecutionOutcome::Faulted(failure.clone());
        fail_all(&self.config, &mut report, &failure);
        report.callouts = check_certification(submission, last_name);
        report
    }
}

/// Run the whole pass on the current thread. Submission code itself runs on
/// the executor's own large-stack thread.
pub fn grade_submission(
    config: &AssignmentConfig,
    submission: &str,
    last_name: Option<&str>,
) -> GradeReport {
    let mut report = GradeReport::new(&config.name, submission);
    run_stages(config, submission, &mut report);
    report.callouts = check_certification(submission, last_name);
    info!(
        assignment = %config.name,
        passed = report.passed(),
        total = report.total(),
        callouts = report.callouts.len(),
        execution = ?report.execution,
        "grading pass finished"
    );
    report
}

fn run_stages(config: &AssignmentConfig, submission: &str, report: &mut GradeReport) {
    let module = match parse(submission) {
        Ok(module) => module,
        Err(SandboxError::Syntax(diagnostics)) => {
            report.syntax_feedback = render_feedback(submission, &diagnostics);
            report.diagnostics = diagnostics;
            fail_all(config, report, SYNTAX_FAILURE);
            return;
        }
        Err(err) => {
            fail_all(config, report, &err.to_string());
            return;
        }
    };

    let filtered = match filter(&module, &config.allow_list()) {
        Ok(filtered) => filtered,
        Err(err) => {
            if let SandboxError::ImportViolation { module } = &err {
                report.import_violation = Some(module.clone());
            }
            fail_all(config, report, &err.to_string());
            return;
        }
    };

    let mut verdicts: Vec<Option<Verdict>> = config
        .criteria
        .iter()
        .map(|criterion| criterion.is_structural().then(|| inspect(&filtered, criterion)))
        .collect();

    let executor = config.executor();
    let mut namespace = match executor.execute(&filtered) {
        Ok(namespace) => {
            report.execution = ExecutionOutcome::Completed;
            Some(namespace)
        }
        Err(SandboxError::Timeout(message)) => {
            report.execution = ExecutionOutcome::TimedOut(message);
            None
        }
        Err(err) => {
            let message = match err {
                SandboxError::RuntimeFault(description) => description,
                other => other.to_string(),
            };
            report.execution = ExecutionOutcome::Faulted(message);
            None
        }
    };

    for (slot, criterion) in verdicts.iter_mut().zip(&config.criteria) {
        if slot.is_some() {
            continue;
        }
        *slot = Some(match (namespace.as_mut(), report.execution.failure()) {
            (Some(namespace), _) => run_criterion(&executor, namespace, criterion),
            (None, failure) => Verdict::fail(
                criterion.label(),
                criterion.function(),
                failure.unwrap_or("Submission was not executed."),
            ),
        });
    }
    report.verdicts = verdicts.into_iter().flatten().collect();
}

fn fail_all(config: &AssignmentConfig, report: &mut GradeReport, detail: &str) {
    report.verdicts = config
        .criteria
        .iter()
        .map(|criterion| Verdict::fail(criterion.label(), criterion.function(), detail))
        .collect();
}

// ══════════════════════════════════════════════════════════════════════════════
// Criteria
// ══════════════════════════════════════════════════════════════════════════════

fn inspect(tree: &FilteredModule, criterion: &Criterion) -> Verdict {
    let label = criterion.label();
    let function = criterion.function();
    if !defines(tree, function) {
        return Verdict::fail(label, function, format!("Function '{function}' not found."));
    }
    let failure = match criterion {
        Criterion::Arity { params, .. } if !has_arity(tree, function, *params) => {
            Some(format!("`{function}` should take {params} parameter(s)."))
        }
        Criterion::Calls { callee, .. } if !calls(tree, function, callee) => {
            Some(format!("`{function}` does not call `{callee}`."))
        }
        Criterion::Returns { .. } if !returns(tree, function) => {
            Some(format!("`{function}` has no return statement."))
        }
        _ => None,
    };
    match failure {
        Some(detail) => Verdict::fail(label, function, detail),
        None => Verdict::pass(label, function),
    }
}

fn run_criterion(executor: &Executor, namespace: &mut Namespace, criterion: &Criterion) -> Verdict {
    let label = criterion.label();
    let function = criterion.function();
    let callable = match extract(namespace, function) {
        Ok(callable) => callable,
        Err(err) => return Verdict::fail(label, function, err.to_string()),
    };

    match criterion {
        Criterion::CallResult {
            args,
            expected,
            tolerance,
            ..
        } => {
            let args = match to_values(args) {
                Ok(args) => args,
                Err(err) => return Verdict::fail(label, function, err),
            };
            let actual = match executor.call(namespace, &callable, args) {
                Ok(actual) => actual,
                Err(err) => return Verdict::fail(label, function, err.to_string()),
            };
            if matches_expected(&actual, expected, tolerance.unwrap_or(0.0)) {
                Verdict::pass(label, function)
            } else {
                let shown = executor
                    .repr(namespace, &actual)
                    .unwrap_or_else(|err| err.to_string());
                Verdict::fail(label, function, format!("Expected {expected}, got {shown}"))
            }
        }
        Criterion::PrintedOutput { args, expected, .. } => {
            let args = match to_values(args) {
                Ok(args) => args,
                Err(err) => return Verdict::fail(label, function, err),
            };
            namespace.take_output();
            if let Err(err) = executor.call(namespace, &callable, args) {
                return Verdict::fail(label, function, err.to_string());
            }
            let printed = namespace.take_output();
            if printed.trim_end() == expected.trim_end() {
                Verdict::pass(label, function)
            } else {
                Verdict::fail(
                    label,
                    function,
                    format!("Expected output:\n{expected}\nActual output:\n{printed}"),
                )
            }
        }
        _ => Verdict::pass(label, function),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// JSON literals
// ══════════════════════════════════════════════════════════════════════════════

fn to_values(args: &[serde_json::Value]) -> Result<Vec<Value>, String> {
    args.iter().map(to_value).collect()
}

/// Convert a JSON literal into an interpreter value. Arrays become lists and
/// objects become dicts with string keys.
fn to_value(json: &serde_json::Value) -> Result<Value, String> {
    Ok(match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::list(to_values(items)?),
        serde_json::Value::Object(fields) => {
            let mut dict = Dict::new();
            for (key, value) in fields {
                dict.insert(Value::str(key), to_value(value)?)?;
            }
            Value::dict(dict)
        }
    })
}

/// Compare a returned value with a JSON literal the way `==` would, with an
/// absolute `tolerance` for numbers. Arrays match lists and tuples.
fn matches_expected(actual: &Value, expected: &serde_json::Value, tolerance: f64) -> bool {
    match expected {
        serde_json::Value::Null => matches!(actual, Value::None),
        serde_json::Value::Bool(b) => numbers_match(actual, Some(*b as i64), *b as i64 as f64, tolerance),
        serde_json::Value::Number(n) => {
            numbers_match(actual, n.as_i64(), n.as_f64().unwrap_or(f64::NAN), tolerance)
        }
        serde_json::Value::String(s) => actual.as_str() == Some(s.as_str()),
        serde_json::Value::Array(items) => match actual {
            Value::List(list) => all_match(&list.borrow(), items, tolerance),
            Value::Tuple(tuple) => all_match(tuple, items, tolerance),
            _ => false,
        },
        serde_json::Value::Object(fields) => match actual {
            Value::Dict(dict) => {
                let dict = dict.borrow();
                dict.len() == fields.len()
                    && fields.iter().all(|(key, value)| match dict.get(&Value::str(key)) {
                        Ok(Some(found)) => matches_expected(&found, value, tolerance),
                        _ => false,
                    })
            }
            _ => false,
        },
    }
}

fn all_match(actual: &[Value], expected: &[serde_json::Value], tolerance: f64) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| matches_expected(a, e, tolerance))
}

fn numbers_match(actual: &Value, exact: Option<i64>, approx: f64, tolerance: f64) -> bool {
    match actual {
        Value::Int(_) | Value::Bool(_) if tolerance == 0.0 && exact.is_some() => actual.as_int() == exact,
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => actual
            .as_float()
            .is_some_and(|a| (a - approx).abs() <= tolerance),
        _ => false,
    }
}
