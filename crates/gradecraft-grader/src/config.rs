//! Assignment configuration, loaded from TOML.
//!
//! ```toml
//! name = "lab-3"
//! allowed_imports = ["math"]
//! deadline_secs = 2
//!
//! [[criteria]]
//! kind = "arity"
//! function = "area"
//! params = 1
//!
//! [[criteria]]
//! kind = "call_result"
//! function = "area"
//! args = [2]
//! expected = 12.566370614359172
//! tolerance = 1e-9
//! ```

use std::path::Path;
use std::time::Duration;

use gradecraft_sandbox::{AllowList, Executor, DEFAULT_TIMEOUT_MESSAGE};
use serde::{Deserialize, Serialize};

use crate::GradeError;

fn default_deadline_secs() -> f64 {
    1.0
}

fn default_timeout_message() -> String {
    DEFAULT_TIMEOUT_MESSAGE.to_string()
}

/// Everything needed to grade submissions for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    pub name: String,
    #[serde(default)]
    pub allowed_imports: Vec<String>,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: f64,
    #[serde(default = "default_timeout_message")]
    pub timeout_message: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl AssignmentConfig {
    /// A config with default limits and no criteria.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed_imports: Vec::new(),
            deadline_secs: default_deadline_secs(),
            timeout_message: default_timeout_message(),
            criteria: Vec::new(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, GradeError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GradeError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| GradeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), GradeError> {
        if !self.deadline_secs.is_finite() || self.deadline_secs < 0.0 {
            return Err(GradeError::Invalid(format!(
                "deadline_secs must be a non-negative number of seconds, got {}",
                self.deadline_secs
            )));
        }
        for criterion in &self.criteria {
            if let Criterion::CallResult {
                tolerance: Some(tolerance),
                ..
            } = criterion
            {
                if !tolerance.is_finite() || *tolerance < 0.0 {
                    return Err(GradeError::Invalid(format!(
                        "tolerance for `{}` must be a non-negative number, got {tolerance}",
                        criterion.function()
                    )));
                }
            }
        }
        Ok(())
    }

    /// The execution deadline. Values that cannot be represented collapse to
    /// zero, which times out immediately.
    pub fn deadline(&self) -> Duration {
        Duration::try_from_secs_f64(self.deadline_secs).unwrap_or(Duration::ZERO)
    }

    pub fn allow_list(&self) -> AllowList {
        self.allowed_imports.iter().collect()
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.deadline()).with_timeout_message(self.timeout_message.clone())
    }
}

/// One grading predicate, tagged by `kind` in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// The function is defined and callable after execution.
    FunctionExists { function: String },
    /// The first top-level definition takes exactly `params` positional
    /// parameters.
    Arity { function: String, params: usize },
    /// The function calls `callee` by bare name somewhere in its body.
    Calls { function: String, callee: String },
    /// The function contains a `return` statement.
    Returns { function: String },
    /// Calling the function with `args` returns `expected`.
    CallResult {
        function: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        expected: serde_json::Value,
        /// Absolute tolerance for numeric comparisons.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tolerance: Option<f64>,
    },
    /// Calling the function with `args` prints `expected`. Trailing
    /// whitespace is ignored on both sides.
    PrintedOutput {
        function: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        expected: String,
    },
}

impl Criterion {
    /// The function the criterion is about.
    pub fn function(&self) -> &str {
        match self {
            Criterion::FunctionExists { function }
            | Criterion::Arity { function, .. }
            | Criterion::Calls { function, .. }
            | Criterion::Returns { function }
            | Criterion::CallResult { function, .. }
            | Criterion::PrintedOutput { function, .. } => function,
        }
    }

    /// Whether the criterion is answered from the syntax tree alone.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Criterion::Arity { .. } | Criterion::Calls { .. } | Criterion::Returns { .. }
        )
    }

    /// Short human-readable description, used as the verdict label.
    pub fn label(&self) -> String {
        match self {
            Criterion::FunctionExists { function } => format!("`{function}` is defined"),
            Criterion::Arity { function, params } => {
                format!("`{function}` takes {params} parameter(s)")
            }
            Criterion::Calls { function, callee } => format!("`{function}` calls `{callee}`"),
            Criterion::Returns { function } => format!("`{function}` returns a value"),
            Criterion::CallResult { function, args, .. } => {
                format!("`{function}({})` result", render_args(args))
            }
            Criterion::PrintedOutput { function, args, .. } => {
                format!("`{function}({})` output", render_args(args))
            }
        }
    }
}

fn render_args(args: &[serde_json::Value]) -> String {
    args.iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_omitted_fields() {
        let config = AssignmentConfig::from_toml_str("name = \"lab\"\n").unwrap();
        assert_eq!(config, AssignmentConfig::new("lab"));
        assert_eq!(config.deadline(), Duration::from_secs(1));
        assert_eq!(config.timeout_message, "Timeout");
        assert!(config.allow_list().is_empty());
    }

    #[test]
    fn criteria_are_tagged_by_kind() {
        let config = AssignmentConfig::from_toml_str(
            r#"
name = "lab-3"
allowed_imports = ["math"]
deadline_secs = 0.5
timeout_message = "Too slow"

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
callee = "area"

[[criteria]]
kind = "returns"
function = "area"

[[criteria]]
kind = "call_result"
function = "pair"
args = [1, "two", [3.5, true]]
expected = { a = 1 }
tolerance = 0.001

[[criteria]]
kind = "printed_output"
function = "main"
expected = "hello\n"
"#,
        )
        .unwrap();
        assert_eq!(config.deadline(), Duration::from_millis(500));
        assert_eq!(config.timeout_message, "Too slow");
        assert!(config.allow_list().contains("math"));
        assert_eq!(config.criteria.len(), 6);
        assert_eq!(
            config.criteria[1],
            Criterion::Arity {
                function: "area".into(),
                params: 1
            }
        );
        assert_eq!(
            config.criteria[4],
            Criterion::CallResult {
                function: "pair".into(),
                args: vec![
                    serde_json::json!(1),
                    serde_json::json!("two"),
                    serde_json::json!([3.5, true]),
                ],
                expected: serde_json::json!({ "a": 1 }),
                tolerance: Some(0.001),
            }
        );
        assert_eq!(config.criteria[4].label(), "`pair(1, \"two\", [3.5,true])` result");
        assert!(config.criteria[2].is_structural());
        assert!(!config.criteria[5].is_structural());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = AssignmentConfig::from_toml_str(
            "name = \"x\"\n[[criteria]]\nkind = \"vibes\"\nfunction = \"f\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, GradeError::Toml(_)));
    }

    #[test]
    fn negative_deadline_is_rejected() {
        let err = AssignmentConfig::from_toml_str("name = \"x\"\ndeadline_secs = -1\n").unwrap_err();
        assert!(err.to_string().contains("deadline_secs"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = AssignmentConfig::from_path("/nonexistent/gradecraft.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gradecraft.toml"));
    }
}
