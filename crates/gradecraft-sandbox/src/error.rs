use gradecraft_types::Diagnostic;
use thiserror::Error;

/// Why one sandbox stage refused or failed a submission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    /// The source does not parse; execution is skipped.
    #[error("submission has {} syntax error(s)", .0.len())]
    Syntax(Vec<Diagnostic>),

    /// A top-level import names a module outside the allow-list.
    #[error("Attempted to import {module}")]
    ImportViolation { module: String },

    /// The deadline elapsed. Carries the configured message verbatim.
    #[error("{0}")]
    Timeout(String),

    /// The submission raised an uncaught exception: `Type: message (line N)`.
    #[error("{0}")]
    RuntimeFault(String),

    #[error("Function '{0}' not found.")]
    NotFound(String),

    #[error("Function '{0}' is not callable.")]
    NotCallable(String),
}
