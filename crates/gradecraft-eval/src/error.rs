//! Runtime error types for the interpreter.

use std::fmt;
use thiserror::Error;

use crate::value::Value;

/// A Python exception that escaped to the host.
#[derive(Debug, Clone)]
pub struct PyException {
    /// The exception's class name, e.g. `ZeroDivisionError`.
    pub type_name: String,
    /// `str()` of the exception; empty when it was raised without arguments.
    pub message: String,
    /// Line of the innermost statement the exception passed through.
    pub line: Option<u32>,
    /// The exception instance itself.
    pub value: Value,
}

impl PyException {
    /// `Type: message (line N)`, the form used in grading feedback.
    pub fn describe(&self) -> String {
        match self.line {
            Some(line) => format!("{self} (line {line})"),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for PyException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)
        } else {
            write!(f, "{}: {}", self.type_name, self.message)
        }
    }
}

/// Evaluation error: a raised exception, cancellation, or a control-flow
/// signal unwinding to the construct that handles it.
#[derive(Debug, Error)]
pub enum EvalError {
    /// An uncaught Python exception.
    #[error("{0}")]
    Exception(Box<PyException>),
    /// The cancellation token tripped. Not catchable by submission code.
    #[error("execution cancelled")]
    Cancelled,
    /// `return` (used internally for control flow)
    #[error("'return' outside function")]
    Return(Value),
    /// `break` (used internally for control flow)
    #[error("'break' outside loop")]
    Break,
    /// `continue` (used internally for control flow)
    #[error("'continue' not properly in loop")]
    Continue,
}

impl EvalError {
    /// The exception, when this error is one.
    pub fn exception(&self) -> Option<&PyException> {
        match self {
            EvalError::Exception(exc) => Some(exc),
            _ => None,
        }
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
