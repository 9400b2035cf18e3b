//! gradecraft tree-walking interpreter.
//!
//! Runs the Python subset accepted by `gradecraft-parser` directly from the
//! syntax tree. An [`Evaluator`] owns one global namespace, a print buffer,
//! resource [`Limits`] and a [`CancelToken`] it polls at every statement and
//! expression, so a watchdog on another thread can stop a runaway submission.
//!
//! Values are reference counted and single-threaded; callers that need to
//! send results across threads render them first.

mod builtins;
mod call;
mod cancel;
mod env;
mod error;
mod evaluator;
mod exceptions;
mod expr;
mod format;
mod methods;
mod modules;
mod ops;
mod render;
mod value;

pub use cancel::CancelToken;
pub use error::{EvalError, EvalResult, PyException};
pub use evaluator::{builtin_names, Evaluator, Limits};
pub use modules::NATIVE_MODULES;
pub use value::{py_eq, Dict, Value};
