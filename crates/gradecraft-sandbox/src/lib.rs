//! gradecraft sandbox: the controlled-execution and static-analysis stages a
//! submission passes through.
//!
//! ```text
//! source → validate → filter (allow-list) → execute (deadline) → extract
//!                              └────────→ inspect (no execution)
//! ```
//!
//! The sandbox is a safety net against accidental bad code: runaway loops,
//! unapproved imports and stray top-level side effects. It does not isolate
//! memory or filter system calls.

mod error;
mod executor;
mod extract;
mod filter;
mod inspect;
mod validator;
mod watchdog;

pub use error::SandboxError;
pub use executor::{
    execute, Executor, Namespace, DEFAULT_TIMEOUT_MESSAGE, EXECUTION_STACK_SIZE, MODULE_NAME,
};
pub use extract::{extract, Callable};
pub use filter::{filter, AllowList, FilteredModule};
pub use inspect::{calls, defines, has_arity, returns};
pub use validator::{is_valid, parse, render_feedback, validate, CARET_MARGIN, SUBMISSION_NAME};

pub use gradecraft_eval::{Limits, Value};
pub use gradecraft_types::Diagnostic;
