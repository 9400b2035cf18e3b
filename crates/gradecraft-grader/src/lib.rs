//! gradecraft grader: grades student submissions against an assignment.
//!
//! ```text
//! AssignmentConfig (TOML) ─┐
//! submission ──────────────┴→ Grader::grade → GradeReport (serde) → markdown
//! ```
//!
//! A pass validates the submission, applies the import guard, answers
//! structural criteria from the syntax tree, executes the remainder under a
//! deadline, runs the call-based criteria and finally checks the
//! certification statement.

mod certification;
mod config;
mod error;
pub mod markdown;
mod pipeline;
mod report;

pub use certification::{
    check_certification, Callout, Severity, CERTIFICATION_ASSISTANCE, CERTIFICATION_NO_ASSISTANCE,
};
pub use config::{AssignmentConfig, Criterion};
pub use error::GradeError;
pub use pipeline::{grade_submission, Grader, GRADER_STACK_SIZE, SYNTAX_FAILURE};
pub use report::{ExecutionOutcome, GradeReport, Verdict};
