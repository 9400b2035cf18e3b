//! Shared types for gradecraft.
//!
//! This crate defines the syntax tree for the supported Python subset,
//! source spans, and the diagnostics produced by the lexer and parser.

mod diagnostic;
mod span;
pub mod ast;

pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, MAX_DIAGNOSTICS};
pub use span::{SourceFile, Span};
