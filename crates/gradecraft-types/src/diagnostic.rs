use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics kept before the lexer and parser give up.
pub const MAX_DIAGNOSTICS: usize = 20;

/// The Python error class a diagnostic is reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Malformed tokens or grammar.
    Syntax,
    /// Indentation that does not form a valid block structure.
    Indentation,
    /// Valid Python the sandbox refuses to run (`with`, `yield`, ...).
    Unsupported,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => f.write_str("SyntaxError"),
            Self::Indentation => f.write_str("IndentationError"),
            Self::Unsupported => f.write_str("SyntaxError (unsupported)"),
        }
    }
}

/// One syntax problem found in a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The offending source line, for rendering a caret under the error.
    pub source_line: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            source_line: source_line.into(),
        }
    }

    pub fn line(&self) -> u32 {
        self.span.start_line
    }

    pub fn column(&self) -> u32 {
        self.span.start_col
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Diagnostics collected by one lexer or parser pass.
///
/// At most [`MAX_DIAGNOSTICS`] are stored; `total` keeps counting past the cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
    pub total: usize,
}

impl Diagnostics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total > 0
    }

    /// True once the cap is reached and scanning should stop.
    pub fn is_full(&self) -> bool {
        self.total >= MAX_DIAGNOSTICS
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.items.len() < MAX_DIAGNOSTICS {
            self.items.push(diagnostic);
        }
        self.total += 1;
    }

    /// Fold another pass's diagnostics into this one.
    pub fn extend(&mut self, other: Diagnostics) {
        for diagnostic in other.items {
            if self.items.len() < MAX_DIAGNOSTICS {
                self.items.push(diagnostic);
            }
        }
        self.total += other.total;
    }

    /// All stored diagnostics in source order.
    ///
    /// Duplicates at the same position with the same message are collapsed,
    /// since the lexer and parser can both trip over one bad token.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut items = self.items;
        items.sort_by_key(|d| d.span.start());
        items.dedup_by(|a, b| a.span.start() == b.span.start() && a.message == b.message);
        items
    }
}
