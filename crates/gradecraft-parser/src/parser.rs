//! Core parser infrastructure: token cursor, error reporting, helpers.

use gradecraft_lexer::token::{Token, TokenKind};
use gradecraft_types::ast::{Ident, Module};
use gradecraft_types::{Diagnostic, DiagnosticKind, Diagnostics, SourceFile, Span};

/// Deepest expression nesting accepted before giving up.
pub(crate) const MAX_EXPR_DEPTH: u32 = 200;

/// Deepest block nesting accepted, matching CPython's tokenizer limit.
pub(crate) const MAX_BLOCK_DEPTH: u32 = 100;

/// The submission parser.
///
/// Consumes a token stream produced by the lexer and builds a [`Module`].
/// Collects errors and resynchronizes at the next line so one typo does not
/// hide the rest of the file's problems.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    pos: usize,
    source_file: &'src SourceFile,
    errors: Diagnostics,
    /// Enclosing `def`/`lambda` bodies; `return` is only legal when > 0.
    pub(crate) function_depth: u32,
    /// Enclosing loops within the current function; for `break`/`continue`.
    pub(crate) loop_depth: u32,
    pub(crate) expr_depth: u32,
    pub(crate) block_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    /// The module, present only when no diagnostics were produced.
    pub module: Option<Module>,
    pub errors: Diagnostics,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            errors: Diagnostics::empty(),
            function_depth: 0,
            loop_depth: 0,
            expr_depth: 0,
            block_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    ///
    /// Past the end of the stream this keeps returning the final token, which
    /// the lexer guarantees is `Eof`.
    pub(crate) fn peek(&self) -> Token {
        match self.tokens.get(self.pos).or_else(|| self.tokens.last()) {
            Some(token) => token.clone(),
            None => Token::new(TokenKind::Eof, Span::point(1, 0)),
        }
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Span of the last consumed token that is not layout.
    ///
    /// Statement spans end at their last real token rather than at the
    /// `Newline`/`Dedent` that closed them.
    pub(crate) fn previous_span(&self) -> Span {
        self.tokens[..self.pos.min(self.tokens.len())]
            .iter()
            .rev()
            .find(|t| {
                !matches!(
                    t.kind,
                    TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
                )
            })
            .map(|t| t.span)
            .unwrap_or(Span::point(1, 0))
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from the current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check(expected) {
            Some(self.advance())
        } else {
            if self.at_end() || self.check(&TokenKind::Newline) {
                self.error_at_current(format!("expected '{expected}'"));
            } else {
                self.invalid_syntax();
            }
            None
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ => {
                self.invalid_syntax();
                None
            }
        }
    }

    /// Expect the end of a simple statement: a `Newline`, or `Eof`.
    pub(crate) fn expect_statement_end(&mut self) -> Option<()> {
        if self.eat(&TokenKind::Newline) || self.at_end() {
            return Some(());
        }
        self.invalid_syntax();
        None
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Report a syntax error at the current token position.
    pub(crate) fn error_at_current(&mut self, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(DiagnosticKind::Syntax, message, span);
    }

    /// The generic complaint about the current token.
    pub(crate) fn invalid_syntax(&mut self) {
        if self.at_end() {
            self.error_at_current("unexpected EOF while parsing");
        } else {
            self.error_at_current("invalid syntax");
        }
    }

    pub(crate) fn unsupported(&mut self, message: impl Into<String>, span: Span) {
        self.error_at(DiagnosticKind::Unsupported, message, span);
    }

    pub(crate) fn error_at(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        let source_line = self
            .source_file
            .line(span.start_line)
            .unwrap_or("")
            .to_string();
        self.errors
            .push(Diagnostic::new(kind, message, span, source_line));
    }

    /// Returns `true` once the diagnostic cap is reached and parsing should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.is_full()
    }

    /// Source text covered by a single-line span; empty for multi-line spans.
    pub(crate) fn source_text(&self, span: Span) -> String {
        if span.start_line != span.end_line {
            return String::new();
        }
        let start = span.start_col as usize;
        let len = span.end_col.saturating_sub(span.start_col) as usize;
        self.source_file
            .line(span.start_line)
            .map(|line| line.chars().skip(start).take(len).collect())
            .unwrap_or_default()
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to the start of the next statement after an error.
    ///
    /// Consumes the rest of the logical line, and the whole indented block
    /// beneath it if one follows, so a broken `def` header does not cascade
    /// into errors for every line of its body.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Dedent => return,
                TokenKind::Newline => {
                    self.advance();
                    if self.check(&TokenKind::Indent) {
                        self.skip_block();
                    }
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip a balanced `Indent ... Dedent` run starting at the current `Indent`.
    pub(crate) fn skip_block(&mut self) {
        let mut depth = 0usize;
        while !self.at_end() {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a [`Module`].
    pub fn parse(mut self) -> ParseResult {
        let module = self.parse_module();
        ParseResult {
            module: if self.errors.has_errors() { None } else { module },
            errors: self.errors,
        }
    }
}
