//! Core lexer: converts Python source text to a token stream.
//!
//! Features:
//! - Indentation tracking with `Indent`/`Dedent` tokens and a logical `Newline`
//!   at the end of each non-blank line
//! - Implicit line joining inside brackets and explicit `\` continuations
//! - String prefixes (`r`, `b`, `u`, `f` and combinations), triple quotes and
//!   escape sequences
//! - f-strings split into text and replacement-field tokens via a mode stack
//! - Error recovery: collects up to [`gradecraft_types::MAX_DIAGNOSTICS`]
//!   diagnostics instead of stopping at the first

use std::collections::VecDeque;

use gradecraft_types::{Diagnostic, DiagnosticKind, Diagnostics, SourceFile, Span};

use crate::token::{Token, TokenKind};

/// Columns a tab advances indentation to, as in CPython's tokenizer.
const TAB_SIZE: usize = 8;

/// Lexer mode. Tracks whether we're scanning code, f-string text, or the
/// expression inside an f-string replacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Inside f-string text, scanning until the closing quote or a `{`.
    FString {
        quote: char,
        triple: bool,
        raw: bool,
        start: Span,
    },
    /// Inside `{...}`. `base` is the bracket depth when the field opened, so
    /// `:`, `!` and `}` only act as field punctuation at that depth.
    Field { base: usize },
}

pub struct Lexer<'src> {
    chars: Vec<char>,
    source_file: &'src SourceFile,
    pos: usize,
    /// Current line (1-based).
    line: u32,
    /// Current column (0-based, in characters).
    col: u32,
    errors: Diagnostics,
    mode_stack: Vec<Mode>,
    /// Tokens to emit before scanning again (dedents, f-string pieces).
    pending: VecDeque<Token>,
    /// Indentation of the enclosing blocks as `(width, alt_width)`, where
    /// `width` counts a tab to the next multiple of 8 and `alt_width` counts
    /// it as 1. Always starts with `(0, 0)`.
    indents: Vec<(usize, usize)>,
    /// Open brackets with their positions, innermost last.
    brackets: Vec<(char, Span)>,
    at_line_start: bool,
    /// No token has been emitted on the current logical line yet.
    line_is_empty: bool,
    finished: bool,
}

/// Result of lexing: tokens + any diagnostics collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            chars: source_file.source.chars().collect(),
            source_file,
            pos: 0,
            line: 1,
            col: 0,
            errors: Diagnostics::empty(),
            mode_stack: vec![Mode::Normal],
            pending: VecDeque::new(),
            indents: vec![(0, 0)],
            brackets: Vec::new(),
            at_line_start: true,
            line_is_empty: true,
            finished: false,
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.errors.is_full() {
                break;
            }

            let token = match self.pending.pop_front() {
                Some(token) => token,
                None => match self.current_mode() {
                    Mode::FString { .. } => self.scan_fstring_text(),
                    Mode::Normal | Mode::Field { .. } => self.scan_token(),
                },
            };

            self.line_is_empty = matches!(
                token.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            );
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    /// Bracket depth of the enclosing replacement field, if scanning one.
    fn field_base(&self) -> Option<usize> {
        match self.current_mode() {
            Mode::Field { base } => Some(base),
            _ => None,
        }
    }

    fn at_field_level(&self) -> bool {
        self.field_base() == Some(self.brackets.len())
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(start_line, start_col, self.line, self.col)
    }

    fn emit_error(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        let source_line = self
            .source_file
            .line(span.start_line)
            .unwrap_or("")
            .to_string();
        self.errors
            .push(Diagnostic::new(kind, message, span, source_line));
    }

    // ─────────────────────────────────────────────────────────────
    // Layout: whitespace, comments, indentation, end of input
    // ─────────────────────────────────────────────────────────────

    /// Skip spaces, tabs, form feeds and carriage returns (not newlines).
    fn skip_whitespace(&mut self) {
        while let Some(' ' | '\t' | '\x0c' | '\r') = self.peek() {
            self.advance();
        }
    }

    /// Skip a `#` comment up to, but not including, the newline.
    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Measure the indentation of the next non-blank line and emit
    /// `Indent`/`Dedent` tokens for it. Blank and comment-only lines are
    /// consumed without affecting the indentation stack.
    fn scan_indentation(&mut self) -> Option<Token> {
        let (width, alt_width) = loop {
            let (mut width, mut alt_width) = (0usize, 0usize);
            while let Some(ch) = self.peek() {
                match ch {
                    ' ' => {
                        width += 1;
                        alt_width += 1;
                    }
                    '\t' => {
                        width = (width / TAB_SIZE + 1) * TAB_SIZE;
                        alt_width += 1;
                    }
                    '\x0c' => (width, alt_width) = (0, 0),
                    '\r' => {}
                    _ => break,
                }
                self.advance();
            }
            match self.peek() {
                None => return None,
                Some('\n') => {
                    self.advance();
                }
                Some('#') => self.skip_comment(),
                Some(_) => break (width, alt_width),
            }
        };

        // Both ways of counting tabs must order the levels the same way.
        let (current, current_alt) = self.indents.last().copied().unwrap_or((0, 0));
        if width > current {
            if alt_width <= current_alt {
                self.inconsistent_tabs();
            }
            self.indents.push((width, alt_width));
            return Some(Token::new(
                TokenKind::Indent,
                Span::new(self.line, 0, self.line, self.col),
            ));
        }
        if width < current {
            while width < self.indents.last().map_or(0, |&(w, _)| w) {
                self.indents.pop();
                self.pending
                    .push_back(Token::new(TokenKind::Dedent, self.current_span()));
            }
            let (outer, outer_alt) = self.indents.last().copied().unwrap_or((0, 0));
            if width != outer {
                self.emit_error(
                    DiagnosticKind::Indentation,
                    "unindent does not match any outer indentation level",
                    self.current_span(),
                );
            } else if alt_width != outer_alt {
                self.inconsistent_tabs();
            }
            return self.pending.pop_front();
        }
        if alt_width != current_alt {
            self.inconsistent_tabs();
        }
        None
    }

    fn inconsistent_tabs(&mut self) {
        self.emit_error(
            DiagnosticKind::Indentation,
            "inconsistent use of tabs and spaces in indentation",
            self.current_span(),
        );
    }

    /// Queue the tokens that close the file: unclosed-bracket diagnostics,
    /// a final `Newline`, one `Dedent` per open block, then `Eof`.
    fn finish(&mut self) -> Token {
        let here = self.current_span();
        if !self.finished {
            self.finished = true;

            if self.mode_stack.len() > 1 {
                self.emit_error(
                    DiagnosticKind::Syntax,
                    "f-string: expecting '}'",
                    here,
                );
                self.mode_stack.truncate(1);
            }
            if let Some(&(open, span)) = self.brackets.first() {
                self.emit_error(
                    DiagnosticKind::Syntax,
                    format!("'{open}' was never closed"),
                    span,
                );
                self.brackets.clear();
            }
            if !self.line_is_empty {
                self.pending.push_back(Token::new(TokenKind::Newline, here));
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.pending.push_back(Token::new(TokenKind::Dedent, here));
            }
        }
        self.pending.push_back(Token::new(TokenKind::Eof, here));
        self.pending
            .pop_front()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, here))
    }

    // ─────────────────────────────────────────────────────────────
    // Code scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token in code (normal or replacement-field) mode.
    fn scan_token(&mut self) -> Token {
        loop {
            if self.at_line_start
                && self.brackets.is_empty()
                && self.current_mode() == Mode::Normal
            {
                self.at_line_start = false;
                if let Some(token) = self.scan_indentation() {
                    return token;
                }
            }

            self.skip_whitespace();
            let start_line = self.line;
            let start_col = self.col;

            let Some(ch) = self.peek() else {
                return self.finish();
            };

            match ch {
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => self.advance_by(2),
                '\\' if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.advance_by(3)
                }
                '\n' => {
                    self.advance();
                    if !self.brackets.is_empty() || self.field_base().is_some() {
                        continue;
                    }
                    self.at_line_start = true;
                    if self.line_is_empty {
                        continue;
                    }
                    return Token::new(TokenKind::Newline, self.span_from(start_line, start_col));
                }
                _ => return self.scan_lexeme(ch, start_line, start_col),
            }
        }
    }

    fn scan_lexeme(&mut self, ch: char, start_line: u32, start_col: u32) -> Token {
        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.scan_number(start_line, start_col);
        }
        if ch.is_alphabetic() || ch == '_' {
            return self.scan_name(start_line, start_col);
        }
        if ch == '"' || ch == '\'' {
            return self.scan_string(start_line, start_col, false);
        }

        self.advance();
        let next = self.peek();
        let kind = match ch {
            '(' | '[' | '{' => {
                self.brackets.push((ch, self.span_from(start_line, start_col)));
                match ch {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                if ch == '}' && self.at_field_level() {
                    self.pop_mode();
                    return Token::new(TokenKind::FieldEnd, self.span_from(start_line, start_col));
                }
                self.close_bracket(ch, start_line, start_col);
                match ch {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            ':' if self.at_field_level() => {
                return self.scan_format_spec(start_line, start_col);
            }
            ':' if next == Some('=') => {
                self.advance();
                TokenKind::Walrus
            }
            ':' => TokenKind::Colon,
            '!' if self.at_field_level() && matches!(next, Some('r' | 's' | 'a')) => {
                self.advance();
                TokenKind::FieldConversion(next.unwrap_or('r'))
            }
            '!' if next == Some('=') => {
                self.advance();
                TokenKind::NotEq
            }
            '=' if next == Some('=') => {
                self.advance();
                TokenKind::EqEq
            }
            '=' => TokenKind::Eq,
            '<' | '>' => self.scan_angle(ch),
            '*' => self.scan_doubled('*', TokenKind::Star, TokenKind::DoubleStar, "*", "**"),
            '/' => self.scan_doubled('/', TokenKind::Slash, TokenKind::DoubleSlash, "/", "//"),
            '-' if next == Some('>') => {
                self.advance();
                TokenKind::Arrow
            }
            '+' | '-' | '%' | '&' | '|' | '^' | '@' => {
                let op = match ch {
                    '+' => "+",
                    '-' => "-",
                    '%' => "%",
                    '&' => "&",
                    '|' => "|",
                    '^' => "^",
                    _ => "@",
                };
                if next == Some('=') {
                    self.advance();
                    TokenKind::AugAssign(op)
                } else {
                    match ch {
                        '+' => TokenKind::Plus,
                        '-' => TokenKind::Minus,
                        '%' => TokenKind::Percent,
                        '&' => TokenKind::Amper,
                        '|' => TokenKind::Pipe,
                        '^' => TokenKind::Caret,
                        _ => TokenKind::At,
                    }
                }
            }
            '~' => TokenKind::Tilde,
            '.' if next == Some('.') && self.peek_at(1) == Some('.') => {
                self.advance_by(2);
                TokenKind::Ellipsis
            }
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            _ => {
                let span = self.span_from(start_line, start_col);
                let message = if ch == '!' {
                    "invalid syntax".to_string()
                } else {
                    format!("invalid character '{ch}' (U+{:04X})", ch as u32)
                };
                self.emit_error(DiagnosticKind::Syntax, message, span);
                if self.errors.is_full() {
                    return Token::new(TokenKind::Eof, span);
                }
                // Error recovery: skip the character and try again
                return self.scan_token();
            }
        };
        Token::new(kind, self.span_from(start_line, start_col))
    }

    fn close_bracket(&mut self, close: char, start_line: u32, start_col: u32) {
        let span = self.span_from(start_line, start_col);
        match self.brackets.pop() {
            None => {
                self.emit_error(DiagnosticKind::Syntax, format!("unmatched '{close}'"), span);
            }
            Some((open, _)) if matching_close(open) != close => {
                self.emit_error(
                    DiagnosticKind::Syntax,
                    format!(
                        "closing parenthesis '{close}' does not match opening parenthesis '{open}'"
                    ),
                    span,
                );
            }
            Some(_) => {}
        }
    }

    /// `<`, `<=`, `<<`, `<<=` and the `>` equivalents.
    fn scan_angle(&mut self, ch: char) -> TokenKind {
        let less = ch == '<';
        if self.peek() == Some('=') {
            self.advance();
            return if less { TokenKind::LessEq } else { TokenKind::GreaterEq };
        }
        if self.peek() == Some(ch) {
            self.advance();
            if self.peek() == Some('=') {
                self.advance();
                return TokenKind::AugAssign(if less { "<<" } else { ">>" });
            }
            return if less { TokenKind::LShift } else { TokenKind::RShift };
        }
        if less {
            TokenKind::Less
        } else {
            TokenKind::Greater
        }
    }

    /// Operators with a doubled form (`*`/`**`, `/`/`//`) and their `=` variants.
    fn scan_doubled(
        &mut self,
        ch: char,
        single: TokenKind,
        double: TokenKind,
        single_op: &'static str,
        double_op: &'static str,
    ) -> TokenKind {
        let (kind, op) = if self.peek() == Some(ch) {
            self.advance();
            (double, double_op)
        } else {
            (single, single_op)
        };
        if self.peek() == Some('=') {
            self.advance();
            return TokenKind::AugAssign(op);
        }
        kind
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start_line: u32, start_col: u32) -> Token {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            return self.scan_radix_number(start_line, start_col);
        }

        let mut text = String::new();
        let mut is_float = false;
        self.take_digits(&mut text);
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.advance();
            self.take_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('e');
                self.advance();
                if sign {
                    text.extend(self.advance());
                }
                self.take_digits(&mut text);
            }
        }

        if matches!(self.peek(), Some('j' | 'J')) {
            self.advance();
            let span = self.span_from(start_line, start_col);
            self.emit_error(
                DiagnosticKind::Unsupported,
                "complex numbers are not supported",
                span,
            );
            return Token::new(TokenKind::Float(0.0), span);
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.advance();
            }
            let span = self.span_from(start_line, start_col);
            self.emit_error(DiagnosticKind::Syntax, "invalid decimal literal", span);
            return Token::new(TokenKind::Int(0), span);
        }

        let span = self.span_from(start_line, start_col);
        let clean: String = text.chars().filter(|&c| c != '_').collect();
        if is_float {
            let value = clean.parse::<f64>().unwrap_or(0.0);
            return Token::new(TokenKind::Float(value), span);
        }
        if clean.len() > 1 && clean.starts_with('0') && clean.chars().any(|c| c != '0') {
            self.emit_error(
                DiagnosticKind::Syntax,
                "leading zeros in decimal integer literals are not permitted; use an 0o prefix for octal integers",
                span,
            );
            return Token::new(TokenKind::Int(0), span);
        }
        match clean.parse::<i64>() {
            Ok(value) => Token::new(TokenKind::Int(value), span),
            Err(_) => {
                self.emit_error(
                    DiagnosticKind::Unsupported,
                    "integer literal is too large (integers are limited to 64 bits)",
                    span,
                );
                Token::new(TokenKind::Int(0), span)
            }
        }
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || (c == '_' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_radix_number(&mut self, start_line: u32, start_col: u32) -> Token {
        self.advance(); // '0'
        let marker = self.advance().unwrap_or('x');
        let (radix, name) = match marker.to_ascii_lowercase() {
            'x' => (16, "hexadecimal"),
            'o' => (8, "octal"),
            _ => (2, "binary"),
        };
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                if c != '_' {
                    digits.push(c);
                }
                self.advance();
            } else {
                break;
            }
        }
        let span = self.span_from(start_line, start_col);
        match i64::from_str_radix(&digits, radix) {
            Ok(value) if !digits.is_empty() => Token::new(TokenKind::Int(value), span),
            _ => {
                self.emit_error(DiagnosticKind::Syntax, format!("invalid {name} literal"), span);
                Token::new(TokenKind::Int(0), span)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Names & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_name(&mut self, start_line: u32, start_col: u32) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('"' | '\'')) {
            let prefix = name.to_ascii_lowercase();
            if matches!(prefix.as_str(), "r" | "u" | "b" | "br" | "rb") {
                return self.scan_string(start_line, start_col, prefix.contains('r'));
            }
            if matches!(prefix.as_str(), "f" | "fr" | "rf") {
                return self.start_fstring(start_line, start_col, prefix.contains('r'));
            }
        }

        let kind = TokenKind::from_keyword(&name).unwrap_or(TokenKind::Name(name));
        Token::new(kind, self.span_from(start_line, start_col))
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    /// Consume an opening quote (single or triple) and return `(quote, triple)`.
    fn open_quote(&mut self) -> (char, bool) {
        let quote = self.advance().unwrap_or('"');
        if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
            self.advance_by(2);
            (quote, true)
        } else {
            (quote, false)
        }
    }

    /// Whether the upcoming characters close a string opened with `quote`.
    fn at_closing_quote(&self, quote: char, triple: bool) -> bool {
        self.peek() == Some(quote)
            && (!triple || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)))
    }

    fn unterminated(&mut self, triple: bool, span: Span) {
        let what = if triple {
            "unterminated triple-quoted string literal"
        } else {
            "unterminated string literal"
        };
        let message = format!("{what} (detected at line {})", self.line);
        self.emit_error(DiagnosticKind::Syntax, message, span);
    }

    /// Scan a plain (non-f) string starting at its opening quote.
    fn scan_string(&mut self, start_line: u32, start_col: u32, raw: bool) -> Token {
        let (quote, triple) = self.open_quote();
        let mut buf = String::new();

        loop {
            match self.peek() {
                None => {
                    self.unterminated(triple, Span::point(start_line, start_col));
                    break;
                }
                Some('\n') if !triple => {
                    self.unterminated(triple, Span::point(start_line, start_col));
                    break;
                }
                Some(_) if self.at_closing_quote(quote, triple) => {
                    self.advance_by(if triple { 3 } else { 1 });
                    break;
                }
                Some('\\') if raw => {
                    self.advance();
                    buf.push('\\');
                    if let Some(next) = self.advance() {
                        buf.push(next);
                    }
                }
                Some('\\') => self.scan_escape_sequence(&mut buf),
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }

        Token::new(TokenKind::Str(buf), self.span_from(start_line, start_col))
    }

    /// Scan an escape sequence starting at the `\` and append its value.
    fn scan_escape_sequence(&mut self, buf: &mut String) {
        let start_line = self.line;
        let start_col = self.col;
        self.advance(); // the '\'

        let Some(ch) = self.advance() else {
            return;
        };
        match ch {
            '\n' => {}
            '\\' => buf.push('\\'),
            '\'' => buf.push('\''),
            '"' => buf.push('"'),
            'n' => buf.push('\n'),
            't' => buf.push('\t'),
            'r' => buf.push('\r'),
            '0' => buf.push('\0'),
            'a' => buf.push('\x07'),
            'b' => buf.push('\x08'),
            'f' => buf.push('\x0c'),
            'v' => buf.push('\x0b'),
            'x' | 'u' | 'U' => {
                let width = match ch {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut hex = String::new();
                for _ in 0..width {
                    match self.peek() {
                        Some(c) if c.is_ascii_hexdigit() => {
                            hex.push(c);
                            self.advance();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == width => buf.push(decoded),
                    _ => {
                        let span = self.span_from(start_line, start_col);
                        self.emit_error(
                            DiagnosticKind::Syntax,
                            format!("(unicode error) truncated \\{ch} escape"),
                            span,
                        );
                    }
                }
            }
            // Unknown escapes keep their backslash
            other => {
                buf.push('\\');
                buf.push(other);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // f-strings
    // ─────────────────────────────────────────────────────────────

    fn start_fstring(&mut self, start_line: u32, start_col: u32, raw: bool) -> Token {
        let (quote, triple) = self.open_quote();
        let span = self.span_from(start_line, start_col);
        self.push_mode(Mode::FString {
            quote,
            triple,
            raw,
            start: Span::point(start_line, start_col),
        });
        Token::new(TokenKind::FStringStart, span)
    }

    /// Scan f-string text up to the closing quote or the next replacement field.
    fn scan_fstring_text(&mut self) -> Token {
        let Mode::FString {
            quote,
            triple,
            raw,
            start,
        } = self.current_mode()
        else {
            return self.scan_token();
        };
        let start_line = self.line;
        let start_col = self.col;
        let mut buf = String::new();

        loop {
            match self.peek() {
                None => {
                    self.unterminated(triple, start);
                    self.pop_mode();
                    return self.fstring_piece(buf, TokenKind::FStringEnd, start_line, start_col);
                }
                Some('\n') if !triple => {
                    self.unterminated(triple, start);
                    self.pop_mode();
                    return self.fstring_piece(buf, TokenKind::FStringEnd, start_line, start_col);
                }
                Some(_) if self.at_closing_quote(quote, triple) => {
                    self.advance_by(if triple { 3 } else { 1 });
                    self.pop_mode();
                    return self.fstring_piece(buf, TokenKind::FStringEnd, start_line, start_col);
                }
                Some('{') if self.peek_at(1) == Some('{') => {
                    self.advance_by(2);
                    buf.push('{');
                }
                Some('}') if self.peek_at(1) == Some('}') => {
                    self.advance_by(2);
                    buf.push('}');
                }
                Some('{') => {
                    self.advance();
                    self.push_mode(Mode::Field {
                        base: self.brackets.len(),
                    });
                    return self.fstring_piece(buf, TokenKind::FieldStart, start_line, start_col);
                }
                Some('}') => {
                    let span = self.current_span();
                    self.emit_error(
                        DiagnosticKind::Syntax,
                        "f-string: single '}' is not allowed",
                        span,
                    );
                    self.advance();
                }
                Some('\\') if !raw => self.scan_escape_sequence(&mut buf),
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
    }

    /// Emit pending f-string text (if any) followed by `then`.
    fn fstring_piece(
        &mut self,
        text: String,
        then: TokenKind,
        start_line: u32,
        start_col: u32,
    ) -> Token {
        let then = Token::new(then, self.current_span());
        if text.is_empty() {
            return then;
        }
        self.pending.push_back(then);
        Token::new(TokenKind::FStringText(text), self.span_from(start_line, start_col))
    }

    /// Scan a field's format spec after `:`, up to (not including) the `}`.
    fn scan_format_spec(&mut self, start_line: u32, start_col: u32) -> Token {
        let mut spec = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                '}' | '\n' => break,
                '"' | '\'' if matches!(self.mode_stack.iter().rev().nth(1), Some(Mode::FString { quote, .. }) if *quote == ch) => {
                    break
                }
                '{' => {
                    let span = self.current_span();
                    self.emit_error(
                        DiagnosticKind::Unsupported,
                        "nested replacement fields in format specs are not supported",
                        span,
                    );
                    self.advance();
                }
                _ => {
                    spec.push(ch);
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::FieldSpec(spec), self.span_from(start_line, start_col))
    }
}

fn matching_close(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}
