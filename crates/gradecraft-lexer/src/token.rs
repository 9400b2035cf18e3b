//! Token types for the gradecraft lexer.
//!
//! [`TokenKind`] covers the Python lexemes the sandbox understands, including
//! the layout tokens (`Newline`, `Indent`, `Dedent`) and the pieces an
//! f-string is split into.

use gradecraft_types::Span;
use std::fmt;

/// Python's reserved words.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break",
    "class", "continue", "def", "del", "elif", "else", "except", "finally",
    "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal",
    "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    Int(i64),
    Float(f64),
    /// A complete, escape-processed string literal.
    Str(String),

    // ── f-strings ────────────────────────────────────────────
    /// Opening quote of an f-string.
    FStringStart,
    /// Literal text between replacement fields (`{{`/`}}` already unescaped).
    FStringText(String),
    /// The `{` opening a replacement field.
    FieldStart,
    /// `!r`, `!s` or `!a` after a field expression.
    FieldConversion(char),
    /// Raw format spec text after `:` in a field.
    FieldSpec(String),
    /// The `}` closing a replacement field.
    FieldEnd,
    /// Closing quote of an f-string.
    FStringEnd,

    Name(String),

    // ── Keywords ─────────────────────────────────────────────
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Amper,
    Pipe,
    Caret,
    Tilde,
    LShift,
    RShift,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    EqEq,
    NotEq,
    /// `=`
    Eq,
    /// `+=`, `-=`, ... carrying the operator text without `=`.
    AugAssign(&'static str),
    /// `:=`
    Walrus,
    Arrow,

    // ── Punctuation ──────────────────────────────────────────
    Dot,
    Ellipsis,
    Comma,
    Colon,
    Semi,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // ── Layout ───────────────────────────────────────────────
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "True" => TokenKind::True,
            "and" => TokenKind::And,
            "as" => TokenKind::As,
            "assert" => TokenKind::Assert,
            "async" => TokenKind::Async,
            "await" => TokenKind::Await,
            "break" => TokenKind::Break,
            "class" => TokenKind::Class,
            "continue" => TokenKind::Continue,
            "def" => TokenKind::Def,
            "del" => TokenKind::Del,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "except" => TokenKind::Except,
            "finally" => TokenKind::Finally,
            "for" => TokenKind::For,
            "from" => TokenKind::From,
            "global" => TokenKind::Global,
            "if" => TokenKind::If,
            "import" => TokenKind::Import,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "lambda" => TokenKind::Lambda,
            "nonlocal" => TokenKind::Nonlocal,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "pass" => TokenKind::Pass,
            "raise" => TokenKind::Raise,
            "return" => TokenKind::Return,
            "try" => TokenKind::Try,
            "while" => TokenKind::While,
            "with" => TokenKind::With,
            "yield" => TokenKind::Yield,
            _ => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        KEYWORDS.iter().any(|kw| TokenKind::from_keyword(kw).as_ref() == Some(self))
    }

    /// Tokens that begin a statement; used to resynchronize after an error.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Class
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Try
                | TokenKind::Return
                | TokenKind::Import
                | TokenKind::From
                | TokenKind::Pass
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Raise
                | TokenKind::Global
                | TokenKind::Nonlocal
                | TokenKind::At
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{n}"),
            TokenKind::Float(n) => write!(f, "{n:?}"),
            TokenKind::Str(s) => write!(f, "{s:?}"),
            TokenKind::FStringStart => f.write_str("f-string"),
            TokenKind::FStringText(s) => write!(f, "{s:?}"),
            TokenKind::FieldStart => f.write_str("{"),
            TokenKind::FieldConversion(c) => write!(f, "!{c}"),
            TokenKind::FieldSpec(s) => write!(f, ":{s}"),
            TokenKind::FieldEnd => f.write_str("}"),
            TokenKind::FStringEnd => f.write_str("end of f-string"),
            TokenKind::Name(name) => f.write_str(name),
            TokenKind::False => f.write_str("False"),
            TokenKind::None => f.write_str("None"),
            TokenKind::True => f.write_str("True"),
            TokenKind::And => f.write_str("and"),
            TokenKind::As => f.write_str("as"),
            TokenKind::Assert => f.write_str("assert"),
            TokenKind::Async => f.write_str("async"),
            TokenKind::Await => f.write_str("await"),
            TokenKind::Break => f.write_str("break"),
            TokenKind::Class => f.write_str("class"),
            TokenKind::Continue => f.write_str("continue"),
            TokenKind::Def => f.write_str("def"),
            TokenKind::Del => f.write_str("del"),
            TokenKind::Elif => f.write_str("elif"),
            TokenKind::Else => f.write_str("else"),
            TokenKind::Except => f.write_str("except"),
            TokenKind::Finally => f.write_str("finally"),
            TokenKind::For => f.write_str("for"),
            TokenKind::From => f.write_str("from"),
            TokenKind::Global => f.write_str("global"),
            TokenKind::If => f.write_str("if"),
            TokenKind::Import => f.write_str("import"),
            TokenKind::In => f.write_str("in"),
            TokenKind::Is => f.write_str("is"),
            TokenKind::Lambda => f.write_str("lambda"),
            TokenKind::Nonlocal => f.write_str("nonlocal"),
            TokenKind::Not => f.write_str("not"),
            TokenKind::Or => f.write_str("or"),
            TokenKind::Pass => f.write_str("pass"),
            TokenKind::Raise => f.write_str("raise"),
            TokenKind::Return => f.write_str("return"),
            TokenKind::Try => f.write_str("try"),
            TokenKind::While => f.write_str("while"),
            TokenKind::With => f.write_str("with"),
            TokenKind::Yield => f.write_str("yield"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::DoubleStar => f.write_str("**"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::DoubleSlash => f.write_str("//"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::At => f.write_str("@"),
            TokenKind::Amper => f.write_str("&"),
            TokenKind::Pipe => f.write_str("|"),
            TokenKind::Caret => f.write_str("^"),
            TokenKind::Tilde => f.write_str("~"),
            TokenKind::LShift => f.write_str("<<"),
            TokenKind::RShift => f.write_str(">>"),
            TokenKind::Less => f.write_str("<"),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::LessEq => f.write_str("<="),
            TokenKind::GreaterEq => f.write_str(">="),
            TokenKind::EqEq => f.write_str("=="),
            TokenKind::NotEq => f.write_str("!="),
            TokenKind::Eq => f.write_str("="),
            TokenKind::AugAssign(op) => write!(f, "{op}="),
            TokenKind::Walrus => f.write_str(":="),
            TokenKind::Arrow => f.write_str("->"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Ellipsis => f.write_str("..."),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::Semi => f.write_str(";"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Indent => f.write_str("indent"),
            TokenKind::Dedent => f.write_str("dedent"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyword_is_recognised() {
        for &kw in KEYWORDS {
            let kind = TokenKind::from_keyword(kw)
                .unwrap_or_else(|| panic!("from_keyword should recognise '{kw}'"));
            assert!(kind.is_keyword());
            assert_eq!(kind.to_string(), kw, "display should round-trip '{kw}'");
        }
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(TokenKind::from_keyword("None"), Some(TokenKind::None));
        assert!(TokenKind::from_keyword("none").is_none());
        assert!(TokenKind::from_keyword("DEF").is_none());
        assert!(TokenKind::from_keyword("print").is_none());
        assert!(TokenKind::from_keyword("match").is_none());
    }

    #[test]
    fn non_keywords_are_not_keywords() {
        for kind in [
            TokenKind::Name("x".into()),
            TokenKind::Int(1),
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Plus,
        ] {
            assert!(!kind.is_keyword(), "{kind:?}");
        }
    }

    #[test]
    fn display_operators() {
        assert_eq!(TokenKind::DoubleSlash.to_string(), "//");
        assert_eq!(TokenKind::AugAssign("**").to_string(), "**=");
        assert_eq!(TokenKind::Walrus.to_string(), ":=");
        assert_eq!(TokenKind::Str("hi".into()).to_string(), "\"hi\"");
        assert_eq!(TokenKind::Float(2.0).to_string(), "2.0");
    }
}
