//! Lexer tests: layout tokens, literals, operators, f-strings, bracket
//! matching, error recovery and determinism.

use gradecraft_lexer::{Lexer, TokenKind};
use gradecraft_types::SourceFile;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.py", source);
    Lexer::new(&sf)
        .lex()
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn error_count(source: &str) -> usize {
    let sf = SourceFile::new("test.py", source);
    Lexer::new(&sf).lex().errors.total
}

fn first_error(source: &str) -> String {
    let sf = SourceFile::new("test.py", source);
    Lexer::new(&sf)
        .lex()
        .errors
        .items
        .first()
        .map(|e| e.message.clone())
        .unwrap_or_default()
}

fn name(s: &str) -> TokenKind {
    TokenKind::Name(s.to_string())
}

// ─────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_simple_statement_gets_trailing_newline() {
    assert_eq!(
        kinds("x = 1"),
        vec![name("x"), TokenKind::Eq, TokenKind::Int(1), TokenKind::Newline]
    );
}

#[test]
fn test_empty_source_is_just_eof() {
    assert!(kinds("").is_empty());
    assert!(kinds("\n\n   \n# only a comment\n").is_empty());
}

#[test]
fn test_indent_and_dedent() {
    let k = kinds("def f():\n    return 1\nx = 2\n");
    assert_eq!(
        k,
        vec![
            TokenKind::Def,
            name("f"),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Return,
            TokenKind::Int(1),
            TokenKind::Newline,
            TokenKind::Dedent,
            name("x"),
            TokenKind::Eq,
            TokenKind::Int(2),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_dedents_are_flushed_at_eof() {
    let k = kinds("if a:\n    if b:\n        pass");
    let dedents = k.iter().filter(|t| **t == TokenKind::Dedent).count();
    let indents = k.iter().filter(|t| **t == TokenKind::Indent).count();
    assert_eq!(indents, 2);
    assert_eq!(dedents, 2);
    assert_eq!(k.last(), Some(&TokenKind::Dedent));
}

#[test]
fn test_blank_and_comment_lines_do_not_change_indentation() {
    let k = kinds("def f():\n\n    # note\n        \n    return 1\n");
    assert_eq!(k.iter().filter(|t| **t == TokenKind::Indent).count(), 1);
    assert_eq!(k.iter().filter(|t| **t == TokenKind::Newline).count(), 2);
}

#[test]
fn test_tab_and_eight_spaces_are_inconsistent() {
    let sf = SourceFile::new("test.py", "if a:\n\tx = 1\n        y = 2\n");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.items.len(), 1);
    let err = &result.errors.items[0];
    assert_eq!(
        err.message,
        "inconsistent use of tabs and spaces in indentation"
    );
    assert_eq!(err.kind.to_string(), "IndentationError");
    assert_eq!(err.line(), 3);
}

#[test]
fn test_tabs_used_consistently_are_accepted() {
    let src = "if a:\n\tif b:\n\t\tx = 1\n\ty = 2\nz = 3\n";
    assert_eq!(error_count(src), 0);
    let k = kinds(src);
    assert_eq!(k.iter().filter(|t| **t == TokenKind::Indent).count(), 2);
    assert_eq!(k.iter().filter(|t| **t == TokenKind::Dedent).count(), 2);
}

#[test]
fn test_tab_after_spaces_is_inconsistent_when_it_deepens() {
    // Four spaces then a tab: deeper with tab = 8, not with tab = 1.
    assert_eq!(error_count("if a:\n    x = 1\n    if b:\n\ty = 2\n"), 1);
}

#[test]
fn test_inconsistent_dedent_is_indentation_error() {
    let sf = SourceFile::new("test.py", "if a:\n        x = 1\n    y = 2\n");
    let result = Lexer::new(&sf).lex();
    let err = &result.errors.items[0];
    assert_eq!(
        err.message,
        "unindent does not match any outer indentation level"
    );
    assert_eq!(err.kind.to_string(), "IndentationError");
    assert_eq!(err.line(), 3);
}

#[test]
fn test_brackets_join_lines() {
    let k = kinds("x = (1,\n     2)\n");
    assert!(!k[..k.len() - 1].contains(&TokenKind::Newline));
    assert!(!k.contains(&TokenKind::Indent));
}

#[test]
fn test_backslash_continuation() {
    assert_eq!(
        kinds("x = 1 + \\\n    2\n"),
        vec![
            name("x"),
            TokenKind::Eq,
            TokenKind::Int(1),
            TokenKind::Plus,
            TokenKind::Int(2),
            TokenKind::Newline,
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_integer_forms() {
    assert_eq!(kinds("42")[0], TokenKind::Int(42));
    assert_eq!(kinds("1_000_000")[0], TokenKind::Int(1_000_000));
    assert_eq!(kinds("0xff")[0], TokenKind::Int(255));
    assert_eq!(kinds("0o17")[0], TokenKind::Int(15));
    assert_eq!(kinds("0b101")[0], TokenKind::Int(5));
    assert_eq!(kinds("0")[0], TokenKind::Int(0));
    assert_eq!(kinds("000")[0], TokenKind::Int(0));
}

#[test]
fn test_float_forms() {
    assert_eq!(kinds("3.25")[0], TokenKind::Float(3.25));
    assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
    assert_eq!(kinds("2.")[0], TokenKind::Float(2.0));
    assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    assert_eq!(kinds("1.5E-2")[0], TokenKind::Float(0.015));
}

#[test]
fn test_leading_zero_rejected() {
    assert!(first_error("x = 012").contains("leading zeros"));
}

#[test]
fn test_invalid_decimal_literal() {
    assert_eq!(first_error("x = 3abc"), "invalid decimal literal");
}

#[test]
fn test_integer_overflow_is_unsupported() {
    let sf = SourceFile::new("test.py", "x = 99999999999999999999");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.total, 1);
    assert!(result.errors.items[0].message.contains("64 bits"));
}

#[test]
fn test_complex_literal_is_unsupported() {
    assert!(first_error("z = 2j").contains("complex"));
}

#[test]
fn test_strings_and_escapes() {
    assert_eq!(kinds("'hi'")[0], TokenKind::Str("hi".into()));
    assert_eq!(kinds("\"a\\nb\"")[0], TokenKind::Str("a\nb".into()));
    assert_eq!(kinds("'it\\'s'")[0], TokenKind::Str("it's".into()));
    assert_eq!(kinds("'\\x41\\u00e9'")[0], TokenKind::Str("Aé".into()));
    assert_eq!(kinds("'\\d'")[0], TokenKind::Str("\\d".into()));
}

#[test]
fn test_raw_and_bytes_prefixes() {
    assert_eq!(kinds("r'\\n'")[0], TokenKind::Str("\\n".into()));
    assert_eq!(kinds("b'ab'")[0], TokenKind::Str("ab".into()));
    assert_eq!(kinds("Rb'\\d'")[0], TokenKind::Str("\\d".into()));
}

#[test]
fn test_triple_quoted_string_spans_lines() {
    let k = kinds("s = \"\"\"one\ntwo \"quoted\"\n\"\"\"\n");
    assert_eq!(k[2], TokenKind::Str("one\ntwo \"quoted\"\n".into()));
    assert_eq!(k.len(), 4);
}

#[test]
fn test_unterminated_string() {
    assert_eq!(
        first_error("x = 'abc\ny = 1\n"),
        "unterminated string literal (detected at line 1)"
    );
    assert!(first_error("x = '''abc\n\n").starts_with("unterminated triple-quoted string literal"));
}

#[test]
fn test_prefix_like_names_stay_names() {
    assert_eq!(kinds("rb")[0], name("rb"));
    assert_eq!(kinds("f(1)")[0], name("f"));
}

// ─────────────────────────────────────────────────────────────────────
// Names & keywords
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_keywords_and_names() {
    assert_eq!(
        kinds("if not x is None"),
        vec![
            TokenKind::If,
            TokenKind::Not,
            name("x"),
            TokenKind::Is,
            TokenKind::None,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_unicode_identifier() {
    assert_eq!(kinds("café = 1")[0], name("café"));
}

// ─────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_compound_operators() {
    let k = kinds("a ** b // c << d >> e <= f >= g == h != i -> j := k");
    let ops: Vec<_> = k
        .into_iter()
        .filter(|t| !matches!(t, TokenKind::Name(_) | TokenKind::Newline))
        .collect();
    assert_eq!(
        ops,
        vec![
            TokenKind::DoubleStar,
            TokenKind::DoubleSlash,
            TokenKind::LShift,
            TokenKind::RShift,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::Arrow,
            TokenKind::Walrus,
        ]
    );
}

#[test]
fn test_augmented_assignment() {
    for op in ["+", "-", "*", "/", "//", "%", "**", "&", "|", "^", "<<", ">>", "@"] {
        let k = kinds(&format!("x {op}= 1"));
        assert_eq!(k[1], TokenKind::AugAssign(op), "operator {op}=");
    }
}

#[test]
fn test_invalid_character_reports_codepoint() {
    assert_eq!(first_error("x = $"), "invalid character '$' (U+0024)");
    // Scanning continues past the bad character.
    assert!(kinds("x = $ 1").contains(&TokenKind::Int(1)));
}

// ─────────────────────────────────────────────────────────────────────
// Brackets
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unclosed_bracket_reported_at_opening() {
    let sf = SourceFile::new("test.py", "x = [1, 2\ny = 3\n");
    let result = Lexer::new(&sf).lex();
    let err = &result.errors.items[0];
    assert_eq!(err.message, "'[' was never closed");
    assert_eq!((err.line(), err.column()), (1, 4));
}

#[test]
fn test_unmatched_closer() {
    assert_eq!(first_error("x = 1)"), "unmatched ')'");
}

#[test]
fn test_mismatched_closer() {
    assert_eq!(
        first_error("x = (1]"),
        "closing parenthesis ']' does not match opening parenthesis '('"
    );
}

// ─────────────────────────────────────────────────────────────────────
// f-strings
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_fstring_pieces() {
    assert_eq!(
        kinds("f'a{x!r:>4}b'"),
        vec![
            TokenKind::FStringStart,
            TokenKind::FStringText("a".into()),
            TokenKind::FieldStart,
            name("x"),
            TokenKind::FieldConversion('r'),
            TokenKind::FieldSpec(">4".into()),
            TokenKind::FieldEnd,
            TokenKind::FStringText("b".into()),
            TokenKind::FStringEnd,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_fstring_brace_escapes() {
    assert_eq!(
        kinds("f'{{x}}'"),
        vec![
            TokenKind::FStringStart,
            TokenKind::FStringText("{x}".into()),
            TokenKind::FStringEnd,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_fstring_nested_brackets_and_not_equal() {
    let k = kinds("f\"{d['k'][1:2]} {a != b}\"");
    assert!(k.contains(&TokenKind::Str("k".into())));
    assert!(k.contains(&TokenKind::Colon));
    assert!(k.contains(&TokenKind::NotEq));
    assert_eq!(k.iter().filter(|t| **t == TokenKind::FieldEnd).count(), 2);
    assert_eq!(error_count("f\"{d['k'][1:2]} {a != b}\""), 0);
}

#[test]
fn test_fstring_single_closing_brace() {
    assert_eq!(first_error("f'a}b'"), "f-string: single '}' is not allowed");
}

#[test]
fn test_unterminated_fstring() {
    assert!(first_error("x = f'abc\n").starts_with("unterminated string literal"));
}

// ─────────────────────────────────────────────────────────────────────
// Spans & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spans_are_line_and_zero_based_column() {
    let sf = SourceFile::new("test.py", "x = 1\n  \nyy = 22\n");
    let tokens = Lexer::new(&sf).lex().tokens;
    let yy = tokens
        .iter()
        .find(|t| t.kind == name("yy"))
        .expect("yy token");
    assert_eq!(yy.span.start(), (3, 0));
    let lit = tokens
        .iter()
        .find(|t| t.kind == TokenKind::Int(22))
        .expect("22 token");
    assert_eq!(lit.span.start(), (3, 5));
    assert_eq!(lit.span.end(), (3, 7));
}

#[test]
fn test_error_cap() {
    let src = "$ ".repeat(40);
    let sf = SourceFile::new("test.py", src.as_str());
    let result = Lexer::new(&sf).lex();
    assert!(result.errors.is_full());
    assert_eq!(result.errors.items.len(), gradecraft_types::MAX_DIAGNOSTICS);
    assert_eq!(result.tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
}

#[test]
fn test_diagnostics_carry_source_line() {
    let sf = SourceFile::new("test.py", "ok = 1\nbad = ?\n");
    let result = Lexer::new(&sf).lex();
    assert_eq!(result.errors.items[0].source_line, "bad = ?");
}

#[test]
fn test_determinism_100_iterations() {
    let src = "def f(a, b=2, *c, **d):\n    return f'{a}{b!r}'\n";
    let first = kinds(src);
    for _ in 0..100 {
        assert_eq!(kinds(src), first);
    }
}
