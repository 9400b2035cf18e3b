//! gradecraft parser: converts a token stream into a [`Module`] AST.
//!
//! [`parse_source`] runs the lexer and parser together and merges their
//! diagnostics, which is what every caller outside this crate wants.

mod parse_expr;
mod parse_stmt;
mod parser;

pub use parser::{ParseResult, Parser};

use gradecraft_lexer::Lexer;
use gradecraft_types::ast::Module;
use gradecraft_types::SourceFile;

/// Lex and parse a whole submission.
///
/// The returned `module` is `Some` only when neither pass reported anything.
pub fn parse_source(source_file: &SourceFile) -> ParseResult {
    let lexed = Lexer::new(source_file).lex();
    let parsed = Parser::new(lexed.tokens, source_file).parse();

    let mut errors = lexed.errors;
    errors.extend(parsed.errors);
    let module: Option<Module> = if errors.has_errors() {
        None
    } else {
        parsed.module
    };
    ParseResult { module, errors }
}
