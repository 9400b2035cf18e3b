//! Statement parsing: the module body, blocks, compound and simple statements.

use gradecraft_lexer::token::TokenKind;
use gradecraft_types::ast::*;
use gradecraft_types::{DiagnosticKind, Span};

use crate::parser::{Parser, MAX_BLOCK_DEPTH};

/// Which assignment-like construct a target is being checked for.
#[derive(Clone, Copy)]
pub(crate) enum TargetContext {
    Assign,
    Delete,
}

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Module & Blocks
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_module(&mut self) -> Option<Module> {
        let start = self.current_span();
        let mut body = Vec::new();

        while !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                    continue;
                }
                TokenKind::Indent => {
                    self.unexpected_indent();
                    continue;
                }
                _ => {}
            }
            match self.parse_statement() {
                Some(stmts) => body.extend(stmts),
                None => self.synchronize(),
            }
        }

        let span = start.merge(self.previous_span());
        Some(Module { body, span })
    }

    fn unexpected_indent(&mut self) {
        let span = self.current_span();
        self.error_at(DiagnosticKind::Indentation, "unexpected indent", span);
        self.skip_block();
    }

    /// Parse the suite after a compound statement's `:`.
    ///
    /// Either simple statements on the same line, or a `Newline` followed by
    /// an indented block. `what` and `header` name the owning statement for
    /// the "expected an indented block" message.
    pub(crate) fn parse_block(&mut self, what: &str, header: Span) -> Option<Vec<Stmt>> {
        if !self.check(&TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        self.advance();

        if !self.check(&TokenKind::Indent) {
            let span = self.current_span();
            self.error_at(
                DiagnosticKind::Indentation,
                format!(
                    "expected an indented block after {what} on line {}",
                    header.start_line
                ),
                span,
            );
            return None;
        }
        self.advance();

        self.block_depth += 1;
        if self.block_depth > MAX_BLOCK_DEPTH {
            let span = self.current_span();
            self.error_at(DiagnosticKind::Indentation, "too many levels of indentation", span);
            self.block_depth -= 1;
            return None;
        }

        let mut body = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.at_end() {
            if self.too_many_errors() {
                break;
            }
            if self.check(&TokenKind::Indent) {
                self.unexpected_indent();
                continue;
            }
            match self.parse_statement() {
                Some(stmts) => body.extend(stmts),
                None => self.synchronize(),
            }
        }
        self.eat(&TokenKind::Dedent);
        self.block_depth -= 1;
        Some(body)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse one statement line. Simple statements joined by `;` yield several.
    pub(crate) fn parse_statement(&mut self) -> Option<Vec<Stmt>> {
        let stmt = match self.peek_kind() {
            TokenKind::Def => self.parse_function_def(Vec::new()).map(Stmt::FunctionDef),
            TokenKind::Class => self.parse_class_def(Vec::new()).map(Stmt::ClassDef),
            TokenKind::At => self.parse_decorated(),
            TokenKind::If => self.parse_if().map(Stmt::If),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Try => self.parse_try(),
            TokenKind::With => {
                let span = self.current_span();
                self.unsupported("'with' statements are not supported", span);
                None
            }
            TokenKind::Async => {
                let span = self.current_span();
                self.unsupported("'async' functions are not supported", span);
                None
            }
            _ => return self.parse_simple_statements(),
        };
        stmt.map(|s| vec![s])
    }

    /// `simple_stmt (';' simple_stmt)* [';'] NEWLINE`
    pub(crate) fn parse_simple_statements(&mut self) -> Option<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_statement()?];
        while self.eat(&TokenKind::Semi) {
            if self.check(&TokenKind::Newline) || self.at_end() {
                break;
            }
            stmts.push(self.parse_simple_statement()?);
        }

        if let [Stmt::Expr(ExprStmt { value, .. })] = stmts.as_slice() {
            let print_statement = matches!(&value.kind, ExprKind::Name(n) if n == "print")
                && !matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof);
            if print_statement {
                let span = value.span;
                self.error_at(
                    DiagnosticKind::Syntax,
                    "Missing parentheses in call to 'print'. Did you mean print(...)?",
                    span,
                );
                return None;
            }
        }

        self.expect_statement_end()?;
        Some(stmts)
    }

    fn parse_simple_statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Pass => Some(Stmt::Pass(self.advance().span)),
            TokenKind::Break => {
                self.advance();
                if self.loop_depth == 0 {
                    self.error_at(DiagnosticKind::Syntax, "'break' outside loop", start);
                    return None;
                }
                Some(Stmt::Break(start))
            }
            TokenKind::Continue => {
                self.advance();
                if self.loop_depth == 0 {
                    self.error_at(
                        DiagnosticKind::Syntax,
                        "'continue' not properly in loop",
                        start,
                    );
                    return None;
                }
                Some(Stmt::Continue(start))
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::Raise => self.parse_raise(),
            TokenKind::Global | TokenKind::Nonlocal => self.parse_name_list(),
            TokenKind::Del => self.parse_delete(),
            TokenKind::Assert => self.parse_assert(),
            TokenKind::Import => self.parse_import().map(Stmt::Import),
            TokenKind::From => self.parse_import_from().map(Stmt::ImportFrom),
            TokenKind::Yield | TokenKind::Await => {
                let keyword = self.peek_kind().to_string();
                self.unsupported(format!("'{keyword}' is not supported"), start);
                None
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Assignments, augmented and annotated assignments, and bare expressions.
    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        let first = self.parse_star_expressions()?;

        match self.peek_kind().clone() {
            TokenKind::Eq => {
                let mut targets = vec![first];
                let value = loop {
                    self.advance(); // eat `=`
                    if self.check(&TokenKind::Yield) {
                        let span = self.current_span();
                        self.unsupported("'yield' is not supported", span);
                        return None;
                    }
                    let next = self.parse_star_expressions()?;
                    if self.check(&TokenKind::Eq) {
                        targets.push(next);
                    } else {
                        break next;
                    }
                };
                for target in &targets {
                    self.validate_target(target, TargetContext::Assign)?;
                }
                let span = start.merge(self.previous_span());
                Some(Stmt::Assign(Assign {
                    targets,
                    value,
                    span,
                }))
            }
            TokenKind::AugAssign(op) => {
                if !matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
                ) {
                    let message = format!(
                        "'{}' is an illegal expression for augmented assignment",
                        describe(&first)
                    );
                    self.error_at(DiagnosticKind::Syntax, message, first.span);
                    return None;
                }
                self.advance();
                let value = self.parse_star_expressions()?;
                let span = start.merge(self.previous_span());
                Some(Stmt::AugAssign(AugAssign {
                    target: first,
                    op: aug_op(op),
                    value,
                    span,
                }))
            }
            TokenKind::Colon => {
                if !matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
                ) {
                    let message = if matches!(first.kind, ExprKind::Tuple(_)) {
                        "only single target (not tuple) can be annotated".to_string()
                    } else {
                        format!("illegal target for annotation: {}", describe(&first))
                    };
                    self.error_at(DiagnosticKind::Syntax, message, first.span);
                    return None;
                }
                self.advance();
                let annotation = self.parse_expression()?;
                let value = if self.eat(&TokenKind::Eq) {
                    Some(self.parse_star_expressions()?)
                } else {
                    None
                };
                let span = start.merge(self.previous_span());
                Some(Stmt::AnnAssign(AnnAssign {
                    target: first,
                    annotation,
                    value,
                    span,
                }))
            }
            _ => {
                let span = first.span;
                Some(Stmt::Expr(ExprStmt { value: first, span }))
            }
        }
    }

    /// Check that `target` can be bound (or deleted), reporting the first
    /// offending sub-expression.
    pub(crate) fn validate_target(&mut self, target: &Expr, context: TargetContext) -> Option<()> {
        match &target.kind {
            ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Some(()),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.validate_target(item, context)?;
                }
                Some(())
            }
            ExprKind::Starred(inner) if matches!(context, TargetContext::Assign) => {
                self.validate_target(inner, context)
            }
            _ => {
                let verb = match context {
                    TargetContext::Assign => "assign to",
                    TargetContext::Delete => "delete",
                };
                let message = format!("cannot {verb} {}", describe(target));
                self.error_at(DiagnosticKind::Syntax, message, target.span);
                None
            }
        }
    }

    // ── Simple statements ────────────────────────────────────────────────────

    fn parse_return(&mut self) -> Option<Stmt> {
        let start = self.advance().span; // eat `return`
        if self.function_depth == 0 {
            self.error_at(DiagnosticKind::Syntax, "'return' outside function", start);
            return None;
        }
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_star_expressions()?)
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::Return(Return { value, span }))
    }

    /// `raise [exc [from cause]]`; the cause is parsed and discarded.
    fn parse_raise(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let exc = if self.at_statement_end() {
            None
        } else {
            let exc = self.parse_expression()?;
            if self.eat(&TokenKind::From) {
                self.parse_expression()?;
            }
            Some(exc)
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::Raise(Raise { exc, span }))
    }

    fn parse_name_list(&mut self) -> Option<Stmt> {
        let keyword = self.advance();
        let mut names = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        let span = keyword.span.merge(self.previous_span());
        let list = NameList { names, span };
        if keyword.kind == TokenKind::Global {
            return Some(Stmt::Global(list));
        }
        if self.function_depth == 0 {
            self.error_at(
                DiagnosticKind::Syntax,
                "nonlocal declaration not allowed at module level",
                span,
            );
            return None;
        }
        Some(Stmt::Nonlocal(list))
    }

    fn parse_delete(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let mut targets = vec![self.parse_bitor()?];
        while self.eat(&TokenKind::Comma) {
            if self.at_statement_end() {
                break;
            }
            targets.push(self.parse_bitor()?);
        }
        for target in &targets {
            self.validate_target(target, TargetContext::Delete)?;
        }
        let span = start.merge(self.previous_span());
        Some(Stmt::Delete(Delete { targets, span }))
    }

    fn parse_assert(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let test = self.parse_expression()?;
        let msg = if self.eat(&TokenKind::Comma) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::Assert(Assert { test, msg, span }))
    }

    // ── Imports ──────────────────────────────────────────────────────────────

    /// `import a.b [as c], d`
    fn parse_import(&mut self) -> Option<Import> {
        let start = self.advance().span;
        let mut names = vec![self.parse_alias(true)?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.parse_alias(true)?);
        }
        let span = start.merge(self.previous_span());
        Some(Import { names, span })
    }

    /// `from [.]*module import (names | '*' | '(' names ')')`
    fn parse_import_from(&mut self) -> Option<ImportFrom> {
        let start = self.advance().span;

        let mut level = 0u32;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => level += 1,
                TokenKind::Ellipsis => level += 3,
                _ => break,
            }
            self.advance();
        }

        let mut module = ".".repeat(level as usize);
        if matches!(self.peek_kind(), TokenKind::Name(_)) {
            module.push_str(&self.parse_dotted_name()?);
        } else if level == 0 {
            self.invalid_syntax();
            return None;
        }

        self.expect(&TokenKind::Import)?;

        let mut names = Vec::new();
        if self.check(&TokenKind::Star) {
            let span = self.advance().span;
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
                span,
            });
        } else {
            let parenthesized = self.eat(&TokenKind::LParen);
            names.push(self.parse_alias(false)?);
            while self.eat(&TokenKind::Comma) {
                if parenthesized && self.check(&TokenKind::RParen) {
                    break;
                }
                names.push(self.parse_alias(false)?);
            }
            if parenthesized {
                self.expect(&TokenKind::RParen)?;
            }
        }

        let span = start.merge(self.previous_span());
        Some(ImportFrom {
            module,
            level,
            names,
            span,
        })
    }

    fn parse_alias(&mut self, dotted: bool) -> Option<Alias> {
        let start = self.current_span();
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_identifier()?.name
        };
        let asname = if self.eat(&TokenKind::As) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Alias { name, asname, span })
    }

    fn parse_dotted_name(&mut self) -> Option<String> {
        let mut name = self.expect_identifier()?.name;
        while self.check(&TokenKind::Dot) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_identifier()?.name);
        }
        Some(name)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Compound statements
    // ══════════════════════════════════════════════════════════════════════════

    /// `@decorator NEWLINE ... (def | class)`
    fn parse_decorated(&mut self) -> Option<Stmt> {
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_expression()?);
            self.expect(&TokenKind::Newline)?;
        }
        match self.peek_kind() {
            TokenKind::Def => self.parse_function_def(decorators).map(Stmt::FunctionDef),
            TokenKind::Class => self.parse_class_def(decorators).map(Stmt::ClassDef),
            _ => {
                self.invalid_syntax();
                None
            }
        }
    }

    /// `def name(params) [-> annotation]: block`
    fn parse_function_def(&mut self, decorators: Vec<Expr>) -> Option<FunctionDef> {
        let start = self.advance().span; // eat `def`
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        let returns = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Colon)?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block("function definition", start);
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        let span = start.merge(self.previous_span());
        Some(FunctionDef {
            name,
            params,
            body: body?,
            decorators,
            returns,
            span,
        })
    }

    /// `class Name[(bases)]: block`
    ///
    /// Keyword arguments in the base list (`metaclass=...`) are accepted and
    /// ignored.
    fn parse_class_def(&mut self, decorators: Vec<Expr>) -> Option<ClassDef> {
        let start = self.advance().span; // eat `class`
        let name = self.expect_identifier()?;
        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            for arg in self.parse_call_args()? {
                if let Arg::Positional(expr) = arg {
                    bases.push(expr);
                }
            }
        }
        self.expect(&TokenKind::Colon)?;

        // A class body is not a function scope, even when nested in one.
        let saved_functions = std::mem::replace(&mut self.function_depth, 0);
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block("class definition", start);
        self.function_depth = saved_functions;
        self.loop_depth = saved_loops;

        let span = start.merge(self.previous_span());
        Some(ClassDef {
            name,
            bases,
            body: body?,
            decorators,
            span,
        })
    }

    /// `if test: block (elif test: block)* [else: block]`
    fn parse_if(&mut self) -> Option<If> {
        let start = self.advance().span; // eat `if` or `elif`
        let test = self.parse_expression()?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_block("'if' statement", start)?;

        let orelse = match self.peek_kind() {
            TokenKind::Elif => vec![Stmt::If(self.parse_if()?)],
            TokenKind::Else => self.parse_else("'else' statement")?,
            _ => Vec::new(),
        };

        let span = start.merge(self.previous_span());
        Some(If {
            test,
            body,
            orelse,
            span,
        })
    }

    fn parse_else(&mut self, what: &str) -> Option<Vec<Stmt>> {
        let start = self.advance().span; // eat `else`
        self.expect(&TokenKind::Colon)?;
        self.parse_block(what, start)
    }

    /// Parse a loop body with `break`/`continue` enabled.
    fn parse_loop_body(&mut self, what: &str, header: Span) -> Option<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_block(what, header);
        self.loop_depth -= 1;
        body
    }

    /// `while test: block [else: block]`
    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_loop_body("'while' statement", start)?;
        let orelse = if self.check(&TokenKind::Else) {
            self.parse_else("'else' statement")?
        } else {
            Vec::new()
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::While(While {
            test,
            body,
            orelse,
            span,
        }))
    }

    /// `for targets in iter: block [else: block]`
    fn parse_for(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let target = self.parse_target_list()?;
        self.validate_target(&target, TargetContext::Assign)?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_star_expressions()?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_loop_body("'for' statement", start)?;
        let orelse = if self.check(&TokenKind::Else) {
            self.parse_else("'else' statement")?
        } else {
            Vec::new()
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::For(For {
            target,
            iter,
            body,
            orelse,
            span,
        }))
    }

    /// `try: block (except [type [as name]]: block)* [else: block] [finally: block]`
    fn parse_try(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_block("'try' statement", start)?;

        let mut handlers: Vec<ExceptHandler> = Vec::new();
        while self.check(&TokenKind::Except) {
            let handler_start = self.advance().span;
            if handlers.last().is_some_and(|h| h.kind.is_none()) {
                self.error_at(
                    DiagnosticKind::Syntax,
                    "default 'except:' must be last",
                    handler_start,
                );
                return None;
            }
            let (kind, name) = if self.check(&TokenKind::Colon) {
                (None, None)
            } else {
                let kind = self.parse_expression()?;
                let name = if self.eat(&TokenKind::As) {
                    Some(self.expect_identifier()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            self.expect(&TokenKind::Colon)?;
            let body = self.parse_block("'except' statement", handler_start)?;
            let span = handler_start.merge(self.previous_span());
            handlers.push(ExceptHandler {
                kind,
                name,
                body,
                span,
            });
        }

        let orelse = if !handlers.is_empty() && self.check(&TokenKind::Else) {
            self.parse_else("'else' statement")?
        } else {
            Vec::new()
        };
        let has_finally = self.check(&TokenKind::Finally);
        let finalbody = if has_finally {
            let finally_start = self.advance().span;
            self.expect(&TokenKind::Colon)?;
            self.parse_block("'finally' statement", finally_start)?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && !has_finally {
            self.error_at_current("expected 'except' or 'finally' block");
            return None;
        }

        let span = start.merge(self.previous_span());
        Some(Stmt::Try(Try {
            body,
            handlers,
            orelse,
            finalbody,
            span,
        }))
    }

    /// True at `Newline`, `;` or `Eof`.
    pub(crate) fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semi | TokenKind::Eof
        )
    }
}

/// Map an augmented-assignment token's operator text to a [`BinOp`].
fn aug_op(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" | "@" => BinOp::Mul,
        "/" => BinOp::Div,
        "//" => BinOp::FloorDiv,
        "%" => BinOp::Mod,
        "**" => BinOp::Pow,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "&" => BinOp::BitAnd,
        "<<" => BinOp::LShift,
        _ => BinOp::RShift,
    }
}

/// Python's wording for an expression that cannot be a target.
pub(crate) fn describe(expr: &Expr) -> &'static str {
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::None => "literal",
        ExprKind::FString(_) => "f-string expression",
        ExprKind::Call { .. } => "function call",
        ExprKind::Compare { .. } => "comparison",
        ExprKind::IfExp { .. } => "conditional expression",
        ExprKind::Lambda { .. } => "lambda",
        ExprKind::Dict(_) => "dict literal",
        ExprKind::Set(_) => "set display",
        ExprKind::ListComp { .. } => "list comprehension",
        ExprKind::DictComp { .. } => "dict comprehension",
        ExprKind::Tuple(_) => "tuple",
        ExprKind::List(_) => "list",
        ExprKind::Starred(_) => "starred",
        ExprKind::Name(_) => "name",
        ExprKind::Attribute { .. } => "attribute",
        ExprKind::Subscript { .. } | ExprKind::Slice { .. } => "subscript",
        ExprKind::Binary { .. } | ExprKind::Unary { .. } | ExprKind::BoolOp { .. } => {
            "expression"
        }
    }
}
