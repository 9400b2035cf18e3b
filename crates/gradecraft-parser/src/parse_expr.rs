//! Expression parsing with Python's operator precedence.
//!
//! Precedence (lowest → highest):
//! 1. `lambda`, `x if c else y`
//! 2. `or`
//! 3. `and`
//! 4. `not`
//! 5. comparisons, chained: `<`, `>`, `==`, `>=`, `<=`, `!=`, `in`, `not in`, `is`, `is not`
//! 6. `|`
//! 7. `^`
//! 8. `&`
//! 9. `<<`, `>>`
//! 10. `+`, `-`
//! 11. `*`, `/`, `//`, `%`, `@`
//! 12. unary `+`, `-`, `~`
//! 13. `**` (right-associative, binds tighter than a unary on its left)
//! 14. `.attr`, `(call)`, `[subscript]`

use gradecraft_lexer::token::TokenKind;
use gradecraft_types::ast::*;
use gradecraft_types::DiagnosticKind;

use crate::parse_stmt::TargetContext;
use crate::parser::{Parser, MAX_EXPR_DEPTH};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Points
    // ══════════════════════════════════════════════════════════════════════════

    /// `star_expressions`: one or more comma-separated expressions, any of
    /// which may be starred. More than one (or a trailing comma) makes a tuple.
    pub(crate) fn parse_star_expressions(&mut self) -> Option<Expr> {
        let first = self.parse_star_or_expression()?;
        if !self.check(&TokenKind::Comma) {
            if matches!(first.kind, ExprKind::Starred(_)) {
                self.error_at(
                    DiagnosticKind::Syntax,
                    "can't use starred expression here",
                    first.span,
                );
                return None;
            }
            return Some(first);
        }

        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !can_start_expression(self.peek_kind()) {
                break;
            }
            items.push(self.parse_star_or_expression()?);
        }
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    fn parse_star_or_expression(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::Star) {
            let start = self.advance().span;
            let value = self.parse_bitor()?;
            let span = start.merge(value.span);
            return Some(Expr::new(ExprKind::Starred(Box::new(value)), span));
        }
        self.parse_expression()
    }

    /// Parse a single expression.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        let expr = self.nested(Self::parse_ternary)?;
        if self.check(&TokenKind::Walrus) {
            let span = self.current_span();
            self.unsupported("assignment expressions (':=') are not supported", span);
            return None;
        }
        Some(expr)
    }

    /// Run `parse` one nesting level deeper, refusing pathological depth.
    fn nested(&mut self, parse: fn(&mut Self) -> Option<Expr>) -> Option<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.error_at_current("expression is too deeply nested");
            self.expr_depth -= 1;
            return None;
        }
        let result = parse(self);
        self.expr_depth -= 1;
        result
    }

    /// `lambda` or `body if test else orelse`
    fn parse_ternary(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if !self.eat(&TokenKind::If) {
            return Some(body);
        }
        let test = self.parse_or()?;
        self.expect(&TokenKind::Else)?;
        let orelse = self.parse_expression()?;
        let span = body.span.merge(orelse.span);
        Some(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            span,
        ))
    }

    /// `lambda params: body`
    fn parse_lambda(&mut self) -> Option<Expr> {
        let start = self.advance().span; // eat `lambda`
        let params = self.parse_params(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_expression()?;
        let span = start.merge(body.span);
        Some(Expr::new(
            ExprKind::Lambda {
                params: Box::new(params),
                body: Box::new(body),
            },
            span,
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Boolean & Comparison Levels
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = bool_op(left, BoolOp::Or, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = bool_op(left, BoolOp::And, right);
        }
        Some(left)
    }

    fn parse_not(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span;
            let operand = self.nested(Self::parse_not)?;
            let span = start.merge(operand.span);
            return Some(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    /// `a < b <= c` keeps every operator with its right operand.
    fn parse_comparison(&mut self) -> Option<Expr> {
        let left = self.parse_bitor()?;
        let mut comparisons = Vec::new();
        while let Some((op, width)) = self.comparison_op() {
            for _ in 0..width {
                self.advance();
            }
            comparisons.push((op, self.parse_bitor()?));
        }
        if comparisons.is_empty() {
            return Some(left);
        }
        let end = comparisons
            .last()
            .map(|(_, e)| e.span)
            .unwrap_or(left.span);
        let span = left.span.merge(end);
        Some(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                comparisons,
            },
            span,
        ))
    }

    /// The comparison operator at the cursor and how many tokens it spans.
    fn comparison_op(&self) -> Option<(CmpOp, usize)> {
        Some(match self.peek_kind() {
            TokenKind::Less => (CmpOp::Lt, 1),
            TokenKind::Greater => (CmpOp::Gt, 1),
            TokenKind::EqEq => (CmpOp::Eq, 1),
            TokenKind::GreaterEq => (CmpOp::GtE, 1),
            TokenKind::LessEq => (CmpOp::LtE, 1),
            TokenKind::NotEq => (CmpOp::NotEq, 1),
            TokenKind::In => (CmpOp::In, 1),
            TokenKind::Not if *self.look_ahead(1) == TokenKind::In => (CmpOp::NotIn, 2),
            TokenKind::Is if *self.look_ahead(1) == TokenKind::Not => (CmpOp::IsNot, 2),
            TokenKind::Is => (CmpOp::Is, 1),
            _ => return None,
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Arithmetic & Bitwise Levels
    // ══════════════════════════════════════════════════════════════════════════

    pub(crate) fn parse_bitor(&mut self) -> Option<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_bitxor()?;
            left = binary(left, BinOp::BitOr, right);
        }
        Some(left)
    }

    fn parse_bitxor(&mut self) -> Option<Expr> {
        let mut left = self.parse_bitand()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.parse_bitand()?;
            left = binary(left, BinOp::BitXor, right);
        }
        Some(left)
    }

    fn parse_bitand(&mut self) -> Option<Expr> {
        let mut left = self.parse_shift()?;
        while self.eat(&TokenKind::Amper) {
            let right = self.parse_shift()?;
            left = binary(left, BinOp::BitAnd, right);
        }
        Some(left)
    }

    fn parse_shift(&mut self) -> Option<Expr> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::LShift => BinOp::LShift,
                TokenKind::RShift => BinOp::RShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_arith()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    fn parse_arith(&mut self) -> Option<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    fn parse_term(&mut self) -> Option<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                TokenKind::At => {
                    let span = self.current_span();
                    self.unsupported("the '@' operator is not supported", span);
                    return None;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = binary(left, op, right);
        }
        Some(left)
    }

    /// Unary `+`, `-`, `~`.
    fn parse_factor(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        let operand = self.nested(Self::parse_factor)?;
        let span = start.merge(operand.span);

        // Fold `-<literal>` so negative constants are plain literals.
        let kind = match (op, &operand.kind) {
            (UnaryOp::Neg, ExprKind::Int(n)) if *n != i64::MIN => ExprKind::Int(-n),
            (UnaryOp::Neg, ExprKind::Float(n)) => ExprKind::Float(-n),
            _ => ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        };
        Some(Expr::new(kind, span))
    }

    /// `primary ['**' factor]`
    fn parse_power(&mut self) -> Option<Expr> {
        let base = self.parse_postfix()?;
        if !self.eat(&TokenKind::DoubleStar) {
            return Some(base);
        }
        let exponent = self.nested(Self::parse_factor)?;
        Some(binary(base, BinOp::Pow, exponent))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Trailers: attribute access, calls, subscripts
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_identifier()?;
                    let span = expr.span.merge(attr.span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = expr.span.merge(self.previous_span());
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                _ => return Some(expr),
            }
        }
    }

    /// Arguments after `(` through the closing `)`.
    pub(crate) fn parse_call_args(&mut self) -> Option<Vec<Arg>> {
        let mut args = Vec::new();
        let mut seen_keyword = false;

        while !self.check(&TokenKind::RParen) {
            match self.peek_kind().clone() {
                TokenKind::Star => {
                    self.advance();
                    args.push(Arg::Star(self.parse_expression()?));
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    seen_keyword = true;
                    args.push(Arg::DoubleStar(self.parse_expression()?));
                }
                TokenKind::Name(_) if *self.look_ahead(1) == TokenKind::Eq => {
                    let name = self.expect_identifier()?;
                    self.advance(); // eat `=`
                    let value = self.parse_expression()?;
                    seen_keyword = true;
                    args.push(Arg::Keyword { name, value });
                }
                _ => {
                    let mut value = self.parse_expression()?;
                    if self.check(&TokenKind::Eq) {
                        self.error_at(
                            DiagnosticKind::Syntax,
                            "expression cannot contain assignment, perhaps you meant \"==\"?",
                            value.span,
                        );
                        return None;
                    }
                    if self.check(&TokenKind::For) {
                        // A bare generator argument: `sum(x for x in xs)`
                        let generators = self.parse_comprehensions()?;
                        let span = value.span.merge(self.previous_span());
                        value = Expr::new(
                            ExprKind::ListComp {
                                elt: Box::new(value),
                                generators,
                            },
                            span,
                        );
                        if !args.is_empty() || self.check(&TokenKind::Comma) {
                            self.error_at(
                                DiagnosticKind::Syntax,
                                "Generator expression must be parenthesized",
                                span,
                            );
                            return None;
                        }
                    }
                    if seen_keyword {
                        self.error_at(
                            DiagnosticKind::Syntax,
                            "positional argument follows keyword argument",
                            value.span,
                        );
                        return None;
                    }
                    args.push(Arg::Positional(value));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RParen)?;
        Some(args)
    }

    /// The inside of `[...]` after a value: an index, a slice, or a tuple of them.
    fn parse_subscript(&mut self) -> Option<Expr> {
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    fn parse_slice_item(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Some(expr);
            }
            Some(Box::new(expr))
        };
        self.advance(); // eat `:`

        let bound_ends = |kind: &TokenKind| {
            matches!(
                kind,
                TokenKind::Colon | TokenKind::RBracket | TokenKind::Comma
            )
        };
        let upper = if bound_ends(self.peek_kind()) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat(&TokenKind::Colon) && !bound_ends(self.peek_kind()) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Slice { lower, upper, step }, span))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Atoms
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_atom(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(n) => ExprKind::Float(n),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            // `...` only appears as a placeholder body; it evaluates like None.
            TokenKind::None | TokenKind::Ellipsis => ExprKind::None,
            TokenKind::Str(_) | TokenKind::FStringStart => return self.parse_strings(),
            TokenKind::LParen => return self.parse_paren(),
            TokenKind::LBracket => return self.parse_list(),
            TokenKind::LBrace => return self.parse_brace(),
            TokenKind::Yield | TokenKind::Await => {
                let keyword = self.peek_kind().to_string();
                self.unsupported(format!("'{keyword}' is not supported"), start);
                return None;
            }
            _ => {
                self.invalid_syntax();
                return None;
            }
        };
        self.advance();
        Some(Expr::new(kind, start))
    }

    /// Adjacent string and f-string literals, concatenated.
    fn parse_strings(&mut self) -> Option<Expr> {
        let start = self.current_span();
        let mut parts = Vec::new();
        let mut formatted = false;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    push_literal(&mut parts, s);
                }
                TokenKind::FStringStart => {
                    self.advance();
                    formatted = true;
                    self.parse_fstring_body(&mut parts)?;
                }
                _ => break,
            }
        }
        let span = start.merge(self.previous_span());

        if formatted {
            return Some(Expr::new(ExprKind::FString(parts), span));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(text)) => text,
            _ => String::new(),
        };
        Some(Expr::new(ExprKind::Str(text), span))
    }

    /// Pieces of one f-string after its `FStringStart`, through `FStringEnd`.
    fn parse_fstring_body(&mut self, parts: &mut Vec<FStringPart>) -> Option<()> {
        loop {
            match self.peek_kind().clone() {
                TokenKind::FStringText(text) => {
                    self.advance();
                    push_literal(parts, text);
                }
                TokenKind::FieldStart => {
                    self.advance();
                    if self.check(&TokenKind::FieldEnd) {
                        self.error_at_current("f-string: empty expression not allowed");
                        return None;
                    }
                    let value = self.parse_star_expressions()?;

                    // `{expr=}` echoes the expression text before its value.
                    let debug = self.eat(&TokenKind::Eq);
                    if debug {
                        let text = self.source_text(value.span);
                        push_literal(parts, format!("{text}="));
                    }
                    let mut conversion = None;
                    if let TokenKind::FieldConversion(c) = self.peek_kind().clone() {
                        self.advance();
                        conversion = Some(c);
                    }
                    let spec = match self.peek_kind().clone() {
                        TokenKind::FieldSpec(spec) => {
                            self.advance();
                            spec
                        }
                        _ => String::new(),
                    };
                    if debug && conversion.is_none() && spec.is_empty() {
                        conversion = Some('r');
                    }
                    if !self.eat(&TokenKind::FieldEnd) {
                        self.error_at_current("f-string: expecting '}'");
                        return None;
                    }
                    parts.push(FStringPart::Field {
                        value,
                        conversion,
                        spec,
                    });
                }
                TokenKind::FStringEnd => {
                    self.advance();
                    return Some(());
                }
                _ => {
                    self.error_at_current("f-string: expecting '}'");
                    return None;
                }
            }
        }
    }

    /// `()`, `(expr)`, `(a, b)`, `(x for x in xs)`
    fn parse_paren(&mut self) -> Option<Expr> {
        let start = self.advance().span; // eat `(`
        if self.eat(&TokenKind::RParen) {
            let span = start.merge(self.previous_span());
            return Some(Expr::new(ExprKind::Tuple(Vec::new()), span));
        }

        let first = self.parse_star_or_expression()?;
        if self.check(&TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            self.expect(&TokenKind::RParen)?;
            let span = start.merge(self.previous_span());
            return Some(Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
                span,
            ));
        }
        if self.eat(&TokenKind::RParen) {
            return Some(first);
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_star_or_expression()?);
        }
        self.expect(&TokenKind::RParen)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    /// `[a, b]` or `[elt for ...]`
    fn parse_list(&mut self) -> Option<Expr> {
        let start = self.advance().span; // eat `[`
        let mut items = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            let first = self.parse_star_or_expression()?;
            if self.check(&TokenKind::For) {
                let elt = self.comprehension_element(first)?;
                let generators = self.parse_comprehensions()?;
                self.expect(&TokenKind::RBracket)?;
                let span = start.merge(self.previous_span());
                return Some(Expr::new(
                    ExprKind::ListComp {
                        elt: Box::new(elt),
                        generators,
                    },
                    span,
                ));
            }
            items.push(first);
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBracket) {
                    break;
                }
                items.push(self.parse_star_or_expression()?);
            }
        }
        self.expect(&TokenKind::RBracket)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::List(items), span))
    }

    /// `{}`, `{k: v}`, `{k: v for ...}`, `{a, b}`, `{x for ...}`
    ///
    /// Set comprehensions have no node of their own and become `set([...])`.
    fn parse_brace(&mut self) -> Option<Expr> {
        let start = self.advance().span; // eat `{`
        if self.eat(&TokenKind::RBrace) {
            let span = start.merge(self.previous_span());
            return Some(Expr::new(ExprKind::Dict(Vec::new()), span));
        }
        if self.check(&TokenKind::DoubleStar) {
            let span = self.current_span();
            self.unsupported("dict unpacking in displays is not supported", span);
            return None;
        }

        let first = self.parse_star_or_expression()?;

        if self.eat(&TokenKind::Colon) {
            let value = self.parse_expression()?;
            if self.check(&TokenKind::For) {
                let generators = self.parse_comprehensions()?;
                self.expect(&TokenKind::RBrace)?;
                let span = start.merge(self.previous_span());
                return Some(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        generators,
                    },
                    span,
                ));
            }
            let mut pairs = vec![(first, value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.parse_expression()?;
                pairs.push((key, value));
            }
            self.expect(&TokenKind::RBrace)?;
            let span = start.merge(self.previous_span());
            return Some(Expr::new(ExprKind::Dict(pairs), span));
        }

        if self.check(&TokenKind::For) {
            let elt = self.comprehension_element(first)?;
            let generators = self.parse_comprehensions()?;
            self.expect(&TokenKind::RBrace)?;
            let span = start.merge(self.previous_span());
            let list = Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(elt),
                    generators,
                },
                span,
            );
            let func = Expr::new(ExprKind::Name("set".to_string()), start);
            return Some(Expr::new(
                ExprKind::Call {
                    func: Box::new(func),
                    args: vec![Arg::Positional(list)],
                },
                span,
            ));
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_star_or_expression()?);
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Set(items), span))
    }

    fn comprehension_element(&mut self, elt: Expr) -> Option<Expr> {
        if matches!(elt.kind, ExprKind::Starred(_)) {
            self.error_at(
                DiagnosticKind::Syntax,
                "iterable unpacking cannot be used in comprehension",
                elt.span,
            );
            return None;
        }
        Some(elt)
    }

    /// One or more `for targets in iter [if cond]*` clauses.
    fn parse_comprehensions(&mut self) -> Option<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.validate_target(&target, TargetContext::Assign)?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Some(generators)
    }

    /// Loop targets up to `in`: `x`, `i, x`, `(a, b), *rest`
    pub(crate) fn parse_target_list(&mut self) -> Option<Expr> {
        let first = self.parse_target()?;
        if !self.check(&TokenKind::Comma) {
            return Some(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_target()?);
        }
        let span = start.merge(self.previous_span());
        Some(Expr::new(ExprKind::Tuple(items), span))
    }

    fn parse_target(&mut self) -> Option<Expr> {
        if self.check(&TokenKind::Star) {
            let start = self.advance().span;
            let value = self.parse_bitor()?;
            let span = start.merge(value.span);
            return Some(Expr::new(ExprKind::Starred(Box::new(value)), span));
        }
        self.parse_bitor()
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Parameters
    // ══════════════════════════════════════════════════════════════════════════

    /// A parameter list up to (not including) `closer`.
    ///
    /// `def` parameters may carry annotations; `lambda` parameters may not.
    /// A `/` positional-only marker is accepted and ignored.
    pub(crate) fn parse_params(&mut self, closer: &TokenKind, annotations: bool) -> Option<Params> {
        let mut params = Params::default();
        let mut seen: Vec<String> = Vec::new();
        let mut seen_default = false;
        let mut after_star = false;

        while !self.check(closer) {
            if params.kwarg.is_some() {
                self.error_at_current("arguments cannot follow var-keyword argument");
                return None;
            }
            match self.peek_kind() {
                TokenKind::Slash => {
                    self.advance();
                    if params.positional.is_empty() || after_star {
                        self.invalid_syntax();
                        return None;
                    }
                }
                TokenKind::Star => {
                    let star = self.advance().span;
                    if after_star {
                        self.error_at(
                            DiagnosticKind::Syntax,
                            "* argument may appear only once",
                            star,
                        );
                        return None;
                    }
                    after_star = true;
                    if matches!(self.peek_kind(), TokenKind::Name(_)) {
                        let name = self.parse_param_name(&mut seen, annotations)?;
                        params.vararg = Some(name);
                    }
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    let name = self.parse_param_name(&mut seen, annotations)?;
                    params.kwarg = Some(name);
                }
                _ => {
                    let name = self.expect_identifier()?;
                    self.check_duplicate(&mut seen, &name)?;
                    let annotation = if annotations && self.eat(&TokenKind::Colon) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    let default = if self.eat(&TokenKind::Eq) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    let span = name.span.merge(self.previous_span());

                    if !after_star {
                        if default.is_some() {
                            seen_default = true;
                        } else if seen_default {
                            self.error_at(
                                DiagnosticKind::Syntax,
                                "non-default argument follows default argument",
                                span,
                            );
                            return None;
                        }
                    }

                    let param = Param {
                        name,
                        default,
                        annotation,
                        span,
                    };
                    if after_star {
                        params.kwonly.push(param);
                    } else {
                        params.positional.push(param);
                    }
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        if after_star && params.vararg.is_none() && params.kwonly.is_empty() {
            self.error_at_current("named arguments must follow bare *");
            return None;
        }
        Some(params)
    }

    /// The name after `*` or `**`, with its annotation skipped.
    fn parse_param_name(&mut self, seen: &mut Vec<String>, annotations: bool) -> Option<Ident> {
        let name = self.expect_identifier()?;
        self.check_duplicate(seen, &name)?;
        if annotations && self.eat(&TokenKind::Colon) {
            self.parse_expression()?;
        }
        Some(name)
    }

    fn check_duplicate(&mut self, seen: &mut Vec<String>, name: &Ident) -> Option<()> {
        if seen.contains(&name.name) {
            self.error_at(
                DiagnosticKind::Syntax,
                format!("duplicate argument '{}' in function definition", name.name),
                name.span,
            );
            return None;
        }
        seen.push(name.name.clone());
        Some(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Node helpers
// ══════════════════════════════════════════════════════════════════════════════

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn bool_op(left: Expr, op: BoolOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

/// Append literal text, merging with a preceding literal piece.
fn push_literal(parts: &mut Vec<FStringPart>, text: String) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(&text);
    } else {
        parts.push(FStringPart::Literal(text));
    }
}

/// Whether `kind` can begin an expression; a trailing comma is followed by
/// something else.
fn can_start_expression(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::FStringStart
            | TokenKind::True
            | TokenKind::False
            | TokenKind::None
            | TokenKind::Ellipsis
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Tilde
            | TokenKind::Not
            | TokenKind::Lambda
            | TokenKind::Star
            | TokenKind::Yield
            | TokenKind::Await
    )
}
