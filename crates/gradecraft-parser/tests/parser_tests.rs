//! Parser tests: statements, expressions, precedence, error reporting and
//! recovery.

use gradecraft_parser::parse_source;
use gradecraft_types::ast::*;
use gradecraft_types::{DiagnosticKind, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Parse source and return the module, panicking with the diagnostics on failure.
fn parse_ok(source: &str) -> Module {
    let sf = SourceFile::new("test.py", source);
    let result = parse_source(&sf);
    match result.module {
        Some(module) => module,
        None => panic!(
            "expected parse to succeed, got: {:?}",
            result
                .errors
                .items
                .iter()
                .map(|e| format!("{}:{} {}", e.line(), e.column(), e.message))
                .collect::<Vec<_>>()
        ),
    }
}

/// Parse source and return `(line, column, message)` for each diagnostic in order.
fn errors(source: &str) -> Vec<(u32, u32, String)> {
    let sf = SourceFile::new("test.py", source);
    let result = parse_source(&sf);
    assert!(result.module.is_none(), "errors imply no module");
    result
        .errors
        .into_sorted()
        .into_iter()
        .map(|d| (d.line(), d.column(), d.message))
        .collect()
}

fn first_error(source: &str) -> String {
    errors(source)
        .into_iter()
        .next()
        .map(|(_, _, m)| m)
        .unwrap_or_default()
}

/// The value expression of a single `x = <expr>` line.
fn assigned(source: &str) -> Expr {
    let module = parse_ok(source);
    match module.body.into_iter().next() {
        Some(Stmt::Assign(assign)) => assign.value,
        other => panic!("expected assignment, got {other:?}"),
    }
}

fn function<'m>(module: &'m Module, name: &str) -> &'m FunctionDef {
    module
        .body
        .iter()
        .find_map(|s| match s {
            Stmt::FunctionDef(f) if f.name.name == name => Some(f),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function {name}"))
}

// ─────────────────────────────────────────────────────────────────────
// Top-level statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_statement_kinds() {
    let module = parse_ok(
        "import math\nfrom os import path\nX = 1\ndef f():\n    pass\nclass C:\n    pass\nprint(X)\nif X:\n    pass\n",
    );
    let kinds: Vec<_> = module.body.iter().map(Stmt::decl_kind).collect();
    assert_eq!(
        kinds,
        vec![
            DeclKind::Import,
            DeclKind::ImportFrom,
            DeclKind::Assign,
            DeclKind::FunctionDef,
            DeclKind::ClassDef,
            DeclKind::Other,
            DeclKind::Other,
        ]
    );
}

#[test]
fn test_empty_module() {
    assert!(parse_ok("").body.is_empty());
    assert!(parse_ok("# just a comment\n\n").body.is_empty());
}

#[test]
fn test_semicolon_separated_statements() {
    let module = parse_ok("a = 1; b = 2;\n");
    assert_eq!(module.body.len(), 2);
}

#[test]
fn test_statement_spans() {
    let module = parse_ok("x = 1\n\ndef g(a):\n    return a\n");
    assert_eq!(module.body[0].span().start(), (1, 0));
    let g = &module.body[1];
    assert_eq!(g.span().start(), (3, 0));
    assert_eq!(g.span().end_line, 4);
}

// ─────────────────────────────────────────────────────────────────────
// Imports
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_import_aliases() {
    let module = parse_ok("import os.path as p, sys\n");
    let Stmt::Import(import) = &module.body[0] else {
        panic!("expected import");
    };
    assert_eq!(import.names[0].name, "os.path");
    assert_eq!(import.names[0].asname.as_ref().map(|a| a.name.as_str()), Some("p"));
    assert_eq!(import.names[1].name, "sys");
}

#[test]
fn test_from_import_forms() {
    let module = parse_ok(
        "from math import sqrt, pi as PI\nfrom . import util\nfrom ..pkg.mod import (a,\n    b,)\nfrom string import *\n",
    );
    let froms: Vec<&ImportFrom> = module
        .body
        .iter()
        .filter_map(|s| match s {
            Stmt::ImportFrom(f) => Some(f),
            _ => None,
        })
        .collect();
    assert_eq!(froms[0].module, "math");
    assert_eq!(froms[0].names.len(), 2);
    assert_eq!((froms[1].module.as_str(), froms[1].level), (".", 1));
    assert_eq!((froms[2].module.as_str(), froms[2].level), ("..pkg.mod", 2));
    assert_eq!(froms[2].names.len(), 2);
    assert_eq!(froms[3].names[0].name, "*");
}

// ─────────────────────────────────────────────────────────────────────
// Functions & classes
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_function_params() {
    let module = parse_ok("def f(a, b: int = 2, *args, c, d=4, **kw) -> int:\n    return a\n");
    let f = function(&module, "f");
    assert_eq!(f.params.arity(), 2);
    assert_eq!(f.params.vararg.as_ref().map(|v| v.name.as_str()), Some("args"));
    assert_eq!(f.params.kwonly.len(), 2);
    assert_eq!(f.params.kwarg.as_ref().map(|v| v.name.as_str()), Some("kw"));
    assert!(f.params.positional[1].annotation.is_some());
    assert!(f.returns.is_some());
}

#[test]
fn test_one_line_function_body() {
    let module = parse_ok("def add(a, b): return a + b\n");
    let f = function(&module, "add");
    assert_eq!(f.params.arity(), 2);
    assert!(matches!(f.body[0], Stmt::Return(_)));
}

#[test]
fn test_decorated_function() {
    let module = parse_ok("@staticmethod\n@cache(3)\ndef f():\n    pass\n");
    assert_eq!(function(&module, "f").decorators.len(), 2);
}

#[test]
fn test_class_with_methods() {
    let module = parse_ok(
        "class Point(Base, metaclass=Meta):\n    def __init__(self, x):\n        self.x = x\n\n    def norm(self):\n        return self.x\n",
    );
    let Stmt::ClassDef(class) = &module.body[0] else {
        panic!("expected class");
    };
    assert_eq!(class.name.name, "Point");
    assert_eq!(class.bases.len(), 1);
    assert_eq!(class.body.len(), 2);
}

#[test]
fn test_nested_blocks() {
    let src = "\
def main():
    for i in range(3):
        if i % 2 == 0:
            helper(i)
        elif i == 1:
            continue
        else:
            break
    while True:
        try:
            x = 1
        except (ValueError, TypeError) as e:
            raise
        except Exception:
            pass
        else:
            pass
        finally:
            return x
";
    let module = parse_ok(src);
    let main = function(&module, "main");
    assert_eq!(main.body.len(), 2);
    let Stmt::For(for_loop) = &main.body[0] else {
        panic!("expected for");
    };
    let Stmt::If(if_stmt) = &for_loop.body[0] else {
        panic!("expected if");
    };
    assert!(matches!(if_stmt.orelse[0], Stmt::If(_)), "elif nests in orelse");
    let Stmt::While(w) = &main.body[1] else {
        panic!("expected while");
    };
    let Stmt::Try(t) = &w.body[0] else {
        panic!("expected try");
    };
    assert_eq!(t.handlers.len(), 2);
    assert_eq!(t.handlers[0].name.as_ref().map(|n| n.name.as_str()), Some("e"));
    assert_eq!(t.orelse.len(), 1);
    assert_eq!(t.finalbody.len(), 1);
}

#[test]
fn test_ellipsis_body() {
    let module = parse_ok("def todo():\n    ...\n");
    assert_eq!(function(&module, "todo").body.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────
// Assignments
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_assignment_forms() {
    let module = parse_ok("a = b = 1\nx, *rest = items\nn += 1\nscore: int = 0\nd[k] = v\nobj.attr = 2\n");
    let Stmt::Assign(chain) = &module.body[0] else {
        panic!("expected assign");
    };
    assert_eq!(chain.targets.len(), 2);
    assert!(matches!(module.body[1], Stmt::Assign(_)));
    let Stmt::AugAssign(aug) = &module.body[2] else {
        panic!("expected augassign");
    };
    assert_eq!(aug.op, BinOp::Add);
    assert!(matches!(module.body[3], Stmt::AnnAssign(_)));
    assert!(matches!(module.body[4], Stmt::Assign(_)));
    assert!(matches!(module.body[5], Stmt::Assign(_)));
}

#[test]
fn test_cannot_assign_to_literal() {
    assert_eq!(first_error("1 = x\n"), "cannot assign to literal");
    assert_eq!(first_error("f() = 3\n"), "cannot assign to function call");
    assert_eq!(first_error("del 5\n"), "cannot delete literal");
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_precedence() {
    // 1 + 2 * 3 ** 2 → 1 + (2 * (3 ** 2))
    let expr = assigned("x = 1 + 2 * 3 ** 2\n");
    let ExprKind::Binary { op: BinOp::Add, right, .. } = expr.kind else {
        panic!("expected addition at the root");
    };
    let ExprKind::Binary { op: BinOp::Mul, right: pow, .. } = right.kind else {
        panic!("expected multiplication");
    };
    assert!(matches!(pow.kind, ExprKind::Binary { op: BinOp::Pow, .. }));
}

#[test]
fn test_unary_minus_binds_looser_than_power() {
    let expr = assigned("x = -2 ** 2\n");
    assert!(matches!(expr.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    assert_eq!(assigned("x = -5\n").kind, ExprKind::Int(-5));
}

#[test]
fn test_chained_comparison() {
    let expr = assigned("x = 0 <= i < n\n");
    let ExprKind::Compare { comparisons, .. } = expr.kind else {
        panic!("expected comparison");
    };
    let ops: Vec<_> = comparisons.iter().map(|(op, _)| *op).collect();
    assert_eq!(ops, vec![CmpOp::LtE, CmpOp::Lt]);
}

#[test]
fn test_not_in_and_is_not() {
    let expr = assigned("x = a not in b and c is not None\n");
    let ExprKind::BoolOp { op: BoolOp::And, left, right } = expr.kind else {
        panic!("expected and");
    };
    assert!(matches!(&left.kind, ExprKind::Compare { comparisons, .. } if comparisons[0].0 == CmpOp::NotIn));
    assert!(matches!(&right.kind, ExprKind::Compare { comparisons, .. } if comparisons[0].0 == CmpOp::IsNot));
}

#[test]
fn test_ternary_and_lambda() {
    assert!(matches!(assigned("x = a if c else b\n").kind, ExprKind::IfExp { .. }));
    let ExprKind::Lambda { params, .. } = assigned("f = lambda a, b=1: a + b\n").kind else {
        panic!("expected lambda");
    };
    assert_eq!(params.arity(), 2);
}

#[test]
fn test_calls_and_arguments() {
    let ExprKind::Call { func, args } = assigned("x = obj.method(1, *rest, key=2, **opts)\n").kind else {
        panic!("expected call");
    };
    assert!(matches!(func.kind, ExprKind::Attribute { .. }));
    assert!(matches!(args[0], Arg::Positional(_)));
    assert!(matches!(args[1], Arg::Star(_)));
    assert!(matches!(args[2], Arg::Keyword { .. }));
    assert!(matches!(args[3], Arg::DoubleStar(_)));
}

#[test]
fn test_generator_argument() {
    let ExprKind::Call { args, .. } = assigned("x = sum(i * i for i in range(10) if i % 2)\n").kind else {
        panic!("expected call");
    };
    let Arg::Positional(arg) = &args[0] else {
        panic!("expected positional");
    };
    assert!(matches!(&arg.kind, ExprKind::ListComp { generators, .. } if generators[0].ifs.len() == 1));
}

#[test]
fn test_subscripts_and_slices() {
    let ExprKind::Subscript { index, .. } = assigned("x = s[1:-1:2]\n").kind else {
        panic!("expected subscript");
    };
    assert!(matches!(
        index.kind,
        ExprKind::Slice { lower: Some(_), upper: Some(_), step: Some(_) }
    ));
    let ExprKind::Subscript { index, .. } = assigned("x = s[::-1]\n").kind else {
        panic!("expected subscript");
    };
    assert!(matches!(
        index.kind,
        ExprKind::Slice { lower: None, upper: None, step: Some(_) }
    ));
}

#[test]
fn test_collection_displays() {
    assert!(matches!(assigned("x = []\n").kind, ExprKind::List(ref v) if v.is_empty()));
    assert!(matches!(assigned("x = ()\n").kind, ExprKind::Tuple(ref v) if v.is_empty()));
    assert!(matches!(assigned("x = (1,)\n").kind, ExprKind::Tuple(ref v) if v.len() == 1));
    assert!(matches!(assigned("x = 1, 2\n").kind, ExprKind::Tuple(ref v) if v.len() == 2));
    assert!(matches!(assigned("x = {}\n").kind, ExprKind::Dict(ref v) if v.is_empty()));
    assert!(matches!(assigned("x = {'a': 1, 'b': 2}\n").kind, ExprKind::Dict(ref v) if v.len() == 2));
    assert!(matches!(assigned("x = {1, 2}\n").kind, ExprKind::Set(ref v) if v.len() == 2));
    assert!(matches!(assigned("x = (1)\n").kind, ExprKind::Int(1)));
}

#[test]
fn test_comprehensions() {
    assert!(matches!(assigned("x = [a for a in b]\n").kind, ExprKind::ListComp { .. }));
    assert!(matches!(
        assigned("x = {k: v for k, v in pairs}\n").kind,
        ExprKind::DictComp { .. }
    ));
    // Set comprehensions become set([...])
    let ExprKind::Call { func, .. } = assigned("x = {a for a in b}\n").kind else {
        panic!("expected set call");
    };
    assert_eq!(func.kind, ExprKind::Name("set".into()));
}

#[test]
fn test_string_concatenation() {
    assert_eq!(assigned("x = 'a' 'b'\n").kind, ExprKind::Str("ab".into()));
}

#[test]
fn test_fstring_parts() {
    let ExprKind::FString(parts) = assigned("x = f'n={n:>3} r={r!r}' 'tail'\n").kind else {
        panic!("expected f-string");
    };
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], FStringPart::Literal("n=".into()));
    assert!(matches!(&parts[1], FStringPart::Field { spec, conversion: None, .. } if spec == ">3"));
    assert!(matches!(&parts[3], FStringPart::Field { conversion: Some('r'), .. }));
    assert_eq!(parts[4], FStringPart::Literal("tail".into()));
}

#[test]
fn test_fstring_self_documenting() {
    let ExprKind::FString(parts) = assigned("x = f'{a + 1=}'\n").kind else {
        panic!("expected f-string");
    };
    assert_eq!(parts[0], FStringPart::Literal("a + 1=".into()));
    assert!(matches!(&parts[1], FStringPart::Field { conversion: Some('r'), .. }));
}

// ─────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_colon_location() {
    let errs = errors("def f()\n    return 1\n");
    assert_eq!(errs[0], (1, 7, "expected ':'".to_string()));
}

#[test]
fn test_unclosed_paren_reported_once_per_cause() {
    let errs = errors("print('hi'\n");
    assert!(errs.iter().any(|(l, c, m)| (*l, *c) == (1, 5) && m == "'(' was never closed"));
}

#[test]
fn test_expected_indented_block() {
    let sf = SourceFile::new("test.py", "def f():\nreturn 1\n");
    let result = parse_source(&sf);
    let first = &result.errors.items[0];
    assert_eq!(first.kind, DiagnosticKind::Indentation);
    assert_eq!(
        first.message,
        "expected an indented block after function definition on line 1"
    );
    assert_eq!(first.line(), 2);
}

#[test]
fn test_unexpected_indent() {
    let errs = errors("x = 1\n    y = 2\n");
    assert_eq!(errs[0].2, "unexpected indent");
    assert_eq!(errs[0].0, 2);
}

#[test]
fn test_context_errors() {
    assert_eq!(first_error("return 1\n"), "'return' outside function");
    assert_eq!(first_error("break\n"), "'break' outside loop");
    assert_eq!(
        first_error("for x in y:\n    def f():\n        continue\n"),
        "'continue' not properly in loop"
    );
    assert_eq!(
        first_error("nonlocal x\n"),
        "nonlocal declaration not allowed at module level"
    );
}

#[test]
fn test_parameter_errors() {
    assert_eq!(
        first_error("def f(a=1, b):\n    pass\n"),
        "non-default argument follows default argument"
    );
    assert_eq!(
        first_error("def f(a, a):\n    pass\n"),
        "duplicate argument 'a' in function definition"
    );
    assert_eq!(
        first_error("f(a=1, 2)\n"),
        "positional argument follows keyword argument"
    );
}

#[test]
fn test_python2_print() {
    assert_eq!(
        first_error("print 'hello'\n"),
        "Missing parentheses in call to 'print'. Did you mean print(...)?"
    );
}

#[test]
fn test_unsupported_constructs() {
    for src in [
        "with open('f') as fh:\n    pass\n",
        "async def f():\n    pass\n",
        "def g():\n    yield 1\n",
        "if (n := 10) > 5:\n    pass\n",
    ] {
        let sf = SourceFile::new("test.py", src);
        let result = parse_source(&sf);
        assert!(result.module.is_none(), "{src}");
        assert_eq!(result.errors.items[0].kind, DiagnosticKind::Unsupported, "{src}");
    }
}

#[test]
fn test_recovery_reports_independent_errors() {
    let errs = errors("x = = 1\ny = 2\nz = (3\n");
    assert!(errs.len() >= 2, "{errs:?}");
    assert_eq!(errs[0].0, 1);
    assert!(errs.iter().any(|(l, _, _)| *l == 3));
}

#[test]
fn test_broken_header_skips_its_block() {
    // Only the header is reported; the body is not re-parsed as top-level code.
    let errs = errors("def f(a b):\n    return 1\n");
    assert_eq!(errs.len(), 1, "{errs:?}");
}

#[test]
fn test_dangling_operator() {
    assert_eq!(errors("x = 1 +"), vec![(1, 7, "invalid syntax".to_string())]);
}

#[test]
fn test_nesting_limit() {
    let nested = |depth: usize| format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
    let (shallow, deep) = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || {
            let shallow = parse_source(&SourceFile::new("test.py", &nested(150)));
            let deep = errors(&nested(300));
            (shallow.module.is_some(), deep)
        })
        .expect("spawn")
        .join()
        .expect("parser thread panicked");
    assert!(shallow, "150 levels of parentheses parse");
    assert!(
        deep.iter().any(|(_, _, m)| m == "expression is too deeply nested"),
        "{deep:?}"
    );
}

#[test]
fn test_determinism_100_iterations() {
    let src = "def f(a):\n    return [x * 2 for x in a if x]\n\nclass K:\n    y = f([1, 2])\n";
    let first = format!("{:?}", parse_ok(src));
    for _ in 0..100 {
        assert_eq!(format!("{:?}", parse_ok(src)), first);
    }
}
