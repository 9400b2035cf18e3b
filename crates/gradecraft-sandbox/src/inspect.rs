//! Structural queries over a filtered tree. Nothing here executes code.

use gradecraft_types::ast::{
    Arg, Comprehension, Expr, ExprKind, FStringPart, FunctionDef, Params, Stmt,
};

use crate::filter::FilteredModule;

/// A node handed to a search predicate.
#[derive(Debug, Clone, Copy)]
enum Node<'a> {
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

/// Top-level `def` statements named `name`, in source order.
fn functions<'a>(tree: &'a FilteredModule, name: &'a str) -> impl Iterator<Item = &'a FunctionDef> {
    tree.body().iter().filter_map(move |stmt| match stmt {
        Stmt::FunctionDef(def) if def.name.name == name => Some(def),
        _ => None,
    })
}

/// Whether the tree has a top-level `def name`.
pub fn defines(tree: &FilteredModule, name: &str) -> bool {
    functions(tree, name).next().is_some()
}

/// Whether the first top-level `def name` takes exactly `n` positional
/// parameters. `*args`, keyword-only parameters and `**kwargs` do not count.
pub fn has_arity(tree: &FilteredModule, name: &str, n: usize) -> bool {
    functions(tree, name)
        .next()
        .is_some_and(|def| def.params.arity() == n)
}

/// Whether `caller` contains a call through the bare name `callee`.
///
/// The search covers everything inside the definition: nested functions,
/// classes, lambdas, comprehensions, default values and decorators. Method
/// calls such as `obj.callee()` do not match.
pub fn calls(tree: &FilteredModule, caller: &str, callee: &str) -> bool {
    functions(tree, caller).any(|def| {
        search_def(def, &mut |node| match node {
            Node::Expr(Expr {
                kind: ExprKind::Call { func, .. },
                ..
            }) => matches!(&func.kind, ExprKind::Name(name) if name == callee),
            _ => false,
        })
    })
}

/// Whether `name` contains a `return` anywhere in its body, including in
/// nested definitions, with or without a value.
pub fn returns(tree: &FilteredModule, name: &str) -> bool {
    functions(tree, name).any(|def| search_def(def, &mut |node| matches!(node, Node::Stmt(Stmt::Return(_)))))
}

// ══════════════════════════════════════════════════════════════════════════════
// Traversal
// ══════════════════════════════════════════════════════════════════════════════

type Predicate<'p> = dyn for<'n> FnMut(Node<'n>) -> bool + 'p;

fn search_def(def: &FunctionDef, found: &mut Predicate<'_>) -> bool {
    def.decorators.iter().any(|d| search_expr(d, found))
        || search_params(&def.params, found)
        || def.returns.as_ref().is_some_and(|r| search_expr(r, found))
        || search_block(&def.body, found)
}

fn search_params(params: &Params, found: &mut Predicate<'_>) -> bool {
    params.positional.iter().chain(&params.kwonly).any(|param| {
        param.default.as_ref().is_some_and(|d| search_expr(d, found))
            || param.annotation.as_ref().is_some_and(|a| search_expr(a, found))
    })
}

fn search_block(body: &[Stmt], found: &mut Predicate<'_>) -> bool {
    body.iter().any(|stmt| search_stmt(stmt, found))
}

fn search_stmt(stmt: &Stmt, found: &mut Predicate<'_>) -> bool {
    if found(Node::Stmt(stmt)) {
        return true;
    }
    match stmt {
        Stmt::FunctionDef(def) => search_def(def, found),
        Stmt::ClassDef(class) => {
            class.decorators.iter().any(|d| search_expr(d, found))
                || class.bases.iter().any(|b| search_expr(b, found))
                || search_block(&class.body, found)
        }
        Stmt::Import(_) | Stmt::ImportFrom(_) => false,
        Stmt::Assign(assign) => {
            assign.targets.iter().any(|t| search_expr(t, found)) || search_expr(&assign.value, found)
        }
        Stmt::AugAssign(aug) => search_expr(&aug.target, found) || search_expr(&aug.value, found),
        Stmt::AnnAssign(ann) => {
            search_expr(&ann.target, found)
                || search_expr(&ann.annotation, found)
                || ann.value.as_ref().is_some_and(|v| search_expr(v, found))
        }
        Stmt::If(s) => {
            search_expr(&s.test, found) || search_block(&s.body, found) || search_block(&s.orelse, found)
        }
        Stmt::While(s) => {
            search_expr(&s.test, found) || search_block(&s.body, found) || search_block(&s.orelse, found)
        }
        Stmt::For(s) => {
            search_expr(&s.target, found)
                || search_expr(&s.iter, found)
                || search_block(&s.body, found)
                || search_block(&s.orelse, found)
        }
        Stmt::Try(s) => {
            search_block(&s.body, found)
                || s.handlers.iter().any(|h| {
                    h.kind.as_ref().is_some_and(|k| search_expr(k, found))
                        || search_block(&h.body, found)
                })
                || search_block(&s.orelse, found)
                || search_block(&s.finalbody, found)
        }
        Stmt::Return(ret) => ret.value.as_ref().is_some_and(|v| search_expr(v, found)),
        Stmt::Raise(raise) => raise.exc.as_ref().is_some_and(|e| search_expr(e, found)),
        Stmt::Assert(assert) => {
            search_expr(&assert.test, found)
                || assert.msg.as_ref().is_some_and(|m| search_expr(m, found))
        }
        Stmt::Delete(del) => del.targets.iter().any(|t| search_expr(t, found)),
        Stmt::Expr(expr) => search_expr(&expr.value, found),
        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {
            false
        }
    }
}

fn search_generators(generators: &[Comprehension], found: &mut Predicate<'_>) -> bool {
    generators.iter().any(|g| {
        search_expr(&g.target, found)
            || search_expr(&g.iter, found)
            || g.ifs.iter().any(|cond| search_expr(cond, found))
    })
}

fn search_expr(expr: &Expr, found: &mut Predicate<'_>) -> bool {
    if found(Node::Expr(expr)) {
        return true;
    }
    match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::None
        | ExprKind::Name(_) => false,
        ExprKind::FString(parts) => parts.iter().any(|part| match part {
            FStringPart::Literal(_) => false,
            FStringPart::Field { value, .. } => search_expr(value, found),
        }),
        ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => {
            items.iter().any(|item| search_expr(item, found))
        }
        ExprKind::Dict(pairs) => pairs
            .iter()
            .any(|(k, v)| search_expr(k, found) || search_expr(v, found)),
        ExprKind::ListComp { elt, generators } => {
            search_expr(elt, found) || search_generators(generators, found)
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => search_expr(key, found) || search_expr(value, found) || search_generators(generators, found),
        ExprKind::Call { func, args } => {
            search_expr(func, found)
                || args.iter().any(|arg| match arg {
                    Arg::Positional(value)
                    | Arg::Keyword { value, .. }
                    | Arg::Star(value)
                    | Arg::DoubleStar(value) => search_expr(value, found),
                })
        }
        ExprKind::Attribute { value, .. } => search_expr(value, found),
        ExprKind::Subscript { value, index } => search_expr(value, found) || search_expr(index, found),
        ExprKind::Slice { lower, upper, step } => [lower, upper, step]
            .into_iter()
            .flatten()
            .any(|part| search_expr(part, found)),
        ExprKind::Binary { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
            search_expr(left, found) || search_expr(right, found)
        }
        ExprKind::Unary { operand, .. } => search_expr(operand, found),
        ExprKind::Compare { left, comparisons } => {
            search_expr(left, found) || comparisons.iter().any(|(_, right)| search_expr(right, found))
        }
        ExprKind::IfExp { test, body, orelse } => {
            search_expr(test, found) || search_expr(body, found) || search_expr(orelse, found)
        }
        ExprKind::Lambda { params, body } => search_params(params, found) || search_expr(body, found),
        ExprKind::Starred(value) => search_expr(value, found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter, AllowList};
    use crate::validator::parse;

    fn tree(source: &str) -> FilteredModule {
        let module = parse(source).expect("test source parses");
        filter(&module, &AllowList::new(["math"])).expect("no disallowed imports")
    }

    #[test]
    fn arity_counts_positional_parameters_only() {
        assert!(has_arity(&tree("def add(a, b):\n    return a + b\n"), "add", 2));
        assert!(!has_arity(&tree("def add(a):\n    return a\n"), "add", 2));
        let t = tree("def f(a, b=1, *rest, c, **kw):\n    pass\n");
        assert!(has_arity(&t, "f", 2));
        assert!(!has_arity(&t, "missing", 0));
        assert!(defines(&t, "f"));
        assert!(!defines(&t, "missing"));
    }

    #[test]
    fn arity_uses_the_first_definition() {
        let t = tree("def f(a):\n    pass\ndef f(a, b):\n    pass\n");
        assert!(has_arity(&t, "f", 1));
        assert!(!has_arity(&t, "f", 2));
    }

    #[test]
    fn calls_finds_nested_bare_name_calls() {
        let t = tree(
            "\
def helper():
    return 1

def main():
    def inner():
        return [helper() for _ in range(2)]
    return inner()
",
        );
        assert!(calls(&t, "main", "helper"));
        assert!(calls(&t, "main", "range"));
        assert!(!calls(&t, "helper", "main"));
    }

    #[test]
    fn calls_ignores_method_calls() {
        let t = tree("def main(obj):\n    obj.helper()\n");
        assert!(!calls(&t, "main", "helper"));
    }

    #[test]
    fn calls_looks_into_defaults_lambdas_and_decorators() {
        let t = tree(
            "\
def deco(f):
    return f

def factory():
    return deco

@deco
def a(x=compute()):
    g = lambda: check(x)
    return g

@factory()
def b():
    pass
",
        );
        assert!(!calls(&t, "a", "deco"));
        assert!(calls(&t, "a", "compute"));
        assert!(calls(&t, "a", "check"));
        assert!(calls(&t, "b", "factory"));
    }

    #[test]
    fn calls_requires_a_top_level_caller() {
        let t = tree("class K:\n    def main(self):\n        helper()\n");
        assert!(!calls(&t, "main", "helper"));
    }

    #[test]
    fn returns_detects_bare_and_nested_returns() {
        assert!(!returns(&tree("def f():\n    pass\n"), "f"));
        assert!(returns(&tree("def f():\n    return\n"), "f"));
        let nested = tree("def f(xs):\n    for x in xs:\n        if x:\n            return x\n");
        assert!(returns(&nested, "f"));
        let inner = tree("def f():\n    def g():\n        return 1\n    g()\n");
        assert!(returns(&inner, "f"));
        assert!(!returns(&inner, "g"));
    }
}
