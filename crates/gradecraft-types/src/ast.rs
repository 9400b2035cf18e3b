//! AST node types for the supported Python subset.
//!
//! Every node carries a [`Span`] for error reporting. Blocks are plain
//! `Vec<Stmt>` in source order; `elif` chains nest as an `If` inside the
//! parent's `orelse`, the same shape Python's own `ast` module uses.

use crate::Span;

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed submission: its top-level statements in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// The coarse kind of a top-level statement, as seen by the declaration filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    FunctionDef,
    ClassDef,
    Import,
    ImportFrom,
    Assign,
    Other,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `def name(params): body`
    FunctionDef(FunctionDef),
    /// `class Name(bases): body`
    ClassDef(ClassDef),
    /// `import a.b as c, d`
    Import(Import),
    /// `from .pkg import a as b`
    ImportFrom(ImportFrom),
    /// `a = b = value`
    Assign(Assign),
    /// `a += value`
    AugAssign(AugAssign),
    /// `a: int = value`
    AnnAssign(AnnAssign),
    If(If),
    While(While),
    For(For),
    Try(Try),
    Return(Return),
    Raise(Raise),
    Assert(Assert),
    /// `del a, b[0]`
    Delete(Delete),
    Global(NameList),
    Nonlocal(NameList),
    Pass(Span),
    Break(Span),
    Continue(Span),
    /// A bare expression; its value is discarded.
    Expr(ExprStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::FunctionDef(s) => s.span,
            Stmt::ClassDef(s) => s.span,
            Stmt::Import(s) => s.span,
            Stmt::ImportFrom(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::AugAssign(s) => s.span,
            Stmt::AnnAssign(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Try(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Raise(s) => s.span,
            Stmt::Assert(s) => s.span,
            Stmt::Delete(s) => s.span,
            Stmt::Global(s) | Stmt::Nonlocal(s) => s.span,
            Stmt::Pass(span) | Stmt::Break(span) | Stmt::Continue(span) => *span,
            Stmt::Expr(s) => s.span,
        }
    }

    pub fn decl_kind(&self) -> DeclKind {
        match self {
            Stmt::FunctionDef(_) => DeclKind::FunctionDef,
            Stmt::ClassDef(_) => DeclKind::ClassDef,
            Stmt::Import(_) => DeclKind::Import,
            Stmt::ImportFrom(_) => DeclKind::ImportFrom,
            Stmt::Assign(_) => DeclKind::Assign,
            _ => DeclKind::Other,
        }
    }
}

/// `def name(params) -> returns: body`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Params,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub returns: Option<Expr>,
    pub span: Span,
}

/// A parameter list: `a, b=1, *args, c, d=2, **kwargs`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    /// Positional-or-keyword parameters, in order.
    pub positional: Vec<Param>,
    pub vararg: Option<Ident>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<Ident>,
}

impl Params {
    /// Number of declared positional parameters.
    pub fn arity(&self) -> usize {
        self.positional.len()
    }
}

/// A single parameter with an optional default and annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub default: Option<Expr>,
    pub annotation: Option<Expr>,
    pub span: Span,
}

/// `class Name(bases): body`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Ident,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

/// `import a.b as c`
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub names: Vec<Alias>,
    pub span: Span,
}

/// `from module import names`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFrom {
    /// Dotted module path including any leading relative dots: `..pkg.mod`.
    pub module: String,
    /// Number of leading dots.
    pub level: u32,
    /// Imported names; a single `*` alias for `from m import *`.
    pub names: Vec<Alias>,
    pub span: Span,
}

/// `name as asname` in an import; `name` may be dotted.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<Ident>,
    pub span: Span,
}

/// `t1 = t2 = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub targets: Vec<Expr>,
    pub value: Expr,
    pub span: Span,
}

/// `target op= value`
#[derive(Debug, Clone, PartialEq)]
pub struct AugAssign {
    pub target: Expr,
    pub op: BinOp,
    pub value: Expr,
    pub span: Span,
}

/// `target: annotation [= value]`
#[derive(Debug, Clone, PartialEq)]
pub struct AnnAssign {
    pub target: Expr,
    pub annotation: Expr,
    pub value: Option<Expr>,
    pub span: Span,
}

/// `if test: body [elif ...] [else: orelse]`
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

/// `while test: body [else: orelse]`
#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub test: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

/// `for target in iter: body [else: orelse]`
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub target: Expr,
    pub iter: Expr,
    pub body: Vec<Stmt>,
    pub orelse: Vec<Stmt>,
    pub span: Span,
}

/// `try: body except...: handlers else: orelse finally: finalbody`
#[derive(Debug, Clone, PartialEq)]
pub struct Try {
    pub body: Vec<Stmt>,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Vec<Stmt>,
    pub finalbody: Vec<Stmt>,
    pub span: Span,
}

/// `except [kind [as name]]: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<Expr>,
    pub name: Option<Ident>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `return [value]`
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub value: Option<Expr>,
    pub span: Span,
}

/// `raise [exc]`
#[derive(Debug, Clone, PartialEq)]
pub struct Raise {
    pub exc: Option<Expr>,
    pub span: Span,
}

/// `assert test [, msg]`
#[derive(Debug, Clone, PartialEq)]
pub struct Assert {
    pub test: Expr,
    pub msg: Option<Expr>,
    pub span: Span,
}

/// `del targets`
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub targets: Vec<Expr>,
    pub span: Span,
}

/// The names of a `global` or `nonlocal` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct NameList {
    pub names: Vec<Ident>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub value: Expr,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    Int(i64),
    Float(f64),
    Str(String),
    /// `f"a{b!r:>4}c"`
    FString(Vec<FStringPart>),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),

    // ── Comprehensions ──
    /// `[elt for ...]` and `(elt for ...)`; both evaluate to a list.
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// `{key: value for ...}`
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },

    // ── Names, calls, access ──
    Name(String),
    /// `func(args)`
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
    },
    /// `value.attr`
    Attribute {
        value: Box<Expr>,
        attr: Ident,
    },
    /// `value[index]`
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `lower:upper:step`, only valid as a subscript index.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },

    // ── Operators ──
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `a and b`, `a or b`
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`: one left operand, then each operator with its right operand.
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// `lambda params: body`
    Lambda {
        params: Box<Params>,
        body: Box<Expr>,
    },
    /// `*value` inside a list/tuple display.
    Starred(Box<Expr>),
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    /// `{value!conversion:spec}`
    Field {
        value: Expr,
        conversion: Option<char>,
        spec: String,
    },
}

/// One `for target in iter if cond...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Keyword { name: Ident, value: Expr },
    /// `*iterable`
    Star(Expr),
    /// `**mapping`
    DoubleStar(Expr),
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    LShift,
    RShift,
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}
