//! Name resolution: module globals, function frames and closures.
//!
//! Which names are local to a function is decided statically when the
//! function is defined ([`ScopeInfo`]), so reading a local before it is
//! assigned is an `UnboundLocalError` rather than a silent fallback to a
//! global, just as in Python.

use gradecraft_types::ast::{Comprehension, Expr, ExprKind, Params, Stmt};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::value::{Function, Value};

/// One level of variable bindings, linked to the enclosing function scope.
#[derive(Default)]
pub struct Scope {
    vars: RefCell<BTreeMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn new(parent: Option<Rc<Scope>>) -> Self {
        Self {
            vars: RefCell::new(BTreeMap::new()),
            parent,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.vars.borrow_mut().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.vars.borrow().keys().cloned().collect()
    }

    /// Snapshot of every binding, in name order.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        self.vars
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn parent(&self) -> Option<Rc<Scope>> {
        self.parent.clone()
    }
}

/// Search a scope chain from `start` outward.
fn chain_get(start: Option<Rc<Scope>>, name: &str) -> Option<Value> {
    let mut current = start;
    while let Some(scope) = current {
        if let Some(value) = scope.get(name) {
            return Some(value);
        }
        current = scope.parent();
    }
    None
}

/// The nearest scope in a chain that binds `name`.
fn chain_owner(start: Option<Rc<Scope>>, name: &str) -> Option<Rc<Scope>> {
    let mut current = start;
    while let Some(scope) = current {
        if scope.contains(name) {
            return Some(scope);
        }
        current = scope.parent();
    }
    None
}

// ══════════════════════════════════════════════════════════════════════════════
// Static scope analysis
// ══════════════════════════════════════════════════════════════════════════════

/// The statically determined binding sets of a function body.
#[derive(Debug, Default)]
pub struct ScopeInfo {
    pub locals: BTreeSet<String>,
    pub globals: BTreeSet<String>,
    pub nonlocals: BTreeSet<String>,
}

impl ScopeInfo {
    pub fn for_function(params: &Params, body: &[Stmt]) -> Self {
        let mut info = ScopeInfo::default();
        for name in param_names(params) {
            info.locals.insert(name);
        }
        info.collect_block(body);
        info.finish()
    }

    pub fn for_lambda(params: &Params) -> Self {
        ScopeInfo {
            locals: param_names(params).into_iter().collect(),
            ..ScopeInfo::default()
        }
    }

    pub fn for_comprehension(generators: &[Comprehension]) -> Self {
        let mut info = ScopeInfo::default();
        for generator in generators {
            info.collect_target(&generator.target);
        }
        info
    }

    fn finish(mut self) -> Self {
        let declared: BTreeSet<String> = self.globals.union(&self.nonlocals).cloned().collect();
        self.locals.retain(|name| !declared.contains(name));
        self
    }

    fn collect_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.collect_stmt(stmt);
        }
    }

    fn collect_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.locals.insert(def.name.name.clone());
            }
            Stmt::ClassDef(def) => {
                self.locals.insert(def.name.name.clone());
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    let bound = match &alias.asname {
                        Some(asname) => asname.name.clone(),
                        None => alias.name.split('.').next().unwrap_or("").to_string(),
                    };
                    self.locals.insert(bound);
                }
            }
            Stmt::ImportFrom(import) => {
                for alias in &import.names {
                    if alias.name == "*" {
                        continue;
                    }
                    let bound = alias.asname.as_ref().map_or(&alias.name, |a| &a.name);
                    self.locals.insert(bound.clone());
                }
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.collect_target(target);
                }
            }
            Stmt::AugAssign(aug) => self.collect_target(&aug.target),
            Stmt::AnnAssign(ann) => self.collect_target(&ann.target),
            Stmt::For(stmt) => {
                self.collect_target(&stmt.target);
                self.collect_block(&stmt.body);
                self.collect_block(&stmt.orelse);
            }
            Stmt::While(stmt) => {
                self.collect_block(&stmt.body);
                self.collect_block(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.collect_block(&stmt.body);
                self.collect_block(&stmt.orelse);
            }
            Stmt::Try(stmt) => {
                self.collect_block(&stmt.body);
                for handler in &stmt.handlers {
                    if let Some(name) = &handler.name {
                        self.locals.insert(name.name.clone());
                    }
                    self.collect_block(&handler.body);
                }
                self.collect_block(&stmt.orelse);
                self.collect_block(&stmt.finalbody);
            }
            Stmt::Delete(del) => {
                for target in &del.targets {
                    self.collect_target(target);
                }
            }
            Stmt::Global(names) => {
                self.globals.extend(names.names.iter().map(|n| n.name.clone()));
            }
            Stmt::Nonlocal(names) => {
                self.nonlocals.extend(names.names.iter().map(|n| n.name.clone()));
            }
            _ => {}
        }
    }

    fn collect_target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Name(name) => {
                self.locals.insert(name.clone());
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.collect_target(item);
                }
            }
            ExprKind::Starred(inner) => self.collect_target(inner),
            _ => {}
        }
    }
}

fn param_names(params: &Params) -> Vec<String> {
    let mut names: Vec<String> = params.positional.iter().map(|p| p.name.name.clone()).collect();
    names.extend(params.vararg.iter().map(|v| v.name.clone()));
    names.extend(params.kwonly.iter().map(|p| p.name.name.clone()));
    names.extend(params.kwarg.iter().map(|k| k.name.clone()));
    names
}

// ══════════════════════════════════════════════════════════════════════════════
// Frames
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Module,
    Function,
    Class,
    Comprehension,
}

pub(crate) struct Frame {
    kind: FrameKind,
    /// `None` for the module frame, whose bindings are the globals.
    scope: Option<Rc<Scope>>,
    info: Rc<ScopeInfo>,
    function: Option<Rc<Function>>,
}

impl Frame {
    fn module() -> Self {
        Self {
            kind: FrameKind::Module,
            scope: None,
            info: Rc::new(ScopeInfo::default()),
            function: None,
        }
    }

    pub(crate) fn function(scope: Rc<Scope>, function: Rc<Function>) -> Self {
        Self {
            kind: FrameKind::Function,
            scope: Some(scope),
            info: function.scope_info.clone(),
            function: Some(function),
        }
    }

    pub(crate) fn class(scope: Rc<Scope>) -> Self {
        Self {
            kind: FrameKind::Class,
            scope: Some(scope),
            info: Rc::new(ScopeInfo::default()),
            function: None,
        }
    }

    pub(crate) fn comprehension(scope: Rc<Scope>, info: ScopeInfo) -> Self {
        Self {
            kind: FrameKind::Comprehension,
            scope: Some(scope),
            info: Rc::new(info),
            function: None,
        }
    }
}

/// Outcome of resolving a name in the current frame.
pub(crate) enum Lookup {
    Found(Value),
    /// A local of the running function that has not been assigned yet.
    Unbound,
    /// Not bound anywhere; the caller falls back to builtins.
    Missing,
}

// ══════════════════════════════════════════════════════════════════════════════
// Environment
// ══════════════════════════════════════════════════════════════════════════════

/// The interpreter's variable environment: one global scope plus a stack of
/// frames for running functions, class bodies and comprehensions.
pub struct Environment {
    globals: Rc<Scope>,
    frames: Vec<Frame>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            globals: Rc::new(Scope::new(None)),
            frames: vec![Frame::module()],
        }
    }

    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn frame(&self) -> &Frame {
        // The module frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    /// The function whose body is running, if any.
    pub(crate) fn current_function(&self) -> Option<(Rc<Function>, Rc<Scope>)> {
        self.frames.iter().rev().find_map(|frame| match (&frame.function, &frame.scope) {
            (Some(function), Some(scope)) if frame.kind == FrameKind::Function => {
                Some((function.clone(), scope.clone()))
            }
            _ => None,
        })
    }

    /// The scope a function or comprehension created here should close over.
    ///
    /// Class bodies are skipped: methods do not see class-level names.
    pub(crate) fn closure_scope(&self) -> Option<Rc<Scope>> {
        let frame = self.frame();
        match frame.kind {
            FrameKind::Module => None,
            FrameKind::Class => frame.scope.as_ref().and_then(|s| s.parent()),
            FrameKind::Function | FrameKind::Comprehension => frame.scope.clone(),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Lookup {
        let frame = self.frame();
        let found = match frame.kind {
            FrameKind::Module => self.globals.get(name),
            FrameKind::Class => frame
                .scope
                .as_ref()
                .and_then(|scope| chain_get(Some(scope.clone()), name))
                .or_else(|| self.globals.get(name)),
            FrameKind::Function | FrameKind::Comprehension => {
                if frame.info.globals.contains(name) {
                    self.globals.get(name)
                } else if frame.info.locals.contains(name) {
                    match frame.scope.as_ref().and_then(|scope| scope.get(name)) {
                        Some(value) => Some(value),
                        None if frame.kind == FrameKind::Function => return Lookup::Unbound,
                        None => None,
                    }
                } else {
                    let parent = frame.scope.as_ref().and_then(|scope| scope.parent());
                    chain_get(parent, name).or_else(|| self.globals.get(name))
                }
            }
        };
        match found {
            Some(value) => Lookup::Found(value),
            None => Lookup::Missing,
        }
    }

    pub(crate) fn assign(&self, name: &str, value: Value) {
        let frame = self.frame();
        match (&frame.scope, frame.kind) {
            (None, _) => self.globals.set(name, value),
            (Some(_), FrameKind::Function | FrameKind::Comprehension)
                if frame.info.globals.contains(name) =>
            {
                self.globals.set(name, value)
            }
            (Some(scope), FrameKind::Function | FrameKind::Comprehension)
                if frame.info.nonlocals.contains(name) =>
            {
                match chain_owner(scope.parent(), name) {
                    Some(owner) => owner.set(name, value),
                    None => match scope.parent() {
                        Some(parent) => parent.set(name, value),
                        None => self.globals.set(name, value),
                    },
                }
            }
            (Some(scope), _) => scope.set(name, value),
        }
    }

    /// Remove a binding; `false` when the name was not bound.
    pub(crate) fn delete(&self, name: &str) -> bool {
        let frame = self.frame();
        match &frame.scope {
            None => self.globals.remove(name),
            Some(_) if frame.info.globals.contains(name) => self.globals.remove(name),
            Some(scope) if frame.info.nonlocals.contains(name) => {
                chain_owner(scope.parent(), name).is_some_and(|owner| owner.remove(name))
            }
            Some(scope) => scope.remove(name),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_lookup() {
        let outer = Rc::new(Scope::new(None));
        outer.set("x", Value::Int(1));
        let inner = Rc::new(Scope::new(Some(outer.clone())));
        assert_eq!(chain_get(Some(inner.clone()), "x"), Some(Value::Int(1)));
        assert!(chain_owner(Some(inner), "x").is_some_and(|s| Rc::ptr_eq(&s, &outer)));
    }

    #[test]
    fn module_frame_writes_globals() {
        let env = Environment::new();
        env.assign("answer", Value::Int(42));
        assert_eq!(env.globals().get("answer"), Some(Value::Int(42)));
        assert!(matches!(env.lookup("answer"), Lookup::Found(Value::Int(42))));
        assert!(env.delete("answer"));
        assert!(matches!(env.lookup("answer"), Lookup::Missing));
    }
}
