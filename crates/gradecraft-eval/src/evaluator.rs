//! Core statement evaluator and the interpreter's public API.

use gradecraft_types::ast::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::env::{Environment, Frame, Scope, ScopeInfo};
use crate::error::{EvalError, EvalResult, PyException};
use crate::exceptions::BuiltinClasses;
use crate::modules;
use crate::value::{Class, Function, FunctionBody, Instance, Value, NESTED_TOO_DEEPLY, TYPE_NAMES};
use crate::builtins;

/// Resource caps applied to one interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Deepest Python call stack before `RecursionError`.
    pub max_call_depth: usize,
    /// Largest list, string or range a single native operation may
    /// materialize before `MemoryError`.
    pub max_collection_len: usize,
    /// Printed output beyond this many bytes is dropped.
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: 200,
            max_collection_len: 5_000_000,
            max_output_bytes: 1 << 20,
        }
    }
}

/// The tree-walking interpreter. Runs statements against one global
/// namespace.
pub struct Evaluator {
    pub(crate) env: Environment,
    pub(crate) classes: BuiltinClasses,
    pub(crate) limits: Limits,
    output: String,
    output_truncated: bool,
    cancel: CancelToken,
    /// `None` lets any native module be imported.
    allowed_imports: Option<BTreeSet<String>>,
    depth: usize,
    /// Exceptions being handled by enclosing `except` blocks, for bare `raise`.
    handling: Vec<PyException>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            classes: BuiltinClasses::new(),
            limits: Limits::default(),
            output: String::new(),
            output_truncated: false,
            cancel: CancelToken::new(),
            allowed_imports: None,
            depth: 0,
            handling: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Restrict `import` statements executed at run time to these modules.
    pub fn with_allowed_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_imports = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the cancellation token, e.g. to give a later call its own
    /// deadline.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    // ══════════════════════════════════════════════════════════════════════
    // Public API
    // ══════════════════════════════════════════════════════════════════════

    /// Execute module-level statements in the global namespace.
    pub fn run(&mut self, body: &[Stmt]) -> EvalResult<()> {
        debug!(statements = body.len(), "running module body");
        self.exec_block(body)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.env.globals().get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.env.globals().set(name, value);
    }

    pub fn global_names(&self) -> Vec<String> {
        self.env.globals().names()
    }

    /// Call a value with positional arguments.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        self.call_value(callee, args, Vec::new())
    }

    /// Everything `print` has written so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Whether printed output hit the size cap and was cut short.
    pub fn output_truncated(&self) -> bool {
        self.output_truncated
    }

    /// `repr()` of a value, running `__repr__` where defined.
    pub fn repr(&mut self, value: &Value) -> EvalResult<String> {
        self.repr_of(value)
    }

    /// `str()` of a value, running `__str__` where defined.
    pub fn str(&mut self, value: &Value) -> EvalResult<String> {
        self.str_of(value)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Plumbing
    // ══════════════════════════════════════════════════════════════════════

    /// Observe the cancellation token. Called at every statement and
    /// expression.
    pub(crate) fn tick(&self) -> EvalResult<()> {
        if self.cancel.is_cancelled() {
            Err(EvalError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        let room = self.limits.max_output_bytes.saturating_sub(self.output.len());
        if text.len() <= room {
            self.output.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.output.push_str(&text[..cut]);
        self.output_truncated = true;
    }

    /// Build a builtin exception carrying `message` as its single argument.
    pub(crate) fn exception(&self, type_name: &str, message: impl Into<String>) -> EvalError {
        let message = message.into();
        let args = if message.is_empty() {
            Vec::new()
        } else {
            vec![Value::str(&message)]
        };
        self.exception_with_args(type_name, args, message)
    }

    pub(crate) fn exception_with_args(
        &self,
        type_name: &str,
        args: Vec<Value>,
        message: String,
    ) -> EvalError {
        let value = match self.classes.get(type_name) {
            Some(class) => {
                let instance = Instance::new(class);
                instance
                    .attrs
                    .borrow_mut()
                    .insert("args".into(), Value::tuple(args));
                Value::Instance(Rc::new(instance))
            }
            None => Value::None,
        };
        EvalError::Exception(Box::new(PyException {
            type_name: type_name.to_string(),
            message,
            line: None,
            value,
        }))
    }

    pub(crate) fn raise<T>(&self, type_name: &str, message: impl Into<String>) -> EvalResult<T> {
        Err(self.exception(type_name, message))
    }

    /// `KeyError(key)`, whose message is the key's `repr`.
    pub(crate) fn key_error(&mut self, key: &Value) -> EvalError {
        match self.repr_of(key) {
            Ok(message) => self.exception_with_args("KeyError", vec![key.clone()], message),
            Err(err) => err,
        }
    }

    pub(crate) fn unhashable(&self, type_name: &str) -> EvalError {
        if type_name == NESTED_TOO_DEEPLY {
            return self.exception("RecursionError", "maximum recursion depth exceeded while hashing");
        }
        self.exception("TypeError", format!("unhashable type: '{type_name}'"))
    }

    /// Turn a raised value into an exception, instantiating bare classes.
    pub(crate) fn raise_value(&mut self, value: Value) -> EvalResult<EvalError> {
        let instance = match &value {
            Value::Class(class) if self.classes.is_exception_class(class) => {
                self.instantiate(class, Vec::new(), Vec::new())?
            }
            Value::Instance(instance) if self.classes.is_exception_class(&instance.class) => value,
            _ => return Ok(self.exception("TypeError", "exceptions must derive from BaseException")),
        };
        let type_name = match &instance {
            Value::Instance(i) => i.class.name.clone(),
            _ => "Exception".to_string(),
        };
        let message = self.str_of(&instance)?;
        Ok(EvalError::Exception(Box::new(PyException {
            type_name,
            message,
            line: None,
            value: instance,
        })))
    }

    pub(crate) fn enter_call(&mut self) -> EvalResult<()> {
        if self.depth >= self.limits.max_call_depth {
            return self.raise("RecursionError", "maximum recursion depth exceeded");
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn exec_block(&mut self, body: &[Stmt]) -> EvalResult<()> {
        for stmt in body {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<()> {
        self.tick()?;
        match self.exec_stmt_inner(stmt) {
            Err(EvalError::Exception(mut exc)) => {
                if exc.line.is_none() {
                    exc.line = Some(stmt.span().start_line);
                }
                Err(EvalError::Exception(exc))
            }
            other => other,
        }
    }

    fn exec_stmt_inner(&mut self, stmt: &Stmt) -> EvalResult<()> {
        match stmt {
            Stmt::FunctionDef(def) => self.exec_function_def(def),
            Stmt::ClassDef(def) => self.exec_class_def(def),
            Stmt::Import(import) => self.exec_import(import),
            Stmt::ImportFrom(import) => self.exec_import_from(import),
            Stmt::Assign(assign) => {
                let value = self.eval_expr(&assign.value)?;
                for target in &assign.targets {
                    self.assign_target(target, value.clone())?;
                }
                Ok(())
            }
            Stmt::AugAssign(aug) => self.exec_aug_assign(aug),
            Stmt::AnnAssign(ann) => match &ann.value {
                Some(value) => {
                    let value = self.eval_expr(value)?;
                    self.assign_target(&ann.target, value)
                }
                None => Ok(()),
            },
            Stmt::If(stmt) => {
                let test = self.eval_expr(&stmt.test)?;
                if self.truthy(&test)? {
                    self.exec_block(&stmt.body)
                } else {
                    self.exec_block(&stmt.orelse)
                }
            }
            Stmt::While(stmt) => self.exec_while(stmt),
            Stmt::For(stmt) => self.exec_for(stmt),
            Stmt::Try(stmt) => self.exec_try(stmt),
            Stmt::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                Err(EvalError::Return(value))
            }
            Stmt::Raise(raise) => self.exec_raise(raise),
            Stmt::Assert(assert) => {
                let test = self.eval_expr(&assert.test)?;
                if self.truthy(&test)? {
                    return Ok(());
                }
                let message = match &assert.msg {
                    Some(msg) => {
                        let msg = self.eval_expr(msg)?;
                        self.str_of(&msg)?
                    }
                    None => String::new(),
                };
                self.raise("AssertionError", message)
            }
            Stmt::Delete(del) => {
                for target in &del.targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
            Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) => Ok(()),
            Stmt::Break(_) => Err(EvalError::Break),
            Stmt::Continue(_) => Err(EvalError::Continue),
            Stmt::Expr(stmt) => self.eval_expr(&stmt.value).map(|_| ()),
        }
    }

    // ── Definitions ───────────────────────────────────────────────────────

    fn exec_function_def(&mut self, def: &FunctionDef) -> EvalResult<()> {
        let decorators = self.eval_all(&def.decorators)?;
        let function = self.make_function(
            def.name.name.clone(),
            &def.params,
            FunctionBody::Block(def.body.clone()),
            ScopeInfo::for_function(&def.params, &def.body),
        )?;
        let value = self.decorate(Value::Function(Rc::new(function)), decorators)?;
        self.env.assign(&def.name.name, value);
        Ok(())
    }

    /// Build a function object, evaluating its defaults now.
    pub(crate) fn make_function(
        &mut self,
        name: String,
        params: &Params,
        body: FunctionBody,
        scope_info: ScopeInfo,
    ) -> EvalResult<Function> {
        let mut defaults = Vec::new();
        for param in &params.positional {
            if let Some(default) = &param.default {
                defaults.push(self.eval_expr(default)?);
            }
        }
        let mut kw_defaults = BTreeMap::new();
        for param in &params.kwonly {
            if let Some(default) = &param.default {
                kw_defaults.insert(param.name.name.clone(), self.eval_expr(default)?);
            }
        }
        Ok(Function {
            name,
            params: params.clone(),
            defaults,
            kw_defaults,
            body,
            closure: self.env.closure_scope(),
            scope_info: Rc::new(scope_info),
            owner: RefCell::new(None),
        })
    }

    fn decorate(&mut self, mut value: Value, decorators: Vec<Value>) -> EvalResult<Value> {
        for decorator in decorators.iter().rev() {
            value = self.call_value(decorator, vec![value], Vec::new())?;
        }
        Ok(value)
    }

    fn exec_class_def(&mut self, def: &ClassDef) -> EvalResult<()> {
        let decorators = self.eval_all(&def.decorators)?;
        let mut bases = Vec::new();
        for base in &def.bases {
            match self.eval_expr(base)? {
                Value::Class(class) => bases.push(class),
                other => {
                    return self.raise(
                        "TypeError",
                        format!("bases must be types, not '{}'", other.type_name()),
                    )
                }
            }
        }
        if bases.is_empty() {
            bases.extend(self.classes.get("object"));
        }

        let scope = Rc::new(Scope::new(self.env.closure_scope()));
        self.env.push_frame(Frame::class(scope.clone()));
        let result = self.exec_block(&def.body);
        self.env.pop_frame();
        result?;

        let class = Rc::new(Class {
            name: def.name.name.clone(),
            bases,
            attrs: RefCell::new(scope.bindings().into_iter().collect()),
            builtin: false,
        });
        for value in class.attrs.borrow().values() {
            let function = match value {
                Value::Function(f) => Some(f.clone()),
                Value::Descriptor(d) => match &**d {
                    crate::value::Descriptor::Static(Value::Function(f))
                    | crate::value::Descriptor::ClassMethod(Value::Function(f))
                    | crate::value::Descriptor::Property(Value::Function(f)) => Some(f.clone()),
                    _ => None,
                },
                _ => None,
            };
            if let Some(function) = function {
                let mut owner = function.owner.borrow_mut();
                if owner.is_none() {
                    *owner = Some(Rc::downgrade(&class));
                }
            }
        }
        let value = self.decorate(Value::Class(class), decorators)?;
        self.env.assign(&def.name.name, value);
        Ok(())
    }

    // ── Imports ───────────────────────────────────────────────────────────

    fn exec_import(&mut self, import: &Import) -> EvalResult<()> {
        for alias in &import.names {
            let module = self.import_module(&alias.name)?;
            let bound = match &alias.asname {
                Some(asname) => asname.name.as_str(),
                None => alias.name.split('.').next().unwrap_or(&alias.name),
            };
            self.env.assign(bound, module);
        }
        Ok(())
    }

    fn exec_import_from(&mut self, import: &ImportFrom) -> EvalResult<()> {
        if import.level > 0 {
            self.check_import_allowed(&import.module)?;
            return self.raise(
                "ImportError",
                "attempted relative import with no known parent package",
            );
        }
        let module = self.import_module(&import.module)?;
        let Value::Module(module) = module else {
            return Ok(());
        };
        for alias in &import.names {
            if alias.name == "*" {
                for (name, value) in &module.attrs {
                    if !name.starts_with('_') {
                        self.env.assign(name, value.clone());
                    }
                }
                continue;
            }
            let Some(value) = module.attrs.get(alias.name.as_str()).cloned() else {
                return self.raise(
                    "ImportError",
                    format!(
                        "cannot import name '{}' from '{}' (unknown location)",
                        alias.name, module.name
                    ),
                );
            };
            let bound = alias.asname.as_ref().map_or(&alias.name, |a| &a.name);
            self.env.assign(bound, value);
        }
        Ok(())
    }

    fn check_import_allowed(&self, module: &str) -> EvalResult<()> {
        match &self.allowed_imports {
            Some(allowed) if !allowed.contains(module) => {
                warn!(module, "run-time import outside the allow-list");
                self.raise("ImportError", format!("Attempted to import {module}"))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn import_module(&mut self, name: &str) -> EvalResult<Value> {
        self.check_import_allowed(name)?;
        match modules::load(name) {
            Some(module) => Ok(Value::Module(module)),
            None => self.raise("ModuleNotFoundError", format!("No module named '{name}'")),
        }
    }

    // ── Assignment ────────────────────────────────────────────────────────

    fn exec_aug_assign(&mut self, aug: &AugAssign) -> EvalResult<()> {
        match &aug.target.kind {
            ExprKind::Name(name) => {
                let current = self.load_name(name)?;
                let rhs = self.eval_expr(&aug.value)?;
                let result = self.inplace(aug.op, current, rhs)?;
                self.env.assign(name, result);
                Ok(())
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                let current = self.get_attr(&object, &attr.name)?;
                let rhs = self.eval_expr(&aug.value)?;
                let result = self.inplace(aug.op, current, rhs)?;
                self.set_attr(&object, &attr.name, result)
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval_expr(value)?;
                let index = self.eval_index(index)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval_expr(&aug.value)?;
                let result = self.inplace(aug.op, current, rhs)?;
                self.set_item(&object, index, result)
            }
            _ => self.raise("TypeError", "illegal expression for augmented assignment"),
        }
    }

    /// `a op= b`: lists extend in place, everything else rebinds.
    fn inplace(&mut self, op: BinOp, current: Value, rhs: Value) -> EvalResult<Value> {
        if let (BinOp::Add, Value::List(list)) = (op, &current) {
            let items = self.collect_values(&rhs)?;
            list.borrow_mut().extend(items);
            return Ok(current);
        }
        self.binary(op, current, rhs)
    }

    // ── Control flow ──────────────────────────────────────────────────────

    fn exec_while(&mut self, stmt: &While) -> EvalResult<()> {
        loop {
            let test = self.eval_expr(&stmt.test)?;
            if !self.truthy(&test)? {
                return self.exec_block(&stmt.orelse);
            }
            match self.exec_block(&stmt.body) {
                Ok(()) | Err(EvalError::Continue) => {}
                Err(EvalError::Break) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn exec_for(&mut self, stmt: &For) -> EvalResult<()> {
        let iterable = self.eval_expr(&stmt.iter)?;
        let mut items = self.iterate(&iterable)?;
        while let Some(item) = self.next_item(&mut items)? {
            self.assign_target(&stmt.target, item)?;
            match self.exec_block(&stmt.body) {
                Ok(()) | Err(EvalError::Continue) => {}
                Err(EvalError::Break) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        self.exec_block(&stmt.orelse)
    }

    fn exec_try(&mut self, stmt: &Try) -> EvalResult<()> {
        let outcome = match self.exec_block(&stmt.body) {
            Ok(()) => self.exec_block(&stmt.orelse),
            Err(EvalError::Exception(exc)) => self.handle_exception(stmt, *exc),
            Err(other) => Err(other),
        };
        if stmt.finalbody.is_empty() || matches!(outcome, Err(EvalError::Cancelled)) {
            return outcome;
        }
        self.exec_block(&stmt.finalbody)?;
        outcome
    }

    fn handle_exception(&mut self, stmt: &Try, exc: PyException) -> EvalResult<()> {
        for handler in &stmt.handlers {
            let matches = match &handler.kind {
                None => true,
                Some(kind) => {
                    let kind = self.eval_expr(kind)?;
                    self.exception_matches(&exc.value, &kind)?
                }
            };
            if !matches {
                continue;
            }
            if let Some(name) = &handler.name {
                self.env.assign(&name.name, exc.value.clone());
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body);
            self.handling.pop();
            if let Some(name) = &handler.name {
                self.env.delete(&name.name);
            }
            return result;
        }
        Err(EvalError::Exception(Box::new(exc)))
    }

    fn exception_matches(&mut self, exc: &Value, kind: &Value) -> EvalResult<bool> {
        match kind {
            Value::Class(class) if self.classes.is_exception_class(class) => Ok(match exc {
                Value::Instance(instance) => instance.class.is_subclass_of(class),
                _ => false,
            }),
            Value::Tuple(kinds) => {
                for kind in kinds.iter() {
                    if self.exception_matches(exc, kind)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => self.raise(
                "TypeError",
                "catching classes that do not inherit from BaseException is not allowed",
            ),
        }
    }

    fn exec_raise(&mut self, raise: &Raise) -> EvalResult<()> {
        match &raise.exc {
            None => match self.handling.last() {
                Some(exc) => Err(EvalError::Exception(Box::new(exc.clone()))),
                None => self.raise("RuntimeError", "No active exception to reraise"),
            },
            Some(expr) => {
                let value = self.eval_expr(expr)?;
                Err(self.raise_value(value)?)
            }
        }
    }

    pub(crate) fn eval_all(&mut self, exprs: &[Expr]) -> EvalResult<Vec<Value>> {
        exprs.iter().map(|expr| self.eval_expr(expr)).collect()
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// The builtin names visible to every submission.
pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = builtins::BUILTIN_FUNCTIONS.to_vec();
    names.extend(TYPE_NAMES.iter().filter(|&&t| t != "NoneType"));
    names.extend(BuiltinClasses::new().names());
    names.sort_unstable();
    names
}
