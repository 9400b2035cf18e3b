//! Calling functions, methods and classes.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::builtins;
use crate::env::{Frame, Scope};
use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::methods;
use crate::value::{Class, Descriptor, Dict, Function, FunctionBody, Instance, Value};

impl Evaluator {
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        self.tick()?;
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(name) => builtins::call(self, name, args, kwargs),
            Value::BoundMethod(method) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(method.receiver.clone());
                full.extend(args);
                self.call_value(&method.function, full, kwargs)
            }
            Value::NativeMethod(method) => {
                methods::call(self, &method.receiver, &method.name, args, kwargs)
            }
            Value::Class(class) => self.instantiate(class, args, kwargs),
            Value::Instance(instance) => match instance.class.lookup("__call__") {
                Some(method) => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(callee.clone());
                    full.extend(args);
                    self.call_value(&method, full, kwargs)
                }
                None => self.raise(
                    "TypeError",
                    format!("'{}' object is not callable", instance.class.name),
                ),
            },
            Value::Descriptor(descriptor) => match &**descriptor {
                Descriptor::Static(function) => self.call_value(function, args, kwargs),
                other => self.raise(
                    "TypeError",
                    format!("'{}' object is not callable", other.kind()),
                ),
            },
            other => self.raise(
                "TypeError",
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        self.enter_call()?;
        let scope = Rc::new(Scope::new(function.closure.clone()));
        if let Err(err) = self.bind_arguments(function, &scope, args, kwargs) {
            self.leave_call();
            return Err(err);
        }
        self.env.push_frame(Frame::function(scope, function.clone()));
        let result = match &function.body {
            FunctionBody::Block(body) => match self.exec_block(body) {
                Ok(()) => Ok(Value::None),
                Err(EvalError::Return(value)) => Ok(value),
                Err(err) => Err(err),
            },
            FunctionBody::Expr(expr) => self.eval_expr(expr),
        };
        self.env.pop_frame();
        self.leave_call();
        result
    }

    /// Bind call arguments to parameters in a fresh function scope.
    fn bind_arguments(
        &mut self,
        function: &Function,
        scope: &Scope,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<()> {
        let params = &function.params;
        let name = &function.name;
        let arity = params.positional.len();

        let mut bound: Vec<Option<Value>> = vec![None; arity];
        let mut extra = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i < arity {
                bound[i] = Some(arg);
            } else {
                extra.push(arg);
            }
        }
        if !extra.is_empty() && params.vararg.is_none() {
            let given = arity + extra.len();
            let required = arity - function.defaults.len();
            let takes = if function.defaults.is_empty() {
                arity.to_string()
            } else {
                format!("from {required} to {arity}")
            };
            let plural = if takes == "1" { "" } else { "s" };
            let were = if given == 1 { "was" } else { "were" };
            return self.raise(
                "TypeError",
                format!("{name}() takes {takes} positional argument{plural} but {given} {were} given"),
            );
        }

        let mut kwonly: BTreeMap<String, Value> = BTreeMap::new();
        let mut extra_kwargs = Dict::new();
        for (key, value) in kwargs {
            if let Some(i) = params.positional.iter().position(|p| p.name.name == key) {
                if bound[i].is_some() {
                    return self.raise(
                        "TypeError",
                        format!("{name}() got multiple values for argument '{key}'"),
                    );
                }
                bound[i] = Some(value);
            } else if params.kwonly.iter().any(|p| p.name.name == key) {
                kwonly.insert(key, value);
            } else if params.kwarg.is_some() {
                // Keys are strings, which always hash.
                let _ = extra_kwargs.insert(Value::str(&key), value);
            } else {
                return self.raise(
                    "TypeError",
                    format!("{name}() got an unexpected keyword argument '{key}'"),
                );
            }
        }

        let first_default = arity - function.defaults.len();
        let mut missing = Vec::new();
        for (i, slot) in bound.iter_mut().enumerate() {
            if slot.is_none() {
                if i >= first_default {
                    *slot = Some(function.defaults[i - first_default].clone());
                } else {
                    missing.push(params.positional[i].name.name.clone());
                }
            }
        }
        if !missing.is_empty() {
            return self.raise(
                "TypeError",
                format!(
                    "{name}() missing {} required positional argument{}: {}",
                    missing.len(),
                    if missing.len() == 1 { "" } else { "s" },
                    name_list(&missing)
                ),
            );
        }

        for (param, value) in params.positional.iter().zip(bound) {
            if let Some(value) = value {
                scope.set(&param.name.name, value);
            }
        }
        if let Some(vararg) = &params.vararg {
            scope.set(&vararg.name, Value::tuple(extra));
        }

        let mut missing = Vec::new();
        for param in &params.kwonly {
            let key = &param.name.name;
            match kwonly
                .remove(key)
                .or_else(|| function.kw_defaults.get(key).cloned())
            {
                Some(value) => scope.set(key, value),
                None => missing.push(key.clone()),
            }
        }
        if !missing.is_empty() {
            return self.raise(
                "TypeError",
                format!(
                    "{name}() missing {} required keyword-only argument{}: {}",
                    missing.len(),
                    if missing.len() == 1 { "" } else { "s" },
                    name_list(&missing)
                ),
            );
        }
        if let Some(kwarg) = &params.kwarg {
            scope.set(&kwarg.name, Value::dict(extra_kwargs));
        }
        Ok(())
    }

    /// Create an instance and run `__init__`.
    pub(crate) fn instantiate(
        &mut self,
        class: &Rc<Class>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> EvalResult<Value> {
        let instance = Rc::new(Instance::new(class.clone()));
        if self.classes.is_exception_class(class) {
            instance
                .attrs
                .borrow_mut()
                .insert("args".into(), Value::tuple(args.clone()));
        }
        let value = Value::Instance(instance);
        match class.lookup("__init__") {
            Some(init) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(value.clone());
                full.extend(args);
                let returned = self.call_value(&init, full, kwargs)?;
                if !matches!(returned, Value::None) {
                    return self.raise(
                        "TypeError",
                        format!(
                            "__init__() should return None, not '{}'",
                            returned.type_name()
                        ),
                    );
                }
            }
            None if !args.is_empty() || !kwargs.is_empty() => {
                return self.raise("TypeError", format!("{}() takes no arguments", class.name));
            }
            None => {}
        }
        Ok(value)
    }

    pub(crate) fn has_dunder(&self, object: &Value, name: &str) -> bool {
        match object {
            Value::Instance(instance) => instance.class.lookup(name).is_some(),
            _ => false,
        }
    }

    /// Call a special method defined on an instance's class.
    pub(crate) fn call_dunder(
        &mut self,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let method = match object {
            Value::Instance(instance) => instance.class.lookup(name),
            _ => None,
        };
        let Some(method) = method else {
            return self.raise(
                "AttributeError",
                format!("'{}' object has no attribute '{name}'", object.type_name()),
            );
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend(args);
        self.call_value(&method, full, Vec::new())
    }

    /// The name a callable goes by in error messages.
    pub(crate) fn callable_name(&self, callee: &Value) -> String {
        match callee {
            Value::Function(function) => function.name.clone(),
            Value::Builtin(name) => name.rsplit('.').next().unwrap_or(name).to_string(),
            Value::BoundMethod(method) => self.callable_name(&method.function),
            Value::NativeMethod(method) => method.name.clone(),
            Value::Class(class) => class.name.clone(),
            other => other.type_name(),
        }
    }
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`
fn name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_argument_lists_read_like_python() {
        let names = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(name_list(&names(&["a"])), "'a'");
        assert_eq!(name_list(&names(&["a", "b"])), "'a' and 'b'");
        assert_eq!(name_list(&names(&["a", "b", "c"])), "'a', 'b', and 'c'");
    }
}
