//! Expression evaluation, attribute and item access, and assignment targets.

use gradecraft_types::ast::*;
use std::rc::Rc;

use crate::builtins;
use crate::env::{Frame, Lookup, Scope, ScopeInfo};
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::methods;
use crate::value::{BoundMethod, Descriptor, Dict, FunctionBody, NativeMethod, Value};

/// A subscript: a single item or a slice with optional bounds.
pub(crate) enum Index {
    Item(Value),
    Slice(Option<i64>, Option<i64>, Option<i64>),
}

enum CompElt<'a> {
    Item(&'a Expr),
    Pair(&'a Expr, &'a Expr),
}

enum CompOut {
    List(Vec<Value>),
    Dict(Dict),
}

impl Evaluator {
    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::str(s)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::None => Ok(Value::None),
            ExprKind::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => out.push_str(text),
                        FStringPart::Field {
                            value,
                            conversion,
                            spec,
                        } => {
                            let value = self.eval_expr(value)?;
                            let value = self.convert(value, *conversion)?;
                            out.push_str(&self.format_value(&value, spec)?);
                        }
                    }
                }
                Ok(Value::str(out))
            }
            ExprKind::List(items) => Ok(Value::list(self.eval_items(items)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_items(items)?)),
            ExprKind::Set(items) => {
                let items = self.eval_items(items)?;
                let set = Dict::set_from(items).map_err(|t| self.unhashable(&t))?;
                Ok(Value::set(set))
            }
            ExprKind::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval_expr(key)?;
                    let value = self.eval_expr(value)?;
                    dict.insert(key, value).map_err(|t| self.unhashable(&t))?;
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp { elt, generators } => {
                self.eval_comprehension(CompElt::Item(elt), generators)
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => self.eval_comprehension(CompElt::Pair(key, value), generators),
            ExprKind::Name(name) => self.load_name(name),
            ExprKind::Call { func, args } => self.eval_call(func, args),
            ExprKind::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                self.get_attr(&object, &attr.name)
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval_expr(value)?;
                let index = self.eval_index(index)?;
                self.get_item(&object, &index)
            }
            ExprKind::Slice { .. } => self.raise("TypeError", "slice used outside a subscript"),
            ExprKind::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.binary(*op, left, right)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                self.unary(*op, operand)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval_expr(left)?;
                let short_circuit = match op {
                    BoolOp::And => !self.truthy(&left)?,
                    BoolOp::Or => self.truthy(&left)?,
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expr(right)
                }
            }
            ExprKind::Compare { left, comparisons } => {
                let mut left = self.eval_expr(left)?;
                for (op, right) in comparisons {
                    let right = self.eval_expr(right)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                let test = self.eval_expr(test)?;
                if self.truthy(&test)? {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            ExprKind::Lambda { params, body } => {
                let function = self.make_function(
                    "<lambda>".into(),
                    params,
                    FunctionBody::Expr((**body).clone()),
                    ScopeInfo::for_lambda(params),
                )?;
                Ok(Value::Function(Rc::new(function)))
            }
            ExprKind::Starred(_) => self.raise("TypeError", "can't use starred expression here"),
        }
    }

    /// Evaluate display items, splicing `*iterable` entries.
    fn eval_items(&mut self, items: &[Expr]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match &item.kind {
                ExprKind::Starred(inner) => {
                    let value = self.eval_expr(inner)?;
                    out.extend(self.collect_values(&value)?);
                }
                _ => out.push(self.eval_expr(item)?),
            }
            self.check_len(out.len())?;
        }
        Ok(out)
    }

    // ── Names ─────────────────────────────────────────────────────────────

    pub(crate) fn load_name(&mut self, name: &str) -> EvalResult<Value> {
        match self.env.lookup(name) {
            Lookup::Found(value) => Ok(value),
            Lookup::Unbound => self.raise(
                "UnboundLocalError",
                format!("cannot access local variable '{name}' where it is not associated with a value"),
            ),
            Lookup::Missing => match self.builtin_value(name) {
                Some(value) => Ok(value),
                None => self.raise("NameError", format!("name '{name}' is not defined")),
            },
        }
    }

    pub(crate) fn builtin_value(&self, name: &str) -> Option<Value> {
        if let Some(name) = builtins::lookup(name) {
            return Some(Value::Builtin(name));
        }
        self.classes.get(name).map(Value::Class)
    }

    // ── Comprehensions ────────────────────────────────────────────────────

    fn eval_comprehension(
        &mut self,
        elt: CompElt<'_>,
        generators: &[Comprehension],
    ) -> EvalResult<Value> {
        // The outermost iterable is evaluated in the enclosing scope.
        let first = match generators.first() {
            Some(generator) => self.eval_expr(&generator.iter)?,
            None => Value::list(Vec::new()),
        };
        let scope = Rc::new(Scope::new(self.env.closure_scope()));
        self.env.push_frame(Frame::comprehension(
            scope,
            ScopeInfo::for_comprehension(generators),
        ));
        let mut out = match elt {
            CompElt::Item(_) => CompOut::List(Vec::new()),
            CompElt::Pair(..) => CompOut::Dict(Dict::new()),
        };
        let result = self.comprehension_level(&elt, generators, 0, Some(first), &mut out);
        self.env.pop_frame();
        result?;
        Ok(match out {
            CompOut::List(items) => Value::list(items),
            CompOut::Dict(dict) => Value::dict(dict),
        })
    }

    fn comprehension_level(
        &mut self,
        elt: &CompElt<'_>,
        generators: &[Comprehension],
        level: usize,
        iterable: Option<Value>,
        out: &mut CompOut,
    ) -> EvalResult<()> {
        let Some(generator) = generators.get(level) else {
            match (elt, out) {
                (CompElt::Item(expr), CompOut::List(items)) => {
                    let value = self.eval_expr(expr)?;
                    self.check_len(items.len() + 1)?;
                    items.push(value);
                }
                (CompElt::Pair(key, value), CompOut::Dict(dict)) => {
                    let key = self.eval_expr(key)?;
                    let value = self.eval_expr(value)?;
                    dict.insert(key, value).map_err(|t| self.unhashable(&t))?;
                }
                _ => {}
            }
            return Ok(());
        };
        let iterable = match iterable {
            Some(value) => value,
            None => self.eval_expr(&generator.iter)?,
        };
        let mut items = self.iterate(&iterable)?;
        'items: while let Some(item) = self.next_item(&mut items)? {
            self.assign_target(&generator.target, item)?;
            for condition in &generator.ifs {
                let test = self.eval_expr(condition)?;
                if !self.truthy(&test)? {
                    continue 'items;
                }
            }
            self.comprehension_level(elt, generators, level + 1, None, out)?;
        }
        Ok(())
    }

    // ── Calls ─────────────────────────────────────────────────────────────

    fn eval_call(&mut self, func: &Expr, args: &[Arg]) -> EvalResult<Value> {
        let callee = self.eval_expr(func)?;
        let mut positional = Vec::with_capacity(args.len());
        let mut keywords: Vec<(String, Value)> = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional(expr) => positional.push(self.eval_expr(expr)?),
                Arg::Star(expr) => {
                    let value = self.eval_expr(expr)?;
                    positional.extend(self.collect_values(&value)?);
                }
                Arg::Keyword { name, value } => {
                    let value = self.eval_expr(value)?;
                    self.push_keyword(&callee, &mut keywords, name.name.clone(), value)?;
                }
                Arg::DoubleStar(expr) => {
                    let mapping = self.eval_expr(expr)?;
                    let Value::Dict(dict) = &mapping else {
                        return self.raise(
                            "TypeError",
                            format!(
                                "argument after ** must be a mapping, not {}",
                                mapping.type_name()
                            ),
                        );
                    };
                    let entries: Vec<(Value, Value)> = dict
                        .borrow()
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    for (key, value) in entries {
                        let Value::Str(key) = key else {
                            return self.raise("TypeError", "keywords must be strings");
                        };
                        self.push_keyword(&callee, &mut keywords, key.to_string(), value)?;
                    }
                }
            }
        }
        self.call_value(&callee, positional, keywords)
    }

    fn push_keyword(
        &mut self,
        callee: &Value,
        keywords: &mut Vec<(String, Value)>,
        name: String,
        value: Value,
    ) -> EvalResult<()> {
        if keywords.iter().any(|(k, _)| *k == name) {
            let callee = self.callable_name(callee);
            return self.raise(
                "TypeError",
                format!("{callee}() got multiple values for keyword argument '{name}'"),
            );
        }
        keywords.push((name, value));
        Ok(())
    }

    // ── Attributes ────────────────────────────────────────────────────────

    pub(crate) fn get_attr(&mut self, object: &Value, name: &str) -> EvalResult<Value> {
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.attrs.borrow().get(name) {
                    return Ok(value.clone());
                }
                if name == "__class__" {
                    return Ok(Value::Class(instance.class.clone()));
                }
                match instance.class.lookup(name) {
                    Some(value) => self.bind_attr(value, object),
                    None => self.raise(
                        "AttributeError",
                        format!("'{}' object has no attribute '{name}'", instance.class.name),
                    ),
                }
            }
            Value::Class(class) => {
                if name == "__name__" {
                    return Ok(Value::str(&class.name));
                }
                match class.lookup(name) {
                    Some(Value::Descriptor(descriptor)) => match &*descriptor {
                        Descriptor::Static(function) => Ok(function.clone()),
                        Descriptor::ClassMethod(function) => {
                            Ok(Value::BoundMethod(Rc::new(BoundMethod {
                                receiver: object.clone(),
                                function: function.clone(),
                            })))
                        }
                        Descriptor::Property(_) => Ok(Value::Descriptor(descriptor.clone())),
                    },
                    Some(value) => Ok(value),
                    None => self.raise(
                        "AttributeError",
                        format!("type object '{}' has no attribute '{name}'", class.name),
                    ),
                }
            }
            Value::Super(proxy) => {
                let found = proxy.class.bases.iter().find_map(|base| base.lookup(name));
                match found {
                    Some(value) => self.bind_attr(value, &proxy.receiver),
                    None => self.raise(
                        "AttributeError",
                        format!("'super' object has no attribute '{name}'"),
                    ),
                }
            }
            Value::Module(module) => match module.attrs.get(name) {
                Some(value) => Ok(value.clone()),
                None if name == "__name__" => Ok(Value::str(module.name)),
                None => self.raise(
                    "AttributeError",
                    format!("module '{}' has no attribute '{name}'", module.name),
                ),
            },
            Value::Function(function) if name == "__name__" => Ok(Value::str(&function.name)),
            Value::Builtin(builtin) if name == "__name__" => Ok(Value::str(builtin)),
            _ if name == "__class__" => Ok(self.type_of(object)),
            _ if methods::has_method(object, name) => Ok(Value::NativeMethod(Rc::new(NativeMethod {
                receiver: object.clone(),
                name: name.to_string(),
            }))),
            Value::Builtin(type_name) => self.raise(
                "AttributeError",
                format!("type object '{type_name}' has no attribute '{name}'"),
            ),
            _ => self.raise(
                "AttributeError",
                format!("'{}' object has no attribute '{name}'", object.type_name()),
            ),
        }
    }

    /// Bind a class attribute found through `receiver`.
    fn bind_attr(&mut self, value: Value, receiver: &Value) -> EvalResult<Value> {
        match value {
            Value::Function(_) | Value::Builtin(_) => Ok(Value::BoundMethod(Rc::new(BoundMethod {
                receiver: receiver.clone(),
                function: value,
            }))),
            Value::Descriptor(descriptor) => match &*descriptor {
                Descriptor::Static(function) => Ok(function.clone()),
                Descriptor::ClassMethod(function) => {
                    let class = match receiver {
                        Value::Instance(instance) => Value::Class(instance.class.clone()),
                        other => other.clone(),
                    };
                    Ok(Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: class,
                        function: function.clone(),
                    })))
                }
                Descriptor::Property(getter) => {
                    self.call_value(getter, vec![receiver.clone()], Vec::new())
                }
            },
            other => Ok(other),
        }
    }

    pub(crate) fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> EvalResult<()> {
        match object {
            Value::Instance(instance) => {
                if let Some(Value::Descriptor(descriptor)) = instance.class.lookup(name) {
                    if matches!(&*descriptor, Descriptor::Property(_)) {
                        return self.raise(
                            "AttributeError",
                            format!(
                                "property '{name}' of '{}' object has no setter",
                                instance.class.name
                            ),
                        );
                    }
                }
                instance.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Value::Class(class) if !class.builtin => {
                class.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Value::Class(class) => self.raise(
                "TypeError",
                format!("cannot set '{name}' attribute of immutable type '{}'", class.name),
            ),
            _ => self.raise(
                "AttributeError",
                format!("'{}' object has no attribute '{name}'", object.type_name()),
            ),
        }
    }

    fn del_attr(&mut self, object: &Value, name: &str) -> EvalResult<()> {
        let removed = match object {
            Value::Instance(instance) => instance.attrs.borrow_mut().remove(name).is_some(),
            Value::Class(class) if !class.builtin => class.attrs.borrow_mut().remove(name).is_some(),
            _ => false,
        };
        if removed {
            Ok(())
        } else {
            self.raise(
                "AttributeError",
                format!("'{}' object has no attribute '{name}'", object.type_name()),
            )
        }
    }

    // ── Subscripts ────────────────────────────────────────────────────────

    pub(crate) fn eval_index(&mut self, index: &Expr) -> EvalResult<Index> {
        let ExprKind::Slice { lower, upper, step } = &index.kind else {
            return Ok(Index::Item(self.eval_expr(index)?));
        };
        let bound = |ev: &mut Self, expr: &Option<Box<Expr>>| -> EvalResult<Option<i64>> {
            let Some(expr) = expr else {
                return Ok(None);
            };
            match ev.eval_expr(expr)? {
                Value::None => Ok(None),
                value => match value.as_int() {
                    Some(n) => Ok(Some(n)),
                    None => ev.raise(
                        "TypeError",
                        "slice indices must be integers or None or have an __index__ method",
                    ),
                },
            }
        };
        let lower = bound(self, lower)?;
        let upper = bound(self, upper)?;
        let step = bound(self, step)?;
        Ok(Index::Slice(lower, upper, step))
    }

    pub(crate) fn get_item(&mut self, object: &Value, index: &Index) -> EvalResult<Value> {
        match (object, index) {
            (Value::List(list), Index::Item(i)) => {
                let len = list.borrow().len();
                let i = self.sequence_index(i, len, "list")?;
                let item = list.borrow().get(i).cloned();
                item.ok_or_else(|| self.exception("IndexError", "list index out of range"))
            }
            (Value::List(list), Index::Slice(start, stop, step)) => {
                let items = list.borrow().clone();
                let positions = self.slice_positions(items.len(), *start, *stop, *step)?;
                Ok(Value::list(positions.into_iter().map(|i| items[i].clone()).collect()))
            }
            (Value::Tuple(items), Index::Item(i)) => {
                let i = self.sequence_index(i, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            (Value::Tuple(items), Index::Slice(start, stop, step)) => {
                let positions = self.slice_positions(items.len(), *start, *stop, *step)?;
                Ok(Value::tuple(positions.into_iter().map(|i| items[i].clone()).collect()))
            }
            (Value::Str(s), Index::Item(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let i = self.sequence_index(i, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            (Value::Str(s), Index::Slice(start, stop, step)) => {
                let chars: Vec<char> = s.chars().collect();
                let positions = self.slice_positions(chars.len(), *start, *stop, *step)?;
                Ok(Value::str(positions.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            (Value::Range(range), Index::Item(i)) => {
                let i = self.sequence_index(i, range.len(), "range object")?;
                Ok(Value::Int(range.start + range.step * i as i64))
            }
            (Value::Range(range), Index::Slice(start, stop, step)) => {
                let positions = self.slice_positions(range.len(), *start, *stop, *step)?;
                self.check_len(positions.len())?;
                Ok(Value::list(
                    positions
                        .into_iter()
                        .map(|i| Value::Int(range.start + range.step * i as i64))
                        .collect(),
                ))
            }
            (Value::Dict(dict), Index::Item(key)) => {
                let found = dict.borrow().get(key);
                match found {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(self.key_error(key)),
                    Err(type_name) => Err(self.unhashable(&type_name)),
                }
            }
            (Value::Instance(_), Index::Item(key)) if self.has_dunder(object, "__getitem__") => {
                self.call_dunder(object, "__getitem__", vec![key.clone()])
            }
            _ => self.raise(
                "TypeError",
                format!("'{}' object is not subscriptable", object.type_name()),
            ),
        }
    }

    pub(crate) fn set_item(&mut self, object: &Value, index: Index, value: Value) -> EvalResult<()> {
        match (object, index) {
            (Value::List(list), Index::Item(i)) => {
                let len = list.borrow().len();
                let i = match self.sequence_index(&i, len, "list") {
                    Ok(i) => i,
                    Err(_) if i.as_int().is_some() => {
                        return self.raise("IndexError", "list assignment index out of range")
                    }
                    Err(err) => return Err(err),
                };
                list.borrow_mut()[i] = value;
                Ok(())
            }
            (Value::List(list), Index::Slice(start, stop, step)) => {
                let replacement = self.collect_values(&value)?;
                let len = list.borrow().len();
                if step.unwrap_or(1) == 1 {
                    let (lo, hi) = clamp_slice(len, start, stop);
                    let hi = hi.max(lo);
                    self.check_len(len - (hi - lo) + replacement.len())?;
                    list.borrow_mut().splice(lo..hi, replacement);
                    return Ok(());
                }
                let positions = self.slice_positions(len, start, stop, step)?;
                if positions.len() != replacement.len() {
                    return self.raise(
                        "ValueError",
                        format!(
                            "attempt to assign sequence of size {} to extended slice of size {}",
                            replacement.len(),
                            positions.len()
                        ),
                    );
                }
                let mut items = list.borrow_mut();
                for (i, item) in positions.into_iter().zip(replacement) {
                    items[i] = item;
                }
                Ok(())
            }
            (Value::Dict(dict), Index::Item(key)) => {
                let inserted = dict.borrow_mut().insert(key, value);
                inserted.map_err(|t| self.unhashable(&t))
            }
            (Value::Instance(_), Index::Item(key)) if self.has_dunder(object, "__setitem__") => {
                self.call_dunder(object, "__setitem__", vec![key, value])?;
                Ok(())
            }
            _ => self.raise(
                "TypeError",
                format!(
                    "'{}' object does not support item assignment",
                    object.type_name()
                ),
            ),
        }
    }

    fn del_item(&mut self, object: &Value, index: Index) -> EvalResult<()> {
        match (object, index) {
            (Value::List(list), Index::Item(i)) => {
                let len = list.borrow().len();
                let i = match self.sequence_index(&i, len, "list") {
                    Ok(i) => i,
                    Err(_) if i.as_int().is_some() => {
                        return self.raise("IndexError", "list assignment index out of range")
                    }
                    Err(err) => return Err(err),
                };
                list.borrow_mut().remove(i);
                Ok(())
            }
            (Value::List(list), Index::Slice(start, stop, step)) => {
                let len = list.borrow().len();
                let mut positions = self.slice_positions(len, start, stop, step)?;
                positions.sort_unstable();
                let mut items = list.borrow_mut();
                for i in positions.into_iter().rev() {
                    items.remove(i);
                }
                Ok(())
            }
            (Value::Dict(dict), Index::Item(key)) => {
                let removed = dict.borrow_mut().remove(&key);
                match removed {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => Err(self.key_error(&key)),
                    Err(type_name) => Err(self.unhashable(&type_name)),
                }
            }
            (Value::Instance(_), Index::Item(key)) if self.has_dunder(object, "__delitem__") => {
                self.call_dunder(object, "__delitem__", vec![key])?;
                Ok(())
            }
            _ => self.raise(
                "TypeError",
                format!("'{}' object doesn't support item deletion", object.type_name()),
            ),
        }
    }

    /// Resolve a possibly negative index into `0..len`.
    pub(crate) fn sequence_index(&self, index: &Value, len: usize, what: &str) -> EvalResult<usize> {
        let Some(i) = index.as_int() else {
            let message = if what == "string" {
                format!("string indices must be integers, not '{}'", index.type_name())
            } else {
                format!(
                    "{} indices must be integers or slices, not {}",
                    what.trim_end_matches(" object"),
                    index.type_name()
                )
            };
            return self.raise("TypeError", message);
        };
        let resolved = if i < 0 { i + len as i64 } else { i };
        if resolved < 0 || resolved >= len as i64 {
            return self.raise("IndexError", format!("{what} index out of range"));
        }
        Ok(resolved as usize)
    }

    /// The positions a slice selects, in selection order.
    pub(crate) fn slice_positions(
        &self,
        len: usize,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> EvalResult<Vec<usize>> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return self.raise("ValueError", "slice step cannot be zero");
        }
        let len = len as i64;
        let adjust = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(low, high)
        };
        let mut positions = Vec::new();
        if step > 0 {
            let start = start.map_or(0, |s| adjust(s, 0, len));
            let stop = stop.map_or(len, |s| adjust(s, 0, len));
            let mut i = start;
            while i < stop {
                positions.push(i as usize);
                i += step;
            }
        } else {
            let start = start.map_or(len - 1, |s| adjust(s, -1, len - 1));
            let stop = stop.map_or(-1, |s| adjust(s, -1, len - 1));
            let mut i = start;
            while i > stop {
                positions.push(i as usize);
                i += step;
            }
        }
        Ok(positions)
    }

    // ── Assignment targets ────────────────────────────────────────────────

    pub(crate) fn assign_target(&mut self, target: &Expr, value: Value) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.env.assign(name, value);
                Ok(())
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval_expr(object)?;
                self.set_attr(&object, &attr.name, value)
            }
            ExprKind::Subscript { value: object, index } => {
                let object = self.eval_expr(object)?;
                let index = self.eval_index(index)?;
                self.set_item(&object, index, value)
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => self.unpack(targets, value),
            ExprKind::Starred(_) => self.raise(
                "SyntaxError",
                "starred assignment target must be in a list or tuple",
            ),
            _ => self.raise("SyntaxError", "cannot assign to expression"),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value) -> EvalResult<()> {
        if !self.is_iterable(&value) {
            return self.raise(
                "TypeError",
                format!("cannot unpack non-iterable {} object", value.type_name()),
            );
        }
        let items = self.collect_values(&value)?;
        let star = targets
            .iter()
            .position(|t| matches!(t.kind, ExprKind::Starred(_)));
        match star {
            None => {
                if items.len() > targets.len() {
                    return self.raise(
                        "ValueError",
                        format!("too many values to unpack (expected {})", targets.len()),
                    );
                }
                if items.len() < targets.len() {
                    return self.raise(
                        "ValueError",
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ),
                    );
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign_target(target, item)?;
                }
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < targets.len() - 1 {
                    return self.raise(
                        "ValueError",
                        format!(
                            "not enough values to unpack (expected at least {}, got {})",
                            targets.len() - 1,
                            items.len()
                        ),
                    );
                }
                let mut items = items;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(star);
                for (target, item) in targets[..star].iter().zip(items) {
                    self.assign_target(target, item)?;
                }
                if let ExprKind::Starred(inner) = &targets[star].kind {
                    self.assign_target(inner, Value::list(middle))?;
                }
                for (target, item) in targets[star + 1..].iter().zip(tail) {
                    self.assign_target(target, item)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn delete_target(&mut self, target: &Expr) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                if self.env.delete(name) {
                    Ok(())
                } else {
                    self.raise("NameError", format!("name '{name}' is not defined"))
                }
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval_expr(value)?;
                self.del_attr(&object, &attr.name)
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval_expr(value)?;
                let index = self.eval_index(index)?;
                self.del_item(&object, index)
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
            _ => self.raise("SyntaxError", "cannot delete expression"),
        }
    }

    /// The type object of a value, for `type(x)` and `x.__class__`.
    pub(crate) fn type_of(&self, value: &Value) -> Value {
        match value {
            Value::Instance(instance) => Value::Class(instance.class.clone()),
            Value::Class(_) => Value::Builtin("type"),
            Value::None => Value::Builtin("NoneType"),
            other => match builtins::lookup(&other.type_name()) {
                Some(name) => Value::Builtin(name),
                None => Value::Builtin("type"),
            },
        }
    }
}

/// Clamp `[start:stop]` bounds for a step-1 slice of length `len`.
fn clamp_slice(len: usize, start: Option<i64>, stop: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    (
        start.map_or(0, clamp),
        stop.map_or(len as usize, clamp),
    )
}
