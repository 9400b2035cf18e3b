//! Operators, comparisons, membership and iteration.

use gradecraft_types::ast::{BinOp, CmpOp, UnaryOp};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::value::{py_eq, Dict, RangeValue, Shared, Value};

/// Containers nested deeper than this raise `RecursionError` when compared.
const MAX_COMPARE_DEPTH: usize = 200;

/// Live iteration state over a value.
///
/// Lists are read by index on every step so appending during a `for` loop
/// extends the loop, as in Python. Dicts and sets walk a snapshot of their
/// keys and fail once the live size drifts from it.
pub(crate) enum ValueIter {
    List { list: Shared<Vec<Value>>, index: usize },
    Items(std::vec::IntoIter<Value>),
    Keys {
        dict: Shared<Dict>,
        keys: std::vec::IntoIter<Value>,
        len: usize,
        is_set: bool,
    },
    Range { range: RangeValue, index: usize },
    /// A user object implementing `__next__`.
    Protocol(Value),
}

fn dunder_for(op: BinOp) -> (&'static str, &'static str) {
    match op {
        BinOp::Add => ("__add__", "__radd__"),
        BinOp::Sub => ("__sub__", "__rsub__"),
        BinOp::Mul => ("__mul__", "__rmul__"),
        BinOp::Div => ("__truediv__", "__rtruediv__"),
        BinOp::FloorDiv => ("__floordiv__", "__rfloordiv__"),
        BinOp::Mod => ("__mod__", "__rmod__"),
        BinOp::Pow => ("__pow__", "__rpow__"),
        BinOp::BitOr => ("__or__", "__ror__"),
        BinOp::BitXor => ("__xor__", "__rxor__"),
        BinOp::BitAnd => ("__and__", "__rand__"),
        BinOp::LShift => ("__lshift__", "__rlshift__"),
        BinOp::RShift => ("__rshift__", "__rrshift__"),
    }
}

impl Evaluator {
    // ══════════════════════════════════════════════════════════════════════
    // Arithmetic
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn binary(&mut self, op: BinOp, left: Value, right: Value) -> EvalResult<Value> {
        let (forward, reflected) = dunder_for(op);
        if self.has_dunder(&left, forward) {
            return self.call_dunder(&left, forward, vec![right]);
        }
        if self.has_dunder(&right, reflected) {
            return self.call_dunder(&right, reflected, vec![left]);
        }

        if let (Value::Bool(a), Value::Bool(b)) = (&left, &right) {
            match op {
                BinOp::BitAnd => return Ok(Value::Bool(*a & *b)),
                BinOp::BitOr => return Ok(Value::Bool(*a | *b)),
                BinOp::BitXor => return Ok(Value::Bool(*a ^ *b)),
                _ => {}
            }
        }
        if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
            return self.int_op(op, a, b);
        }
        if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
            if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
                return self.float_op(op, a, b, &left, &right);
            }
        }

        match (op, &left, &right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::str(format!("{a}{b}")))
            }
            (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s))
                if n.as_int().is_some() =>
            {
                let count = n.as_int().unwrap_or(0).max(0) as usize;
                self.check_len(s.len().saturating_mul(count))?;
                Ok(Value::str(s.repeat(count)))
            }
            (BinOp::Mod, Value::Str(template), args) => {
                let template = template.clone();
                Ok(Value::str(self.percent_format(&template, args)?))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                self.check_len(items.len())?;
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                let mut items = a.to_vec();
                items.extend(b.iter().cloned());
                self.check_len(items.len())?;
                Ok(Value::tuple(items))
            }
            (BinOp::Mul, Value::List(_) | Value::Tuple(_), n)
            | (BinOp::Mul, n, Value::List(_) | Value::Tuple(_))
                if n.as_int().is_some() =>
            {
                let sequence = if n.is(&left) { &right } else { &left };
                let count = n.as_int().unwrap_or(0).max(0) as usize;
                let items = match sequence {
                    Value::List(items) => items.borrow().clone(),
                    Value::Tuple(items) => items.to_vec(),
                    _ => Vec::new(),
                };
                self.check_len(items.len().saturating_mul(count))?;
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(match sequence {
                    Value::Tuple(_) => Value::tuple(out),
                    _ => Value::list(out),
                })
            }
            (
                BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor,
                Value::Set(a),
                Value::Set(b),
            ) => {
                let (a, b) = (a.borrow(), b.borrow());
                let keep = |dict: &Dict, key: &Value| dict.contains(key).unwrap_or(false);
                let items: Vec<Value> = match op {
                    BinOp::BitOr => a.keys().chain(b.keys()).cloned().collect(),
                    BinOp::BitAnd => a.keys().filter(|k| keep(&b, k)).cloned().collect(),
                    BinOp::Sub => a.keys().filter(|k| !keep(&b, k)).cloned().collect(),
                    _ => a
                        .keys()
                        .filter(|k| !keep(&b, k))
                        .chain(b.keys().filter(|k| !keep(&a, k)))
                        .cloned()
                        .collect(),
                };
                let set = Dict::set_from(items).map_err(|t| self.unhashable(&t))?;
                Ok(Value::set(set))
            }
            (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.borrow().clone();
                for (key, value) in b.borrow().iter() {
                    merged
                        .insert(key.clone(), value.clone())
                        .map_err(|t| self.unhashable(&t))?;
                }
                Ok(Value::dict(merged))
            }
            _ => Err(self.unsupported(op, &left, &right)),
        }
    }

    fn unsupported(&self, op: BinOp, left: &Value, right: &Value) -> EvalError {
        let message = match (op, left) {
            (BinOp::Add, Value::Str(_) | Value::List(_) | Value::Tuple(_)) => format!(
                "can only concatenate {} (not \"{}\") to {}",
                left.type_name(),
                right.type_name(),
                left.type_name()
            ),
            (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_)) => format!(
                "can't multiply sequence by non-int of type '{}'",
                right.type_name()
            ),
            _ => format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.as_str(),
                left.type_name(),
                right.type_name()
            ),
        };
        self.exception("TypeError", message)
    }

    fn overflow<T>(&self) -> EvalResult<T> {
        self.raise("OverflowError", "integer overflow")
    }

    pub(crate) fn int_op(&self, op: BinOp, a: i64, b: i64) -> EvalResult<Value> {
        let checked = |r: Option<i64>| match r {
            Some(n) => Ok(Value::Int(n)),
            None => self.overflow(),
        };
        match op {
            BinOp::Add => checked(a.checked_add(b)),
            BinOp::Sub => checked(a.checked_sub(b)),
            BinOp::Mul => checked(a.checked_mul(b)),
            BinOp::Div => {
                if b == 0 {
                    return self.raise("ZeroDivisionError", "division by zero");
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            BinOp::FloorDiv => {
                if b == 0 {
                    return self.raise("ZeroDivisionError", "integer division or modulo by zero");
                }
                let Some(q) = a.checked_div(b) else {
                    return self.overflow();
                };
                let adjust = a % b != 0 && ((a < 0) != (b < 0));
                Ok(Value::Int(if adjust { q - 1 } else { q }))
            }
            BinOp::Mod => {
                if b == 0 {
                    return self.raise("ZeroDivisionError", "integer modulo by zero");
                }
                let r = a.checked_rem(b).unwrap_or(0);
                let adjust = r != 0 && ((r < 0) != (b < 0));
                Ok(Value::Int(if adjust { r + b } else { r }))
            }
            BinOp::Pow => {
                if b < 0 {
                    if a == 0 {
                        return self.raise(
                            "ZeroDivisionError",
                            "0.0 cannot be raised to a negative power",
                        );
                    }
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                match (a, u32::try_from(b)) {
                    (0 | 1, _) => Ok(Value::Int(a)),
                    (-1, _) => Ok(Value::Int(if b % 2 == 0 { 1 } else { -1 })),
                    (_, Ok(exp)) => checked(a.checked_pow(exp)),
                    (_, Err(_)) => self.overflow(),
                }
            }
            BinOp::BitOr => Ok(Value::Int(a | b)),
            BinOp::BitXor => Ok(Value::Int(a ^ b)),
            BinOp::BitAnd => Ok(Value::Int(a & b)),
            BinOp::LShift => {
                if b < 0 {
                    return self.raise("ValueError", "negative shift count");
                }
                if a == 0 {
                    return Ok(Value::Int(0));
                }
                if b >= 64 {
                    return self.overflow();
                }
                let wide = (a as i128) << b;
                checked(i64::try_from(wide).ok())
            }
            BinOp::RShift => {
                if b < 0 {
                    return self.raise("ValueError", "negative shift count");
                }
                Ok(Value::Int(if b >= 64 {
                    if a < 0 {
                        -1
                    } else {
                        0
                    }
                } else {
                    a >> b
                }))
            }
        }
    }

    fn float_op(
        &self,
        op: BinOp,
        a: f64,
        b: f64,
        left: &Value,
        right: &Value,
    ) -> EvalResult<Value> {
        let result = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => {
                if b == 0.0 {
                    return self.raise("ZeroDivisionError", "float division by zero");
                }
                a / b
            }
            BinOp::FloorDiv => {
                if b == 0.0 {
                    return self.raise("ZeroDivisionError", "float floor division by zero");
                }
                (a / b).floor()
            }
            BinOp::Mod => {
                if b == 0.0 {
                    return self.raise("ZeroDivisionError", "float modulo");
                }
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    r + b
                } else {
                    r
                }
            }
            BinOp::Pow => {
                if a == 0.0 && b < 0.0 {
                    return self.raise(
                        "ZeroDivisionError",
                        "0.0 cannot be raised to a negative power",
                    );
                }
                if a < 0.0 && b.fract() != 0.0 {
                    return self.raise("ValueError", "math domain error");
                }
                let r = a.powf(b);
                if r.is_infinite() && a.is_finite() && b.is_finite() {
                    return self.raise("OverflowError", "(34, 'Numerical result out of range')");
                }
                r
            }
            _ => return Err(self.unsupported(op, left, right)),
        };
        Ok(Value::Float(result))
    }

    pub(crate) fn unary(&mut self, op: UnaryOp, operand: Value) -> EvalResult<Value> {
        if op == UnaryOp::Not {
            return Ok(Value::Bool(!self.truthy(&operand)?));
        }
        let dunder = match op {
            UnaryOp::Neg => "__neg__",
            UnaryOp::Pos => "__pos__",
            _ => "__invert__",
        };
        if self.has_dunder(&operand, dunder) {
            return self.call_dunder(&operand, dunder, Vec::new());
        }
        match (op, &operand) {
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
            (UnaryOp::Neg, n) if n.as_int().is_some() => match n.as_int().and_then(i64::checked_neg) {
                Some(n) => Ok(Value::Int(n)),
                None => self.overflow(),
            },
            (UnaryOp::Pos, n) if n.as_int().is_some() => Ok(Value::Int(n.as_int().unwrap_or(0))),
            (UnaryOp::Invert, n) if n.as_int().is_some() => Ok(Value::Int(!n.as_int().unwrap_or(0))),
            _ => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Pos => "+",
                    _ => "~",
                };
                self.raise(
                    "TypeError",
                    format!(
                        "bad operand type for unary {symbol}: '{}'",
                        operand.type_name()
                    ),
                )
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Comparison
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
        match op {
            CmpOp::Eq => self.values_equal(left, right),
            CmpOp::NotEq => {
                if self.has_dunder(left, "__ne__") {
                    let result = self.call_dunder(left, "__ne__", vec![right.clone()])?;
                    return self.truthy(&result);
                }
                Ok(!self.values_equal(left, right)?)
            }
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => self.order(op, left, right),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => Ok(!self.contains(right, left)?),
            CmpOp::Is => Ok(left.is(right)),
            CmpOp::IsNot => Ok(!left.is(right)),
        }
    }

    /// `==`, running `__eq__` on instances, including inside containers.
    pub(crate) fn values_equal(&mut self, left: &Value, right: &Value) -> EvalResult<bool> {
        self.equal_at(left, right, 0)
    }

    fn comparison_depth(&self, depth: usize) -> EvalResult<()> {
        self.tick()?;
        if depth > MAX_COMPARE_DEPTH {
            return self.raise("RecursionError", "maximum recursion depth exceeded in comparison");
        }
        Ok(())
    }

    fn equal_at(&mut self, left: &Value, right: &Value, depth: usize) -> EvalResult<bool> {
        self.comparison_depth(depth)?;
        for (object, other) in [(left, right), (right, left)] {
            if self.has_dunder(object, "__eq__") {
                let result = self.call_dunder(object, "__eq__", vec![other.clone()])?;
                return self.truthy(&result);
            }
        }
        match (left, right) {
            (Value::List(a), Value::List(b)) => {
                if std::rc::Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                self.sequences_equal(&a, &b, depth + 1)
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                let (a, b) = (a.clone(), b.clone());
                self.sequences_equal(&a, &b, depth + 1)
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if a.borrow().len() != b.borrow().len() {
                    return Ok(false);
                }
                let entries: Vec<(Value, Value)> = a
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in entries {
                    let other = b.borrow().get(&key).ok().flatten();
                    match other {
                        Some(other) if self.equal_at(&value, &other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                Ok(true)
            }
            _ => Ok(py_eq(left, right)),
        }
    }

    fn sequences_equal(&mut self, a: &[Value], b: &[Value], depth: usize) -> EvalResult<bool> {
        if a.len() != b.len() {
            return Ok(false);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.equal_at(x, y, depth)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `<`, `<=`, `>`, `>=`.
    pub(crate) fn order(&mut self, op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
        self.order_at(op, left, right, 0)
    }

    fn order_at(&mut self, op: CmpOp, left: &Value, right: &Value, depth: usize) -> EvalResult<bool> {
        self.comparison_depth(depth)?;
        let (forward, reflected) = match op {
            CmpOp::Lt => ("__lt__", "__gt__"),
            CmpOp::LtE => ("__le__", "__ge__"),
            CmpOp::Gt => ("__gt__", "__lt__"),
            _ => ("__ge__", "__le__"),
        };
        if self.has_dunder(left, forward) {
            let result = self.call_dunder(left, forward, vec![right.clone()])?;
            return self.truthy(&result);
        }
        if self.has_dunder(right, reflected) {
            let result = self.call_dunder(right, reflected, vec![left.clone()])?;
            return self.truthy(&result);
        }

        let ordering = match (left, right) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                return self.order_sequences(op, &a, &b, depth + 1);
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                let (a, b) = (a.clone(), b.clone());
                return self.order_sequences(op, &a, &b, depth + 1);
            }
            (Value::Set(a), Value::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                let subset = |x: &Dict, y: &Dict| x.keys().all(|k| y.contains(k).unwrap_or(false));
                return Ok(match op {
                    CmpOp::Lt => a.len() < b.len() && subset(&a, &b),
                    CmpOp::LtE => subset(&a, &b),
                    CmpOp::Gt => a.len() > b.len() && subset(&b, &a),
                    _ => subset(&b, &a),
                });
            }
            _ => match (left.as_int(), right.as_int()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => match (left.as_float(), right.as_float()) {
                    (Some(a), Some(b)) => match a.partial_cmp(&b) {
                        Some(ordering) => Some(ordering),
                        None => return Ok(false),
                    },
                    _ => None,
                },
            },
        };
        let Some(ordering) = ordering else {
            return self.raise(
                "TypeError",
                format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.as_str(),
                    left.type_name(),
                    right.type_name()
                ),
            );
        };
        Ok(match op {
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::LtE => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }

    fn order_sequences(
        &mut self,
        op: CmpOp,
        a: &[Value],
        b: &[Value],
        depth: usize,
    ) -> EvalResult<bool> {
        for (x, y) in a.iter().zip(b) {
            if !self.equal_at(x, y, depth)? {
                return self.order_at(op, x, y, depth);
            }
        }
        let ordering = a.len().cmp(&b.len());
        Ok(match op {
            CmpOp::Lt => ordering.is_lt(),
            CmpOp::LtE => ordering.is_le(),
            CmpOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        })
    }

    pub(crate) fn less_than(&mut self, left: &Value, right: &Value) -> EvalResult<bool> {
        self.order(CmpOp::Lt, left, right)
    }

    /// `item in container`
    pub(crate) fn contains(&mut self, container: &Value, item: &Value) -> EvalResult<bool> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => Ok(haystack.contains(&**needle)),
                other => self.raise(
                    "TypeError",
                    format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    ),
                ),
            },
            Value::List(items) => {
                let items = items.borrow().clone();
                self.any_equal(&items, item)
            }
            Value::Tuple(items) => {
                let items = items.clone();
                self.any_equal(&items, item)
            }
            Value::Dict(dict) | Value::Set(dict) => {
                let found = dict.borrow().contains(item);
                found.map_err(|t| self.unhashable(&t))
            }
            Value::Range(range) => Ok(match item {
                Value::Float(f) if f.fract() == 0.0 => range.contains(*f as i64),
                other => other.as_int().is_some_and(|n| range.contains(n)),
            }),
            Value::Instance(_) if self.has_dunder(container, "__contains__") => {
                let result = self.call_dunder(container, "__contains__", vec![item.clone()])?;
                self.truthy(&result)
            }
            Value::Instance(_) if self.has_dunder(container, "__iter__") => {
                let items = self.collect_values(container)?;
                self.any_equal(&items, item)
            }
            other => self.raise(
                "TypeError",
                format!("argument of type '{}' is not iterable", other.type_name()),
            ),
        }
    }

    fn any_equal(&mut self, items: &[Value], item: &Value) -> EvalResult<bool> {
        for candidate in items {
            if candidate.is(item) || self.values_equal(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Iteration
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn is_iterable(&self, value: &Value) -> bool {
        match value {
            Value::List(_)
            | Value::Tuple(_)
            | Value::Str(_)
            | Value::Dict(_)
            | Value::Set(_)
            | Value::Range(_) => true,
            Value::Instance(_) => self.has_dunder(value, "__iter__"),
            _ => false,
        }
    }

    pub(crate) fn iterate(&mut self, value: &Value) -> EvalResult<ValueIter> {
        Ok(match value {
            Value::List(list) => ValueIter::List {
                list: list.clone(),
                index: 0,
            },
            Value::Tuple(items) => ValueIter::Items(items.to_vec().into_iter()),
            Value::Str(s) => ValueIter::Items(
                s.chars()
                    .map(|c| Value::str(c.to_string()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Dict(dict) | Value::Set(dict) => {
                let keys: Vec<Value> = dict.borrow().keys().cloned().collect();
                ValueIter::Keys {
                    dict: dict.clone(),
                    len: keys.len(),
                    keys: keys.into_iter(),
                    is_set: matches!(value, Value::Set(_)),
                }
            }
            Value::Range(range) => ValueIter::Range {
                range: *range,
                index: 0,
            },
            Value::Instance(_) if self.has_dunder(value, "__iter__") => {
                let iterator = self.call_dunder(value, "__iter__", Vec::new())?;
                if self.has_dunder(&iterator, "__next__") {
                    ValueIter::Protocol(iterator)
                } else if matches!(iterator, Value::Instance(_)) {
                    return self.raise(
                        "TypeError",
                        format!(
                            "iter() returned non-iterator of type '{}'",
                            iterator.type_name()
                        ),
                    );
                } else {
                    return self.iterate(&iterator);
                }
            }
            other => {
                return self.raise(
                    "TypeError",
                    format!("'{}' object is not iterable", other.type_name()),
                )
            }
        })
    }

    pub(crate) fn next_item(&mut self, iter: &mut ValueIter) -> EvalResult<Option<Value>> {
        self.tick()?;
        match iter {
            ValueIter::List { list, index } => {
                let item = list.borrow().get(*index).cloned();
                *index += 1;
                Ok(item)
            }
            ValueIter::Items(items) => Ok(items.next()),
            ValueIter::Keys {
                dict,
                keys,
                len,
                is_set,
            } => {
                if dict.borrow().len() != *len {
                    let message = if *is_set {
                        "Set changed size during iteration"
                    } else {
                        "dictionary changed size during iteration"
                    };
                    return self.raise("RuntimeError", message);
                }
                Ok(keys.next())
            }
            ValueIter::Range { range, index } => {
                let item = range.get(*index).map(Value::Int);
                *index += 1;
                Ok(item)
            }
            ValueIter::Protocol(iterator) => {
                let iterator = iterator.clone();
                match self.call_dunder(&iterator, "__next__", Vec::new()) {
                    Ok(value) => Ok(Some(value)),
                    Err(EvalError::Exception(exc)) if exc.type_name == "StopIteration" => Ok(None),
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Materialize any iterable into a vector.
    pub(crate) fn collect_values(&mut self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            Value::Range(range) => {
                self.check_len(range.len())?;
                Ok((0..range.len())
                    .filter_map(|i| range.get(i).map(Value::Int))
                    .collect())
            }
            _ => {
                let mut iter = self.iterate(value)?;
                let mut out = Vec::new();
                while let Some(item) = self.next_item(&mut iter)? {
                    out.push(item);
                    self.check_len(out.len())?;
                }
                Ok(out)
            }
        }
    }

    /// Refuse to build a collection larger than the configured cap.
    pub(crate) fn check_len(&self, len: usize) -> EvalResult<()> {
        if len > self.limits.max_collection_len {
            self.raise("MemoryError", "")
        } else {
            Ok(())
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Sorting
    // ══════════════════════════════════════════════════════════════════════

    /// Stable sort by `<`, optionally through a key function.
    ///
    /// A merge sort is used because comparisons run user code and may fail
    /// or be inconsistent.
    pub(crate) fn sort_values(
        &mut self,
        mut items: Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> EvalResult<Vec<Value>> {
        if reverse {
            items.reverse();
        }
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let sort_key = match key {
                Some(key) => self.call_value(key, vec![item.clone()], Vec::new())?,
                None => item.clone(),
            };
            keyed.push((sort_key, item));
        }
        let sorted = self.merge_sort(keyed)?;
        let mut out: Vec<Value> = sorted.into_iter().map(|(_, item)| item).collect();
        if reverse {
            out.reverse();
        }
        Ok(out)
    }

    fn merge_sort(&mut self, mut items: Vec<(Value, Value)>) -> EvalResult<Vec<(Value, Value)>> {
        if items.len() <= 1 {
            return Ok(items);
        }
        self.tick()?;
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items)?;
        let right = self.merge_sort(right)?;

        let mut out = Vec::with_capacity(left.len() + right.len());
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            // Take from the right only when strictly smaller, for stability.
            if self.less_than(&right[j].0, &left[i].0)? {
                out.push(right[j].clone());
                j += 1;
            } else {
                out.push(left[i].clone());
                i += 1;
            }
        }
        out.extend_from_slice(&left[i..]);
        out.extend_from_slice(&right[j..]);
        Ok(out)
    }
}
