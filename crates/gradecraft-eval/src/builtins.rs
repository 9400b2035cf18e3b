//! Builtin functions and type constructors.

use std::rc::{Rc, Weak};

use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::modules;
use crate::value::{
    ascii_escape, is_type_name, Class, Descriptor, Dict, RangeValue, SuperProxy, Value, TYPE_NAMES,
};

/// Builtin functions that are not types.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs",
    "all",
    "any",
    "ascii",
    "bin",
    "callable",
    "chr",
    "classmethod",
    "divmod",
    "enumerate",
    "filter",
    "format",
    "getattr",
    "hasattr",
    "hex",
    "input",
    "isinstance",
    "issubclass",
    "len",
    "map",
    "max",
    "min",
    "oct",
    "ord",
    "pow",
    "print",
    "property",
    "repr",
    "reversed",
    "round",
    "setattr",
    "sorted",
    "staticmethod",
    "sum",
    "super",
    "zip",
];

/// Resolve a builtin name to its canonical static name.
pub(crate) fn lookup(name: &str) -> Option<&'static str> {
    BUILTIN_FUNCTIONS
        .iter()
        .chain(TYPE_NAMES.iter().filter(|&&t| t != "NoneType"))
        .find(|&&candidate| candidate == name)
        .copied()
}

/// Keyword arguments not yet consumed by a native callable.
pub(crate) struct Kwargs(Vec<(String, Value)>);

impl Kwargs {
    pub(crate) fn new(kwargs: Vec<(String, Value)>) -> Self {
        Self(kwargs)
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Value> {
        let i = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(i).1)
    }

    pub(crate) fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }

    /// Fail on any keyword the callable did not consume.
    pub(crate) fn finish(self, ev: &Evaluator, callable: &str) -> EvalResult<()> {
        match self.0.first() {
            None => Ok(()),
            Some((key, _)) => ev.raise(
                "TypeError",
                format!("{callable}() got an unexpected keyword argument '{key}'"),
            ),
        }
    }
}

/// Check a native callable's positional argument count.
pub(crate) fn arity(
    ev: &Evaluator,
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> EvalResult<()> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let message = if min == max {
        let plural = if min == 1 { "" } else { "s" };
        match min {
            0 => format!("{name}() takes no arguments ({given} given)"),
            1 => format!("{name}() takes exactly one argument ({given} given)"),
            n => format!("{name}() takes exactly {n} argument{plural} ({given} given)"),
        }
    } else if given < min {
        let plural = if min == 1 { "" } else { "s" };
        format!("{name} expected at least {min} argument{plural}, got {given}")
    } else {
        format!("{name} expected at most {max} arguments, got {given}")
    };
    ev.raise("TypeError", message)
}

/// An integer argument, rejecting floats the way Python's index protocol does.
pub(crate) fn int_arg(ev: &Evaluator, value: &Value) -> EvalResult<i64> {
    match value.as_int() {
        Some(n) => Ok(n),
        None => ev.raise(
            "TypeError",
            format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ),
        ),
    }
}

pub(crate) fn call(
    ev: &mut Evaluator,
    name: &'static str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    if let Some(function) = name.strip_prefix("math.") {
        let mut kwargs = Kwargs::new(kwargs);
        let result = modules::call_math(ev, function, args, &mut kwargs)?;
        kwargs.finish(ev, function)?;
        return Ok(result);
    }
    let mut kwargs = Kwargs::new(kwargs);
    let result = dispatch(ev, name, args, &mut kwargs)?;
    kwargs.finish(ev, name.rsplit('.').next().unwrap_or(name))?;
    Ok(result)
}

fn dispatch(
    ev: &mut Evaluator,
    name: &'static str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    match name {
        "print" => {
            let sep = string_kwarg(ev, kwargs.take("sep"), "sep", " ")?;
            let end = string_kwarg(ev, kwargs.take("end"), "end", "\n")?;
            kwargs.take("file");
            kwargs.take("flush");
            let mut line = String::new();
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    line.push_str(&sep);
                }
                line.push_str(&ev.str_of(arg)?);
            }
            line.push_str(&end);
            ev.write_output(&line);
            Ok(Value::None)
        }
        "input" => {
            arity(ev, name, &args, 0, 1)?;
            if let Some(prompt) = args.first() {
                let prompt = ev.str_of(prompt)?;
                ev.write_output(&prompt);
            }
            ev.raise("EOFError", "EOF when reading a line")
        }
        "len" => {
            arity(ev, name, &args, 1, 1)?;
            Ok(Value::Int(len_of(ev, &args[0])? as i64))
        }
        "repr" => {
            arity(ev, name, &args, 1, 1)?;
            Ok(Value::str(ev.repr_of(&args[0])?))
        }
        "ascii" => {
            arity(ev, name, &args, 1, 1)?;
            Ok(Value::str(ascii_escape(&ev.repr_of(&args[0])?)))
        }
        "format" => {
            arity(ev, name, &args, 1, 2)?;
            let spec = match args.get(1) {
                Some(Value::Str(s)) => s.to_string(),
                Some(other) => {
                    return ev.raise(
                        "TypeError",
                        format!(
                            "format() argument 2 must be str, not {}",
                            other.type_name()
                        ),
                    )
                }
                None => String::new(),
            };
            Ok(Value::str(ev.format_value(&args[0], &spec)?))
        }
        "abs" => {
            arity(ev, name, &args, 1, 1)?;
            let value = &args[0];
            if ev.has_dunder(value, "__abs__") {
                return ev.call_dunder(value, "__abs__", Vec::new());
            }
            match value {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v if v.as_int().is_some() => match v.as_int().and_then(i64::checked_abs) {
                    Some(n) => Ok(Value::Int(n)),
                    None => ev.raise("OverflowError", "integer overflow"),
                },
                other => ev.raise(
                    "TypeError",
                    format!("bad operand type for abs(): '{}'", other.type_name()),
                ),
            }
        }
        "divmod" => {
            arity(ev, name, &args, 2, 2)?;
            let mut args = args.into_iter();
            let (a, b) = (args.next().unwrap_or(Value::None), args.next().unwrap_or(Value::None));
            let quotient = ev.binary(gradecraft_types::ast::BinOp::FloorDiv, a.clone(), b.clone())?;
            let remainder = ev.binary(gradecraft_types::ast::BinOp::Mod, a, b)?;
            Ok(Value::tuple(vec![quotient, remainder]))
        }
        "pow" => {
            arity(ev, name, &args, 2, 3)?;
            let modulus = args.get(2).cloned().or_else(|| kwargs.take("mod"));
            match modulus {
                Some(Value::None) | None => {
                    ev.binary(gradecraft_types::ast::BinOp::Pow, args[0].clone(), args[1].clone())
                }
                Some(modulus) => modular_pow(ev, &args[0], &args[1], &modulus),
            }
        }
        "round" => {
            arity(ev, name, &args, 1, 2)?;
            let ndigits = args.get(1).cloned().or_else(|| kwargs.take("ndigits"));
            round(ev, &args[0], ndigits)
        }
        "bin" | "oct" | "hex" => {
            arity(ev, name, &args, 1, 1)?;
            let n = int_arg(ev, &args[0])?;
            let magnitude = n.unsigned_abs();
            let digits = match name {
                "bin" => format!("0b{magnitude:b}"),
                "oct" => format!("0o{magnitude:o}"),
                _ => format!("0x{magnitude:x}"),
            };
            Ok(Value::str(if n < 0 { format!("-{digits}") } else { digits }))
        }
        "chr" => {
            arity(ev, name, &args, 1, 1)?;
            let n = int_arg(ev, &args[0])?;
            match u32::try_from(n).ok().and_then(char::from_u32) {
                Some(c) => Ok(Value::str(c.to_string())),
                None => ev.raise("ValueError", "chr() arg not in range(0x110000)"),
            }
        }
        "ord" => {
            arity(ev, name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Int(c as i64)),
                        _ => ev.raise(
                            "TypeError",
                            format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ),
                        ),
                    }
                }
                other => ev.raise(
                    "TypeError",
                    format!(
                        "ord() expected string of length 1, but {} found",
                        other.type_name()
                    ),
                ),
            }
        }
        "callable" => {
            arity(ev, name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].is_callable()))
        }
        "any" | "all" => {
            arity(ev, name, &args, 1, 1)?;
            let want = name == "any";
            let mut items = ev.iterate(&args[0])?;
            while let Some(item) = ev.next_item(&mut items)? {
                if ev.truthy(&item)? == want {
                    return Ok(Value::Bool(want));
                }
            }
            Ok(Value::Bool(!want))
        }
        "sum" => {
            arity(ev, name, &args, 1, 2)?;
            let start = args
                .get(1)
                .cloned()
                .or_else(|| kwargs.take("start"))
                .unwrap_or(Value::Int(0));
            if matches!(start, Value::Str(_)) {
                return ev.raise(
                    "TypeError",
                    "sum() can't sum strings [use ''.join(seq) instead]",
                );
            }
            let mut total = start;
            let mut items = ev.iterate(&args[0])?;
            while let Some(item) = ev.next_item(&mut items)? {
                total = ev.binary(gradecraft_types::ast::BinOp::Add, total, item)?;
            }
            Ok(total)
        }
        "min" | "max" => min_max(ev, name, args, kwargs),
        "sorted" => {
            arity(ev, name, &args, 1, 1)?;
            let key = kwargs.take("key").filter(|k| !matches!(k, Value::None));
            let reverse = match kwargs.take("reverse") {
                Some(value) => ev.truthy(&value)?,
                None => false,
            };
            let items = ev.collect_values(&args[0])?;
            Ok(Value::list(ev.sort_values(items, key.as_ref(), reverse)?))
        }
        "reversed" => {
            arity(ev, name, &args, 1, 1)?;
            let value = &args[0];
            if ev.has_dunder(value, "__reversed__") {
                return ev.call_dunder(value, "__reversed__", Vec::new());
            }
            match value {
                Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Range(_) | Value::Dict(_) => {
                    let mut items = ev.collect_values(value)?;
                    items.reverse();
                    Ok(Value::list(items))
                }
                other => ev.raise(
                    "TypeError",
                    format!("'{}' object is not reversible", other.type_name()),
                ),
            }
        }
        "enumerate" => {
            arity(ev, name, &args, 1, 2)?;
            let start = match args.get(1).cloned().or_else(|| kwargs.take("start")) {
                Some(value) => int_arg(ev, &value)?,
                None => 0,
            };
            let items = ev.collect_values(&args[0])?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let Some(index) = start.checked_add(i as i64) else {
                    return ev.raise("OverflowError", "integer overflow");
                };
                out.push(Value::tuple(vec![Value::Int(index), item]));
            }
            Ok(Value::list(out))
        }
        "zip" => {
            kwargs.take("strict");
            let mut columns = Vec::with_capacity(args.len());
            for arg in &args {
                columns.push(ev.collect_values(arg)?);
            }
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let out = (0..rows)
                .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                .collect();
            Ok(Value::list(out))
        }
        "map" => {
            if args.len() < 2 {
                return ev.raise("TypeError", "map() must have at least two arguments.");
            }
            let mut args = args.into_iter();
            let function = args.next().unwrap_or(Value::None);
            let mut columns = Vec::new();
            for arg in args {
                columns.push(ev.collect_values(&arg)?);
            }
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(rows);
            for i in 0..rows {
                let row = columns.iter().map(|c| c[i].clone()).collect();
                out.push(ev.call_value(&function, row, Vec::new())?);
            }
            Ok(Value::list(out))
        }
        "filter" => {
            arity(ev, name, &args, 2, 2)?;
            let items = ev.collect_values(&args[1])?;
            let mut out = Vec::new();
            for item in items {
                let keep = match &args[0] {
                    Value::None => ev.truthy(&item)?,
                    function => {
                        let result = ev.call_value(function, vec![item.clone()], Vec::new())?;
                        ev.truthy(&result)?
                    }
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }
        "isinstance" => {
            arity(ev, name, &args, 2, 2)?;
            Ok(Value::Bool(is_instance(ev, &args[0], &args[1])?))
        }
        "issubclass" => {
            arity(ev, name, &args, 2, 2)?;
            let Value::Class(class) = &args[0] else {
                return match &args[0] {
                    Value::Builtin(a) if is_type_name(a) => {
                        Ok(Value::Bool(matches!(&args[1], Value::Builtin(b) if a == b || (*a == "bool" && *b == "int"))))
                    }
                    _ => ev.raise("TypeError", "issubclass() arg 1 must be a class"),
                };
            };
            Ok(Value::Bool(class_matches(ev, class, &args[1])?))
        }
        "getattr" => {
            arity(ev, name, &args, 2, 3)?;
            let attr = attr_name(ev, &args[1], "getattr")?;
            match ev.get_attr(&args[0], &attr) {
                Err(err)
                    if args.len() == 3
                        && err.exception().is_some_and(|e| e.type_name == "AttributeError") =>
                {
                    Ok(args[2].clone())
                }
                other => other,
            }
        }
        "hasattr" => {
            arity(ev, name, &args, 2, 2)?;
            let attr = attr_name(ev, &args[1], "hasattr")?;
            match ev.get_attr(&args[0], &attr) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.exception().is_some_and(|e| e.type_name == "AttributeError") => {
                    Ok(Value::Bool(false))
                }
                Err(err) => Err(err),
            }
        }
        "setattr" => {
            arity(ev, name, &args, 3, 3)?;
            let attr = attr_name(ev, &args[1], "setattr")?;
            ev.set_attr(&args[0], &attr, args[2].clone())?;
            Ok(Value::None)
        }
        "staticmethod" | "classmethod" | "property" => {
            arity(ev, name, &args, 1, 1)?;
            let function = args[0].clone();
            let descriptor = match name {
                "staticmethod" => Descriptor::Static(function),
                "classmethod" => Descriptor::ClassMethod(function),
                _ => Descriptor::Property(function),
            };
            Ok(Value::Descriptor(Rc::new(descriptor)))
        }
        "super" => make_super(ev, args),
        "BaseException.__init__" => {
            let mut args = args.into_iter();
            if let Some(Value::Instance(instance)) = args.next() {
                instance
                    .attrs
                    .borrow_mut()
                    .insert("args".into(), Value::tuple(args.collect()));
            }
            Ok(Value::None)
        }
        "BaseException.__str__" => {
            let Some(Value::Instance(instance)) = args.first() else {
                return ev.raise("TypeError", "descriptor '__str__' requires an exception");
            };
            let exc_args = instance.attrs.borrow().get("args").cloned();
            let is_key_error = ev
                .classes
                .get("KeyError")
                .is_some_and(|key_error| instance.class.is_subclass_of(&key_error));
            Ok(Value::str(match exc_args {
                Some(Value::Tuple(items)) => match items.as_slice() {
                    [] => String::new(),
                    [one] if is_key_error => ev.repr_of(one)?,
                    [one] => ev.str_of(one)?,
                    _ => ev.repr_of(&Value::Tuple(items.clone()))?,
                },
                Some(other) => ev.str_of(&other)?,
                None => String::new(),
            }))
        }
        _ => construct(ev, name, args, kwargs),
    }
}

/// Calls to the builtin types: `int(x)`, `list(xs)`, `range(n)`, ...
fn construct(
    ev: &mut Evaluator,
    name: &'static str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    match name {
        "int" => {
            arity(ev, name, &args, 0, 2)?;
            let base = args.get(1).cloned().or_else(|| kwargs.take("base"));
            to_int(ev, args.first(), base)
        }
        "float" => {
            arity(ev, name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(value) => to_float(ev, value),
            }
        }
        "str" => {
            arity(ev, name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::str("")),
                Some(value) => Ok(Value::str(ev.str_of(value)?)),
            }
        }
        "bool" => {
            arity(ev, name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Bool(false)),
                Some(value) => Ok(Value::Bool(ev.truthy(value)?)),
            }
        }
        "list" | "tuple" => {
            arity(ev, name, &args, 0, 1)?;
            let items = match args.first() {
                None => Vec::new(),
                Some(value) => ev.collect_values(value)?,
            };
            Ok(if name == "list" {
                Value::list(items)
            } else {
                Value::tuple(items)
            })
        }
        "set" => {
            arity(ev, name, &args, 0, 1)?;
            let items = match args.first() {
                None => Vec::new(),
                Some(value) => ev.collect_values(value)?,
            };
            let set = Dict::set_from(items).map_err(|t| ev.unhashable(&t))?;
            Ok(Value::set(set))
        }
        "dict" => {
            arity(ev, name, &args, 0, 1)?;
            let mut dict = Dict::new();
            if let Some(source) = args.first() {
                update_dict(ev, &mut dict, source)?;
            }
            for (key, value) in std::mem::replace(kwargs, Kwargs::new(Vec::new())).0 {
                dict.insert(Value::str(key), value)
                    .map_err(|t| ev.unhashable(&t))?;
            }
            Ok(Value::dict(dict))
        }
        "range" => {
            arity(ev, name, &args, 1, 3)?;
            let mut bounds = Vec::with_capacity(args.len());
            for arg in &args {
                bounds.push(int_arg(ev, arg)?);
            }
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return ev.raise("ValueError", "range() arg 3 must not be zero");
            }
            Ok(Value::Range(RangeValue { start, stop, step }))
        }
        "type" => {
            arity(ev, name, &args, 1, 1)?;
            Ok(ev.type_of(&args[0]))
        }
        "NoneType" => {
            arity(ev, name, &args, 0, 0)?;
            Ok(Value::None)
        }
        _ => ev.raise("NameError", format!("name '{name}' is not defined")),
    }
}

fn string_kwarg(
    ev: &Evaluator,
    value: Option<Value>,
    name: &str,
    default: &str,
) -> EvalResult<String> {
    match value {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => ev.raise(
            "TypeError",
            format!("{name} must be None or a string, not {}", other.type_name()),
        ),
    }
}

fn attr_name(ev: &Evaluator, value: &Value, function: &str) -> EvalResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => ev.raise(
            "TypeError",
            format!(
                "{function}(): attribute name must be string, not '{}'",
                other.type_name()
            ),
        ),
    }
}

pub(crate) fn len_of(ev: &mut Evaluator, value: &Value) -> EvalResult<usize> {
    Ok(match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) | Value::Set(dict) => dict.borrow().len(),
        Value::Range(range) => range.len(),
        Value::Instance(_) if ev.has_dunder(value, "__len__") => {
            let len = ev.call_dunder(value, "__len__", Vec::new())?;
            match len.as_int() {
                Some(n) if n >= 0 => n as usize,
                Some(_) => return ev.raise("ValueError", "__len__() should return >= 0"),
                None => {
                    return ev.raise(
                        "TypeError",
                        format!(
                            "'{}' object cannot be interpreted as an integer",
                            len.type_name()
                        ),
                    )
                }
            }
        }
        other => {
            return ev.raise(
                "TypeError",
                format!("object of type '{}' has no len()", other.type_name()),
            )
        }
    })
}

fn min_max(
    ev: &mut Evaluator,
    name: &'static str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    let key = kwargs.take("key").filter(|k| !matches!(k, Value::None));
    let default = kwargs.take("default");
    let items = match args.len() {
        0 => {
            return ev.raise(
                "TypeError",
                format!("{name} expected at least 1 argument, got 0"),
            )
        }
        1 => ev.collect_values(&args[0])?,
        _ => {
            if default.is_some() {
                return ev.raise(
                    "TypeError",
                    format!(
                        "Cannot specify a default for {name}() with multiple positional arguments"
                    ),
                );
            }
            args
        }
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let item_key = match &key {
            Some(key) => ev.call_value(key, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) if name == "max" => ev.less_than(best_key, &item_key)?,
            Some((best_key, _)) => ev.less_than(&item_key, best_key)?,
        };
        if replace {
            best = Some((item_key, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => ev.raise("ValueError", format!("{name}() iterable argument is empty")),
    }
}

const FLOAT_ROUND_DIGITS_MAX: i64 = 323;
const FLOAT_ROUND_DIGITS_MIN: i64 = -308;

fn round(ev: &mut Evaluator, value: &Value, ndigits: Option<Value>) -> EvalResult<Value> {
    if ev.has_dunder(value, "__round__") {
        let args = ndigits.into_iter().collect();
        return ev.call_dunder(value, "__round__", args);
    }
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(n) => Some(int_arg(ev, &n)?),
    };
    match (value, ndigits) {
        (Value::Float(f), None) => float_to_int(ev, f.round_ties_even()),
        (Value::Float(f), Some(digits)) => {
            if !f.is_finite() {
                return Ok(Value::Float(*f));
            }
            // Past these bounds every finite float is already exact or
            // rounds to a zero of its own sign.
            if digits > FLOAT_ROUND_DIGITS_MAX {
                Ok(Value::Float(*f))
            } else if digits < FLOAT_ROUND_DIGITS_MIN {
                Ok(Value::Float(0.0 * f))
            } else if digits >= 0 {
                let digits = digits as usize;
                let rendered = format!("{f:.digits$}");
                Ok(Value::Float(rendered.parse().unwrap_or(*f)))
            } else {
                let scale = 10f64.powi(digits.unsigned_abs() as i32);
                Ok(Value::Float((f / scale).round_ties_even() * scale))
            }
        }
        (v, digits) if v.as_int().is_some() => {
            let n = v.as_int().unwrap_or(0);
            match digits {
                Some(d) if d < 0 => {
                    let Some(scale) = 10i64.checked_pow(d.unsigned_abs().min(19) as u32) else {
                        return Ok(Value::Int(0));
                    };
                    let (q, r) = (n.div_euclid(scale), n.rem_euclid(scale));
                    let up = 2 * (r as i128) > scale as i128
                        || (2 * (r as i128) == scale as i128 && q % 2 != 0);
                    let q = if up { q + 1 } else { q };
                    match q.checked_mul(scale) {
                        Some(rounded) => Ok(Value::Int(rounded)),
                        None => ev.raise("OverflowError", "integer overflow"),
                    }
                }
                _ => Ok(Value::Int(n)),
            }
        }
        (other, _) => ev.raise(
            "TypeError",
            format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            ),
        ),
    }
}

/// Convert an integral float to `int`, as `int()`, `round()` and `math.floor` do.
pub(crate) fn float_to_int(ev: &Evaluator, f: f64) -> EvalResult<Value> {
    if f.is_nan() {
        return ev.raise("ValueError", "cannot convert float NaN to integer");
    }
    if f.is_infinite() {
        return ev.raise("OverflowError", "cannot convert float infinity to integer");
    }
    if f >= 9.223_372_036_854_775_807e18 || f < -9.223_372_036_854_775_808e18 {
        return ev.raise("OverflowError", "integer overflow");
    }
    Ok(Value::Int(f as i64))
}

fn modular_pow(ev: &Evaluator, base: &Value, exp: &Value, modulus: &Value) -> EvalResult<Value> {
    let (Some(base), Some(exp), Some(modulus)) = (base.as_int(), exp.as_int(), modulus.as_int())
    else {
        return ev.raise(
            "TypeError",
            "pow() 3rd argument not allowed unless all arguments are integers",
        );
    };
    if modulus == 0 {
        return ev.raise("ValueError", "pow() 3rd argument cannot be 0");
    }
    if exp < 0 {
        return ev.raise("ValueError", "base is not invertible for the given modulus");
    }
    let m = modulus as i128;
    let mut result: i128 = 1 % m;
    let mut b = (base as i128).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b).rem_euclid(m);
        }
        b = (b * b).rem_euclid(m);
        e >>= 1;
    }
    // Python's result takes the sign of the modulus.
    if m < 0 && result > 0 {
        result += m;
    }
    Ok(Value::Int(result as i64))
}

fn to_int(ev: &mut Evaluator, value: Option<&Value>, base: Option<Value>) -> EvalResult<Value> {
    let Some(value) = value else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = base {
        let base = int_arg(ev, &base)?;
        let Value::Str(text) = value else {
            return ev.raise("TypeError", "int() can't convert non-string with explicit base");
        };
        if base != 0 && !(2..=36).contains(&base) {
            return ev.raise("ValueError", "int() base must be >= 2 and <= 36, or 0");
        }
        return parse_int_literal(ev, text, base as u32);
    }
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => float_to_int(ev, f.trunc()),
        Value::Str(text) => parse_int_literal(ev, text, 10),
        Value::Instance(_) if ev.has_dunder(value, "__int__") => {
            ev.call_dunder(value, "__int__", Vec::new())
        }
        other => ev.raise(
            "TypeError",
            format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

enum IntParse {
    Invalid,
    Overflow,
}

fn parse_int_literal(ev: &Evaluator, text: &str, base: u32) -> EvalResult<Value> {
    match parse_int(text, base) {
        Ok(n) => Ok(Value::Int(n)),
        Err(IntParse::Overflow) => ev.raise("OverflowError", "integer overflow"),
        Err(IntParse::Invalid) => ev.raise(
            "ValueError",
            format!(
                "invalid literal for int() with base {base}: {}",
                crate::value::str_repr(text)
            ),
        ),
    }
}

/// Parse an `int()` string: optional sign, optional base prefix, and
/// single underscores between digits.
fn parse_int(text: &str, base: u32) -> Result<i64, IntParse> {
    let s = text.trim();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let lower = s.to_ascii_lowercase();
    let prefixed = |p: &str| lower.starts_with(p);
    let (base, digits) = match base {
        0 if prefixed("0x") => (16, &s[2..]),
        0 if prefixed("0o") => (8, &s[2..]),
        0 if prefixed("0b") => (2, &s[2..]),
        0 => (10, s),
        16 if prefixed("0x") => (16, &s[2..]),
        8 if prefixed("0o") => (8, &s[2..]),
        2 if prefixed("0b") => (2, &s[2..]),
        b => (b, s),
    };
    let digits = digits.strip_prefix('_').filter(|_| digits.len() != s.len()).unwrap_or(digits);
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(IntParse::Invalid);
    }
    let mut value: i128 = 0;
    for c in digits.chars().filter(|&c| c != '_') {
        let digit = c.to_digit(base).ok_or(IntParse::Invalid)?;
        value = value
            .checked_mul(base as i128)
            .and_then(|v| v.checked_add(digit as i128))
            .ok_or(IntParse::Overflow)?;
    }
    let value = if negative { -value } else { value };
    i64::try_from(value).map_err(|_| IntParse::Overflow)
}

fn to_float(ev: &mut Evaluator, value: &Value) -> EvalResult<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        v if v.as_float().is_some() => Ok(Value::Float(v.as_float().unwrap_or(0.0))),
        Value::Str(text) => {
            let trimmed = text.trim();
            let cleaned: String = if valid_underscores(trimmed) {
                trimmed.chars().filter(|&c| c != '_').collect()
            } else {
                String::from("invalid")
            };
            match cleaned.parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => ev.raise(
                    "ValueError",
                    format!(
                        "could not convert string to float: {}",
                        crate::value::str_repr(text)
                    ),
                ),
            }
        }
        Value::Instance(_) if ev.has_dunder(value, "__float__") => {
            ev.call_dunder(value, "__float__", Vec::new())
        }
        other => ev.raise(
            "TypeError",
            format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

/// Underscores in numeric strings must sit between two digits.
fn valid_underscores(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    chars.iter().enumerate().all(|(i, &c)| {
        c != '_'
            || (i > 0
                && chars[i - 1].is_ascii_digit()
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
    })
}

/// Fill `dict` from a mapping or an iterable of pairs.
pub(crate) fn update_dict(ev: &mut Evaluator, dict: &mut Dict, source: &Value) -> EvalResult<()> {
    if let Value::Dict(other) = source {
        let entries: Vec<(Value, Value)> = other
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in entries {
            dict.insert(key, value).map_err(|t| ev.unhashable(&t))?;
        }
        return Ok(());
    }
    let items = ev.collect_values(source)?;
    for (i, item) in items.into_iter().enumerate() {
        if !ev.is_iterable(&item) {
            return ev.raise(
                "TypeError",
                format!("cannot convert dictionary update sequence element #{i} to a sequence"),
            );
        }
        let pair = ev.collect_values(&item)?;
        let [key, value]: [Value; 2] = match pair.try_into() {
            Ok(pair) => pair,
            Err(pair) => {
                let pair: Vec<Value> = pair;
                return ev.raise(
                    "ValueError",
                    format!(
                        "dictionary update sequence element #{i} has length {}; 2 is required",
                        pair.len()
                    ),
                );
            }
        };
        dict.insert(key, value).map_err(|t| ev.unhashable(&t))?;
    }
    Ok(())
}

fn is_instance(ev: &Evaluator, value: &Value, classinfo: &Value) -> EvalResult<bool> {
    match classinfo {
        Value::Tuple(options) => {
            for option in options.iter() {
                if is_instance(ev, value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Class(class) => Ok(match value {
            Value::Instance(instance) => instance.class.is_subclass_of(class),
            _ => class.builtin && class.name == "object",
        }),
        Value::Builtin(type_name) if is_type_name(type_name) => Ok(match *type_name {
            "int" => matches!(value, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(value, Value::Float(_)),
            "str" => matches!(value, Value::Str(_)),
            "bool" => matches!(value, Value::Bool(_)),
            "list" => matches!(value, Value::List(_)),
            "tuple" => matches!(value, Value::Tuple(_)),
            "dict" => matches!(value, Value::Dict(_)),
            "set" => matches!(value, Value::Set(_)),
            "range" => matches!(value, Value::Range(_)),
            "NoneType" => matches!(value, Value::None),
            "type" => {
                matches!(value, Value::Class(_))
                    || matches!(value, Value::Builtin(n) if is_type_name(n))
            }
            _ => false,
        }),
        _ => ev.raise(
            "TypeError",
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        ),
    }
}

fn class_matches(ev: &Evaluator, class: &Class, classinfo: &Value) -> EvalResult<bool> {
    match classinfo {
        Value::Class(other) => Ok(class.is_subclass_of(other)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if class_matches(ev, class, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(name) if is_type_name(name) => Ok(false),
        _ => ev.raise(
            "TypeError",
            "issubclass() arg 2 must be a class, a tuple of classes, or a union",
        ),
    }
}

/// `super()` or `super(Class, obj)`.
fn make_super(ev: &mut Evaluator, args: Vec<Value>) -> EvalResult<Value> {
    if let [Value::Class(class), receiver] = args.as_slice() {
        return Ok(Value::Super(Rc::new(SuperProxy {
            class: class.clone(),
            receiver: receiver.clone(),
        })));
    }
    if !args.is_empty() {
        return ev.raise("TypeError", "super() argument 1 must be a type");
    }
    let Some((function, scope)) = ev.env.current_function() else {
        return ev.raise("RuntimeError", "super(): no arguments");
    };
    let owner = function.owner.borrow().as_ref().and_then(Weak::upgrade);
    let Some(class) = owner else {
        return ev.raise("RuntimeError", "super(): __class__ cell not found");
    };
    let receiver = function
        .params
        .positional
        .first()
        .and_then(|param| scope.get(&param.name.name));
    match receiver {
        Some(receiver) => Ok(Value::Super(Rc::new(SuperProxy { class, receiver }))),
        None => ev.raise("RuntimeError", "super(): no arguments"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(text: &str, base: u32) -> Option<i64> {
        parse_int(text, base).ok()
    }

    #[test]
    fn parses_int_literals_like_python() {
        assert_eq!(int(" 42 ", 10), Some(42));
        assert_eq!(int("-1_000", 10), Some(-1000));
        assert_eq!(int("ff", 16), Some(255));
        assert_eq!(int("0xff", 16), Some(255));
        assert_eq!(int("0b101", 0), Some(5));
        assert_eq!(int("1__0", 10), None);
        assert_eq!(int("_1", 10), None);
        assert_eq!(int("", 10), None);
        assert_eq!(int("4.5", 10), None);
        assert!(matches!(
            parse_int("99999999999999999999", 10),
            Err(IntParse::Overflow)
        ));
    }

    #[test]
    fn underscores_must_separate_digits() {
        assert!(valid_underscores("1_000.5"));
        assert!(!valid_underscores("1__0"));
        assert!(!valid_underscores("_1"));
        assert!(!valid_underscores("1_"));
    }

    #[test]
    fn builtin_lookup_resolves_types_and_functions() {
        assert_eq!(lookup("len"), Some("len"));
        assert_eq!(lookup("int"), Some("int"));
        assert_eq!(lookup("NoneType"), None);
        assert_eq!(lookup("open"), None);
        assert_eq!(lookup("eval"), None);
    }
}
