//! Methods of the builtin types: `str`, `list`, `tuple`, `dict`, `set`,
//! `int` and `float`.
//!
//! Methods reached through the type (`str.upper`) take the receiver as their
//! first argument.

use crate::builtins::{arity, int_arg, update_dict, Kwargs};
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::value::{is_type_name, Dict, Value};

const STR_METHODS: &[&str] = &[
    "capitalize",
    "casefold",
    "center",
    "count",
    "endswith",
    "find",
    "format",
    "index",
    "isalnum",
    "isalpha",
    "isdecimal",
    "isdigit",
    "islower",
    "isnumeric",
    "isspace",
    "isupper",
    "join",
    "ljust",
    "lower",
    "lstrip",
    "partition",
    "removeprefix",
    "removesuffix",
    "replace",
    "rfind",
    "rindex",
    "rjust",
    "rpartition",
    "rsplit",
    "rstrip",
    "split",
    "splitlines",
    "startswith",
    "strip",
    "swapcase",
    "title",
    "upper",
    "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

const DICT_METHODS: &[&str] = &[
    "clear",
    "copy",
    "fromkeys",
    "get",
    "items",
    "keys",
    "pop",
    "popitem",
    "setdefault",
    "update",
    "values",
];

const SET_METHODS: &[&str] = &[
    "add",
    "clear",
    "copy",
    "difference",
    "difference_update",
    "discard",
    "intersection",
    "intersection_update",
    "isdisjoint",
    "issubset",
    "issuperset",
    "pop",
    "remove",
    "symmetric_difference",
    "union",
    "update",
];

fn methods_of(type_name: &str) -> &'static [&'static str] {
    match type_name {
        "str" => STR_METHODS,
        "list" => LIST_METHODS,
        "tuple" => TUPLE_METHODS,
        "dict" => DICT_METHODS,
        "set" => SET_METHODS,
        "int" | "bool" => &["bit_length"],
        "float" => &["is_integer"],
        _ => &[],
    }
}

pub(crate) fn has_method(receiver: &Value, name: &str) -> bool {
    let type_name = match receiver {
        Value::Builtin(type_name) if is_type_name(type_name) => type_name.to_string(),
        Value::Builtin(_) => return false,
        other => other.type_name(),
    };
    methods_of(&type_name).contains(&name)
}

pub(crate) fn call(
    ev: &mut Evaluator,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    if let Value::Builtin(type_name) = receiver {
        return call_unbound(ev, type_name, name, args, kwargs);
    }
    let mut kwargs = Kwargs::new(kwargs);
    let result = match receiver {
        Value::Str(s) => str_method(ev, s, name, args, &mut kwargs)?,
        Value::List(_) => list_method(ev, receiver, name, args, &mut kwargs)?,
        Value::Tuple(items) => {
            let items = items.to_vec();
            sequence_method(ev, &items, "tuple", name, args)?
        }
        Value::Dict(_) => dict_method(ev, receiver, name, args)?,
        Value::Set(_) => set_method(ev, receiver, name, args)?,
        Value::Int(n) if name == "bit_length" => {
            arity(ev, name, &args, 0, 0)?;
            Value::Int(64 - n.unsigned_abs().leading_zeros() as i64)
        }
        Value::Bool(b) if name == "bit_length" => {
            arity(ev, name, &args, 0, 0)?;
            Value::Int(*b as i64)
        }
        Value::Float(f) if name == "is_integer" => {
            arity(ev, name, &args, 0, 0)?;
            Value::Bool(f.is_finite() && f.fract() == 0.0)
        }
        other => {
            return ev.raise(
                "AttributeError",
                format!("'{}' object has no attribute '{name}'", other.type_name()),
            )
        }
    };
    kwargs.finish(ev, name)?;
    Ok(result)
}

/// `str.upper(s)`, `dict.fromkeys(keys)` and friends.
fn call_unbound(
    ev: &mut Evaluator,
    type_name: &str,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> EvalResult<Value> {
    if type_name == "dict" && name == "fromkeys" {
        arity(ev, name, &args, 1, 2)?;
        let value = args.get(1).cloned().unwrap_or(Value::None);
        let keys = ev.collect_values(&args[0])?;
        let mut dict = Dict::new();
        for key in keys {
            dict.insert(key, value.clone())
                .map_err(|t| ev.unhashable(&t))?;
        }
        return Ok(Value::dict(dict));
    }
    let mut args = args.into_iter();
    let Some(receiver) = args.next() else {
        return ev.raise(
            "TypeError",
            format!("unbound method {type_name}.{name}() needs an argument"),
        );
    };
    let matches = receiver.type_name() == type_name
        || (type_name == "int" && matches!(receiver, Value::Bool(_)));
    if !matches {
        return ev.raise(
            "TypeError",
            format!(
                "descriptor '{name}' for '{type_name}' objects doesn't apply to a '{}' object",
                receiver.type_name()
            ),
        );
    }
    call(ev, &receiver, name, args.collect(), kwargs)
}

// ══════════════════════════════════════════════════════════════════════════════
// str
// ══════════════════════════════════════════════════════════════════════════════

fn str_arg(ev: &Evaluator, value: &Value, method: &str) -> EvalResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => ev.raise(
            "TypeError",
            format!(
                "{method}() argument must be str, not {}",
                other.type_name()
            ),
        ),
    }
}

fn optional_str(ev: &Evaluator, value: Option<&Value>, method: &str) -> EvalResult<Option<String>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => str_arg(ev, value, method).map(Some),
    }
}

fn optional_int(ev: &Evaluator, value: Option<&Value>) -> EvalResult<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => int_arg(ev, value).map(Some),
    }
}

/// The byte range of `s[start:end]` in character indices, plus the character
/// offset of its start.
fn char_window(s: &str, start: Option<i64>, end: Option<i64>) -> (usize, usize, usize) {
    let len = s.chars().count() as i64;
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len as usize, clamp).max(start);
    let byte = |chars: usize| s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i);
    (byte(start), byte(end), start)
}

fn str_method(
    ev: &mut Evaluator,
    s: &str,
    name: &str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    let text = |t: String| -> EvalResult<Value> { Ok(Value::str(t)) };
    match name {
        "upper" => {
            arity(ev, name, &args, 0, 0)?;
            text(s.to_uppercase())
        }
        "lower" | "casefold" => {
            arity(ev, name, &args, 0, 0)?;
            text(s.to_lowercase())
        }
        "swapcase" => {
            arity(ev, name, &args, 0, 0)?;
            text(
                s.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect(),
            )
        }
        "capitalize" => {
            arity(ev, name, &args, 0, 0)?;
            let mut chars = s.chars();
            let mut out = String::with_capacity(s.len());
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_lowercase());
            }
            text(out)
        }
        "title" => {
            arity(ev, name, &args, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut previous_cased = false;
            for c in s.chars() {
                if previous_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_cased = c.is_alphabetic();
            }
            text(out)
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(ev, name, &args, 0, 1)?;
            let chars = optional_str(ev, args.first(), name)?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            text(match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            }
            .to_string())
        }
        "split" | "rsplit" => {
            arity(ev, name, &args, 0, 2)?;
            let sep = args.first().cloned().or_else(|| kwargs.take("sep"));
            let sep = optional_str(ev, sep.as_ref(), name)?;
            let maxsplit = args.get(1).cloned().or_else(|| kwargs.take("maxsplit"));
            let maxsplit = optional_int(ev, maxsplit.as_ref())?.unwrap_or(-1);
            let parts = match sep {
                Some(sep) if sep.is_empty() => return ev.raise("ValueError", "empty separator"),
                Some(sep) => split_on(s, &sep, maxsplit, name == "rsplit"),
                None => split_whitespace(s, maxsplit, name == "rsplit"),
            };
            Ok(Value::list(parts.into_iter().map(Value::str).collect()))
        }
        "splitlines" => {
            arity(ev, name, &args, 0, 1)?;
            let keepends = match args.first().cloned().or_else(|| kwargs.take("keepends")) {
                Some(value) => ev.truthy(&value)?,
                None => false,
            };
            let mut lines = Vec::new();
            let mut current = String::new();
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\n' || c == '\r' {
                    let mut ending = c.to_string();
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                        ending.push('\n');
                    }
                    if keepends {
                        current.push_str(&ending);
                    }
                    lines.push(Value::str(std::mem::take(&mut current)));
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                lines.push(Value::str(current));
            }
            Ok(Value::list(lines))
        }
        "join" => {
            arity(ev, name, &args, 1, 1)?;
            let items = ev.collect_values(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return ev.raise(
                            "TypeError",
                            format!(
                                "sequence item {i}: expected str instance, {} found",
                                other.type_name()
                            ),
                        )
                    }
                }
            }
            let joined = parts.join(s);
            ev.check_len(joined.len())?;
            text(joined)
        }
        "replace" => {
            arity(ev, name, &args, 2, 3)?;
            let old = str_arg(ev, &args[0], name)?;
            let new = str_arg(ev, &args[1], name)?;
            let count = args.get(2).cloned().or_else(|| kwargs.take("count"));
            let count = optional_int(ev, count.as_ref())?.unwrap_or(-1);
            let occurrences = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(old.as_str()).count()
            };
            let replaced = if count < 0 { occurrences } else { occurrences.min(count as usize) };
            ev.check_len(s.len() + replaced.saturating_mul(new.len()))?;
            text(if count < 0 {
                s.replace(old.as_str(), &new)
            } else {
                s.replacen(old.as_str(), &new, count as usize)
            })
        }
        "startswith" | "endswith" => {
            arity(ev, name, &args, 1, 3)?;
            let start = optional_int(ev, args.get(1))?;
            let end = optional_int(ev, args.get(2))?;
            let (lo, hi, _) = char_window(s, start, end);
            let window = &s[lo..hi];
            let candidates = match &args[0] {
                Value::Tuple(options) => options.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in candidates {
                let Value::Str(affix) = candidate else {
                    return ev.raise(
                        "TypeError",
                        format!(
                            "{name} first arg must be str or a tuple of str, not {}",
                            candidate.type_name()
                        ),
                    );
                };
                let hit = if name == "startswith" {
                    window.starts_with(&*affix)
                } else {
                    window.ends_with(&*affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "rfind" | "index" | "rindex" | "count" => {
            arity(ev, name, &args, 1, 3)?;
            let needle = str_arg(ev, &args[0], name)?;
            let start = optional_int(ev, args.get(1))?;
            let end = optional_int(ev, args.get(2))?;
            let (lo, hi, offset) = char_window(s, start, end);
            let window = &s[lo..hi];
            if name == "count" {
                return Ok(Value::Int(if needle.is_empty() {
                    window.chars().count() as i64 + 1
                } else {
                    window.matches(needle.as_str()).count() as i64
                }));
            }
            let found = if name.starts_with('r') {
                window.rfind(needle.as_str())
            } else {
                window.find(needle.as_str())
            };
            match found {
                Some(byte) => Ok(Value::Int((offset + window[..byte].chars().count()) as i64)),
                None if name.ends_with("find") => Ok(Value::Int(-1)),
                None => ev.raise("ValueError", "substring not found"),
            }
        }
        "partition" | "rpartition" => {
            arity(ev, name, &args, 1, 1)?;
            let sep = str_arg(ev, &args[0], name)?;
            if sep.is_empty() {
                return ev.raise("ValueError", "empty separator");
            }
            let found = if name == "partition" {
                s.find(sep.as_str())
            } else {
                s.rfind(sep.as_str())
            };
            let parts = match found {
                Some(i) => [&s[..i], sep.as_str(), &s[i + sep.len()..]],
                None if name == "partition" => [s, "", ""],
                None => ["", "", s],
            };
            Ok(Value::tuple(parts.iter().map(Value::str).collect()))
        }
        "removeprefix" => {
            arity(ev, name, &args, 1, 1)?;
            let prefix = str_arg(ev, &args[0], name)?;
            text(s.strip_prefix(prefix.as_str()).unwrap_or(s).to_string())
        }
        "removesuffix" => {
            arity(ev, name, &args, 1, 1)?;
            let suffix = str_arg(ev, &args[0], name)?;
            text(s.strip_suffix(suffix.as_str()).unwrap_or(s).to_string())
        }
        "center" | "ljust" | "rjust" => {
            arity(ev, name, &args, 1, 2)?;
            let width = int_arg(ev, &args[0])?.max(0) as usize;
            let fill = match args.get(1) {
                None => ' ',
                Some(value) => {
                    let fill = str_arg(ev, value, name)?;
                    let mut chars = fill.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => {
                            return ev.raise(
                                "TypeError",
                                "The fill character must be exactly one character long",
                            )
                        }
                    }
                }
            };
            ev.check_len(width)?;
            let len = s.chars().count();
            if width <= len {
                return text(s.to_string());
            }
            let margin = width - len;
            let left = match name {
                "ljust" => 0,
                "rjust" => margin,
                _ => margin / 2 + (margin & width & 1),
            };
            let pad = |n: usize| fill.to_string().repeat(n);
            text(format!("{}{s}{}", pad(left), pad(margin - left)))
        }
        "zfill" => {
            arity(ev, name, &args, 1, 1)?;
            let width = int_arg(ev, &args[0])?.max(0) as usize;
            ev.check_len(width)?;
            let len = s.chars().count();
            if width <= len {
                return text(s.to_string());
            }
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                _ => (String::new(), s),
            };
            text(format!("{sign}{}{digits}", "0".repeat(width - len)))
        }
        "isdigit" | "isdecimal" | "isnumeric" | "isalpha" | "isalnum" | "isspace" => {
            arity(ev, name, &args, 0, 0)?;
            let test: fn(char) -> bool = match name {
                "isdigit" | "isdecimal" => |c| c.is_ascii_digit(),
                "isnumeric" => char::is_numeric,
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
        }
        "isupper" | "islower" => {
            arity(ev, name, &args, 0, 0)?;
            let mut cased = false;
            for c in s.chars() {
                if c.is_uppercase() || c.is_lowercase() {
                    cased = true;
                    let ok = if name == "isupper" { c.is_uppercase() } else { c.is_lowercase() };
                    if !ok {
                        return Ok(Value::Bool(false));
                    }
                }
            }
            Ok(Value::Bool(cased))
        }
        "format" => {
            let kwargs: Vec<(String, Value)> =
                std::mem::replace(kwargs, Kwargs::new(Vec::new())).into_inner();
            text(ev.format_template(s, &args, &kwargs)?)
        }
        _ => ev.raise(
            "AttributeError",
            format!("'str' object has no attribute '{name}'"),
        ),
    }
}

fn split_on(s: &str, sep: &str, maxsplit: i64, from_right: bool) -> Vec<String> {
    let owned = |parts: Vec<&str>| parts.into_iter().map(str::to_string).collect::<Vec<_>>();
    match (maxsplit < 0, from_right) {
        (true, _) => owned(s.split(sep).collect()),
        (false, false) => owned(s.splitn(maxsplit as usize + 1, sep).collect()),
        (false, true) => {
            let mut parts = owned(s.rsplitn(maxsplit as usize + 1, sep).collect());
            parts.reverse();
            parts
        }
    }
}

/// `str.split()` with no separator: runs of whitespace, ignoring the ends.
fn split_whitespace(s: &str, maxsplit: i64, from_right: bool) -> Vec<String> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize };
    let mut parts = Vec::new();
    if from_right {
        let mut rest = s.trim_end();
        while !rest.is_empty() {
            if parts.len() == limit {
                parts.push(rest.to_string());
                break;
            }
            match rest.rfind(char::is_whitespace) {
                Some(i) => {
                    let ws_len = rest[i..].chars().next().map_or(1, char::len_utf8);
                    parts.push(rest[i + ws_len..].to_string());
                    rest = rest[..i].trim_end();
                }
                None => {
                    parts.push(rest.to_string());
                    break;
                }
            }
        }
        parts.reverse();
    } else {
        let mut rest = s.trim_start();
        while !rest.is_empty() {
            if parts.len() == limit {
                parts.push(rest.to_string());
                break;
            }
            match rest.find(char::is_whitespace) {
                Some(i) => {
                    parts.push(rest[..i].to_string());
                    rest = rest[i..].trim_start();
                }
                None => {
                    parts.push(rest.to_string());
                    break;
                }
            }
        }
    }
    parts
}

// ══════════════════════════════════════════════════════════════════════════════
// list / tuple
// ══════════════════════════════════════════════════════════════════════════════

/// `count` and `index`, shared by lists and tuples.
fn sequence_method(
    ev: &mut Evaluator,
    items: &[Value],
    type_name: &str,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    match name {
        "count" => {
            arity(ev, name, &args, 1, 1)?;
            let mut count = 0;
            for item in items {
                if ev.values_equal(item, &args[0])? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        "index" => {
            arity(ev, name, &args, 1, 3)?;
            let start = optional_int(ev, args.get(1))?;
            let stop = optional_int(ev, args.get(2))?;
            let positions = ev.slice_positions(items.len(), start, stop, None)?;
            for i in positions {
                if ev.values_equal(&items[i], &args[0])? {
                    return Ok(Value::Int(i as i64));
                }
            }
            let message = if type_name == "list" {
                format!("{} is not in list", ev.repr_of(&args[0])?)
            } else {
                "tuple.index(x): x not in tuple".to_string()
            };
            ev.raise("ValueError", message)
        }
        _ => ev.raise(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{name}'"),
        ),
    }
}

fn list_method(
    ev: &mut Evaluator,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    let Value::List(list) = receiver else {
        return Ok(Value::None);
    };
    match name {
        "append" => {
            arity(ev, name, &args, 1, 1)?;
            let len = list.borrow().len();
            ev.check_len(len + 1)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(ev, name, &args, 1, 1)?;
            let items = ev.collect_values(&args[0])?;
            let len = list.borrow().len();
            ev.check_len(len + items.len())?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            arity(ev, name, &args, 2, 2)?;
            let index = int_arg(ev, &args[0])?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(ev, name, &args, 0, 1)?;
            let len = list.borrow().len();
            if len == 0 {
                return ev.raise("IndexError", "pop from empty list");
            }
            let index = match args.first() {
                Some(value) => int_arg(ev, value)?,
                None => -1,
            };
            let resolved = if index < 0 { index + len as i64 } else { index };
            if resolved < 0 || resolved >= len as i64 {
                return ev.raise("IndexError", "pop index out of range");
            }
            Ok(list.borrow_mut().remove(resolved as usize))
        }
        "remove" => {
            arity(ev, name, &args, 1, 1)?;
            let items = list.borrow().clone();
            for (i, item) in items.iter().enumerate() {
                if ev.values_equal(item, &args[0])? {
                    list.borrow_mut().remove(i);
                    return Ok(Value::None);
                }
            }
            ev.raise("ValueError", "list.remove(x): x not in list")
        }
        "clear" => {
            arity(ev, name, &args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(ev, name, &args, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "reverse" => {
            arity(ev, name, &args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            arity(ev, name, &args, 0, 0)?;
            let key = kwargs.take("key").filter(|k| !matches!(k, Value::None));
            let reverse = match kwargs.take("reverse") {
                Some(value) => ev.truthy(&value)?,
                None => false,
            };
            let items = list.borrow().clone();
            let sorted = ev.sort_values(items, key.as_ref(), reverse)?;
            *list.borrow_mut() = sorted;
            Ok(Value::None)
        }
        _ => {
            let items = list.borrow().clone();
            sequence_method(ev, &items, "list", name, args)
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// dict / set
// ══════════════════════════════════════════════════════════════════════════════

fn dict_method(
    ev: &mut Evaluator,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let Value::Dict(dict) = receiver else {
        return Ok(Value::None);
    };
    match name {
        "get" => {
            arity(ev, name, &args, 1, 2)?;
            let found = dict.borrow().get(&args[0]);
            match found {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Ok(args.get(1).cloned().unwrap_or(Value::None)),
                Err(type_name) => Err(ev.unhashable(&type_name)),
            }
        }
        "keys" | "values" => {
            arity(ev, name, &args, 0, 0)?;
            let dict = dict.borrow();
            let items: Vec<Value> = if name == "keys" {
                dict.keys().cloned().collect()
            } else {
                dict.values().cloned().collect()
            };
            Ok(Value::list(items))
        }
        "items" => {
            arity(ev, name, &args, 0, 0)?;
            let items = dict
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect();
            Ok(Value::list(items))
        }
        "pop" => {
            arity(ev, name, &args, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args[0]);
            match removed {
                Ok(Some(value)) => Ok(value),
                Ok(None) => match args.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(ev.key_error(&args[0])),
                },
                Err(type_name) => Err(ev.unhashable(&type_name)),
            }
        }
        "popitem" => {
            arity(ev, name, &args, 0, 0)?;
            let last = dict.borrow_mut().pop_last();
            match last {
                Some((key, value)) => Ok(Value::tuple(vec![key, value])),
                None => ev.raise("KeyError", "popitem(): dictionary is empty"),
            }
        }
        "setdefault" => {
            arity(ev, name, &args, 1, 2)?;
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let existing = dict.borrow().get(&args[0]);
            match existing {
                Ok(Some(value)) => Ok(value),
                Ok(None) => {
                    let inserted = dict.borrow_mut().insert(args[0].clone(), default.clone());
                    inserted.map_err(|t| ev.unhashable(&t))?;
                    Ok(default)
                }
                Err(type_name) => Err(ev.unhashable(&type_name)),
            }
        }
        "update" => {
            arity(ev, name, &args, 0, 1)?;
            if let Some(source) = args.first() {
                let mut updated = dict.borrow().clone();
                update_dict(ev, &mut updated, source)?;
                *dict.borrow_mut() = updated;
            }
            Ok(Value::None)
        }
        "clear" => {
            arity(ev, name, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(ev, name, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "fromkeys" => call_unbound(ev, "dict", name, args, Vec::new()),
        _ => ev.raise(
            "AttributeError",
            format!("'dict' object has no attribute '{name}'"),
        ),
    }
}

fn set_method(
    ev: &mut Evaluator,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
) -> EvalResult<Value> {
    let Value::Set(set) = receiver else {
        return Ok(Value::None);
    };
    match name {
        "add" => {
            arity(ev, name, &args, 1, 1)?;
            let inserted = set.borrow_mut().insert(args[0].clone(), Value::None);
            inserted.map_err(|t| ev.unhashable(&t))?;
            Ok(Value::None)
        }
        "remove" | "discard" => {
            arity(ev, name, &args, 1, 1)?;
            let removed = set.borrow_mut().remove(&args[0]);
            match removed {
                Ok(Some(_)) => Ok(Value::None),
                Ok(None) if name == "discard" => Ok(Value::None),
                Ok(None) => Err(ev.key_error(&args[0])),
                Err(type_name) => Err(ev.unhashable(&type_name)),
            }
        }
        "pop" => {
            arity(ev, name, &args, 0, 0)?;
            let first = set.borrow().keys().next().cloned();
            match first {
                Some(item) => {
                    let _ = set.borrow_mut().remove(&item);
                    Ok(item)
                }
                None => ev.raise("KeyError", "pop from an empty set"),
            }
        }
        "clear" => {
            arity(ev, name, &args, 0, 0)?;
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(ev, name, &args, 0, 0)?;
            Ok(Value::set(set.borrow().clone()))
        }
        "update" | "union" => {
            let mut result = set.borrow().clone();
            for arg in &args {
                for item in ev.collect_values(arg)? {
                    result
                        .insert(item, Value::None)
                        .map_err(|t| ev.unhashable(&t))?;
                }
            }
            if name == "union" {
                return Ok(Value::set(result));
            }
            *set.borrow_mut() = result;
            Ok(Value::None)
        }
        "intersection" | "intersection_update" | "difference" | "difference_update" => {
            let keep_common = name.starts_with("intersection");
            let mut others = Vec::with_capacity(args.len());
            for arg in &args {
                let items = ev.collect_values(arg)?;
                others.push(Dict::set_from(items).map_err(|t| ev.unhashable(&t))?);
            }
            let current: Vec<Value> = set.borrow().keys().cloned().collect();
            let kept = current.into_iter().filter(|item| {
                if keep_common {
                    others.iter().all(|o| o.contains(item).unwrap_or(false))
                } else {
                    !others.iter().any(|o| o.contains(item).unwrap_or(false))
                }
            });
            let result = Dict::set_from(kept).map_err(|t| ev.unhashable(&t))?;
            if name.ends_with("_update") {
                *set.borrow_mut() = result;
                Ok(Value::None)
            } else {
                Ok(Value::set(result))
            }
        }
        "symmetric_difference" | "issubset" | "issuperset" | "isdisjoint" => {
            arity(ev, name, &args, 1, 1)?;
            let items = ev.collect_values(&args[0])?;
            let other = Dict::set_from(items).map_err(|t| ev.unhashable(&t))?;
            let mine = set.borrow().clone();
            let within = |a: &Dict, b: &Dict| a.keys().all(|k| b.contains(k).unwrap_or(false));
            Ok(match name {
                "issubset" => Value::Bool(within(&mine, &other)),
                "issuperset" => Value::Bool(within(&other, &mine)),
                "isdisjoint" => Value::Bool(!mine.keys().any(|k| other.contains(k).unwrap_or(false))),
                _ => {
                    let items: Vec<Value> = mine
                        .keys()
                        .filter(|k| !other.contains(k).unwrap_or(false))
                        .chain(other.keys().filter(|k| !mine.contains(k).unwrap_or(false)))
                        .cloned()
                        .collect();
                    Value::set(Dict::set_from(items).map_err(|t| ev.unhashable(&t))?)
                }
            })
        }
        _ => ev.raise(
            "AttributeError",
            format!("'set' object has no attribute '{name}'"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_split_honours_maxsplit() {
        assert_eq!(split_whitespace("  a b   c ", -1, false), ["a", "b", "c"]);
        assert_eq!(split_whitespace("a b c", 1, false), ["a", "b c"]);
        assert_eq!(split_whitespace("a b c", 1, true), ["a b", "c"]);
        assert!(split_whitespace("   ", -1, false).is_empty());
    }

    #[test]
    fn separator_split_keeps_empty_fields() {
        assert_eq!(split_on("a,,b", ",", -1, false), ["a", "", "b"]);
        assert_eq!(split_on("a,b,c", ",", 1, true), ["a,b", "c"]);
    }

    #[test]
    fn char_window_counts_characters() {
        let s = "héllo";
        let (lo, hi, offset) = char_window(s, Some(1), Some(3));
        assert_eq!(&s[lo..hi], "él");
        assert_eq!(offset, 1);
    }
}
