//! `str()`, `repr()`, truthiness and the three string-formatting styles.

use std::rc::Rc;

use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::expr::Index;
use crate::format::{parse_percent, parse_template, FormatSpec, PercentPiece, TemplatePiece};
use crate::value::{ascii_escape, float_repr, is_type_name, str_repr, Value};

/// Containers nested deeper than this are reported as a `RecursionError`
/// by `repr`.
const MAX_REPR_DEPTH: usize = 200;

/// Numbering state shared by the fields of one `str.format` call.
#[derive(Default)]
struct Numbering {
    next: usize,
    automatic: bool,
    manual: bool,
}

impl Evaluator {
    pub(crate) fn truthy(&mut self, value: &Value) -> EvalResult<bool> {
        if !matches!(value, Value::Instance(_)) {
            return Ok(value.is_truthy());
        }
        if self.has_dunder(value, "__bool__") {
            return match self.call_dunder(value, "__bool__", Vec::new())? {
                Value::Bool(b) => Ok(b),
                other => self.raise(
                    "TypeError",
                    format!("__bool__ should return bool, returned {}", other.type_name()),
                ),
            };
        }
        if self.has_dunder(value, "__len__") {
            let len = self.call_dunder(value, "__len__", Vec::new())?;
            return Ok(len.as_int().is_some_and(|n| n != 0));
        }
        Ok(true)
    }

    pub(crate) fn str_of(&mut self, value: &Value) -> EvalResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Instance(instance) => match instance.class.lookup("__str__") {
                Some(method) => {
                    let result = self.call_value(&method, vec![value.clone()], Vec::new())?;
                    match result {
                        Value::Str(s) => Ok(s.to_string()),
                        other => self.raise(
                            "TypeError",
                            format!("__str__ returned non-string (type {})", other.type_name()),
                        ),
                    }
                }
                None => self.repr_of(value),
            },
            other => self.repr_of(other),
        }
    }

    pub(crate) fn repr_of(&mut self, value: &Value) -> EvalResult<String> {
        let mut seen = Vec::new();
        self.repr_nested(value, &mut seen)
    }

    fn repr_nested(&mut self, value: &Value, seen: &mut Vec<usize>) -> EvalResult<String> {
        if seen.len() > MAX_REPR_DEPTH {
            return self.raise(
                "RecursionError",
                "maximum recursion depth exceeded while getting the repr of an object",
            );
        }
        Ok(match value {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => str_repr(s),
            Value::List(items) => {
                let address = Rc::as_ptr(items) as *const u8 as usize;
                if seen.contains(&address) {
                    return Ok("[...]".into());
                }
                let items = items.borrow().clone();
                seen.push(address);
                let inner = self.repr_items(&items, seen);
                seen.pop();
                format!("[{}]", inner?)
            }
            Value::Tuple(items) => {
                // Tuples cannot form cycles but still count toward the depth.
                seen.push(0);
                let inner = self.repr_items(items, seen);
                seen.pop();
                let inner = inner?;
                if items.len() == 1 {
                    format!("({inner},)")
                } else {
                    format!("({inner})")
                }
            }
            Value::Dict(dict) => {
                let address = Rc::as_ptr(dict) as *const u8 as usize;
                if seen.contains(&address) {
                    return Ok("{...}".into());
                }
                let entries: Vec<(Value, Value)> = dict
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                seen.push(address);
                let mut parts = Vec::with_capacity(entries.len());
                let mut result = Ok(());
                for (key, value) in &entries {
                    match (self.repr_nested(key, seen), self.repr_nested(value, seen)) {
                        (Ok(k), Ok(v)) => parts.push(format!("{k}: {v}")),
                        (Err(err), _) | (_, Err(err)) => {
                            result = Err(err);
                            break;
                        }
                    }
                }
                seen.pop();
                result?;
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(set) => {
                let items: Vec<Value> = set.borrow().keys().cloned().collect();
                if items.is_empty() {
                    "set()".into()
                } else {
                    format!("{{{}}}", self.repr_items(&items, seen)?)
                }
            }
            Value::Range(range) => {
                if range.step == 1 {
                    format!("range({}, {})", range.start, range.stop)
                } else {
                    format!("range({}, {}, {})", range.start, range.stop, range.step)
                }
            }
            Value::Function(function) => {
                format!("<function {} at 0x{:x}>", function.name, value.address())
            }
            Value::Builtin(name) if is_type_name(name) => format!("<class '{name}'>"),
            Value::Builtin(name) => format!(
                "<built-in function {}>",
                name.rsplit('.').next().unwrap_or(name)
            ),
            Value::BoundMethod(method) => {
                let receiver = self.repr_nested(&method.receiver, seen)?;
                format!(
                    "<bound method {} of {receiver}>",
                    self.callable_name(&method.function)
                )
            }
            Value::NativeMethod(method) => format!(
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            ),
            Value::Class(class) => format!("<class '{}'>", class.qualified_name()),
            Value::Instance(instance) => {
                if let Some(method) = instance.class.lookup("__repr__") {
                    let result = self.call_value(&method, vec![value.clone()], Vec::new())?;
                    return match result {
                        Value::Str(s) => Ok(s.to_string()),
                        other => self.raise(
                            "TypeError",
                            format!("__repr__ returned non-string (type {})", other.type_name()),
                        ),
                    };
                }
                if self.classes.is_exception_class(&instance.class) {
                    let args = instance.attrs.borrow().get("args").cloned();
                    let inner = match args {
                        Some(Value::Tuple(args)) => self.repr_items(&args, seen)?,
                        _ => String::new(),
                    };
                    return Ok(format!("{}({inner})", instance.class.name));
                }
                format!(
                    "<{} object at 0x{:x}>",
                    instance.class.qualified_name(),
                    value.address()
                )
            }
            Value::Module(module) => format!("<module '{}' (built-in)>", module.name),
            Value::Super(proxy) => format!(
                "<super: <class '{}'>, <{} object>>",
                proxy.class.name,
                proxy.receiver.type_name()
            ),
            Value::Descriptor(descriptor) => format!("<{} object>", descriptor.kind()),
        })
    }

    fn repr_items(&mut self, items: &[Value], seen: &mut Vec<usize>) -> EvalResult<String> {
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(self.repr_nested(item, seen)?);
        }
        Ok(parts.join(", "))
    }

    /// Apply a `!r`, `!s` or `!a` conversion.
    pub(crate) fn convert(&mut self, value: Value, conversion: Option<char>) -> EvalResult<Value> {
        Ok(match conversion {
            Some('r') => Value::str(self.repr_of(&value)?),
            Some('s') => Value::str(self.str_of(&value)?),
            Some('a') => Value::str(ascii_escape(&self.repr_of(&value)?)),
            _ => value,
        })
    }

    /// Field widths and precisions are held to the collection cap before any
    /// padding is built.
    fn check_spec(&self, spec: &FormatSpec) -> EvalResult<()> {
        self.check_len(spec.width)?;
        self.check_len(spec.precision.unwrap_or(0))
    }

    /// `format(value, spec)`
    pub(crate) fn format_value(&mut self, value: &Value, spec: &str) -> EvalResult<String> {
        if self.has_dunder(value, "__format__") {
            return match self.call_dunder(value, "__format__", vec![Value::str(spec)])? {
                Value::Str(s) => Ok(s.to_string()),
                other => self.raise(
                    "TypeError",
                    format!("__format__ must return a str, not {}", other.type_name()),
                ),
            };
        }
        let parsed = |ev: &Self| -> EvalResult<FormatSpec> {
            let parsed = FormatSpec::parse(spec).map_err(|m| ev.exception("ValueError", m))?;
            ev.check_spec(&parsed)?;
            Ok(parsed)
        };
        let rendered = match value {
            Value::Bool(b) if !spec.is_empty() => parsed(self)?.format_int(*b as i64),
            Value::Int(n) => parsed(self)?.format_int(*n),
            Value::Float(f) => parsed(self)?.format_float(*f),
            Value::Str(s) => parsed(self)?.format_str(s),
            _ if spec.is_empty() => return self.str_of(value),
            _ => {
                return self.raise(
                    "TypeError",
                    format!(
                        "unsupported format string passed to {}.__format__",
                        value.type_name()
                    ),
                )
            }
        };
        rendered.map_err(|m| self.exception("ValueError", m))
    }

    /// `template % args`
    pub(crate) fn percent_format(&mut self, template: &str, args: &Value) -> EvalResult<String> {
        let pieces = parse_percent(template).map_err(|m| self.exception("ValueError", m))?;
        let values: Vec<Value> = match args {
            Value::Tuple(items) => items.to_vec(),
            other => vec![other.clone()],
        };
        let mut values = values.into_iter();
        let mut out = String::new();
        for piece in pieces {
            let (spec, conversion) = match piece {
                PercentPiece::Literal(text) => {
                    out.push_str(&text);
                    continue;
                }
                PercentPiece::Directive { spec, conversion } => (spec, conversion),
            };
            self.check_spec(&spec)?;
            let Some(value) = values.next() else {
                return self.raise("TypeError", "not enough arguments for format string");
            };
            let rendered = match conversion {
                's' => {
                    let s = self.str_of(&value)?;
                    spec.format_str(&s)
                }
                'r' => {
                    let s = self.repr_of(&value)?;
                    spec.format_str(&s)
                }
                'a' => {
                    let s = ascii_escape(&self.repr_of(&value)?);
                    spec.format_str(&s)
                }
                'd' | 'i' | 'u' => match value {
                    Value::Float(f) if f.is_finite() => spec.format_int(f.trunc() as i64),
                    ref v if v.as_int().is_some() => spec.format_int(v.as_int().unwrap_or(0)),
                    other => {
                        return self.raise(
                            "TypeError",
                            format!(
                                "%{conversion} format: a real number is required, not {}",
                                other.type_name()
                            ),
                        )
                    }
                },
                'x' | 'X' | 'o' => match value.as_int() {
                    Some(n) => spec.format_int(n),
                    None => {
                        return self.raise(
                            "TypeError",
                            format!(
                                "%{conversion} format: an integer is required, not {}",
                                value.type_name()
                            ),
                        )
                    }
                },
                'c' => match &value {
                    Value::Str(s) if s.chars().count() == 1 => spec.format_str(s),
                    v if v.as_int().is_some() => spec.format_int(v.as_int().unwrap_or(0)),
                    _ => return self.raise("TypeError", "%c requires an int or a unicode character"),
                },
                _ => match value.as_float() {
                    Some(f) => spec.format_float(f),
                    None => {
                        return self.raise(
                            "TypeError",
                            format!("must be real number, not {}", value.type_name()),
                        )
                    }
                },
            };
            out.push_str(&rendered.map_err(|m| self.exception("ValueError", m))?);
        }
        if values.next().is_some() {
            return self.raise(
                "TypeError",
                "not all arguments converted during string formatting",
            );
        }
        Ok(out)
    }

    /// `template.format(*args, **kwargs)`
    pub(crate) fn format_template(
        &mut self,
        template: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> EvalResult<String> {
        let mut numbering = Numbering::default();
        self.format_template_with(template, args, kwargs, &mut numbering, 0)
    }

    fn format_template_with(
        &mut self,
        template: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
        numbering: &mut Numbering,
        depth: usize,
    ) -> EvalResult<String> {
        if depth > 1 {
            return self.raise("ValueError", "Max string recursion exceeded");
        }
        let pieces = parse_template(template).map_err(|m| self.exception("ValueError", m))?;
        let mut out = String::new();
        for piece in pieces {
            let (name, conversion, spec) = match piece {
                TemplatePiece::Literal(text) => {
                    out.push_str(&text);
                    continue;
                }
                TemplatePiece::Field {
                    name,
                    conversion,
                    spec,
                } => (name, conversion, spec),
            };
            let value = self.resolve_field(&name, args, kwargs, numbering)?;
            let value = self.convert(value, conversion)?;
            let spec = if spec.contains('{') {
                self.format_template_with(&spec, args, kwargs, numbering, depth + 1)?
            } else {
                spec
            };
            out.push_str(&self.format_value(&value, &spec)?);
        }
        Ok(out)
    }

    /// Resolve `0`, `name`, `name.attr` or `name[key]` against the call's
    /// arguments.
    fn resolve_field(
        &mut self,
        field: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
        numbering: &mut Numbering,
    ) -> EvalResult<Value> {
        let head_end = field.find(['.', '[']).unwrap_or(field.len());
        let (head, mut rest) = field.split_at(head_end);

        let mut value = if head.is_empty() || head.bytes().all(|b| b.is_ascii_digit()) {
            let index = if head.is_empty() {
                if numbering.manual {
                    return self.raise(
                        "ValueError",
                        "cannot switch from manual field specification to automatic field numbering",
                    );
                }
                numbering.automatic = true;
                numbering.next += 1;
                numbering.next - 1
            } else {
                if numbering.automatic {
                    return self.raise(
                        "ValueError",
                        "cannot switch from automatic field numbering to manual field specification",
                    );
                }
                numbering.manual = true;
                head.parse().unwrap_or(usize::MAX)
            };
            match args.get(index) {
                Some(value) => value.clone(),
                None => {
                    return self.raise(
                        "IndexError",
                        format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ),
                    )
                }
            }
        } else {
            match kwargs.iter().find(|(k, _)| k == head) {
                Some((_, value)) => value.clone(),
                None => return Err(self.key_error(&Value::str(head))),
            }
        };

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                value = self.get_attr(&value, &after[..end])?;
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let Some(end) = after.find(']') else {
                    return self.raise("ValueError", "Missing ']' in format string");
                };
                let key = &after[..end];
                let key = match key.parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => Value::str(key),
                };
                value = self.get_item(&value, &Index::Item(key))?;
                rest = &after[end + 1..];
            } else {
                return self.raise(
                    "ValueError",
                    "Only '.' or '[' may follow ']' in format field specifier",
                );
            }
        }
        Ok(value)
    }
}
