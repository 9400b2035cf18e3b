//! Runtime values for the interpreter.
//!
//! Mutable containers (`list`, `dict`, `set`) are shared through
//! `Rc<RefCell<_>>` so aliasing behaves the way submissions expect:
//! `b = a; b.append(1)` is visible through `a`. Because of the `Rc`s a value
//! graph is never used by two threads at once.

use gradecraft_types::ast::{Expr, Params, Stmt};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::env::{Scope, ScopeInfo};

/// Shared, interior-mutable storage for container values.
pub type Shared<T> = Rc<RefCell<T>>;

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Shared<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Shared<Dict>),
    /// A set is a [`Dict`] whose values are all `None`.
    Set(Shared<Dict>),
    Range(RangeValue),
    Function(Rc<Function>),
    /// A native function, type or module function, named by its qualified
    /// name (`len`, `int`, `math.sqrt`, `BaseException.__init__`).
    Builtin(&'static str),
    /// A callable bound to its receiver: `obj.method`.
    BoundMethod(Rc<BoundMethod>),
    /// A method of a builtin type bound to its receiver: `"a,b".split`.
    NativeMethod(Rc<NativeMethod>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Module(Rc<NativeModule>),
    /// The proxy returned by `super()`.
    Super(Rc<SuperProxy>),
    /// A `staticmethod`, `classmethod` or `property` wrapper in a class body.
    Descriptor(Rc<Descriptor>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(set: Dict) -> Self {
        Value::Set(Rc::new(RefCell::new(set)))
    }

    /// The Python type name, as used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Set(_) => "set".into(),
            Value::Range(_) => "range".into(),
            Value::Function(_) => "function".into(),
            Value::Builtin(name) if is_type_name(name) => "type".into(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::BoundMethod(_) => "method".into(),
            Value::NativeMethod(_) => "builtin_function_or_method".into(),
            Value::Class(_) => "type".into(),
            Value::Instance(instance) => instance.class.name.clone(),
            Value::Module(_) => "module".into(),
            Value::Super(_) => "super".into(),
            Value::Descriptor(d) => d.kind().into(),
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_)
            | Value::Builtin(_)
            | Value::BoundMethod(_)
            | Value::NativeMethod(_)
            | Value::Class(_) => true,
            Value::Instance(instance) => instance.class.lookup("__call__").is_some(),
            _ => false,
        }
    }

    /// Truthiness for every value that does not need to run user code.
    ///
    /// Instances defer to `__bool__`/`__len__`, which the interpreter
    /// handles before falling back here.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) | Value::Set(dict) => !dict.borrow().is_empty(),
            Value::Range(range) => range.len() > 0,
            _ => true,
        }
    }

    /// The value as an integer, treating `bool` as `int` the way Python does.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// The value as a float, for any numeric value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison, the `is` operator.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Dict(a), Value::Dict(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            (Value::NativeMethod(a), Value::NativeMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// An address-like number for default `repr`s.
    pub(crate) fn address(&self) -> usize {
        match self {
            Value::Function(f) => Rc::as_ptr(f) as *const u8 as usize,
            Value::Class(c) => Rc::as_ptr(c) as *const u8 as usize,
            Value::Instance(i) => Rc::as_ptr(i) as *const u8 as usize,
            Value::List(l) => Rc::as_ptr(l) as *const u8 as usize,
            _ => 0,
        }
    }
}

/// Nesting beyond which structural equality gives up and hashing fails.
pub const MAX_NESTING: usize = 200;

/// Error payload of [`HashKey::of`] for keys nested deeper than
/// [`MAX_NESTING`].
pub(crate) const NESTED_TOO_DEEPLY: &str = "<nested too deeply>";

/// Structural equality without running user code.
///
/// Numbers compare across `bool`/`int`/`float`; containers compare element
/// by element; everything else compares by identity. Containers nested
/// deeper than [`MAX_NESTING`] compare unequal.
pub fn py_eq(a: &Value, b: &Value) -> bool {
    eq_at(a, b, 0)
}

fn eq_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_NESTING {
        return false;
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || seq_eq(&x.borrow(), &y.borrow(), depth + 1)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_eq(x, y, depth + 1),
        (Value::Dict(x), Value::Dict(y)) => {
            Rc::ptr_eq(x, y) || x.borrow().eq_entries(&y.borrow(), depth + 1)
        }
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y) || x.borrow().eq_keys(&y.borrow()),
        (Value::Range(x), Value::Range(y)) => x == y,
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => x == y,
                _ => a.is(b),
            },
        },
    }
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq_at(x, y, depth))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        py_eq(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Tuple(items) => {
                let mut t = f.debug_tuple("");
                for item in items.iter() {
                    t.field(item);
                }
                t.finish()
            }
            Value::Dict(dict) => f.debug_map().entries(dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone()))).finish(),
            Value::Set(set) => f.debug_set().entries(set.borrow().keys()).finish(),
            Value::Range(r) => write!(f, "range({}, {}, {})", r.start, r.stop, r.step),
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Builtin(name) => write!(f, "Builtin({name})"),
            Value::BoundMethod(m) => write!(f, "BoundMethod({:?})", m.function),
            Value::NativeMethod(m) => write!(f, "NativeMethod({})", m.name),
            Value::Class(class) => write!(f, "Class({})", class.name),
            Value::Instance(instance) => write!(f, "Instance({})", instance.class.name),
            Value::Module(module) => write!(f, "Module({})", module.name),
            Value::Super(proxy) => write!(f, "Super({})", proxy.class.name),
            Value::Descriptor(d) => write!(f, "Descriptor({})", d.kind()),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Ranges
// ══════════════════════════════════════════════════════════════════════════════

/// A lazy `range(start, stop, step)`; `step` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let len = if step > 0 && start < stop {
            (stop - start + step - 1) / step
        } else if step < 0 && start > stop {
            (start - stop - step - 1) / -step
        } else {
            0
        };
        len.min(usize::MAX as i128) as usize
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some(self.start + self.step * index as i64)
    }

    pub fn contains(&self, n: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= n && n < self.stop
        } else {
            self.stop < n && n <= self.start
        };
        in_bounds && (n as i128 - self.start as i128) % self.step as i128 == 0
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Dict / Set storage
// ══════════════════════════════════════════════════════════════════════════════

/// The hashable projection of a value used to index a [`Dict`].
///
/// Numbers that compare equal share a key (`1`, `1.0` and `True`), matching
/// Python's hashing rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Identity(usize),
    Builtin(&'static str),
    Range(i64, i64, i64),
}

impl HashKey {
    /// Project a value onto its key, or return the type name of an
    /// unhashable value.
    pub fn of(value: &Value) -> Result<HashKey, String> {
        Self::key_at(value, 0)
    }

    fn key_at(value: &Value, depth: usize) -> Result<HashKey, String> {
        if depth > MAX_NESTING {
            return Err(NESTED_TOO_DEEPLY.to_string());
        }
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(n) => HashKey::Int(*n),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.2e18 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(|item| Self::key_at(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Range(r) => HashKey::Range(r.start, r.stop, r.step),
            Value::Builtin(name) => HashKey::Builtin(name),
            Value::List(_) | Value::Dict(_) | Value::Set(_) => return Err(value.type_name()),
            other => HashKey::Identity(identity(other)),
        })
    }
}

fn identity(value: &Value) -> usize {
    match value {
        Value::Function(f) => Rc::as_ptr(f) as *const u8 as usize,
        Value::BoundMethod(m) => Rc::as_ptr(m) as *const u8 as usize,
        Value::NativeMethod(m) => Rc::as_ptr(m) as *const u8 as usize,
        Value::Class(c) => Rc::as_ptr(c) as *const u8 as usize,
        Value::Instance(i) => Rc::as_ptr(i) as *const u8 as usize,
        Value::Module(m) => Rc::as_ptr(m) as *const u8 as usize,
        Value::Super(s) => Rc::as_ptr(s) as *const u8 as usize,
        Value::Descriptor(d) => Rc::as_ptr(d) as *const u8 as usize,
        _ => 0,
    }
}

/// An insertion-ordered hash map from values to values.
///
/// Removal leaves a tombstone so iteration order is stable; the entry vector
/// is compacted once tombstones outnumber live entries.
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<Option<(Value, Value)>>,
    index: HashMap<HashKey, usize>,
    len: usize,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, String> {
        let hash = HashKey::of(key)?;
        Ok(self
            .index
            .get(&hash)
            .and_then(|&i| self.entries[i].as_ref())
            .map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, String> {
        Ok(self.index.contains_key(&HashKey::of(key)?))
    }

    /// Insert or overwrite; an existing key keeps its original position.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), String> {
        let hash = HashKey::of(&key)?;
        match self.index.get(&hash) {
            Some(&i) => {
                if let Some(entry) = self.entries[i].as_mut() {
                    entry.1 = value;
                }
            }
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push(Some((key, value)));
                self.len += 1;
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, String> {
        let hash = HashKey::of(key)?;
        let Some(i) = self.index.remove(&hash) else {
            return Ok(None);
        };
        let removed = self.entries[i].take().map(|(_, v)| v);
        self.len -= 1;
        if self.entries.len() > 2 * self.len + 8 {
            self.compact();
        }
        Ok(removed)
    }

    /// Remove and return the most recently inserted entry.
    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        while let Some(slot) = self.entries.pop() {
            if let Some((key, value)) = slot {
                if let Ok(hash) = HashKey::of(&key) {
                    self.index.remove(&hash);
                }
                self.len -= 1;
                return Some((key, value));
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().flatten().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, v)| v)
    }

    /// Build a set from values, rejecting unhashable members.
    pub fn set_from(items: impl IntoIterator<Item = Value>) -> Result<Dict, String> {
        let mut set = Dict::new();
        for item in items {
            set.insert(item, Value::None)?;
        }
        Ok(set)
    }

    fn compact(&mut self) {
        let live: Vec<_> = self.entries.drain(..).flatten().collect();
        self.index.clear();
        for (i, (key, _)) in live.iter().enumerate() {
            if let Ok(hash) = HashKey::of(key) {
                self.index.insert(hash, i);
            }
        }
        self.entries = live.into_iter().map(Some).collect();
    }

    fn eq_keys(&self, other: &Dict) -> bool {
        self.len == other.len && self.keys().all(|k| other.contains(k).unwrap_or(false))
    }

    fn eq_entries(&self, other: &Dict, depth: usize) -> bool {
        self.len == other.len
            && self.iter().all(|(k, v)| match other.get(k) {
                Ok(Some(w)) => eq_at(v, &w, depth),
                _ => false,
            })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions, classes, instances
// ══════════════════════════════════════════════════════════════════════════════

/// What a user function evaluates when called.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    /// A `lambda` body.
    Expr(Expr),
}

/// A user-defined function or lambda, closed over its defining scope.
pub struct Function {
    pub name: String,
    pub params: Params,
    /// Evaluated defaults for the trailing positional parameters.
    pub defaults: Vec<Value>,
    pub kw_defaults: BTreeMap<String, Value>,
    pub body: FunctionBody,
    pub closure: Option<Rc<Scope>>,
    pub scope_info: Rc<ScopeInfo>,
    /// The class whose body defined this function, for `super()`.
    pub owner: RefCell<Option<Weak<Class>>>,
}

/// A callable bound to a receiver that is passed as the first argument.
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Value,
}

/// A builtin-type method bound to its receiver.
pub struct NativeMethod {
    pub receiver: Value,
    pub name: String,
}

/// A class object. Builtin exception types are classes too.
pub struct Class {
    pub name: String,
    pub bases: Vec<Rc<Class>>,
    pub attrs: RefCell<BTreeMap<String, Value>>,
    pub builtin: bool,
}

impl Class {
    /// Look up an attribute on the class or its bases, depth-first and left
    /// to right.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.attrs.borrow().get(name) {
            return Some(value.clone());
        }
        self.bases.iter().find_map(|base| base.lookup(name))
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|base| base.is_subclass_of(other))
    }

    /// The class name, qualified the way its default `repr` shows it.
    pub fn qualified_name(&self) -> String {
        if self.builtin {
            self.name.clone()
        } else {
            format!("__main__.{}", self.name)
        }
    }
}

/// An instance of a user class or exception type.
pub struct Instance {
    pub class: Rc<Class>,
    pub attrs: RefCell<BTreeMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            attrs: RefCell::new(BTreeMap::new()),
        }
    }
}

/// `super()` bound to the class that defined the running method.
pub struct SuperProxy {
    pub class: Rc<Class>,
    pub receiver: Value,
}

/// Decorators that change how a class attribute binds.
pub enum Descriptor {
    Static(Value),
    ClassMethod(Value),
    Property(Value),
}

impl Descriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::Static(_) => "staticmethod",
            Descriptor::ClassMethod(_) => "classmethod",
            Descriptor::Property(_) => "property",
        }
    }
}

/// A module implemented natively.
pub struct NativeModule {
    pub name: &'static str,
    pub attrs: BTreeMap<&'static str, Value>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Type names and scalar rendering
// ══════════════════════════════════════════════════════════════════════════════

/// Builtin names that denote types rather than plain functions.
pub const TYPE_NAMES: &[&str] = &[
    "int", "float", "str", "bool", "list", "tuple", "dict", "set", "range", "type", "NoneType",
];

pub fn is_type_name(name: &str) -> bool {
    TYPE_NAMES.contains(&name)
}

/// `repr()` of a float, matching Python's shortest round-trip rendering.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0".into() } else { "0.0".into() };
    }
    let abs = f.abs();
    if !(1e-4..1e16).contains(&abs) {
        let sci = format!("{f:e}");
        let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    let s = format!("{f}");
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

/// `repr()` of a string: single quotes unless only double quotes avoid
/// escaping.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Escape non-ASCII characters the way `ascii()` does.
pub fn ascii_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        let code = ch as u32;
        if code < 0x80 {
            out.push(ch);
        } else if code <= 0xff {
            out.push_str(&format!("\\x{code:02x}"));
        } else if code <= 0xffff {
            out.push_str(&format!("\\u{code:04x}"));
        } else {
            out.push_str(&format!("\\U{code:08x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(123456789.0), "123456789.0");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn str_repr_picks_quotes() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
        assert_eq!(str_repr("'\""), "'\\'\"'");
    }

    #[test]
    fn numbers_share_hash_keys() {
        assert_eq!(HashKey::of(&Value::Int(1)), HashKey::of(&Value::Bool(true)));
        assert_eq!(HashKey::of(&Value::Int(2)), HashKey::of(&Value::Float(2.0)));
        assert!(HashKey::of(&Value::list(vec![])).is_err());
    }

    #[test]
    fn structural_equality_stops_at_the_nesting_limit() {
        let a = Value::list(Vec::new());
        let b = Value::list(Vec::new());
        if let (Value::List(x), Value::List(y)) = (&a, &b) {
            x.borrow_mut().push(a.clone());
            y.borrow_mut().push(b.clone());
        }
        assert!(py_eq(&a, &a));
        assert!(!py_eq(&a, &b));

        let mut deep = Value::tuple(Vec::new());
        for _ in 0..=MAX_NESTING {
            deep = Value::tuple(vec![deep]);
        }
        assert_eq!(HashKey::of(&deep), Err(NESTED_TOO_DEEPLY.to_string()));
    }

    #[test]
    fn dict_keeps_insertion_order_across_removal() {
        let mut dict = Dict::new();
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            dict.insert(Value::str(k), Value::Int(v)).unwrap();
        }
        dict.remove(&Value::str("b")).unwrap();
        dict.insert(Value::str("a"), Value::Int(10)).unwrap();
        dict.insert(Value::str("d"), Value::Int(4)).unwrap();
        let keys: Vec<_> = dict.keys().map(|k| k.as_str().unwrap().to_string()).collect();
        assert_eq!(keys, ["a", "c", "d"]);
        assert_eq!(dict.get(&Value::str("a")).unwrap(), Some(Value::Int(10)));
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn dict_survives_compaction() {
        let mut dict = Dict::new();
        for i in 0..50 {
            dict.insert(Value::Int(i), Value::Int(i * i)).unwrap();
        }
        for i in 0..45 {
            dict.remove(&Value::Int(i)).unwrap();
        }
        assert_eq!(dict.len(), 5);
        assert_eq!(dict.get(&Value::Int(47)).unwrap(), Some(Value::Int(47 * 47)));
        assert_eq!(dict.get(&Value::Int(3)).unwrap(), None);
    }

    #[test]
    fn range_len_and_membership() {
        let r = RangeValue { start: 0, stop: 10, step: 3 };
        assert_eq!(r.len(), 4);
        assert!(r.contains(9));
        assert!(!r.contains(10));
        let down = RangeValue { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), Some(1));
        assert!(down.contains(3));
    }

    #[test]
    fn structural_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::str("a")]),
            Value::list(vec![Value::Int(1), Value::str("a")])
        );
        assert_ne!(Value::list(vec![]), Value::tuple(vec![]));
    }
}
