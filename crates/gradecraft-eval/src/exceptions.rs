//! The builtin class hierarchy: `object` and the exception types.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::value::{Class, Value};

/// `(name, base)` in definition order; every base precedes its subclasses.
const HIERARCHY: &[(&str, &str)] = &[
    ("BaseException", "object"),
    ("SystemExit", "BaseException"),
    ("KeyboardInterrupt", "BaseException"),
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("AssertionError", "Exception"),
    ("AttributeError", "Exception"),
    ("EOFError", "Exception"),
    ("ImportError", "Exception"),
    ("ModuleNotFoundError", "ImportError"),
    ("LookupError", "Exception"),
    ("IndexError", "LookupError"),
    ("KeyError", "LookupError"),
    ("MemoryError", "Exception"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("RuntimeError", "Exception"),
    ("NotImplementedError", "RuntimeError"),
    ("RecursionError", "RuntimeError"),
    ("StopIteration", "Exception"),
    ("TypeError", "Exception"),
    ("ValueError", "Exception"),
];

/// The builtin classes of one interpreter.
pub(crate) struct BuiltinClasses {
    classes: BTreeMap<&'static str, Rc<Class>>,
}

impl BuiltinClasses {
    pub(crate) fn new() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert("object", builtin_class("object", Vec::new()));
        for &(name, base) in HIERARCHY {
            let bases = classes.get(base).cloned().into_iter().collect();
            let class = builtin_class(name, bases);
            if name == "BaseException" {
                let mut attrs = class.attrs.borrow_mut();
                attrs.insert("__init__".into(), Value::Builtin("BaseException.__init__"));
                attrs.insert("__str__".into(), Value::Builtin("BaseException.__str__"));
            }
            classes.insert(name, class);
        }
        Self { classes }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Rc<Class>> {
        self.classes.get(name).cloned()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.classes.keys().copied()
    }

    /// Whether `class` derives from `BaseException`.
    pub(crate) fn is_exception_class(&self, class: &Class) -> bool {
        self.classes
            .get("BaseException")
            .is_some_and(|base| class.is_subclass_of(base))
    }
}

fn builtin_class(name: &str, bases: Vec<Rc<Class>>) -> Rc<Class> {
    Rc::new(Class {
        name: name.to_string(),
        bases,
        attrs: RefCell::new(BTreeMap::new()),
        builtin: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_follows_python() {
        let classes = BuiltinClasses::new();
        let zero = classes.get("ZeroDivisionError").unwrap();
        let arith = classes.get("ArithmeticError").unwrap();
        let exc = classes.get("Exception").unwrap();
        let value = classes.get("ValueError").unwrap();
        assert!(zero.is_subclass_of(&arith));
        assert!(zero.is_subclass_of(&exc));
        assert!(!zero.is_subclass_of(&value));
        assert!(classes.is_exception_class(&zero));
        assert!(!classes.is_exception_class(&classes.get("object").unwrap()));
    }

    #[test]
    fn exceptions_inherit_init() {
        let classes = BuiltinClasses::new();
        let key_error = classes.get("KeyError").unwrap();
        assert!(matches!(
            key_error.lookup("__init__"),
            Some(Value::Builtin("BaseException.__init__"))
        ));
    }
}
