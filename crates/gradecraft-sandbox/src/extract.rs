use gradecraft_eval::Value;

use crate::executor::Namespace;
use crate::SandboxError;

/// A callable symbol taken from a namespace.
#[derive(Debug, Clone)]
pub struct Callable {
    name: String,
    value: Value,
}

impl Callable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Look up `name` and check it can be called.
pub fn extract(namespace: &Namespace, name: &str) -> Result<Callable, SandboxError> {
    match namespace.get(name) {
        None => Err(SandboxError::NotFound(name.to_string())),
        Some(value) if !value.is_callable() => Err(SandboxError::NotCallable(name.to_string())),
        Some(value) => Ok(Callable {
            name: name.to_string(),
            value,
        }),
    }
}
