//! The declaration filter: keeps only top-level declarations and rejects
//! imports outside the allow-list.

use std::collections::BTreeSet;

use gradecraft_types::ast::{DeclKind, Module, Stmt};
use tracing::{debug, warn};

use crate::SandboxError;

/// Modules a submission may import, fixed for one grading pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    modules: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// A syntax tree holding only retained declarations and allow-listed imports.
///
/// Only [`filter`] builds one, so holding a `FilteredModule` means the
/// checks have passed.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredModule {
    module: Module,
    allowed: AllowList,
    dropped: usize,
}

impl FilteredModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn body(&self) -> &[Stmt] {
        &self.module.body
    }

    /// The allow-list the tree was checked against; run-time imports are held
    /// to the same list.
    pub fn allowed(&self) -> &AllowList {
        &self.allowed
    }

    /// Top-level statements removed by the filter.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Whether a top-level statement survives filtering. Plain assignments are
/// kept; augmented and annotated ones are not.
fn is_retained(stmt: &Stmt) -> bool {
    !matches!(stmt.decl_kind(), DeclKind::Other)
}

/// The modules a top-level import statement names, as written.
fn imported_modules(stmt: &Stmt) -> Vec<&str> {
    match stmt {
        Stmt::Import(import) => import.names.iter().map(|alias| alias.name.as_str()).collect(),
        Stmt::ImportFrom(from) => vec![from.module.as_str()],
        _ => Vec::new(),
    }
}

/// Build the filtered tree, failing on the first import, in source order,
/// that names a module outside `allowed`.
pub fn filter(module: &Module, allowed: &AllowList) -> Result<FilteredModule, SandboxError> {
    for stmt in &module.body {
        if let Some(name) = imported_modules(stmt)
            .into_iter()
            .find(|name| !allowed.contains(name))
        {
            warn!(module = name, line = stmt.span().start_line, "import outside the allow-list");
            return Err(SandboxError::ImportViolation {
                module: name.to_string(),
            });
        }
    }

    let body: Vec<Stmt> = module.body.iter().filter(|s| is_retained(s)).cloned().collect();
    let dropped = module.body.len() - body.len();
    debug!(retained = body.len(), dropped, "filtered submission");
    Ok(FilteredModule {
        module: Module {
            body,
            span: module.span,
        },
        allowed: allowed.clone(),
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::parse;

    fn filtered(source: &str, allowed: &[&str]) -> Result<FilteredModule, SandboxError> {
        let module = parse(source).expect("test source parses");
        filter(&module, &AllowList::new(allowed.iter().copied()))
    }

    fn kinds(f: &FilteredModule) -> Vec<DeclKind> {
        f.body().iter().map(Stmt::decl_kind).collect()
    }

    #[test]
    fn keeps_declarations_and_drops_everything_else() {
        let source = "\
import math
x = 1
a = b = 2
c, d = 3, 4
x += 1
y: int = 5
print(x)
def f():
    return x
class K:
    pass
if __name__ == '__main__':
    f()
for i in range(3):
    pass
";
        let f = filtered(source, &["math"]).expect("allowed");
        assert_eq!(
            kinds(&f),
            vec![
                DeclKind::Import,
                DeclKind::Assign,
                DeclKind::Assign,
                DeclKind::Assign,
                DeclKind::FunctionDef,
                DeclKind::ClassDef,
            ]
        );
        assert_eq!(f.dropped(), 5);
    }

    #[test]
    fn first_disallowed_import_is_reported() {
        let err = filtered("import math\nimport os\nimport sys\n", &["math"]).unwrap_err();
        assert_eq!(
            err,
            SandboxError::ImportViolation {
                module: "os".into()
            }
        );
        assert_eq!(err.to_string(), "Attempted to import os");
    }

    #[test]
    fn dotted_and_from_imports_are_checked_by_module_text() {
        let err = filtered("import math, os.path\n", &["math", "os"]).unwrap_err();
        assert_eq!(err.to_string(), "Attempted to import os.path");

        assert!(filtered("from math import sqrt\n", &["math"]).is_ok());
        let err = filtered("from random import choice\n", &["math"]).unwrap_err();
        assert_eq!(err.to_string(), "Attempted to import random");
    }

    #[test]
    fn relative_imports_use_their_dotted_text() {
        let err = filtered("from ..pkg import thing\n", &["pkg"]).unwrap_err();
        assert_eq!(err.to_string(), "Attempted to import ..pkg");
    }

    #[test]
    fn imports_nested_in_functions_are_left_for_run_time() {
        let f = filtered("def f():\n    import os\n", &[]).expect("top level is clean");
        assert_eq!(kinds(&f), vec![DeclKind::FunctionDef]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let source = "import math\nprint(1)\ndef f(x):\n    return x\nf(2)\n";
        let allowed = AllowList::new(["math"]);
        let once = filter(&parse(source).expect("parses"), &allowed).expect("allowed");
        let twice = filter(once.module(), &allowed).expect("still allowed");
        assert_eq!(once.module(), twice.module());
        assert_eq!(twice.dropped(), 0);
    }

    #[test]
    fn bare_expressions_never_cause_failures() {
        let f = filtered("1 / 0\nundefined_name\nwhile True:\n    pass\n", &[]).expect("ok");
        assert!(f.body().is_empty());
    }
}
