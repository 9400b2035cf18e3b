//! Deadline-bound execution of a filtered tree in a fresh namespace.

use std::time::Duration;

use gradecraft_eval::{CancelToken, EvalError, Evaluator, Limits, Value};
use tracing::{debug, warn};

use crate::extract::Callable;
use crate::filter::FilteredModule;
use crate::watchdog::Watchdog;
use crate::SandboxError;

/// Message carried by [`SandboxError::Timeout`] unless configured otherwise.
pub const DEFAULT_TIMEOUT_MESSAGE: &str = "Timeout";

/// Value bound to `__name__`, so `if __name__ == "__main__":` guards stay shut
/// even in code that survives filtering.
pub const MODULE_NAME: &str = "__not_main__";

/// Stack for the thread that runs submission code. Interpreted recursion is
/// capped well below what this holds.
pub const EXECUTION_STACK_SIZE: usize = 64 * 1024 * 1024;

/// The global symbol table left behind by one execution.
///
/// Each [`Executor::execute`] call builds its own; nothing is shared between
/// submissions or between runs of the same tree.
pub struct Namespace {
    evaluator: Evaluator,
}

impl Namespace {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.evaluator.global(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.evaluator.global_names()
    }

    /// Output printed so far.
    pub fn output(&self) -> &str {
        self.evaluator.output()
    }

    pub fn take_output(&mut self) -> String {
        self.evaluator.take_output()
    }

    pub fn output_truncated(&self) -> bool {
        self.evaluator.output_truncated()
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("names", &self.names()).finish()
    }
}

/// Runs submissions under a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct Executor {
    deadline: Duration,
    timeout_message: String,
    limits: Limits,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Executor {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            timeout_message: DEFAULT_TIMEOUT_MESSAGE.to_string(),
            limits: Limits::default(),
        }
    }

    pub fn with_timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn timeout_message(&self) -> &str {
        &self.timeout_message
    }

    /// Run `filtered` in a new namespace.
    ///
    /// Fails with [`SandboxError::Timeout`] when the deadline passes and
    /// [`SandboxError::RuntimeFault`] when the submission raises. Either way
    /// the partial namespace is dropped.
    pub fn execute(&self, filtered: &FilteredModule) -> Result<Namespace, SandboxError> {
        debug!(
            deadline_ms = self.deadline.as_millis() as u64,
            statements = filtered.body().len(),
            "executing submission"
        );
        let token = CancelToken::new();
        let mut evaluator = Evaluator::new()
            .with_limits(self.limits.clone())
            .with_cancel_token(token.clone())
            .with_allowed_imports(filtered.allowed().iter());
        evaluator.set_global("__name__", Value::str(MODULE_NAME));

        // A failed run drops its namespace on the execution thread.
        let result = {
            let _watchdog = Watchdog::arm(token, self.deadline);
            on_execution_stack(move || evaluator.run(filtered.body()).map(|()| evaluator))?
        };
        let evaluator = result.map_err(|err| self.failure(err))?;
        Ok(Namespace { evaluator })
    }

    /// Invoke an extracted function under a fresh deadline.
    pub fn call(
        &self,
        namespace: &mut Namespace,
        callable: &Callable,
        args: Vec<Value>,
    ) -> Result<Value, SandboxError> {
        debug!(
            function = callable.name(),
            args = args.len(),
            deadline_ms = self.deadline.as_millis() as u64,
            "calling submission function"
        );
        self.guarded(namespace, move |ev| ev.call(callable.value(), args))
    }

    /// `repr()` of a value, which may run a submission's `__repr__`.
    pub fn repr(&self, namespace: &mut Namespace, value: &Value) -> Result<String, SandboxError> {
        self.guarded(namespace, |ev| ev.repr(value))
    }

    fn guarded<T>(
        &self,
        namespace: &mut Namespace,
        run: impl FnOnce(&mut Evaluator) -> Result<T, EvalError>,
    ) -> Result<T, SandboxError> {
        let token = CancelToken::new();
        namespace.evaluator.set_cancel_token(token.clone());
        let evaluator = &mut namespace.evaluator;
        let result = {
            let _watchdog = Watchdog::arm(token, self.deadline);
            on_execution_stack(move || run(evaluator))?
        };
        result.map_err(|err| self.failure(err))
    }

    fn failure(&self, err: EvalError) -> SandboxError {
        match err {
            EvalError::Cancelled => {
                warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "submission exceeded its deadline"
                );
                SandboxError::Timeout(self.timeout_message.clone())
            }
            EvalError::Exception(exc) => {
                let description = exc.describe();
                warn!(fault = %description, "submission raised an exception");
                SandboxError::RuntimeFault(description)
            }
            other => {
                warn!(fault = %other, "control flow escaped the submission");
                SandboxError::RuntimeFault(other.to_string())
            }
        }
    }
}

/// Interpreter state crossing to the execution thread and back.
struct Handoff<T>(T);

// SAFETY: the owning thread stays blocked in `thread::scope` while the
// execution thread holds the handoff, so the `Rc`-based values inside are
// never touched by two threads at once, and joining orders every access.
// The interpreter keeps no thread-local state.
unsafe impl<T> Send for Handoff<T> {}

impl<T> Handoff<T> {
    fn into_inner(self) -> T {
        self.0
    }
}

/// Run `work` on a dedicated thread with [`EXECUTION_STACK_SIZE`] of stack,
/// blocking until it finishes.
pub(crate) fn on_execution_stack<T>(work: impl FnOnce() -> T) -> Result<T, SandboxError> {
    let work = Handoff(work);
    std::thread::scope(|scope| -> Result<T, SandboxError> {
        let handle = std::thread::Builder::new()
            .name("gradecraft-exec".into())
            .stack_size(EXECUTION_STACK_SIZE)
            .spawn_scoped(scope, move || Handoff(work.into_inner()()))
            .map_err(|err| {
                warn!(error = %err, "could not start execution thread");
                SandboxError::RuntimeFault(format!("could not start execution thread: {err}"))
            })?;
        match handle.join() {
            Ok(result) => Ok(result.into_inner()),
            Err(_) => {
                warn!("execution thread panicked");
                Err(SandboxError::RuntimeFault("execution thread panicked".into()))
            }
        }
    })
}

/// Run `filtered` under `deadline` with the default timeout message.
pub fn execute(filtered: &FilteredModule, deadline: Duration) -> Result<Namespace, SandboxError> {
    Executor::new(deadline).execute(filtered)
}
