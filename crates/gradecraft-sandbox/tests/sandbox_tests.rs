//! End-to-end tests of the sandbox stages: validate → filter → execute →
//! extract, plus the inspector on the same trees.

use std::time::{Duration, Instant};

use gradecraft_sandbox::{
    calls, execute, extract, filter, has_arity, parse, returns, AllowList, Executor,
    FilteredModule, Limits, SandboxError, Value, MODULE_NAME,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const STACK: usize = 64 * 1024 * 1024;

fn filtered(source: &str, allowed: &[&str]) -> FilteredModule {
    let module = parse(source).expect("test source parses");
    filter(&module, &AllowList::new(allowed.iter().copied())).expect("imports allowed")
}

/// Run `body` on a thread with room for deep interpreter recursion.
fn on_big_stack<T: Send + 'static>(body: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(STACK)
        .spawn(body)
        .expect("spawn")
        .join()
        .expect("sandbox thread panicked")
}

/// Execute `source` and report the outcome as a plain string error.
fn run(source: &'static str, deadline: Duration) -> Result<Vec<String>, SandboxError> {
    on_big_stack(move || {
        let tree = filtered(source, &["math"]);
        execute(&tree, deadline).map(|ns| ns.names())
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Execution
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn namespace_holds_definitions_and_the_module_sentinel() {
    let result = on_big_stack(|| {
        let tree = filtered(
            "import math\nRATE = 0.5\ndef area(r):\n    return math.pi * r * r\nprint('hidden')\n",
            &["math"],
        );
        let ns = execute(&tree, Duration::from_secs(1)).map_err(|e| e.to_string())?;
        let name = ns.get("__name__").and_then(|v| v.as_str().map(str::to_string));
        Ok::<_, String>((ns.contains("area"), ns.contains("RATE"), name, ns.output().to_string()))
    });
    assert_eq!(
        result,
        Ok((true, true, Some(MODULE_NAME.to_string()), String::new()))
    );
}

#[test]
fn main_guard_never_runs() {
    let names = run(
        "def main():\n    while True:\n        pass\nif __name__ == '__main__':\n    main()\n",
        Duration::from_secs(1),
    )
    .expect("guarded main is dropped");
    assert!(names.contains(&"main".to_string()));
}

#[test]
fn zero_deadline_times_out_immediately() {
    let err = run("x = 1\n", Duration::ZERO).unwrap_err();
    assert_eq!(err, SandboxError::Timeout("Timeout".into()));
}

#[test]
fn infinite_loop_times_out_within_a_bounded_margin() {
    let start = Instant::now();
    let err = run(
        "def spin():\n    while True:\n        pass\nx = spin()\n",
        Duration::from_millis(200),
    )
    .unwrap_err();
    assert_eq!(err, SandboxError::Timeout("Timeout".into()));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn timeout_cannot_be_caught_by_submission_code() {
    let source = "\
def stubborn():
    while True:
        try:
            while True:
                pass
        except BaseException:
            pass
x = stubborn()
";
    let err = run(source, Duration::from_millis(100)).unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)));
}

#[test]
fn custom_timeout_message_is_carried_verbatim() {
    let err = on_big_stack(|| {
        let tree = filtered("def f():\n    while True:\n        pass\nx = f()\n", &[]);
        Executor::new(Duration::from_millis(50))
            .with_timeout_message("Your code took too long")
            .execute(&tree)
            .map(|_| ())
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "Your code took too long");
}

#[test]
fn uncaught_exception_is_a_runtime_fault() {
    let err = run("def f():\n    return 1 / 0\nx = f()\n", Duration::from_secs(1)).unwrap_err();
    match err {
        SandboxError::RuntimeFault(description) => {
            assert!(description.starts_with("ZeroDivisionError: division by zero"), "{description}");
            assert!(description.contains("line 2"), "{description}");
        }
        other => panic!("expected a runtime fault, got {other:?}"),
    }
}

#[test]
fn runtime_imports_are_held_to_the_allow_list() {
    let err = run(
        "def f():\n    import string\n    return 1\nx = f()\n",
        Duration::from_secs(1),
    )
    .unwrap_err();
    match err {
        SandboxError::RuntimeFault(description) => {
            assert!(description.starts_with("ImportError: Attempted to import string"), "{description}")
        }
        other => panic!("expected a runtime fault, got {other:?}"),
    }
}

#[test]
fn executions_never_share_bindings() {
    let result = on_big_stack(|| {
        let tree = filtered("counter = []\ndef add(x):\n    counter.append(x)\n    return len(counter)\n", &[]);
        let executor = Executor::new(Duration::from_secs(1));
        let mut first = executor.execute(&tree).map_err(|e| e.to_string())?;
        let add = extract(&first, "add").map_err(|e| e.to_string())?;
        executor.call(&mut first, &add, vec![Value::Int(1)]).map_err(|e| e.to_string())?;
        executor.call(&mut first, &add, vec![Value::Int(2)]).map_err(|e| e.to_string())?;

        let mut second = executor.execute(&tree).map_err(|e| e.to_string())?;
        let add = extract(&second, "add").map_err(|e| e.to_string())?;
        let len = executor.call(&mut second, &add, vec![Value::Int(3)]).map_err(|e| e.to_string())?;
        Ok::<_, String>(len.as_int())
    });
    assert_eq!(result, Ok(Some(1)));
}

#[test]
fn called_functions_get_their_own_deadline_and_output() {
    let result = on_big_stack(|| {
        let tree = filtered(
            "def greet(name):\n    print('hi', name)\n    return len(name)\ndef hang():\n    while True:\n        pass\n",
            &[],
        );
        let executor = Executor::new(Duration::from_millis(100));
        let mut ns = executor.execute(&tree).map_err(|e| e.to_string())?;
        let greet = extract(&ns, "greet").map_err(|e| e.to_string())?;
        let n = executor
            .call(&mut ns, &greet, vec![Value::str("ann")])
            .map_err(|e| e.to_string())?;
        let printed = ns.take_output();
        let hang = extract(&ns, "hang").map_err(|e| e.to_string())?;
        let timed_out = executor.call(&mut ns, &hang, Vec::new());
        Ok::<_, String>((n.as_int(), printed, timed_out.map(|_| ()).map_err(|e| e.to_string())))
    });
    assert_eq!(
        result,
        Ok((Some(3), "hi ann\n".to_string(), Err("Timeout".to_string())))
    );
}

#[test]
fn memory_hungry_code_is_stopped() {
    let err = on_big_stack(|| {
        let tree = filtered("x = list(range(10 ** 9))\n", &[]);
        Executor::new(Duration::from_secs(5))
            .with_limits(Limits::default())
            .execute(&tree)
            .map(|_| ())
    })
    .unwrap_err();
    assert!(err.to_string().starts_with("MemoryError"), "{err}");
}

#[test]
fn runaway_recursion_is_a_fault_on_the_default_test_thread() {
    let tree = filtered("def f(n):\n    return f(n + 1)\nx = f(0)\n", &[]);
    match Executor::new(Duration::from_secs(5)).execute(&tree) {
        Err(SandboxError::RuntimeFault(description)) => {
            assert!(description.starts_with("RecursionError"), "{description}")
        }
        other => panic!("expected a recursion fault, got {other:?}"),
    }
}

#[test]
fn called_recursion_is_a_fault_on_the_default_test_thread() {
    let tree = filtered(
        "def depth(n):\n    return 0 if n == 0 else 1 + depth(n - 1)\n",
        &[],
    );
    let executor = Executor::new(Duration::from_secs(5));
    let mut ns = executor.execute(&tree).expect("definitions run");
    let depth = extract(&ns, "depth").expect("depth is defined");

    let shallow = executor.call(&mut ns, &depth, vec![Value::Int(150)]).expect("within limit");
    assert_eq!(shallow.as_int(), Some(150));
    match executor.call(&mut ns, &depth, vec![Value::Int(100_000)]) {
        Err(SandboxError::RuntimeFault(description)) => {
            assert!(description.starts_with("RecursionError"), "{description}")
        }
        other => panic!("expected a recursion fault, got {other:?}"),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Extraction
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn extraction_distinguishes_missing_and_uncallable() {
    let result = on_big_stack(|| {
        let tree = filtered("LIMIT = 3\ndef f():\n    return LIMIT\nclass Box:\n    pass\n", &[]);
        let ns = execute(&tree, Duration::from_secs(1)).map_err(|e| e.to_string())?;
        Ok::<_, String>((
            extract(&ns, "f").map(|c| c.name().to_string()),
            extract(&ns, "Box").map(|c| c.name().to_string()),
            extract(&ns, "g").map(|c| c.name().to_string()),
            extract(&ns, "LIMIT").map(|c| c.name().to_string()),
        ))
    })
    .expect("executes");
    assert_eq!(result.0, Ok("f".to_string()));
    assert_eq!(result.1, Ok("Box".to_string()));
    assert_eq!(result.2.unwrap_err().to_string(), "Function 'g' not found.");
    assert_eq!(result.3.unwrap_err().to_string(), "Function 'LIMIT' is not callable.");
}

// ══════════════════════════════════════════════════════════════════════════════
// Inspection
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn inspector_runs_even_when_execution_times_out() {
    let source = "\
def helper(x):
    return x * 2

def main(a, b):
    while True:
        helper(a)

result = main(1, 2)
";
    let tree = filtered(source, &[]);
    assert!(has_arity(&tree, "main", 2));
    assert!(calls(&tree, "main", "helper"));
    assert!(returns(&tree, "helper"));
    assert!(!returns(&tree, "main"));

    let err = on_big_stack(move || execute(&tree, Duration::from_millis(100)).map(|_| ())).unwrap_err();
    assert!(matches!(err, SandboxError::Timeout(_)));
}

#[test]
fn inspector_answers_false_for_unknown_functions() {
    let tree = filtered("x = 1\n", &[]);
    assert!(!has_arity(&tree, "x", 0));
    assert!(!calls(&tree, "x", "y"));
    assert!(!returns(&tree, "x"));
}
