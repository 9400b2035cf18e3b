//! Integration tests for the gradecraft interpreter.
//!
//! Programs are parsed with `gradecraft-parser` and run on a thread with a
//! generous stack, the way the grader runs submissions. Results are reduced
//! to plain strings before they leave that thread.

use gradecraft_eval::{CancelToken, EvalError, Evaluator, Limits, Value};
use gradecraft_parser::parse_source;
use gradecraft_types::ast::Module;
use gradecraft_types::SourceFile;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const STACK: usize = 64 * 1024 * 1024;

fn parse(source: &str) -> Module {
    let sf = SourceFile::new("test.py", source);
    let result = parse_source(&sf);
    match result.module {
        Some(module) => module,
        None => panic!(
            "parse errors: {:?}",
            result
                .errors
                .items
                .iter()
                .map(|e| e.message.clone())
                .collect::<Vec<_>>()
        ),
    }
}

/// Outcome of one run: printed output, or the uncaught exception as
/// `(type, message, line)`.
#[derive(Debug, PartialEq)]
enum Outcome {
    Printed(String),
    Raised(String, String, Option<u32>),
    Cancelled,
}

fn run_with(source: &str, setup: impl FnOnce(Evaluator) -> Evaluator + Send + 'static) -> Outcome {
    let source = source.to_string();
    std::thread::Builder::new()
        .stack_size(STACK)
        .spawn(move || {
            let module = parse(&source);
            let mut ev = setup(Evaluator::new());
            match ev.run(&module.body) {
                Ok(()) => Outcome::Printed(ev.take_output()),
                Err(EvalError::Exception(exc)) => {
                    Outcome::Raised(exc.type_name.clone(), exc.message.clone(), exc.line)
                }
                Err(EvalError::Cancelled) => Outcome::Cancelled,
                Err(other) => panic!("control flow escaped the module: {other:?}"),
            }
        })
        .expect("spawn")
        .join()
        .expect("interpreter thread panicked")
}

fn run(source: &str) -> Outcome {
    run_with(source, |ev| ev)
}

fn output(source: &str) -> String {
    match run(source) {
        Outcome::Printed(out) => out,
        other => panic!("expected clean run, got {other:?}"),
    }
}

/// `(type, message)` of the uncaught exception.
fn raised(source: &str) -> (String, String) {
    match run(source) {
        Outcome::Raised(kind, message, _) => (kind, message),
        other => panic!("expected an exception, got {other:?}"),
    }
}

fn assert_raises(source: &str, kind: &str, message: &str) {
    assert_eq!(raised(source), (kind.to_string(), message.to_string()));
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn arithmetic_follows_python_rules() {
    assert_eq!(
        output("print(7 // 2, -7 // 2, 7 % -3, 2 ** 10, 7 / 2)"),
        "3 -4 -2 1024 3.5\n"
    );
    assert_eq!(output("print(0.1 + 0.2, 1e16, 2.0)"), "0.30000000000000004 1e+16 2.0\n");
    assert_eq!(output("print(1 < 2 < 3, 1 < 3 < 2)"), "True False\n");
}

#[test]
fn integer_errors() {
    assert_raises("x = 1 // 0", "ZeroDivisionError", "integer division or modulo by zero");
    assert_raises("x = 1 / 0", "ZeroDivisionError", "division by zero");
    assert_raises("x = 2 ** 64", "OverflowError", "integer overflow");
}

#[test]
fn string_methods() {
    assert_eq!(
        output(r#"print("a,b,,c".split(","), "  hi ".strip(), "-".join(["x", "y"]), "abc".upper())"#),
        "['a', 'b', '', 'c'] hi x-y ABC\n"
    );
    assert_eq!(
        output(r#"print("hello world".title(), "abc".center(7, "*"), "42".zfill(5))"#),
        "Hello World **abc** 00042\n"
    );
    assert_eq!(output(r#"print("banana".find("na"), "banana".rfind("na"), "banana".count("a"))"#), "2 4 3\n");
    assert_raises(r#"x = "abc".index("z")"#, "ValueError", "substring not found");
    assert_raises(
        r#"x = ", ".join([1, 2])"#,
        "TypeError",
        "sequence item 0: expected str instance, int found",
    );
}

#[test]
fn formatting() {
    assert_eq!(
        output("x = 3.14159\nprint(f\"{x:.2f}|{'hi'!r}|{42:>5}\")"),
        "3.14|'hi'|   42\n"
    );
    assert_eq!(output(r#"print("{} + {} = {total}".format(1, 2, total=3))"#), "1 + 2 = 3\n");
    assert_eq!(output(r#"print("%s is %d years" % ("Ann", 30))"#), "Ann is 30 years\n");
    assert_eq!(
        output(r#"print(repr("it's"), [1, 'a', None])"#),
        "\"it's\" [1, 'a', None]\n"
    );
}

#[test]
fn round_handles_extreme_ndigits() {
    assert_eq!(
        output(
            "print(round(1e308, -400), round(-5.5, -400), round(1e308, -1000000))\n\
             print(round(1e-320, 400) == 1e-320, round(2.675, 400) == 2.675)\n\
             print(round(123.456, -1), round(2.5), round(1234, -2))\n"
        ),
        "0.0 -0.0 0.0\nTrue True\n120.0 2 1200\n"
    );
}

#[test]
fn comprehensions_and_builtins() {
    assert_eq!(
        output("print([x * x for x in range(5) if x % 2 == 0], {k: v for k, v in zip('ab', [1, 2])})"),
        "[0, 4, 16] {'a': 1, 'b': 2}\n"
    );
    assert_eq!(
        output("print(sorted(['bb', 'a', 'ccc'], key=len, reverse=True))"),
        "['ccc', 'bb', 'a']\n"
    );
    assert_eq!(
        output("print(sum([1, 2, 3]), max(3, 9, 4), min('hello'), abs(-2.5), round(2.5), round(3.14159, 2))"),
        "6 9 e 2.5 2 3.14\n"
    );
    assert_eq!(output("print(list(enumerate('ab', 1)))"), "[(1, 'a'), (2, 'b')]\n");
    assert_eq!(output("print(any([]), all([]), len({1, 2, 2}))"), "False True 2\n");
}

#[test]
fn slicing() {
    assert_eq!(
        output("xs = [0, 1, 2, 3, 4, 5]\nprint(xs[1:4], xs[::-2], xs[-2:], 'hello'[::-1])"),
        "[1, 2, 3] [5, 3, 1] [4, 5] olleh\n"
    );
    assert_raises("xs = [1, 2]\ny = xs[::0]", "ValueError", "slice step cannot be zero");
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn unpacking() {
    assert_eq!(output("a, *b = [1, 2, 3]\nprint(a, b)"), "1 [2, 3]\n");
    assert_eq!(output("a, b = b, a = 1, 2\nprint(a, b)"), "2 1\n");
    assert_raises(
        "a, b = [1, 2, 3]",
        "ValueError",
        "too many values to unpack (expected 2)",
    );
    assert_raises(
        "a, b, c = [1, 2]",
        "ValueError",
        "not enough values to unpack (expected 3, got 2)",
    );
}

#[test]
fn loops_with_else() {
    let source = "\
for n in range(2, 10):
    for d in range(2, n):
        if n % d == 0:
            break
    else:
        print(n, end=' ')
print()
i = 0
while i < 3:
    i += 1
else:
    print('done', i)
";
    assert_eq!(output(source), "2 3 5 7 \ndone 3\n");
}

#[test]
fn resizing_a_dict_or_set_while_iterating_fails() {
    assert_raises(
        "d = {'a': 1, 'b': 2}\nfor k in d:\n    d[k + '!'] = 0\n",
        "RuntimeError",
        "dictionary changed size during iteration",
    );
    assert_raises(
        "d = {'a': 1}\nfor k in d:\n    del d[k]\n",
        "RuntimeError",
        "dictionary changed size during iteration",
    );
    assert_raises(
        "s = {1, 2}\nfor x in s:\n    s.add(x + 10)\n",
        "RuntimeError",
        "Set changed size during iteration",
    );
    // Updating values in place keeps the size.
    assert_eq!(
        output("d = {'a': 1, 'b': 2}\nfor k in d:\n    d[k] *= 10\nprint(d)\nfor k in list(d):\n    del d[k]\nprint(d)\n"),
        "{'a': 10, 'b': 20}\n{}\n"
    );
}

#[test]
fn closures_and_nonlocal() {
    let source = "\
def counter():
    count = 0
    def step():
        nonlocal count
        count += 1
        return count
    return step

c = counter()
c()
c()
print(c())
total = 0
def bump():
    global total
    total += 5
bump()
print(total)
";
    assert_eq!(output(source), "3\n5\n");
}

#[test]
fn unbound_local_is_reported() {
    let source = "\
x = 1
def f():
    print(x)
    x = 2
f()
";
    let (kind, message) = raised(source);
    assert_eq!(kind, "UnboundLocalError");
    assert!(message.contains("'x'"), "{message}");
}

#[test]
fn default_and_keyword_arguments() {
    let source = "\
def greet(name, greeting='Hello', *rest, punct='!', **extra):
    return f'{greeting}, {name}{punct} {rest} {extra}'
print(greet('Ann'))
print(greet('Bob', 'Hi', 1, 2, punct='?', mood='ok'))
";
    assert_eq!(
        output(source),
        "Hello, Ann! () {}\nHi, Bob? (1, 2) {'mood': 'ok'}\n"
    );
    assert_raises(
        "def f(a, b):\n    pass\nf(1)",
        "TypeError",
        "f() missing 1 required positional argument: 'b'",
    );
    assert_raises(
        "def f(a):\n    pass\nf(1, 2)",
        "TypeError",
        "f() takes 1 positional argument but 2 were given",
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Classes
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn inheritance_and_super() {
    let source = "\
class Animal:
    def __init__(self, name):
        self.name = name
    def speak(self):
        return '...'
    def __str__(self):
        return f'{self.name} says {self.speak()}'

class Dog(Animal):
    def __init__(self, name):
        super().__init__(name)
        self.tricks = []
    def speak(self):
        return 'woof'

d = Dog('rex')
print(d)
print(isinstance(d, Animal), type(d).__name__)
";
    assert_eq!(output(source), "rex says woof\nTrue Dog\n");
}

#[test]
fn dunder_methods() {
    let source = "\
class Point:
    def __init__(self, x, y):
        self.x = x
        self.y = y
    def __eq__(self, other):
        return self.x == other.x and self.y == other.y
    def __add__(self, other):
        return Point(self.x + other.x, self.y + other.y)
    def __repr__(self):
        return f'Point({self.x}, {self.y})'

print(Point(1, 2) + Point(3, 4), Point(1, 1) == Point(1, 1), [Point(0, 0)])
";
    assert_eq!(output(source), "Point(4, 6) True [Point(0, 0)]\n");
}

#[test]
fn properties_and_static_methods() {
    let source = "\
class Temp:
    scale = 'C'
    def __init__(self, c):
        self._c = c
    @property
    def f(self):
        return self._c * 9 / 5 + 32
    @staticmethod
    def unit():
        return 'deg'
    @classmethod
    def make(cls):
        return cls(100)

t = Temp.make()
print(t.f, Temp.unit(), t.scale)
";
    assert_eq!(output(source), "212.0 deg C\n");
}

// ══════════════════════════════════════════════════════════════════════════════
// Exceptions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn try_except_else_finally_order() {
    let source = "\
def f(x):
    try:
        r = 10 // x
    except ZeroDivisionError as e:
        print('caught', e)
        return -1
    else:
        return r
    finally:
        print('done')

print(f(0))
print(f(5))
";
    assert_eq!(
        output(source),
        "caught integer division or modulo by zero\ndone\n-1\ndone\n2\n"
    );
}

#[test]
fn custom_exceptions_and_reraise() {
    let source = "\
class InsufficientFunds(ValueError):
    pass

def withdraw(balance, amount):
    if amount > balance:
        raise InsufficientFunds(f'need {amount - balance} more')
    return balance - amount

try:
    withdraw(10, 25)
except ValueError as e:
    print(type(e).__name__, e)

try:
    try:
        {}['k']
    except KeyError:
        raise
except Exception as e:
    print(repr(e))
";
    assert_eq!(output(source), "InsufficientFunds need 15 more\nKeyError('k')\n");
}

#[test]
fn uncaught_exception_carries_line() {
    let outcome = run("xs = [1, 2]\nprint(xs[5])\n");
    assert_eq!(
        outcome,
        Outcome::Raised("IndexError".into(), "list index out of range".into(), Some(2))
    );
    assert_raises("print(y)", "NameError", "name 'y' is not defined");
    assert_raises("assert 1 == 2, 'nope'", "AssertionError", "nope");
    assert_raises("x = int('abc')", "ValueError", "invalid literal for int() with base 10: 'abc'");
}

// ══════════════════════════════════════════════════════════════════════════════
// Imports
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn native_modules() {
    assert_eq!(
        output("import math\nfrom string import digits\nprint(math.sqrt(16), math.floor(2.7), digits)"),
        "4.0 2 0123456789\n"
    );
    assert_raises("import math\nmath.sqrt(-1)", "ValueError", "math domain error");
    assert_raises("import os", "ModuleNotFoundError", "No module named 'os'");
}

#[test]
fn runtime_imports_respect_the_allow_list() {
    let source = "\
def sneaky():
    import string
    return string.digits
sneaky()
";
    let outcome = run_with(source, |ev| ev.with_allowed_imports(["math"]));
    assert_eq!(
        outcome,
        Outcome::Raised(
            "ImportError".into(),
            "Attempted to import string".into(),
            Some(2)
        )
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Limits and cancellation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn cancelled_token_stops_before_the_first_statement() {
    let outcome = run_with("print('never')", |ev| {
        ev.with_cancel_token(CancelToken::cancelled())
    });
    assert_eq!(outcome, Outcome::Cancelled);
}

#[test]
fn cancellation_from_another_thread_interrupts_a_loop() {
    let token = CancelToken::new();
    let remote = token.clone();
    let handle = std::thread::Builder::new()
        .stack_size(STACK)
        .spawn(move || {
            let module = parse("while True:\n    pass\n");
            let mut ev = Evaluator::new().with_cancel_token(token);
            matches!(ev.run(&module.body), Err(EvalError::Cancelled))
        })
        .expect("spawn");
    std::thread::sleep(std::time::Duration::from_millis(50));
    remote.cancel();
    assert!(handle.join().expect("join"));
}

#[test]
fn runaway_recursion_raises_recursion_error() {
    assert_raises(
        "def f(n):\n    return f(n + 1)\nf(0)",
        "RecursionError",
        "maximum recursion depth exceeded",
    );
}

#[test]
fn huge_allocations_raise_memory_error() {
    assert_eq!(raised("x = [0] * 10 ** 8").0, "MemoryError");
    assert_eq!(raised("x = 'ab' * 10 ** 9").0, "MemoryError");
}

#[test]
fn oversized_format_fields_raise_memory_error() {
    assert_eq!(raised("x = f'{1:>99999999999999}'").0, "MemoryError");
    assert_eq!(raised("x = f'{1:>1000000000}'").0, "MemoryError");
    assert_eq!(raised("x = '{:<99999999999}'.format('a')").0, "MemoryError");
    assert_eq!(raised("x = format(2.5, '.99999999999f')").0, "MemoryError");
    assert_eq!(raised("x = '%99999999999d' % 5").0, "MemoryError");
    assert_eq!(output("s = 'ab'\nprint(f'{7:>4}|{s:*^6}|{3.14159:.2f}')"), "   7|**ab**|3.14\n");
}

#[test]
fn self_referencing_containers_compare_without_crashing() {
    let cycles = "a = []\na.append(a)\nb = []\nb.append(b)\n";
    assert_raises(
        &format!("{cycles}x = a == b"),
        "RecursionError",
        "maximum recursion depth exceeded in comparison",
    );
    assert_raises(
        &format!("{cycles}x = a < b"),
        "RecursionError",
        "maximum recursion depth exceeded in comparison",
    );
    assert_eq!(output(&format!("{cycles}print(a == a, a in [a], b != b)")), "True True False\n");
}

#[test]
fn deeply_nested_keys_cannot_be_hashed() {
    assert_raises(
        "t = ()\nfor _ in range(1000):\n    t = (t,)\nd = {t: 1}",
        "RecursionError",
        "maximum recursion depth exceeded while hashing",
    );
    assert_raises(
        "t = ()\nfor _ in range(1000):\n    t = (t,)\nprint(t)",
        "RecursionError",
        "maximum recursion depth exceeded while getting the repr of an object",
    );
}

#[test]
fn printed_output_is_capped() {
    let outcome = std::thread::Builder::new()
        .stack_size(STACK)
        .spawn(|| {
            let module = parse("print('x' * 100)");
            let mut ev = Evaluator::new().with_limits(Limits {
                max_output_bytes: 10,
                ..Limits::default()
            });
            ev.run(&module.body).map_err(|e| e.to_string())?;
            Ok::<_, String>((ev.output().to_string(), ev.output_truncated()))
        })
        .expect("spawn")
        .join()
        .expect("join");
    assert_eq!(outcome, Ok(("x".repeat(10), true)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Host API
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn host_can_call_defined_functions() {
    let result = std::thread::Builder::new()
        .stack_size(STACK)
        .spawn(|| {
            let module = parse("def add(a, b=10):\n    return a + b\n");
            let mut ev = Evaluator::new();
            ev.run(&module.body).map_err(|e| e.to_string())?;
            let add = ev.global("add").ok_or("add not defined")?;
            let five = ev.call(&add, vec![Value::Int(2), Value::Int(3)]).map_err(|e| e.to_string())?;
            let twelve = ev.call(&add, vec![Value::Int(2)]).map_err(|e| e.to_string())?;
            Ok::<_, String>((five.as_int(), twelve.as_int()))
        })
        .expect("spawn")
        .join()
        .expect("join");
    assert_eq!(result, Ok((Some(5), Some(12))));
}

#[test]
fn builtin_names_include_types_and_exceptions() {
    let names = gradecraft_eval::builtin_names();
    for expected in ["print", "len", "int", "ValueError", "Exception"] {
        assert!(names.contains(&expected), "{expected} missing");
    }
}

#[test]
fn runs_are_deterministic() {
    let source = "\
s = {3, 1, 2, 'a', 'b'}
d = {'z': 1, 'y': 2}
d['x'] = 3
print(sorted(s, key=str), list(d), d)
class K:
    pass
print(K.__name__)
";
    let first = output(source);
    for _ in 0..20 {
        assert_eq!(output(source), first);
    }
}
