//! Native modules: `math` and `string`.

use std::collections::BTreeMap;
use std::rc::Rc;

use gradecraft_types::ast::BinOp;

use crate::builtins::{arity, float_to_int, int_arg, Kwargs};
use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::value::{NativeModule, Value};

/// Modules that `import` can resolve.
pub const NATIVE_MODULES: &[&str] = &["math", "string"];

const MATH_FUNCTIONS: &[&str] = &[
    "math.acos",
    "math.asin",
    "math.atan",
    "math.atan2",
    "math.ceil",
    "math.comb",
    "math.copysign",
    "math.cos",
    "math.degrees",
    "math.exp",
    "math.fabs",
    "math.factorial",
    "math.floor",
    "math.fmod",
    "math.fsum",
    "math.gcd",
    "math.hypot",
    "math.isclose",
    "math.isfinite",
    "math.isinf",
    "math.isnan",
    "math.isqrt",
    "math.lcm",
    "math.log",
    "math.log10",
    "math.log2",
    "math.perm",
    "math.pow",
    "math.prod",
    "math.radians",
    "math.sin",
    "math.sqrt",
    "math.tan",
    "math.trunc",
];

const ASCII_LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const ASCII_UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;
const WHITESPACE: &str = " \t\n\r\x0b\x0c";

/// Build a fresh module object for `import`.
pub(crate) fn load(name: &str) -> Option<Rc<NativeModule>> {
    let (name, attrs) = match name {
        "math" => ("math", math_attrs()),
        "string" => ("string", string_attrs()),
        _ => return None,
    };
    Some(Rc::new(NativeModule { name, attrs }))
}

fn math_attrs() -> BTreeMap<&'static str, Value> {
    let mut attrs: BTreeMap<&'static str, Value> = MATH_FUNCTIONS
        .iter()
        .map(|&qualified| (&qualified["math.".len()..], Value::Builtin(qualified)))
        .collect();
    attrs.insert("pi", Value::Float(std::f64::consts::PI));
    attrs.insert("e", Value::Float(std::f64::consts::E));
    attrs.insert("tau", Value::Float(std::f64::consts::TAU));
    attrs.insert("inf", Value::Float(f64::INFINITY));
    attrs.insert("nan", Value::Float(f64::NAN));
    attrs
}

fn string_attrs() -> BTreeMap<&'static str, Value> {
    let letters = format!("{ASCII_LOWERCASE}{ASCII_UPPERCASE}");
    let printable = format!("{DIGITS}{letters}{PUNCTUATION}{WHITESPACE}");
    BTreeMap::from([
        ("ascii_letters", Value::str(&letters)),
        ("ascii_lowercase", Value::str(ASCII_LOWERCASE)),
        ("ascii_uppercase", Value::str(ASCII_UPPERCASE)),
        ("digits", Value::str(DIGITS)),
        ("hexdigits", Value::str("0123456789abcdefABCDEF")),
        ("octdigits", Value::str("01234567")),
        ("punctuation", Value::str(PUNCTUATION)),
        ("whitespace", Value::str(WHITESPACE)),
        ("printable", Value::str(printable)),
    ])
}

// ══════════════════════════════════════════════════════════════════════════════
// math
// ══════════════════════════════════════════════════════════════════════════════

fn real(ev: &Evaluator, value: &Value) -> EvalResult<f64> {
    match value.as_float() {
        Some(f) => Ok(f),
        None => ev.raise(
            "TypeError",
            format!("must be real number, not {}", value.type_name()),
        ),
    }
}

/// A float result, mapping NaN and infinity produced from ordinary inputs to
/// Python's domain and range errors.
fn checked(ev: &Evaluator, inputs: &[f64], result: f64) -> EvalResult<Value> {
    let ordinary = inputs.iter().all(|x| x.is_finite());
    if result.is_nan() && !inputs.iter().any(|x| x.is_nan()) {
        return ev.raise("ValueError", "math domain error");
    }
    if result.is_infinite() && ordinary {
        return ev.raise("OverflowError", "math range error");
    }
    Ok(Value::Float(result))
}

fn unary_float(
    ev: &Evaluator,
    name: &str,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> EvalResult<Value> {
    arity(ev, name, args, 1, 1)?;
    let x = real(ev, &args[0])?;
    checked(ev, &[x], f(x))
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

fn overflow<T>(ev: &Evaluator) -> EvalResult<T> {
    ev.raise("OverflowError", "integer overflow")
}

/// `n! / (n - k)!`, failing on overflow.
fn falling_factorial(ev: &Evaluator, n: i64, k: i64) -> EvalResult<i64> {
    let mut result: i64 = 1;
    for i in 0..k {
        result = match result.checked_mul(n - i) {
            Some(r) => r,
            None => return overflow(ev),
        };
    }
    Ok(result)
}

fn non_negative(ev: &Evaluator, name: &str, value: &Value, what: &str) -> EvalResult<i64> {
    let n = int_arg(ev, value)?;
    if n < 0 {
        return ev.raise("ValueError", format!("{name}() {what} must be a non-negative integer"));
    }
    Ok(n)
}

pub(crate) fn call_math(
    ev: &mut Evaluator,
    name: &str,
    args: Vec<Value>,
    kwargs: &mut Kwargs,
) -> EvalResult<Value> {
    match name {
        "sqrt" => unary_float(ev, name, &args, f64::sqrt),
        "exp" => unary_float(ev, name, &args, f64::exp),
        "sin" => unary_float(ev, name, &args, f64::sin),
        "cos" => unary_float(ev, name, &args, f64::cos),
        "tan" => unary_float(ev, name, &args, f64::tan),
        "asin" => unary_float(ev, name, &args, f64::asin),
        "acos" => unary_float(ev, name, &args, f64::acos),
        "atan" => unary_float(ev, name, &args, f64::atan),
        "fabs" => unary_float(ev, name, &args, f64::abs),
        "degrees" => unary_float(ev, name, &args, f64::to_degrees),
        "radians" => unary_float(ev, name, &args, f64::to_radians),
        "log2" | "log10" => {
            arity(ev, name, &args, 1, 1)?;
            let x = real(ev, &args[0])?;
            if x <= 0.0 {
                return ev.raise("ValueError", "math domain error");
            }
            Ok(Value::Float(if name == "log2" { x.log2() } else { x.log10() }))
        }
        "log" => {
            arity(ev, name, &args, 1, 2)?;
            let x = real(ev, &args[0])?;
            let base = match args.get(1) {
                Some(base) => Some(real(ev, base)?),
                None => None,
            };
            if x <= 0.0 || base.is_some_and(|b| b <= 0.0) {
                return ev.raise("ValueError", "math domain error");
            }
            match base {
                Some(b) if b == 1.0 => ev.raise("ZeroDivisionError", "float division by zero"),
                Some(b) => Ok(Value::Float(x.ln() / b.ln())),
                None => Ok(Value::Float(x.ln())),
            }
        }
        "pow" => {
            arity(ev, name, &args, 2, 2)?;
            let x = real(ev, &args[0])?;
            let y = real(ev, &args[1])?;
            if x == 0.0 && y < 0.0 {
                return ev.raise("ValueError", "math domain error");
            }
            checked(ev, &[x, y], x.powf(y))
        }
        "atan2" | "copysign" => {
            arity(ev, name, &args, 2, 2)?;
            let y = real(ev, &args[0])?;
            let x = real(ev, &args[1])?;
            Ok(Value::Float(if name == "atan2" { y.atan2(x) } else { y.copysign(x) }))
        }
        "fmod" => {
            arity(ev, name, &args, 2, 2)?;
            let x = real(ev, &args[0])?;
            let y = real(ev, &args[1])?;
            if y == 0.0 || x.is_infinite() {
                return ev.raise("ValueError", "math domain error");
            }
            Ok(Value::Float(x % y))
        }
        "hypot" => {
            let mut total = 0.0_f64;
            let mut coords = Vec::with_capacity(args.len());
            for arg in &args {
                let x = real(ev, arg)?;
                coords.push(x);
                total = total.hypot(x);
            }
            checked(ev, &coords, total)
        }
        "floor" | "ceil" | "trunc" => {
            arity(ev, name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                other => {
                    let x = real(ev, other)?;
                    let rounded = match name {
                        "floor" => x.floor(),
                        "ceil" => x.ceil(),
                        _ => x.trunc(),
                    };
                    float_to_int(ev, rounded)
                }
            }
        }
        "factorial" => {
            arity(ev, name, &args, 1, 1)?;
            let n = int_arg(ev, &args[0])?;
            if n < 0 {
                return ev.raise("ValueError", "factorial() not defined for negative values");
            }
            falling_factorial(ev, n, n).map(Value::Int)
        }
        "gcd" | "lcm" => {
            let mut acc = if name == "gcd" { 0 } else { 1 };
            for arg in &args {
                let n = int_arg(ev, arg)?;
                acc = if name == "gcd" {
                    gcd(acc, n)
                } else if acc == 0 || n == 0 {
                    0
                } else {
                    match (acc / gcd(acc, n)).checked_mul(n) {
                        Some(m) => m.abs(),
                        None => return overflow(ev),
                    }
                };
            }
            Ok(Value::Int(acc))
        }
        "isqrt" => {
            arity(ev, name, &args, 1, 1)?;
            let n = int_arg(ev, &args[0])?;
            if n < 0 {
                return ev.raise("ValueError", "isqrt() argument must be nonnegative");
            }
            let mut root = (n as f64).sqrt() as i64;
            while root.checked_mul(root).map_or(true, |sq| sq > n) {
                root -= 1;
            }
            while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
                root += 1;
            }
            Ok(Value::Int(root))
        }
        "comb" | "perm" => {
            arity(ev, name, &args, if name == "comb" { 2 } else { 1 }, 2)?;
            let n = non_negative(ev, name, &args[0], "n")?;
            let k = match args.get(1) {
                Some(Value::None) | None => n,
                Some(k) => non_negative(ev, name, k, "k")?,
            };
            if k > n {
                return Ok(Value::Int(0));
            }
            if name == "perm" {
                return falling_factorial(ev, n, k).map(Value::Int);
            }
            let k = k.min(n - k);
            let mut result: i64 = 1;
            for i in 0..k {
                result = match result.checked_mul(n - i) {
                    Some(r) => r / (i + 1),
                    None => return overflow(ev),
                };
            }
            Ok(Value::Int(result))
        }
        "isnan" | "isinf" | "isfinite" => {
            arity(ev, name, &args, 1, 1)?;
            let x = real(ev, &args[0])?;
            Ok(Value::Bool(match name {
                "isnan" => x.is_nan(),
                "isinf" => x.is_infinite(),
                _ => x.is_finite(),
            }))
        }
        "isclose" => {
            arity(ev, name, &args, 2, 2)?;
            let a = real(ev, &args[0])?;
            let b = real(ev, &args[1])?;
            let rel_tol = match kwargs.take("rel_tol") {
                Some(v) => real(ev, &v)?,
                None => 1e-9,
            };
            let abs_tol = match kwargs.take("abs_tol") {
                Some(v) => real(ev, &v)?,
                None => 0.0,
            };
            if rel_tol < 0.0 || abs_tol < 0.0 {
                return ev.raise("ValueError", "tolerances must be non-negative");
            }
            let close = a == b
                || (a.is_finite()
                    && b.is_finite()
                    && (a - b).abs() <= (rel_tol * b.abs()).max(rel_tol * a.abs()).max(abs_tol));
            Ok(Value::Bool(close))
        }
        "fsum" => {
            arity(ev, name, &args, 1, 1)?;
            let items = ev.collect_values(&args[0])?;
            // Neumaier summation keeps the low-order bits plain addition drops.
            let mut sum = 0.0_f64;
            let mut compensation = 0.0_f64;
            for item in &items {
                let x = real(ev, item)?;
                let t = sum + x;
                compensation += if sum.abs() >= x.abs() {
                    (sum - t) + x
                } else {
                    (x - t) + sum
                };
                sum = t;
            }
            Ok(Value::Float(sum + compensation))
        }
        "prod" => {
            arity(ev, name, &args, 1, 1)?;
            let mut acc = kwargs.take("start").unwrap_or(Value::Int(1));
            for item in ev.collect_values(&args[0])? {
                acc = ev.binary(BinOp::Mul, acc, item)?;
            }
            Ok(acc)
        }
        _ => ev.raise(
            "AttributeError",
            format!("module 'math' has no attribute '{name}'"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_math_function_is_exported() {
        let module = load("math").expect("math loads");
        for qualified in MATH_FUNCTIONS {
            let short = qualified.trim_start_matches("math.");
            assert!(module.attrs.contains_key(short), "{short} missing");
        }
        assert!(module.attrs.contains_key("pi"));
    }

    #[test]
    fn string_constants_match_python() {
        let module = load("string").expect("string loads");
        assert_eq!(module.attrs["digits"].as_str(), Some("0123456789"));
        assert_eq!(module.attrs["ascii_letters"].as_str().map(str::len), Some(52));
        assert_eq!(module.attrs["printable"].as_str().map(str::len), Some(100));
    }

    #[test]
    fn unknown_modules_do_not_load() {
        assert!(load("os").is_none());
        assert!(NATIVE_MODULES.iter().all(|m| load(m).is_some()));
    }

    #[test]
    fn gcd_ignores_signs() {
        assert_eq!(gcd(-12, 18), 6);
        assert_eq!(gcd(0, 5), 5);
    }
}
