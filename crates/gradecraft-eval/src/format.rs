//! String formatting: the format-spec mini-language shared by f-strings,
//! `format()` and `str.format`, plus `%`-style templates.
//!
//! Everything here works on plain numbers and strings. Rendering a value that
//! needs user code (`__str__`) is the interpreter's job; it hands the result
//! to [`FormatSpec::format_str`].

use crate::value::float_repr;

/// A parsed `[[fill]align][sign][#][0][width][grouping][.precision][type]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormatSpec {
    pub fill: char,
    pub align: Option<char>,
    pub sign: Option<char>,
    pub alternate: bool,
    pub width: usize,
    pub grouping: Option<char>,
    pub precision: Option<usize>,
    pub kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: None,
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

const ALIGNS: &str = "<>=^";
const KINDS: &str = "bcdeEfFgGnosxX%";

impl FormatSpec {
    pub(crate) fn parse(spec: &str) -> Result<Self, String> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;

        if chars.len() >= 2 && ALIGNS.contains(chars[1]) {
            out.fill = chars[0];
            out.align = Some(chars[1]);
            i = 2;
        } else if !chars.is_empty() && ALIGNS.contains(chars[0]) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
            out.sign = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            if out.align.is_none() {
                out.fill = '0';
                out.align = Some('=');
            }
            i += 1;
        }
        let (width, next) = digits(&chars, i);
        out.width = width.unwrap_or(0);
        i = next;
        if let Some(&c @ (',' | '_')) = chars.get(i) {
            out.grouping = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1);
            if precision.is_none() {
                return Err("Format specifier missing precision".into());
            }
            out.precision = precision;
            i = next;
        }
        if let Some(&c) = chars.get(i) {
            if KINDS.contains(c) {
                out.kind = Some(c);
                i += 1;
            }
        }
        if i != chars.len() {
            return Err("Invalid format specifier".into());
        }
        Ok(out)
    }

    // ── Strings ───────────────────────────────────────────────────────────

    pub(crate) fn format_str(&self, s: &str) -> Result<String, String> {
        match self.kind {
            None | Some('s') => {}
            Some(k) => return Err(format!("Unknown format code '{k}' for object of type 'str'")),
        }
        if self.sign.is_some() {
            return Err("Sign not allowed in string format specifier".into());
        }
        if self.align == Some('=') {
            return Err("'=' alignment not allowed in string format specifier".into());
        }
        let body: String = match self.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.to_string(),
        };
        Ok(self.pad("", &body, '<'))
    }

    // ── Integers ──────────────────────────────────────────────────────────

    pub(crate) fn format_int(&self, n: i64) -> Result<String, String> {
        let (radix, prefix) = match self.kind {
            None | Some('d') | Some('n') => (10, ""),
            Some('b') => (2, "0b"),
            Some('o') => (8, "0o"),
            Some('x') => (16, "0x"),
            Some('X') => (16, "0X"),
            Some('c') => {
                let ch = u32::try_from(n)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| "%c arg not in range(0x110000)".to_string())?;
                return Ok(self.pad("", &ch.to_string(), '<'));
            }
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return self.format_float(n as f64),
            Some(k) => return Err(format!("Unknown format code '{k}' for object of type 'int'")),
        };
        if self.precision.is_some() {
            return Err("Precision not allowed in integer format specifier".into());
        }
        let magnitude = n.unsigned_abs();
        let mut digits = match radix {
            2 => format!("{magnitude:b}"),
            8 => format!("{magnitude:o}"),
            16 => format!("{magnitude:x}"),
            _ => magnitude.to_string(),
        };
        if self.kind == Some('X') {
            digits = digits.to_uppercase();
        }
        if let Some(sep) = self.grouping {
            let every = if radix == 10 { 3 } else { 4 };
            digits = group(&digits, sep, every);
        }
        let prefix = if self.alternate { prefix } else { "" };
        let head = format!("{}{prefix}", self.sign_for(n < 0));
        Ok(self.pad(&head, &digits, '>'))
    }

    // ── Floats ────────────────────────────────────────────────────────────

    pub(crate) fn format_float(&self, x: f64) -> Result<String, String> {
        let upper = matches!(self.kind, Some('E' | 'F' | 'G'));
        let negative = x.is_sign_negative() && !x.is_nan();
        let abs = x.abs();
        let mut body = if !abs.is_finite() {
            let word = if abs.is_nan() { "nan" } else { "inf" };
            let word = if upper { word.to_uppercase() } else { word.to_string() };
            if self.kind == Some('%') {
                format!("{word}%")
            } else {
                word
            }
        } else {
            match self.kind {
                Some('f' | 'F') => format!("{:.*}", self.precision.unwrap_or(6), abs),
                Some('e' | 'E') => scientific(abs, self.precision.unwrap_or(6), self.alternate),
                Some('g' | 'G') => general(abs, self.precision.unwrap_or(6), self.alternate, false),
                Some('%') => format!("{:.*}%", self.precision.unwrap_or(6), abs * 100.0),
                None | Some('n') => match self.precision {
                    Some(p) => general(abs, p, self.alternate, true),
                    None => float_repr(abs),
                },
                Some(k) => {
                    return Err(format!("Unknown format code '{k}' for object of type 'float'"))
                }
            }
        };
        if upper {
            body = body.to_uppercase();
        }
        if let Some(sep) = self.grouping {
            let split = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
            let (int_part, rest) = body.split_at(split);
            body = format!("{}{rest}", group(int_part, sep, 3));
        }
        let head = self.sign_for(negative);
        Ok(self.pad(head, &body, '>'))
    }

    fn sign_for(&self, negative: bool) -> &'static str {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, Some('+')) => "+",
            (false, Some(' ')) => " ",
            _ => "",
        }
    }

    /// Pad `head` (sign and radix prefix) plus `body` to the field width.
    fn pad(&self, head: &str, body: &str, default_align: char) -> String {
        let len = head.chars().count() + body.chars().count();
        if len >= self.width {
            return format!("{head}{body}");
        }
        let fill_len = self.width - len;
        let fill = |n: usize| self.fill.to_string().repeat(n);
        match self.align.unwrap_or(default_align) {
            '<' => format!("{head}{body}{}", fill(fill_len)),
            '^' => {
                let left = fill_len / 2;
                format!("{}{head}{body}{}", fill(left), fill(fill_len - left))
            }
            '=' => format!("{head}{}{body}", fill(fill_len)),
            _ => format!("{}{head}{body}", fill(fill_len)),
        }
    }
}

fn digits(chars: &[char], mut i: usize) -> (Option<usize>, usize) {
    let start = i;
    let mut value = 0usize;
    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(d as usize);
        i += 1;
    }
    if i == start {
        (None, i)
    } else {
        (Some(value), i)
    }
}

fn group(digits: &str, sep: char, every: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(chars.len() + chars.len() / every);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

/// `e` formatting: `1.500000e+03`.
fn scientific(x: f64, precision: usize, alternate: bool) -> String {
    let raw = format!("{:.*e}", precision, x);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((&raw, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let point = if alternate && precision == 0 { "." } else { "" };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{point}e{sign}{:02}", exp.abs())
}

/// `g` formatting. With `keep_point`, fixed notation keeps at least one
/// digit after the decimal point, as the empty presentation type does.
fn general(x: f64, precision: usize, alternate: bool, keep_point: bool) -> String {
    let p = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let raw = format!("{:.*e}", p - 1, x);
        raw.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    if -4 <= exp && exp < p as i32 {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let mut s = format!("{:.*}", decimals, x);
        if !alternate && s.contains('.') {
            s = s.trim_end_matches('0').trim_end_matches('.').to_string();
        }
        if keep_point && !s.contains('.') {
            s.push_str(".0");
        }
        s
    } else {
        let s = scientific(x, p - 1, alternate);
        if alternate {
            return s;
        }
        match s.split_once('e') {
            Some((mantissa, exp)) if mantissa.contains('.') => {
                let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
                format!("{mantissa}e{exp}")
            }
            _ => s,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// `%` templates
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PercentPiece {
    Literal(String),
    /// A directive such as `%-8.2f`; `conversion` is the final character.
    Directive { spec: FormatSpec, conversion: char },
}

pub(crate) fn parse_percent(template: &str) -> Result<Vec<PercentPiece>, String> {
    let chars: Vec<char> = template.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            literal.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if chars.get(i) == Some(&'%') {
            literal.push('%');
            i += 1;
            continue;
        }
        let mut spec = FormatSpec::default();
        let mut left = false;
        let mut zero = false;
        while let Some(&c @ ('-' | '+' | ' ' | '#' | '0')) = chars.get(i) {
            match c {
                '-' => left = true,
                '0' => zero = true,
                '#' => spec.alternate = true,
                _ => spec.sign = Some(c),
            }
            i += 1;
        }
        let (width, next) = digits(&chars, i);
        spec.width = width.unwrap_or(0);
        i = next;
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1);
            spec.precision = Some(precision.unwrap_or(0));
            i = next;
        }
        let Some(&conversion) = chars.get(i) else {
            return Err("incomplete format".into());
        };
        spec.kind = match conversion {
            'd' | 'i' | 'u' => Some('d'),
            'x' | 'X' | 'o' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' | 'c' => Some(conversion),
            's' | 'r' | 'a' => None,
            other => {
                return Err(format!(
                    "unsupported format character '{other}' (0x{:x}) at index {i}",
                    other as u32
                ))
            }
        };
        if matches!(spec.kind, Some('d' | 'x' | 'X' | 'o' | 'c')) {
            spec.precision = None;
        }
        spec.align = Some(if left {
            '<'
        } else if zero && spec.kind.is_some() {
            spec.fill = '0';
            '='
        } else {
            '>'
        });
        if !literal.is_empty() {
            pieces.push(PercentPiece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(PercentPiece::Directive { spec, conversion });
        i += 1;
    }
    if !literal.is_empty() {
        pieces.push(PercentPiece::Literal(literal));
    }
    Ok(pieces)
}

// ══════════════════════════════════════════════════════════════════════════════
// `str.format` templates
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePiece {
    Literal(String),
    /// `{name!conversion:spec}`; `name` is empty for automatic numbering.
    Field {
        name: String,
        conversion: Option<char>,
        spec: String,
    },
}

pub(crate) fn parse_template(template: &str) -> Result<Vec<TemplatePiece>, String> {
    let chars: Vec<char> = template.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err("Single '}' encountered in format string".into()),
            '{' => {
                let mut depth = 1;
                let mut j = i + 1;
                while j < chars.len() {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(if depth > 1 {
                        "expected '}' before end of string".into()
                    } else {
                        "Single '{' encountered in format string".into()
                    });
                }
                let field: String = chars[i + 1..j].iter().collect();
                if !literal.is_empty() {
                    pieces.push(TemplatePiece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(parse_field(&field)?);
                i = j + 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        pieces.push(TemplatePiece::Literal(literal));
    }
    Ok(pieces)
}

fn parse_field(field: &str) -> Result<TemplatePiece, String> {
    let name_end = field.find(['!', ':']).unwrap_or(field.len());
    let name = field[..name_end].to_string();
    let rest = &field[name_end..];
    let (conversion, spec) = match rest.strip_prefix('!') {
        Some(after) => {
            let mut it = after.chars();
            let conversion = it.next();
            let tail = it.as_str();
            match conversion {
                Some('r' | 's' | 'a') => {}
                Some(c) => return Err(format!("Unknown conversion specifier {c}")),
                None => return Err("end of string while looking for conversion specifier".into()),
            }
            let spec = match tail.strip_prefix(':') {
                Some(spec) => spec.to_string(),
                None if tail.is_empty() => String::new(),
                None => return Err("expected ':' after conversion specifier".into()),
            };
            (conversion, spec)
        }
        None => (None, rest.strip_prefix(':').unwrap_or("").to_string()),
    };
    Ok(TemplatePiece::Field {
        name,
        conversion,
        spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt_float(x: f64, spec: &str) -> String {
        FormatSpec::parse(spec).unwrap().format_float(x).unwrap()
    }

    fn fmt_int(n: i64, spec: &str) -> String {
        FormatSpec::parse(spec).unwrap().format_int(n).unwrap()
    }

    #[test]
    fn parses_full_spec() {
        let spec = FormatSpec::parse("*^+#012,.3f").unwrap();
        assert_eq!(spec.fill, '*');
        assert_eq!(spec.align, Some('^'));
        assert_eq!(spec.sign, Some('+'));
        assert!(spec.alternate);
        assert_eq!(spec.width, 12);
        assert_eq!(spec.grouping, Some(','));
        assert_eq!(spec.precision, Some(3));
        assert_eq!(spec.kind, Some('f'));
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(FormatSpec::parse(".f").is_err());
        assert!(FormatSpec::parse("5q").is_err());
    }

    #[test]
    fn float_presentations() {
        assert_eq!(fmt_float(3.14159, ".2f"), "3.14");
        assert_eq!(fmt_float(-3.14159, "8.3f"), "  -3.142");
        assert_eq!(fmt_float(1234.5, "e"), "1.234500e+03");
        assert_eq!(fmt_float(0.25, ".1%"), "25.0%");
        assert_eq!(fmt_float(1234567.0, ",.2f"), "1,234,567.00");
        assert_eq!(fmt_float(0.0001234, "g"), "0.0001234");
        assert_eq!(fmt_float(1234567.0, ".3"), "1.23e+06");
        assert_eq!(fmt_float(1.0, ".3"), "1.0");
        assert_eq!(fmt_float(2.5, ""), "2.5");
        assert_eq!(fmt_float(-1.5, "08.2f"), "-0001.50");
    }

    #[test]
    fn int_presentations() {
        assert_eq!(fmt_int(42, "5d"), "   42");
        assert_eq!(fmt_int(42, "<5"), "42   ");
        assert_eq!(fmt_int(42, "^6"), "  42  ");
        assert_eq!(fmt_int(255, "#x"), "0xff");
        assert_eq!(fmt_int(5, "08b"), "00000101");
        assert_eq!(fmt_int(-7, "+"), "-7");
        assert_eq!(fmt_int(7, "+"), "+7");
        assert_eq!(fmt_int(1234567, ","), "1,234,567");
        assert_eq!(fmt_int(3, ".2f"), "3.00");
    }

    #[test]
    fn string_presentations() {
        let spec = FormatSpec::parse(">6").unwrap();
        assert_eq!(spec.format_str("ab").unwrap(), "    ab");
        let spec = FormatSpec::parse(".2").unwrap();
        assert_eq!(spec.format_str("abcdef").unwrap(), "ab");
        let spec = FormatSpec::parse("d").unwrap();
        assert_eq!(
            spec.format_str("x").unwrap_err(),
            "Unknown format code 'd' for object of type 'str'"
        );
    }

    #[test]
    fn percent_templates() {
        let pieces = parse_percent("%-5s|%05.1f%%").unwrap();
        assert_eq!(pieces.len(), 4);
        assert!(matches!(&pieces[0], PercentPiece::Directive { conversion: 's', spec } if spec.align == Some('<') && spec.width == 5));
        assert_eq!(pieces[3], PercentPiece::Literal("%".into()));
        assert_eq!(parse_percent("%").unwrap_err(), "incomplete format");
        assert!(parse_percent("%q").is_err());
    }

    #[test]
    fn format_templates() {
        let pieces = parse_template("{} + {name!r:>4} = {{x}}").unwrap();
        assert_eq!(
            pieces,
            vec![
                TemplatePiece::Field { name: String::new(), conversion: None, spec: String::new() },
                TemplatePiece::Literal(" + ".into()),
                TemplatePiece::Field { name: "name".into(), conversion: Some('r'), spec: ">4".into() },
                TemplatePiece::Literal(" = {x}".into()),
            ]
        );
        assert!(parse_template("oops }").is_err());
        assert!(parse_template("{0").is_err());
    }
}
