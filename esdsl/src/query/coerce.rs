//! Coercion of loosely typed editor values
//!
//! Saved dashboards store numbers as strings, empty strings for "unset"
//! and so on. These helpers interpret them the way the editor does so a
//! given target always compiles to the same body.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn numeric_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]*$").expect("static regex"))
}

/// True for a non-empty, all-digit metric reference such as `"3"`
pub fn is_metric_ref(s: Option<&str>) -> bool {
    match s {
        Some(s) => !s.is_empty() && numeric_ref_regex().is_match(s),
        None => false,
    }
}

/// Editor truthiness: null, false, 0, NaN and "" are unset
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The value if set, otherwise `default`
pub fn or_default(value: Option<&Value>, default: Value) -> Value {
    match value {
        Some(v) if is_truthy(v) => v.clone(),
        _ => default,
    }
}

/// Parse the leading base-10 integer of a value.
///
/// Leading whitespace and a sign are accepted and trailing garbage is
/// ignored (`"10px"` is 10). Returns `None` when no digits lead the
/// string, or for values that are not strings or numbers.
pub fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }
}

fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let magnitude = digits[..end]
        .bytes()
        .fold(0i64, |acc, b| acc.saturating_mul(10).saturating_add((b - b'0') as i64));
    Some(if negative { -magnitude } else { magnitude })
}

/// Render a scalar editor value as an object key
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
