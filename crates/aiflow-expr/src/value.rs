//! Coercion rules shared by the evaluator.
//!
//! Values are `Option<serde_json::Value>` where `None` stands for an
//! unresolved field (`undefined`). Equality and ordering follow the loose,
//! coercive rules condition authors expect from the studio: `"1" == 1`,
//! `null == undefined`, numeric strings order numerically against numbers.

use std::cmp::Ordering;

use serde_json::Value;

/// Build a JSON number, keeping integral values as integers so they render
/// as `10` rather than `10.0`.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// String form used when a value is coerced to text (array joins, `contains`).
pub fn to_text(v: Option<&Value>) -> String {
    match v {
        None => "undefined".into(),
        Some(Value::Null) => "null".into(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| match i {
                Value::Null => String::new(),
                other => to_text(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".into(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion. `None` means NaN.
fn to_number(v: Option<&Value>) -> Option<f64> {
    match v {
        None => None,
        Some(Value::Null) => Some(0.0),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Some(0.0)
            } else {
                t.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => None,
    }
}

fn is_compound(v: &Value) -> bool {
    matches!(v, Value::Array(_) | Value::Object(_))
}

/// Loose equality (`==`).
pub fn loose_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => true,
        (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => false,
        (Some(x), Some(y)) => match (x, y) {
            (Value::String(s), Value::String(t)) => s == t,
            (Value::Bool(p), Value::Bool(q)) => p == q,
            (Value::Number(_), Value::Number(_))
            | (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_))
                if !is_compound(x) && !is_compound(y) =>
            {
                match (to_number(Some(x)), to_number(Some(y))) {
                    (Some(p), Some(q)) => p == q,
                    _ => false,
                }
            }
            _ if is_compound(x) && is_compound(y) => x == y,
            // Compound against primitive: compare via the compound's text form.
            _ if is_compound(x) => loose_eq(Some(&Value::String(to_text(Some(x)))), Some(y)),
            _ => loose_eq(Some(x), Some(&Value::String(to_text(Some(y))))),
        },
    }
}

/// Outcome of an ordering comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordered {
    Known(Ordering),
    /// At least one side coerced to NaN.
    Nan,
    /// An array or object took part in the comparison.
    Incomparable,
}

/// Ordering used by `>`, `>=`, `<`, `<=`.
pub fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordered {
    if a.is_some_and(is_compound) || b.is_some_and(is_compound) {
        return Ordered::Incomparable;
    }
    if let (Some(Value::String(s)), Some(Value::String(t))) = (a, b) {
        return Ordered::Known(s.cmp(t));
    }
    match (to_number(a), to_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).map_or(Ordered::Nan, Ordered::Known),
        _ => Ordered::Nan,
    }
}
