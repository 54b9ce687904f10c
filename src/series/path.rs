use serde_json::{Number, Value};

/// Resolve a dotted path like `a.b.c` inside a record. Numeric segments index
/// into arrays.
pub fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text contribution of a group field to a series key. Missing and falsy values
/// (`null`, `false`, `0`, `""`) contribute nothing.
pub fn key_fragment(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::Bool(true)) => "true".to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Number(n)) => whole_number(n).unwrap_or_else(|| n.to_string()),
        Some(other) => other.to_string(),
    }
}

/// Floats without a fractional part print without one, so `2020.0` keys as `2020`.
fn whole_number(n: &Number) -> Option<String> {
    if n.is_i64() || n.is_u64() {
        return None;
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < 1e15)
        .map(|f| (f as i64).to_string())
}

/// Numeric contribution of a measure field. Anything that is not a number, a
/// numeric string or `true` counts as zero.
pub fn numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    }
}
