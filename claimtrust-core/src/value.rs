//! Total accessors over untyped claim records
//!
//! Claim results arrive as arbitrary JSON. Every accessor here returns a
//! safe default (`None`, an empty vector) on a missing key or a type
//! mismatch and never panics. Null and non-finite numbers count as absent.

use serde_json::{Map, Value};

/// Non-null value under `key`
pub fn field<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record.get(key).filter(|v| !v.is_null())
}

/// Whether `key` holds a non-null value
pub fn has_field(record: &Value, key: &str) -> bool {
    field(record, key).is_some()
}

/// Coerce a scalar to a trimmed, non-empty string. Numbers and booleans are
/// rendered; arrays and objects are not strings.
pub fn as_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Coerce a scalar to a finite number. Numeric strings are parsed.
pub fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn str_field(record: &Value, key: &str) -> Option<String> {
    field(record, key).and_then(as_string)
}

/// First present string among alternative key spellings
pub fn first_str(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| str_field(record, k))
}

pub fn num_field(record: &Value, key: &str) -> Option<f64> {
    field(record, key).and_then(as_number)
}

/// First present number among alternative key spellings
pub fn first_num(record: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| num_field(record, k))
}

pub fn bool_field(record: &Value, key: &str) -> Option<bool> {
    match field(record, key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Strings under `key`. An array keeps its scalar elements; a single
/// string is split on commas.
pub fn string_array(record: &Value, key: &str) -> Vec<String> {
    match field(record, key) {
        Some(Value::Array(items)) => items.iter().filter_map(as_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// First non-empty string array among alternative keys
pub fn first_string_array(record: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .map(|k| string_array(record, k))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Numeric elements under `key`; non-numeric elements are skipped
pub fn num_array(record: &Value, key: &str) -> Vec<f64> {
    match field(record, key) {
        Some(Value::Array(items)) => items.iter().filter_map(as_number).collect(),
        _ => Vec::new(),
    }
}

/// First non-empty numeric array among alternative keys
pub fn first_num_array(record: &Value, keys: &[&str]) -> Vec<f64> {
    keys.iter()
        .map(|k| num_array(record, k))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Object elements under `key`; other elements are skipped
pub fn object_array<'a>(record: &'a Value, key: &str) -> Vec<&'a Map<String, Value>> {
    match field(record, key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

/// A rectangular-or-not numeric matrix. `None` unless every row is an
/// array of numbers.
pub fn num_matrix(record: &Value, key: &str) -> Option<Vec<Vec<f64>>> {
    let rows = field(record, key)?.as_array()?;
    rows.iter()
        .map(|row| {
            row.as_array()?
                .iter()
                .map(as_number)
                .collect::<Option<Vec<f64>>>()
        })
        .collect()
}

/// Every finite number anywhere inside `value`
pub fn collect_numbers(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Number(_) => {
            if let Some(n) = as_number(value) {
                out.push(n);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_numbers(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_numbers(v, out)),
        _ => {}
    }
}

/// JSON type name for error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_str_field_coerces_scalars() {
        let record = json!({"a": " BRCA1 ", "b": 42, "c": "", "d": [1], "e": null});
        assert_eq!(str_field(&record, "a"), Some("BRCA1".to_string()));
        assert_eq!(str_field(&record, "b"), Some("42".to_string()));
        assert_eq!(str_field(&record, "c"), None);
        assert_eq!(str_field(&record, "d"), None);
        assert_eq!(str_field(&record, "e"), None);
        assert_eq!(str_field(&record, "missing"), None);
    }

    #[test]
    fn test_num_field_parses_strings() {
        let record = json!({"p": "0.03", "q": 1e-8, "r": "abc", "s": true});
        assert_eq!(num_field(&record, "p"), Some(0.03));
        assert_eq!(num_field(&record, "q"), Some(1e-8));
        assert_eq!(num_field(&record, "r"), None);
        assert_eq!(num_field(&record, "s"), None);
    }

    #[test]
    fn test_string_array_accepts_csv() {
        let record = json!({"tools": "blast, hmmer,,", "dbs": ["uniprot", 3, {"x": 1}]});
        assert_eq!(string_array(&record, "tools"), vec!["blast", "hmmer"]);
        assert_eq!(string_array(&record, "dbs"), vec!["uniprot", "3"]);
        assert!(string_array(&record, "none").is_empty());
    }

    #[test]
    fn test_num_matrix_rejects_ragged_types() {
        let good = json!({"s": [[1, 0, -1], [0, 1, "2"]]});
        assert_eq!(
            num_matrix(&good, "s"),
            Some(vec![vec![1.0, 0.0, -1.0], vec![0.0, 1.0, 2.0]])
        );
        let bad = json!({"s": [[1, "x"]]});
        assert_eq!(num_matrix(&bad, "s"), None);
    }

    #[test]
    fn test_collect_numbers_recurses() {
        let mut out = Vec::new();
        collect_numbers(&json!({"a": [1, {"b": 2.5}], "c": "3"}), &mut out);
        assert_eq!(out, vec![1.0, 2.5]);
    }
}
