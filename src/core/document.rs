//! Helpers over the ordered JSON documents used for command payloads and replies.

use serde_json::{Map, Value};

use crate::core::{Result, RouterError};

/// An ordered field → value mapping. Field order is preserved end to end.
pub type Document = Map<String, Value>;

/// Builds a document from a `json!` object literal; any other value yields an empty document.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Returns the first field of a command document, which names the command.
pub fn first_element(document: &Document) -> Option<(&str, &Value)> {
    document.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Boolean interpretation of a field value: `null`/absent, `false` and zero are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

pub fn field_truthy(document: &Document, field: &str) -> bool {
    document.get(field).is_some_and(is_truthy)
}

pub fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Integer view of a numeric value; doubles are truncated toward zero.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

/// Numeric field as `f64`, `0.0` when absent or not numeric.
pub fn number_or_zero(document: &Document, field: &str) -> f64 {
    document.get(field).and_then(as_f64).unwrap_or(0.0)
}

/// Numeric field as `i64`, `0` when absent or not numeric.
pub fn long_or_zero(document: &Document, field: &str) -> i64 {
    document.get(field).and_then(as_i64).unwrap_or(0)
}

/// Optional object field: absent or `null` is `None`, other non-objects are a type mismatch.
pub fn optional_object<'a>(document: &'a Document, field: &str) -> Result<Option<&'a Document>> {
    match document.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) => Ok(Some(obj)),
        Some(other) => Err(RouterError::TypeMismatch(format!(
            "\"{}\" had the wrong type. Expected object or null, found {}",
            field,
            type_name(other)
        ))),
    }
}

/// Required string field.
pub fn required_str<'a>(document: &'a Document, field: &str) -> Result<&'a str> {
    match document.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(RouterError::InvalidNamespace(format!(
            "'{}' must be of type String, found {}",
            field,
            type_name(other)
        ))),
        None => Err(RouterError::InvalidNamespace(format!(
            "'{}' must be of type String",
            field
        ))),
    }
}

/// Optional numeric field: absent or `null` is `None`, other non-numbers are a type mismatch.
pub fn optional_number(document: &Document, field: &str) -> Result<Option<f64>> {
    match document.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(RouterError::TypeMismatch(format!(
            "\"{}\" must be a number, found {}",
            field,
            type_name(other)
        ))),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "long",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Appends every field of `source` not already present in `target`.
pub fn append_unique(target: &mut Document, source: &Document, skip: &[&str]) {
    for (key, value) in source {
        if skip.contains(&key.as_str()) || target.contains_key(key) {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Builds a copy of `document` with `field` set, replacing any existing value in place.
pub fn with_field(document: &Document, field: &str, value: Value) -> Document {
    let mut out = document.clone();
    out.insert(field.to_string(), value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_follows_numeric_and_null_rules() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!(1.0)));
        assert!(is_truthy(&json!("x")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn optional_object_reports_type_mismatch() {
        let cmd = doc(json!({"distinct": "c", "query": 5}));
        let err = optional_object(&cmd, "query").unwrap_err();
        assert!(matches!(err, RouterError::TypeMismatch(_)));
        let cmd = doc(json!({"distinct": "c", "query": null}));
        assert!(optional_object(&cmd, "query").unwrap().is_none());
    }

    #[test]
    fn first_element_names_the_command() {
        let cmd = doc(json!({"collStats": "users", "scale": 1}));
        assert_eq!(first_element(&cmd).map(|(k, _)| k), Some("collStats"));
    }

    #[test]
    fn append_unique_keeps_first_value() {
        let mut target = doc(json!({"a": 1}));
        append_unique(&mut target, &doc(json!({"a": 2, "b": 3, "ok": 1})), &["ok"]);
        assert_eq!(target, doc(json!({"a": 1, "b": 3})));
    }
}
