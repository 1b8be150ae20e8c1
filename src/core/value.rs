use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Value};

use crate::core::collation::Collation;

/// Position of a value's type in the cross-type sort order.
///
/// `null < numbers < strings < objects < arrays < booleans`.
pub fn canonical_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 6,
    }
}

/// Total order over JSON values under a collation.
///
/// Values of different types compare by [`canonical_rank`]. Only string
/// comparisons (including strings nested in objects and arrays) consult the
/// collation; field names always compare byte-wise.
pub fn compare_values(a: &Value, b: &Value, collation: &Collation) -> Ordering {
    let rank = canonical_rank(a).cmp(&canonical_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => collation.compare_str(x, y),
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y, collation),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right, collation);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    // NaN sorts below every other number.
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn compare_objects(x: &Map<String, Value>, y: &Map<String, Value>, collation: &Collation) -> Ordering {
    for ((key_a, val_a), (key_b, val_b)) in x.iter().zip(y.iter()) {
        let ord = canonical_rank(val_a)
            .cmp(&canonical_rank(val_b))
            .then_with(|| key_a.cmp(key_b))
            .then_with(|| compare_values(val_a, val_b, collation));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

/// True when `value` contains a string anywhere, which makes its ordering collation-sensitive.
pub fn contains_string(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => items.iter().any(contains_string),
        Value::Object(map) => map.values().any(contains_string),
        _ => false,
    }
}

/// One component of a partition key, extended with the key-space sentinels.
#[derive(Debug, Clone)]
pub enum KeyValue {
    MinKey,
    Value(Value),
    MaxKey,
}

impl KeyValue {
    /// Reads `{"$minKey": 1}` / `{"$maxKey": 1}` sentinels; anything else is a plain value.
    pub fn from_json(value: &Value) -> Self {
        if let Value::Object(map) = value {
            if map.len() == 1 && map.contains_key("$minKey") {
                return Self::MinKey;
            }
            if map.len() == 1 && map.contains_key("$maxKey") {
                return Self::MaxKey;
            }
        }
        Self::Value(value.clone())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::MinKey => serde_json::json!({"$minKey": 1}),
            Self::MaxKey => serde_json::json!({"$maxKey": 1}),
            Self::Value(v) => v.clone(),
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::MinKey, Self::MinKey) | (Self::MaxKey, Self::MaxKey) => Ordering::Equal,
            (Self::MinKey, _) | (_, Self::MaxKey) => Ordering::Less,
            (_, Self::MinKey) | (Self::MaxKey, _) => Ordering::Greater,
            (Self::Value(a), Self::Value(b)) => compare_values(a, b, &Collation::simple()),
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinKey => write!(f, "MinKey"),
            Self::MaxKey => write!(f, "MaxKey"),
            Self::Value(v) => write!(f, "{}", v),
        }
    }
}

/// A point in key space: one [`KeyValue`] per key-pattern field, compared lexicographically.
pub type ShardKey = Vec<KeyValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cross_type_order_is_canonical() {
        let simple = Collation::simple();
        assert_eq!(compare_values(&json!(null), &json!(0), &simple), Ordering::Less);
        assert_eq!(compare_values(&json!(99), &json!("a"), &simple), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!({}), &simple), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!(false), &simple), Ordering::Less);
    }

    #[test]
    fn integers_and_doubles_compare_numerically() {
        let simple = Collation::simple();
        assert_eq!(compare_values(&json!(2), &json!(2.5), &simple), Ordering::Less);
        assert_eq!(compare_values(&json!(3.0), &json!(3), &simple), Ordering::Equal);
    }

    #[test]
    fn nested_strings_use_collation() {
        let ci = Collation::locale("en", 2).unwrap();
        assert_eq!(
            compare_values(&json!({"a": "X"}), &json!({"a": "x"}), &ci),
            Ordering::Equal
        );
        assert!(contains_string(&json!([1, {"k": "v"}])));
        assert!(!contains_string(&json!([1, {"k": 2}])));
    }

    #[test]
    fn sentinels_bound_every_value() {
        let v = KeyValue::Value(json!(true));
        assert!(KeyValue::MinKey < v);
        assert!(v < KeyValue::MaxKey);
        assert_eq!(KeyValue::from_json(&json!({"$maxKey": 1})), KeyValue::MaxKey);
    }
}
