use std::fmt;

use serde_json::Value;

use crate::core::document::Document;
use crate::core::{KeyValue, Result, RouterError, ShardKey};

/// The ordered field list a namespace is partitioned by, e.g. `{files_id: 1, n: 1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPattern {
    spec: Document,
}

impl KeyPattern {
    pub fn new(spec: Document) -> Result<Self> {
        if spec.is_empty() {
            return Err(RouterError::BadValue(
                "partition key pattern must have at least one field".to_string(),
            ));
        }
        for (field, direction) in &spec {
            if field.is_empty() || field.starts_with('$') {
                return Err(RouterError::BadValue(format!(
                    "invalid partition key field '{}'",
                    field
                )));
            }
            let valid = match direction {
                Value::Number(n) => n.as_f64() == Some(1.0),
                Value::String(s) => s == "hashed",
                _ => false,
            };
            if !valid {
                return Err(RouterError::BadValue(format!(
                    "partition key field '{}' must be 1 or \"hashed\", got {}",
                    field, direction
                )));
            }
        }
        Ok(Self { spec })
    }

    /// Ascending key over the given fields.
    pub fn ascending(fields: &[&str]) -> Result<Self> {
        let mut spec = Document::new();
        for field in fields {
            spec.insert((*field).to_string(), Value::from(1));
        }
        Self::new(spec)
    }

    pub fn to_document(&self) -> &Document {
        &self.spec
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.spec.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.spec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spec.is_empty()
    }

    pub fn is_hashed_field(&self, field: &str) -> bool {
        matches!(self.spec.get(field), Some(Value::String(s)) if s == "hashed")
    }

    /// Field-for-field identity with `other`, including order.
    ///
    /// Numeric directions compare by value, so `1` and `1.0` agree.
    pub fn matches_exactly(&self, other: &Document) -> bool {
        self.spec.len() == other.len()
            && self
                .spec
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && same_direction(va, vb))
    }

    /// True when `doc` holds exactly the key fields, in any order.
    pub fn is_shard_key(&self, doc: &Document) -> bool {
        doc.len() == self.spec.len() && self.spec.keys().all(|field| doc.contains_key(field))
    }

    /// Reorders a shard-key document into key-pattern order.
    pub fn normalize(&self, doc: &Document) -> Result<ShardKey> {
        if !self.is_shard_key(doc) {
            return Err(RouterError::BadValue(format!(
                "{} does not have shard key {}",
                Value::Object(doc.clone()),
                self
            )));
        }
        Ok(self
            .spec
            .keys()
            .map(|field| KeyValue::from_json(&doc[field]))
            .collect())
    }

    pub fn global_min(&self) -> ShardKey {
        vec![KeyValue::MinKey; self.spec.len()]
    }

    pub fn global_max(&self) -> ShardKey {
        vec![KeyValue::MaxKey; self.spec.len()]
    }
}

fn same_direction(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.spec.clone()))
    }
}
