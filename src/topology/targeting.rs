//! Translates a query predicate into key-space intervals.
//!
//! The result is always a superset of the key space any matching document can
//! occupy: operators that do not narrow a field (`$ne`, `$regex`, `$exists`,
//! nested `$or`, ...) leave it unbounded, exclusive bounds are widened to
//! inclusive ones, and string bounds are dropped under a non-simple collation
//! because chunk boundaries are ordered by the simple collation. Under such a
//! collation string bounds are never intersected either: two bounds that
//! contradict byte-wise may still match the same documents.

use std::cmp::Ordering;

use serde_json::Value;

use crate::core::document::Document;
use crate::core::value::contains_string;
use crate::core::{Collation, KeyValue, ShardKey, compare_values};
use crate::topology::key_pattern::KeyPattern;

/// Above this many equality combinations the compound key is treated as unbounded.
const MAX_POINT_COMBINATIONS: usize = 512;

/// Inclusive interval `[min, max]` in key space.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInterval {
    pub min: ShardKey,
    pub max: ShardKey,
}

/// What a predicate says about one key field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBounds {
    Unbounded,
    Points(Vec<Value>),
    Range {
        lower: Option<Value>,
        upper: Option<Value>,
    },
    /// No value can satisfy the predicate.
    Empty,
}

impl FieldBounds {
    fn intersect(self, other: Self, collation: &Collation) -> Self {
        let simple = Collation::simple();
        match (self, other) {
            (Self::Empty, _) | (_, Self::Empty) => Self::Empty,
            (Self::Unbounded, b) | (b, Self::Unbounded) => b,
            (a, b) if !collation.is_simple() && (a.mentions_string() || b.mentions_string()) => Self::Unbounded,
            (Self::Points(a), Self::Points(b)) => {
                let kept: Vec<Value> = a
                    .into_iter()
                    .filter(|p| b.iter().any(|q| compare_values(p, q, &simple) == Ordering::Equal))
                    .collect();
                Self::points(kept)
            }
            (Self::Points(points), Self::Range { lower, upper })
            | (Self::Range { lower, upper }, Self::Points(points)) => {
                let kept: Vec<Value> = points
                    .into_iter()
                    .filter(|p| within(p, lower.as_ref(), upper.as_ref()))
                    .collect();
                Self::points(kept)
            }
            (
                Self::Range {
                    lower: lower_a,
                    upper: upper_a,
                },
                Self::Range {
                    lower: lower_b,
                    upper: upper_b,
                },
            ) => {
                let lower = pick(lower_a, lower_b, Ordering::Greater);
                let upper = pick(upper_a, upper_b, Ordering::Less);
                if let (Some(lo), Some(hi)) = (&lower, &upper) {
                    if compare_values(lo, hi, &simple) == Ordering::Greater {
                        return Self::Empty;
                    }
                }
                Self::Range { lower, upper }
            }
        }
    }

    fn points(points: Vec<Value>) -> Self {
        if points.is_empty() {
            Self::Empty
        } else {
            Self::Points(points)
        }
    }

    fn mentions_string(&self) -> bool {
        match self {
            Self::Points(points) => points.iter().any(contains_string),
            Self::Range { lower, upper } => {
                lower.as_ref().is_some_and(contains_string) || upper.as_ref().is_some_and(contains_string)
            }
            Self::Unbounded | Self::Empty => false,
        }
    }
}

fn within(value: &Value, lower: Option<&Value>, upper: Option<&Value>) -> bool {
    let simple = Collation::simple();
    lower.is_none_or(|lo| compare_values(value, lo, &simple) != Ordering::Less)
        && upper.is_none_or(|hi| compare_values(value, hi, &simple) != Ordering::Greater)
}

/// Keeps the tighter of two optional bounds; `prefer` is the ordering that wins.
fn pick(a: Option<Value>, b: Option<Value>, prefer: Ordering) -> Option<Value> {
    match (a, b) {
        (Some(x), Some(y)) => {
            if compare_values(&y, &x, &Collation::simple()) == prefer {
                Some(y)
            } else {
                Some(x)
            }
        }
        (x, None) => x,
        (None, y) => y,
    }
}

/// Bounds a single field-level predicate places on `field`.
fn bounds_from_predicate(predicate: &Value, collation: &Collation) -> FieldBounds {
    match predicate {
        Value::Array(_) => FieldBounds::Unbounded,
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            let mut bounds = FieldBounds::Unbounded;
            for (op, operand) in ops {
                let narrowed = match op.as_str() {
                    "$eq" => bounds_from_equality(operand),
                    "$in" => match operand {
                        Value::Array(items) if items.iter().all(is_plain_equality) => {
                            FieldBounds::points(items.clone())
                        }
                        _ => FieldBounds::Unbounded,
                    },
                    "$gt" | "$gte" => FieldBounds::Range {
                        lower: Some(operand.clone()),
                        upper: None,
                    },
                    "$lt" | "$lte" => FieldBounds::Range {
                        lower: None,
                        upper: Some(operand.clone()),
                    },
                    _ => FieldBounds::Unbounded,
                };
                bounds = bounds.intersect(narrowed, collation);
            }
            bounds
        }
        other => bounds_from_equality(other),
    }
}

fn bounds_from_equality(value: &Value) -> FieldBounds {
    if is_plain_equality(value) {
        FieldBounds::Points(vec![value.clone()])
    } else {
        FieldBounds::Unbounded
    }
}

fn is_plain_equality(value: &Value) -> bool {
    match value {
        Value::Array(_) => false,
        Value::Object(map) => !map.keys().any(|k| k.starts_with('$')),
        _ => true,
    }
}

/// Collects the constraints `query` places on `field`, following `$and`.
pub fn field_bounds(query: &Document, field: &str, collation: &Collation) -> FieldBounds {
    let mut bounds = FieldBounds::Unbounded;
    if let Some(predicate) = query.get(field) {
        bounds = bounds.intersect(bounds_from_predicate(predicate, collation), collation);
    }
    if let Some(Value::Array(clauses)) = query.get("$and") {
        for clause in clauses {
            if let Value::Object(sub) = clause {
                bounds = bounds.intersect(field_bounds(sub, field, collation), collation);
            }
        }
    }
    bounds
}

/// Key-space intervals that together cover every document `query` can match.
///
/// An empty vector means no document can match.
pub fn key_intervals(pattern: &KeyPattern, query: &Document, collation: &Collation) -> Vec<KeyInterval> {
    let mut intervals = vec![KeyInterval {
        min: Vec::with_capacity(pattern.len()),
        max: Vec::with_capacity(pattern.len()),
    }];
    let fields: Vec<&str> = pattern.fields().collect();

    for (position, field) in fields.iter().enumerate() {
        let mut bounds = if pattern.is_hashed_field(field) {
            FieldBounds::Unbounded
        } else {
            field_bounds(query, field, collation)
        };
        if !collation.is_simple() && bounds.mentions_string() {
            bounds = FieldBounds::Unbounded;
        }
        if let FieldBounds::Points(points) = &bounds {
            if intervals.len().saturating_mul(points.len()) > MAX_POINT_COMBINATIONS {
                bounds = FieldBounds::Unbounded;
            }
        }

        match bounds {
            FieldBounds::Empty => return Vec::new(),
            FieldBounds::Points(mut points) => {
                let simple = Collation::simple();
                points.sort_by(|a, b| compare_values(a, b, &simple));
                points.dedup_by(|a, b| compare_values(a, b, &simple) == Ordering::Equal);
                let mut next = Vec::with_capacity(intervals.len() * points.len());
                for interval in &intervals {
                    for point in &points {
                        let mut min = interval.min.clone();
                        let mut max = interval.max.clone();
                        min.push(KeyValue::Value(point.clone()));
                        max.push(KeyValue::Value(point.clone()));
                        next.push(KeyInterval { min, max });
                    }
                }
                intervals = next;
            }
            FieldBounds::Range { lower, upper } => {
                for interval in &mut intervals {
                    interval
                        .min
                        .push(lower.clone().map_or(KeyValue::MinKey, KeyValue::Value));
                    interval
                        .max
                        .push(upper.clone().map_or(KeyValue::MaxKey, KeyValue::Value));
                }
                fill_open_suffix(&mut intervals, fields.len() - position - 1);
                return intervals;
            }
            FieldBounds::Unbounded => {
                fill_open_suffix(&mut intervals, fields.len() - position);
                return intervals;
            }
        }
    }
    intervals
}

fn fill_open_suffix(intervals: &mut [KeyInterval], remaining: usize) {
    for interval in intervals {
        interval.min.extend(std::iter::repeat_n(KeyValue::MinKey, remaining));
        interval.max.extend(std::iter::repeat_n(KeyValue::MaxKey, remaining));
    }
}

/// Splits a top-level `$or` into one predicate per branch, each keeping the
/// sibling conditions. Returns `None` when the query has no usable `$or`.
pub fn split_top_level_or(query: &Document) -> Option<Vec<Document>> {
    let Value::Array(branches) = query.get("$or")? else {
        return None;
    };
    let mut rest = query.clone();
    rest.shift_remove("$or");
    let mut out = Vec::with_capacity(branches.len());
    for branch in branches {
        let Value::Object(branch) = branch else {
            return None;
        };
        let mut combined = Document::new();
        combined.insert(
            "$and".to_string(),
            Value::Array(vec![Value::Object(rest.clone()), Value::Object(branch.clone())]),
        );
        out.push(combined);
    }
    Some(out)
}
