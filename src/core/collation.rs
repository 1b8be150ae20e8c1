//! Value-comparison rules for deduplication and ordering.
//!
//! The `simple` collation compares strings byte-wise. Locale collations fold
//! case at strengths 1 and 2, and break primary ties by case at strength 3
//! and above (or whenever `caseLevel` is set). `numericOrdering` compares
//! embedded digit runs by numeric value.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::document::{Document, type_name};
use crate::core::{Result, RouterError};

const SIMPLE_LOCALE: &str = "simple";
const KNOWN_FIELDS: &[&str] = &[
    "locale",
    "strength",
    "caseLevel",
    "caseFirst",
    "numericOrdering",
    "alternate",
    "maxVariable",
    "normalization",
    "backwards",
    "version",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    locale: String,
    strength: u8,
    case_level: bool,
    numeric_ordering: bool,
}

impl Default for Collation {
    fn default() -> Self {
        Self::simple()
    }
}

impl Collation {
    pub fn simple() -> Self {
        Self {
            locale: SIMPLE_LOCALE.to_string(),
            strength: 3,
            case_level: false,
            numeric_ordering: false,
        }
    }

    /// A locale collation with the given strength.
    pub fn locale(locale: impl Into<String>, strength: u8) -> Result<Self> {
        let locale = locale.into();
        if locale.is_empty() {
            return Err(RouterError::BadValue(
                "collation locale must not be empty".to_string(),
            ));
        }
        if !(1..=5).contains(&strength) {
            return Err(RouterError::BadValue(format!(
                "collation strength must be between 1 and 5, got {}",
                strength
            )));
        }
        Ok(Self {
            locale,
            strength,
            case_level: false,
            numeric_ordering: false,
        })
    }

    pub fn with_numeric_ordering(mut self, enabled: bool) -> Self {
        self.numeric_ordering = enabled;
        self
    }

    pub fn with_case_level(mut self, enabled: bool) -> Self {
        self.case_level = enabled;
        self
    }

    /// Reads the optional `field` collation spec of a command.
    ///
    /// Absent, `null` and `{}` all mean "not specified".
    pub fn from_command(command: &Document, field: &str) -> Result<Option<Self>> {
        match command.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(spec)) if spec.is_empty() => Ok(None),
            Some(Value::Object(spec)) => Self::from_document(spec).map(Some),
            Some(other) => Err(RouterError::TypeMismatch(format!(
                "\"{}\" had the wrong type. Expected object, found {}",
                field,
                type_name(other)
            ))),
        }
    }

    pub fn from_document(spec: &Document) -> Result<Self> {
        if let Some(unknown) = spec.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
            return Err(RouterError::BadValue(format!(
                "unknown collation field '{}'",
                unknown
            )));
        }
        let locale = match spec.get("locale") {
            Some(Value::String(locale)) => locale.clone(),
            Some(other) => {
                return Err(RouterError::TypeMismatch(format!(
                    "collation locale must be a string, found {}",
                    type_name(other)
                )));
            }
            None => {
                return Err(RouterError::BadValue(
                    "collation spec requires a 'locale' field".to_string(),
                ));
            }
        };
        if locale == SIMPLE_LOCALE {
            return Ok(Self::simple());
        }

        let strength = match spec.get("strength") {
            None => 3,
            Some(value) => value
                .as_u64()
                .and_then(|s| u8::try_from(s).ok())
                .ok_or_else(|| {
                    RouterError::BadValue(format!("invalid collation strength {}", value))
                })?,
        };
        let flag = |name: &str| -> Result<bool> {
            match spec.get(name) {
                None => Ok(false),
                Some(Value::Bool(b)) => Ok(*b),
                Some(other) => Err(RouterError::TypeMismatch(format!(
                    "collation field '{}' must be a bool, found {}",
                    name,
                    type_name(other)
                ))),
            }
        };
        let case_level = flag("caseLevel")?;
        let numeric_ordering = flag("numericOrdering")?;

        Ok(Self::locale(locale, strength)?
            .with_case_level(case_level)
            .with_numeric_ordering(numeric_ordering))
    }

    pub fn is_simple(&self) -> bool {
        self.locale == SIMPLE_LOCALE
    }

    pub fn locale_name(&self) -> &str {
        &self.locale
    }

    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        out.insert("locale".into(), Value::String(self.locale.clone()));
        if !self.is_simple() {
            out.insert("strength".into(), Value::from(self.strength));
            out.insert("caseLevel".into(), Value::Bool(self.case_level));
            out.insert("numericOrdering".into(), Value::Bool(self.numeric_ordering));
        }
        out
    }

    pub fn compare_str(&self, a: &str, b: &str) -> Ordering {
        if self.is_simple() {
            return a.cmp(b);
        }
        let folded_a = a.to_lowercase();
        let folded_b = b.to_lowercase();
        let primary = self.compare_text(&folded_a, &folded_b);
        if primary != Ordering::Equal || (self.strength < 3 && !self.case_level) {
            return primary;
        }
        // Lowercase sorts before uppercase on a case tie.
        self.compare_text(a, b).reverse()
    }

    fn compare_text(&self, a: &str, b: &str) -> Ordering {
        if self.numeric_ordering {
            compare_numeric_aware(a, b)
        } else {
            a.cmp(b)
        }
    }
}

fn compare_numeric_aware(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let run_l = take_digits(&mut left);
                let run_r = take_digits(&mut right);
                let trimmed_l = run_l.trim_start_matches('0');
                let trimmed_r = run_r.trim_start_matches('0');
                let ord = trimmed_l
                    .len()
                    .cmp(&trimmed_r.len())
                    .then_with(|| trimmed_l.cmp(trimmed_r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.cmp(&r);
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use serde_json::json;

    #[test]
    fn simple_collation_is_bytewise() {
        let simple = Collation::simple();
        assert_eq!(simple.compare_str("B", "a"), Ordering::Less);
        assert_ne!(simple.compare_str("a", "A"), Ordering::Equal);
    }

    #[test]
    fn strength_two_folds_case() {
        let ci = Collation::locale("en", 2).unwrap();
        assert_eq!(ci.compare_str("Apple", "aPPLE"), Ordering::Equal);
        assert_eq!(ci.compare_str("apple", "Banana"), Ordering::Less);
    }

    #[test]
    fn strength_three_breaks_ties_by_case() {
        let tertiary = Collation::locale("en", 3).unwrap();
        assert_eq!(tertiary.compare_str("a", "A"), Ordering::Less);
        assert_eq!(tertiary.compare_str("A", "b"), Ordering::Less);
    }

    #[test]
    fn numeric_ordering_compares_digit_runs() {
        let numeric = Collation::locale("en", 2).unwrap().with_numeric_ordering(true);
        assert_eq!(numeric.compare_str("file10", "file9"), Ordering::Greater);
        assert_eq!(numeric.compare_str("file010", "file10"), Ordering::Equal);
    }

    #[test]
    fn parses_command_collation_field() {
        let cmd = doc(json!({"distinct": "c", "collation": {"locale": "fr", "strength": 1}}));
        let collation = Collation::from_command(&cmd, "collation").unwrap().unwrap();
        assert_eq!(collation.locale_name(), "fr");

        let empty = doc(json!({"distinct": "c", "collation": {}}));
        assert!(Collation::from_command(&empty, "collation").unwrap().is_none());

        let bad = doc(json!({"distinct": "c", "collation": "en"}));
        assert!(matches!(
            Collation::from_command(&bad, "collation"),
            Err(RouterError::TypeMismatch(_))
        ));

        let unknown = doc(json!({"collation": {"locale": "en", "color": "blue"}}));
        assert!(matches!(
            Collation::from_command(&unknown, "collation"),
            Err(RouterError::BadValue(_))
        ));
    }
}
