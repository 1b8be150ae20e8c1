use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Result, RouterError};

const DB_DISALLOWED: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];
const MAX_DB_NAME_LEN: usize = 64;

/// Fully-qualified `db.collection` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    db: String,
    coll: String,
}

impl Namespace {
    /// Builds a namespace from its parts, validating both.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Result<Self> {
        let db = db.into();
        let coll = coll.into();
        Self::validate_db_name(&db)?;
        Self::validate_collection_name(&coll)
            .map_err(|reason| RouterError::InvalidNamespace(format!("{}.{}: {}", db, coll, reason)))?;
        Ok(Self { db, coll })
    }

    /// Parses `db.collection`; the collection part may itself contain dots.
    pub fn parse(full: &str) -> Result<Self> {
        let Some((db, coll)) = full.split_once('.') else {
            return Err(RouterError::InvalidNamespace(format!(
                "'{}' is not a fully-qualified namespace",
                full
            )));
        };
        Self::new(db, coll)
    }

    /// The namespace database-level commands are addressed to, e.g. `db.$cmd.listCollections`.
    pub fn command_namespace(db: &str, suffix: &str) -> Result<Self> {
        Self::validate_db_name(db)?;
        let coll = if suffix.is_empty() {
            "$cmd".to_string()
        } else {
            format!("$cmd.{}", suffix)
        };
        Ok(Self {
            db: db.to_string(),
            coll,
        })
    }

    pub fn validate_db_name(db: &str) -> Result<()> {
        if db.is_empty() {
            return Err(RouterError::InvalidNamespace(
                "database name must not be empty".to_string(),
            ));
        }
        if db.len() >= MAX_DB_NAME_LEN {
            return Err(RouterError::InvalidNamespace(format!(
                "database name '{}' is too long",
                db
            )));
        }
        if let Some(bad) = db.chars().find(|c| DB_DISALLOWED.contains(c)) {
            return Err(RouterError::InvalidNamespace(format!(
                "database name '{}' contains disallowed character {:?}",
                db, bad
            )));
        }
        Ok(())
    }

    fn validate_collection_name(coll: &str) -> std::result::Result<(), &'static str> {
        if coll.is_empty() {
            return Err("collection name must not be empty");
        }
        if coll.contains('\0') {
            return Err("collection name must not contain NUL");
        }
        if coll.starts_with('.') || coll.ends_with('.') {
            return Err("collection name must not start or end with '.'");
        }
        if coll.contains('$') && !coll.starts_with("$cmd") {
            return Err("collection name must not contain '$'");
        }
        Ok(())
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn coll(&self) -> &str {
        &self.coll
    }

    pub fn is_command_namespace(&self) -> bool {
        self.coll.starts_with("$cmd")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}
