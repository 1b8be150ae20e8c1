//! Routable commands, one file per merge family.

pub mod admin;
pub mod all_shards;
pub mod cursor;
pub mod distinct;
pub mod filemd5;
pub mod geo_near;
pub mod passthrough;
pub mod registry;
pub mod restricted;
pub mod rollup;
pub mod validate;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::document::{first_element, type_name, Document};
use crate::core::{Namespace, Result, RouterError};
use crate::router::context::RouterContext;
use crate::router::dispatcher;
use crate::router::explain::Verbosity;
use crate::router::result::CommandOutcome;
use crate::transport::CommandOptions;

pub use registry::CommandRegistry;

/// How a command's per-shard answers become one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// Single shard, reply relayed.
    Passthrough,
    /// Numeric statistics summed across shards.
    Rollup,
    /// Distinct values unioned under a collation.
    DedupUnion,
    /// Score-ordered candidates merged and truncated.
    KWayMerge,
    /// Sequential calls threading opaque state between shards.
    ChainedState,
    /// Per-shard verdicts combined with AND.
    PassFail,
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandFamily::Passthrough => "passthrough",
            CommandFamily::Rollup => "rollup",
            CommandFamily::DedupUnion => "dedup-union",
            CommandFamily::KWayMerge => "k-way-merge",
            CommandFamily::ChainedState => "chained-state",
            CommandFamily::PassFail => "pass-fail",
        };
        f.write_str(name)
    }
}

/// One client command on its way through the router.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Database the client addressed the command to.
    pub db: String,
    /// Namespace the command acts on, as parsed by the command.
    pub ns: Namespace,
    pub command: Document,
    /// Options forwarded to shards; empty unless the command passes options.
    pub options: CommandOptions,
}

impl Invocation {
    pub fn name(&self) -> &str {
        first_element(&self.command).map(|(name, _)| name).unwrap_or("")
    }
}

#[async_trait]
pub trait RoutableCommand: Send + Sync {
    fn name(&self) -> &'static str;

    /// Older spellings that resolve to this command.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn family(&self) -> CommandFamily;

    /// Whether client wire options are forwarded to shards.
    fn pass_options(&self) -> bool {
        false
    }

    /// Whether the command may only be addressed to the `admin` database.
    fn admin_only(&self) -> bool {
        false
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        default_namespace(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome>;

    async fn explain(&self, _ctx: &RouterContext, _inv: &Invocation, _verbosity: Verbosity) -> Result<Document> {
        Err(RouterError::IllegalOperation(format!(
            "Cannot explain cmd: {}",
            self.name()
        )))
    }
}

/// `db.<first element>` when the first element is a non-empty string, else the database's command namespace.
pub fn default_namespace(db: &str, command: &Document) -> Result<Namespace> {
    match first_element(command) {
        Some((_, Value::String(coll))) if !coll.is_empty() => Namespace::new(db, coll.as_str()),
        _ => Namespace::command_namespace(db, ""),
    }
}

/// `db.<first element>`; the first element must name a collection.
pub fn collection_required(db: &str, command: &Document) -> Result<Namespace> {
    match first_element(command) {
        Some((_, Value::String(coll))) if !coll.is_empty() => Namespace::new(db, coll.as_str()),
        Some((name, Value::String(_))) => Err(RouterError::InvalidNamespace(format!(
            "collection name for '{}' must not be empty",
            name
        ))),
        Some((name, other)) => Err(RouterError::InvalidNamespace(format!(
            "collection name for '{}' has invalid type {}",
            name,
            type_name(other)
        ))),
        None => Err(RouterError::InvalidNamespace("empty command".to_string())),
    }
}

/// The first element is a full `db.collection` string.
pub fn fully_qualified(command: &Document) -> Result<Namespace> {
    match first_element(command) {
        Some((_, Value::String(full))) => Namespace::parse(full),
        Some((name, _)) => Err(RouterError::InvalidNamespace(format!(
            "'{}' must be of type String",
            name
        ))),
        None => Err(RouterError::InvalidNamespace("empty command".to_string())),
    }
}

/// Relays the command to the primary of the addressed database.
pub(crate) async fn passthrough_to_primary(ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
    let database = ctx.topology.database(&inv.db).await?;
    dispatcher::passthrough(ctx, &database.primary, &inv.db, &inv.ns, &inv.command, inv.options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use serde_json::json;

    #[test]
    fn collection_required_rejects_non_strings() {
        let err = collection_required("app", &doc(json!({"collStats": 1}))).unwrap_err();
        assert!(matches!(err, RouterError::InvalidNamespace(_)));
        let ns = collection_required("app", &doc(json!({"collStats": "users"}))).unwrap();
        assert_eq!(ns.to_string(), "app.users");
    }

    #[test]
    fn fully_qualified_needs_a_dot() {
        assert!(fully_qualified(&doc(json!({"dataSize": "users"}))).is_err());
        let ns = fully_qualified(&doc(json!({"dataSize": "app.users"}))).unwrap();
        assert_eq!(ns.db(), "app");
    }

    #[test]
    fn default_namespace_falls_back_to_command_namespace() {
        let ns = default_namespace("app", &doc(json!({"create": "logs"}))).unwrap();
        assert_eq!(ns.coll(), "logs");
        let ns = default_namespace("app", &doc(json!({"ping": 1}))).unwrap();
        assert!(ns.is_command_namespace());
    }
}
