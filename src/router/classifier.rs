//! Target-scope decisions: primary-only passthrough versus scatter over owning shards.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::core::document::{optional_object, Document};
use crate::core::{Collation, Namespace, Result, RouterError};
use crate::router::context::RouterContext;
use crate::topology::{DatabaseInfo, PartitionDescriptor, ShardId};

/// Where a namespace lives, as seen through the cached topology.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Unpartitioned: the whole namespace sits on the database primary.
    Primary { database: DatabaseInfo },
    /// Partitioned: owned chunk by chunk per the descriptor snapshot.
    Partitioned {
        database: DatabaseInfo,
        descriptor: Arc<PartitionDescriptor>,
    },
}

impl Placement {
    pub fn database(&self) -> &DatabaseInfo {
        match self {
            Placement::Primary { database } | Placement::Partitioned { database, .. } => database,
        }
    }

    pub fn primary(&self) -> &ShardId {
        &self.database().primary
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self, Placement::Partitioned { .. })
    }

    pub fn descriptor(&self) -> Option<&Arc<PartitionDescriptor>> {
        match self {
            Placement::Primary { .. } => None,
            Placement::Partitioned { descriptor, .. } => Some(descriptor),
        }
    }

    /// Shards that may hold documents matching `query`.
    ///
    /// Exactly the primary when unpartitioned. Every owning shard when the
    /// query is empty.
    pub fn targets_for_query(&self, query: &Document, collation: Option<&Collation>) -> BTreeSet<ShardId> {
        match self {
            Placement::Primary { database } => BTreeSet::from([database.primary.clone()]),
            Placement::Partitioned { descriptor, .. } => descriptor.shards_for_query(query, collation),
        }
    }

    /// Every shard that owns part of the namespace.
    pub fn owning_shards(&self) -> BTreeSet<ShardId> {
        self.targets_for_query(&Document::new(), None)
    }

    /// Returns the primary, or rejects `command` because the namespace is partitioned.
    pub fn require_unpartitioned(&self, command: &str) -> Result<&ShardId> {
        match self {
            Placement::Primary { database } => Ok(&database.primary),
            Placement::Partitioned { .. } => Err(RouterError::IllegalOperation(format!(
                "can't do command: {} on sharded collection",
                command
            ))),
        }
    }
}

/// Looks up the database entry and cached partition map for `ns`.
pub async fn placement(ctx: &RouterContext, ns: &Namespace) -> Result<Placement> {
    let database = ctx.topology.database(ns.db()).await?;
    match ctx.topology.partition_map(ns).await? {
        Some(descriptor) => Ok(Placement::Partitioned { database, descriptor }),
        None => Ok(Placement::Primary { database }),
    }
}

/// Targets for commands that must reach every shard of a partitioned namespace,
/// including shards that own no chunk of it yet.
pub async fn all_shards_targets(ctx: &RouterContext, ns: &Namespace) -> Result<Vec<ShardId>> {
    match placement(ctx, ns).await? {
        Placement::Primary { database } => Ok(vec![database.primary]),
        Placement::Partitioned { .. } => ctx.directory.all_shard_ids().await,
    }
}

/// The filtering predicate embedded in a command: `query`, else `q`, else empty.
pub fn targeting_query(command: &Document) -> Result<Document> {
    if let Some(query) = optional_object(command, "query")? {
        return Ok(query.clone());
    }
    match command.get("q") {
        Some(Value::Object(query)) => Ok(query.clone()),
        _ => Ok(Document::new()),
    }
}

/// The command's own collation, if it gives a non-empty one.
pub fn targeting_collation(command: &Document) -> Result<Option<Collation>> {
    Collation::from_command(command, "collation")
}
