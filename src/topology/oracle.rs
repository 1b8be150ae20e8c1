use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Namespace, Result};
use crate::topology::descriptor::{PartitionDescriptor, TopologyVersion};
use crate::topology::directory::ShardId;

/// Catalog entry for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    /// Shard holding every unpartitioned collection of the database.
    pub primary: ShardId,
    /// Whether collections of this database may be partitioned.
    pub partitioning_enabled: bool,
}

impl DatabaseInfo {
    pub fn new(name: impl Into<String>, primary: impl Into<ShardId>) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            partitioning_enabled: false,
        }
    }

    pub fn with_partitioning(mut self, enabled: bool) -> Self {
        self.partitioning_enabled = enabled;
        self
    }
}

/// Cached view of the cluster catalog.
///
/// Snapshots handed out are immutable; a refresh produces a new snapshot and
/// leaves holders of the old one untouched.
#[async_trait]
pub trait TopologyOracle: Send + Sync {
    /// Catalog entry for `db`, or `RouterError::NamespaceNotFound`.
    async fn database(&self, db: &str) -> Result<DatabaseInfo>;

    /// Cached partition map for `ns`; `None` when the namespace is not partitioned.
    async fn partition_map(&self, ns: &Namespace) -> Result<Option<Arc<PartitionDescriptor>>>;

    async fn is_partitioned(&self, ns: &Namespace) -> Result<bool> {
        Ok(self.partition_map(ns).await?.is_some())
    }

    /// Discards the cached entry for `ns` and loads a fresh one, newer than `stale` when given.
    async fn refresh(
        &self,
        ns: &Namespace,
        stale: Option<TopologyVersion>,
    ) -> Result<Option<Arc<PartitionDescriptor>>>;
}
