use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

/// Identifier of one storage node (or replica set) in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShardId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ShardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A dispatchable address for a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub shard_id: ShardId,
    pub connection_string: String,
}

impl Endpoint {
    pub fn new(shard_id: impl Into<ShardId>, connection_string: impl Into<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            connection_string: connection_string.into(),
        }
    }
}

/// Resolves shard identifiers to live endpoints.
#[async_trait]
pub trait ShardDirectory: Send + Sync {
    /// Returns the endpoint for `shard`, or `RouterError::ShardNotFound` when
    /// the shard has been removed from the cluster.
    async fn resolve(&self, shard: &ShardId) -> Result<Endpoint>;

    /// Every shard currently registered in the cluster.
    async fn all_shard_ids(&self) -> Result<Vec<ShardId>>;
}
