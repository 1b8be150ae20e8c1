use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::core::{Namespace, Result, RouterError};
use crate::topology::descriptor::{PartitionDescriptor, TopologyVersion};
use crate::topology::directory::{Endpoint, ShardDirectory, ShardId};
use crate::topology::oracle::{DatabaseInfo, TopologyOracle};

/// An in-memory `TopologyOracle` for tests and embedding.
///
/// Keeps two layers: the authoritative catalog and the router's cached copy.
/// [`InMemoryTopology::publish`] changes only the authoritative layer, which
/// lets a test make the router's view stale until the next refresh.
#[derive(Default)]
pub struct InMemoryTopology {
    databases: RwLock<HashMap<String, DatabaseInfo>>,
    authoritative: RwLock<HashMap<Namespace, Arc<PartitionDescriptor>>>,
    cached: RwLock<HashMap<Namespace, Arc<PartitionDescriptor>>>,
    refreshes: AtomicUsize,
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&self, info: DatabaseInfo) -> Result<()> {
        let mut databases = self.databases.write()?;
        databases.insert(info.name.clone(), info);
        Ok(())
    }

    /// Partitions a namespace; both the catalog and the router cache see it immediately.
    pub fn shard_collection(&self, descriptor: PartitionDescriptor) -> Result<()> {
        let descriptor = Arc::new(descriptor);
        let ns = descriptor.ns().clone();
        self.ensure_partitioning_enabled(ns.db())?;
        self.authoritative.write()?.insert(ns.clone(), descriptor.clone());
        self.cached.write()?.insert(ns, descriptor);
        Ok(())
    }

    /// Replaces the authoritative partition map without touching the router cache.
    pub fn publish(&self, descriptor: PartitionDescriptor) -> Result<()> {
        let ns = descriptor.ns().clone();
        self.ensure_partitioning_enabled(ns.db())?;
        self.authoritative.write()?.insert(ns, Arc::new(descriptor));
        Ok(())
    }

    /// Number of refreshes served so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn ensure_partitioning_enabled(&self, db: &str) -> Result<()> {
        let mut databases = self.databases.write()?;
        let info = databases
            .get_mut(db)
            .ok_or_else(|| RouterError::NamespaceNotFound(db.to_string()))?;
        info.partitioning_enabled = true;
        Ok(())
    }
}

#[async_trait]
impl TopologyOracle for InMemoryTopology {
    async fn database(&self, db: &str) -> Result<DatabaseInfo> {
        let databases = self.databases.read()?;
        databases
            .get(db)
            .cloned()
            .ok_or_else(|| RouterError::NamespaceNotFound(db.to_string()))
    }

    async fn partition_map(&self, ns: &Namespace) -> Result<Option<Arc<PartitionDescriptor>>> {
        let cached = self.cached.read()?;
        Ok(cached.get(ns).cloned())
    }

    async fn refresh(
        &self,
        ns: &Namespace,
        _stale: Option<TopologyVersion>,
    ) -> Result<Option<Arc<PartitionDescriptor>>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let fresh = self.authoritative.read()?.get(ns).cloned();
        let mut cached = self.cached.write()?;
        match &fresh {
            Some(descriptor) => {
                cached.insert(ns.clone(), descriptor.clone());
            }
            None => {
                cached.remove(ns);
            }
        }
        Ok(fresh)
    }
}

/// An in-memory `ShardDirectory`.
#[derive(Default)]
pub struct InMemoryShardDirectory {
    shards: RwLock<BTreeMap<ShardId, Endpoint>>,
}

impl InMemoryShardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shard at `connection_string`.
    pub fn add_shard(&self, shard: impl Into<ShardId>, connection_string: impl Into<String>) -> Result<()> {
        let shard = shard.into();
        let mut shards = self.shards.write()?;
        shards.insert(shard.clone(), Endpoint::new(shard, connection_string));
        Ok(())
    }

    /// Removes a shard; later lookups report it as not found.
    ///
    /// Returns true if the shard was registered.
    pub fn remove_shard(&self, shard: &ShardId) -> Result<bool> {
        let mut shards = self.shards.write()?;
        Ok(shards.remove(shard).is_some())
    }
}

#[async_trait]
impl ShardDirectory for InMemoryShardDirectory {
    async fn resolve(&self, shard: &ShardId) -> Result<Endpoint> {
        let shards = self.shards.read()?;
        shards
            .get(shard)
            .cloned()
            .ok_or_else(|| RouterError::ShardNotFound(shard.to_string()))
    }

    async fn all_shard_ids(&self) -> Result<Vec<ShardId>> {
        let shards = self.shards.read()?;
        Ok(shards.keys().cloned().collect())
    }
}
