#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use shardroute::core::KeyValue;
use shardroute::core::document::doc;
use shardroute::topology::{
    DatabaseInfo, InMemoryShardDirectory, InMemoryTopology, KeyPattern, PartitionDescriptor,
    ShardId, TopologyVersion,
};
use shardroute::transport::{
    CommandOptions, InMemoryShardExecutor, ShardRequest, TransportResult, respond_with,
};
use shardroute::{CommandRouter, Document, Namespace, RouterConfig, RouterContext};

/// A router wired to in-memory collaborators.
///
/// Databases `app` and `media` exist with the first shard as primary.
pub struct Cluster {
    pub topology: Arc<InMemoryTopology>,
    pub directory: Arc<InMemoryShardDirectory>,
    pub executor: InMemoryShardExecutor,
    pub router: CommandRouter,
}

impl Cluster {
    pub fn new(shards: &[&str]) -> Self {
        Self::with_config(shards, RouterConfig::default())
    }

    pub fn with_config(shards: &[&str], config: RouterConfig) -> Self {
        let topology = Arc::new(InMemoryTopology::new());
        for db in ["app", "media"] {
            topology.add_database(DatabaseInfo::new(db, shards[0])).unwrap();
        }
        let directory = Arc::new(InMemoryShardDirectory::new());
        for shard in shards {
            directory.add_shard(*shard, connection_string(shard)).unwrap();
        }
        let executor = InMemoryShardExecutor::new();
        let ctx = RouterContext::new(topology.clone(), directory.clone(), Arc::new(executor.clone()))
            .with_config(config);
        Self {
            topology,
            directory,
            executor,
            router: CommandRouter::new(ctx),
        }
    }

    /// Partitions `app.users` on `uid` with split points at 100, 200, ...
    pub fn shard_users(&self, owners: &[&str]) {
        self.topology.shard_collection(users_descriptor(owners, 1)).unwrap();
    }

    pub async fn respond(&self, shard: &str, response: Value) {
        self.executor.register_shard(shard, respond_with(doc(response))).await;
    }

    pub async fn handle<F>(&self, shard: &str, handler: F)
    where
        F: Fn(&ShardRequest) -> TransportResult<Document> + Send + Sync + 'static,
    {
        self.executor.register_shard(shard, Arc::new(handler)).await;
    }

    pub async fn run(&self, db: &str, command: Value) -> Document {
        self.router
            .run_command_reply(db, &doc(command), CommandOptions::none())
            .await
    }

    /// Shards contacted so far, in call order.
    pub async fn contacted(&self) -> Vec<String> {
        self.executor
            .calls()
            .await
            .iter()
            .map(|call| call.shard.to_string())
            .collect()
    }
}

pub fn connection_string(shard: &str) -> String {
    format!("{}.example.net:27018", shard)
}

pub fn users_descriptor(owners: &[&str], version: u64) -> PartitionDescriptor {
    let splits = (1..owners.len())
        .map(|i| vec![KeyValue::Value(json!(i * 100))])
        .collect();
    PartitionDescriptor::from_splits(
        Namespace::parse("app.users").unwrap(),
        KeyPattern::ascending(&["uid"]).unwrap(),
        splits,
        owners.iter().map(|s| ShardId::new(*s)).collect(),
        TopologyVersion::new(version),
    )
    .unwrap()
}

pub fn keys(document: &Document) -> Vec<&str> {
    document.keys().map(String::as_str).collect()
}
