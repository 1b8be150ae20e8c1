use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::{Namespace, Result};
use crate::topology::ShardId;

/// A shard-side cursor adopted by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCursor {
    pub shard: ShardId,
    pub ns: Namespace,
    pub remote_id: i64,
}

/// Keeps shard cursors alive behind router-issued ids so later `getMore`
/// calls can reach the owning shard.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Adopts a live shard cursor and returns the id the client should use.
    async fn register(&self, cursor: RemoteCursor) -> Result<i64>;

    async fn lookup(&self, router_id: i64) -> Result<Option<RemoteCursor>>;
}

#[derive(Clone)]
pub struct InMemoryCursorStore {
    next_id: Arc<AtomicI64>,
    cursors: Arc<Mutex<HashMap<i64, RemoteCursor>>>,
}

impl Default for InMemoryCursorStore {
    fn default() -> Self {
        Self {
            next_id: Arc::new(AtomicI64::new(1)),
            cursors: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.cursors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cursors.lock().await.is_empty()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn register(&self, cursor: RemoteCursor) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().await.insert(id, cursor);
        Ok(id)
    }

    async fn lookup(&self, router_id: i64) -> Result<Option<RemoteCursor>> {
        Ok(self.cursors.lock().await.get(&router_id).cloned())
    }
}
