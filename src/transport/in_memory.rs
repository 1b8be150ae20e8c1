use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::Document;
use crate::topology::{Endpoint, ShardId};
use crate::transport::executor::{CommandOptions, ShardExecutor, TransportError, TransportResult};

/// One call as seen by an in-memory shard.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardRequest {
    pub shard: ShardId,
    pub db: String,
    pub command: Document,
    pub options: CommandOptions,
}

impl ShardRequest {
    /// Name of the command, taken from its first field.
    pub fn command_name(&self) -> Option<&str> {
        self.command.keys().next().map(String::as_str)
    }
}

/// Produces a shard's answer to a request.
pub type ShardHandler = Arc<dyn Fn(&ShardRequest) -> TransportResult<Document> + Send + Sync>;

/// A handler that answers every request with `response`.
pub fn respond_with(response: Document) -> ShardHandler {
    Arc::new(move |_| Ok(response.clone()))
}

#[derive(Clone)]
struct InMemoryShard {
    handler: ShardHandler,
    delay: Option<Duration>,
}

/// An in-memory `ShardExecutor` for testing.
///
/// Each shard answers through a handler closure. Every call is recorded before
/// it is answered, so tests can assert which shards were contacted and in what order.
#[derive(Clone, Default)]
pub struct InMemoryShardExecutor {
    shards: Arc<Mutex<HashMap<ShardId, InMemoryShard>>>,
    calls: Arc<Mutex<Vec<ShardRequest>>>,
}

impl InMemoryShardExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `shard`.
    pub async fn register_shard(&self, shard: impl Into<ShardId>, handler: ShardHandler) {
        self.register_shard_with_delay(shard, None, handler).await;
    }

    /// Registers a handler that answers only after `delay`.
    pub async fn register_shard_with_delay(
        &self,
        shard: impl Into<ShardId>,
        delay: Option<Duration>,
        handler: ShardHandler,
    ) {
        let mut shards = self.shards.lock().await;
        shards.insert(shard.into(), InMemoryShard { handler, delay });
    }

    /// Makes `shard` unreachable.
    pub async fn unregister_shard(&self, shard: &ShardId) {
        let mut shards = self.shards.lock().await;
        shards.remove(shard);
    }

    pub async fn calls(&self) -> Vec<ShardRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_to(&self, shard: &ShardId) -> Vec<ShardRequest> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| &call.shard == shard)
            .cloned()
            .collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }
}

#[async_trait]
impl ShardExecutor for InMemoryShardExecutor {
    async fn execute(
        &self,
        endpoint: &Endpoint,
        db: &str,
        command: &Document,
        options: CommandOptions,
    ) -> TransportResult<Document> {
        let request = ShardRequest {
            shard: endpoint.shard_id.clone(),
            db: db.to_string(),
            command: command.clone(),
            options,
        };
        self.calls.lock().await.push(request.clone());

        let shard = {
            let shards = self.shards.lock().await;
            shards.get(&endpoint.shard_id).cloned()
        };
        let Some(shard) = shard else {
            return Err(TransportError::unreachable(format!(
                "no shard listening at {}",
                endpoint.connection_string
            )));
        };
        if let Some(delay) = shard.delay {
            tokio::time::sleep(delay).await;
        }
        (shard.handler)(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use serde_json::json;

    #[tokio::test]
    async fn records_calls_and_reports_unknown_shards() {
        let executor = InMemoryShardExecutor::new();
        executor
            .register_shard("s0", respond_with(doc(json!({"ok": 1}))))
            .await;

        let known = Endpoint::new("s0", "host0:27018");
        let unknown = Endpoint::new("s9", "host9:27018");
        let cmd = doc(json!({"ping": 1}));

        let reply = executor
            .execute(&known, "app", &cmd, CommandOptions::none())
            .await
            .unwrap();
        assert_eq!(reply, doc(json!({"ok": 1})));

        let err = executor
            .execute(&unknown, "app", &cmd, CommandOptions::none())
            .await
            .unwrap_err();
        assert!(!err.is_timeout());

        let calls = executor.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command_name(), Some("ping"));
        assert_eq!(calls[1].shard, ShardId::new("s9"));
    }
}
