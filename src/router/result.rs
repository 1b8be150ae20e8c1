use serde_json::{Value, json};

use crate::core::document::{field_truthy, Document};
use crate::core::{Result, RouterError};
use crate::topology::{Endpoint, ShardId};
use crate::transport::TransportError;

/// What came back from one shard call.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardOutcome {
    /// The shard answered; the document may still carry `ok: 0`.
    Response(Document),
    /// No document: the call never completed.
    TransportFailure(TransportError),
}

/// One contacted shard and its outcome. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardResult {
    pub shard_id: ShardId,
    pub endpoint: Endpoint,
    pub outcome: ShardOutcome,
}

impl ShardResult {
    pub fn new(endpoint: Endpoint, outcome: ShardOutcome) -> Self {
        Self {
            shard_id: endpoint.shard_id.clone(),
            endpoint,
            outcome,
        }
    }

    pub fn response(&self) -> Option<&Document> {
        match &self.outcome {
            ShardOutcome::Response(doc) => Some(doc),
            ShardOutcome::TransportFailure(_) => None,
        }
    }

    /// The response document, or the transport failure as a typed error.
    pub fn document(&self) -> Result<&Document> {
        match &self.outcome {
            ShardOutcome::Response(doc) => Ok(doc),
            ShardOutcome::TransportFailure(err) => Err(RouterError::Transport {
                shard: self.shard_id.to_string(),
                message: err.to_string(),
                timed_out: err.is_timeout(),
            }),
        }
    }

    /// True when the shard answered with a truthy `ok`.
    pub fn is_ok(&self) -> bool {
        self.response().is_some_and(|doc| field_truthy(doc, "ok"))
    }
}

/// The cluster-level answer to one command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub ok: bool,
    /// Reply fields without `ok`.
    pub body: Document,
}

impl CommandOutcome {
    pub fn success(body: Document) -> Self {
        Self { ok: true, body }
    }

    pub fn failure(body: Document) -> Self {
        Self { ok: false, body }
    }

    /// Reply document with `ok` as the last field.
    pub fn into_reply(self) -> Document {
        let mut reply = self.body;
        reply.shift_remove("ok");
        reply.insert("ok".to_string(), json!(if self.ok { 1.0 } else { 0.0 }));
        reply
    }

    pub fn errmsg(&self) -> Option<&str> {
        self.body.get("errmsg").and_then(Value::as_str)
    }
}

/// Renders a typed failure as `{errmsg, code, codeName, ok: 0}`.
pub fn error_reply(err: &RouterError) -> Document {
    let mut reply = Document::new();
    reply.insert("errmsg".to_string(), json!(err.to_string()));
    reply.insert("code".to_string(), json!(err.code()));
    reply.insert("codeName".to_string(), json!(err.code_name()));
    if let Some(shard) = err.shard() {
        reply.insert("shard".to_string(), json!(shard));
    }
    if let RouterError::ChainBroken { failed_at, .. } = err {
        reply.insert("failedAt".to_string(), json!(failed_at));
    }
    reply.insert("ok".to_string(), json!(0.0));
    reply
}
