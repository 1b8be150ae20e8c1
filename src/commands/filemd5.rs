//! Chained-state family: `filemd5` over GridFS chunks.
//!
//! With chunks partitioned by `{files_id: 1, n: 1}` a file's chunks are spread
//! over several shards. Starting at `n = 0`, the router asks the shard owning
//! chunk `n` to extend a partial checksum over every contiguous chunk it has.
//! The shard answers with the new state and the next chunk number it could not
//! reach; the router repeats until a step makes no progress.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{Level, event};

use crate::commands::{CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{doc, first_element, long_or_zero, type_name, Document};
use crate::core::{Namespace, Result, RouterError};
use crate::router::classifier::{self, Placement};
use crate::router::context::RouterContext;
use crate::router::dispatcher;
use crate::router::normalize::{errmsg, is_ok, is_stale_signal, stale_error};
use crate::router::result::{CommandOutcome, ShardOutcome};
use crate::topology::{PartitionDescriptor, ShardId};

const STATE_FIELD: &str = "md5state";

/// Partial checksum state handed from one shard to the next. Never inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecksumState(Value);

impl ChecksumState {
    pub fn from_response(response: &Document) -> Option<Self> {
        response.get(STATE_FIELD).cloned().map(ChecksumState)
    }

    fn append_to(&self, command: &mut Document) {
        command.insert(STATE_FIELD.to_string(), self.0.clone());
    }
}

/// The request for one step of the chain.
fn step_command(command: &Document, start_at: i64, state: Option<&ChecksumState>) -> Document {
    let mut step = command.clone();
    step.insert("partialOk".to_string(), json!(true));
    step.insert("startAt".to_string(), json!(start_at));
    if let Some(state) = state {
        state.append_to(&mut step);
    }
    step
}

fn owner_of(descriptor: &PartitionDescriptor, finder: &Document) -> Result<ShardId> {
    descriptor
        .shards_for_query(finder, None)
        .into_iter()
        .next()
        .ok_or_else(|| RouterError::ExecutionError(format!("no shard owns {}", Value::Object(finder.clone()))))
}

/// `filemd5`: checksum of one GridFS file.
pub struct FileMd5Command;

impl FileMd5Command {
    async fn run_chained(
        &self,
        ctx: &RouterContext,
        inv: &Invocation,
        descriptor: &PartitionDescriptor,
        files_id: &Value,
    ) -> Result<CommandOutcome> {
        let mut n = 0i64;
        let mut state: Option<ChecksumState> = None;
        loop {
            let sent = step_command(&inv.command, n, state.as_ref());
            let shard = owner_of(descriptor, &doc(json!({"files_id": files_id, "n": n})))?;
            event!(Level::DEBUG, ns = %inv.ns, shard = %shard, start_at = n, "filemd5 step");

            let result = dispatcher::call_shard(ctx, &shard, &inv.db, &sent, inv.options).await?;
            let response = match &result.outcome {
                ShardOutcome::Response(response) => response,
                ShardOutcome::TransportFailure(err) => {
                    return Err(RouterError::ChainBroken {
                        shard: shard.to_string(),
                        failed_at: n,
                        code: None,
                        message: err.to_string(),
                    });
                }
            };
            if is_stale_signal(response) {
                return Err(stale_error(&shard, &inv.ns, response, false));
            }
            if !is_ok(response) {
                let mut body = Document::new();
                body.insert("failedAt".to_string(), json!(n));
                body.insert("sentCommand".to_string(), Value::Object(sent));
                for (field, value) in response {
                    if field != "errmsg" && field != "ok" {
                        body.insert(field.clone(), value.clone());
                    }
                }
                body.insert(
                    "errmsg".to_string(),
                    json!(format!("sharded filemd5 failed because: {}", errmsg(response))),
                );
                event!(Level::WARN, ns = %inv.ns, shard = %shard, failed_at = n, "sharded filemd5 failed");
                return Ok(CommandOutcome::failure(body));
            }

            let Some(next_state) = ChecksumState::from_response(response) else {
                return Err(RouterError::Remote {
                    shard: shard.to_string(),
                    code: Some(16246),
                    message: "shard is too old to support GridFS sharded by {files_id:1, n:1}".to_string(),
                });
            };

            let next = long_or_zero(response, "numChunks");
            if next == n {
                let mut body = response.clone();
                body.shift_remove("ok");
                return Ok(CommandOutcome::success(body));
            }
            if next < n {
                return Err(RouterError::ChainBroken {
                    shard: shard.to_string(),
                    failed_at: n,
                    code: None,
                    message: format!("numChunks {} went backwards from startAt {}", next, n),
                });
            }
            state = Some(next_state);
            n = next;
        }
    }
}

#[async_trait]
impl RoutableCommand for FileMd5Command {
    fn name(&self) -> &'static str {
        "filemd5"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::ChainedState
    }

    /// `<db>.<root>.chunks`, with `root` defaulting to `fs`.
    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        let root = match command.get("root") {
            None => "fs",
            Some(Value::String(root)) if root.is_empty() => "fs",
            Some(Value::String(root)) => root.as_str(),
            Some(other) => {
                return Err(RouterError::InvalidNamespace(format!(
                    "'root' must be of type String, found {}",
                    type_name(other)
                )));
            }
        };
        Namespace::new(db, format!("{}.chunks", root))
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let descriptor = match classifier::placement(ctx, &inv.ns).await? {
            Placement::Primary { database } => {
                return dispatcher::passthrough(ctx, &database.primary, &inv.db, &inv.ns, &inv.command, inv.options)
                    .await;
            }
            Placement::Partitioned { descriptor, .. } => descriptor,
        };
        let files_id = first_element(&inv.command)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null);

        let pattern = descriptor.key_pattern();
        if pattern.matches_exactly(&doc(json!({"files_id": 1}))) {
            let shard = owner_of(&descriptor, &doc(json!({"files_id": files_id})))?;
            return dispatcher::passthrough(ctx, &shard, &inv.db, &inv.ns, &inv.command, inv.options).await;
        }
        if pattern.matches_exactly(&doc(json!({"files_id": 1, "n": 1}))) {
            return self.run_chained(ctx, inv, &descriptor, &files_id).await;
        }
        Err(RouterError::IllegalOperation(
            "GridFS fs.chunks collection must be partitioned on either {files_id:1} or {files_id:1, n:1}"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_defaults_to_fs_root() {
        let cmd = FileMd5Command;
        let ns = cmd.parse_namespace("media", &doc(json!({"filemd5": 7}))).unwrap();
        assert_eq!(ns.to_string(), "media.fs.chunks");
        let ns = cmd
            .parse_namespace("media", &doc(json!({"filemd5": 7, "root": "videos"})))
            .unwrap();
        assert_eq!(ns.to_string(), "media.videos.chunks");
        assert!(cmd.parse_namespace("media", &doc(json!({"filemd5": 7, "root": 3}))).is_err());
    }

    #[test]
    fn step_carries_progress_and_previous_state() {
        let original = doc(json!({"filemd5": 7, "root": "fs"}));
        let first = step_command(&original, 0, None);
        assert_eq!(first["partialOk"], json!(true));
        assert_eq!(first["startAt"], json!(0));
        assert!(first.get(STATE_FIELD).is_none());

        let state = ChecksumState::from_response(&doc(json!({"md5state": "opaque", "numChunks": 3}))).unwrap();
        let second = step_command(&original, 3, Some(&state));
        assert_eq!(second["startAt"], json!(3));
        assert_eq!(second[STATE_FIELD], json!("opaque"));
    }
}
