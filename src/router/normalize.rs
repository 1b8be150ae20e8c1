//! Response-shape normalization shared by passthrough and every merge family.

use serde_json::{Value, json};
use tracing::{Level, event};

use crate::core::document::{append_unique, as_i64, field_truthy, Document};
use crate::core::{ErrorCode, Namespace, Result, RouterError};
use crate::router::result::ShardResult;
use crate::topology::ShardId;
use crate::transport::{CursorStore, RemoteCursor};

pub const WRITE_CONCERN_ERROR: &str = "writeConcernError";

pub fn is_ok(response: &Document) -> bool {
    field_truthy(response, "ok")
}

pub fn error_code(response: &Document) -> Option<i32> {
    response
        .get("code")
        .and_then(as_i64)
        .and_then(|code| i32::try_from(code).ok())
}

pub fn errmsg(response: &Document) -> &str {
    response.get("errmsg").and_then(Value::as_str).unwrap_or("")
}

/// True when a shard rejected the command because the router's partition map is outdated.
pub fn is_stale_signal(response: &Document) -> bool {
    !is_ok(response) && error_code(response).is_some_and(ErrorCode::is_stale_topology)
}

pub fn remote_error(shard: &ShardId, response: &Document) -> RouterError {
    let message = match errmsg(response) {
        "" => format!("failed on shard: {}", Value::Object(response.clone())),
        msg => msg.to_string(),
    };
    RouterError::Remote {
        shard: shard.to_string(),
        code: error_code(response),
        message,
    }
}

pub fn stale_error(shard: &ShardId, ns: &Namespace, response: &Document, retryable: bool) -> RouterError {
    RouterError::StaleTopology {
        shard: shard.to_string(),
        ns: ns.to_string(),
        message: errmsg(response).to_string(),
        retryable,
    }
}

/// First well-formed failure in dispatch order.
pub fn first_failure(results: &[ShardResult]) -> Option<RouterError> {
    results.iter().find_map(|result| {
        let response = result.response()?;
        (!is_ok(response)).then(|| remote_error(&result.shard_id, response))
    })
}

/// The error code every failing shard agrees on, if they all agree.
///
/// A failing response without a code counts as a disagreement.
pub fn unique_code(results: &[ShardResult]) -> Option<i32> {
    let mut common: Option<i32> = None;
    for response in results.iter().filter_map(ShardResult::response) {
        if is_ok(response) {
            continue;
        }
        let code = error_code(response)?;
        match common {
            None => common = Some(code),
            Some(seen) if seen == code => {}
            Some(_) => return None,
        }
    }
    common
}

fn tagged_write_concern_error(shard: &ShardId, error: &Value) -> Value {
    let mut tagged = match error {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = Document::new();
            fields.insert("errmsg".to_string(), json!(other.to_string()));
            fields
        }
    };
    tagged.insert("shard".to_string(), json!(shard.as_str()));
    Value::Object(tagged)
}

/// Lifts every shard's write-concern error into one shard-tagged slot of `out`.
///
/// One error is copied with a `shard` tag. Several are combined under
/// `raw`, keyed by shard, with their messages joined.
pub fn lift_write_concern_errors(results: &[ShardResult], out: &mut Document) {
    let errors: Vec<(&ShardId, &Value)> = results
        .iter()
        .filter_map(|result| {
            let error = result.response()?.get(WRITE_CONCERN_ERROR)?;
            Some((&result.shard_id, error))
        })
        .collect();

    match errors.as_slice() {
        [] => {}
        [(shard, error)] => {
            out.insert(
                WRITE_CONCERN_ERROR.to_string(),
                tagged_write_concern_error(shard, error),
            );
        }
        many => {
            let mut raw = Document::new();
            let mut messages = Vec::with_capacity(many.len());
            for (shard, error) in many {
                let message = error.get("errmsg").and_then(Value::as_str).unwrap_or("");
                messages.push(format!("{}: {}", shard, message));
                raw.insert(shard.to_string(), (*error).clone());
            }
            let code = many
                .iter()
                .find_map(|(_, error)| error.get("code").and_then(as_i64))
                .unwrap_or(i64::from(ErrorCode::OperationFailed.as_i32()));
            event!(Level::WARN, shards = many.len(), "write concern failed on several shards");
            out.insert(
                WRITE_CONCERN_ERROR.to_string(),
                json!({"code": code, "errmsg": messages.join("; "), "raw": raw}),
            );
        }
    }
}

/// Copies a single shard's response into `out`: the write-concern error first,
/// then every other field not already present.
pub fn merge_passthrough(shard: &ShardId, response: &Document, out: &mut Document) {
    if let Some(error) = response.get(WRITE_CONCERN_ERROR) {
        out.insert(
            WRITE_CONCERN_ERROR.to_string(),
            tagged_write_concern_error(shard, error),
        );
    }
    append_unique(out, response, &["ok", WRITE_CONCERN_ERROR]);
}

/// Adopts a live cursor in `response` and rewrites its id to the router-issued one.
///
/// Responses without a cursor, or with an exhausted one (`id == 0`), are returned unchanged.
pub async fn wrap_cursor(
    store: &dyn CursorStore,
    shard: &ShardId,
    ns: &Namespace,
    mut response: Document,
) -> Result<Document> {
    let remote_id = match response.get("cursor") {
        Some(Value::Object(cursor)) => match cursor.get("id").and_then(as_i64) {
            Some(id) => id,
            None => {
                return Err(RouterError::Remote {
                    shard: shard.to_string(),
                    code: Some(ErrorCode::TypeMismatch.as_i32()),
                    message: "cursor response is missing a numeric 'id'".to_string(),
                });
            }
        },
        _ => return Ok(response),
    };
    if remote_id == 0 {
        return Ok(response);
    }

    let router_id = store
        .register(RemoteCursor {
            shard: shard.clone(),
            ns: ns.clone(),
            remote_id,
        })
        .await?;
    if let Some(Value::Object(cursor)) = response.get_mut("cursor") {
        cursor.insert("id".to_string(), json!(router_id));
    }
    event!(Level::DEBUG, shard = %shard, remote_id, router_id, "adopted shard cursor");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use crate::router::result::ShardOutcome;
    use crate::topology::Endpoint;
    use crate::transport::InMemoryCursorStore;

    fn result(shard: &str, response: Value) -> ShardResult {
        ShardResult::new(
            Endpoint::new(shard, format!("{}:27018", shard)),
            ShardOutcome::Response(doc(response)),
        )
    }

    #[test]
    fn stale_signal_needs_failure_and_stale_code() {
        assert!(is_stale_signal(&doc(json!({"ok": 0, "code": 13388}))));
        assert!(!is_stale_signal(&doc(json!({"ok": 1, "code": 13388}))));
        assert!(!is_stale_signal(&doc(json!({"ok": 0, "code": 2}))));
    }

    #[test]
    fn missing_ok_counts_as_failure() {
        assert!(!is_ok(&doc(json!({"n": 1}))));
    }

    #[test]
    fn unique_code_requires_agreement() {
        let agreeing = vec![
            result("s0", json!({"ok": 0, "code": 26})),
            result("s1", json!({"ok": 1})),
            result("s2", json!({"ok": 0, "code": 26})),
        ];
        assert_eq!(unique_code(&agreeing), Some(26));

        let disagreeing = vec![
            result("s0", json!({"ok": 0, "code": 26})),
            result("s1", json!({"ok": 0, "code": 2})),
        ];
        assert_eq!(unique_code(&disagreeing), None);

        let all_ok = vec![result("s0", json!({"ok": 1}))];
        assert_eq!(unique_code(&all_ok), None);
    }

    #[test]
    fn passthrough_lifts_write_concern_error_once() {
        let response = doc(json!({
            "n": 1,
            "writeConcernError": {"code": 64, "errmsg": "waiting for replication timed out"},
            "ok": 1
        }));
        let mut out = Document::new();
        merge_passthrough(&ShardId::new("s0"), &response, &mut out);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["writeConcernError", "n"]);
        assert_eq!(out["writeConcernError"]["shard"], json!("s0"));
        assert_eq!(out["writeConcernError"]["code"], json!(64));
    }

    #[test]
    fn several_write_concern_errors_are_combined() {
        let results = vec![
            result("s0", json!({"ok": 1, "writeConcernError": {"code": 64, "errmsg": "a"}})),
            result("s1", json!({"ok": 1})),
            result("s2", json!({"ok": 1, "writeConcernError": {"code": 64, "errmsg": "b"}})),
        ];
        let mut out = Document::new();
        lift_write_concern_errors(&results, &mut out);
        let lifted = &out["writeConcernError"];
        assert_eq!(lifted["errmsg"], json!("s0: a; s2: b"));
        assert!(lifted["raw"].get("s0").is_some());
        assert!(lifted["raw"].get("s1").is_none());
    }

    #[tokio::test]
    async fn live_cursor_gets_router_id() {
        let store = InMemoryCursorStore::new();
        let ns = Namespace::command_namespace("app", "listCollections").unwrap();
        let response = doc(json!({"cursor": {"id": 777, "ns": "app.$cmd.listCollections", "firstBatch": []}, "ok": 1}));
        let wrapped = wrap_cursor(&store, &ShardId::new("s0"), &ns, response).await.unwrap();
        let router_id = wrapped["cursor"]["id"].as_i64().unwrap();
        let adopted = store.lookup(router_id).await.unwrap().unwrap();
        assert_eq!(adopted.remote_id, 777);

        let exhausted = doc(json!({"cursor": {"id": 0, "firstBatch": []}, "ok": 1}));
        let unchanged = wrap_cursor(&store, &ShardId::new("s0"), &ns, exhausted.clone()).await.unwrap();
        assert_eq!(unchanged, exhausted);
        assert_eq!(store.len().await, 1);
    }
}
