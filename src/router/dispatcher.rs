use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{Level, event};

use crate::core::{Document, Namespace, Result, RouterError};
use crate::router::context::RouterContext;
use crate::router::normalize::{is_ok, is_stale_signal, merge_passthrough, stale_error};
use crate::router::result::{CommandOutcome, ShardOutcome, ShardResult};
use crate::topology::{Endpoint, ShardId};
use crate::transport::{CommandOptions, ShardExecutor, TransportError};

/// What a scatter round does with a shard the directory no longer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovedShardPolicy {
    /// Leave the shard out of the round.
    Skip,
    /// Fail the command with `ShardNotFound`.
    Fail,
}

/// Issues one call and waits at most `timeout` for it. A timeout is a transport failure.
pub async fn call_endpoint(
    executor: &dyn ShardExecutor,
    endpoint: Endpoint,
    db: &str,
    command: &Document,
    options: CommandOptions,
    timeout: Duration,
) -> ShardResult {
    let outcome = match tokio::time::timeout(timeout, executor.execute(&endpoint, db, command, options)).await {
        Ok(Ok(response)) => ShardOutcome::Response(response),
        Ok(Err(err)) => ShardOutcome::TransportFailure(err),
        Err(_) => ShardOutcome::TransportFailure(TransportError::timeout(format!(
            "no answer from {} within {}ms",
            endpoint.connection_string,
            timeout.as_millis()
        ))),
    };
    if let ShardOutcome::TransportFailure(err) = &outcome {
        event!(Level::WARN, shard = %endpoint.shard_id, error = %err, "shard call failed");
    }
    ShardResult::new(endpoint, outcome)
}

/// Resolves `shard` and issues one call to it.
pub async fn call_shard(
    ctx: &RouterContext,
    shard: &ShardId,
    db: &str,
    command: &Document,
    options: CommandOptions,
) -> Result<ShardResult> {
    let endpoint = ctx.directory.resolve(shard).await?;
    Ok(call_endpoint(
        ctx.executor.as_ref(),
        endpoint,
        db,
        command,
        options,
        ctx.config.shard_timeout_duration(),
    )
    .await)
}

/// Forwards `command` to a single shard and relays its answer.
///
/// The shard's `ok` decides the outcome. A stale-topology answer is returned
/// as a retryable `StaleTopology` error.
pub async fn passthrough(
    ctx: &RouterContext,
    shard: &ShardId,
    db: &str,
    ns: &Namespace,
    command: &Document,
    options: CommandOptions,
) -> Result<CommandOutcome> {
    passthrough_with_prefix(ctx, shard, db, ns, command, options, Document::new()).await
}

/// Like [`passthrough`], but the reply starts with the fields of `prefix`.
pub async fn passthrough_with_prefix(
    ctx: &RouterContext,
    shard: &ShardId,
    db: &str,
    ns: &Namespace,
    command: &Document,
    options: CommandOptions,
    prefix: Document,
) -> Result<CommandOutcome> {
    let result = call_shard(ctx, shard, db, command, options).await?;
    let response = result.document()?;
    if is_stale_signal(response) {
        event!(Level::INFO, shard = %result.shard_id, ns = %ns, "stale topology on passthrough");
        return Err(stale_error(&result.shard_id, ns, response, true));
    }
    let mut body = prefix;
    merge_passthrough(&result.shard_id, response, &mut body);
    Ok(CommandOutcome {
        ok: is_ok(response),
        body,
    })
}

/// Sends `command` to every target and waits for all of them.
///
/// Targets are deduplicated, keeping the first occurrence. At most
/// `max_concurrency` calls are in flight and results keep dispatch order. Any
/// transport failure fails the round. So does a stale-topology answer, which
/// comes back as a non-retryable `StaleTopology` error. Well-formed failures
/// are returned for the merge to judge.
pub async fn scatter<I>(
    ctx: &RouterContext,
    targets: I,
    db: &str,
    ns: &Namespace,
    command: &Document,
    options: CommandOptions,
    policy: RemovedShardPolicy,
) -> Result<Vec<ShardResult>>
where
    I: IntoIterator<Item = ShardId>,
{
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();
    for shard in targets {
        if !seen.insert(shard.clone()) {
            continue;
        }
        match ctx.directory.resolve(&shard).await {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(RouterError::ShardNotFound(_)) if policy == RemovedShardPolicy::Skip => {
                event!(Level::DEBUG, shard = %shard, ns = %ns, "skipping removed shard");
            }
            Err(err) => return Err(err),
        }
    }

    event!(Level::DEBUG, ns = %ns, shards = endpoints.len(), "scatter round started");
    let executor = ctx.executor.as_ref();
    let timeout = ctx.config.shard_timeout_duration();
    let results: Vec<ShardResult> = stream::iter(endpoints)
        .map(|endpoint| call_endpoint(executor, endpoint, db, command, options, timeout))
        .buffered(ctx.config.max_concurrency.max(1))
        .collect()
        .await;

    for result in &results {
        let response = result.document()?;
        if is_stale_signal(response) {
            event!(Level::INFO, shard = %result.shard_id, ns = %ns, "stale topology inside scatter round");
            return Err(stale_error(&result.shard_id, ns, response, false));
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::RouterConfig;
    use crate::core::document::doc;
    use crate::topology::{InMemoryShardDirectory, InMemoryTopology};
    use crate::transport::{InMemoryShardExecutor, respond_with};
    use serde_json::json;

    async fn context(executor: &InMemoryShardExecutor, config: RouterConfig) -> RouterContext {
        let directory = InMemoryShardDirectory::new();
        for shard in ["s0", "s1", "s2"] {
            directory.add_shard(shard, format!("{}:27018", shard)).unwrap();
        }
        RouterContext::new(
            Arc::new(InMemoryTopology::new()),
            Arc::new(directory),
            Arc::new(executor.clone()),
        )
        .with_config(config)
    }

    fn ids(names: &[&str]) -> Vec<ShardId> {
        names.iter().map(|n| ShardId::new(*n)).collect()
    }

    #[tokio::test]
    async fn scatter_dedupes_and_keeps_dispatch_order() {
        let executor = InMemoryShardExecutor::new();
        for shard in ["s0", "s1", "s2"] {
            executor
                .register_shard(shard, respond_with(doc(json!({"ok": 1, "from": shard}))))
                .await;
        }
        let ctx = context(&executor, RouterConfig::default().max_concurrency(2)).await;
        let ns = Namespace::parse("app.users").unwrap();
        let results = scatter(
            &ctx,
            ids(&["s2", "s0", "s2", "s1"]),
            "app",
            &ns,
            &doc(json!({"count": "users"})),
            CommandOptions::none(),
            RemovedShardPolicy::Fail,
        )
        .await
        .unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.shard_id.as_str()).collect();
        assert_eq!(order, vec!["s2", "s0", "s1"]);
        assert_eq!(executor.call_count().await, 3);
    }

    #[tokio::test]
    async fn slow_shard_times_out_the_round() {
        let executor = InMemoryShardExecutor::new();
        executor.register_shard("s0", respond_with(doc(json!({"ok": 1})))).await;
        executor
            .register_shard_with_delay(
                "s1",
                Some(Duration::from_millis(200)),
                respond_with(doc(json!({"ok": 1}))),
            )
            .await;
        let config = RouterConfig::default().shard_timeout(Duration::from_millis(20));
        let ctx = context(&executor, config).await;
        let ns = Namespace::parse("app.users").unwrap();
        let err = scatter(
            &ctx,
            ids(&["s0", "s1"]),
            "app",
            &ns,
            &doc(json!({"count": "users"})),
            CommandOptions::none(),
            RemovedShardPolicy::Fail,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RouterError::Transport { timed_out: true, ref shard, .. } if shard == "s1"));
    }

    #[tokio::test]
    async fn stale_answer_inside_scatter_is_not_retryable() {
        let executor = InMemoryShardExecutor::new();
        executor.register_shard("s0", respond_with(doc(json!({"ok": 1})))).await;
        executor
            .register_shard(
                "s1",
                respond_with(doc(json!({"ok": 0, "code": 13388, "errmsg": "stale config"}))),
            )
            .await;
        let ctx = context(&executor, RouterConfig::default()).await;
        let ns = Namespace::parse("app.users").unwrap();
        let err = scatter(
            &ctx,
            ids(&["s0", "s1"]),
            "app",
            &ns,
            &doc(json!({"count": "users"})),
            CommandOptions::none(),
            RemovedShardPolicy::Skip,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RouterError::StaleTopology { retryable: false, .. }));
    }

    #[tokio::test]
    async fn passthrough_relays_failure_without_erroring() {
        let executor = InMemoryShardExecutor::new();
        executor
            .register_shard(
                "s0",
                respond_with(doc(json!({"ok": 0, "code": 26, "errmsg": "ns not found"}))),
            )
            .await;
        let ctx = context(&executor, RouterConfig::default()).await;
        let ns = Namespace::parse("app.users").unwrap();
        let outcome = passthrough(
            &ctx,
            &ShardId::new("s0"),
            "app",
            &ns,
            &doc(json!({"validate": "users"})),
            CommandOptions::none(),
        )
        .await
        .unwrap();
        assert!(!outcome.ok);
        assert_eq!(outcome.errmsg(), Some("ns not found"));
        assert_eq!(outcome.body["code"], json!(26));
    }
}
