mod cluster_utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cluster_utils::{Cluster, users_descriptor};
use serde_json::json;
use shardroute::RouterConfig;
use shardroute::core::document::doc;
use shardroute::transport::ShardRequest;

fn stale_reply() -> serde_json::Value {
    json!({"ok": 0, "code": 13388, "errmsg": "version mismatch detected for app.users"})
}

/// Answers stale for the first `stale_calls` requests, then `response`.
async fn stale_then(cluster: &Cluster, shard: &str, stale_calls: usize, response: serde_json::Value) {
    let seen = Arc::new(AtomicUsize::new(0));
    cluster
        .handle(shard, move |_: &ShardRequest| {
            if seen.fetch_add(1, Ordering::SeqCst) < stale_calls {
                Ok(doc(stale_reply()))
            } else {
                Ok(doc(response.clone()))
            }
        })
        .await;
}

#[tokio::test]
async fn passthrough_refreshes_once_and_retries() {
    let cluster = Cluster::new(&["s0"]);
    stale_then(&cluster, "s0", 1, json!({"ok": 1})).await;

    let reply = cluster.run("app", json!({"create": "logs"})).await;

    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(cluster.topology.refresh_count(), 1);
    assert_eq!(cluster.executor.call_count().await, 2);
}

#[tokio::test]
async fn persistent_staleness_surfaces_after_the_budget() {
    let cluster = Cluster::new(&["s0"]);
    cluster.respond("s0", stale_reply()).await;

    let reply = cluster.run("app", json!({"create": "logs"})).await;

    assert_eq!(reply["ok"], json!(0.0));
    assert_eq!(reply["code"], json!(13388));
    assert_eq!(reply["codeName"], json!("StaleConfig"));
    assert_eq!(reply["shard"], json!("s0"));
    assert_eq!(cluster.topology.refresh_count(), 1);
    assert_eq!(cluster.executor.call_count().await, 2);
}

#[tokio::test]
async fn retry_budget_is_configurable() {
    let cluster = Cluster::with_config(&["s0"], RouterConfig::default().max_stale_retries(0));
    stale_then(&cluster, "s0", 1, json!({"ok": 1})).await;

    let reply = cluster.run("app", json!({"create": "logs"})).await;

    assert_eq!(reply["code"], json!(13388));
    assert_eq!(cluster.topology.refresh_count(), 0);
    assert_eq!(cluster.executor.call_count().await, 1);
}

#[tokio::test]
async fn scatter_staleness_is_not_retried() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.shard_users(&["s0", "s1"]);
    cluster.respond("s0", json!({"count": 1, "ok": 1})).await;
    cluster.respond("s1", stale_reply()).await;

    let reply = cluster.run("app", json!({"collStats": "users"})).await;

    assert_eq!(reply["code"], json!(13388));
    assert_eq!(reply["shard"], json!("s1"));
    assert_eq!(cluster.topology.refresh_count(), 0);
    assert_eq!(cluster.executor.call_count().await, 2);
}

#[tokio::test]
async fn refresh_discovers_newly_partitioned_collection() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.topology.publish(users_descriptor(&["s0", "s1"], 2)).unwrap();
    stale_then(&cluster, "s0", 1, json!({"count": 2, "ok": 1})).await;
    cluster.respond("s1", json!({"count": 3, "ok": 1})).await;

    let reply = cluster.run("app", json!({"collStats": "users"})).await;

    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(reply["sharded"], json!(true));
    assert_eq!(reply["count"], json!(5));
    assert_eq!(cluster.topology.refresh_count(), 1);
    assert_eq!(cluster.contacted().await, vec!["s0", "s0", "s1"]);
}
