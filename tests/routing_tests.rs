mod cluster_utils;

use cluster_utils::{Cluster, connection_string};
use serde_json::json;
use shardroute::core::document::doc;
use shardroute::topology::{DatabaseInfo, ShardId};
use shardroute::transport::CommandOptions;

#[tokio::test]
async fn unpartitioned_collection_only_reaches_primary() {
    let cluster = Cluster::new(&["s0", "s1", "s2"]);
    for shard in ["s0", "s1", "s2"] {
        cluster.respond(shard, json!({"values": [shard], "ok": 1})).await;
    }

    let reply = cluster
        .run("app", json!({"distinct": "logs", "key": "level", "query": {"level": "warn"}}))
        .await;

    assert_eq!(reply["values"], json!(["s0"]));
    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(cluster.contacted().await, vec!["s0"]);
}

#[tokio::test]
async fn empty_predicate_reaches_every_owner() {
    let cluster = Cluster::new(&["s0", "s1", "s2"]);
    cluster.shard_users(&["s0", "s1", "s2"]);
    for shard in ["s0", "s1", "s2"] {
        cluster.respond(shard, json!({"values": [], "ok": 1})).await;
    }

    let reply = cluster.run("app", json!({"distinct": "users", "key": "age"})).await;

    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(cluster.contacted().await, vec!["s0", "s1", "s2"]);
}

#[tokio::test]
async fn key_predicate_targets_owning_shard() {
    let cluster = Cluster::new(&["s0", "s1", "s2"]);
    cluster.shard_users(&["s0", "s1", "s2"]);
    for shard in ["s0", "s1", "s2"] {
        cluster.respond(shard, json!({"values": [shard], "ok": 1})).await;
    }

    let reply = cluster
        .run("app", json!({"distinct": "users", "key": "age", "query": {"uid": 150}}))
        .await;

    assert_eq!(reply["values"], json!(["s1"]));
    assert_eq!(cluster.contacted().await, vec!["s1"]);
}

#[tokio::test]
async fn removed_shard_is_skipped_by_rollups() {
    let cluster = Cluster::new(&["s0", "s1", "s2"]);
    cluster.shard_users(&["s0", "s1", "s2"]);
    for shard in ["s0", "s1", "s2"] {
        cluster.respond(shard, json!({"count": 1, "ok": 1})).await;
    }
    assert!(cluster.directory.remove_shard(&ShardId::new("s2")).unwrap());

    let reply = cluster.run("app", json!({"collStats": "users"})).await;

    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(reply["count"], json!(2));
    assert_eq!(cluster.contacted().await, vec!["s0", "s1"]);
}

#[tokio::test]
async fn removed_shard_fails_pass_fail_commands() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.shard_users(&["s0", "s1"]);
    cluster.respond("s0", json!({"valid": true, "ok": 1})).await;
    cluster.directory.remove_shard(&ShardId::new("s1")).unwrap();

    let reply = cluster.run("app", json!({"validate": "users"})).await;

    assert_eq!(reply["ok"], json!(0.0));
    assert_eq!(reply["codeName"], json!("ShardNotFound"));
    assert_eq!(cluster.executor.call_count().await, 0);
}

#[tokio::test]
async fn disallowed_commands_never_dispatch_on_partitioned_collections() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.shard_users(&["s0", "s1"]);
    cluster.respond("s0", json!({"ok": 1})).await;

    for command in [
        json!({"convertToCapped": "users", "size": 1024}),
        json!({"group": {"ns": "users", "key": {"age": 1}}}),
        json!({"splitVector": "app.users", "keyPattern": {"uid": 1}}),
    ] {
        let reply = cluster.run("app", command).await;
        assert_eq!(reply["code"], json!(20));
        assert_eq!(reply["codeName"], json!("IllegalOperation"));
    }
    assert_eq!(cluster.executor.call_count().await, 0);

    let reply = cluster.run("app", json!({"convertToCapped": "logs", "size": 1024})).await;
    assert_eq!(reply["ok"], json!(1.0));
    assert_eq!(cluster.contacted().await, vec!["s0"]);
}

#[tokio::test]
async fn compact_is_always_rejected() {
    let cluster = Cluster::new(&["s0"]);
    cluster.respond("s0", json!({"ok": 1})).await;

    let reply = cluster.run("app", json!({"compact": "logs"})).await;

    assert_eq!(reply["code"], json!(20));
    assert_eq!(cluster.executor.call_count().await, 0);
}

#[tokio::test]
async fn rename_rejections_carry_their_codes() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.shard_users(&["s0", "s1"]);
    cluster.topology.add_database(DatabaseInfo::new("other", "s1")).unwrap();
    cluster.respond("s0", json!({"ok": 1})).await;

    let reply = cluster
        .run("admin", json!({"renameCollection": "app.users", "to": "app.archive"}))
        .await;
    assert_eq!(reply["code"], json!(13138));

    let reply = cluster
        .run("admin", json!({"renameCollection": "app.logs", "to": "app.users"}))
        .await;
    assert_eq!(reply["code"], json!(13139));

    let reply = cluster
        .run("admin", json!({"renameCollection": "app.logs", "to": "other.logs"}))
        .await;
    assert_eq!(reply["code"], json!(13137));
    assert_eq!(cluster.executor.call_count().await, 0);

    let reply = cluster
        .run("admin", json!({"renameCollection": "app.logs", "to": "app.logs_old"}))
        .await;
    assert_eq!(reply["ok"], json!(1.0));
    let calls = cluster.executor.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].db, "admin");
}

#[tokio::test]
async fn copydb_injects_source_primary_as_fromhost() {
    let cluster = Cluster::new(&["s0", "s1", "s2"]);
    cluster.topology.add_database(DatabaseInfo::new("src", "s1")).unwrap();
    cluster.topology.add_database(DatabaseInfo::new("dst", "s2")).unwrap();
    cluster.respond("s2", json!({"ok": 1})).await;

    let reply = cluster
        .run("admin", json!({"copydb": 1, "fromdb": "src", "todb": "dst"}))
        .await;

    assert_eq!(reply["ok"], json!(1.0));
    let calls = cluster.executor.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].shard, ShardId::new("s2"));
    assert_eq!(calls[0].db, "admin");
    assert_eq!(calls[0].command["fromhost"], json!(connection_string("s1")));
}

#[tokio::test]
async fn copydb_refuses_partitioned_databases() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.shard_users(&["s0", "s1"]);
    cluster.topology.add_database(DatabaseInfo::new("backup", "s1")).unwrap();

    let reply = cluster
        .run("admin", json!({"copydb": 1, "fromdb": "app", "todb": "backup"}))
        .await;
    assert_eq!(reply["code"], json!(20));
    assert!(reply["errmsg"].as_str().unwrap().contains("copy from a sharded database"));

    let reply = cluster
        .run("admin", json!({"copydb": 1, "fromdb": "backup", "todb": "app"}))
        .await;
    assert!(reply["errmsg"].as_str().unwrap().contains("copy to a sharded database"));
    assert_eq!(cluster.executor.call_count().await, 0);
}

#[tokio::test]
async fn list_collections_cursor_gets_router_id() {
    let cluster = Cluster::new(&["s0"]);
    cluster
        .respond(
            "s0",
            json!({
                "cursor": {"id": 9001, "ns": "app.$cmd.listCollections", "firstBatch": [{"name": "logs"}]},
                "ok": 1
            }),
        )
        .await;

    let options = CommandOptions::with_flags(CommandOptions::SECONDARY_OK);
    let outcome = cluster
        .router
        .run_command("app", &doc(json!({"listCollections": 1})), options)
        .await
        .unwrap();

    assert_eq!(outcome.body["cursor"]["id"], json!(1));
    assert_eq!(outcome.body["cursor"]["firstBatch"], json!([{"name": "logs"}]));
    let calls = cluster.executor.calls().await;
    assert!(calls[0].options.contains(CommandOptions::SECONDARY_OK));

    let cursor = cluster.router.context().cursors.lookup(1).await.unwrap().unwrap();
    assert_eq!(cursor.remote_id, 9001);
    assert_eq!(cursor.ns.to_string(), "app.$cmd.listCollections");
}

#[tokio::test]
async fn exhausted_cursor_is_left_alone() {
    let cluster = Cluster::new(&["s0"]);
    cluster
        .respond("s0", json!({"cursor": {"id": 0, "firstBatch": []}, "ok": 1}))
        .await;

    let reply = cluster.run("app", json!({"listIndexes": "logs"})).await;

    assert_eq!(reply["cursor"]["id"], json!(0));
    assert_eq!(reply["ok"], json!(1.0));
}

#[tokio::test]
async fn eval_relays_primary_answer() {
    let cluster = Cluster::new(&["s0", "s1"]);
    cluster.respond("s0", json!({"retval": 3, "ok": 1})).await;

    let reply = cluster.run("app", json!({"$eval": "1 + 2"})).await;

    assert_eq!(reply["retval"], json!(3));
    assert_eq!(cluster.contacted().await, vec!["s0"]);
}

#[tokio::test]
async fn unreachable_primary_is_a_transport_error() {
    let cluster = Cluster::new(&["s0"]);

    let reply = cluster.run("app", json!({"create": "logs"})).await;

    assert_eq!(reply["ok"], json!(0.0));
    assert_eq!(reply["codeName"], json!("HostUnreachable"));
    assert_eq!(reply["shard"], json!("s0"));
}
