//! K-way merge family: `geoNear`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::commands::{collection_required, CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{number_or_zero, optional_number, Document};
use crate::core::{ErrorCode, Namespace, Result, RouterError};
use crate::router::classifier::{self, targeting_collation, targeting_query, Placement};
use crate::router::context::RouterContext;
use crate::router::dispatcher::{self, RemovedShardPolicy};
use crate::router::normalize::{first_failure, lift_write_concern_errors};
use crate::router::result::CommandOutcome;
use crate::topology::ShardId;

/// Result limit: the smaller of `num` and `limit` when both are given, else
/// whichever is present, else the configured default.
pub fn result_limit(command: &Document, default: u64) -> Result<usize> {
    let mut limit: Option<f64> = None;
    for field in ["num", "limit"] {
        let Some(n) = optional_number(command, field)? else {
            continue;
        };
        if n < 0.0 {
            return Err(RouterError::BadValue(format!(
                "\"{}\" must not be negative, got {}",
                field, n
            )));
        }
        limit = Some(limit.map_or(n, |seen| seen.min(n)));
    }
    Ok(limit.map_or(default as usize, |n| n as usize))
}

#[derive(Debug, Clone, Copy)]
struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Nearest-first candidates, bounded to `limit` entries.
///
/// Equal distances keep arrival order.
struct NearestCandidates {
    limit: usize,
    seq: u64,
    kept: BTreeMap<(Distance, u64), Value>,
}

impl NearestCandidates {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            seq: 0,
            kept: BTreeMap::new(),
        }
    }

    fn offer(&mut self, distance: f64, candidate: Value) {
        self.kept.insert((Distance(distance), self.seq), candidate);
        self.seq += 1;
        if self.kept.len() > self.limit {
            self.kept.pop_last();
        }
    }

    fn into_sorted(self) -> Vec<(f64, Value)> {
        self.kept
            .into_iter()
            .map(|((distance, _), candidate)| (distance.0, candidate))
            .collect()
    }
}

#[derive(Debug, Default)]
struct SearchStats {
    time: f64,
    btreelocs: f64,
    nscanned: f64,
    objects_loaded: f64,
}

impl SearchStats {
    fn add(&mut self, response: &Document) {
        let Some(Value::Object(stats)) = response.get("stats") else {
            return;
        };
        self.time += number_or_zero(stats, "time");
        self.btreelocs += number_or_zero(stats, "btreelocs");
        self.nscanned += number_or_zero(stats, "nscanned");
        self.objects_loaded += number_or_zero(stats, "objectsLoaded");
    }
}

fn candidate_distance(shard: &ShardId, candidate: &Value) -> Result<f64> {
    match candidate.get("dis").and_then(Value::as_f64) {
        Some(distance) => Ok(distance),
        None => Err(RouterError::Remote {
            shard: shard.to_string(),
            code: Some(ErrorCode::TypeMismatch.as_i32()),
            message: "geoNear result is missing a numeric \"dis\"".to_string(),
        }),
    }
}

/// `geoNear`: merges per-shard nearest lists by distance and keeps the closest `limit`.
pub struct GeoNearCommand;

#[async_trait]
impl RoutableCommand for GeoNearCommand {
    fn name(&self) -> &'static str {
        "geoNear"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::KWayMerge
    }

    fn pass_options(&self) -> bool {
        true
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        collection_required(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let descriptor = match classifier::placement(ctx, &inv.ns).await? {
            Placement::Primary { database } => {
                return dispatcher::passthrough(ctx, &database.primary, &inv.db, &inv.ns, &inv.command, inv.options)
                    .await;
            }
            Placement::Partitioned { descriptor, .. } => descriptor,
        };

        let query = targeting_query(&inv.command)?;
        let collation = targeting_collation(&inv.command)?;
        let limit = result_limit(&inv.command, ctx.config.default_geo_limit)?;
        let targets = descriptor.shards_for_query(&query, collation.as_ref());

        let results = dispatcher::scatter(
            ctx,
            targets,
            &inv.db,
            &inv.ns,
            &inv.command,
            inv.options,
            RemovedShardPolicy::Skip,
        )
        .await?;
        if let Some(err) = first_failure(&results) {
            return Err(err);
        }

        let mut near = String::new();
        let mut stats = SearchStats::default();
        let mut candidates = NearestCandidates::new(limit);
        let mut shards = Vec::with_capacity(results.len());
        for result in &results {
            let response = result.document()?;
            shards.push(json!(result.shard_id.as_str()));
            if let Some(Value::String(s)) = response.get("near") {
                near = s.clone();
            }
            stats.add(response);
            if let Some(Value::Array(found)) = response.get("results") {
                for candidate in found {
                    let distance = candidate_distance(&result.shard_id, candidate)?;
                    candidates.offer(distance, candidate.clone());
                }
            }
        }

        let sorted = candidates.into_sorted();
        let total: f64 = sorted.iter().map(|(distance, _)| distance).sum();
        let max_distance = sorted.last().map(|(distance, _)| *distance).unwrap_or(0.0);
        let avg_distance = if sorted.is_empty() {
            0.0
        } else {
            total / sorted.len() as f64
        };
        let emitted: Vec<Value> = sorted.into_iter().map(|(_, candidate)| candidate).collect();

        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        body.insert("ns".to_string(), json!(inv.ns.to_string()));
        body.insert("near".to_string(), json!(near));
        body.insert("results".to_string(), Value::Array(emitted));
        body.insert(
            "stats".to_string(),
            json!({
                "time": stats.time,
                "btreelocs": stats.btreelocs,
                "nscanned": stats.nscanned,
                "objectsLoaded": stats.objects_loaded,
                "avgDistance": avg_distance,
                "maxDistance": max_distance,
                "shards": shards,
            }),
        );
        Ok(CommandOutcome::success(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;

    #[test]
    fn smaller_of_num_and_limit_and_default_applies() {
        assert_eq!(result_limit(&doc(json!({"geoNear": "p", "num": 3, "limit": 10})), 100).unwrap(), 3);
        assert_eq!(result_limit(&doc(json!({"geoNear": "p", "num": 30, "limit": 10})), 100).unwrap(), 10);
        assert_eq!(result_limit(&doc(json!({"geoNear": "p", "limit": 10})), 100).unwrap(), 10);
        assert_eq!(result_limit(&doc(json!({"geoNear": "p"})), 100).unwrap(), 100);
    }

    #[test]
    fn bad_limits_are_rejected() {
        let err = result_limit(&doc(json!({"geoNear": "p", "num": "5"})), 100).unwrap_err();
        assert!(matches!(err, RouterError::TypeMismatch(_)));
        let err = result_limit(&doc(json!({"geoNear": "p", "limit": -1})), 100).unwrap_err();
        assert!(matches!(err, RouterError::BadValue(_)));
    }

    #[test]
    fn candidates_stay_nearest_first_and_bounded() {
        let mut candidates = NearestCandidates::new(3);
        for (distance, id) in [(5.0, "a"), (1.0, "b"), (3.0, "c"), (1.0, "d"), (0.5, "e")] {
            candidates.offer(distance, json!({"dis": distance, "obj": {"_id": id}}));
        }
        let ids: Vec<String> = candidates
            .into_sorted()
            .into_iter()
            .map(|(_, c)| c["obj"]["_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["e", "b", "d"]);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let mut candidates = NearestCandidates::new(0);
        candidates.offer(1.0, json!({"dis": 1.0}));
        assert!(candidates.into_sorted().is_empty());
    }
}
