//! Sum/rollup family: `collStats` and `dataSize`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{Level, event};

use crate::commands::{collection_required, fully_qualified, CommandFamily, Invocation, RoutableCommand};
use crate::config::RollupFieldPolicy;
use crate::core::document::{as_f64, as_i64, long_or_zero, number_or_zero, Document};
use crate::core::{Namespace, Result, RouterError};
use crate::router::classifier::{self, Placement};
use crate::router::context::RouterContext;
use crate::router::dispatcher::{self, RemovedShardPolicy};
use crate::router::normalize::{first_failure, lift_write_concern_errors, WRITE_CONCERN_ERROR};
use crate::router::result::CommandOutcome;
use crate::topology::ShardId;

const INDEX_MISMATCH_WARNING: &str = "indexes don't all match - ok if an index build is running";

/// Running state of one `collStats` merge.
struct CollStatsRollup<'a> {
    policy: &'a RollupFieldPolicy,
    /// First-wins fields, in the order first seen.
    copied: Document,
    sums: BTreeMap<String, i64>,
    index_sizes: BTreeMap<String, i64>,
    /// Σ avgObjSize_i × count_i, before any scale factor.
    unscaled_size: f64,
    nindexes: i64,
    warned_about_indexes: bool,
    shards: Document,
}

impl<'a> CollStatsRollup<'a> {
    fn new(policy: &'a RollupFieldPolicy) -> Self {
        Self {
            policy,
            copied: Document::new(),
            sums: BTreeMap::new(),
            index_sizes: BTreeMap::new(),
            unscaled_size: 0.0,
            nindexes: 0,
            warned_about_indexes: false,
            shards: Document::new(),
        }
    }

    fn add(&mut self, shard: &ShardId, response: &Document) {
        let mut shard_count = 0i64;
        let mut shard_avg = 0.0f64;
        for (field, value) in response {
            let field = field.as_str();
            if field == WRITE_CONCERN_ERROR || self.policy.is_skipped(field) {
                continue;
            }
            if self.policy.is_summed(field) {
                let n = as_i64(value).unwrap_or(0);
                *self.sums.entry(field.to_string()).or_insert(0) += n;
                if field == "count" {
                    shard_count = n;
                }
                continue;
            }
            match field {
                "avgObjSize" => shard_avg = as_f64(value).unwrap_or(0.0),
                "indexSizes" => {
                    if let Value::Object(sizes) = value {
                        for (index, size) in sizes {
                            *self.index_sizes.entry(index.clone()).or_insert(0) += as_i64(size).unwrap_or(0);
                        }
                    }
                }
                "nindexes" => self.add_nindexes(as_i64(value).unwrap_or(0)),
                _ if self.policy.is_copied_once(field) => {
                    if !self.copied.contains_key(field) {
                        self.copied.insert(field.to_string(), value.clone());
                    }
                }
                _ => {
                    event!(Level::WARN, field, shard = %shard, "collStats rollup does not know field");
                }
            }
        }
        self.unscaled_size += shard_avg * shard_count as f64;
        self.shards.insert(shard.to_string(), Value::Object(response.clone()));
    }

    fn add_nindexes(&mut self, reported: i64) {
        if self.nindexes == 0 {
            self.nindexes = reported;
        } else if self.nindexes != reported {
            self.nindexes = self.nindexes.max(reported);
            if !self.warned_about_indexes {
                event!(Level::INFO, "collStats shards disagree on index count");
                self.copied.insert("warning".to_string(), json!(INDEX_MISMATCH_WARNING));
                self.warned_about_indexes = true;
            }
        }
    }

    fn finish(self, ns: &Namespace, nchunks: usize, mut body: Document) -> Document {
        body.insert("sharded".to_string(), json!(true));
        for (field, value) in self.copied {
            body.insert(field, value);
        }
        body.insert("ns".to_string(), json!(ns.to_string()));
        let total_count = self.sums.get("count").copied().unwrap_or(0);
        for (field, sum) in self.sums {
            body.insert(field, json!(sum));
        }
        let index_sizes: Document = self
            .index_sizes
            .into_iter()
            .map(|(index, size)| (index, json!(size)))
            .collect();
        body.insert("indexSizes".to_string(), Value::Object(index_sizes));
        let avg = if total_count > 0 {
            self.unscaled_size / total_count as f64
        } else {
            0.0
        };
        body.insert("avgObjSize".to_string(), json!(avg));
        body.insert("nindexes".to_string(), json!(self.nindexes));
        body.insert("nchunks".to_string(), json!(nchunks));
        body.insert("shards".to_string(), Value::Object(self.shards));
        body
    }
}

/// `collStats` / `collstats`
pub struct CollStatsCommand;

#[async_trait]
impl RoutableCommand for CollStatsCommand {
    fn name(&self) -> &'static str {
        "collStats"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["collstats"]
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Rollup
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        collection_required(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let descriptor = match classifier::placement(ctx, &inv.ns).await? {
            Placement::Primary { database } => {
                let mut prefix = Document::new();
                prefix.insert("sharded".to_string(), json!(false));
                prefix.insert("primary".to_string(), json!(database.primary.as_str()));
                return dispatcher::passthrough_with_prefix(
                    ctx,
                    &database.primary,
                    &inv.db,
                    &inv.ns,
                    &inv.command,
                    inv.options,
                    prefix,
                )
                .await;
            }
            Placement::Partitioned { descriptor, .. } => descriptor,
        };

        let results = dispatcher::scatter(
            ctx,
            descriptor.all_shard_ids(),
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

        let mut rollup = CollStatsRollup::new(&ctx.config.rollup);
        for result in &results {
            rollup.add(&result.shard_id, result.document()?);
        }
        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        Ok(CommandOutcome::success(rollup.finish(
            &inv.ns,
            descriptor.num_chunks(),
            body,
        )))
    }
}

fn object_or_empty(command: &Document, field: &str) -> Document {
    match command.get(field) {
        Some(Value::Object(obj)) => obj.clone(),
        _ => Document::new(),
    }
}

/// `dataSize` / `datasize`: sums sizes over the shards owning `[min, max]`.
pub struct DataSizeCommand;

#[async_trait]
impl RoutableCommand for DataSizeCommand {
    fn name(&self) -> &'static str {
        "dataSize"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["datasize"]
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Rollup
    }

    fn parse_namespace(&self, _db: &str, command: &Document) -> Result<Namespace> {
        fully_qualified(command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let db = inv.ns.db();
        let descriptor = match classifier::placement(ctx, &inv.ns).await? {
            Placement::Primary { database } => {
                return dispatcher::passthrough(ctx, &database.primary, db, &inv.ns, &inv.command, inv.options)
                    .await;
            }
            Placement::Partitioned { descriptor, .. } => descriptor,
        };

        let pattern = descriptor.key_pattern();
        let key_pattern = object_or_empty(&inv.command, "keyPattern");
        if !pattern.matches_exactly(&key_pattern) {
            return Err(RouterError::Rejected {
                code: 13408,
                message: "keyPattern must equal shard key".to_string(),
            });
        }
        let min = object_or_empty(&inv.command, "min");
        if !pattern.is_shard_key(&min) {
            return Err(RouterError::Rejected {
                code: 13405,
                message: format!("min value {} does not have shard key", Value::Object(min)),
            });
        }
        let max = object_or_empty(&inv.command, "max");
        if !pattern.is_shard_key(&max) {
            return Err(RouterError::Rejected {
                code: 13406,
                message: format!("max value {} does not have shard key", Value::Object(max)),
            });
        }
        let min = pattern.normalize(&min)?;
        let max = pattern.normalize(&max)?;

        let results = dispatcher::scatter(
            ctx,
            descriptor.shards_for_range(&min, &max),
            db,
            &inv.ns,
            &inv.command,
            inv.options,
            RemovedShardPolicy::Skip,
        )
        .await?;
        if let Some(err) = first_failure(&results) {
            return Err(err);
        }

        let mut size = 0.0f64;
        let mut num_objects = 0.0f64;
        let mut millis = 0i64;
        for result in &results {
            let response = result.document()?;
            size += number_or_zero(response, "size");
            num_objects += number_or_zero(response, "numObjects");
            millis += long_or_zero(response, "millis");
        }

        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        body.insert("size".to_string(), json!(size));
        body.insert("numObjects".to_string(), json!(num_objects));
        body.insert("millis".to_string(), json!(millis));
        Ok(CommandOutcome::success(body))
    }
}
