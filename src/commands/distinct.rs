//! Dedup-union family: `distinct`.

use std::cmp::Ordering;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Level, event};

use crate::commands::{collection_required, CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{type_name, Document};
use crate::core::{compare_values, Collation, ErrorCode, Namespace, Result, RouterError};
use crate::router::classifier::{self, targeting_collation, targeting_query, Placement};
use crate::router::context::RouterContext;
use crate::router::dispatcher::{self, RemovedShardPolicy};
use crate::router::explain::{build_explain_result, stage_for, wrap_as_explain, Verbosity};
use crate::router::normalize::{first_failure, lift_write_concern_errors};
use crate::router::result::{CommandOutcome, ShardResult};

/// Distinct values under one collation.
///
/// Values are gathered in arrival order and sorted once at the end. The
/// output is in the collation's order, and of several values equal under
/// the collation the first to arrive is kept.
pub struct DistinctSet<'a> {
    collation: &'a Collation,
    values: Vec<Value>,
}

impl<'a> DistinctSet<'a> {
    pub fn new(collation: &'a Collation) -> Self {
        Self {
            collation,
            values: Vec::new(),
        }
    }

    pub fn extend<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.values.extend(values);
    }

    /// Sorted, one representative per collation-equivalence class.
    pub fn into_values(self) -> Vec<Value> {
        let collation = self.collation;
        let mut values = self.values;
        values.sort_by(|a, b| compare_values(a, b, collation));
        values.dedup_by(|later, kept| compare_values(later, kept, collation) == Ordering::Equal);
        values
    }
}

fn shard_values(result: &ShardResult) -> Result<&[Value]> {
    let response = result.document()?;
    match response.get("values") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(values)) => Ok(values),
        Some(other) => Err(RouterError::Remote {
            shard: result.shard_id.to_string(),
            code: Some(ErrorCode::TypeMismatch.as_i32()),
            message: format!("distinct values must be an array, found {}", type_name(other)),
        }),
    }
}

/// `distinct`: unions per-shard distinct sets, collapsing values equal under the active collation.
pub struct DistinctCommand;

#[async_trait]
impl RoutableCommand for DistinctCommand {
    fn name(&self) -> &'static str {
        "distinct"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::DedupUnion
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
        let query_collation = targeting_collation(&inv.command)?;
        let targets = descriptor.shards_for_query(&query, query_collation.as_ref());

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

        let collation = query_collation
            .as_ref()
            .unwrap_or_else(|| descriptor.default_collation());
        let mut all = DistinctSet::new(collation);
        for result in &results {
            all.extend(shard_values(result)?.iter().cloned());
        }
        let values = all.into_values();
        event!(
            Level::DEBUG,
            ns = %inv.ns,
            shards = results.len(),
            values = values.len(),
            "distinct values merged"
        );

        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        body.insert("values".to_string(), Value::Array(values));
        Ok(CommandOutcome::success(body))
    }

    async fn explain(&self, ctx: &RouterContext, inv: &Invocation, verbosity: Verbosity) -> Result<Document> {
        let query = targeting_query(&inv.command)?;
        let collation = targeting_collation(&inv.command)?;
        let placement = classifier::placement(ctx, &inv.ns).await?;
        let targets = placement.targets_for_query(&query, collation.as_ref());

        let started = Instant::now();
        let results = dispatcher::scatter(
            ctx,
            targets,
            &inv.db,
            &inv.ns,
            &wrap_as_explain(&inv.command, verbosity),
            inv.options,
            RemovedShardPolicy::Skip,
        )
        .await?;
        let millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        build_explain_result(&results, stage_for(results.len()), millis)
    }
}
