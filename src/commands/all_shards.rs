//! Index and collection-option commands that must reach every shard.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::commands::validate::PassFailSummary;
use crate::commands::{collection_required, CommandFamily, Invocation, RoutableCommand};
use crate::core::{Document, Namespace, Result};
use crate::router::classifier;
use crate::router::context::RouterContext;
use crate::router::dispatcher::{self, RemovedShardPolicy};
use crate::router::normalize::lift_write_concern_errors;
use crate::router::result::CommandOutcome;

/// Runs on the primary of an unpartitioned collection, or on every shard in the
/// cluster when partitioned, and succeeds only if every shard does.
pub struct AllShardsCommand {
    name: &'static str,
    aliases: &'static [&'static str],
}

impl AllShardsCommand {
    pub fn drop_indexes() -> Self {
        Self {
            name: "dropIndexes",
            aliases: &["deleteIndexes"],
        }
    }

    pub fn create_indexes() -> Self {
        Self {
            name: "createIndexes",
            aliases: &[],
        }
    }

    pub fn re_index() -> Self {
        Self {
            name: "reIndex",
            aliases: &[],
        }
    }

    pub fn coll_mod() -> Self {
        Self {
            name: "collMod",
            aliases: &[],
        }
    }
}

#[async_trait]
impl RoutableCommand for AllShardsCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::PassFail
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        collection_required(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let targets = classifier::all_shards_targets(ctx, &inv.ns).await?;
        let results = dispatcher::scatter(
            ctx,
            targets,
            &inv.db,
            &inv.ns,
            &inv.command,
            inv.options,
            RemovedShardPolicy::Fail,
        )
        .await?;
        let summary = PassFailSummary::collect(&results, "ok")?;

        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        body.insert("raw".to_string(), Value::Object(summary.raw.clone()));
        if !summary.passed {
            let message = summary
                .errmsg
                .clone()
                .unwrap_or_else(|| format!("{} failed on at least one shard", self.name));
            body.insert("errmsg".to_string(), json!(message));
            summary.append_code(&mut body);
        }
        Ok(CommandOutcome {
            ok: summary.passed,
            body,
        })
    }
}
