//! Cursor-returning commands relayed to the database primary.

use async_trait::async_trait;

use crate::commands::{collection_required, CommandFamily, Invocation, RoutableCommand};
use crate::core::{Document, Namespace, Result};
use crate::router::context::RouterContext;
use crate::router::dispatcher;
use crate::router::normalize::{is_ok, is_stale_signal, remote_error, stale_error, wrap_cursor};
use crate::router::result::CommandOutcome;

/// Runs a cursor command on the primary and adopts the cursor it opens.
async fn cursor_passthrough(ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
    let database = ctx.topology.database(&inv.db).await?;
    let result = dispatcher::call_shard(ctx, &database.primary, &inv.db, &inv.command, inv.options).await?;
    let response = result.document()?;
    if is_stale_signal(response) {
        return Err(stale_error(&result.shard_id, &inv.ns, response, true));
    }
    if !is_ok(response) {
        return Err(remote_error(&result.shard_id, response));
    }

    let mut body = wrap_cursor(ctx.cursors.as_ref(), &result.shard_id, &inv.ns, response.clone()).await?;
    body.shift_remove("ok");
    Ok(CommandOutcome::success(body))
}

pub struct ListCollectionsCommand;

#[async_trait]
impl RoutableCommand for ListCollectionsCommand {
    fn name(&self) -> &'static str {
        "listCollections"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn pass_options(&self) -> bool {
        true
    }

    fn parse_namespace(&self, db: &str, _command: &Document) -> Result<Namespace> {
        Namespace::command_namespace(db, "listCollections")
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        cursor_passthrough(ctx, inv).await
    }
}

/// `listIndexes`: the cursor namespace is `db.$cmd.listIndexes.<collection>`.
pub struct ListIndexesCommand;

#[async_trait]
impl RoutableCommand for ListIndexesCommand {
    fn name(&self) -> &'static str {
        "listIndexes"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn pass_options(&self) -> bool {
        true
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        let target = collection_required(db, command)?;
        Namespace::command_namespace(db, &format!("listIndexes.{}", target.coll()))
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        cursor_passthrough(ctx, inv).await
    }
}
