use async_trait::async_trait;
use tracing::{Level, event};

use crate::commands::{collection_required, passthrough_to_primary, CommandFamily, Invocation, RoutableCommand};
use crate::core::{Document, Namespace, Result, RouterError};
use crate::router::context::RouterContext;
use crate::router::result::CommandOutcome;

/// `create`: runs on the database primary.
pub struct CreateCommand;

#[async_trait]
impl RoutableCommand for CreateCommand {
    fn name(&self) -> &'static str {
        "create"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        collection_required(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        passthrough_to_primary(ctx, inv).await
    }
}

/// `eval` / `$eval`: deprecated, relayed to the primary, which refuses partitioned collections itself.
pub struct EvalCommand;

#[async_trait]
impl RoutableCommand for EvalCommand {
    fn name(&self) -> &'static str {
        "eval"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["$eval"]
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn parse_namespace(&self, db: &str, _command: &Document) -> Result<Namespace> {
        Namespace::command_namespace(db, "")
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        event!(Level::WARN, db = %inv.db, "the eval command is deprecated");
        passthrough_to_primary(ctx, inv).await
    }
}

/// `compact`: never allowed through the router.
pub struct CompactCommand;

#[async_trait]
impl RoutableCommand for CompactCommand {
    fn name(&self) -> &'static str {
        "compact"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    async fn run(&self, _ctx: &RouterContext, _inv: &Invocation) -> Result<CommandOutcome> {
        Err(RouterError::IllegalOperation(
            "compact not allowed through the router".to_string(),
        ))
    }
}
