//! Admin-database commands that move whole collections or databases.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::commands::{fully_qualified, CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{required_str, Document};
use crate::core::{Namespace, Result, RouterError};
use crate::router::context::RouterContext;
use crate::router::dispatcher;
use crate::router::result::CommandOutcome;

const ADMIN_DB: &str = "admin";

/// `renameCollection`: both ends unpartitioned and on the same primary.
pub struct RenameCollectionCommand;

#[async_trait]
impl RoutableCommand for RenameCollectionCommand {
    fn name(&self) -> &'static str {
        "renameCollection"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn admin_only(&self) -> bool {
        true
    }

    fn parse_namespace(&self, _db: &str, command: &Document) -> Result<Namespace> {
        fully_qualified(command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let from = &inv.ns;
        let to = Namespace::parse(required_str(&inv.command, "to")?)?;

        let from_db = ctx.topology.database(from.db()).await?;
        let to_db = ctx.topology.database(to.db()).await?;

        if ctx.topology.is_partitioned(from).await? {
            return Err(RouterError::Rejected {
                code: 13138,
                message: "You can't rename a sharded collection".to_string(),
            });
        }
        if ctx.topology.is_partitioned(&to).await? {
            return Err(RouterError::Rejected {
                code: 13139,
                message: "You can't rename to a sharded collection".to_string(),
            });
        }
        if from_db.primary != to_db.primary {
            return Err(RouterError::Rejected {
                code: 13137,
                message: "Source and destination collections must be on same shard".to_string(),
            });
        }

        dispatcher::passthrough(ctx, &from_db.primary, ADMIN_DB, from, &inv.command, inv.options).await
    }
}

/// `copydb`: neither database may have partitioning enabled.
pub struct CopyDbCommand;

#[async_trait]
impl RoutableCommand for CopyDbCommand {
    fn name(&self) -> &'static str {
        "copydb"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn admin_only(&self) -> bool {
        true
    }

    fn parse_namespace(&self, _db: &str, command: &Document) -> Result<Namespace> {
        let todb = required_str(command, "todb")?;
        Namespace::command_namespace(todb, "")
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let to_db = ctx.topology.database(inv.ns.db()).await?;
        if to_db.partitioning_enabled {
            return Err(RouterError::IllegalOperation(
                "Cannot copy to a sharded database".to_string(),
            ));
        }

        let fromhost = inv.command.get("fromhost").and_then(Value::as_str).unwrap_or("");
        if !fromhost.is_empty() {
            return dispatcher::passthrough(ctx, &to_db.primary, ADMIN_DB, &inv.ns, &inv.command, inv.options)
                .await;
        }

        let fromdb = required_str(&inv.command, "fromdb")?;
        Namespace::validate_db_name(fromdb)?;
        let from_db = ctx.topology.database(fromdb).await?;
        if from_db.partitioning_enabled {
            return Err(RouterError::IllegalOperation(
                "Cannot copy from a sharded database".to_string(),
            ));
        }

        let source = ctx.directory.resolve(&from_db.primary).await?;
        let mut command: Document = inv
            .command
            .iter()
            .filter(|(field, _)| field.as_str() != "fromhost")
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        command.insert("fromhost".to_string(), json!(source.connection_string));

        dispatcher::passthrough(ctx, &to_db.primary, ADMIN_DB, &inv.ns, &command, inv.options).await
    }
}
