//! Routing core: classification, dispatch, normalization, stale retry, and
//! the [`CommandRouter`] driver that ties them to the command registry.

pub mod classifier;
pub mod context;
pub mod dispatcher;
pub mod explain;
pub mod normalize;
pub mod result;
pub mod retry;

use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use crate::commands::{CommandRegistry, Invocation, RoutableCommand};
use crate::core::document::first_element;
use crate::core::{Document, ErrorCode, Namespace, Result, RouterError};
use crate::transport::CommandOptions;

pub use classifier::Placement;
pub use context::RouterContext;
pub use dispatcher::RemovedShardPolicy;
pub use explain::Verbosity;
pub use result::{CommandOutcome, ShardOutcome, ShardResult, error_reply};

const ADMIN_DB: &str = "admin";

/// Entry point for routed commands.
///
/// Cheap to clone; clones share the context and registry.
#[derive(Clone)]
pub struct CommandRouter {
    ctx: Arc<RouterContext>,
    registry: Arc<CommandRegistry>,
}

impl CommandRouter {
    /// A router over `ctx` with every built-in command registered.
    pub fn new(ctx: RouterContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            registry: Arc::new(CommandRegistry::with_default_commands()),
        }
    }

    pub fn with_registry(mut self, registry: CommandRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn context(&self) -> &RouterContext {
        &self.ctx
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Resolves the command and its namespace. Nothing is dispatched here.
    fn prepare(
        &self,
        db: &str,
        command: &Document,
        options: CommandOptions,
    ) -> Result<(&dyn RoutableCommand, Invocation)> {
        let Some((name, _)) = first_element(command) else {
            return Err(RouterError::BadValue("empty command".to_string()));
        };
        Namespace::validate_db_name(db)?;
        let routable = self.registry.find(name)?;
        if routable.admin_only() && db != ADMIN_DB {
            return Err(RouterError::Rejected {
                code: ErrorCode::Unauthorized.as_i32(),
                message: format!("{} may only be run against the admin database.", name),
            });
        }
        let ns = routable.parse_namespace(db, command)?;
        let options = if routable.pass_options() {
            options
        } else {
            CommandOptions::none()
        };
        Ok((
            routable,
            Invocation {
                db: db.to_string(),
                ns,
                command: command.clone(),
                options,
            },
        ))
    }

    /// Runs `command` against database `db`.
    ///
    /// `Ok` carries the merged reply, which may still report a failure the
    /// shards agreed on; `Err` is a routing, transport or merge failure.
    pub async fn run_command(&self, db: &str, command: &Document, options: CommandOptions) -> Result<CommandOutcome> {
        let (routable, inv) = self.prepare(db, command, options)?;
        let span = info_span!(
            "router.command",
            command = routable.name(),
            ns = %inv.ns,
            family = %routable.family()
        );
        let ctx = self.ctx.as_ref();
        async {
            let outcome = retry::with_stale_retry(ctx, &inv.ns, || routable.run(ctx, &inv)).await;
            match &outcome {
                Ok(outcome) if !outcome.ok => {
                    event!(Level::INFO, errmsg = outcome.errmsg().unwrap_or(""), "command failed");
                }
                Err(err) if err.is_pre_dispatch() => {
                    event!(Level::DEBUG, error = %err, "command rejected");
                }
                Err(err) => {
                    event!(Level::WARN, error = %err, code = err.code(), "command errored");
                }
                Ok(_) => {}
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Like [`run_command`](Self::run_command), rendered as a reply document with `ok` last.
    pub async fn run_command_reply(&self, db: &str, command: &Document, options: CommandOptions) -> Document {
        match self.run_command(db, command, options).await {
            Ok(outcome) => outcome.into_reply(),
            Err(err) => error_reply(&err),
        }
    }

    /// Explains `command` instead of running it.
    pub async fn explain_command(&self, db: &str, command: &Document, verbosity: Verbosity) -> Result<Document> {
        let (routable, inv) = self.prepare(db, command, CommandOptions::none())?;
        let span = info_span!(
            "router.explain",
            command = routable.name(),
            ns = %inv.ns,
            verbosity = %verbosity
        );
        routable
            .explain(self.ctx.as_ref(), &inv, verbosity)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use crate::topology::{DatabaseInfo, InMemoryShardDirectory, InMemoryTopology};
    use crate::transport::{InMemoryShardExecutor, respond_with};
    use serde_json::json;

    async fn router(executor: &InMemoryShardExecutor) -> CommandRouter {
        let topology = InMemoryTopology::new();
        topology.add_database(DatabaseInfo::new("app", "s0")).unwrap();
        let directory = InMemoryShardDirectory::new();
        directory.add_shard("s0", "s0:27018").unwrap();
        executor
            .register_shard("s0", respond_with(doc(json!({"ok": 1, "done": true}))))
            .await;
        CommandRouter::new(RouterContext::new(
            Arc::new(topology),
            Arc::new(directory),
            Arc::new(executor.clone()),
        ))
    }

    #[tokio::test]
    async fn unknown_command_renders_command_not_found() {
        let executor = InMemoryShardExecutor::new();
        let router = router(&executor).await;
        let reply = router
            .run_command_reply("app", &doc(json!({"frobnicate": 1})), CommandOptions::none())
            .await;
        assert_eq!(reply["code"], json!(59));
        assert_eq!(reply["codeName"], json!("CommandNotFound"));
        assert_eq!(reply["ok"], json!(0.0));
        assert_eq!(executor.call_count().await, 0);
    }

    #[tokio::test]
    async fn admin_commands_need_the_admin_database() {
        let executor = InMemoryShardExecutor::new();
        let router = router(&executor).await;
        let err = router
            .run_command(
                "app",
                &doc(json!({"renameCollection": "app.a", "to": "app.b"})),
                CommandOptions::none(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), 13);
        assert_eq!(executor.call_count().await, 0);
    }

    #[tokio::test]
    async fn options_are_dropped_unless_the_command_passes_them() {
        let executor = InMemoryShardExecutor::new();
        let router = router(&executor).await;
        let options = CommandOptions::with_flags(CommandOptions::SECONDARY_OK);
        router
            .run_command("app", &doc(json!({"create": "logs"})), options)
            .await
            .unwrap();
        router
            .run_command("app", &doc(json!({"distinct": "logs", "key": "level"})), options)
            .await
            .unwrap();
        let calls = executor.calls().await;
        assert!(calls[0].options.is_empty());
        assert!(calls[1].options.contains(CommandOptions::SECONDARY_OK));
    }
}
