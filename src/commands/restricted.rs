//! Commands that only run against unpartitioned collections.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::{collection_required, fully_qualified, CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{required_str, Document};
use crate::core::{ErrorCode, Namespace, Result, RouterError};
use crate::router::classifier;
use crate::router::context::RouterContext;
use crate::router::dispatcher;
use crate::router::explain::{self, Verbosity};
use crate::router::normalize::is_ok;
use crate::router::result::CommandOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamespaceRule {
    /// `db.<first element>`.
    CollectionRequired,
    /// First element is `db.collection` and must stay in the addressed database.
    FullyQualifiedSameDb,
}

/// Relayed to the primary when the collection is unpartitioned, rejected otherwise.
pub struct DisallowedOnPartitioned {
    name: &'static str,
    pass_options: bool,
    rule: NamespaceRule,
}

impl DisallowedOnPartitioned {
    pub fn convert_to_capped() -> Self {
        Self {
            name: "convertToCapped",
            pass_options: false,
            rule: NamespaceRule::CollectionRequired,
        }
    }

    pub fn split_vector() -> Self {
        Self {
            name: "splitVector",
            pass_options: true,
            rule: NamespaceRule::FullyQualifiedSameDb,
        }
    }
}

#[async_trait]
impl RoutableCommand for DisallowedOnPartitioned {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn pass_options(&self) -> bool {
        self.pass_options
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        match self.rule {
            NamespaceRule::CollectionRequired => collection_required(db, command),
            NamespaceRule::FullyQualifiedSameDb => {
                let ns = fully_qualified(command)?;
                if ns.db() != db {
                    return Err(RouterError::IllegalOperation(format!(
                        "doing a {} across dbs isn't supported through the router",
                        self.name
                    )));
                }
                Ok(ns)
            }
        }
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let placement = classifier::placement(ctx, &inv.ns).await?;
        let primary = placement.require_unpartitioned(self.name)?;
        dispatcher::passthrough(ctx, primary, &inv.db, &inv.ns, &inv.command, inv.options).await
    }
}

/// `group`: its namespace lives inside the command body.
pub struct GroupCommand;

#[async_trait]
impl RoutableCommand for GroupCommand {
    fn name(&self) -> &'static str {
        "group"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::Passthrough
    }

    fn pass_options(&self) -> bool {
        true
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        let Some(Value::Object(spec)) = command.get("group") else {
            return Err(RouterError::TypeMismatch(
                "'group' must be an object".to_string(),
            ));
        };
        let coll = required_str(spec, "ns")?;
        Namespace::new(db, coll)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let placement = classifier::placement(ctx, &inv.ns).await?;
        let primary = placement.require_unpartitioned(self.name())?;
        dispatcher::passthrough(ctx, primary, &inv.db, &inv.ns, &inv.command, inv.options).await
    }

    async fn explain(&self, ctx: &RouterContext, inv: &Invocation, verbosity: Verbosity) -> Result<Document> {
        let started = Instant::now();
        let wrapped = explain::wrap_as_explain(&inv.command, verbosity);
        let placement = classifier::placement(ctx, &inv.ns).await?;
        if placement.is_partitioned() {
            return Err(RouterError::IllegalOperation(format!(
                "Passthrough command failed: {} on ns {}. Cannot run on sharded namespace.",
                Value::Object(wrapped),
                inv.ns
            )));
        }

        let result = dispatcher::call_shard(ctx, placement.primary(), &inv.db, &wrapped, inv.options).await?;
        let response = result.document()?;
        if !is_ok(response) {
            return Err(RouterError::Remote {
                shard: result.shard_id.to_string(),
                code: Some(ErrorCode::OperationFailed.as_i32()),
                message: format!(
                    "Passthrough command failed: {} on ns {}; result: {}",
                    Value::Object(wrapped),
                    inv.ns,
                    Value::Object(response.clone())
                ),
            });
        }
        let millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        explain::build_explain_result(std::slice::from_ref(&result), explain::SINGLE_SHARD, millis)
    }
}
