//! Pass/fail aggregation: every shard must pass, per-shard answers are kept under `raw`.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::commands::{collection_required, CommandFamily, Invocation, RoutableCommand};
use crate::core::document::{field_truthy, Document};
use crate::core::{ErrorCode, Namespace, Result};
use crate::router::classifier;
use crate::router::context::RouterContext;
use crate::router::dispatcher::{self, RemovedShardPolicy};
use crate::router::normalize::{errmsg, lift_write_concern_errors, unique_code};
use crate::router::result::{CommandOutcome, ShardResult};

/// Combined verdict of a pass/fail round.
#[derive(Debug, Clone, PartialEq)]
pub struct PassFailSummary {
    /// AND of every shard's verdict field.
    pub passed: bool,
    /// First shard-reported error message, in dispatch order.
    pub errmsg: Option<String>,
    /// Error code every failing shard agrees on.
    pub code: Option<i32>,
    /// Each shard's answer keyed by shard id.
    pub raw: Document,
}

impl PassFailSummary {
    /// Combines `results`, reading each shard's verdict from `verdict_field`.
    pub fn collect(results: &[ShardResult], verdict_field: &str) -> Result<Self> {
        let mut passed = true;
        let mut first_errmsg = None;
        let mut raw = Document::new();
        for result in results {
            let response = result.document()?;
            if !field_truthy(response, verdict_field) {
                passed = false;
            }
            if first_errmsg.is_none() && response.contains_key("errmsg") {
                first_errmsg = Some(errmsg(response).to_string());
            }
            raw.insert(result.shard_id.to_string(), Value::Object(response.clone()));
        }
        Ok(Self {
            passed,
            errmsg: first_errmsg,
            code: unique_code(results),
            raw,
        })
    }

    /// Appends `code`/`codeName` when the failing shards agree on one.
    pub fn append_code(&self, out: &mut Document) {
        if let Some(code) = self.code {
            out.insert("code".to_string(), json!(code));
            out.insert("codeName".to_string(), json!(ErrorCode::name_for(code)));
        }
    }
}

/// `validate`: valid only if every shard reports `valid: true`.
pub struct ValidateCommand;

#[async_trait]
impl RoutableCommand for ValidateCommand {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn family(&self) -> CommandFamily {
        CommandFamily::PassFail
    }

    fn parse_namespace(&self, db: &str, command: &Document) -> Result<Namespace> {
        collection_required(db, command)
    }

    async fn run(&self, ctx: &RouterContext, inv: &Invocation) -> Result<CommandOutcome> {
        let placement = classifier::placement(ctx, &inv.ns).await?;
        if !placement.is_partitioned() {
            return dispatcher::passthrough(ctx, placement.primary(), &inv.db, &inv.ns, &inv.command, inv.options)
                .await;
        }

        let results = dispatcher::scatter(
            ctx,
            placement.owning_shards(),
            &inv.db,
            &inv.ns,
            &inv.command,
            inv.options,
            RemovedShardPolicy::Fail,
        )
        .await?;
        let summary = PassFailSummary::collect(&results, "valid")?;

        let mut body = Document::new();
        lift_write_concern_errors(&results, &mut body);
        body.insert("raw".to_string(), Value::Object(summary.raw.clone()));
        body.insert("valid".to_string(), json!(summary.passed));
        summary.append_code(&mut body);
        match &summary.errmsg {
            Some(message) => {
                body.insert("errmsg".to_string(), json!(message));
                Ok(CommandOutcome::failure(body))
            }
            None => Ok(CommandOutcome::success(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use crate::router::result::ShardOutcome;
    use crate::topology::Endpoint;

    fn result(shard: &str, response: Value) -> ShardResult {
        ShardResult::new(
            Endpoint::new(shard, format!("{}:27018", shard)),
            ShardOutcome::Response(doc(response)),
        )
    }

    #[test]
    fn one_invalid_shard_fails_the_whole() {
        let results = vec![
            result("s0", json!({"valid": true, "ok": 1})),
            result("s1", json!({"valid": false, "errors": ["bad record"], "ok": 1})),
        ];
        let summary = PassFailSummary::collect(&results, "valid").unwrap();
        assert!(!summary.passed);
        assert!(summary.errmsg.is_none());
        assert_eq!(summary.raw.len(), 2);
    }

    #[test]
    fn first_errmsg_wins_and_code_needs_agreement() {
        let results = vec![
            result("s0", json!({"ok": 0, "errmsg": "first", "code": 26})),
            result("s1", json!({"ok": 0, "errmsg": "second", "code": 26})),
        ];
        let summary = PassFailSummary::collect(&results, "ok").unwrap();
        assert_eq!(summary.errmsg.as_deref(), Some("first"));
        assert_eq!(summary.code, Some(26));

        let mut out = Document::new();
        summary.append_code(&mut out);
        assert_eq!(out["codeName"], json!("NamespaceNotFound"));
    }
}
