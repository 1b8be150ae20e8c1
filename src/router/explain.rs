use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use crate::core::{Document, ErrorCode, Result, RouterError};
use crate::router::normalize::errmsg;
use crate::router::result::ShardResult;

/// How much detail an explain asks the shards for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::QueryPlanner => "queryPlanner",
            Verbosity::ExecutionStats => "executionStats",
            Verbosity::AllPlansExecution => "allPlansExecution",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queryPlanner" => Ok(Verbosity::QueryPlanner),
            "executionStats" => Ok(Verbosity::ExecutionStats),
            "allPlansExecution" => Ok(Verbosity::AllPlansExecution),
            other => Err(RouterError::BadValue(format!(
                "verbosity string must be one of {{'queryPlanner', 'executionStats', 'allPlansExecution'}}, got '{}'",
                other
            ))),
        }
    }
}

pub const SINGLE_SHARD: &str = "SINGLE_SHARD";
pub const SHARD_MERGE: &str = "SHARD_MERGE";

/// `{explain: <command>, verbosity: <level>}`
pub fn wrap_as_explain(command: &Document, verbosity: Verbosity) -> Document {
    let mut wrapped = Document::new();
    wrapped.insert("explain".to_string(), Value::Object(command.clone()));
    wrapped.insert("verbosity".to_string(), json!(verbosity.as_str()));
    wrapped
}

pub fn stage_for(shard_count: usize) -> &'static str {
    if shard_count == 1 { SINGLE_SHARD } else { SHARD_MERGE }
}

/// Builds the cluster explain document from per-shard explain answers.
///
/// Fails if any shard's explain failed.
pub fn build_explain_result(results: &[ShardResult], stage: &str, millis: u64) -> Result<Document> {
    let mut shards = Vec::with_capacity(results.len());
    for result in results {
        let response = result.document()?;
        if !result.is_ok() {
            return Err(RouterError::Remote {
                shard: result.shard_id.to_string(),
                code: Some(ErrorCode::OperationFailed.as_i32()),
                message: format!("Explain command failed, caused by: {}", errmsg(response)),
            });
        }
        let mut explain = response.clone();
        explain.shift_remove("ok");
        shards.push(json!({
            "shardName": result.shard_id.as_str(),
            "connectionString": result.endpoint.connection_string,
            "explain": explain,
        }));
    }

    let mut out = Document::new();
    out.insert("stage".to_string(), json!(stage));
    out.insert("executionTimeMillis".to_string(), json!(millis));
    out.insert("shards".to_string(), Value::Array(shards));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::doc;
    use crate::router::result::ShardOutcome;
    use crate::topology::Endpoint;

    #[test]
    fn wraps_command_with_verbosity() {
        let cmd = doc(json!({"distinct": "users", "key": "city"}));
        let wrapped = wrap_as_explain(&cmd, Verbosity::ExecutionStats);
        assert_eq!(wrapped["explain"]["distinct"], json!("users"));
        assert_eq!(wrapped["verbosity"], json!("executionStats"));
        assert_eq!("allPlansExecution".parse::<Verbosity>().unwrap(), Verbosity::AllPlansExecution);
        assert!("everything".parse::<Verbosity>().is_err());
    }

    #[test]
    fn stage_depends_on_shard_count() {
        let results: Vec<ShardResult> = ["s0", "s1"]
            .iter()
            .map(|s| {
                ShardResult::new(
                    Endpoint::new(*s, format!("{}:27018", s)),
                    ShardOutcome::Response(doc(json!({"queryPlanner": {}, "ok": 1}))),
                )
            })
            .collect();
        let merged = build_explain_result(&results, stage_for(results.len()), 4).unwrap();
        assert_eq!(merged["stage"], json!("SHARD_MERGE"));
        assert_eq!(merged["shards"][1]["shardName"], json!("s1"));
        assert!(merged["shards"][0]["explain"].get("ok").is_none());
        assert_eq!(stage_for(1), "SINGLE_SHARD");
    }
}
