use std::future::Future;

use tracing::{Level, event};

use crate::core::{Namespace, Result, RouterError};
use crate::router::context::RouterContext;

/// Stale-topology retry states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryState {
    Attempt { retries_left: u32 },
    RefreshAndRetry { retries_left: u32 },
}

/// Runs `attempt`, refreshing the partition map for `ns` and running it again
/// when it fails with a retryable stale-topology error.
///
/// Only single-target passthroughs produce retryable errors, so scatter rounds
/// and chained commands fail closed. The number of refreshes is bounded by
/// `max_stale_retries`; a stale error after the budget is spent is returned as is.
pub async fn with_stale_retry<T, F, Fut>(ctx: &RouterContext, ns: &Namespace, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::Attempt {
        retries_left: ctx.config.max_stale_retries,
    };
    loop {
        match state {
            RetryState::Attempt { retries_left } => match attempt().await {
                Err(RouterError::StaleTopology {
                    retryable: true,
                    ref shard,
                    ..
                }) if retries_left > 0 => {
                    event!(Level::INFO, ns = %ns, shard = %shard, "stale topology, refreshing");
                    state = RetryState::RefreshAndRetry { retries_left };
                }
                Err(err) => {
                    if err.is_stale_topology() {
                        event!(Level::WARN, ns = %ns, error = %err, "stale topology surfaced");
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            },
            RetryState::RefreshAndRetry { retries_left } => {
                let stale = ctx.topology.partition_map(ns).await?.map(|d| d.version());
                ctx.topology.refresh(ns, stale).await?;
                state = RetryState::Attempt {
                    retries_left: retries_left - 1,
                };
            }
        }
    }
}
