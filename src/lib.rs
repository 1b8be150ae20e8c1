// ============================================================================
// ShardRoute Library
// ============================================================================

//! Query-routing and result-merging core of a partitioned document store.
//!
//! A [`CommandRouter`] takes one client command, decides which shards must see
//! it, fans it out with bounded concurrency, and merges the per-shard answers
//! into a single reply as though one node had answered.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use shardroute::core::document::doc;
//! use shardroute::topology::{DatabaseInfo, InMemoryShardDirectory, InMemoryTopology};
//! use shardroute::transport::{CommandOptions, InMemoryShardExecutor, respond_with};
//! use shardroute::{CommandRouter, RouterContext};
//!
//! # tokio_test::block_on(async {
//! let topology = InMemoryTopology::new();
//! topology.add_database(DatabaseInfo::new("app", "s0")).unwrap();
//! let directory = InMemoryShardDirectory::new();
//! directory.add_shard("s0", "s0:27018").unwrap();
//! let executor = InMemoryShardExecutor::new();
//! executor
//!     .register_shard("s0", respond_with(doc(json!({"values": [1, 2], "ok": 1}))))
//!     .await;
//!
//! let router = CommandRouter::new(RouterContext::new(
//!     Arc::new(topology),
//!     Arc::new(directory),
//!     Arc::new(executor),
//! ));
//! let reply = router
//!     .run_command_reply("app", &doc(json!({"distinct": "users", "key": "age"})), CommandOptions::none())
//!     .await;
//! assert_eq!(reply["values"], json!([1, 2]));
//! # });
//! ```

pub mod commands;
pub mod config;
pub mod core;
pub mod router;
pub mod topology;
pub mod transport;

// Re-export main types for convenience
pub use commands::{CommandFamily, CommandRegistry, Invocation, RoutableCommand};
pub use config::{RollupFieldPolicy, RouterConfig};
pub use core::{Collation, Document, ErrorCode, Namespace, Result, RouterError};
pub use router::{CommandOutcome, CommandRouter, RouterContext, Verbosity};
