//! Single-node transport and cursor bookkeeping.

pub mod cursor;
pub mod executor;
pub mod in_memory;

pub use cursor::{CursorStore, InMemoryCursorStore, RemoteCursor};
pub use executor::{CommandOptions, ShardExecutor, TransportError, TransportErrorKind, TransportResult};
pub use in_memory::{InMemoryShardExecutor, ShardHandler, ShardRequest, respond_with};
