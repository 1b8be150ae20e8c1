//! Topology collaborators: the partition catalog and the shard directory.

pub mod descriptor;
pub mod directory;
pub mod in_memory;
pub mod key_pattern;
pub mod oracle;
pub mod targeting;

pub use descriptor::{Chunk, PartitionDescriptor, TopologyVersion};
pub use directory::{Endpoint, ShardDirectory, ShardId};
pub use in_memory::{InMemoryShardDirectory, InMemoryTopology};
pub use key_pattern::KeyPattern;
pub use oracle::{DatabaseInfo, TopologyOracle};
