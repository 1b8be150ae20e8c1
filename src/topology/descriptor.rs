use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::document::Document;
use crate::core::{Collation, Namespace, Result, RouterError, ShardKey};
use crate::topology::directory::ShardId;
use crate::topology::key_pattern::KeyPattern;
use crate::topology::targeting::{self, KeyInterval};

/// Opaque version of a partition map snapshot.
///
/// The router never looks inside; it only hands a stale version back to the
/// oracle when asking for something fresher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopologyVersion(u64);

impl TopologyVersion {
    pub const fn new(version: u64) -> Self {
        Self(version)
    }
}

/// A contiguous key range `[min, max)` owned by one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub min: ShardKey,
    pub max: ShardKey,
    pub shard: ShardId,
}

impl Chunk {
    /// True when this chunk overlaps the inclusive interval `[min, max]`.
    fn overlaps(&self, min: &ShardKey, max: &ShardKey) -> bool {
        self.min <= *max && self.max > *min
    }

    pub fn contains(&self, key: &ShardKey) -> bool {
        self.min <= *key && *key < self.max
    }
}

/// Read-only snapshot of how a partitioned namespace is spread over shards.
#[derive(Debug, Clone)]
pub struct PartitionDescriptor {
    ns: Namespace,
    key_pattern: KeyPattern,
    chunks: Vec<Chunk>,
    version: TopologyVersion,
    default_collation: Collation,
}

impl PartitionDescriptor {
    /// Builds a descriptor from chunks that must tile the key space from
    /// `MinKey` to `MaxKey` without gaps or overlap.
    pub fn new(
        ns: Namespace,
        key_pattern: KeyPattern,
        chunks: Vec<Chunk>,
        version: TopologyVersion,
    ) -> Result<Self> {
        let descriptor = Self {
            ns,
            key_pattern,
            chunks,
            version,
            default_collation: Collation::simple(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Builds chunks from ordered split points: `splits.len() + 1` chunks,
    /// owned in turn by `owners`.
    pub fn from_splits(
        ns: Namespace,
        key_pattern: KeyPattern,
        splits: Vec<ShardKey>,
        owners: Vec<ShardId>,
        version: TopologyVersion,
    ) -> Result<Self> {
        if owners.len() != splits.len() + 1 {
            return Err(RouterError::BadValue(format!(
                "{} split points need {} owners, got {}",
                splits.len(),
                splits.len() + 1,
                owners.len()
            )));
        }
        let mut bounds = Vec::with_capacity(splits.len() + 2);
        bounds.push(key_pattern.global_min());
        bounds.extend(splits);
        bounds.push(key_pattern.global_max());
        let chunks = bounds
            .windows(2)
            .zip(owners)
            .map(|(pair, shard)| Chunk {
                min: pair[0].clone(),
                max: pair[1].clone(),
                shard,
            })
            .collect();
        Self::new(ns, key_pattern, chunks, version)
    }

    pub fn with_default_collation(mut self, collation: Collation) -> Self {
        self.default_collation = collation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.chunks.first() else {
            return Err(RouterError::BadValue(format!(
                "partition map for {} has no chunks",
                self.ns
            )));
        };
        if first.min != self.key_pattern.global_min() {
            return Err(RouterError::BadValue(format!(
                "first chunk of {} must start at MinKey",
                self.ns
            )));
        }
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.min.len() != self.key_pattern.len() || chunk.max.len() != self.key_pattern.len() {
                return Err(RouterError::BadValue(format!(
                    "chunk {} of {} does not match key pattern {}",
                    index, self.ns, self.key_pattern
                )));
            }
            if chunk.min >= chunk.max {
                return Err(RouterError::BadValue(format!(
                    "chunk {} of {} has min >= max",
                    index, self.ns
                )));
            }
            if let Some(next) = self.chunks.get(index + 1) {
                if next.min != chunk.max {
                    return Err(RouterError::BadValue(format!(
                        "chunks {} and {} of {} are not contiguous",
                        index,
                        index + 1,
                        self.ns
                    )));
                }
            }
        }
        let last = &self.chunks[self.chunks.len() - 1];
        if last.max != self.key_pattern.global_max() {
            return Err(RouterError::BadValue(format!(
                "last chunk of {} must end at MaxKey",
                self.ns
            )));
        }
        Ok(())
    }

    pub fn ns(&self) -> &Namespace {
        &self.ns
    }

    pub fn key_pattern(&self) -> &KeyPattern {
        &self.key_pattern
    }

    pub fn version(&self) -> TopologyVersion {
        self.version
    }

    pub fn default_collation(&self) -> &Collation {
        &self.default_collation
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Every shard owning at least one chunk.
    pub fn all_shard_ids(&self) -> BTreeSet<ShardId> {
        self.chunks.iter().map(|c| c.shard.clone()).collect()
    }

    pub fn chunk_for_key(&self, key: &ShardKey) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.contains(key))
    }

    /// Shards owning any part of the inclusive range `[min, max]`.
    pub fn shards_for_range(&self, min: &ShardKey, max: &ShardKey) -> BTreeSet<ShardId> {
        let start = self.chunks.partition_point(|c| c.max <= *min);
        self.chunks[start..]
            .iter()
            .take_while(|c| c.min <= *max)
            .filter(|c| c.overlaps(min, max))
            .map(|c| c.shard.clone())
            .collect()
    }

    fn shards_for_intervals(&self, intervals: &[KeyInterval], out: &mut BTreeSet<ShardId>) {
        for interval in intervals {
            out.extend(self.shards_for_range(&interval.min, &interval.max));
        }
    }

    /// Shards that may hold a document matching `query`.
    ///
    /// Never omits an owning shard. An unbounded query yields every shard;
    /// a predicate nothing can satisfy still yields one shard so the
    /// command gets a well-formed (empty) answer.
    pub fn shards_for_query(&self, query: &Document, collation: Option<&Collation>) -> BTreeSet<ShardId> {
        let collation = collation.unwrap_or(&self.default_collation);
        let mut shards = BTreeSet::new();
        match targeting::split_top_level_or(query) {
            Some(branches) => {
                for branch in &branches {
                    let intervals = targeting::key_intervals(&self.key_pattern, branch, collation);
                    self.shards_for_intervals(&intervals, &mut shards);
                }
            }
            None => {
                let intervals = targeting::key_intervals(&self.key_pattern, query, collation);
                self.shards_for_intervals(&intervals, &mut shards);
            }
        }
        if shards.is_empty() {
            shards.insert(self.chunks[0].shard.clone());
        }
        shards
    }
}
