//! Hash partitioning of join keys
//!
//! Maps a key value to one of `n` partitions. Equal keys always land in the
//! same partition, which is what lets the grace hash join pair up left and
//! right partitions independently.
//!
//! [`hash_value`] is a 64-bit FNV-1a over a type tag and the value's
//! canonical bytes; [`HashPartitioner`] runs that through a Murmur3-style
//! finalizer before taking the modulus so sequential integer keys spread
//! evenly.

use crate::core::operator::{ExecError, ExecResult};
use crate::core::record::Value;

const FNV_OFFSET: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// Deterministic hash of a single value
pub fn hash_value(value: &Value) -> u64 {
    let tag: u8 = match value {
        Value::Bool(_) => 0,
        Value::Int(_) => 1,
        Value::Float(_) => 2,
        Value::String(_) => 3,
    };
    let mut h = FNV_OFFSET;
    for b in std::iter::once(tag).chain(value.canonical_bytes()) {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

fn mix(key: u64) -> u64 {
    let mut h = key;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Assigns keys to a fixed number of partitions
#[derive(Debug, Clone, Copy)]
pub struct HashPartitioner {
    partitions: usize,
}

impl HashPartitioner {
    pub fn new(partitions: usize) -> ExecResult<Self> {
        if partitions == 0 {
            return Err(ExecError::Configuration(
                "hash partitioning needs at least one partition".into(),
            ));
        }
        Ok(Self { partitions })
    }

    pub fn partition_count(&self) -> usize {
        self.partitions
    }

    /// Partition for a precomputed [`hash_value`]
    pub fn partition_for_hash(&self, hash: u64) -> usize {
        (mix(hash) % self.partitions as u64) as usize
    }

    pub fn partition_of(&self, value: &Value) -> usize {
        self.partition_for_hash(hash_value(value))
    }
}
