//! Partitioning of records by key
//!
//! Used by the grace hash join to split both inputs into co-partitioned runs.

pub mod hash_partitioner;

pub use hash_partitioner::{hash_value, HashPartitioner};
