//! Operator building blocks grouped by concern
//!
//! - [`storage`]: paged heap files and the relation access contract
//! - [`index`]: ordered secondary indexes
//! - [`partitioning`]: key hashing and partition assignment
//! - [`execution`]: scans, selections and the join algorithms

pub mod execution;
pub mod index;
pub mod partitioning;
pub mod storage;
