//! Join Engine - buffer-bounded relational joins over paged storage
//!
//! This crate provides pull-style operators over fixed-width, slotted heap
//! files: sequential and index scans, selection, and four equi-join
//! algorithms (page nested loop, block nested loop, grace hash, sort-merge)
//! that run within a caller-supplied budget of buffer pages.

pub mod core;
pub mod categories;
pub mod runtime;
#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use core::{
    ExecError, ExecResult, ExecutionContext, JoinStrategy, Operator, OperatorRegistry, Record,
    RecordIterator, Schema, Value,
};
pub use categories::execution::{JoinSpec, PredicateOperator};
pub use categories::storage::StorageContext;
pub use runtime::{EngineConfig, Session};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
