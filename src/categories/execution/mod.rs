//! Query execution operators
//!
//! Scans and selections produce records from stored relations; the join
//! operators combine two inputs on an equality of one column each, under a
//! buffer budget of `B` pages.

pub mod block_nested_loop;
pub mod filter;
pub mod grace_hash;
pub mod index_scan;
pub mod join;
pub mod materialize;
pub mod page_nested_loop;
pub mod sequential_scan;
pub mod sort;
pub mod sort_merge;

pub use block_nested_loop::BlockNestedLoopJoin;
pub use filter::{Filter, PredicateOperator};
pub use grace_hash::GraceHashJoin;
pub use index_scan::IndexScan;
pub use join::{JoinIterator, JoinKeys, JoinSpec, MIN_JOIN_BUFFER_PAGES};
pub use materialize::{materialize, MaterializedInput};
pub use page_nested_loop::PageNestedLoopJoin;
pub use sequential_scan::SequentialScan;
pub use sort_merge::SortMergeJoin;
