//! Index structures
//!
//! Secondary indexes over stored relations, consulted by the index scan.

pub mod btree;

pub use btree::SecondaryIndex;
