//! Cross-module test suite
//!
//! Shared fixtures plus scenario, property and end-to-end tests that span
//! storage, scans and the join operators.

pub(crate) mod fixtures;

mod index_scan_tests;
mod join_tests;
