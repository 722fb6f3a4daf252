//! Join Registry - Central registry of the available join strategies
//!
//! Maps a [`JoinStrategy`] to a constructor and the strategy's metadata, so a
//! caller can pick an algorithm by name (from configuration, say) and discover
//! what each one costs before building it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::categories::execution::{
    block_nested_loop, grace_hash, page_nested_loop, sort_merge, BlockNestedLoopJoin,
    GraceHashJoin, JoinSpec, PageNestedLoopJoin, SortMergeJoin,
};
use crate::core::operator::{ExecError, ExecResult, Operator, OperatorMetadata};

/// The equi-join algorithms the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    PageNestedLoop,
    BlockNestedLoop,
    GraceHash,
    SortMerge,
}

impl JoinStrategy {
    pub const ALL: [JoinStrategy; 4] = [
        JoinStrategy::PageNestedLoop,
        JoinStrategy::BlockNestedLoop,
        JoinStrategy::GraceHash,
        JoinStrategy::SortMerge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStrategy::PageNestedLoop => "page_nested_loop",
            JoinStrategy::BlockNestedLoop => "block_nested_loop",
            JoinStrategy::GraceHash => "grace_hash",
            JoinStrategy::SortMerge => "sort_merge",
        }
    }
}

impl Default for JoinStrategy {
    fn default() -> Self {
        JoinStrategy::BlockNestedLoop
    }
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinStrategy {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JoinStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ExecError::Configuration(format!("unknown join strategy: {}", s)))
    }
}

/// Builds a join operator from its inputs
pub type JoinFactory = fn(JoinSpec) -> ExecResult<Box<dyn Operator>>;

/// A registered strategy: what it is and how to build it
#[derive(Clone)]
pub struct RegisteredJoin {
    pub strategy: JoinStrategy,
    pub metadata: OperatorMetadata,
    pub factory: JoinFactory,
}

impl fmt::Debug for RegisteredJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredJoin")
            .field("strategy", &self.strategy)
            .field("operator", &self.metadata.id)
            .finish()
    }
}

/// Registry of join strategies
///
/// Cloning is cheap and clones share the same table; reads are concurrent and
/// writes exclusive through parking_lot's RwLock.
#[derive(Clone)]
pub struct OperatorRegistry {
    joins: Arc<RwLock<HashMap<JoinStrategy, RegisteredJoin>>>,
}

impl OperatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            joins: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry holding the four built-in joins
    pub fn with_builtin_joins() -> Self {
        let registry = Self::new();
        let builtins: [(JoinStrategy, OperatorMetadata, JoinFactory); 4] = [
            (
                JoinStrategy::PageNestedLoop,
                PageNestedLoopJoin::build_metadata(),
                |spec| Ok(Box::new(PageNestedLoopJoin::new(spec)?)),
            ),
            (
                JoinStrategy::BlockNestedLoop,
                BlockNestedLoopJoin::build_metadata(),
                |spec| Ok(Box::new(BlockNestedLoopJoin::new(spec)?)),
            ),
            (
                JoinStrategy::GraceHash,
                GraceHashJoin::build_metadata(),
                |spec| Ok(Box::new(GraceHashJoin::new(spec)?)),
            ),
            (
                JoinStrategy::SortMerge,
                SortMergeJoin::build_metadata(),
                |spec| Ok(Box::new(SortMergeJoin::new(spec)?)),
            ),
        ];
        for (strategy, metadata, factory) in builtins {
            let mut joins = registry.joins.write();
            joins.insert(
                strategy,
                RegisteredJoin {
                    strategy,
                    metadata,
                    factory,
                },
            );
        }
        registry
    }

    /// Register a strategy.
    ///
    /// # Errors
    /// * `RegistryError::DuplicateJoin` if the strategy is already registered
    /// * `RegistryError::ValidationError` if the metadata has no name or version
    pub fn register(
        &self,
        strategy: JoinStrategy,
        metadata: OperatorMetadata,
        factory: JoinFactory,
    ) -> Result<(), RegistryError> {
        if metadata.name.is_empty() {
            return Err(RegistryError::ValidationError("operator name cannot be empty".into()));
        }
        if metadata.version.is_empty() {
            return Err(RegistryError::ValidationError("operator version cannot be empty".into()));
        }

        let mut joins = self.joins.write();
        if joins.contains_key(&strategy) {
            return Err(RegistryError::DuplicateJoin(strategy.to_string()));
        }
        joins.insert(
            strategy,
            RegisteredJoin {
                strategy,
                metadata,
                factory,
            },
        );
        Ok(())
    }

    pub fn unregister(&self, strategy: JoinStrategy) -> Result<(), RegistryError> {
        self.joins
            .write()
            .remove(&strategy)
            .map(|_| ())
            .ok_or_else(|| RegistryError::JoinNotFound(strategy.to_string()))
    }

    /// Build the join registered for `strategy`
    pub fn build(&self, strategy: JoinStrategy, spec: JoinSpec) -> ExecResult<Box<dyn Operator>> {
        let factory = {
            let joins = self.joins.read();
            joins
                .get(&strategy)
                .map(|entry| entry.factory)
                .ok_or_else(|| RegistryError::JoinNotFound(strategy.to_string()))?
        };
        factory(spec)
    }

    pub fn metadata(&self, strategy: JoinStrategy) -> Result<OperatorMetadata, RegistryError> {
        self.joins
            .read()
            .get(&strategy)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| RegistryError::JoinNotFound(strategy.to_string()))
    }

    /// Every registered strategy, in [`JoinStrategy::ALL`] order
    pub fn list(&self) -> Vec<RegisteredJoin> {
        let joins = self.joins.read();
        JoinStrategy::ALL
            .iter()
            .filter_map(|strategy| joins.get(strategy).cloned())
            .collect()
    }

    /// Case-insensitive search over name, description and use cases
    pub fn search(&self, query: &str) -> Vec<RegisteredJoin> {
        let query = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|entry| {
                let meta = &entry.metadata;
                meta.name.to_lowercase().contains(&query)
                    || meta.description.to_lowercase().contains(&query)
                    || meta
                        .documentation
                        .use_cases
                        .iter()
                        .any(|use_case| use_case.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn contains(&self, strategy: JoinStrategy) -> bool {
        self.joins.read().contains_key(&strategy)
    }

    pub fn count(&self) -> usize {
        self.joins.read().len()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::with_builtin_joins()
    }
}

/// Operator ids of the built-in joins, in [`JoinStrategy::ALL`] order
pub const BUILTIN_JOIN_IDS: [&str; 4] = [
    page_nested_loop::OPERATOR_ID,
    block_nested_loop::OPERATOR_ID,
    grace_hash::OPERATOR_ID,
    sort_merge::OPERATOR_ID,
];

/// Registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Join strategy not registered: {0}")]
    JoinNotFound(String),

    #[error("Duplicate join strategy: {0}")]
    DuplicateJoin(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<RegistryError> for ExecError {
    fn from(e: RegistryError) -> Self {
        ExecError::Configuration(e.to_string())
    }
}
