//! Operator trait and related types
//!
//! This module defines the core [`Operator`] trait every plan node implements,
//! the pull-style [`RecordIterator`] protocol operators hand out, and the
//! supporting metadata, execution context and error types.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::constraint::{Constraint, Guarantee};
use super::metrics::{Logger, MetricDefinition, MetricsCollector};
use super::parameter::Parameter;
use super::record::{Record, Schema};
use crate::categories::storage::{IndexAccess, RelationAccess, RelationHandle, StorageContext};

/// Result alias used throughout the engine
pub type ExecResult<T> = Result<T, ExecError>;

/// A node in a query plan that produces records on demand
pub trait Operator: Send + Sync {
    /// Get operator metadata
    fn metadata(&self) -> &OperatorMetadata;

    /// Schema of the records this operator emits
    fn output_schema(&self) -> &Schema;

    /// The stored relation this operator reads directly, if it is a plain
    /// sequential scan. Anything else must be materialized before a join
    /// can page through it.
    fn base_relation(&self) -> Option<&RelationHandle> {
        None
    }

    /// Get parameter definitions
    fn parameters(&self) -> &[Parameter] {
        &[]
    }

    /// Get constraints this operator requires
    fn requires(&self) -> &[Constraint] {
        &[]
    }

    /// Get guarantees this operator provides
    fn guarantees(&self) -> &[Guarantee] {
        &[]
    }

    /// Get metric definitions
    fn metrics(&self) -> &[MetricDefinition] {
        &[]
    }

    /// Open a fresh iterator over this operator's output.
    ///
    /// Each call starts an independent pass; iterators never share cursor
    /// state with one another.
    fn iter(&self, ctx: &ExecutionContext) -> ExecResult<Box<dyn RecordIterator>>;
}

/// Pull-style record producer
///
/// `has_next` may do work (read pages, build hash tables) but never consumes
/// a record; repeated calls without an intervening `next_record` are
/// idempotent. Once `has_next` has returned `false` or an error, the iterator
/// stays exhausted.
pub trait RecordIterator: Send {
    /// Whether another record is available
    fn has_next(&mut self) -> ExecResult<bool>;

    /// Consume and return the next record.
    ///
    /// # Errors
    /// Returns [`ExecError::Exhausted`] when called with nothing left.
    fn next_record(&mut self) -> ExecResult<Record>;

    /// In-place deletion through the iterator. Not supported by any
    /// operator in this crate.
    fn remove(&mut self) -> ExecResult<()> {
        Err(ExecError::Unsupported("remove"))
    }
}

/// Adapts a [`RecordIterator`] to [`std::iter::Iterator`]
pub struct RecordStream {
    inner: Box<dyn RecordIterator>,
    failed: bool,
}

impl RecordStream {
    pub fn new(inner: Box<dyn RecordIterator>) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl Iterator for RecordStream {
    type Item = ExecResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.inner.has_next() {
            Ok(true) => self.inner.next_record(),
            Ok(false) => return None,
            Err(e) => Err(e),
        };
        self.failed = item.is_err();
        Some(item)
    }
}

/// Pull every remaining record out of an iterator.
pub fn drain(iter: Box<dyn RecordIterator>) -> ExecResult<Vec<Record>> {
    RecordStream::new(iter).collect()
}

/// Wraps a fallible `Iterator` of records in the [`RecordIterator`] protocol
pub struct IterAdapter<I> {
    inner: I,
    pending: Option<Record>,
    done: bool,
}

impl<I> IterAdapter<I>
where
    I: Iterator<Item = ExecResult<Record>> + Send,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            pending: None,
            done: false,
        }
    }
}

impl<I> RecordIterator for IterAdapter<I>
where
    I: Iterator<Item = ExecResult<Record>> + Send,
{
    fn has_next(&mut self) -> ExecResult<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }
        match self.inner.next() {
            Some(Ok(record)) => {
                self.pending = Some(record);
                Ok(true)
            }
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(false)
            }
        }
    }

    fn next_record(&mut self) -> ExecResult<Record> {
        if !self.has_next()? {
            return Err(ExecError::Exhausted);
        }
        self.pending.take().ok_or(ExecError::Exhausted)
    }
}

/// Operator metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorMetadata {
    /// Unique operator identifier
    pub id: String,
    /// Human-readable operator name
    pub name: String,
    /// Operator category
    pub category: OperatorCategory,
    /// Brief description of the operator
    pub description: String,
    /// Operator version
    pub version: String,
    /// Detailed documentation
    pub documentation: OperatorDocumentation,
    /// References to papers, books, etc.
    pub references: Vec<Reference>,
}

/// Operator categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorCategory {
    /// Leaf operators reading stored relations
    Scan,
    /// Predicate evaluation over a child
    Selection,
    /// Binary equi-joins
    Join,
}

/// Operator documentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorDocumentation {
    /// Overview of the operator's purpose
    pub overview: String,
    /// Algorithm description
    pub algorithm: String,
    /// Complexity analysis
    pub complexity: Complexity,
    /// Common use cases
    pub use_cases: Vec<String>,
    /// Tradeoffs to consider
    pub tradeoffs: Vec<String>,
}

/// Complexity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complexity {
    /// I/O cost in pages (e.g., "[R] + [R][S]")
    pub io: String,
    /// Memory bound in pages
    pub space: String,
}

/// Reference to external resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// Type of reference
    pub ref_type: ReferenceType,
    /// Title of the reference
    pub title: String,
    /// URL if available
    pub url: Option<String>,
    /// Citation information
    pub citation: Option<String>,
}

/// Types of references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    /// Academic paper
    Paper,
    /// Book
    Book,
    /// Implementation reference
    Implementation,
}

/// Everything an operator needs while producing records
#[derive(Clone)]
pub struct ExecutionContext {
    /// Paged relation storage, including temporary relations
    pub relations: Arc<dyn RelationAccess>,
    /// Secondary index lookups
    pub indexes: Arc<dyn IndexAccess>,
    /// Metrics collector shared by every iterator of a session
    pub metrics: MetricsCollector,
    /// Logger for debugging
    pub logger: Logger,
}

impl ExecutionContext {
    /// Context backed by a single storage context for both relations and indexes
    pub fn new(storage: StorageContext) -> Self {
        let storage = Arc::new(storage);
        Self {
            relations: storage.clone(),
            indexes: storage,
            metrics: MetricsCollector::new(),
            logger: Logger::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}

/// Execution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    /// Bad operator wiring: unknown column, missing index, invalid setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Values of different types were compared
    #[error("Type mismatch: cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },

    /// `next_record` called on an exhausted iterator
    #[error("Iterator exhausted")]
    Exhausted,

    /// Operation not supported by this iterator or operator
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Record does not conform to a schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Page or relation level failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for ExecError {
    fn from(error: std::io::Error) -> Self {
        ExecError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(error: serde_json::Error) -> Self {
        ExecError::Serialization(error.to_string())
    }
}
