//! Shared machinery of the equi-join operators
//!
//! Every join strategy is an [`Operator`] whose iterator is a
//! [`JoinIterator`]: a one-record lookahead wrapped around a [`JoinState`]
//! variant that owns the strategy's cursors, resident pages and temporary
//! relations. Dropping the iterator (or exhausting it) releases all of them.
//!
//! Output records are the left record's values followed by the right
//! record's values; the output schema is the matching concatenation.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::categories::storage::RelationAccess;
use crate::core::constraint::{Constraint, ConstraintContext};
use crate::core::metrics::{names, Logger, MetricDefinition, MetricsCollector};
use crate::core::operator::{ExecError, ExecResult, ExecutionContext, Operator, RecordIterator};
use crate::core::parameter::Parameter;
use crate::core::record::{Record, Schema, Value};

use super::block_nested_loop::BlockNestedState;
use super::grace_hash::GraceHashState;
use super::materialize::{materialize, MaterializedInput};
use super::page_nested_loop::PageNestedState;
use super::sort_merge::SortMergeState;

/// Smallest budget any join runs under: one page per input plus one for output
pub const MIN_JOIN_BUFFER_PAGES: usize = 3;

/// Inputs and settings for building a join operator
pub struct JoinSpec {
    pub left: Box<dyn Operator>,
    pub right: Box<dyn Operator>,
    pub left_column: String,
    pub right_column: String,
    /// Buffer pages `B` the join may hold at once
    pub buffer_pages: usize,
}

impl JoinSpec {
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_column: &str,
        right_column: &str,
        buffer_pages: usize,
    ) -> Self {
        Self {
            left,
            right,
            left_column: left_column.to_string(),
            right_column: right_column.to_string(),
            buffer_pages,
        }
    }
}

/// Positions of the join columns within each side's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinKeys {
    pub left: usize,
    pub right: usize,
}

// ---------------------------------------------------------------------------
// JoinCore: state common to every join operator
// ---------------------------------------------------------------------------

pub(crate) struct JoinCore {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    keys: JoinKeys,
    buffer_pages: usize,
    schema: Schema,
    params: Vec<Parameter>,
}

impl JoinCore {
    pub(crate) fn new(spec: JoinSpec) -> ExecResult<Self> {
        let keys = JoinKeys {
            left: spec.left.output_schema().column_index(&spec.left_column)?,
            right: spec.right.output_schema().column_index(&spec.right_column)?,
        };
        let schema = spec.left.output_schema().concat(spec.right.output_schema());
        Ok(Self {
            left: spec.left,
            right: spec.right,
            keys,
            buffer_pages: spec.buffer_pages,
            schema,
            params: vec![
                Parameter::column("left_column", "Left Column", "Join column of the left input"),
                Parameter::column("right_column", "Right Column", "Join column of the right input"),
                Parameter::integer(
                    "buffer_pages",
                    "Buffer Pages",
                    "Pages the join may hold in memory at once",
                    8,
                    MIN_JOIN_BUFFER_PAGES as i64,
                    1 << 20,
                ),
            ],
        })
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub(crate) fn buffer_pages(&self) -> usize {
        self.buffer_pages
    }

    /// Both join columns must carry the same type
    fn check_key_types(&self) -> ExecResult<()> {
        let left = self.left.output_schema().data_type(self.keys.left);
        let right = self.right.output_schema().data_type(self.keys.right);
        match (left, right) {
            (Some(l), Some(r)) if l.type_name() != r.type_name() => Err(ExecError::TypeMismatch {
                left: l.type_name(),
                right: r.type_name(),
            }),
            _ => Ok(()),
        }
    }

    /// Validate the join and set up its environment.
    ///
    /// Returns `None` when the buffer budget cannot satisfy `requires`; the
    /// caller then hands out an iterator that produces nothing.
    pub(crate) fn open(
        &self,
        ctx: &ExecutionContext,
        operator_id: &str,
        requires: &[Constraint],
    ) -> ExecResult<Option<JoinEnv>> {
        self.check_key_types()?;
        let env = JoinEnv {
            access: ctx.relations.clone(),
            keys: self.keys,
            buffer_pages: self.buffer_pages,
            metrics: ctx.metrics.clone(),
            logger: ctx.logger.scoped(operator_id),
        };

        let check = ConstraintContext::with_buffer_pages(self.buffer_pages).check_constraints(requires);
        if !check.satisfied {
            env.logger.warn(&format!(
                "refusing to run with {} buffer pages: {}",
                self.buffer_pages,
                check.summary()
            ));
            return Ok(None);
        }
        Ok(Some(env))
    }

    /// Materialize both inputs under `operator_id`-tagged temporary names
    pub(crate) fn inputs(
        &self,
        ctx: &ExecutionContext,
        operator_id: &str,
    ) -> ExecResult<(MaterializedInput, MaterializedInput)> {
        let left = materialize(ctx, self.left.as_ref(), &format!("{}-left", operator_id))?;
        let right = materialize(ctx, self.right.as_ref(), &format!("{}-right", operator_id))?;
        Ok((left, right))
    }
}

/// Metric definitions every join reports
pub(crate) fn join_metric_definitions() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::counter(names::PAGES_READ, "Pages Read", "pages", "Data pages fetched from storage"),
        MetricDefinition::counter(
            names::RECORDS_COMPARED,
            "Records Compared",
            "comparisons",
            "Join key comparisons performed",
        ),
        MetricDefinition::counter(names::MATCHES, "Matches", "records", "Joined records emitted"),
    ]
}

// ---------------------------------------------------------------------------
// JoinEnv: what a running join state needs from its context
// ---------------------------------------------------------------------------

pub(crate) struct JoinEnv {
    pub(crate) access: Arc<dyn RelationAccess>,
    pub(crate) keys: JoinKeys,
    pub(crate) buffer_pages: usize,
    pub(crate) metrics: MetricsCollector,
    pub(crate) logger: Logger,
}

impl JoinEnv {
    pub(crate) fn left_key<'a>(&self, record: &'a Record) -> ExecResult<&'a Value> {
        key_at(record, self.keys.left)
    }

    pub(crate) fn right_key<'a>(&self, record: &'a Record) -> ExecResult<&'a Value> {
        key_at(record, self.keys.right)
    }

    /// Compare a left record's key with a right record's key
    pub(crate) fn compare(&self, left: &Record, right: &Record) -> ExecResult<Ordering> {
        self.metrics.increment(names::RECORDS_COMPARED);
        self.left_key(left)?.compare(self.right_key(right)?)
    }

    pub(crate) fn keys_match(&self, left: &Record, right: &Record) -> ExecResult<bool> {
        Ok(self.compare(left, right)? == Ordering::Equal)
    }
}

pub(crate) fn key_at(record: &Record, index: usize) -> ExecResult<&Value> {
    record
        .get(index)
        .ok_or_else(|| ExecError::Schema(format!("record has no column {}", index)))
}

// ---------------------------------------------------------------------------
// JoinState / JoinIterator
// ---------------------------------------------------------------------------

pub(crate) enum JoinState {
    PageNested(PageNestedState),
    BlockNested(BlockNestedState),
    GraceHash(GraceHashState),
    SortMerge(SortMergeState),
    Exhausted,
}

impl JoinState {
    fn advance(&mut self, env: &JoinEnv) -> ExecResult<Option<Record>> {
        match self {
            JoinState::PageNested(state) => state.advance(env),
            JoinState::BlockNested(state) => state.advance(env),
            JoinState::GraceHash(state) => state.advance(env),
            JoinState::SortMerge(state) => state.advance(env),
            JoinState::Exhausted => Ok(None),
        }
    }
}

/// Iterator handed out by every join operator
pub struct JoinIterator {
    state: JoinState,
    env: Option<JoinEnv>,
    pending: Option<Record>,
}

impl JoinIterator {
    pub(crate) fn new(state: JoinState, env: JoinEnv) -> Self {
        Self {
            state,
            env: Some(env),
            pending: None,
        }
    }

    /// Iterator that yields nothing
    pub(crate) fn empty() -> Self {
        Self {
            state: JoinState::Exhausted,
            env: None,
            pending: None,
        }
    }

    fn finish(&mut self) {
        if !matches!(self.state, JoinState::Exhausted) {
            if let Some(env) = &self.env {
                env.logger.debug("join exhausted, releasing resources");
            }
        }
        self.state = JoinState::Exhausted;
    }
}

impl RecordIterator for JoinIterator {
    fn has_next(&mut self) -> ExecResult<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        let Some(env) = &self.env else {
            return Ok(false);
        };
        match self.state.advance(env) {
            Ok(Some(record)) => {
                env.metrics.increment(names::MATCHES);
                self.pending = Some(record);
                Ok(true)
            }
            Ok(None) => {
                self.finish();
                Ok(false)
            }
            Err(e) => {
                env.logger.error(&format!("join failed: {}", e));
                self.finish();
                Err(e)
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
