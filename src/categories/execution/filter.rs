//! Filter
//!
//! Evaluates a single-column comparison on each record of its child and
//! passes through only the records that satisfy it. The comparison
//! operators here are shared with the index scan.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `records_examined` | Counter | Records pulled from the child |

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::constraint::{Guarantee, GuaranteeType};
use crate::core::metrics::{names, MetricDefinition, MetricsCollector};
use crate::core::operator::{
    Complexity, ExecError, ExecResult, ExecutionContext, Operator, OperatorCategory,
    OperatorDocumentation, OperatorMetadata, RecordIterator,
};
use crate::core::record::{Record, Schema, Value};

/// Comparison of a column against a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOperator {
    Equals,
    NotEquals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
}

impl PredicateOperator {
    /// Whether `column <op> constant` holds given `column.cmp(constant)`
    pub fn evaluate(&self, ordering: Ordering) -> bool {
        match self {
            PredicateOperator::Equals => ordering == Ordering::Equal,
            PredicateOperator::NotEquals => ordering != Ordering::Equal,
            PredicateOperator::LessThan => ordering == Ordering::Less,
            PredicateOperator::LessThanEquals => ordering != Ordering::Greater,
            PredicateOperator::GreaterThan => ordering == Ordering::Greater,
            PredicateOperator::GreaterThanEquals => ordering != Ordering::Less,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            PredicateOperator::Equals => "=",
            PredicateOperator::NotEquals => "!=",
            PredicateOperator::LessThan => "<",
            PredicateOperator::LessThanEquals => "<=",
            PredicateOperator::GreaterThan => ">",
            PredicateOperator::GreaterThanEquals => ">=",
        }
    }
}

impl fmt::Display for PredicateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for PredicateOperator {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(PredicateOperator::Equals),
            "!=" | "<>" | "ne" => Ok(PredicateOperator::NotEquals),
            "<" | "lt" => Ok(PredicateOperator::LessThan),
            "<=" | "le" => Ok(PredicateOperator::LessThanEquals),
            ">" | "gt" => Ok(PredicateOperator::GreaterThan),
            ">=" | "ge" => Ok(PredicateOperator::GreaterThanEquals),
            other => Err(ExecError::Configuration(format!(
                "unknown comparison operator '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

pub struct Filter {
    metadata: OperatorMetadata,
    guarantees: Vec<Guarantee>,
    metric_defs: Vec<MetricDefinition>,
    source: Box<dyn Operator>,
    column_index: usize,
    op: PredicateOperator,
    value: Value,
}

impl Filter {
    /// Filter `source` on `column <op> value`.
    ///
    /// # Errors
    /// Configuration error if `column` is not in the source schema.
    pub fn new(
        source: Box<dyn Operator>,
        column: &str,
        op: PredicateOperator,
        value: Value,
    ) -> ExecResult<Self> {
        let column_index = source.output_schema().column_index(column)?;
        Ok(Self {
            metadata: Self::build_metadata(),
            guarantees: vec![Guarantee::strict(
                GuaranteeType::DeterministicOrder,
                "preserves the order of its input",
            )],
            metric_defs: vec![MetricDefinition::counter(
                names::RECORDS_EXAMINED,
                "Records Examined",
                "records",
                "Records pulled from the child operator",
            )],
            source,
            column_index,
            op,
            value,
        })
    }

    fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: "filter".into(),
            name: "Filter".into(),
            category: OperatorCategory::Selection,
            description: "Passes through records satisfying a column comparison".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "Pulls records from its child one at a time and keeps those whose \
                           column compares to the constant as requested."
                    .into(),
                algorithm: "For each child record: compare column with constant; emit on match."
                    .into(),
                complexity: Complexity {
                    io: "cost of the child".into(),
                    space: "1 record".into(),
                },
                use_cases: vec!["Selections below a join".into()],
                tradeoffs: vec![
                    "A filtered join input has no stored pages and is materialized first".into(),
                ],
            },
            references: vec![],
        }
    }
}

impl Operator for Filter {
    fn metadata(&self) -> &OperatorMetadata {
        &self.metadata
    }

    fn output_schema(&self) -> &Schema {
        self.source.output_schema()
    }

    fn guarantees(&self) -> &[Guarantee] {
        &self.guarantees
    }

    fn metrics(&self) -> &[MetricDefinition] {
        &self.metric_defs
    }

    fn iter(&self, ctx: &ExecutionContext) -> ExecResult<Box<dyn RecordIterator>> {
        Ok(Box::new(FilterIterator {
            source: self.source.iter(ctx)?,
            column_index: self.column_index,
            op: self.op,
            value: self.value.clone(),
            metrics: ctx.metrics.clone(),
            pending: None,
            done: false,
        }))
    }
}

struct FilterIterator {
    source: Box<dyn RecordIterator>,
    column_index: usize,
    op: PredicateOperator,
    value: Value,
    metrics: MetricsCollector,
    pending: Option<Record>,
    done: bool,
}

impl FilterIterator {
    fn advance(&mut self) -> ExecResult<Option<Record>> {
        while self.source.has_next()? {
            let record = self.source.next_record()?;
            self.metrics.increment(names::RECORDS_EXAMINED);
            let key = record.get(self.column_index).ok_or_else(|| {
                ExecError::Schema(format!("record has no column {}", self.column_index))
            })?;
            if self.op.evaluate(key.compare(&self.value)?) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl RecordIterator for FilterIterator {
    fn has_next(&mut self) -> ExecResult<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }
        match self.advance() {
            Ok(Some(record)) => {
                self.pending = Some(record);
                Ok(true)
            }
            Ok(None) => {
                self.done = true;
                Ok(false)
            }
            Err(e) => {
                self.done = true;
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
