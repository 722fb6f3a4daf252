//! Index Scan
//!
//! Answers a single-column comparison through a secondary index instead of
//! reading the whole table.
//!
//! ## How it works
//!
//! The predicate is resolved once, at construction, into an index access
//! path plus an optional residual check:
//!
//! | Predicate | Access path | Residual |
//! |-----------|-------------|----------|
//! | `=`  | key lookup | none |
//! | `>=` | ordered scan from the key | none |
//! | `>`  | ordered scan from the key | drop keys equal to the constant |
//! | `<`, `<=` | full ordered scan | stop at the first key past the bound |
//! | `!=` | full ordered scan | drop keys equal to the constant |
//!
//! With no predicate the scan degrades to a plain sequential read of the
//! table.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `records_examined` | Counter | Records pulled from the index or table |

use crate::core::constraint::{Constraint, Guarantee, GuaranteeType};
use crate::core::metrics::{names, MetricDefinition, MetricsCollector};
use crate::core::operator::{
    Complexity, ExecError, ExecResult, ExecutionContext, Operator, OperatorCategory,
    OperatorDocumentation, OperatorMetadata, Reference, ReferenceType, RecordIterator,
};
use crate::core::record::{Record, Schema, Value};
use crate::categories::storage::{IndexAccess, RecordIter, RelationAccess, RelationHandle};

use super::filter::PredicateOperator;

/// How records are pulled from storage
#[derive(Debug, Clone)]
enum AccessPath {
    /// Plain table scan, no index involved
    Table,
    Lookup(Value),
    ScanFrom(Value),
    SortedScan,
}

/// Post-fetch check applied to each record's key
#[derive(Debug, Clone)]
struct Residual {
    value: Value,
    keep: PredicateOperator,
    /// Once a key satisfies this, no later key in index order can match
    stop_when: Option<PredicateOperator>,
}

#[derive(Debug, Clone)]
struct ScanPlan {
    path: AccessPath,
    residual: Option<Residual>,
}

impl ScanPlan {
    fn resolve(predicate: Option<(PredicateOperator, Value)>) -> Self {
        use PredicateOperator::*;

        let Some((op, value)) = predicate else {
            return ScanPlan {
                path: AccessPath::Table,
                residual: None,
            };
        };
        let residual = |keep, stop_when| {
            Some(Residual {
                value: value.clone(),
                keep,
                stop_when,
            })
        };
        match op {
            Equals => ScanPlan {
                path: AccessPath::Lookup(value.clone()),
                residual: None,
            },
            GreaterThanEquals => ScanPlan {
                path: AccessPath::ScanFrom(value.clone()),
                residual: None,
            },
            GreaterThan => ScanPlan {
                path: AccessPath::ScanFrom(value.clone()),
                residual: residual(GreaterThan, None),
            },
            LessThan => ScanPlan {
                path: AccessPath::SortedScan,
                residual: residual(LessThan, Some(GreaterThanEquals)),
            },
            LessThanEquals => ScanPlan {
                path: AccessPath::SortedScan,
                residual: residual(LessThanEquals, Some(GreaterThan)),
            },
            NotEquals => ScanPlan {
                path: AccessPath::SortedScan,
                residual: residual(NotEquals, None),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// IndexScan
// ---------------------------------------------------------------------------

pub struct IndexScan {
    metadata: OperatorMetadata,
    requires: Vec<Constraint>,
    guarantees: Vec<Guarantee>,
    metric_defs: Vec<MetricDefinition>,
    table: RelationHandle,
    column: String,
    column_index: usize,
    schema: Schema,
    plan: ScanPlan,
}

impl IndexScan {
    /// Scan `table` on `column`, optionally restricted by `predicate`.
    ///
    /// # Errors
    /// Configuration error if the column is unknown or carries no index;
    /// type mismatch if the constant's type differs from the column's.
    pub fn new(
        relations: &dyn RelationAccess,
        indexes: &dyn IndexAccess,
        table: RelationHandle,
        column: &str,
        predicate: Option<(PredicateOperator, Value)>,
    ) -> ExecResult<Self> {
        let schema = relations.schema(&table)?;
        let column_index = schema.column_index(column)?;
        if !indexes.has_index(&table, column) {
            return Err(ExecError::Configuration(format!(
                "no index on {}.{}",
                table, column
            )));
        }
        if let (Some((_, value)), Some(data_type)) = (&predicate, schema.data_type(column_index)) {
            if value.type_name() != data_type.type_name() {
                return Err(ExecError::TypeMismatch {
                    left: data_type.type_name(),
                    right: value.type_name(),
                });
            }
        }

        Ok(Self {
            metadata: Self::build_metadata(),
            requires: vec![Constraint::requires_index(
                column,
                "predicates are answered through the column's index",
            )],
            guarantees: Self::build_guarantees(&predicate),
            metric_defs: vec![MetricDefinition::counter(
                names::RECORDS_EXAMINED,
                "Records Examined",
                "records",
                "Records pulled from the index or table before the residual check",
            )],
            table,
            column: column.to_string(),
            column_index,
            schema,
            plan: ScanPlan::resolve(predicate),
        })
    }

    fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: "index_scan".into(),
            name: "Index Scan".into(),
            category: OperatorCategory::Scan,
            description: "Answers a column comparison through a secondary index".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "Uses an ordered index to avoid reading records that cannot satisfy \
                           the predicate. Equality becomes a key lookup, lower bounds become a \
                           scan from the key, and upper bounds stop at the first key past the \
                           bound."
                    .into(),
                algorithm: "Resolve the predicate to an access path once; on each pull, fetch \
                            the next record from that path and apply the residual check."
                    .into(),
                complexity: Complexity {
                    io: "index traversal + one fetch per qualifying record".into(),
                    space: "1 record".into(),
                },
                use_cases: vec![
                    "Selective point lookups".into(),
                    "Range predicates on an indexed column".into(),
                ],
                tradeoffs: vec![
                    "Each fetched record may touch a different page".into(),
                    "Inequality (!=) still reads every entry".into(),
                ],
            },
            references: vec![Reference {
                ref_type: ReferenceType::Book,
                title: "Database Management Systems, ch. 14: Evaluating Relational Operators"
                    .into(),
                url: None,
                citation: Some("Ramakrishnan, R. & Gehrke, J. (2003). McGraw-Hill.".into()),
            }],
        }
    }

    fn build_guarantees(predicate: &Option<(PredicateOperator, Value)>) -> Vec<Guarantee> {
        let mut guarantees = vec![Guarantee::strict(
            GuaranteeType::ReadOnly,
            "never modifies the scanned relation",
        )];
        if predicate.is_some() {
            guarantees.push(Guarantee::strict(
                GuaranteeType::SortedOutput,
                "records come back in index key order",
            ));
        }
        guarantees
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn table(&self) -> &RelationHandle {
        &self.table
    }
}

impl Operator for IndexScan {
    fn metadata(&self) -> &OperatorMetadata {
        &self.metadata
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }

    fn requires(&self) -> &[Constraint] {
        &self.requires
    }

    fn guarantees(&self) -> &[Guarantee] {
        &self.guarantees
    }

    fn metrics(&self) -> &[MetricDefinition] {
        &self.metric_defs
    }

    fn iter(&self, ctx: &ExecutionContext) -> ExecResult<Box<dyn RecordIterator>> {
        let source = match &self.plan.path {
            AccessPath::Table => ctx.relations.record_iterator(&self.table)?,
            AccessPath::Lookup(value) => ctx.indexes.lookup_key(&self.table, &self.column, value)?,
            AccessPath::ScanFrom(value) => {
                ctx.indexes.sorted_scan_from(&self.table, &self.column, value)?
            }
            AccessPath::SortedScan => ctx.indexes.sorted_scan(&self.table, &self.column)?,
        };
        Ok(Box::new(IndexScanIterator {
            source,
            residual: self.plan.residual.clone(),
            column_index: self.column_index,
            metrics: ctx.metrics.clone(),
            pending: None,
            done: false,
        }))
    }
}

struct IndexScanIterator {
    source: RecordIter,
    residual: Option<Residual>,
    column_index: usize,
    metrics: MetricsCollector,
    pending: Option<Record>,
    done: bool,
}

impl IndexScanIterator {
    fn advance(&mut self) -> ExecResult<Option<Record>> {
        while let Some(record) = self.source.next() {
            let record = record?;
            self.metrics.increment(names::RECORDS_EXAMINED);
            let Some(residual) = &self.residual else {
                return Ok(Some(record));
            };
            let key = record.get(self.column_index).ok_or_else(|| {
                ExecError::Schema(format!("record has no column {}", self.column_index))
            })?;
            let ordering = key.compare(&residual.value)?;
            if residual.stop_when.map_or(false, |stop| stop.evaluate(ordering)) {
                return Ok(None);
            }
            if residual.keep.evaluate(ordering) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl RecordIterator for IndexScanIterator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::drain;
    use crate::tests::fixtures;

    #[test]
    fn test_missing_index_is_configuration_error() {
        let (_, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[(1, 1)]);
        let result = IndexScan::new(&storage, &storage, table, "val", None);
        assert!(matches!(result, Err(ExecError::Configuration(_))));
    }

    #[test]
    fn test_constant_type_checked() {
        let (_, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[(1, 1)]);
        storage.create_index(&table, "val").unwrap();
        let result = IndexScan::new(
            &storage,
            &storage,
            table,
            "val",
            Some((PredicateOperator::Equals, Value::Bool(true))),
        );
        assert!(matches!(result, Err(ExecError::TypeMismatch { .. })));
    }

    #[test]
    fn test_greater_than_is_strict() {
        let (ctx, storage) = fixtures::context(256);
        let rows: Vec<(i32, i32)> = (0..20).map(|i| (i, i % 5)).collect();
        let table = fixtures::int_table(&storage, "t", &rows);
        storage.create_index(&table, "val").unwrap();

        let scan = IndexScan::new(
            &storage,
            &storage,
            table,
            "val",
            Some((PredicateOperator::GreaterThan, Value::Int(2))),
        )
        .unwrap();
        let out = drain(scan.iter(&ctx).unwrap()).unwrap();

        assert_eq!(out.len(), 8);
        assert!(out.iter().all(|r| r.values()[1] > Value::Int(2)));
    }

    #[test]
    fn test_requires_index_constraint_declared() {
        let (_, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[]);
        storage.create_index(&table, "val").unwrap();
        let scan = IndexScan::new(&storage, &storage, table, "val", None).unwrap();
        assert_eq!(scan.requires().len(), 1);
        assert_eq!(scan.base_relation(), None);
    }
}
