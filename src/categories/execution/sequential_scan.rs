//! Sequential Scan
//!
//! Reads every valid record of a stored relation in page then slot order.
//! This is the only operator a join can page through without first
//! materializing it.

use crate::core::constraint::{Guarantee, GuaranteeType};
use crate::core::operator::{
    Complexity, ExecResult, ExecutionContext, IterAdapter, Operator, OperatorCategory,
    OperatorDocumentation, OperatorMetadata, RecordIterator,
};
use crate::core::record::Schema;
use crate::categories::storage::{RelationAccess, RelationHandle};

// ---------------------------------------------------------------------------
// SequentialScan
// ---------------------------------------------------------------------------

pub struct SequentialScan {
    metadata: OperatorMetadata,
    guarantees: Vec<Guarantee>,
    table: RelationHandle,
    schema: Schema,
}

impl SequentialScan {
    pub fn new(relations: &dyn RelationAccess, table: RelationHandle) -> ExecResult<Self> {
        let schema = relations.schema(&table)?;
        Ok(Self {
            metadata: Self::build_metadata(),
            guarantees: vec![
                Guarantee::strict(GuaranteeType::ReadOnly, "never modifies the scanned relation"),
                Guarantee::strict(
                    GuaranteeType::DeterministicOrder,
                    "records come back in page then slot order",
                ),
            ],
            table,
            schema,
        })
    }

    fn build_metadata() -> OperatorMetadata {
        OperatorMetadata {
            id: "sequential_scan".into(),
            name: "Sequential Scan".into(),
            category: OperatorCategory::Scan,
            description: "Reads every record of a relation in storage order".into(),
            version: "1.0.0".into(),
            documentation: OperatorDocumentation {
                overview: "Walks the data pages of a relation one at a time and yields each \
                           valid slot. Page 0 holds the relation's schema and is skipped."
                    .into(),
                algorithm: "For each data page: for each slot whose header bit is set, decode \
                            the record."
                    .into(),
                complexity: Complexity {
                    io: "[R]".into(),
                    space: "1 page".into(),
                },
                use_cases: vec!["Full table reads".into(), "Join inputs".into()],
                tradeoffs: vec!["Reads every page even when few records qualify".into()],
            },
            references: vec![],
        }
    }

    pub fn table(&self) -> &RelationHandle {
        &self.table
    }
}

impl Operator for SequentialScan {
    fn metadata(&self) -> &OperatorMetadata {
        &self.metadata
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }

    fn base_relation(&self) -> Option<&RelationHandle> {
        Some(&self.table)
    }

    fn guarantees(&self) -> &[Guarantee] {
        &self.guarantees
    }

    fn iter(&self, ctx: &ExecutionContext) -> ExecResult<Box<dyn RecordIterator>> {
        let records = ctx.relations.record_iterator(&self.table)?;
        Ok(Box::new(IterAdapter::new(records)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operator::drain;
    use crate::core::record::Value;
    use crate::tests::fixtures;

    #[test]
    fn test_scan_returns_all_records_in_order() {
        let (ctx, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[(1, 10), (2, 20), (3, 30)]);

        let scan = SequentialScan::new(&storage, table).unwrap();
        let records = drain(scan.iter(&ctx).unwrap()).unwrap();

        let ids: Vec<Value> = records.iter().map(|r| r.values()[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_base_relation_exposed() {
        let (_, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[]);
        let scan = SequentialScan::new(&storage, table.clone()).unwrap();
        assert_eq!(scan.base_relation(), Some(&table));
        assert_eq!(scan.metadata().category, OperatorCategory::Scan);
    }

    #[test]
    fn test_independent_iterators() {
        let (ctx, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[(1, 1), (2, 2)]);
        let scan = SequentialScan::new(&storage, table).unwrap();

        let mut first = scan.iter(&ctx).unwrap();
        first.next_record().unwrap();
        let second = drain(scan.iter(&ctx).unwrap()).unwrap();
        assert_eq!(second.len(), 2);
        assert!(first.has_next().unwrap());
    }
}
