//! Join input materialization
//!
//! Join algorithms page through their inputs, so each input must be a stored
//! relation. A sequential scan already is one and is used as-is; any other
//! operator is drained once into a temporary relation that lives exactly as
//! long as the [`MaterializedInput`] wrapping it.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `rows_materialized` | Counter | Records copied into temporary relations |

use std::sync::Arc;

use crate::categories::storage::{
    PageIterator, PageLayout, RecordCursor, RecordIter, RelationAccess, RelationHandle,
    TempRelation,
};
use crate::core::metrics::{names, MetricsCollector};
use crate::core::operator::{ExecResult, ExecutionContext, Operator, RecordStream};
use crate::core::record::Schema;

/// A join input backed by stored pages
#[derive(Debug)]
pub struct MaterializedInput {
    handle: RelationHandle,
    schema: Schema,
    layout: PageLayout,
    /// Present when the pages belong to a temporary relation we own
    temp: Option<TempRelation>,
}

impl MaterializedInput {
    /// Wrap an existing stored relation without copying it
    pub fn stored(relations: &dyn RelationAccess, handle: RelationHandle) -> ExecResult<Self> {
        Ok(Self {
            schema: relations.schema(&handle)?,
            layout: relations.layout(&handle)?,
            handle,
            temp: None,
        })
    }

    /// Take ownership of a filled temporary relation
    pub fn temporary(relations: &dyn RelationAccess, temp: TempRelation) -> ExecResult<Self> {
        let handle = temp.handle().clone();
        Ok(Self {
            schema: relations.schema(&handle)?,
            layout: relations.layout(&handle)?,
            handle,
            temp: Some(temp),
        })
    }

    pub fn handle(&self) -> &RelationHandle {
        &self.handle
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Fresh iterator over the data pages, counting page reads
    pub fn data_pages(&self, access: &Arc<dyn RelationAccess>, metrics: &MetricsCollector) -> PageIterator {
        PageIterator::data_pages(access.clone(), self.handle.clone()).with_metrics(metrics.clone())
    }

    /// Record cursor over the data pages, counting page reads
    pub fn cursor(&self, access: &Arc<dyn RelationAccess>, metrics: &MetricsCollector) -> RecordCursor {
        RecordCursor::new(self.data_pages(access, metrics), self.layout, self.schema.clone())
    }

    /// Every valid record, without page accounting
    pub fn records(&self, access: &Arc<dyn RelationAccess>) -> ExecResult<RecordIter> {
        access.record_iterator(&self.handle)
    }
}

/// Ensure `source` is backed by stored pages.
///
/// Sequential scans are returned as a view of their relation; anything else
/// is drained into a new temporary relation tagged with `tag`.
pub fn materialize(
    ctx: &ExecutionContext,
    source: &dyn Operator,
    tag: &str,
) -> ExecResult<MaterializedInput> {
    if let Some(handle) = source.base_relation() {
        return MaterializedInput::stored(ctx.relations.as_ref(), handle.clone());
    }

    let temp = TempRelation::create(ctx.relations.clone(), source.output_schema(), tag)?;
    let mut rows = 0u64;
    for record in RecordStream::new(source.iter(ctx)?) {
        temp.append(record?.into_values())?;
        rows += 1;
    }
    ctx.metrics.add(names::ROWS_MATERIALIZED, rows);
    ctx.logger.debug(&format!(
        "materialized {} rows of {} into {}",
        rows,
        source.metadata().id,
        temp.handle()
    ));
    MaterializedInput::temporary(ctx.relations.as_ref(), temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::execution::{Filter, PredicateOperator, SequentialScan};
    use crate::core::record::Value;
    use crate::tests::fixtures;

    #[test]
    fn test_scan_used_in_place() {
        let (ctx, storage) = fixtures::context(256);
        let table = fixtures::int_table(&storage, "t", &[(1, 1), (2, 2)]);
        let scan = SequentialScan::new(&storage, table.clone()).unwrap();

        let input = materialize(&ctx, &scan, "left").unwrap();
        assert!(!input.is_temporary());
        assert_eq!(input.handle(), &table);
        assert_eq!(ctx.metrics.counter(names::ROWS_MATERIALIZED), 0);
    }

    #[test]
    fn test_filter_copied_and_released() {
        let (ctx, storage) = fixtures::context(256);
        let rows: Vec<(i32, i32)> = (0..40).map(|i| (i, i)).collect();
        let table = fixtures::int_table(&storage, "t", &rows);
        let scan = SequentialScan::new(&storage, table).unwrap();
        let filter = Filter::new(Box::new(scan), "val", PredicateOperator::GreaterThanEquals, Value::Int(30)).unwrap();

        let input = materialize(&ctx, &filter, "right").unwrap();
        assert!(input.is_temporary());
        assert_eq!(storage.temporary_count(), 1);
        assert_eq!(storage.num_records(input.handle()).unwrap(), 10);
        assert_eq!(ctx.metrics.counter(names::ROWS_MATERIALIZED), 10);

        drop(input);
        assert_eq!(storage.temporary_count(), 0);
    }
}
