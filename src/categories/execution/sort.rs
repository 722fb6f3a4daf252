//! Sort phase of the sort-merge join
//!
//! Reads every record of a materialized input, stably sorts on one column and
//! writes the result into a fresh temporary relation. Memory use is the whole
//! input; the buffer budget does not bound this phase.
//!
//! ## Metrics tracked
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `records_sorted` | Counter | Records written to sorted runs |

use std::sync::Arc;

use crate::categories::storage::{RelationAccess, TempRelation};
use crate::core::metrics::{names, Logger, MetricsCollector};
use crate::core::operator::ExecResult;
use crate::core::record::Record;

use super::join::key_at;
use super::materialize::MaterializedInput;

/// Sort `input` on the column at `key`, returning the sorted copy.
///
/// Ties keep their physical order. Values of one column share a type, so the
/// total order on [`Value`](crate::core::record::Value) agrees with the
/// comparison primitive.
pub(crate) fn sort_into_relation(
    access: &Arc<dyn RelationAccess>,
    input: &MaterializedInput,
    key: usize,
    tag: &str,
    metrics: &MetricsCollector,
    logger: &Logger,
) -> ExecResult<MaterializedInput> {
    let mut records = input
        .records(access)?
        .collect::<ExecResult<Vec<Record>>>()?;
    for record in &records {
        key_at(record, key)?;
    }

    records.sort_by(|a, b| a.get(key).cmp(&b.get(key)));

    let temp = TempRelation::create(access.clone(), input.schema(), tag)?;
    let count = records.len();
    for record in records {
        temp.append(record.into_values())?;
    }
    metrics.add(names::RECORDS_SORTED, count as u64);
    logger.debug(&format!("sorted {} records of {} into {}", count, input.handle(), temp.handle()));
    MaterializedInput::temporary(access.as_ref(), temp)
}

/// Check that a cursor's records come back ordered on `key`
#[cfg(test)]
pub(crate) fn is_sorted_on(records: &[Record], key: usize) -> bool {
    records.windows(2).all(|w| w[0].get(key) <= w[1].get(key))
}
