//! Helpers shared by unit and cross-module tests

use crate::categories::storage::{RelationHandle, StorageContext};
use crate::core::operator::ExecutionContext;
use crate::core::record::{Field, Record, Schema, Value};

/// Fresh storage with `page_size`-byte pages and a context over it
pub(crate) fn context(page_size: usize) -> (ExecutionContext, StorageContext) {
    let storage = StorageContext::with_page_size(page_size);
    (ExecutionContext::new(storage.clone()), storage)
}

/// Create table `name` with int columns `id` and `val` holding `rows`
pub(crate) fn int_table(storage: &StorageContext, name: &str, rows: &[(i32, i32)]) -> RelationHandle {
    let table = storage
        .create_table(name, Schema::new(vec![Field::int("id"), Field::int("val")]))
        .unwrap();
    for (id, val) in rows {
        storage.insert(&table, vec![Value::Int(*id), Value::Int(*val)]).unwrap();
    }
    table
}

/// The int values at columns `a` and `b`
pub(crate) fn ints(record: &Record, a: usize, b: usize) -> (i32, i32) {
    let int = |i: usize| match record.get(i) {
        Some(Value::Int(v)) => *v,
        other => panic!("column {} is not an int: {:?}", i, other),
    };
    (int(a), int(b))
}
