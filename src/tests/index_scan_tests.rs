//! Index scan predicates over a small duplicate-heavy table

use crate::categories::execution::{IndexScan, PredicateOperator};
use crate::categories::storage::{RelationHandle, StorageContext};
use crate::core::metrics::names;
use crate::core::operator::{drain, ExecutionContext, Operator};
use crate::core::record::{RecordId, Value};
use crate::tests::fixtures;

const VALUES: [i32; 9] = [5, 1, 3, 6, 2, 3, 5, 2, 3];

fn setup() -> (ExecutionContext, StorageContext, RelationHandle) {
    let (ctx, storage) = fixtures::context(256);
    let rows: Vec<(i32, i32)> = VALUES.iter().enumerate().map(|(i, v)| (i as i32, *v)).collect();
    let table = fixtures::int_table(&storage, "t", &rows);
    storage.create_index(&table, "val").unwrap();
    (ctx, storage, table)
}

/// Values produced by the scan, plus how many records it examined
fn scan(op: Option<PredicateOperator>, constant: i32) -> (Vec<i32>, u64) {
    let (ctx, storage, table) = setup();
    let predicate = op.map(|op| (op, Value::Int(constant)));
    let scan = IndexScan::new(&storage, &storage, table, "val", predicate).unwrap();
    let out = drain(scan.iter(&ctx).unwrap()).unwrap();
    let values = out.iter().map(|r| fixtures::ints(r, 1, 0).0).collect();
    (values, ctx.metrics.counter(names::RECORDS_EXAMINED))
}

#[test]
fn greater_than_excludes_boundary() {
    let (values, examined) = scan(Some(PredicateOperator::GreaterThan), 3);
    assert_eq!(values, vec![5, 5, 6]);
    // starts at the first 3 and drops the three equal keys
    assert_eq!(examined, 6);
}

#[test]
fn less_than_stops_at_first_key_past_bound() {
    let (values, examined) = scan(Some(PredicateOperator::LessThan), 3);
    assert_eq!(values, vec![1, 2, 2]);
    // 1, 2, 2 and the first 3; nothing after it
    assert_eq!(examined, 4);
}

#[test]
fn less_than_equals_includes_boundary() {
    let (values, examined) = scan(Some(PredicateOperator::LessThanEquals), 3);
    assert_eq!(values, vec![1, 2, 2, 3, 3, 3]);
    assert_eq!(examined, 7);
}

#[test]
fn greater_than_equals_scans_from_key() {
    let (values, examined) = scan(Some(PredicateOperator::GreaterThanEquals), 3);
    assert_eq!(values, vec![3, 3, 3, 5, 5, 6]);
    assert_eq!(examined, 6);
}

#[test]
fn equals_is_a_lookup() {
    let (values, examined) = scan(Some(PredicateOperator::Equals), 3);
    assert_eq!(values, vec![3, 3, 3]);
    assert_eq!(examined, 3);
}

#[test]
fn not_equals_visits_everything() {
    let (values, examined) = scan(Some(PredicateOperator::NotEquals), 3);
    assert_eq!(values, vec![1, 2, 2, 5, 5, 6]);
    assert_eq!(examined, 9);
}

#[test]
fn no_predicate_reads_table_order() {
    let (values, examined) = scan(None, 0);
    assert_eq!(values, VALUES.to_vec());
    assert_eq!(examined, 9);
}

#[test]
fn bounds_outside_key_range() {
    assert_eq!(scan(Some(PredicateOperator::GreaterThan), 6).0, Vec::<i32>::new());
    let (values, examined) = scan(Some(PredicateOperator::LessThan), 1);
    assert!(values.is_empty());
    assert_eq!(examined, 1);
}

#[test]
fn equal_keys_keep_insertion_order() {
    let (ctx, storage, table) = setup();
    let scan = IndexScan::new(
        &storage,
        &storage,
        table,
        "val",
        Some((PredicateOperator::Equals, Value::Int(3))),
    )
    .unwrap();
    let ids: Vec<i32> = drain(scan.iter(&ctx).unwrap())
        .unwrap()
        .iter()
        .map(|r| fixtures::ints(r, 0, 1).0)
        .collect();
    assert_eq!(ids, vec![2, 5, 8]);
}

#[test]
fn deletes_are_reflected_in_index() {
    let (ctx, storage, table) = setup();
    // row 0 holds the first 5
    storage.delete(&table, RecordId::new(1, 0)).unwrap();

    let scan = IndexScan::new(
        &storage,
        &storage,
        table,
        "val",
        Some((PredicateOperator::GreaterThan, Value::Int(3))),
    )
    .unwrap();
    let values: Vec<i32> = drain(scan.iter(&ctx).unwrap())
        .unwrap()
        .iter()
        .map(|r| fixtures::ints(r, 1, 0).0)
        .collect();
    assert_eq!(values, vec![5, 6]);
}

#[test]
fn rescanning_restarts_from_the_beginning() {
    let (ctx, storage, table) = setup();
    let scan = IndexScan::new(
        &storage,
        &storage,
        table,
        "val",
        Some((PredicateOperator::LessThanEquals, Value::Int(2))),
    )
    .unwrap();
    let first = drain(scan.iter(&ctx).unwrap()).unwrap();
    let second = drain(scan.iter(&ctx).unwrap()).unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}
