//! Join scenarios run against every strategy
//!
//! Covers the documented scenarios, agreement between algorithms, empty and
//! sparse inputs, fail-closed budgets, key type checks, the iteration
//! protocol and release of temporary relations.

use crate::categories::execution::{Filter, JoinSpec, PredicateOperator, SequentialScan};
use crate::categories::storage::{RelationHandle, StorageContext};
use crate::core::metrics::names;
use crate::core::operator::{drain, ExecError, Operator};
use crate::core::record::{DataType, Field, Record, RecordId, Schema, Value};
use crate::core::registry::{JoinStrategy, OperatorRegistry};
use crate::tests::fixtures;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn scan(storage: &StorageContext, table: &RelationHandle) -> Box<dyn Operator> {
    Box::new(SequentialScan::new(storage, table.clone()).unwrap())
}

fn build(
    strategy: JoinStrategy,
    storage: &StorageContext,
    left: &RelationHandle,
    right: &RelationHandle,
    columns: (&str, &str),
    budget: usize,
) -> Box<dyn Operator> {
    OperatorRegistry::with_builtin_joins()
        .build(
            strategy,
            JoinSpec::new(scan(storage, left), scan(storage, right), columns.0, columns.1, budget),
        )
        .unwrap()
}

fn sorted(mut records: Vec<Record>) -> Vec<Record> {
    records.sort();
    records
}

fn letters_table(storage: &StorageContext, name: &str, rows: &[(i32, &str)]) -> RelationHandle {
    let table = storage
        .create_table(name, Schema::new(vec![Field::int("num"), Field::string("tag", 4)]))
        .unwrap();
    for (num, tag) in rows {
        storage.insert(&table, vec![Value::Int(*num), Value::from(*tag)]).unwrap();
    }
    table
}

fn row(num: i32, tag: &str, num2: i32, tag2: &str) -> Record {
    Record::new(vec![
        Value::Int(num),
        Value::from(tag),
        Value::Int(num2),
        Value::from(tag2),
    ])
}

// ---------------------------------------------------------------------------
// Documented scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_block_nested_loop_budget_three() {
    let (ctx, storage) = fixtures::context(256);
    let left = letters_table(&storage, "l", &[(1, "a"), (2, "b"), (2, "c")]);
    let right = letters_table(&storage, "r", &[(2, "x"), (3, "y")]);

    let join = build(JoinStrategy::BlockNestedLoop, &storage, &left, &right, ("num", "num"), 3);
    let out = drain(join.iter(&ctx).unwrap()).unwrap();

    assert_eq!(out, vec![row(2, "b", 2, "x"), row(2, "c", 2, "x")]);
}

#[test]
fn scenario_grace_hash_budget_four() {
    let (ctx, storage) = fixtures::context(256);
    let left = letters_table(&storage, "l", &[(1, "a"), (2, "b"), (2, "c")]);
    let right = letters_table(&storage, "r", &[(2, "x"), (3, "y")]);

    let join = build(JoinStrategy::GraceHash, &storage, &left, &right, ("num", "num"), 4);
    let out = drain(join.iter(&ctx).unwrap()).unwrap();

    assert_eq!(sorted(out), vec![row(2, "b", 2, "x"), row(2, "c", 2, "x")]);
    assert_eq!(ctx.metrics.counter(names::PARTITIONS), 3);
}

// ---------------------------------------------------------------------------
// Agreement between strategies
// ---------------------------------------------------------------------------

#[test]
fn strategies_agree_on_multi_page_inputs() {
    let (ctx, storage) = fixtures::context(256);
    let left_rows: Vec<(i32, i32)> = (0..90).map(|i| ((i * 13) % 17, i)).collect();
    let right_rows: Vec<(i32, i32)> = (0..70).map(|i| ((i * 5) % 23, 1000 + i)).collect();
    let left = fixtures::int_table(&storage, "l", &left_rows);
    let right = fixtures::int_table(&storage, "r", &right_rows);

    let expected: Vec<Record> = {
        let mut pairs = Vec::new();
        for (lk, lv) in &left_rows {
            for (rk, rv) in &right_rows {
                if lk == rk {
                    pairs.push(Record::new(vec![
                        Value::Int(*lk),
                        Value::Int(*lv),
                        Value::Int(*rk),
                        Value::Int(*rv),
                    ]));
                }
            }
        }
        sorted(pairs)
    };
    assert!(!expected.is_empty());

    for budget in [3, 4, 7] {
        for strategy in JoinStrategy::ALL {
            let join = build(strategy, &storage, &left, &right, ("id", "id"), budget);
            let out = drain(join.iter(&ctx).unwrap()).unwrap();
            assert_eq!(sorted(out), expected, "{} with B={}", strategy, budget);
        }
    }
    assert_eq!(storage.temporary_count(), 0);
}

#[test]
fn block_nested_loop_at_three_matches_page_nested_order() {
    let (ctx, storage) = fixtures::context(256);
    let left_rows: Vec<(i32, i32)> = (0..60).map(|i| (i % 6, i)).collect();
    let right_rows: Vec<(i32, i32)> = (0..50).map(|i| (i % 4, i)).collect();
    let left = fixtures::int_table(&storage, "l", &left_rows);
    let right = fixtures::int_table(&storage, "r", &right_rows);

    let pnlj = build(JoinStrategy::PageNestedLoop, &storage, &left, &right, ("id", "id"), 3);
    let bnlj = build(JoinStrategy::BlockNestedLoop, &storage, &left, &right, ("id", "id"), 3);

    let a = drain(pnlj.iter(&ctx).unwrap()).unwrap();
    let b = drain(bnlj.iter(&ctx).unwrap()).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn join_on_non_leading_columns() {
    let (ctx, storage) = fixtures::context(256);
    let left = fixtures::int_table(&storage, "l", &[(1, 5), (2, 6), (3, 7)]);
    let right = fixtures::int_table(&storage, "r", &[(6, 0), (7, 1), (8, 2)]);

    for strategy in JoinStrategy::ALL {
        let join = build(strategy, &storage, &left, &right, ("val", "id"), 4);
        let out = sorted(drain(join.iter(&ctx).unwrap()).unwrap());
        let pairs: Vec<(i32, i32)> = out.iter().map(|r| fixtures::ints(r, 0, 3)).collect();
        assert_eq!(pairs, vec![(2, 0), (3, 1)], "{}", strategy);
    }
}

// ---------------------------------------------------------------------------
// Empty and sparse inputs
// ---------------------------------------------------------------------------

#[test]
fn empty_inputs_produce_nothing() {
    let (ctx, storage) = fixtures::context(256);
    let empty = fixtures::int_table(&storage, "empty", &[]);
    let full = fixtures::int_table(&storage, "full", &[(1, 1), (2, 2)]);

    for strategy in JoinStrategy::ALL {
        for (left, right) in [(&empty, &full), (&full, &empty), (&empty, &empty)] {
            let join = build(strategy, &storage, left, right, ("id", "id"), 5);
            let mut iter = join.iter(&ctx).unwrap();
            assert!(!iter.has_next().unwrap(), "{}", strategy);
        }
    }
}

#[test]
fn deleted_slots_are_skipped() {
    let (ctx, storage) = fixtures::context(256);
    let left_rows: Vec<(i32, i32)> = (0..40).map(|i| (i % 5, i)).collect();
    let left = fixtures::int_table(&storage, "l", &left_rows);
    let right = fixtures::int_table(&storage, "r", &[(0, 100), (1, 101), (2, 102)]);

    // drop every left record with an even val
    for page in 1..=2 {
        for slot in 0..24 {
            let rid = RecordId::new(page, slot);
            if let Ok(record) = storage.get_record(&left, rid) {
                if fixtures::ints(&record, 0, 1).1 % 2 == 0 {
                    storage.delete(&left, rid).unwrap();
                }
            }
        }
    }
    assert_eq!(storage.num_records(&left).unwrap(), 20);

    for strategy in JoinStrategy::ALL {
        let join = build(strategy, &storage, &left, &right, ("id", "id"), 4);
        let out = drain(join.iter(&ctx).unwrap()).unwrap();
        assert!(
            out.iter().all(|r| fixtures::ints(r, 1, 3).0 % 2 == 1),
            "{}",
            strategy
        );
        // odd vals with key 0, 1 or 2: 4 each
        assert_eq!(out.len(), 12, "{}", strategy);
    }
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn budget_below_three_fails_closed() {
    let (ctx, storage) = fixtures::context(256);
    let left = fixtures::int_table(&storage, "l", &[(1, 1)]);
    let right = fixtures::int_table(&storage, "r", &[(1, 1)]);

    for strategy in JoinStrategy::ALL {
        for budget in [0, 1, 2] {
            let join = build(strategy, &storage, &left, &right, ("id", "id"), budget);
            let mut iter = join.iter(&ctx).unwrap();
            assert!(!iter.has_next().unwrap());
            assert_eq!(iter.next_record(), Err(ExecError::Exhausted));
        }
    }
    assert_eq!(storage.temporary_count(), 0);
}

#[test]
fn key_type_mismatch_is_reported() {
    let (ctx, storage) = fixtures::context(256);
    let ints = fixtures::int_table(&storage, "l", &[(1, 1)]);
    let letters = letters_table(&storage, "r", &[(1, "a")]);

    for strategy in JoinStrategy::ALL {
        let join = build(strategy, &storage, &ints, &letters, ("id", "tag"), 4);
        assert!(
            matches!(join.iter(&ctx), Err(ExecError::TypeMismatch { .. })),
            "{}",
            strategy
        );
    }
}

#[test]
fn unknown_join_column_is_configuration_error() {
    let (_, storage) = fixtures::context(256);
    let table = fixtures::int_table(&storage, "t", &[(1, 1)]);
    let result = OperatorRegistry::with_builtin_joins().build(
        JoinStrategy::PageNestedLoop,
        JoinSpec::new(scan(&storage, &table), scan(&storage, &table), "id", "missing", 3),
    );
    assert!(matches!(result, Err(ExecError::Configuration(_))));
}

// ---------------------------------------------------------------------------
// Iteration protocol
// ---------------------------------------------------------------------------

#[test]
fn exhausted_iterator_reports_exhaustion() {
    let (ctx, storage) = fixtures::context(256);
    let left = fixtures::int_table(&storage, "l", &[(1, 1), (2, 2)]);
    let right = fixtures::int_table(&storage, "r", &[(2, 20)]);

    for strategy in JoinStrategy::ALL {
        let join = build(strategy, &storage, &left, &right, ("id", "id"), 3);
        let mut iter = join.iter(&ctx).unwrap();
        // has_next is idempotent
        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        let record = iter.next_record().unwrap();
        assert_eq!(fixtures::ints(&record, 1, 3), (2, 20));
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.next_record(), Err(ExecError::Exhausted));
        assert!(!iter.has_next().unwrap());
    }
}

#[test]
fn remove_is_rejected() {
    let (ctx, storage) = fixtures::context(256);
    let left = fixtures::int_table(&storage, "l", &[(1, 1)]);
    let right = fixtures::int_table(&storage, "r", &[(1, 1)]);

    for strategy in JoinStrategy::ALL {
        let join = build(strategy, &storage, &left, &right, ("id", "id"), 3);
        let mut iter = join.iter(&ctx).unwrap();
        iter.next_record().unwrap();
        assert_eq!(iter.remove(), Err(ExecError::Unsupported("remove")));
    }
    assert_eq!(storage.num_records(&left).unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Temporary relations
// ---------------------------------------------------------------------------

#[test]
fn temporaries_released_on_exhaustion_and_drop() {
    let (ctx, storage) = fixtures::context(256);
    let rows: Vec<(i32, i32)> = (0..60).map(|i| (i % 10, i)).collect();
    let left = fixtures::int_table(&storage, "l", &rows);
    let right = fixtures::int_table(&storage, "r", &rows);
    let registry = OperatorRegistry::with_builtin_joins();

    for strategy in JoinStrategy::ALL {
        let filtered = || -> Box<dyn Operator> {
            Box::new(Filter::new(scan(&storage, &left), "val", PredicateOperator::LessThan, Value::Int(30)).unwrap())
        };

        // drained to the end
        let join = registry
            .build(strategy, JoinSpec::new(filtered(), scan(&storage, &right), "id", "id", 4))
            .unwrap();
        let out = drain(join.iter(&ctx).unwrap()).unwrap();
        assert_eq!(out.len(), 30 * 6, "{}", strategy);
        assert_eq!(storage.temporary_count(), 0, "{}", strategy);

        // abandoned after one record
        let join = registry
            .build(strategy, JoinSpec::new(filtered(), scan(&storage, &right), "id", "id", 4))
            .unwrap();
        let mut iter = join.iter(&ctx).unwrap();
        assert!(iter.has_next().unwrap());
        assert!(storage.temporary_count() > 0);
        drop(iter);
        assert_eq!(storage.temporary_count(), 0, "{}", strategy);
    }
    assert_eq!(storage.table_names().len(), 2);
}

#[test]
fn output_schema_is_left_then_right() {
    let (_, storage) = fixtures::context(256);
    let ints = fixtures::int_table(&storage, "l", &[]);
    let letters = letters_table(&storage, "r", &[]);

    let join = build(JoinStrategy::SortMerge, &storage, &ints, &letters, ("id", "num"), 3);
    let schema = join.output_schema();
    assert_eq!(schema.len(), 4);
    assert_eq!(schema.data_type(1), Some(DataType::Int));
    assert_eq!(schema.data_type(3), Some(DataType::String(4)));
}
