//! Ordered secondary index
//!
//! Maps key values of one column to the [`RecordId`]s holding them, kept in
//! key order so the index can answer point lookups, scans starting at a key,
//! and full ordered scans. Duplicate keys keep their record ids in insertion
//! order.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::core::record::{RecordId, Value};

#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    column: String,
    column_index: usize,
    entries: BTreeMap<Value, Vec<RecordId>>,
    len: usize,
}

impl SecondaryIndex {
    pub fn new(column: impl Into<String>, column_index: usize) -> Self {
        Self {
            column: column.into(),
            column_index,
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Position of the indexed column in the table schema
    pub fn column_index(&self) -> usize {
        self.column_index
    }

    /// Number of indexed record ids
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, key: Value, rid: RecordId) {
        self.entries.entry(key).or_default().push(rid);
        self.len += 1;
    }

    /// Remove one (key, rid) entry; false if it was not present
    pub fn remove(&mut self, key: &Value, rid: RecordId) -> bool {
        let Some(rids) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = rids.iter().position(|r| *r == rid) else {
            return false;
        };
        rids.remove(pos);
        if rids.is_empty() {
            self.entries.remove(key);
        }
        self.len -= 1;
        true
    }

    /// Record ids whose key equals `key`
    pub fn lookup(&self, key: &Value) -> Vec<RecordId> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Record ids with keys `>= key`, in key order
    pub fn scan_from(&self, key: &Value) -> Vec<RecordId> {
        self.entries
            .range((Bound::Included(key), Bound::Unbounded))
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect()
    }

    /// Every record id in key order
    pub fn scan(&self) -> Vec<RecordId> {
        self.entries.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SecondaryIndex {
        let mut idx = SecondaryIndex::new("age", 1);
        idx.insert(Value::Int(30), RecordId::new(1, 0));
        idx.insert(Value::Int(20), RecordId::new(1, 1));
        idx.insert(Value::Int(30), RecordId::new(1, 2));
        idx.insert(Value::Int(40), RecordId::new(2, 0));
        idx
    }

    #[test]
    fn test_lookup_keeps_insertion_order() {
        assert_eq!(
            index().lookup(&Value::Int(30)),
            vec![RecordId::new(1, 0), RecordId::new(1, 2)]
        );
        assert!(index().lookup(&Value::Int(31)).is_empty());
    }

    #[test]
    fn test_scan_from() {
        let rids = index().scan_from(&Value::Int(25));
        assert_eq!(
            rids,
            vec![RecordId::new(1, 0), RecordId::new(1, 2), RecordId::new(2, 0)]
        );
    }

    #[test]
    fn test_scan_in_key_order() {
        assert_eq!(index().scan()[0], RecordId::new(1, 1));
        assert_eq!(index().len(), 4);
        assert_eq!(index().distinct_keys(), 3);
    }

    #[test]
    fn test_remove() {
        let mut idx = index();
        assert!(idx.remove(&Value::Int(20), RecordId::new(1, 1)));
        assert!(!idx.remove(&Value::Int(20), RecordId::new(1, 1)));
        assert_eq!(idx.distinct_keys(), 2);
        assert_eq!(idx.len(), 3);
    }
}
