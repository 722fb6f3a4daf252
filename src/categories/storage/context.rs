//! In-memory storage context
//!
//! Holds every heap file and secondary index behind one `parking_lot`
//! read-write lock. Readers take the lock only long enough to clone a
//! [`PageRef`], so long-running scans never block inserts.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::heap_file::HeapFile;
use super::page::{PageIterator, PageLayout, PageRef, RecordCursor, DEFAULT_PAGE_SIZE};
use super::{IndexAccess, RecordIter, RelationAccess, RelationHandle, RelationId, RelationKind};
use crate::categories::index::SecondaryIndex;
use crate::core::operator::{ExecError, ExecResult};
use crate::core::record::{Record, RecordId, Schema, Value};

struct StoredRelation {
    handle: RelationHandle,
    heap: HeapFile,
    /// Keyed by column name as given to `create_index`
    indexes: HashMap<String, SecondaryIndex>,
}

impl StoredRelation {
    fn index(&self, column: &str) -> Option<&SecondaryIndex> {
        self.indexes.get(column).or_else(|| {
            let idx = self.heap.schema().column_index(column).ok()?;
            self.indexes.values().find(|i| i.column_index() == idx)
        })
    }
}

#[derive(Default)]
struct Catalog {
    relations: HashMap<RelationId, StoredRelation>,
    tables: HashMap<String, RelationHandle>,
}

/// Catalog of stored relations; clones share the same catalog
#[derive(Clone)]
pub struct StorageContext {
    catalog: Arc<RwLock<Catalog>>,
    page_size: usize,
}

impl StorageContext {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::default())),
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // -- Tables ---------------------------------------------------------------

    pub fn create_table(&self, name: &str, schema: Schema) -> ExecResult<RelationHandle> {
        let heap = HeapFile::new(schema, self.page_size)?;
        let mut catalog = self.catalog.write();
        if catalog.tables.contains_key(name) {
            return Err(ExecError::Configuration(format!("table '{}' already exists", name)));
        }
        let handle = RelationHandle::new(name, RelationKind::Base);
        catalog.tables.insert(name.to_string(), handle.clone());
        catalog.relations.insert(
            handle.id(),
            StoredRelation {
                handle: handle.clone(),
                heap,
                indexes: HashMap::new(),
            },
        );
        tracing::debug!(table = name, "created table");
        Ok(handle)
    }

    pub fn table(&self, name: &str) -> ExecResult<RelationHandle> {
        self.catalog
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::Configuration(format!("no table named '{}'", name)))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.catalog.read().tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert a record, keeping every index on the table current
    pub fn insert(&self, table: &RelationHandle, values: Vec<Value>) -> ExecResult<RecordId> {
        let mut catalog = self.catalog.write();
        let stored = Self::relation_mut(&mut catalog, table)?;
        let keys: Vec<(String, Value)> = stored
            .indexes
            .iter()
            .filter_map(|(name, idx)| Some((name.clone(), values.get(idx.column_index())?.clone())))
            .collect();
        let rid = stored.heap.append(values)?;
        for (name, key) in keys {
            if let Some(idx) = stored.indexes.get_mut(&name) {
                idx.insert(key, rid);
            }
        }
        Ok(rid)
    }

    pub fn delete(&self, table: &RelationHandle, rid: RecordId) -> ExecResult<Record> {
        let mut catalog = self.catalog.write();
        let stored = Self::relation_mut(&mut catalog, table)?;
        let old = stored.heap.delete(rid)?;
        for idx in stored.indexes.values_mut() {
            if let Some(key) = old.get(idx.column_index()) {
                idx.remove(key, rid);
            }
        }
        Ok(old)
    }

    pub fn update(&self, table: &RelationHandle, rid: RecordId, values: Vec<Value>) -> ExecResult<Record> {
        let mut catalog = self.catalog.write();
        let stored = Self::relation_mut(&mut catalog, table)?;
        let old = stored.heap.update(rid, values.clone())?;
        for idx in stored.indexes.values_mut() {
            let column = idx.column_index();
            if let (Some(before), Some(after)) = (old.get(column), values.get(column)) {
                if before != after {
                    idx.remove(before, rid);
                    idx.insert(after.clone(), rid);
                }
            }
        }
        Ok(old)
    }

    pub fn get_record(&self, table: &RelationHandle, rid: RecordId) -> ExecResult<Record> {
        let catalog = self.catalog.read();
        Self::relation(&catalog, table)?.heap.get(rid)
    }

    pub fn num_records(&self, table: &RelationHandle) -> ExecResult<usize> {
        let catalog = self.catalog.read();
        Ok(Self::relation(&catalog, table)?.heap.num_records())
    }

    /// Build a secondary index over the current contents of a column
    pub fn create_index(&self, table: &RelationHandle, column: &str) -> ExecResult<()> {
        let mut catalog = self.catalog.write();
        let stored = Self::relation_mut(&mut catalog, table)?;
        let column_index = stored.heap.schema().column_index(column)?;
        if stored.index(column).is_some() {
            return Err(ExecError::Configuration(format!(
                "index on {}.{} already exists",
                table, column
            )));
        }
        let mut index = SecondaryIndex::new(column, column_index);
        for (rid, record) in stored.heap.records()? {
            if let Some(key) = record.get(column_index) {
                index.insert(key.clone(), rid);
            }
        }
        tracing::debug!(table = %table, column, entries = index.len(), "built index");
        stored.indexes.insert(column.to_string(), index);
        Ok(())
    }

    /// Relations currently stored, base and temporary
    pub fn relation_count(&self) -> usize {
        self.catalog.read().relations.len()
    }

    pub fn temporary_count(&self) -> usize {
        self.catalog
            .read()
            .relations
            .values()
            .filter(|r| r.handle.is_temporary())
            .count()
    }

    // -- Internals ------------------------------------------------------------

    fn relation<'a>(catalog: &'a Catalog, handle: &RelationHandle) -> ExecResult<&'a StoredRelation> {
        catalog
            .relations
            .get(&handle.id())
            .ok_or_else(|| ExecError::Storage(format!("relation {} does not exist", handle)))
    }

    fn relation_mut<'a>(
        catalog: &'a mut Catalog,
        handle: &RelationHandle,
    ) -> ExecResult<&'a mut StoredRelation> {
        catalog
            .relations
            .get_mut(&handle.id())
            .ok_or_else(|| ExecError::Storage(format!("relation {} does not exist", handle)))
    }

    fn index_rids<F>(&self, table: &RelationHandle, column: &str, select: F) -> ExecResult<RecordIter>
    where
        F: FnOnce(&SecondaryIndex) -> Vec<RecordId>,
    {
        let rids = {
            let catalog = self.catalog.read();
            let stored = Self::relation(&catalog, table)?;
            let index = stored.index(column).ok_or_else(|| {
                ExecError::Configuration(format!("no index on {}.{}", table, column))
            })?;
            select(index)
        };
        let storage = self.clone();
        let table = table.clone();
        Ok(Box::new(
            rids.into_iter()
                .map(move |rid| storage.get_record(&table, rid)),
        ))
    }
}

impl Default for StorageContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageContext")
            .field("page_size", &self.page_size)
            .field("relations", &self.relation_count())
            .finish()
    }
}

impl RelationAccess for StorageContext {
    fn create_temp_relation(&self, schema: &Schema, name_hint: &str) -> ExecResult<RelationHandle> {
        let heap = HeapFile::new(schema.clone(), self.page_size)?;
        let handle = RelationHandle::new(&format!("temp:{}", name_hint), RelationKind::Temporary);
        self.catalog.write().relations.insert(
            handle.id(),
            StoredRelation {
                handle: handle.clone(),
                heap,
                indexes: HashMap::new(),
            },
        );
        Ok(handle)
    }

    fn append_record(&self, relation: &RelationHandle, values: Vec<Value>) -> ExecResult<RecordId> {
        self.insert(relation, values)
    }

    fn schema(&self, relation: &RelationHandle) -> ExecResult<Schema> {
        let catalog = self.catalog.read();
        Ok(Self::relation(&catalog, relation)?.heap.schema().clone())
    }

    fn layout(&self, relation: &RelationHandle) -> ExecResult<PageLayout> {
        let catalog = self.catalog.read();
        Ok(Self::relation(&catalog, relation)?.heap.layout())
    }

    fn page_count(&self, relation: &RelationHandle) -> ExecResult<usize> {
        let catalog = self.catalog.read();
        Ok(Self::relation(&catalog, relation)?.heap.page_count())
    }

    fn fetch_page(&self, relation: &RelationHandle, page_no: usize) -> ExecResult<PageRef> {
        let catalog = self.catalog.read();
        Self::relation(&catalog, relation)?.heap.page(page_no)
    }

    fn record_iterator(&self, relation: &RelationHandle) -> ExecResult<RecordIter> {
        let (layout, schema) = {
            let catalog = self.catalog.read();
            let heap = &Self::relation(&catalog, relation)?.heap;
            (heap.layout(), heap.schema().clone())
        };
        let access: Arc<dyn RelationAccess> = Arc::new(self.clone());
        let pages = PageIterator::data_pages(access, relation.clone());
        Ok(Box::new(RecordCursor::new(pages, layout, schema)))
    }

    fn drop_relation(&self, relation: &RelationHandle) -> ExecResult<()> {
        let mut catalog = self.catalog.write();
        catalog
            .relations
            .remove(&relation.id())
            .ok_or_else(|| ExecError::Storage(format!("relation {} does not exist", relation)))?;
        if relation.kind() == RelationKind::Base {
            catalog.tables.remove(relation.name());
        }
        Ok(())
    }
}

impl IndexAccess for StorageContext {
    fn has_index(&self, table: &RelationHandle, column: &str) -> bool {
        let catalog = self.catalog.read();
        Self::relation(&catalog, table)
            .map(|stored| stored.index(column).is_some())
            .unwrap_or(false)
    }

    fn lookup_key(&self, table: &RelationHandle, column: &str, value: &Value) -> ExecResult<RecordIter> {
        self.index_rids(table, column, |index| index.lookup(value))
    }

    fn sorted_scan_from(&self, table: &RelationHandle, column: &str, value: &Value) -> ExecResult<RecordIter> {
        self.index_rids(table, column, |index| index.scan_from(value))
    }

    fn sorted_scan(&self, table: &RelationHandle, column: &str) -> ExecResult<RecordIter> {
        self.index_rids(table, column, |index| index.scan())
    }
}

// ---------------------------------------------------------------------------
// Temporary relation guard
// ---------------------------------------------------------------------------

/// Owns a temporary relation and drops it from storage when released
pub struct TempRelation {
    handle: RelationHandle,
    access: Arc<dyn RelationAccess>,
}

impl TempRelation {
    pub fn create(access: Arc<dyn RelationAccess>, schema: &Schema, name_hint: &str) -> ExecResult<Self> {
        let handle = access.create_temp_relation(schema, name_hint)?;
        Ok(Self { handle, access })
    }

    pub fn handle(&self) -> &RelationHandle {
        &self.handle
    }

    pub fn append(&self, values: Vec<Value>) -> ExecResult<RecordId> {
        self.access.append_record(&self.handle, values)
    }
}

impl fmt::Debug for TempRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TempRelation").field(&self.handle).finish()
    }
}

impl Drop for TempRelation {
    fn drop(&mut self) {
        if let Err(e) = self.access.drop_relation(&self.handle) {
            tracing::warn!(relation = %self.handle, error = %e, "failed to release temporary relation");
        }
    }
}
