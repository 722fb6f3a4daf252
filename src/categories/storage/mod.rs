//! Paged relation storage
//!
//! Operators never touch heap files directly; they go through the
//! [`RelationAccess`] and [`IndexAccess`] traits, which a [`StorageContext`]
//! implements for an in-memory catalog of heap files and secondary indexes.

pub mod context;
pub mod heap_file;
pub mod page;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::operator::ExecResult;
use crate::core::record::{Record, RecordId, Schema, Value};

pub use context::{StorageContext, TempRelation};
pub use heap_file::HeapFile;
pub use page::{
    Page, PageIterator, PageLayout, PageRef, RecordCursor, SlotMark, DEFAULT_PAGE_SIZE,
};

/// Boxed, fallible record iterator handed out by storage
pub type RecordIter = Box<dyn Iterator<Item = ExecResult<Record>> + Send>;

/// Unique identifier for a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationId(pub Uuid);

impl RelationId {
    pub fn new() -> Self {
        RelationId(Uuid::new_v4())
    }
}

impl Default for RelationId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// User table, lives until dropped
    Base,
    /// Scratch relation owned by a running operator
    Temporary,
}

/// Cheap, clonable reference to a stored relation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationHandle {
    id: RelationId,
    name: Arc<str>,
    kind: RelationKind,
}

impl RelationHandle {
    pub fn new(name: &str, kind: RelationKind) -> Self {
        Self {
            id: RelationId::new(),
            name: Arc::from(name),
            kind,
        }
    }

    pub fn id(&self) -> RelationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == RelationKind::Temporary
    }
}

impl fmt::Display for RelationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Page-level access to stored relations
pub trait RelationAccess: Send + Sync {
    /// Create an empty temporary relation; the name hint only aids debugging
    fn create_temp_relation(&self, schema: &Schema, name_hint: &str) -> ExecResult<RelationHandle>;

    fn append_record(&self, relation: &RelationHandle, values: Vec<Value>) -> ExecResult<RecordId>;

    fn schema(&self, relation: &RelationHandle) -> ExecResult<Schema>;

    fn layout(&self, relation: &RelationHandle) -> ExecResult<PageLayout>;

    /// Pages in the relation, counting the metadata page
    fn page_count(&self, relation: &RelationHandle) -> ExecResult<usize>;

    fn fetch_page(&self, relation: &RelationHandle, page_no: usize) -> ExecResult<PageRef>;

    /// Valid records of the relation in page then slot order
    fn record_iterator(&self, relation: &RelationHandle) -> ExecResult<RecordIter>;

    fn drop_relation(&self, relation: &RelationHandle) -> ExecResult<()>;

    fn entries_per_page(&self, relation: &RelationHandle) -> ExecResult<usize> {
        Ok(self.layout(relation)?.entries_per_page())
    }

    fn entry_size(&self, relation: &RelationHandle) -> ExecResult<usize> {
        Ok(self.layout(relation)?.entry_size())
    }

    fn header_size(&self, relation: &RelationHandle) -> ExecResult<usize> {
        Ok(self.layout(relation)?.header_size())
    }

    /// Copy of a data page's header bitmap
    fn page_header(&self, relation: &RelationHandle, page: &Page) -> ExecResult<Vec<u8>> {
        Ok(self.layout(relation)?.header(page)?.to_vec())
    }
}

/// Secondary index lookups
pub trait IndexAccess: Send + Sync {
    fn has_index(&self, table: &RelationHandle, column: &str) -> bool;

    /// Records whose column equals `value`
    fn lookup_key(&self, table: &RelationHandle, column: &str, value: &Value) -> ExecResult<RecordIter>;

    /// Records with column `>= value`, ascending
    fn sorted_scan_from(&self, table: &RelationHandle, column: &str, value: &Value) -> ExecResult<RecordIter>;

    /// Every record, ascending on the column
    fn sorted_scan(&self, table: &RelationHandle, column: &str) -> ExecResult<RecordIter>;
}
