//! Heap file
//!
//! An unordered, paged relation. Page 0 is the metadata page holding the
//! relation's schema; every later page is a data page in the slotted layout
//! described in [`super::page`].
//!
//! ## How it works
//!
//! Inserts fill the first free slot of the lowest-numbered page that has one,
//! allocating a fresh page only when every data page is full. A set of
//! non-full pages stands in for a free-space map. Deletes clear the slot's
//! header bit; the record bytes are left behind and overwritten by the next
//! insert into that slot.
//!
//! Pages are shared as [`PageRef`]s and copied on write, so an in-flight scan
//! sees a stable snapshot of each page it has already fetched.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::page::{Page, PageLayout, PageRef};
use crate::core::operator::{ExecError, ExecResult};
use crate::core::record::{Record, RecordId, Schema, Value};

// ---------------------------------------------------------------------------
// HeapFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HeapFile {
    schema: Schema,
    layout: PageLayout,
    pages: Vec<PageRef>,
    /// Data pages with at least one free slot
    free_pages: BTreeSet<usize>,
    num_records: usize,
}

impl HeapFile {
    pub fn new(schema: Schema, page_size: usize) -> ExecResult<Self> {
        let layout = PageLayout::new(page_size, schema.entry_size())?;
        let metadata = Self::metadata_page(&schema, page_size)?;
        Ok(Self {
            schema,
            layout,
            pages: vec![Arc::new(metadata)],
            free_pages: BTreeSet::new(),
            num_records: 0,
        })
    }

    fn metadata_page(schema: &Schema, page_size: usize) -> ExecResult<Page> {
        let encoded = schema.to_metadata_bytes();
        if encoded.len() + 4 > page_size {
            return Err(ExecError::Schema(format!(
                "schema description needs {} bytes, page holds {}",
                encoded.len() + 4,
                page_size
            )));
        }
        let mut page = Page::new(0, page_size);
        page.write_bytes(0, &(encoded.len() as u32).to_be_bytes())?;
        page.write_bytes(4, &encoded)?;
        Ok(page)
    }

    /// Decode the schema stored on a metadata page
    pub fn read_schema(page: &Page) -> ExecResult<Schema> {
        let len_bytes = page.read_bytes(0, 4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(len_bytes);
        let len = u32::from_be_bytes(buf) as usize;
        Schema::from_metadata_bytes(page.read_bytes(4, len)?)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Number of pages including the metadata page
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn page(&self, page_no: usize) -> ExecResult<PageRef> {
        self.pages
            .get(page_no)
            .cloned()
            .ok_or_else(|| ExecError::Storage(format!("page {} does not exist", page_no)))
    }

    fn data_page_mut(&mut self, page_no: usize) -> ExecResult<&mut Page> {
        if page_no == 0 {
            return Err(ExecError::Storage("page 0 holds relation metadata".into()));
        }
        self.pages
            .get_mut(page_no)
            .map(Arc::make_mut)
            .ok_or_else(|| ExecError::Storage(format!("page {} does not exist", page_no)))
    }

    fn allocate_page(&mut self) -> usize {
        let page_no = self.pages.len();
        self.pages
            .push(Arc::new(Page::new(page_no, self.layout.page_size())));
        self.free_pages.insert(page_no);
        page_no
    }

    /// Insert a record into the first free slot, returning where it landed.
    pub fn append(&mut self, values: Vec<Value>) -> ExecResult<RecordId> {
        let record = self.schema.verify(values)?;
        let bytes = self.schema.encode(&record)?;

        let page_no = match self.free_pages.iter().next() {
            Some(page_no) => *page_no,
            None => self.allocate_page(),
        };

        let layout = self.layout;
        let page = self.data_page_mut(page_no)?;
        let slot = layout
            .first_free_slot(layout.header(page)?)
            .ok_or_else(|| ExecError::Storage(format!("page {} unexpectedly full", page_no)))?;
        page.write_bytes(layout.slot_offset(slot), &bytes)?;
        let mut header = layout.header(page)?.to_vec();
        layout.set_slot(&mut header, slot, true);
        page.write_bytes(0, &header)?;
        let full = layout.first_free_slot(&header).is_none();

        if full {
            self.free_pages.remove(&page_no);
        }
        self.num_records += 1;
        Ok(RecordId::new(page_no, slot))
    }

    fn check_valid(&self, rid: RecordId) -> ExecResult<PageRef> {
        if rid.page_no == 0 {
            return Err(ExecError::Storage(format!("invalid record id {}", rid)));
        }
        let page = self.page(rid.page_no)?;
        if !self.layout.is_slot_valid(self.layout.header(&page)?, rid.slot) {
            return Err(ExecError::Storage(format!("no record at {}", rid)));
        }
        Ok(page)
    }

    pub fn get(&self, rid: RecordId) -> ExecResult<Record> {
        let page = self.check_valid(rid)?;
        self.schema.decode(self.layout.slot_bytes(&page, rid.slot)?)
    }

    /// Clear a slot, returning the record that occupied it
    pub fn delete(&mut self, rid: RecordId) -> ExecResult<Record> {
        let old = self.get(rid)?;
        let layout = self.layout;
        let page = self.data_page_mut(rid.page_no)?;
        let mut header = layout.header(page)?.to_vec();
        layout.set_slot(&mut header, rid.slot, false);
        page.write_bytes(0, &header)?;

        self.free_pages.insert(rid.page_no);
        self.num_records -= 1;
        Ok(old)
    }

    /// Overwrite a record in place, returning the previous record
    pub fn update(&mut self, rid: RecordId, values: Vec<Value>) -> ExecResult<Record> {
        let record = self.schema.verify(values)?;
        let bytes = self.schema.encode(&record)?;
        let old = self.get(rid)?;
        let offset = self.layout.slot_offset(rid.slot);
        self.data_page_mut(rid.page_no)?.write_bytes(offset, &bytes)?;
        Ok(old)
    }

    /// All valid records in page then slot order
    pub fn records(&self) -> ExecResult<Vec<(RecordId, Record)>> {
        let mut out = Vec::with_capacity(self.num_records);
        for page in self.pages.iter().skip(1) {
            let header = self.layout.header(page)?;
            for slot in 0..self.layout.entries_per_page() {
                if self.layout.is_slot_valid(header, slot) {
                    let record = self.schema.decode(self.layout.slot_bytes(page, slot)?)?;
                    out.push((RecordId::new(page.page_no(), slot), record));
                }
            }
        }
        Ok(out)
    }
}
