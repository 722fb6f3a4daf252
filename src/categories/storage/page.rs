//! Fixed-size pages and the slotted layout shared by every relation
//!
//! A data page starts with a header bitmap holding one validity bit per slot,
//! followed by the slots themselves. Slot `i` is valid when bit `7 - (i % 8)`
//! of header byte `i / 8` is set, and its record bytes start at
//! `header_size + entry_size * i`.

use std::sync::Arc;

use super::{RelationAccess, RelationHandle};
use crate::core::metrics::{names, MetricsCollector};
use crate::core::operator::{ExecError, ExecResult};
use crate::core::record::{Record, Schema};

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Shared, immutable view of a page. Writers copy on write, so a reader
/// holding a `PageRef` keeps seeing the page as it was when fetched.
pub type PageRef = Arc<Page>;

/// A fixed-size block of bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    page_no: usize,
    data: Vec<u8>,
}

impl Page {
    /// Zero-filled page
    pub fn new(page_no: usize, size: usize) -> Self {
        Self {
            page_no,
            data: vec![0; size],
        }
    }

    pub fn page_no(&self) -> usize {
        self.page_no
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> ExecResult<&[u8]> {
        self.data.get(offset..offset + len).ok_or_else(|| {
            ExecError::Storage(format!(
                "read of {} bytes at offset {} past end of page {}",
                len, offset, self.page_no
            ))
        })
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> ExecResult<()> {
        let page_no = self.page_no;
        let target = self.data.get_mut(offset..offset + bytes.len()).ok_or_else(|| {
            ExecError::Storage(format!(
                "write of {} bytes at offset {} past end of page {}",
                bytes.len(),
                offset,
                page_no
            ))
        })?;
        target.copy_from_slice(bytes);
        Ok(())
    }
}

/// Slot geometry of a data page for a given record width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    page_size: usize,
    entry_size: usize,
    entries_per_page: usize,
    header_size: usize,
}

impl PageLayout {
    /// Largest multiple of 8 slots whose records plus one header bit each
    /// fit in the page.
    pub fn new(page_size: usize, entry_size: usize) -> ExecResult<Self> {
        if entry_size == 0 {
            return Err(ExecError::Schema("records must have at least one byte".into()));
        }
        let possible = (page_size * 8) / (entry_size * 8 + 1);
        let entries_per_page = possible - possible % 8;
        if entries_per_page == 0 {
            return Err(ExecError::Schema(format!(
                "record of {} bytes does not fit eight to a {} byte page",
                entry_size, page_size
            )));
        }
        Ok(Self {
            page_size,
            entry_size,
            entries_per_page,
            header_size: entries_per_page / 8,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn entries_per_page(&self) -> usize {
        self.entries_per_page
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn slot_offset(&self, slot: usize) -> usize {
        self.header_size + self.entry_size * slot
    }

    /// Header bitmap of a data page
    pub fn header<'a>(&self, page: &'a Page) -> ExecResult<&'a [u8]> {
        page.read_bytes(0, self.header_size)
    }

    pub fn is_slot_valid(&self, header: &[u8], slot: usize) -> bool {
        slot < self.entries_per_page
            && header
                .get(slot / 8)
                .map_or(false, |byte| byte & (1 << (7 - slot % 8)) != 0)
    }

    pub fn set_slot(&self, header: &mut [u8], slot: usize, valid: bool) {
        if let Some(byte) = header.get_mut(slot / 8) {
            let mask = 1u8 << (7 - slot % 8);
            if valid {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    pub fn first_free_slot(&self, header: &[u8]) -> Option<usize> {
        (0..self.entries_per_page).find(|slot| !self.is_slot_valid(header, *slot))
    }

    pub fn valid_count(&self, header: &[u8]) -> usize {
        (0..self.entries_per_page)
            .filter(|slot| self.is_slot_valid(header, *slot))
            .count()
    }

    /// Raw record bytes of a slot, whether or not it is valid
    pub fn slot_bytes<'a>(&self, page: &'a Page, slot: usize) -> ExecResult<&'a [u8]> {
        page.read_bytes(self.slot_offset(slot), self.entry_size)
    }

    /// Decode the record in a slot, `None` if the slot is empty
    pub fn read_record(&self, schema: &Schema, page: &Page, slot: usize) -> ExecResult<Option<Record>> {
        if !self.is_slot_valid(self.header(page)?, slot) {
            return Ok(None);
        }
        schema.decode(self.slot_bytes(page, slot)?).map(Some)
    }
}

/// Lazy iterator over the pages of a relation
///
/// Starts at page 0, the reserved metadata page; scans over data use
/// [`PageIterator::data_pages`] instead. Each `next` fetches exactly one page.
pub struct PageIterator {
    access: Arc<dyn RelationAccess>,
    relation: RelationHandle,
    next_page_no: usize,
    metrics: Option<MetricsCollector>,
}

impl PageIterator {
    pub fn new(access: Arc<dyn RelationAccess>, relation: RelationHandle) -> Self {
        Self {
            access,
            relation,
            next_page_no: 0,
            metrics: None,
        }
    }

    /// Iterator positioned at the first data page
    pub fn data_pages(access: Arc<dyn RelationAccess>, relation: RelationHandle) -> Self {
        let mut pages = Self::new(access, relation);
        pages.next_page_no = 1;
        pages
    }

    /// Count every fetched page under `pages_read`
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Position so the next page returned is `page_no`
    pub fn seek(&mut self, page_no: usize) {
        self.next_page_no = page_no;
    }

    pub fn relation(&self) -> &RelationHandle {
        &self.relation
    }
}

impl Iterator for PageIterator {
    type Item = ExecResult<PageRef>;

    fn next(&mut self) -> Option<Self::Item> {
        let count = match self.access.page_count(&self.relation) {
            Ok(count) => count,
            Err(e) => return Some(Err(e)),
        };
        if self.next_page_no >= count {
            return None;
        }
        let page = self.access.fetch_page(&self.relation, self.next_page_no);
        self.next_page_no += 1;
        if let (Some(metrics), Ok(_)) = (&self.metrics, &page) {
            metrics.increment(names::PAGES_READ);
        }
        Some(page)
    }
}

/// Saved position of a [`RecordCursor`]: the page holding the marked record
/// stays resident so restoring never refetches it.
#[derive(Debug, Clone)]
pub struct SlotMark {
    page: PageRef,
    slot: usize,
}

impl SlotMark {
    pub fn page_no(&self) -> usize {
        self.page.page_no()
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Streams the valid records of a relation's data pages in page then slot
/// order, holding one page at a time.
pub struct RecordCursor {
    pages: PageIterator,
    layout: PageLayout,
    schema: Schema,
    page: Option<PageRef>,
    next_slot: usize,
    done: bool,
}

impl RecordCursor {
    pub fn new(pages: PageIterator, layout: PageLayout, schema: Schema) -> Self {
        Self {
            pages,
            layout,
            schema,
            page: None,
            next_slot: 0,
            done: false,
        }
    }

    /// Mark of the record most recently returned, if the cursor still sits
    /// on its page.
    pub fn mark(&self) -> Option<SlotMark> {
        let page = self.page.as_ref()?;
        let slot = self.next_slot.checked_sub(1)?;
        Some(SlotMark {
            page: page.clone(),
            slot,
        })
    }

    /// Reposition so the next record returned is the marked one
    pub fn restore(&mut self, mark: &SlotMark) {
        self.pages.seek(mark.page.page_no() + 1);
        self.page = Some(mark.page.clone());
        self.next_slot = mark.slot;
        self.done = false;
    }

    fn fail(&mut self, e: ExecError) -> Option<ExecResult<Record>> {
        self.done = true;
        self.page = None;
        Some(Err(e))
    }
}

impl Iterator for RecordCursor {
    type Item = ExecResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(page) = &self.page {
                while self.next_slot < self.layout.entries_per_page() {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    match self.layout.read_record(&self.schema, page, slot) {
                        Ok(Some(record)) => return Some(Ok(record)),
                        Ok(None) => continue,
                        Err(e) => return self.fail(e),
                    }
                }
            }
            match self.pages.next() {
                Some(Ok(page)) => {
                    self.page = Some(page);
                    self.next_slot = 0;
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}
