//! Supplemental page table.
//!
//! Per-process map from page to descriptor. The hardware page directory only knows about
//! resident pages; this table knows about every page the process may touch, including ones that
//! are swapped out, not yet loaded, or backed by a file.

use alloc::{
    collections::{BTreeMap, btree_map::Entry},
    sync::Arc,
};

use crate::{PageNumber, VirtualAddress, error::VmError, frame_table::FrameTable, page::Page};

/// The pages of one address space, keyed by page number.
///
/// Holds the only strong reference to each descriptor.
#[derive(Debug, Default)]
pub struct SupplementalPageTable {
    pages: BTreeMap<PageNumber, Arc<Page>>,
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor. Fails, leaving the existing entry alone, if its page is taken.
    pub fn insert(&mut self, page: Arc<Page>) -> Result<(), VmError> {
        match self.pages.entry(page.va().page_number()) {
            Entry::Occupied(_) => Err(VmError::AlreadyMapped),
            Entry::Vacant(slot) => {
                slot.insert(page);
                Ok(())
            }
        }
    }

    /// Finds the descriptor for the page containing `va`.
    pub fn find(&self, va: VirtualAddress) -> Option<&Arc<Page>> {
        self.pages.get(&va.page_number())
    }

    /// Removes the descriptor for the page containing `va` and destroys it, writing back dirty
    /// file contents and freeing its frame and swap slot. Returns false if there was none.
    pub fn remove(&mut self, va: VirtualAddress, frames: &FrameTable) -> bool {
        match self.pages.remove(&va.page_number()) {
            Some(page) => {
                frames.release(&page);
                true
            }
            None => false,
        }
    }

    /// Returns true if none of the `count` pages starting at `start` has a descriptor.
    pub fn is_range_free(&self, start: PageNumber, count: usize) -> bool {
        self.pages.range(start..start + count).next().is_none()
    }

    /// Iterates over every descriptor once, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (VirtualAddress, &Arc<Page>)> {
        self.pages.iter().map(|(number, page)| (number.start(), page))
    }

    /// Destroys every descriptor.
    pub fn clear(&mut self, frames: &FrameTable) {
        while let Some((_, page)) = self.pages.pop_first() {
            frames.release(&page);
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
