//! Page table node.

use alloc::{boxed::Box, vec::Vec};

use super::entry::PageEntry;

/// Number of entries in a page table (9-bit indexes).
pub const ENTRY_COUNT: usize = 512;

/// One node of the four-level page table.
///
/// Interior nodes own their children directly. The entry that points at a child only carries
/// the present bit; the child itself lives in `children` at the same index, so there are no
/// physical addresses to chase and no unsafe code in the walk.
pub struct PageTable {
    /// The entries in this page table.
    entries: Box<[PageEntry; ENTRY_COUNT]>,
    /// Child tables, indexed like `entries`. Empty for last-level tables.
    children: Vec<Option<Box<PageTable>>>,
}

impl PageTable {
    /// Creates an empty last-level table.
    pub fn leaf() -> Self {
        Self {
            entries: Box::new([PageEntry::default(); ENTRY_COUNT]),
            children: Vec::new(),
        }
    }

    /// Creates an empty interior table.
    pub fn interior() -> Self {
        let mut children = Vec::with_capacity(ENTRY_COUNT);
        children.resize_with(ENTRY_COUNT, || None);
        Self {
            entries: Box::new([PageEntry::default(); ENTRY_COUNT]),
            children,
        }
    }

    /// Returns whether this is a last-level table.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns a copy of the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 512.
    pub fn entry(&self, index: usize) -> PageEntry {
        assert!(index < ENTRY_COUNT, "page table index out of bounds");
        self.entries[index]
    }

    /// Returns a mutable reference to the entry at the given index.
    ///
    /// # Panics
    /// Panics if index >= 512.
    pub fn entry_mut(&mut self, index: usize) -> &mut PageEntry {
        assert!(index < ENTRY_COUNT, "page table index out of bounds");
        &mut self.entries[index]
    }

    /// Returns the child table at `index`, if one exists.
    pub fn child(&self, index: usize) -> Option<&PageTable> {
        self.children.get(index)?.as_deref()
    }

    /// Returns the child table at `index` mutably, if one exists.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut PageTable> {
        self.children.get_mut(index)?.as_deref_mut()
    }

    /// Returns the child table at `index`, creating it with `make` if absent.
    ///
    /// # Panics
    /// Panics if this is a last-level table.
    pub fn child_or_insert_with(
        &mut self,
        index: usize,
        make: impl FnOnce() -> PageTable,
    ) -> &mut PageTable {
        assert!(!self.is_leaf(), "last-level tables have no children");
        if self.children[index].is_none() {
            self.entries[index].update_flags(|flags| flags.set_present(true));
        }
        self.children[index].get_or_insert_with(|| Box::new(make()))
    }

    /// Returns the number of present entries.
    pub fn present_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_present()).count()
    }

    /// Returns the number of entries in this page table.
    pub const fn len(&self) -> usize {
        ENTRY_COUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_creates_children_on_demand() {
        let mut table = PageTable::interior();
        assert!(table.child(3).is_none());
        table.child_or_insert_with(3, PageTable::leaf);
        assert!(table.entry(3).is_present());
        assert!(table.child(3).is_some_and(PageTable::is_leaf));
        assert_eq!(table.present_count(), 1);
    }

    #[test]
    #[should_panic(expected = "last-level tables have no children")]
    fn leaf_has_no_children() {
        PageTable::leaf().child_or_insert_with(0, PageTable::leaf);
    }
}
