//! Per-process page table management.
//!
//! This module provides the `PageDirectory` type, which owns the root of a software page table
//! and offers the operations the virtual memory layer needs from an MMU: install and clear a
//! mapping, query and clear the accessed and dirty bits, and perform a user-mode access.

use crate::{
    PhysicalAddress, VirtualAddress,
    layout::{PAGE_SIZE, PAGE_TABLE_LEVELS},
    mmu::{PageEntry, PageFlags, PageTable},
};

/// Why a user-mode access could not be translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessViolation {
    /// No present mapping for the page.
    NotPresent,
    /// The page is present but the access is not permitted (a write to a read-only page, or a
    /// supervisor page).
    Protection,
}

/// A page table manager for one address space.
///
/// This type owns the root page table and provides operations for mapping and unmapping
/// virtual addresses to physical addresses. It handles walking the page table hierarchy
/// and allocating intermediate tables as needed.
pub struct PageDirectory {
    /// The root page table for this address space.
    root: PageTable,
}

impl PageDirectory {
    /// Creates a new page directory with an empty root page table.
    pub fn new() -> Self {
        Self {
            root: PageTable::interior(),
        }
    }

    /// Maps a virtual address to a physical address with the given flags.
    ///
    /// The accessed and dirty bits start clear regardless of `flags`.
    ///
    /// # Panics
    /// Panics if either address is not page-aligned.
    pub fn map(&mut self, virt: VirtualAddress, phys: PhysicalAddress, flags: PageFlags) {
        assert!(
            virt.is_page_aligned(),
            "virtual address must be page-aligned"
        );
        assert!(
            phys.is_page_aligned(),
            "physical address must be page-aligned"
        );

        let entry = self.walk_or_create(virt);
        let mut new_flags = flags;
        new_flags.set_present(true);
        new_flags.set_accessed(false);
        new_flags.set_dirty(false);
        *entry = PageEntry::new(phys, new_flags);
    }

    /// Unmaps a virtual address.
    ///
    /// Returns the physical address that was mapped, or None if the address was not mapped.
    pub fn unmap(&mut self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.walk_mut(virt.page_round_down())?;
        let phys = entry.address()?;
        entry.clear();
        Some(phys)
    }

    /// Returns the physical address and flags mapped at `virt`, without touching any bits.
    pub fn translate(&self, virt: VirtualAddress) -> Option<(PhysicalAddress, PageFlags)> {
        let entry = self.walk(virt)?;
        let phys = entry.address()?;
        Some((phys + virt.page_offset(), entry.flags()))
    }

    /// Returns whether `virt` has a present mapping.
    pub fn is_mapped(&self, virt: VirtualAddress) -> bool {
        self.walk(virt).is_some_and(|entry| entry.is_present())
    }

    /// Returns the accessed bit for the page containing `virt`. Unmapped pages report false.
    pub fn is_accessed(&self, virt: VirtualAddress) -> bool {
        self.present_flags(virt).is_some_and(PageFlags::is_accessed)
    }

    /// Sets or clears the accessed bit. Does nothing for unmapped pages.
    pub fn set_accessed(&mut self, virt: VirtualAddress, accessed: bool) {
        self.update_present(virt, |flags| flags.set_accessed(accessed));
    }

    /// Returns the dirty bit for the page containing `virt`. Unmapped pages report false.
    pub fn is_dirty(&self, virt: VirtualAddress) -> bool {
        self.present_flags(virt).is_some_and(PageFlags::is_dirty)
    }

    /// Sets or clears the dirty bit. Does nothing for unmapped pages.
    pub fn set_dirty(&mut self, virt: VirtualAddress, dirty: bool) {
        self.update_present(virt, |flags| flags.set_dirty(dirty));
    }

    /// Performs a user-mode access of `virt` the way the hardware would.
    ///
    /// On success the accessed bit is set, and the dirty bit as well for writes, and the
    /// translated physical address is returned.
    pub fn access_user(
        &mut self,
        virt: VirtualAddress,
        write: bool,
    ) -> Result<PhysicalAddress, AccessViolation> {
        let entry = self
            .walk_mut(virt)
            .filter(|entry| entry.is_present())
            .ok_or(AccessViolation::NotPresent)?;
        let flags = entry.flags();
        if !flags.is_user() || (write && !flags.is_writable()) {
            return Err(AccessViolation::Protection);
        }
        entry.update_flags(|flags| {
            flags.set_accessed(true);
            if write {
                flags.set_dirty(true);
            }
        });
        entry
            .address()
            .map(|phys| phys + virt.page_offset())
            .ok_or(AccessViolation::NotPresent)
    }

    /// Returns the number of present last-level mappings.
    pub fn mapped_pages(&self) -> usize {
        fn count(table: &PageTable) -> usize {
            if table.is_leaf() {
                return table.present_count();
            }
            (0..table.len())
                .filter_map(|index| table.child(index))
                .map(count)
                .sum()
        }
        count(&self.root)
    }

    fn present_flags(&self, virt: VirtualAddress) -> Option<PageFlags> {
        self.walk(virt)
            .filter(|entry| entry.is_present())
            .map(PageEntry::flags)
    }

    fn update_present(&mut self, virt: VirtualAddress, update: impl FnOnce(&mut PageFlags)) {
        if let Some(entry) = self.walk_mut(virt).filter(|entry| entry.is_present()) {
            entry.update_flags(update);
        }
    }

    /// Walks the page table hierarchy to find the entry for a virtual address.
    ///
    /// Returns None if any intermediate table is not present.
    fn walk(&self, virt: VirtualAddress) -> Option<PageEntry> {
        let mut table = &self.root;
        for level in (1..PAGE_TABLE_LEVELS).rev() {
            table = table.child(virt.page_index(level))?;
        }
        Some(table.entry(virt.page_index(0)))
    }

    fn walk_mut(&mut self, virt: VirtualAddress) -> Option<&mut PageEntry> {
        let mut table = &mut self.root;
        for level in (1..PAGE_TABLE_LEVELS).rev() {
            table = table.child_mut(virt.page_index(level))?;
        }
        Some(table.entry_mut(virt.page_index(0)))
    }

    /// Walks the page table hierarchy, creating intermediate tables as needed.
    ///
    /// Returns a mutable reference to the final page table entry for the given
    /// virtual address.
    fn walk_or_create(&mut self, virt: VirtualAddress) -> &mut PageEntry {
        let mut table = &mut self.root;
        for level in (1..PAGE_TABLE_LEVELS).rev() {
            let make: fn() -> PageTable = if level == 1 {
                PageTable::leaf
            } else {
                PageTable::interior
            };
            table = table.child_or_insert_with(virt.page_index(level), make);
        }
        table.entry_mut(virt.page_index(0))
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageDirectory")
            .field("mapped_pages", &self.mapped_pages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIRT: VirtualAddress = VirtualAddress::new(0x4000_0000);
    const PHYS: PhysicalAddress = PhysicalAddress::new(5 * PAGE_SIZE);

    #[test]
    fn map_then_translate() {
        let mut dir = PageDirectory::new();
        dir.map(VIRT, PHYS, PageFlags::user(true));

        let (phys, flags) = dir.translate(VIRT + 0x10).unwrap();
        assert_eq!(phys, PHYS + 0x10);
        assert!(flags.is_writable());
        assert_eq!(dir.mapped_pages(), 1);
    }

    #[test]
    fn unmap_mapped_page() {
        let mut dir = PageDirectory::new();
        dir.map(VIRT, PHYS, PageFlags::user(false));

        assert_eq!(dir.unmap(VIRT), Some(PHYS));
        assert!(!dir.is_mapped(VIRT));
        assert_eq!(dir.mapped_pages(), 0);
    }

    #[test]
    fn unmap_unmapped_page() {
        let mut dir = PageDirectory::new();
        assert_eq!(dir.unmap(VIRT), None);
    }

    #[test]
    fn map_multiple_pages() {
        let mut dir = PageDirectory::new();
        for i in 0..10 {
            dir.map(
                VIRT + i * PAGE_SIZE,
                PhysicalAddress::new(i * PAGE_SIZE),
                PageFlags::user(true),
            );
        }
        assert_eq!(dir.mapped_pages(), 10);
        assert_eq!(
            dir.translate(VIRT + 9 * PAGE_SIZE).map(|(p, _)| p),
            Some(PhysicalAddress::new(9 * PAGE_SIZE))
        );
    }

    #[test]
    fn reads_set_accessed_writes_set_dirty() {
        let mut dir = PageDirectory::new();
        dir.map(VIRT, PHYS, PageFlags::user(true));
        assert!(!dir.is_accessed(VIRT));

        dir.access_user(VIRT + 4, false).unwrap();
        assert!(dir.is_accessed(VIRT));
        assert!(!dir.is_dirty(VIRT));

        dir.access_user(VIRT + 8, true).unwrap();
        assert!(dir.is_dirty(VIRT));

        dir.set_accessed(VIRT, false);
        dir.set_dirty(VIRT, false);
        assert!(!dir.is_accessed(VIRT));
        assert!(!dir.is_dirty(VIRT));
    }

    #[test]
    fn access_violations() {
        let mut dir = PageDirectory::new();
        dir.map(VIRT, PHYS, PageFlags::user(false));

        assert_eq!(
            dir.access_user(VIRT, true),
            Err(AccessViolation::Protection)
        );
        assert!(!dir.is_dirty(VIRT));
        assert_eq!(
            dir.access_user(VIRT + PAGE_SIZE, false),
            Err(AccessViolation::NotPresent)
        );
    }

    #[test]
    fn remap_clears_bits() {
        let mut dir = PageDirectory::new();
        dir.map(VIRT, PHYS, PageFlags::user(true));
        dir.access_user(VIRT, true).unwrap();
        dir.map(VIRT, PHYS, PageFlags::user(true));
        assert!(!dir.is_accessed(VIRT));
        assert!(!dir.is_dirty(VIRT));
    }
}
