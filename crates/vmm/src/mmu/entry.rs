//! Page table entry.

use crate::PhysicalAddress;

use super::flags::PageFlags;

/// A single page table entry in the x86_64 format.
///
/// Bits 12-51 hold the physical address, the rest are flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(usize);

impl PageEntry {
    /// Physical address mask (bits 12-51).
    const ADDRESS_MASK: usize = 0x000F_FFFF_FFFF_F000;

    /// Flag bits mask (bits 0-11 and 52-63).
    const FLAGS_MASK: usize = !Self::ADDRESS_MASK;

    /// Creates a new page table entry.
    ///
    /// The physical address must be page-aligned.
    pub fn new(address: PhysicalAddress, flags: PageFlags) -> Self {
        debug_assert!(
            address.is_page_aligned(),
            "physical address must be page-aligned"
        );

        let addr_bits = address.as_usize() & Self::ADDRESS_MASK;
        let flag_bits = flags.as_usize() & Self::FLAGS_MASK;
        Self(addr_bits | flag_bits)
    }

    /// Returns the physical address stored in this entry, or None if it is not present.
    pub fn address(self) -> Option<PhysicalAddress> {
        if self.is_present() {
            Some(PhysicalAddress::new(self.0 & Self::ADDRESS_MASK))
        } else {
            None
        }
    }

    /// Returns the flags for this entry.
    pub fn flags(self) -> PageFlags {
        PageFlags::from(self.0 & Self::FLAGS_MASK)
    }

    /// Sets the flags for this entry, preserving the address.
    pub fn set_flags(&mut self, flags: PageFlags) {
        let addr_bits = self.0 & Self::ADDRESS_MASK;
        let flag_bits = flags.as_usize() & Self::FLAGS_MASK;
        self.0 = addr_bits | flag_bits;
    }

    /// Applies `update` to this entry's flags in place.
    pub fn update_flags(&mut self, update: impl FnOnce(&mut PageFlags)) {
        let mut flags = self.flags();
        update(&mut flags);
        self.set_flags(flags);
    }

    /// Returns whether this entry is present (valid).
    pub fn is_present(self) -> bool {
        self.flags().is_present()
    }

    /// Clears this entry (sets it to zero).
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns the raw usize value of this entry.
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PAGE_SIZE;

    #[test]
    fn stores_address_and_flags() {
        let entry = PageEntry::new(PhysicalAddress::new(7 * PAGE_SIZE), PageFlags::user(true));
        assert_eq!(entry.address(), Some(PhysicalAddress::new(7 * PAGE_SIZE)));
        assert!(entry.flags().is_writable());
    }

    #[test]
    fn absent_entry_has_no_address() {
        let entry = PageEntry::new(PhysicalAddress::new(PAGE_SIZE), PageFlags::empty());
        assert_eq!(entry.address(), None);
        assert_eq!(PageEntry::default().address(), None);
    }

    #[test]
    fn update_flags_keeps_address() {
        let mut entry =
            PageEntry::new(PhysicalAddress::new(3 * PAGE_SIZE), PageFlags::user(false));
        entry.update_flags(|flags| flags.set_dirty(true));
        assert!(entry.flags().is_dirty());
        assert_eq!(entry.address(), Some(PhysicalAddress::new(3 * PAGE_SIZE)));
    }
}
