//! Page table entry flags.

use x86_64::structures::paging::PageTableFlags;

/// Page table entry flags.
///
/// Wraps the x86_64 crate's flag set so entries keep the hardware bit layout. Only the bits the
/// virtual memory layer looks at get named accessors; the MMU sets `ACCESSED` on every
/// translation and `DIRTY` on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(PageTableFlags);

impl From<usize> for PageFlags {
    fn from(value: usize) -> Self {
        Self(PageTableFlags::from_bits_truncate(value as u64))
    }
}

impl PageFlags {
    /// Creates empty page flags (page not present).
    pub const fn empty() -> Self {
        Self(PageTableFlags::empty())
    }

    /// Flags for a present user page, writable or not.
    pub fn user(writable: bool) -> Self {
        let mut flags = Self::empty();
        flags.set_present(true);
        flags.set_user(true);
        flags.set_writable(writable);
        flags
    }

    /// Returns the raw usize value of these flags.
    pub const fn as_usize(self) -> usize {
        self.0.bits() as usize
    }

    /// Returns whether the present bit is set.
    pub fn is_present(self) -> bool {
        self.0.contains(PageTableFlags::PRESENT)
    }

    /// Sets or clears the present bit.
    pub fn set_present(&mut self, present: bool) {
        self.0.set(PageTableFlags::PRESENT, present);
    }

    /// Returns whether the writable bit is set.
    pub fn is_writable(self) -> bool {
        self.0.contains(PageTableFlags::WRITABLE)
    }

    /// Sets or clears the writable bit.
    pub fn set_writable(&mut self, writable: bool) {
        self.0.set(PageTableFlags::WRITABLE, writable);
    }

    /// Returns whether the user-accessible bit is set.
    pub fn is_user(self) -> bool {
        self.0.contains(PageTableFlags::USER_ACCESSIBLE)
    }

    /// Sets or clears the user-accessible bit.
    pub fn set_user(&mut self, user: bool) {
        self.0.set(PageTableFlags::USER_ACCESSIBLE, user);
    }

    /// Returns whether the accessed bit is set.
    pub fn is_accessed(self) -> bool {
        self.0.contains(PageTableFlags::ACCESSED)
    }

    /// Sets or clears the accessed bit.
    pub fn set_accessed(&mut self, accessed: bool) {
        self.0.set(PageTableFlags::ACCESSED, accessed);
    }

    /// Returns whether the dirty bit is set.
    pub fn is_dirty(self) -> bool {
        self.0.contains(PageTableFlags::DIRTY)
    }

    /// Sets or clears the dirty bit.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.0.set(PageTableFlags::DIRTY, dirty);
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_flags() {
        let flags = PageFlags::user(false);
        assert!(flags.is_present());
        assert!(flags.is_user());
        assert!(!flags.is_writable());
        assert!(!flags.is_accessed());
        assert!(!flags.is_dirty());
        assert!(PageFlags::user(true).is_writable());
    }

    #[test]
    fn hardware_bit_positions() {
        let mut flags = PageFlags::empty();
        flags.set_accessed(true);
        flags.set_dirty(true);
        assert_eq!(flags.as_usize(), (1 << 5) | (1 << 6));
        flags.set_dirty(false);
        assert_eq!(flags.as_usize(), 1 << 5);
    }
}
