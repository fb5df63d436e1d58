//! Virtual address space layout and fixed sizes.
//!
//! The layout is a 48-bit x86_64-style address space: user memory occupies the low part of the
//! canonical lower half and everything from [`KERNEL_BASE`] upward belongs to the kernel.

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// Number of page offset bits.
pub const PAGE_SHIFT: usize = 12;

/// Number of page table levels (PML4, PDPT, PD, PT).
pub const PAGE_TABLE_LEVELS: usize = 4;

/// Number of index bits consumed by each page table level.
pub const INDEX_BITS: usize = 9;

/// Maximum number of bits in a physical address.
pub const MAX_PHYSICAL_BITS: usize = 52;

/// Number of significant bits in a virtual address (bits above are sign-extension).
pub const MAX_VIRTUAL_BITS: usize = 48;

/// First kernel virtual address. Every address at or above this belongs to the kernel.
pub const KERNEL_BASE: usize = 0x80_0400_0000;

/// Top of the user stack. The stack grows down from here.
pub const USER_STACK: usize = 0x4748_0000;

/// Largest the user stack may grow to (1 MiB).
pub const MAX_STACK_SIZE: usize = 1 << 20;

/// Lowest address the user stack may grow down to.
pub const STACK_LIMIT: usize = USER_STACK - MAX_STACK_SIZE;

/// How far below the stack pointer a fault may land and still count as a stack access.
///
/// A `push` faults 8 bytes below the stack pointer before the pointer is decremented.
pub const STACK_SLACK: usize = 8;

/// Size of one block device sector in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Number of sectors that hold one page.
pub const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

/// Returns the page table index for a virtual address at the given level.
///
/// Level 0 is the last level (the page table proper); level 3 is the root.
#[inline]
pub const fn page_index(address: usize, level: usize) -> usize {
    assert!(level < PAGE_TABLE_LEVELS, "page table level out of range");
    (address >> (PAGE_SHIFT + level * INDEX_BITS)) & ((1 << INDEX_BITS) - 1)
}

/// Returns true if `addr` fits in the physical address width.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr < (1 << MAX_PHYSICAL_BITS)
}

/// Returns true if `addr` is canonical (bits 48-63 sign-extend bit 47).
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    canonicalize_virtual(addr) == addr
}

/// Sign-extends bit 47 into bits 48-63.
#[inline]
pub const fn canonicalize_virtual(addr: usize) -> usize {
    let shift = usize::BITS as usize - MAX_VIRTUAL_BITS;
    (((addr << shift) as isize) >> shift) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_whole_sectors() {
        assert_eq!(SECTORS_PER_PAGE * SECTOR_SIZE, PAGE_SIZE);
        assert_eq!(1 << PAGE_SHIFT, PAGE_SIZE);
    }

    #[test]
    fn stack_fits_below_kernel() {
        assert!(STACK_LIMIT < USER_STACK);
        assert!(USER_STACK < KERNEL_BASE);
        assert_eq!(USER_STACK % PAGE_SIZE, 0);
    }

    #[test]
    fn indexes_each_level() {
        let addr = (3 << 39) | (5 << 30) | (7 << 21) | (9 << 12) | 0x123;
        assert_eq!(page_index(addr, 3), 3);
        assert_eq!(page_index(addr, 2), 5);
        assert_eq!(page_index(addr, 1), 7);
        assert_eq!(page_index(addr, 0), 9);
    }

    #[test]
    fn canonical_addresses() {
        assert!(validate_virtual(0));
        assert!(validate_virtual(KERNEL_BASE));
        assert!(validate_virtual(0xFFFF_8000_0000_0000));
        assert!(!validate_virtual(0x0000_8000_0000_0000));
        assert_eq!(canonicalize_virtual(0x0000_8000_0000_0000), 0xFFFF_8000_0000_0000);
    }
}
