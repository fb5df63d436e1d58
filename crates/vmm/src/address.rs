//! Address types for physical and virtual memory.
//!
//! Both are thin newtypes over `usize`. Virtual addresses know which half of the address
//! space they live in (see [`crate::layout`]) and how to round to page boundaries, which is
//! what the fault path mostly needs: faults arrive byte-granular, residency is per page.

use core::fmt;
use core::ops::{Add, Sub};

use crate::layout::{self, KERNEL_BASE, PAGE_SIZE};
use crate::{FrameNumber, PageNumber};

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Returns true if this is address zero.
            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Returns true if the address sits on a page boundary.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(PAGE_SIZE)
            }

            /// Rounds the address down to the start of its page.
            #[inline]
            pub const fn page_round_down(self) -> Self {
                Self(self.0 & !(PAGE_SIZE - 1))
            }

            /// Returns the byte offset of this address within its page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (PAGE_SIZE - 1)
            }

            /// Adds `rhs` bytes, returning `None` on overflow or if the result is invalid.
            #[inline]
            pub fn checked_add(self, rhs: usize) -> Option<Self> {
                self.0.checked_add(rhs).and_then(Self::try_new)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Physical addresses name bytes of the user frame pool; frame `n` starts at\n\
     `n * PAGE_SIZE`."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            layout::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    /// Creates a physical address if it fits in the physical address width.
    #[inline]
    pub const fn try_new(addr: usize) -> Option<Self> {
        if layout::validate_physical(addr) {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Returns the frame containing this address.
    #[inline]
    pub const fn frame_number(self) -> FrameNumber {
        FrameNumber::new(self.0 / PAGE_SIZE)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     Virtual addresses are canonical 48-bit addresses. Everything below\n\
     [`KERNEL_BASE`] is user space."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address is not canonical.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(layout::validate_virtual(addr), "address is not canonical");
        Self(addr)
    }

    /// Creates a virtual address if it is canonical.
    #[inline]
    pub const fn try_new(addr: usize) -> Option<Self> {
        if layout::validate_virtual(addr) {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// Returns true if this address belongs to the kernel half.
    ///
    /// Non-canonical upper-half values never reach here; everything at or above
    /// [`KERNEL_BASE`] counts as kernel, including the sign-extended upper half.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= KERNEL_BASE
    }

    /// Returns true if this address is a user address.
    #[inline]
    pub const fn is_user(self) -> bool {
        !self.is_kernel()
    }

    /// Returns the page table index at the specified level.
    #[inline]
    pub const fn page_index(self, level: usize) -> usize {
        layout::page_index(self.0, level)
    }

    /// Returns the page containing this address.
    #[inline]
    pub const fn page_number(self) -> PageNumber {
        PageNumber::new(self.0 / PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod physical_address {
        use super::*;

        #[test]
        fn new_valid_address() {
            let addr = PhysicalAddress::new(0x3000);
            assert_eq!(addr.as_usize(), 0x3000);
        }

        #[test]
        #[should_panic(expected = "physical address exceeds maximum width")]
        fn new_exceeds_max() {
            PhysicalAddress::new(1usize << layout::MAX_PHYSICAL_BITS);
        }

        #[test]
        fn frame_number_rounds_down() {
            let addr = PhysicalAddress::new(3 * PAGE_SIZE + 17);
            assert_eq!(addr.frame_number(), FrameNumber::new(3));
        }

        #[test]
        fn display_format() {
            assert_eq!(format!("{}", PhysicalAddress::new(0x2000)), "0x2000");
            assert_eq!(
                format!("{:?}", PhysicalAddress::new(0x2000)),
                "PhysicalAddress(0x2000)"
            );
        }
    }

    mod virtual_address {
        use super::*;

        #[test]
        #[should_panic(expected = "address is not canonical")]
        fn new_non_canonical() {
            VirtualAddress::new(0x0000_8000_0000_0000);
        }

        #[test]
        fn try_new_rejects_non_canonical() {
            assert!(VirtualAddress::try_new(0x0000_8000_0000_0000).is_none());
            assert!(VirtualAddress::try_new(0x1000).is_some());
        }

        #[test]
        fn page_rounding() {
            let addr = VirtualAddress::new(0x1234_5678);
            assert_eq!(addr.page_round_down(), VirtualAddress::new(0x1234_5000));
            assert_eq!(addr.page_offset(), 0x678);
            assert!(!addr.is_page_aligned());
            assert!(addr.page_round_down().is_page_aligned());
        }

        #[test]
        fn user_and_kernel_halves() {
            assert!(VirtualAddress::new(0x40_0000).is_user());
            assert!(VirtualAddress::new(KERNEL_BASE - 1).is_user());
            assert!(VirtualAddress::new(KERNEL_BASE).is_kernel());
            assert!(VirtualAddress::new(0xFFFF_8000_0000_0000).is_kernel());
        }

        #[test]
        fn checked_add_stops_at_non_canonical() {
            let top = VirtualAddress::new(0x0000_7FFF_FFFF_F000);
            assert!(top.checked_add(PAGE_SIZE).is_none());
            assert_eq!(
                top.checked_add(0x10),
                Some(VirtualAddress::new(0x0000_7FFF_FFFF_F010))
            );
        }

        #[test]
        fn page_number_round_trip() {
            let addr = VirtualAddress::new(0x4747_F123);
            assert_eq!(addr.page_number().start(), addr.page_round_down());
        }
    }
}
