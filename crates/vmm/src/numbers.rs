//! Page and frame number types.
//!
//! Frame numbers index the user pool; page numbers key the supplemental page table. Both
//! implement [`Step`] so a run of pages can be walked with an ordinary range.

use crate::address::{PhysicalAddress, VirtualAddress};
use crate::layout::PAGE_SIZE;
use core::{
    fmt,
    iter::Step,
    ops::{Add, Sub},
};

/// Macro to define common page/frame number functionality.
macro_rules! impl_page_number_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new page/frame number.
            #[inline]
            pub const fn new(number: usize) -> Self {
                Self(number)
            }

            /// Returns the raw page/frame number.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }

        impl Step for $name {
            fn steps_between(start: &Self, end: &Self) -> (usize, Option<usize>) {
                if start <= end {
                    let diff = end.0 - start.0;
                    (diff, Some(diff))
                } else {
                    (0, None)
                }
            }

            fn forward_checked(start: Self, count: usize) -> Option<Self> {
                start.0.checked_add(count).map(Self)
            }

            fn backward_checked(start: Self, count: usize) -> Option<Self> {
                start.0.checked_sub(count).map(Self)
            }
        }
    };
}

impl_page_number_common!(
    FrameNumber,
    "Index of a frame in the user pool.\n\n\
     Frame `n` covers physical addresses `n * PAGE_SIZE .. (n + 1) * PAGE_SIZE`."
);

impl FrameNumber {
    /// Returns the physical address at the start of this frame.
    #[inline]
    pub const fn start(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 * PAGE_SIZE)
    }
}

impl From<PhysicalAddress> for FrameNumber {
    #[inline]
    fn from(addr: PhysicalAddress) -> Self {
        addr.frame_number()
    }
}

impl_page_number_common!(
    PageNumber,
    "A virtual page number.\n\n\
     The key of the supplemental page table: every byte-granular address is reduced to the\n\
     page that contains it before lookup."
);

impl PageNumber {
    /// Returns the virtual address at the start of this page.
    #[inline]
    pub const fn start(self) -> VirtualAddress {
        VirtualAddress::new(self.0 * PAGE_SIZE)
    }
}

impl From<VirtualAddress> for PageNumber {
    #[inline]
    fn from(addr: VirtualAddress) -> Self {
        addr.page_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_start_address() {
        assert_eq!(
            FrameNumber::new(5).start(),
            PhysicalAddress::new(5 * PAGE_SIZE)
        );
    }

    #[test]
    fn page_from_unaligned_address() {
        let addr = VirtualAddress::new(3 * PAGE_SIZE + 100);
        assert_eq!(PageNumber::from(addr), PageNumber::new(3));
    }

    #[test]
    fn pages_walk_as_range() {
        let start = PageNumber::new(10);
        let pages: Vec<_> = (start..start + 3).collect();
        assert_eq!(
            pages,
            [PageNumber::new(10), PageNumber::new(11), PageNumber::new(12)]
        );
    }

    #[test]
    fn sub_gives_distance() {
        assert_eq!(PageNumber::new(9) - PageNumber::new(4), 5);
        assert_eq!(FrameNumber::new(4) - 1, FrameNumber::new(3));
    }
}
