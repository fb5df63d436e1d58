//! Software MMU.
//!
//! A four-level page table in the x86_64 entry format, walked in software. It plays the part of
//! the hardware: user accesses translate through it and set the accessed and dirty bits that the
//! eviction clock and file write-back read back.

mod entry;
mod flags;
mod table;

pub use entry::PageEntry;
pub use flags::PageFlags;
pub use table::PageTable;
