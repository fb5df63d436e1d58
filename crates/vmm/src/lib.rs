#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]
#![feature(step_trait)]

//! # Polaris Virtual Memory Manager (VMM)
//!
//! The demand-paged virtual memory layer of the Polaris kernel. It provides:
//!
//! - Per-process address spaces with a supplemental page table describing every page.
//! - Anonymous memory that is swapped to a block device under memory pressure.
//! - Memory-mapped files with write-back of modified pages.
//! - A page fault handler with automatic stack growth.
//! - Clock (second chance) eviction over a shared pool of user frames.
//! - Address space duplication for fork.
//!
//! Physical memory, page tables, disks and files are modelled in software, so the whole layer
//! runs on a host. With the `software-emulation` feature the in-memory disk and file used by the
//! tests are exported as well.

extern crate alloc;

mod address;
mod address_space;
mod anon;
mod block;
#[cfg(any(test, feature = "software-emulation"))]
pub mod emulated;
mod error;
mod fault;
mod file;
mod file_backed;
mod fork;
mod frame;
mod frame_table;
pub mod layout;
mod loader;
mod mmap;
mod mmu;
mod numbers;
mod page;
mod page_directory;
mod pool;
mod spt;
mod swap;
#[cfg(test)]
mod testing;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::AddressSpace;
pub use anon::AnonPage;
pub use block::{BlockDevice, Sector};
pub use error::{BlockError, Rejection, SwapError, VmError};
pub use fault::{KILLED_EXIT_STATUS, PageFault, Resolution, is_stack_access};
pub use file::{FILESYS_LOCK, File};
pub use file_backed::{FilePage, FileSlice};
pub use frame::{Frame, FrameFlag, FrameFlags};
pub use frame_table::{FrameTable, SharedDirectory};
pub use loader::SegmentLoader;
pub use mmap::MappedRegion;
pub use mmu::{PageEntry, PageFlags};
pub use numbers::{FrameNumber, PageNumber};
pub use page::{LazyLoad, Page, PageKind, Uninit, Variant};
pub use page_directory::{AccessViolation, PageDirectory};
pub use pool::UserPool;
pub use spt::SupplementalPageTable;
pub use swap::{SwapSlot, SwapTable};

pub use layout::PAGE_SIZE;
