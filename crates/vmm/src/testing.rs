//! Shared test fixtures.

use alloc::sync::Arc;

use crate::{
    VirtualAddress,
    emulated::MemDisk,
    frame_table::{FrameTable, SharedDirectory},
    layout::{PAGE_SIZE, SECTORS_PER_PAGE},
    page_directory::PageDirectory,
    pool::UserPool,
    swap::SwapTable,
};

/// A frame table with `frames` user frames and `swap_slots` page-sized swap slots.
pub fn frame_table(frames: usize, swap_slots: usize) -> (Arc<FrameTable>, Arc<MemDisk>) {
    let disk = Arc::new(MemDisk::new(swap_slots * SECTORS_PER_PAGE));
    let table = FrameTable::new(UserPool::new(frames), SwapTable::new(disk.clone()));
    (Arc::new(table), disk)
}

/// An empty page directory.
pub fn directory() -> SharedDirectory {
    Arc::new(spin::Mutex::new(PageDirectory::new()))
}

/// The `n`th page of a region of user memory away from the stack.
pub fn user_page(n: usize) -> VirtualAddress {
    VirtualAddress::new(0x1000_0000 + n * PAGE_SIZE)
}
