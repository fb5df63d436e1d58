//! Memory-mapped files.
//!
//! `mmap` only records what a mapping covers: one lazy file-backed page per page of the range.
//! Pages are read when first touched and written back, if modified, when evicted or unmapped.

use alloc::sync::Arc;
use core::fmt;

use crate::{
    VirtualAddress,
    address_space::AddressSpace,
    error::VmError,
    file::{FILESYS_LOCK, File},
    file_backed::FileSlice,
    layout::PAGE_SIZE,
    page::Page,
};

/// One live mapping: a run of file-backed pages created and torn down together.
pub struct MappedRegion {
    start: VirtualAddress,
    pages: usize,
    /// The mapping's own handle, independent of the descriptor it was created from.
    file: Arc<dyn File>,
    offset: usize,
    writable: bool,
}

impl MappedRegion {
    pub fn start(&self) -> VirtualAddress {
        self.start
    }

    /// Number of pages in the mapping.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Offset in the file of the first page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Returns the same mapping with a newly opened file handle.
    pub(crate) fn duplicate(&self) -> Option<Self> {
        Some(Self {
            start: self.start,
            pages: self.pages,
            file: self.file.reopen()?,
            offset: self.offset,
            writable: self.writable,
        })
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("start", &self.start)
            .field("pages", &self.pages)
            .field("offset", &self.offset)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl AddressSpace {
    /// Maps `length` bytes of `file`, starting at `offset`, at `address`.
    ///
    /// The part of the last page past the end of the file reads as zeros. Nothing is read until
    /// the pages are touched. On error nothing is mapped.
    pub fn mmap(
        &mut self,
        address: VirtualAddress,
        length: usize,
        writable: bool,
        file: &Arc<dyn File>,
        offset: usize,
    ) -> Result<VirtualAddress, VmError> {
        if offset % PAGE_SIZE != 0 {
            return Err(VmError::Misaligned);
        }
        if length == 0 {
            return Err(VmError::ZeroLength);
        }
        if address.is_null() {
            return Err(VmError::InvalidAddress);
        }
        if !address.is_page_aligned() {
            return Err(VmError::Misaligned);
        }
        let pages = length.div_ceil(PAGE_SIZE);
        self.check_free_range(address, pages)?;
        pages
            .checked_mul(PAGE_SIZE)
            .and_then(|span| offset.checked_add(span))
            .ok_or(VmError::InvalidOffset)?;

        let (file_length, handle) = {
            let _fs = FILESYS_LOCK.lock();
            (file.length(), file.reopen())
        };
        if file_length == 0 {
            return Err(VmError::EmptyFile);
        }
        let handle = handle.ok_or(VmError::OutOfFiles)?;

        let mapped = file_length.saturating_sub(offset).min(length);
        let run = (0..pages).map(|i| {
            let read = mapped.saturating_sub(i * PAGE_SIZE).min(PAGE_SIZE);
            let slice = FileSlice::new(handle.clone(), offset + i * PAGE_SIZE, read);
            Page::file_backed(address + i * PAGE_SIZE, writable, slice)
        });
        self.insert_run(run)?;

        self.mappings.insert(
            address,
            MappedRegion {
                start: address,
                pages,
                file: handle,
                offset,
                writable,
            },
        );
        log::debug!(
            "{}: mmap {} pages at {} (offset {}, writable: {})",
            self.name,
            pages,
            address,
            offset,
            writable
        );
        Ok(address)
    }

    /// Maps the file open as descriptor `fd`, looked up with `lookup`.
    ///
    /// Standard input and output (descriptors 0 and 1) cannot be mapped.
    pub fn mmap_fd(
        &mut self,
        address: VirtualAddress,
        length: usize,
        writable: bool,
        fd: i32,
        offset: usize,
        lookup: impl FnOnce(i32) -> Option<Arc<dyn File>>,
    ) -> Result<VirtualAddress, VmError> {
        if fd == 0 || fd == 1 {
            return Err(VmError::BadDescriptor);
        }
        let file = lookup(fd).ok_or(VmError::BadDescriptor)?;
        self.mmap(address, length, writable, &file, offset)
    }

    /// Removes the mapping that starts at `address`, writing modified pages back to the file.
    ///
    /// Does nothing unless `address` is the start of a live mapping.
    pub fn munmap(&mut self, address: VirtualAddress) {
        let Some(region) = self.mappings.remove(&address) else {
            log::trace!("{}: munmap of {} matches no mapping", self.name, address);
            return;
        };
        for i in 0..region.pages {
            self.spt.remove(region.start + i * PAGE_SIZE, &self.frames);
        }
        log::debug!(
            "{}: munmap {} pages at {}",
            self.name,
            region.pages,
            region.start
        );
    }
}
