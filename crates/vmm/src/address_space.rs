//! Address space management.
//!
//! An [`AddressSpace`] is everything the virtual memory layer knows about one process: its page
//! directory, its supplemental page table, its memory-mapped regions and the stack pointers the
//! fault handler needs. Fault handling, mmap and fork live in their own modules as further
//! `impl AddressSpace` blocks.

use alloc::{
    boxed::Box,
    collections::BTreeMap,
    string::{String, ToString},
    sync::Arc,
    vec::Vec,
};

use crate::{
    VirtualAddress,
    error::{Rejection, VmError},
    fault::PageFault,
    file::File,
    file_backed::FileSlice,
    frame_table::{FrameTable, SharedDirectory},
    layout::{KERNEL_BASE, PAGE_SIZE, USER_STACK},
    loader::SegmentLoader,
    mmap::MappedRegion,
    page::Page,
    page_directory::{AccessViolation, PageDirectory},
    spt::SupplementalPageTable,
};

/// How many times a user access is retried after its fault was handled. The page can only be
/// lost again if another process evicted it in between.
const ACCESS_ATTEMPTS: usize = 4;

/// The virtual memory of one process.
pub struct AddressSpace {
    pub(crate) name: String,
    pub(crate) directory: SharedDirectory,
    pub(crate) spt: SupplementalPageTable,
    /// Live mappings, keyed by start address.
    pub(crate) mappings: BTreeMap<VirtualAddress, MappedRegion>,
    pub(crate) frames: Arc<FrameTable>,
    /// User stack pointer from the trap frame.
    pub(crate) stack_pointer: usize,
    /// User stack pointer saved on entry to the kernel, for faults taken in kernel mode.
    pub(crate) saved_stack_pointer: usize,
}

impl AddressSpace {
    /// Creates an empty address space whose pages come from `frames`.
    pub fn new(name: &str, frames: Arc<FrameTable>) -> Self {
        log::debug!("{}: address space created", name);
        Self {
            name: name.to_string(),
            directory: Arc::new(spin::Mutex::new(PageDirectory::new())),
            spt: SupplementalPageTable::new(),
            mappings: BTreeMap::new(),
            frames,
            stack_pointer: 0,
            saved_stack_pointer: 0,
        }
    }

    /// The process name, used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The page directory of this address space.
    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    pub fn spt(&self) -> &SupplementalPageTable {
        &self.spt
    }

    pub fn frame_table(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    /// Returns the mapping starting at `start`, if any.
    pub fn mapping(&self, start: VirtualAddress) -> Option<&MappedRegion> {
        self.mappings.get(&start)
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// Records the user stack pointer from the current trap frame.
    pub fn set_stack_pointer(&mut self, stack_pointer: usize) {
        self.stack_pointer = stack_pointer;
    }

    /// Records the user stack pointer at system call entry. Faults taken while the kernel
    /// touches user memory judge stack growth against this value.
    pub fn save_user_stack_pointer(&mut self, stack_pointer: usize) {
        self.saved_stack_pointer = stack_pointer;
    }

    /// Registers an executable segment to be loaded on demand.
    ///
    /// The segment covers `read_bytes + zero_bytes` bytes at `upage`: the first `read_bytes`
    /// come from `file` at `offset`, the rest are zero. Each page is read when first touched.
    pub fn load_segment(
        &mut self,
        file: &Arc<dyn File>,
        offset: usize,
        upage: VirtualAddress,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> Result<(), VmError> {
        if !upage.is_page_aligned() || offset % PAGE_SIZE != 0 {
            return Err(VmError::Misaligned);
        }
        let total = read_bytes
            .checked_add(zero_bytes)
            .ok_or(VmError::InvalidSegment)?;
        if total == 0 || total % PAGE_SIZE != 0 {
            return Err(VmError::InvalidSegment);
        }
        let count = total / PAGE_SIZE;
        self.check_free_range(upage, count)?;
        offset.checked_add(total).ok_or(VmError::InvalidOffset)?;

        let handle = if read_bytes > 0 {
            Some(file.reopen().ok_or(VmError::OutOfFiles)?)
        } else {
            None
        };
        let run = (0..count).map(|i| {
            let va = upage + i * PAGE_SIZE;
            let page_read = read_bytes.saturating_sub(i * PAGE_SIZE).min(PAGE_SIZE);
            match &handle {
                Some(handle) if page_read > 0 => {
                    let slice = FileSlice::new(handle.clone(), offset + i * PAGE_SIZE, page_read);
                    Page::lazy(va, writable, Box::new(SegmentLoader::new(slice)))
                }
                _ => Page::zeroed(va, writable),
            }
        });
        self.insert_run(run)?;
        log::debug!(
            "{}: segment at {} ({} pages, {} bytes from offset {})",
            self.name,
            upage,
            count,
            read_bytes,
            offset
        );
        Ok(())
    }

    /// Creates the first stack page just below [`USER_STACK`] and points the stack pointer at
    /// the top of it.
    pub fn setup_stack(&mut self) -> Result<(), VmError> {
        let va = VirtualAddress::new(USER_STACK - PAGE_SIZE);
        let page = Page::zeroed(va, true);
        self.spt.insert(page.clone())?;
        if let Err(err) = self.frames.claim(&page, &self.directory) {
            self.spt.remove(va, &self.frames);
            return Err(err);
        }
        self.stack_pointer = USER_STACK;
        Ok(())
    }

    /// Evicts the page containing `va`. Returns false if it was not resident.
    pub fn page_out(&self, va: VirtualAddress) -> bool {
        self.spt
            .find(va)
            .is_some_and(|page| self.frames.page_out(page))
    }

    /// Reads user memory at `va` as the process would, faulting pages in as needed.
    pub fn read_user(&mut self, va: VirtualAddress, buf: &mut [u8]) -> Result<(), Rejection> {
        let mut done = 0;
        while done < buf.len() {
            let at = va.checked_add(done).ok_or(Rejection::KernelAddress)?;
            let len = (PAGE_SIZE - at.page_offset()).min(buf.len() - done);
            let chunk = &mut buf[done..done + len];
            self.access(at, false, |frames, directory| {
                frames.read_user(directory, at, &mut *chunk)
            })?;
            done += len;
        }
        Ok(())
    }

    /// Writes user memory at `va` as the process would, faulting pages in as needed.
    pub fn write_user(&mut self, va: VirtualAddress, bytes: &[u8]) -> Result<(), Rejection> {
        let mut done = 0;
        while done < bytes.len() {
            let at = va.checked_add(done).ok_or(Rejection::KernelAddress)?;
            let len = (PAGE_SIZE - at.page_offset()).min(bytes.len() - done);
            let chunk = &bytes[done..done + len];
            self.access(at, true, |frames, directory| {
                frames.write_user(directory, at, chunk)
            })?;
            done += len;
        }
        Ok(())
    }

    fn access(
        &mut self,
        va: VirtualAddress,
        write: bool,
        mut op: impl FnMut(&FrameTable, &spin::Mutex<PageDirectory>) -> Result<(), AccessViolation>,
    ) -> Result<(), Rejection> {
        for _ in 0..ACCESS_ATTEMPTS {
            let violation = match op(&*self.frames, &*self.directory) {
                Ok(()) => return Ok(()),
                Err(violation) => violation,
            };
            self.handle_fault(&PageFault {
                address: va,
                user: true,
                write,
                not_present: violation == AccessViolation::NotPresent,
                stack_pointer: self.stack_pointer,
            })?;
        }
        Err(Rejection::LoadFailed)
    }

    /// Terminates the process: logs the exit line and releases all of its memory. Returns
    /// `status`.
    pub fn exit(mut self, status: i32) -> i32 {
        log::info!("{}: exit({})", self.name, status);
        self.teardown();
        status
    }

    /// Unmaps every region, writing back dirty pages, then destroys every remaining page.
    fn teardown(&mut self) {
        while let Some(&start) = self.mappings.keys().next() {
            self.munmap(start);
        }
        self.spt.clear(&self.frames);
    }

    /// Checks that the frame table and this address space agree about every page.
    ///
    /// # Panics
    /// Panics describing the first disagreement.
    pub fn check_ownership(&self) {
        self.frames.check_ownership();
        for (va, page) in self.spt.iter() {
            let frame = page.frame();
            if let Some(frame) = frame {
                assert!(
                    self.frames.is_owner(frame, page),
                    "page {} is not the owner of frame {}",
                    va,
                    frame
                );
            }
            let mapped = self.directory.lock().is_mapped(va);
            assert_eq!(
                mapped,
                frame.is_some(),
                "page {} residency and mapping disagree",
                va
            );
        }
    }

    /// Checks that `count` pages at `start` are user pages with no descriptor yet.
    pub(crate) fn check_free_range(
        &self,
        start: VirtualAddress,
        count: usize,
    ) -> Result<(), VmError> {
        if start.is_null() || start.is_kernel() {
            return Err(VmError::InvalidAddress);
        }
        let end = count
            .checked_mul(PAGE_SIZE)
            .and_then(|length| start.checked_add(length))
            .ok_or(VmError::InvalidAddress)?;
        if end.as_usize() > KERNEL_BASE {
            return Err(VmError::InvalidAddress);
        }
        if !self.spt.is_range_free(start.page_number(), count) {
            return Err(VmError::Overlap);
        }
        Ok(())
    }

    /// Inserts a run of new pages, removing the ones already inserted if any insert fails.
    pub(crate) fn insert_run(
        &mut self,
        pages: impl Iterator<Item = Arc<Page>>,
    ) -> Result<(), VmError> {
        let mut inserted = Vec::new();
        for page in pages {
            let va = page.va();
            if let Err(err) = self.spt.insert(page) {
                for va in inserted {
                    self.spt.remove(va, &self.frames);
                }
                return Err(err);
            }
            inserted.push(va);
        }
        Ok(())
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("name", &self.name)
            .field("pages", &self.spt.len())
            .field("mappings", &self.mappings.len())
            .finish_non_exhaustive()
    }
}
