//! The frame table.
//!
//! Every user frame in use is listed here in allocation order together with the page that lives
//! in it. When the pool runs dry, a clock sweep over that list picks a victim: frames whose page
//! was recently accessed get their accessed bit cleared and a second chance, the first frame
//! found with a clear bit is evicted. The swap table shares the frame table lock, so a fault
//! that evicts, swaps, and maps does so as one step.
//!
//! Lock order: frame table, then page state, then page directory, then the filesystem lock.

use alloc::{
    collections::BTreeSet,
    sync::{Arc, Weak},
    vec::Vec,
};

use crate::{
    FrameNumber, VirtualAddress,
    anon::AnonPage,
    error::VmError,
    file_backed::FilePage,
    mmu::PageFlags,
    page::{Page, PageState, Variant},
    page_directory::{AccessViolation, PageDirectory},
    pool::UserPool,
    swap::{SwapSlot, SwapTable},
};

/// A page directory shared between its address space and the frames mapped into it.
pub type SharedDirectory = Arc<spin::Mutex<PageDirectory>>;

/// The page living in a frame.
struct Owner {
    page: Weak<Page>,
    va: VirtualAddress,
    directory: SharedDirectory,
}

struct FrameSlot {
    frame: FrameNumber,
    /// None while the frame is between owners.
    owner: Option<Owner>,
}

struct Inner {
    pool: UserPool,
    swap: SwapTable,
    /// Frames in use, in allocation order.
    frames: Vec<FrameSlot>,
    /// Clock hand: index into `frames` where the next sweep starts.
    hand: usize,
}

impl Inner {
    fn position(&self, frame: FrameNumber) -> Option<usize> {
        self.frames.iter().position(|slot| slot.frame == frame)
    }

    /// Returns the index of an unowned frame, evicting a page if the pool is empty.
    fn acquire(&mut self) -> Option<usize> {
        if let Some(frame) = self.pool.allocate() {
            self.frames.push(FrameSlot { frame, owner: None });
            return Some(self.frames.len() - 1);
        }
        let victim = self.select_victim()?;
        self.evict(victim);
        Some(victim)
    }

    /// Runs the clock. Two sweeps are enough: the first clears every accessed bit it passes.
    fn select_victim(&mut self) -> Option<usize> {
        let count = self.frames.len();
        for _ in 0..count * 2 {
            let index = self.hand % count;
            self.hand = (index + 1) % count;

            let slot = &self.frames[index];
            let Some(owner) = &slot.owner else {
                continue;
            };
            if self.pool.frame(slot.frame).is_pinned() {
                continue;
            }
            let mut directory = owner.directory.lock();
            if directory.is_accessed(owner.va) {
                directory.set_accessed(owner.va, false);
                continue;
            }
            return Some(index);
        }
        None
    }

    /// Evicts the page in `frames[index]`, leaving the frame unowned.
    fn evict(&mut self, index: usize) {
        let frame = self.frames[index].frame;
        let Some(owner) = self.frames[index].owner.take() else {
            return;
        };

        let Some(page) = owner.page.upgrade() else {
            log::warn!("frame {} owned by a dropped page at {}", frame, owner.va);
            owner.directory.lock().unmap(owner.va);
            return;
        };

        let mut state = page.state();
        let dirty = {
            let mut directory = owner.directory.lock();
            let dirty = directory.is_dirty(owner.va);
            directory.unmap(owner.va);
            dirty
        };
        state
            .variant
            .evict(self.pool.bytes(frame), dirty, &mut self.swap);
        state.frame = None;
        log::trace!("evicted {} from frame {} (dirty: {})", owner.va, frame, dirty);
    }

    /// Makes `page` the owner of `frames[index]` and maps it.
    fn link(
        &mut self,
        index: usize,
        page: &Arc<Page>,
        state: &mut PageState,
        directory: &SharedDirectory,
    ) {
        let frame = self.frames[index].frame;
        self.frames[index].owner = Some(Owner {
            page: Arc::downgrade(page),
            va: page.va(),
            directory: directory.clone(),
        });
        state.frame = Some(frame);
        directory
            .lock()
            .map(page.va(), frame.start(), PageFlags::user(page.writable()));
    }

    /// Drops `frames[index]` from the list and returns the frame to the pool.
    fn remove(&mut self, index: usize) {
        let slot = self.frames.remove(index);
        if self.hand > index {
            self.hand -= 1;
        }
        if self.hand >= self.frames.len() {
            self.hand = 0;
        }
        self.pool.free(slot.frame);
    }
}

/// Where a forked page's contents come from.
#[derive(Clone, Copy)]
enum CopySource {
    Frame(FrameNumber),
    Swap(SwapSlot),
}

/// The global registry of user frames.
pub struct FrameTable {
    inner: spin::Mutex<Inner>,
}

impl FrameTable {
    /// Creates a frame table over `pool`, evicting anonymous pages to `swap`.
    pub fn new(pool: UserPool, swap: SwapTable) -> Self {
        log::debug!(
            "frame table: {} frames, {} swap slots",
            pool.capacity(),
            swap.slot_count()
        );
        Self {
            inner: spin::Mutex::new(Inner {
                pool,
                swap,
                frames: Vec::new(),
                hand: 0,
            }),
        }
    }

    /// Brings `page` into a frame and maps it in `directory`.
    ///
    /// Does nothing if the page is already resident. On failure the page stays non-resident and
    /// any frame taken for it goes back to the pool.
    pub fn claim(&self, page: &Arc<Page>, directory: &SharedDirectory) -> Result<(), VmError> {
        let mut inner = self.inner.lock();
        let mut state = page.state();
        if state.frame.is_some() {
            return Ok(());
        }

        let index = inner.acquire().ok_or(VmError::OutOfMemory)?;
        let frame = inner.frames[index].frame;
        let loaded = {
            let Inner { pool, swap, .. } = &mut *inner;
            state.variant.resolve(pool.bytes_mut(frame), swap)
        };
        if !loaded {
            inner.remove(index);
            return Err(VmError::LoadFailed);
        }

        inner.link(index, page, &mut state, directory);
        log::trace!("claimed frame {} for {}", frame, page.va());
        Ok(())
    }

    /// Evicts `page` and returns its frame to the pool. Returns false if it was not resident.
    pub fn page_out(&self, page: &Page) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = page.frame().and_then(|frame| inner.position(frame)) else {
            return false;
        };
        inner.evict(index);
        inner.remove(index);
        true
    }

    /// Destroys `page`: dirty file contents are written back, swap is freed, the mapping is
    /// removed and the frame goes back to the pool.
    pub fn release(&self, page: &Page) {
        let mut inner = self.inner.lock();
        let mut state = page.state();
        let frame = state.frame.take();
        let index = frame.and_then(|frame| inner.position(frame));
        let owner = index.and_then(|index| inner.frames[index].owner.take());
        let dirty = owner.is_some_and(|owner| {
            let mut directory = owner.directory.lock();
            let dirty = directory.is_dirty(owner.va);
            directory.unmap(owner.va);
            dirty
        });

        {
            let Inner { pool, swap, .. } = &mut *inner;
            state
                .variant
                .destroy(frame.map(|frame| pool.bytes(frame)), dirty, swap);
        }
        if let Some(index) = index {
            inner.remove(index);
        }
    }

    /// Builds the child's copy of `parent` for a fork.
    ///
    /// Resident and swapped-out contents are copied into a new frame mapped in
    /// `child_directory`; the parent keeps its own frame or slot. Pages not yet brought in get a
    /// duplicate of their initializer. The child's copy starts clean: only its own writes are
    /// ever written back.
    pub(crate) fn duplicate(
        &self,
        parent: &Page,
        child_directory: &SharedDirectory,
    ) -> Result<Arc<Page>, VmError> {
        let mut inner = self.inner.lock();
        let state = parent.state();
        let (va, writable) = (parent.va(), parent.writable());

        let (variant, swapped) = match &state.variant {
            Variant::Uninit(uninit) => {
                let uninit = uninit.duplicate().ok_or(VmError::OutOfFiles)?;
                return Ok(Page::new(va, writable, Variant::Uninit(uninit)));
            }
            Variant::Anonymous(anon) => (Variant::Anonymous(AnonPage::new()), anon.slot()),
            Variant::FileBacked(file) => {
                let slice = file.slice().duplicate().ok_or(VmError::OutOfFiles)?;
                (Variant::FileBacked(FilePage::new(slice)), None)
            }
        };
        let child = Page::new(va, writable, variant);

        let source = match (state.frame, swapped) {
            (Some(frame), _) => CopySource::Frame(frame),
            (None, Some(slot)) => CopySource::Swap(slot),
            (None, None) => return Ok(child),
        };

        // The parent's own state lock is held, so its frame must not be picked as the victim.
        if let CopySource::Frame(frame) = source {
            inner.pool.frame(frame).set_pinned(true);
        }
        let acquired = inner.acquire();
        if let CopySource::Frame(frame) = source {
            inner.pool.frame(frame).set_pinned(false);
        }
        let index = acquired.ok_or(VmError::OutOfMemory)?;
        let child_frame = inner.frames[index].frame;

        let copied = match source {
            CopySource::Frame(frame) => {
                inner.pool.copy(frame, child_frame);
                true
            }
            CopySource::Swap(slot) => {
                let Inner { pool, swap, .. } = &mut *inner;
                swap.read(slot, pool.bytes_mut(child_frame)).is_ok()
            }
        };
        if !copied {
            inner.remove(index);
            return Err(VmError::LoadFailed);
        }

        drop(state);

        let mut child_state = child.state();
        inner.link(index, &child, &mut child_state, child_directory);
        drop(child_state);
        Ok(child)
    }

    /// Reads user memory through `directory` as a user-mode load would.
    pub(crate) fn read_user(
        &self,
        directory: &spin::Mutex<PageDirectory>,
        va: VirtualAddress,
        buf: &mut [u8],
    ) -> Result<(), AccessViolation> {
        let inner = self.inner.lock();
        let phys = directory.lock().access_user(va, false)?;
        inner.pool.read(phys, buf);
        Ok(())
    }

    /// Writes user memory through `directory` as a user-mode store would.
    pub(crate) fn write_user(
        &self,
        directory: &spin::Mutex<PageDirectory>,
        va: VirtualAddress,
        bytes: &[u8],
    ) -> Result<(), AccessViolation> {
        let mut inner = self.inner.lock();
        let phys = directory.lock().access_user(va, true)?;
        inner.pool.write(phys, bytes);
        Ok(())
    }

    /// Returns true if `frame` is listed with `page` as its owner.
    pub fn is_owner(&self, frame: FrameNumber, page: &Page) -> bool {
        let inner = self.inner.lock();
        inner
            .position(frame)
            .and_then(|index| inner.frames[index].owner.as_ref())
            .is_some_and(|owner| core::ptr::eq(owner.page.as_ptr(), page))
    }

    /// Checks the frame ownership invariant.
    ///
    /// Every listed frame is allocated, listed once, owned by a live page that points back at
    /// it, and mapped to that page's address.
    ///
    /// # Panics
    /// Panics describing the first violation found.
    pub fn check_ownership(&self) {
        let inner = self.inner.lock();
        let mut seen = BTreeSet::new();
        for slot in &inner.frames {
            assert!(seen.insert(slot.frame), "frame {} listed twice", slot.frame);
            assert!(
                inner.pool.frame(slot.frame).is_allocated(),
                "frame {} listed but free",
                slot.frame
            );
            let Some(owner) = &slot.owner else {
                panic!("frame {} has no owner", slot.frame);
            };
            let Some(page) = owner.page.upgrade() else {
                panic!("frame {} owned by a dropped page", slot.frame);
            };
            assert_eq!(
                page.frame(),
                Some(slot.frame),
                "page {} does not point back at frame {}",
                owner.va,
                slot.frame
            );
            let mapped = owner.directory.lock().translate(owner.va);
            assert_eq!(
                mapped.map(|(phys, _)| phys),
                Some(slot.frame.start()),
                "page {} not mapped to frame {}",
                owner.va,
                slot.frame
            );
        }
    }

    /// Number of frames holding a page.
    pub fn resident_frames(&self) -> usize {
        let inner = self.inner.lock();
        inner.frames.iter().filter(|slot| slot.owner.is_some()).count()
    }

    /// Number of frames left in the pool.
    pub fn free_frames(&self) -> usize {
        self.inner.lock().pool.free_count()
    }

    /// Number of unoccupied swap slots.
    pub fn free_swap_slots(&self) -> usize {
        self.inner.lock().swap.free_slots()
    }
}
