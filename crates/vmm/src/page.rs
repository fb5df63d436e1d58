//! Page descriptors.
//!
//! A [`Page`] describes one page of a user address space: where its contents come from, where
//! they go when the frame is taken away, and which frame holds it while resident. The supplemental
//! page table owns descriptors; the frame table only holds weak references back to them.
//!
//! Every page starts out [`Variant::Uninit`]. The first time it is brought in, its initializer
//! runs and it becomes [`Variant::Anonymous`] or [`Variant::FileBacked`] for the rest of its life.

use alloc::{boxed::Box, sync::Arc};
use core::{fmt, mem};

use crate::{
    FrameNumber, VirtualAddress,
    anon::AnonPage,
    file_backed::{FilePage, FileSlice},
    swap::{SwapSlot, SwapTable},
};

/// Fills a fresh anonymous page the first time it is touched.
pub trait LazyLoad: Send + Sync {
    /// Fills `frame`, which is zeroed beforehand. Returns false if the contents could not be
    /// produced.
    fn load(&self, frame: &mut [u8]) -> bool;

    /// Returns an independent copy of this initializer for a forked address space.
    fn duplicate(&self) -> Option<Box<dyn LazyLoad>>;
}

/// A page that has not been brought in yet, and what it will become.
pub enum Uninit {
    /// Becomes anonymous. Without a loader it starts zero-filled.
    Anonymous { loader: Option<Box<dyn LazyLoad>> },
    /// Becomes file-backed over this slice.
    FileBacked(FileSlice),
}

impl Uninit {
    /// Fills `frame` and returns the variant the page turns into, or gives `self` back on
    /// failure.
    fn initialize(self, frame: &mut [u8]) -> Result<Variant, Self> {
        match self {
            Uninit::Anonymous { loader } => {
                frame.fill(0);
                if loader.as_ref().is_none_or(|init| init.load(frame)) {
                    Ok(Variant::Anonymous(AnonPage::new()))
                } else {
                    Err(Uninit::Anonymous { loader })
                }
            }
            Uninit::FileBacked(slice) => {
                if slice.read_into(frame) {
                    Ok(Variant::FileBacked(FilePage::new(slice)))
                } else {
                    Err(Uninit::FileBacked(slice))
                }
            }
        }
    }

    /// Duplicates the deferred initializer, opening new file handles where needed.
    pub fn duplicate(&self) -> Option<Self> {
        Some(match self {
            Uninit::Anonymous { loader: None } => Uninit::Anonymous { loader: None },
            Uninit::Anonymous {
                loader: Some(loader),
            } => Uninit::Anonymous {
                loader: Some(loader.duplicate()?),
            },
            Uninit::FileBacked(slice) => Uninit::FileBacked(slice.duplicate()?),
        })
    }
}

/// What backs a page.
pub enum Variant {
    /// Not brought in yet.
    Uninit(Uninit),
    /// Anonymous memory, possibly swapped out.
    Anonymous(AnonPage),
    /// A window of a file.
    FileBacked(FilePage),
}

/// Coarse kind of a page, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Uninit,
    Anonymous,
    FileBacked,
}

impl Variant {
    pub fn kind(&self) -> PageKind {
        match self {
            Variant::Uninit(_) => PageKind::Uninit,
            Variant::Anonymous(_) => PageKind::Anonymous,
            Variant::FileBacked(_) => PageKind::FileBacked,
        }
    }

    /// Fills `frame` with the page's contents. Returns false if they could not be produced, in
    /// which case the variant is unchanged.
    pub(crate) fn resolve(&mut self, frame: &mut [u8], swap: &mut SwapTable) -> bool {
        match self {
            Variant::Uninit(_) => {
                let Variant::Uninit(uninit) =
                    mem::replace(self, Variant::Anonymous(AnonPage::new()))
                else {
                    unreachable!()
                };
                match uninit.initialize(frame) {
                    Ok(variant) => {
                        *self = variant;
                        true
                    }
                    Err(uninit) => {
                        *self = Variant::Uninit(uninit);
                        false
                    }
                }
            }
            Variant::Anonymous(anon) => match anon.swap_in(frame, swap) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("swap-in failed: {}", err);
                    false
                }
            },
            Variant::FileBacked(file) => file.load(frame),
        }
    }

    /// Moves the contents out of `frame` so the frame can be reused.
    ///
    /// # Panics
    /// Panics for pages that were never brought in, and for anonymous pages when swap is full.
    pub(crate) fn evict(&mut self, frame: &[u8], dirty: bool, swap: &mut SwapTable) {
        match self {
            Variant::Uninit(_) => panic!("evicting a page that was never loaded"),
            Variant::Anonymous(anon) => anon.swap_out(frame, swap),
            Variant::FileBacked(file) => file.evict(frame, dirty),
        }
    }

    /// Releases everything the page holds outside its frame. Dirty file contents still in
    /// `frame` are written back first.
    pub(crate) fn destroy(&mut self, frame: Option<&[u8]>, dirty: bool, swap: &mut SwapTable) {
        match self {
            Variant::Uninit(_) => {}
            Variant::Anonymous(anon) => anon.destroy(swap),
            Variant::FileBacked(file) => {
                if let Some(frame) = frame {
                    file.evict(frame, dirty);
                }
            }
        }
    }
}

/// Mutable part of a page descriptor. Only changed with the frame table lock held.
pub struct PageState {
    pub variant: Variant,
    /// The frame holding the page, while resident.
    pub frame: Option<FrameNumber>,
}

/// One page of a user address space.
pub struct Page {
    va: VirtualAddress,
    writable: bool,
    state: spin::Mutex<PageState>,
}

impl Page {
    /// Creates a descriptor for the page at `va`.
    ///
    /// # Panics
    /// Panics if `va` is not page aligned.
    pub fn new(va: VirtualAddress, writable: bool, variant: Variant) -> Arc<Self> {
        assert!(va.is_page_aligned(), "page address must be page-aligned");
        Arc::new(Self {
            va,
            writable,
            state: spin::Mutex::new(PageState {
                variant,
                frame: None,
            }),
        })
    }

    /// A zero-filled anonymous page.
    pub fn zeroed(va: VirtualAddress, writable: bool) -> Arc<Self> {
        Self::new(va, writable, Variant::Uninit(Uninit::Anonymous { loader: None }))
    }

    /// An anonymous page filled by `loader` on first touch.
    pub fn lazy(va: VirtualAddress, writable: bool, loader: Box<dyn LazyLoad>) -> Arc<Self> {
        Self::new(
            va,
            writable,
            Variant::Uninit(Uninit::Anonymous {
                loader: Some(loader),
            }),
        )
    }

    /// A file-backed page over `slice`.
    pub fn file_backed(va: VirtualAddress, writable: bool, slice: FileSlice) -> Arc<Self> {
        Self::new(va, writable, Variant::Uninit(Uninit::FileBacked(slice)))
    }

    /// The page-aligned address of this page.
    pub fn va(&self) -> VirtualAddress {
        self.va
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// The frame holding this page, if resident.
    pub fn frame(&self) -> Option<FrameNumber> {
        self.state.lock().frame
    }

    pub fn is_resident(&self) -> bool {
        self.frame().is_some()
    }

    pub fn kind(&self) -> PageKind {
        self.state.lock().variant.kind()
    }

    /// The swap slot holding this page, if it is an anonymous page that is swapped out.
    pub fn swap_slot(&self) -> Option<SwapSlot> {
        match &self.state.lock().variant {
            Variant::Anonymous(anon) => anon.slot(),
            _ => None,
        }
    }

    pub(crate) fn state(&self) -> spin::MutexGuard<'_, PageState> {
        self.state.lock()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Page")
            .field("va", &self.va)
            .field("writable", &self.writable)
            .field("kind", &state.variant.kind())
            .field("frame", &state.frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{emulated::MemFile, layout::PAGE_SIZE};
    use alloc::vec;

    struct Fill(u8);

    impl LazyLoad for Fill {
        fn load(&self, frame: &mut [u8]) -> bool {
            frame[..4].fill(self.0);
            self.0 != 0
        }

        fn duplicate(&self) -> Option<Box<dyn LazyLoad>> {
            Some(Box::new(Fill(self.0)))
        }
    }

    const VA: VirtualAddress = VirtualAddress::new(0x1000_0000);

    #[test]
    fn uninit_anonymous_becomes_anonymous() {
        let page = Page::lazy(VA, true, Box::new(Fill(3)));
        let mut frame = vec![0xEE; PAGE_SIZE];
        let mut swap = SwapTable::empty();
        assert!(page.state().variant.resolve(&mut frame, &mut swap));
        assert_eq!(page.kind(), PageKind::Anonymous);
        assert_eq!(&frame[..5], &[3, 3, 3, 3, 0]);
    }

    #[test]
    fn failed_initializer_leaves_page_uninit() {
        let page = Page::lazy(VA, true, Box::new(Fill(0)));
        let mut frame = vec![0; PAGE_SIZE];
        assert!(!page.state().variant.resolve(&mut frame, &mut SwapTable::empty()));
        assert_eq!(page.kind(), PageKind::Uninit);
    }

    #[test]
    fn uninit_file_becomes_file_backed() {
        let page = Page::file_backed(VA, false, FileSlice::new(MemFile::new(b"hi"), 0, 2));
        let mut frame = vec![0xEE; PAGE_SIZE];
        assert!(page.state().variant.resolve(&mut frame, &mut SwapTable::empty()));
        assert_eq!(page.kind(), PageKind::FileBacked);
        assert_eq!(&frame[..3], b"hi\0");
    }

    #[test]
    #[should_panic(expected = "evicting a page that was never loaded")]
    fn evicting_uninit_panics() {
        let page = Page::zeroed(VA, true);
        page.state()
            .variant
            .evict(&vec![0; PAGE_SIZE], false, &mut SwapTable::empty());
    }

    #[test]
    fn duplicate_respects_handle_limit() {
        let file = MemFile::with_handle_limit(b"abc", 1);
        let uninit = Uninit::FileBacked(FileSlice::new(file, 0, 3));
        assert!(uninit.duplicate().is_none());
        assert!(Uninit::Anonymous { loader: None }.duplicate().is_some());
    }
}
