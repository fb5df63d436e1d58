//! Address space duplication for fork.

use crate::{address_space::AddressSpace, error::VmError};

impl AddressSpace {
    /// Creates a copy of this address space for a child process.
    ///
    /// Every page is duplicated: resident and swapped-out contents are copied into new frames,
    /// pages not yet loaded get a copy of their initializer, and every file handle is reopened.
    /// Nothing is shared with the parent afterwards. If a frame or file handle runs out, the
    /// partial child is torn down and the error returned.
    pub fn fork(&self, name: &str) -> Result<AddressSpace, VmError> {
        let mut child = AddressSpace::new(name, self.frames.clone());
        child.stack_pointer = self.stack_pointer;
        child.saved_stack_pointer = self.saved_stack_pointer;

        match self.copy_into(&mut child) {
            Ok(()) => {
                log::debug!(
                    "{}: forked into {} ({} pages)",
                    self.name,
                    name,
                    child.spt.len()
                );
                Ok(child)
            }
            Err(err) => {
                log::warn!("{}: fork failed: {}", self.name, err);
                Err(err)
            }
        }
    }

    fn copy_into(&self, child: &mut AddressSpace) -> Result<(), VmError> {
        for (&start, region) in &self.mappings {
            let region = region.duplicate().ok_or(VmError::OutOfFiles)?;
            child.mappings.insert(start, region);
        }
        for (_, page) in self.spt.iter() {
            let copy = self.frames.duplicate(page, &child.directory)?;
            child
                .spt
                .insert(copy.clone())
                .inspect_err(|_| self.frames.release(&copy))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulated::MemFile,
        file::File,
        layout::{PAGE_SIZE, USER_STACK},
        page::{Page, PageKind},
        testing::{self, user_page},
    };
    use alloc::sync::Arc;

    #[test]
    fn child_gets_every_page_once() {
        let (table, _) = testing::frame_table(8, 8);
        let mut parent = AddressSpace::new("parent", table);
        parent.setup_stack().unwrap();
        let file: Arc<dyn File> = MemFile::new(&[5; 2 * PAGE_SIZE]);
        parent
            .mmap(user_page(0), 2 * PAGE_SIZE, true, &file, 0)
            .unwrap();
        parent.read_user(user_page(0), &mut [0; 1]).unwrap();

        let child = parent.fork("child").unwrap();
        let parent_pages: Vec<_> = parent.spt().iter().map(|(va, p)| (va, p.writable())).collect();
        let child_pages: Vec<_> = child.spt().iter().map(|(va, p)| (va, p.writable())).collect();
        assert_eq!(parent_pages, child_pages);
        assert_eq!(child.stack_pointer(), USER_STACK);
        assert!(child.mapping(user_page(0)).is_some());

        assert_eq!(
            child.spt().find(user_page(0)).unwrap().kind(),
            PageKind::FileBacked
        );
        assert_eq!(
            child.spt().find(user_page(1)).unwrap().kind(),
            PageKind::Uninit
        );
        parent.check_ownership();
        child.check_ownership();
    }

    #[test]
    fn failed_fork_releases_the_partial_child() {
        let (table, _) = testing::frame_table(4, 0);
        let mut parent = AddressSpace::new("parent", table.clone());
        parent.spt.insert(Page::zeroed(user_page(0), true)).unwrap();
        parent.write_user(user_page(0), b"x").unwrap();

        let segment = MemFile::with_handle_limit(&[7; PAGE_SIZE], 2);
        let handle: Arc<dyn File> = segment.clone();
        parent
            .load_segment(&handle, 0, user_page(1), PAGE_SIZE, 0, false)
            .unwrap();
        assert_eq!(segment.open_handles(), 2);

        assert_eq!(parent.fork("child").err(), Some(VmError::OutOfFiles));
        assert_eq!(table.free_frames(), 3);
        assert_eq!(table.resident_frames(), 1);
        assert_eq!(segment.open_handles(), 2);
        parent.check_ownership();
    }

    #[test]
    fn fork_copies_swapped_pages() {
        let (table, _) = testing::frame_table(2, 2);
        let mut parent = AddressSpace::new("parent", table.clone());
        parent.spt.insert(Page::zeroed(user_page(0), true)).unwrap();
        parent.write_user(user_page(0), b"swapped").unwrap();
        assert!(parent.page_out(user_page(0)));

        let mut child = parent.fork("child").unwrap();
        let mut buf = [0; 7];
        child.read_user(user_page(0), &mut buf).unwrap();
        assert_eq!(&buf, b"swapped");
        assert!(parent.spt().find(user_page(0)).unwrap().swap_slot().is_some());
    }
}
