//! File-backed pages.
//!
//! A page whose contents come from, and are written back to, a range of a file. Only the first
//! `read_bytes` bytes of the page belong to the file; the rest reads as zeros and is never
//! written back.

use alloc::sync::Arc;
use core::fmt;

use crate::{
    file::{FILESYS_LOCK, File},
    layout::PAGE_SIZE,
};

/// A page-sized window into a file.
#[derive(Clone)]
pub struct FileSlice {
    file: Arc<dyn File>,
    offset: usize,
    read_bytes: usize,
}

impl FileSlice {
    /// Creates a slice of `read_bytes` bytes at `offset`.
    ///
    /// # Panics
    /// Panics if `read_bytes` exceeds a page.
    pub fn new(file: Arc<dyn File>, offset: usize, read_bytes: usize) -> Self {
        assert!(read_bytes <= PAGE_SIZE, "file slice larger than a page");
        Self {
            file,
            offset,
            read_bytes,
        }
    }

    /// The offset of the slice in the file.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes of the page that come from the file.
    pub fn read_bytes(&self) -> usize {
        self.read_bytes
    }

    /// The file handle.
    pub fn file(&self) -> &Arc<dyn File> {
        &self.file
    }

    /// Fills `frame` from the file and zeroes the remainder. Returns false on a short read.
    pub fn read_into(&self, frame: &mut [u8]) -> bool {
        let read = {
            let _fs = FILESYS_LOCK.lock();
            self.file.read_at(&mut frame[..self.read_bytes], self.offset)
        };
        frame[read..].fill(0);
        read == self.read_bytes
    }

    /// Writes the file's part of `frame` back.
    pub fn write_back(&self, frame: &[u8]) {
        if self.read_bytes == 0 {
            return;
        }
        let _fs = FILESYS_LOCK.lock();
        let written = self.file.write_at(&frame[..self.read_bytes], self.offset);
        if written != self.read_bytes {
            log::warn!(
                "short write-back at offset {}: {} of {} bytes",
                self.offset,
                written,
                self.read_bytes
            );
        }
    }

    /// Returns the same slice over an independently opened handle.
    pub fn duplicate(&self) -> Option<Self> {
        Some(Self {
            file: self.file.reopen()?,
            offset: self.offset,
            read_bytes: self.read_bytes,
        })
    }
}

impl fmt::Debug for FileSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSlice")
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .finish_non_exhaustive()
    }
}

/// State of a file-backed page that has been brought in at least once.
#[derive(Debug)]
pub struct FilePage {
    slice: FileSlice,
}

impl FilePage {
    pub fn new(slice: FileSlice) -> Self {
        Self { slice }
    }

    pub fn slice(&self) -> &FileSlice {
        &self.slice
    }

    /// Reads the page from the file.
    pub fn load(&self, frame: &mut [u8]) -> bool {
        self.slice.read_into(frame)
    }

    /// Gives up the frame. Contents are written back only if the page was modified.
    pub fn evict(&self, frame: &[u8], dirty: bool) {
        if dirty {
            self.slice.write_back(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulated::MemFile;
    use alloc::vec;

    #[test]
    fn short_file_is_zero_padded() {
        let file = MemFile::new(b"0123456789");
        let slice = FileSlice::new(file, 0, 10);
        let mut frame = vec![0xFF; PAGE_SIZE];
        assert!(slice.read_into(&mut frame));
        assert_eq!(&frame[..10], b"0123456789");
        assert!(frame[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn clean_eviction_writes_nothing() {
        let file = MemFile::new(&[7; PAGE_SIZE]);
        let page = FilePage::new(FileSlice::new(file.clone(), 0, PAGE_SIZE));
        let frame = vec![1; PAGE_SIZE];
        page.evict(&frame, false);
        assert_eq!(file.write_calls(), 0);

        page.evict(&frame, true);
        assert_eq!(file.write_calls(), 1);
        assert!(file.contents().iter().all(|&b| b == 1));
    }

    #[test]
    fn write_back_stays_inside_the_file() {
        let file = MemFile::new(&[0; PAGE_SIZE + 4]);
        let slice = FileSlice::new(file.clone(), PAGE_SIZE, 4);
        slice.write_back(&vec![9; PAGE_SIZE]);
        let contents = file.contents();
        assert_eq!(&contents[PAGE_SIZE..], &[9, 9, 9, 9]);
        assert!(contents[..PAGE_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn duplicate_opens_a_new_handle() {
        let file = MemFile::with_handle_limit(b"abc", 2);
        let slice = FileSlice::new(file.clone(), 0, 3);
        let copy = slice.duplicate().unwrap();
        assert_eq!(file.open_handles(), 2);
        assert!(copy.duplicate().is_none());
    }
}
