//! In-memory collaborators.
//!
//! A RAM disk for swap and RAM files for mmap and loading, so the virtual memory layer can run
//! without a disk driver or filesystem. Both count their writes, which is how write-back
//! behaviour is observed from outside.

use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    block::{BlockDevice, Sector},
    error::BlockError,
    file::File,
    layout::SECTOR_SIZE,
};

/// A block device backed by memory.
pub struct MemDisk {
    data: spin::Mutex<Vec<u8>>,
    sector_count: usize,
    writes: AtomicUsize,
}

impl MemDisk {
    /// Creates a zeroed disk of `sector_count` sectors.
    pub fn new(sector_count: usize) -> Self {
        Self {
            data: spin::Mutex::new(vec![0; sector_count * SECTOR_SIZE]),
            sector_count,
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of sector writes performed so far.
    pub fn sector_writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for MemDisk {
    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read_sector(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        if sector >= self.sector_count {
            return Err(BlockError::OutOfRange);
        }
        let start = sector * SECTOR_SIZE;
        buf.copy_from_slice(&self.data.lock()[start..start + SECTOR_SIZE]);
        Ok(())
    }

    fn write_sector(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        if sector >= self.sector_count {
            return Err(BlockError::OutOfRange);
        }
        let start = sector * SECTOR_SIZE;
        self.data.lock()[start..start + SECTOR_SIZE].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Shared state of one in-memory file.
struct Inode {
    data: spin::Mutex<Vec<u8>>,
    writes: AtomicUsize,
    open_handles: AtomicUsize,
    max_handles: usize,
}

/// A handle to an in-memory file.
///
/// Every handle from [`File::reopen`] shares the same contents. The number of simultaneously
/// open handles can be capped to exercise handle exhaustion.
pub struct MemFile {
    inode: Arc<Inode>,
}

impl MemFile {
    /// Creates a file holding `contents` and returns the first handle to it.
    pub fn new(contents: &[u8]) -> Arc<Self> {
        Self::with_handle_limit(contents, usize::MAX)
    }

    /// Like [`MemFile::new`], but at most `max_handles` handles may be open at once.
    pub fn with_handle_limit(contents: &[u8], max_handles: usize) -> Arc<Self> {
        Arc::new(Self {
            inode: Arc::new(Inode {
                data: spin::Mutex::new(contents.to_vec()),
                writes: AtomicUsize::new(0),
                open_handles: AtomicUsize::new(1),
                max_handles,
            }),
        })
    }

    /// Returns a copy of the file contents.
    pub fn contents(&self) -> Vec<u8> {
        self.inode.data.lock().clone()
    }

    /// Number of `write_at` calls made through any handle.
    pub fn write_calls(&self) -> usize {
        self.inode.writes.load(Ordering::Relaxed)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.inode.open_handles.load(Ordering::Relaxed)
    }
}

impl File for MemFile {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let data = self.inode.data.lock();
        if offset >= data.len() {
            return 0;
        }
        let count = buf.len().min(data.len() - offset);
        buf[..count].copy_from_slice(&data[offset..offset + count]);
        count
    }

    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        self.inode.writes.fetch_add(1, Ordering::Relaxed);
        let mut data = self.inode.data.lock();
        if offset >= data.len() {
            return 0;
        }
        let count = buf.len().min(data.len() - offset);
        data[offset..offset + count].copy_from_slice(&buf[..count]);
        count
    }

    fn length(&self) -> usize {
        self.inode.data.lock().len()
    }

    fn reopen(&self) -> Option<Arc<dyn File>> {
        let inode = &self.inode;
        inode
            .open_handles
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < inode.max_handles).then_some(open + 1)
            })
            .ok()?;
        Some(Arc::new(MemFile {
            inode: inode.clone(),
        }))
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.inode.open_handles.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_rejects_out_of_range() {
        let disk = MemDisk::new(2);
        let mut buf = [0; SECTOR_SIZE];
        assert_eq!(disk.read_sector(2, &mut buf), Err(BlockError::OutOfRange));
        assert_eq!(disk.write_sector(5, &buf), Err(BlockError::OutOfRange));
        assert_eq!(disk.sector_writes(), 0);
    }

    #[test]
    fn disk_round_trips_sectors() {
        let disk = MemDisk::new(4);
        let mut buf = [7; SECTOR_SIZE];
        disk.write_sector(3, &buf).unwrap();
        buf = [0; SECTOR_SIZE];
        disk.read_sector(3, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 7));
        assert_eq!(disk.sector_writes(), 1);
    }

    #[test]
    fn file_reads_short_at_end() {
        let file = MemFile::new(b"hello");
        let mut buf = [0; 8];
        assert_eq!(file.read_at(&mut buf, 2), 3);
        assert_eq!(&buf[..3], b"llo");
        assert_eq!(file.read_at(&mut buf, 9), 0);
    }

    #[test]
    fn file_does_not_grow() {
        let file = MemFile::new(b"abc");
        assert_eq!(file.write_at(b"xyz!", 1), 2);
        assert_eq!(file.contents(), b"axy");
        assert_eq!(file.write_calls(), 1);
    }

    #[test]
    fn reopened_handles_share_contents_and_respect_limit() {
        let file = MemFile::with_handle_limit(b"abc", 2);
        let second = file.reopen().unwrap();
        assert!(file.reopen().is_none());
        second.write_at(b"Z", 0);
        assert_eq!(file.contents(), b"Zbc");

        drop(second);
        assert_eq!(file.open_handles(), 1);
        assert!(file.reopen().is_some());
    }
}
