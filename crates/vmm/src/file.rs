//! File interface used by file-backed pages and the segment loader.

use alloc::sync::Arc;

/// Serializes every call into the filesystem.
///
/// The read and write system calls take this lock too, so write-back from eviction never
/// interleaves with a user's own file I/O. It is always the innermost lock.
pub static FILESYS_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// An open file handle.
///
/// Handles are positionless: every access names its offset. Dropping a handle closes it.
pub trait File: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`, returning the number read. Short reads happen
    /// only at end of file.
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize;

    /// Writes `buf` at `offset`, returning the number of bytes written. Files do not grow.
    fn write_at(&self, buf: &[u8], offset: usize) -> usize;

    /// Current length of the file in bytes.
    fn length(&self) -> usize;

    /// Opens an independent handle to the same file, or None if no handle could be opened.
    fn reopen(&self) -> Option<Arc<dyn File>>;
}
