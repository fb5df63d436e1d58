//! The user frame pool.
//!
//! Emulated physical memory for user pages: a fixed number of page-sized frames with a free
//! list. Kernel code reaches frame contents directly through [`UserPool::bytes`] and
//! [`UserPool::bytes_mut`], the way a kernel reads frames through its direct map.

use alloc::{vec, vec::Vec};

use crate::{
    FrameNumber, PhysicalAddress,
    frame::{Frame, FrameFlag},
    layout::PAGE_SIZE,
};

/// A fixed pool of user frames.
pub struct UserPool {
    /// Backing bytes, `capacity * PAGE_SIZE` long.
    memory: Vec<u8>,
    /// Metadata, one per frame.
    frames: Vec<Frame>,
    /// Free frames. Popped from the back, so frame 0 is handed out first.
    free: Vec<FrameNumber>,
}

impl UserPool {
    /// Creates a pool of `frame_count` zeroed frames.
    pub fn new(frame_count: usize) -> Self {
        let mut frames = Vec::with_capacity(frame_count);
        frames.resize_with(frame_count, Frame::default);
        Self {
            memory: vec![0; frame_count * PAGE_SIZE],
            frames,
            free: (0..frame_count).rev().map(FrameNumber::new).collect(),
        }
    }

    /// Allocates a frame, or returns None if the pool is exhausted.
    ///
    /// The frame's previous contents are left in place.
    pub fn allocate(&mut self) -> Option<FrameNumber> {
        let frame = self.free.pop()?;
        self.frames[frame.as_usize()].flags.set(FrameFlag::Allocated);
        log::trace!("user pool: allocated frame {}", frame);
        Some(frame)
    }

    /// Returns a frame to the pool.
    ///
    /// # Panics
    /// Panics if the frame is not allocated.
    pub fn free(&mut self, frame: FrameNumber) {
        let meta = &mut self.frames[frame.as_usize()];
        assert!(
            meta.flags.test(FrameFlag::Allocated),
            "freeing a frame that is not allocated"
        );
        meta.flags.clear(FrameFlag::Allocated);
        meta.flags.clear(FrameFlag::Pinned);
        self.free.push(frame);
        log::trace!("user pool: freed frame {}", frame);
    }

    /// Returns the metadata for a frame.
    pub fn frame(&self, frame: FrameNumber) -> &Frame {
        &self.frames[frame.as_usize()]
    }

    /// Returns the contents of a frame.
    pub fn bytes(&self, frame: FrameNumber) -> &[u8] {
        let start = frame.start().as_usize();
        &self.memory[start..start + PAGE_SIZE]
    }

    /// Returns the contents of a frame mutably.
    pub fn bytes_mut(&mut self, frame: FrameNumber) -> &mut [u8] {
        let start = frame.start().as_usize();
        &mut self.memory[start..start + PAGE_SIZE]
    }

    /// Copies the contents of `from` into `to`.
    pub fn copy(&mut self, from: FrameNumber, to: FrameNumber) {
        let src = from.start().as_usize();
        self.memory
            .copy_within(src..src + PAGE_SIZE, to.start().as_usize());
    }

    /// Reads bytes at a physical address. The range must not cross a frame boundary.
    pub fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) {
        let frame = self.bytes(addr.frame_number());
        let offset = addr.as_usize() % PAGE_SIZE;
        buf.copy_from_slice(&frame[offset..offset + buf.len()]);
    }

    /// Writes bytes at a physical address. The range must not cross a frame boundary.
    pub fn write(&mut self, addr: PhysicalAddress, bytes: &[u8]) {
        let offset = addr.as_usize() % PAGE_SIZE;
        let frame = self.bytes_mut(addr.frame_number());
        frame[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Returns the number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_until_exhausted() {
        let mut pool = UserPool::new(2);
        assert_eq!(pool.allocate(), Some(FrameNumber::new(0)));
        assert_eq!(pool.allocate(), Some(FrameNumber::new(1)));
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.free_count(), 0);

        pool.free(FrameNumber::new(0));
        assert_eq!(pool.allocate(), Some(FrameNumber::new(0)));
    }

    #[test]
    #[should_panic(expected = "freeing a frame that is not allocated")]
    fn double_free_panics() {
        let mut pool = UserPool::new(1);
        let frame = pool.allocate().unwrap();
        pool.free(frame);
        pool.free(frame);
    }

    #[test]
    fn copy_and_access() {
        let mut pool = UserPool::new(2);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.bytes_mut(a)[..3].copy_from_slice(b"abc");
        pool.copy(a, b);
        assert_eq!(&pool.bytes(b)[..3], b"abc");

        pool.write(b.start() + 10, b"xyz");
        let mut buf = [0; 3];
        pool.read(b.start() + 10, &mut buf);
        assert_eq!(&buf, b"xyz");
        assert_eq!(&pool.bytes(a)[10..13], &[0, 0, 0]);
    }
}
