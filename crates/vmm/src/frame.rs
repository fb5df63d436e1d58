//! Per-frame metadata for the user pool.

use core::sync::atomic::{AtomicU64, Ordering};

/// Holds metadata for one frame of the user pool.
///
/// Ownership (which page lives in the frame) is tracked by the frame table; this only carries
/// the state bits the pool and the eviction clock need.
#[derive(Default)]
pub struct Frame {
    /// Flags identifying the state of this frame.
    pub flags: FrameFlags,
}

impl Frame {
    /// Returns true if the frame is handed out.
    pub fn is_allocated(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Allocated)
    }

    /// Returns true if the frame must not be chosen as an eviction victim.
    pub fn is_pinned(&self) -> bool {
        self.flags.atomic_test(FrameFlag::Pinned)
    }

    /// Pins or unpins the frame.
    pub fn set_pinned(&self, pinned: bool) {
        if pinned {
            self.flags.atomic_set(FrameFlag::Pinned);
        } else {
            self.flags.atomic_clear(FrameFlag::Pinned);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlag {
    /// Frame is allocated.
    Allocated = 1 << 0,
    /// Frame is being copied out of and must stay resident.
    Pinned = 1 << 1,
}

/// Atomic flags for a user frame.
#[derive(Default)]
pub struct FrameFlags(AtomicU64);

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with all flags cleared.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Sets the given flag non-atomically (by holding a mutable reference).
    pub fn set(&mut self, flag: FrameFlag) {
        *self.0.get_mut() |= flag as u64;
    }

    /// Clears the given flag non-atomically (by holding a mutable reference).
    pub fn clear(&mut self, flag: FrameFlag) {
        *self.0.get_mut() &= !(flag as u64);
    }

    /// Tests if the given flag is set, non-atomically (by holding a mutable reference).
    pub fn test(&mut self, flag: FrameFlag) -> bool {
        (*self.0.get_mut() & flag as u64) != 0
    }

    /// Sets the given flag atomically.
    pub fn atomic_set(&self, flag: FrameFlag) {
        self.0.fetch_or(flag as u64, Ordering::AcqRel);
    }

    /// Clears the given flag atomically.
    pub fn atomic_clear(&self, flag: FrameFlag) {
        self.0.fetch_and(!(flag as u64), Ordering::AcqRel);
    }

    /// Tests if the given flag is set, atomically.
    pub fn atomic_test(&self, flag: FrameFlag) -> bool {
        (self.0.load(Ordering::Acquire) & flag as u64) != 0
    }
}
