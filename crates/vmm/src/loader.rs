//! Lazy loading of executable segments.

use alloc::boxed::Box;

use crate::{file_backed::FileSlice, page::LazyLoad};

/// Reads one page of an executable segment on first touch.
///
/// The page becomes anonymous once loaded: later evictions go to swap, never back to the
/// executable.
#[derive(Debug)]
pub struct SegmentLoader {
    slice: FileSlice,
}

impl SegmentLoader {
    pub fn new(slice: FileSlice) -> Self {
        Self { slice }
    }
}

impl LazyLoad for SegmentLoader {
    fn load(&self, frame: &mut [u8]) -> bool {
        self.slice.read_into(frame)
    }

    fn duplicate(&self) -> Option<Box<dyn LazyLoad>> {
        Some(Box::new(Self {
            slice: self.slice.duplicate()?,
        }))
    }
}
