//! Anonymous pages.
//!
//! Memory with no file behind it: stacks, heaps, and loaded executable segments once they have
//! been read in. Evicted contents go to swap.

use crate::{
    error::SwapError,
    swap::{SwapSlot, SwapTable},
};

/// State of an anonymous page that has been brought in at least once.
#[derive(Debug, Default)]
pub struct AnonPage {
    /// Where the contents live while the page is swapped out.
    slot: Option<SwapSlot>,
}

impl AnonPage {
    /// A page with no swapped-out contents.
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Returns the swap slot holding this page, if it is swapped out.
    pub fn slot(&self) -> Option<SwapSlot> {
        self.slot
    }

    /// Fills `frame` from swap if swapped out, or with zeros otherwise. The slot is freed.
    pub fn swap_in(&mut self, frame: &mut [u8], swap: &mut SwapTable) -> Result<(), SwapError> {
        match self.slot {
            Some(slot) => {
                swap.swap_in(slot, frame)?;
                self.slot = None;
            }
            None => frame.fill(0),
        }
        Ok(())
    }

    /// Writes `frame` to a fresh swap slot.
    ///
    /// # Panics
    /// Panics if swap is exhausted: anonymous memory has nowhere else to go.
    pub fn swap_out(&mut self, frame: &[u8], swap: &mut SwapTable) {
        debug_assert!(self.slot.is_none(), "resident page still holds a swap slot");
        match swap.swap_out(frame) {
            Ok(slot) => self.slot = Some(slot),
            Err(err) => panic!("cannot evict anonymous page: {}", err),
        }
    }

    /// Releases the swap slot, if any. Contents are discarded.
    pub fn destroy(&mut self, swap: &mut SwapTable) {
        if let Some(slot) = self.slot.take() {
            swap.free(slot);
        }
    }
}
