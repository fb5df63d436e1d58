//! Swap slot allocator.
//!
//! The swap device is carved into page-sized slots of [`SECTORS_PER_PAGE`] sectors each. A
//! bitmap records which slots hold a swapped-out page.

use alloc::{boxed::Box, vec, vec::Vec};
use core::fmt;

use crate::{
    block::BlockDevice,
    error::{BlockError, SwapError},
    layout::{PAGE_SIZE, SECTOR_SIZE, SECTORS_PER_PAGE},
};

/// Index of a page-sized slot on the swap device.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapSlot(usize);

impl SwapSlot {
    /// Returns the slot index.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the first sector of this slot.
    pub const fn first_sector(self) -> usize {
        self.0 * SECTORS_PER_PAGE
    }
}

impl fmt::Debug for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapSlot({})", self.0)
    }
}

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed-size bitmap. Set bits are occupied.
struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    fn get(&self, index: usize) -> bool {
        self.words[index / 64] >> (index % 64) & 1 != 0
    }

    fn set(&mut self, index: usize, value: bool) {
        let mask = 1 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    /// Finds the first clear bit, sets it, and returns its index.
    fn scan_and_flip(&mut self) -> Option<usize> {
        let (word, bits) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, bits)| **bits != u64::MAX)?;
        let index = word * 64 + bits.trailing_ones() as usize;
        if index >= self.len {
            return None;
        }
        self.set(index, true);
        Some(index)
    }

    fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Allocates page-sized slots on the swap device and moves pages in and out of them.
pub struct SwapTable {
    device: Box<dyn BlockDevice>,
    used: Bitmap,
}

impl SwapTable {
    /// Creates a swap table covering the whole device. Trailing sectors that do not fill a slot
    /// are unused.
    pub fn new(device: impl BlockDevice + 'static) -> Self {
        let slots = device.sector_count() / SECTORS_PER_PAGE;
        log::debug!("swap: {} slots", slots);
        Self {
            device: Box::new(device),
            used: Bitmap::new(slots),
        }
    }

    /// Creates a swap table with no slots, for systems without a swap device.
    pub fn empty() -> Self {
        Self::new(NoDevice)
    }

    /// Writes a page to a newly allocated slot and returns the slot.
    ///
    /// # Panics
    /// Panics if `page` is not exactly one page.
    pub fn swap_out(&mut self, page: &[u8]) -> Result<SwapSlot, SwapError> {
        assert_eq!(page.len(), PAGE_SIZE, "swap transfers whole pages");
        let slot = SwapSlot(self.used.scan_and_flip().ok_or(SwapError::Full)?);
        let (sectors, _) = page.as_chunks::<SECTOR_SIZE>();
        for (i, sector) in sectors.iter().enumerate() {
            if let Err(err) = self.device.write_sector(slot.first_sector() + i, sector) {
                self.used.set(slot.0, false);
                return Err(err.into());
            }
        }
        log::trace!("swap: wrote slot {}", slot);
        Ok(slot)
    }

    /// Reads a slot into `page` without freeing it.
    ///
    /// # Panics
    /// Panics if the slot is not occupied or `page` is not exactly one page.
    pub fn read(&self, slot: SwapSlot, page: &mut [u8]) -> Result<(), SwapError> {
        assert_eq!(page.len(), PAGE_SIZE, "swap transfers whole pages");
        assert!(self.is_occupied(slot), "reading a free swap slot");
        let (sectors, _) = page.as_chunks_mut::<SECTOR_SIZE>();
        for (i, sector) in sectors.iter_mut().enumerate() {
            self.device.read_sector(slot.first_sector() + i, sector)?;
        }
        Ok(())
    }

    /// Reads a slot into `page` and frees it.
    pub fn swap_in(&mut self, slot: SwapSlot, page: &mut [u8]) -> Result<(), SwapError> {
        self.read(slot, page)?;
        self.free(slot);
        log::trace!("swap: read back slot {}", slot);
        Ok(())
    }

    /// Frees a slot without reading it.
    ///
    /// # Panics
    /// Panics if the slot is not occupied.
    pub fn free(&mut self, slot: SwapSlot) {
        assert!(self.is_occupied(slot), "freeing a free swap slot");
        self.used.set(slot.0, false);
    }

    /// Returns true if the slot holds a page.
    pub fn is_occupied(&self, slot: SwapSlot) -> bool {
        slot.0 < self.used.len && self.used.get(slot.0)
    }

    /// Total number of slots.
    pub fn slot_count(&self) -> usize {
        self.used.len
    }

    /// Number of unoccupied slots.
    pub fn free_slots(&self) -> usize {
        self.used.len - self.used.count_ones()
    }
}

/// A device with no sectors.
struct NoDevice;

impl BlockDevice for NoDevice {
    fn sector_count(&self) -> usize {
        0
    }

    fn read_sector(
        &self,
        _sector: usize,
        _buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), BlockError> {
        Err(BlockError::OutOfRange)
    }

    fn write_sector(
        &self,
        _sector: usize,
        _buf: &[u8; SECTOR_SIZE],
    ) -> Result<(), BlockError> {
        Err(BlockError::OutOfRange)
    }
}
