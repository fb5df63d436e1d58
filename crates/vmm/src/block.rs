//! Block device interface.

use crate::{error::BlockError, layout::SECTOR_SIZE};

/// Index of a sector on a block device.
pub type Sector = usize;

/// A device made of fixed-size sectors. The swap area lives on one.
pub trait BlockDevice: Send + Sync {
    /// Number of sectors on the device.
    fn sector_count(&self) -> usize;

    /// Reads one sector into `buf`.
    fn read_sector(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), BlockError>;

    /// Writes one sector from `buf`.
    fn write_sector(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), BlockError>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for alloc::sync::Arc<T> {
    fn sector_count(&self) -> usize {
        (**self).sector_count()
    }

    fn read_sector(&self, sector: Sector, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        (**self).read_sector(sector, buf)
    }

    fn write_sector(&self, sector: Sector, buf: &[u8; SECTOR_SIZE]) -> Result<(), BlockError> {
        (**self).write_sector(sector, buf)
    }
}
