//! Error types.

use core::fmt;

/// Errors from recoverable virtual memory operations (mmap, fork, loading).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The address is null, in kernel space, or the range wraps or leaves user space.
    InvalidAddress,
    /// An address or file offset is not page aligned.
    Misaligned,
    /// A zero-length mapping was requested.
    ZeroLength,
    /// The file has nothing to map.
    EmptyFile,
    /// The range overlaps a page that already exists.
    Overlap,
    /// A page already exists at this address.
    AlreadyMapped,
    /// The file descriptor cannot be mapped or does not exist.
    BadDescriptor,
    /// No more file handles could be opened.
    OutOfFiles,
    /// No frame could be obtained.
    OutOfMemory,
    /// The page contents could not be produced.
    LoadFailed,
    /// Segment sizes do not add up to whole pages.
    InvalidSegment,
    /// The file range runs past the largest representable offset.
    InvalidOffset,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::InvalidAddress => write!(f, "invalid user address"),
            VmError::Misaligned => write!(f, "address or offset not page aligned"),
            VmError::ZeroLength => write!(f, "zero-length mapping"),
            VmError::EmptyFile => write!(f, "file is empty"),
            VmError::Overlap => write!(f, "range overlaps an existing page"),
            VmError::AlreadyMapped => write!(f, "page already present"),
            VmError::BadDescriptor => write!(f, "bad file descriptor"),
            VmError::OutOfFiles => write!(f, "out of file handles"),
            VmError::OutOfMemory => write!(f, "out of memory"),
            VmError::LoadFailed => write!(f, "page contents could not be loaded"),
            VmError::InvalidSegment => write!(f, "segment is not a whole number of pages"),
            VmError::InvalidOffset => write!(f, "file offset out of range"),
        }
    }
}

/// Why a page fault was refused. The faulting process is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The fault address was zero.
    NullAddress,
    /// The fault address is in kernel space.
    KernelAddress,
    /// The page is present but the access is not allowed.
    ProtectionViolation,
    /// Nothing is mapped at the fault address and it is not a stack access.
    Unmapped,
    /// A write to a page that is not writable.
    ReadOnly,
    /// The page could not be brought in.
    LoadFailed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NullAddress => write!(f, "null pointer access"),
            Rejection::KernelAddress => write!(f, "kernel address access"),
            Rejection::ProtectionViolation => write!(f, "protection violation"),
            Rejection::Unmapped => write!(f, "unmapped address"),
            Rejection::ReadOnly => write!(f, "write to read-only page"),
            Rejection::LoadFailed => write!(f, "page could not be loaded"),
        }
    }
}

/// Errors from the block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// The sector is past the end of the device.
    OutOfRange,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::OutOfRange => write!(f, "sector out of range"),
        }
    }
}

/// Errors from the swap slot allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapError {
    /// Every slot is occupied.
    Full,
    /// The swap device failed.
    Device(BlockError),
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapError::Full => write!(f, "swap space exhausted"),
            SwapError::Device(err) => write!(f, "swap device error: {}", err),
        }
    }
}

impl From<BlockError> for SwapError {
    fn from(err: BlockError) -> Self {
        SwapError::Device(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(format!("{}", VmError::Overlap), "range overlaps an existing page");
        assert_eq!(format!("{}", Rejection::ReadOnly), "write to read-only page");
        assert_eq!(
            format!("{}", SwapError::from(BlockError::OutOfRange)),
            "swap device error: sector out of range"
        );
    }
}
