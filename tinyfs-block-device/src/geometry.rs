//! Device geometry shared by the adapters.

use crate::DeviceError;

/// Write and erase granularity of a device plus its block count.
///
/// The device size is always an exact multiple of the erase block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    write_block_size: u64,
    erase_block_size: u64,
    block_count: u64,
}

impl Geometry {
    /// Validates and creates a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidGeometry`] if a size is zero, the erase
    /// block is not a power of two, or the write block does not divide the
    /// erase block.
    pub fn new(
        write_block_size: u64,
        erase_block_size: u64,
        block_count: u64,
    ) -> Result<Self, DeviceError> {
        if write_block_size == 0 {
            return Err(DeviceError::InvalidGeometry("write block size is zero"));
        }
        if !erase_block_size.is_power_of_two() {
            return Err(DeviceError::InvalidGeometry(
                "erase block size must be a power of two",
            ));
        }
        if erase_block_size % write_block_size != 0 {
            return Err(DeviceError::InvalidGeometry(
                "write block size must divide the erase block size",
            ));
        }
        if block_count == 0 {
            return Err(DeviceError::InvalidGeometry("block count is zero"));
        }
        if erase_block_size.checked_mul(block_count).is_none() {
            return Err(DeviceError::InvalidGeometry("device size overflows"));
        }
        Ok(Self {
            write_block_size,
            erase_block_size,
            block_count,
        })
    }

    /// Preferred write granularity in bytes.
    #[inline]
    pub fn write_block_size(&self) -> u64 {
        self.write_block_size
    }

    /// Erase granularity in bytes.
    #[inline]
    pub fn erase_block_size(&self) -> u64 {
        self.erase_block_size
    }

    /// Number of erase blocks.
    #[inline]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Total size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.erase_block_size * self.block_count
    }

    /// Absolute byte offset of the first byte of `block`.
    #[inline]
    pub fn block_offset(&self, block: u64) -> u64 {
        block * self.erase_block_size
    }

    /// Checks that `len` bytes at `offset` lie inside the device.
    pub fn check_range(&self, offset: u64, len: u64) -> Result<(), DeviceError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(DeviceError::OutOfBounds {
                offset,
                len,
                size: self.size(),
            }),
        }
    }

    /// Checks that blocks `start..start + count` exist.
    pub fn check_blocks(&self, start: u64, count: u64) -> Result<(), DeviceError> {
        match start.checked_add(count) {
            Some(end) if end <= self.block_count => Ok(()),
            _ => Err(DeviceError::OutOfBounds {
                offset: start.saturating_mul(self.erase_block_size),
                len: count.saturating_mul(self.erase_block_size),
                size: self.size(),
            }),
        }
    }
}
