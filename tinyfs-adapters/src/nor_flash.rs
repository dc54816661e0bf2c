//! NOR flash adapter for embedded-storage traits
//!
//! Wraps any type implementing the `embedded-storage` NOR flash traits and
//! exposes a region of it as a [`BlockDevice`]. The flash's own erase sector
//! becomes the device erase block, so engines erase exactly what the chip
//! erases.
//!
//! # Example
//!
//! ```ignore
//! use esp_storage::FlashStorage;
//! use tinyfs_adapters::{NorFlashDevice, NorFlashRegion};
//!
//! // 256KB at the end of a 4MB chip
//! let region = NorFlashRegion::new(0x3C_0000, 64);
//! let device = NorFlashDevice::new(FlashStorage::new(), region)?;
//! ```

use aligned::{A4, Aligned};
use embedded_storage::nor_flash::{
    MultiwriteNorFlash, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use tinyfs_block_device::{BlockDevice, DeviceError, Geometry};

/// Largest flash read/write word the bounce buffer can hold.
const MAX_WORD: usize = 256;

/// Region of a flash chip handed to a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NorFlashRegion {
    /// Start offset in flash, aligned to the chip's erase size
    pub start_offset: u32,
    /// Number of erase sectors in the region
    pub block_count: u32,
}

impl NorFlashRegion {
    /// Creates a region of `block_count` sectors at `start_offset`.
    pub const fn new(start_offset: u32, block_count: u32) -> Self {
        Self {
            start_offset,
            block_count,
        }
    }
}

/// Exposes a NOR flash region as a [`BlockDevice`].
///
/// The erased value is whatever the chip erases to, `0xFF` for NOR flash.
/// Reads of any alignment are bounced through an aligned scratch buffer.
///
/// Writes must cover whole `WRITE_SIZE` words unless the device was built
/// with [`with_multiwrite`](NorFlashDevice::with_multiwrite): a partial word
/// is written by reprogramming the whole word, which only
/// [`MultiwriteNorFlash`] chips allow. Plain [`NorFlash`] chips reject
/// partial-word writes with [`DeviceError::Media`] before anything is
/// programmed.
pub struct NorFlashDevice<F> {
    flash: F,
    region: NorFlashRegion,
    geometry: Geometry,
    partial_words: bool,
    scratch: Aligned<A4, [u8; MAX_WORD]>,
}

impl<F: NorFlash> NorFlashDevice<F> {
    /// Wraps `flash`, exposing only `region`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidGeometry`] if the region is not aligned
    /// to the erase size, does not fit in the chip, or the chip's word sizes
    /// cannot be bounced.
    pub fn new(flash: F, region: NorFlashRegion) -> Result<Self, DeviceError> {
        Self::build(flash, region, false)
    }

    fn build(flash: F, region: NorFlashRegion, partial_words: bool) -> Result<Self, DeviceError> {
        if F::READ_SIZE > MAX_WORD || F::WRITE_SIZE > MAX_WORD {
            return Err(DeviceError::InvalidGeometry("flash word too large"));
        }
        if F::WRITE_SIZE % F::READ_SIZE != 0 {
            return Err(DeviceError::InvalidGeometry(
                "flash read size must divide write size",
            ));
        }
        if region.start_offset as usize % F::ERASE_SIZE != 0 {
            return Err(DeviceError::InvalidGeometry(
                "region start must be erase aligned",
            ));
        }
        let geometry = Geometry::new(
            F::WRITE_SIZE as u64,
            F::ERASE_SIZE as u64,
            region.block_count as u64,
        )?;
        if region.start_offset as u64 + geometry.size() > flash.capacity() as u64 {
            return Err(DeviceError::InvalidGeometry("region exceeds flash capacity"));
        }
        Ok(Self {
            flash,
            region,
            geometry,
            partial_words,
            scratch: Aligned([0; MAX_WORD]),
        })
    }

    /// The configured region.
    pub fn region(&self) -> &NorFlashRegion {
        &self.region
    }

    /// Consumes the device and returns the flash.
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn check_words(&self, offset: u64, len: usize) -> Result<(), DeviceError> {
        let word = F::WRITE_SIZE as u64;
        if self.partial_words || (offset % word == 0 && len as u64 % word == 0) {
            Ok(())
        } else {
            Err(DeviceError::Media("partial word write needs multiwrite flash"))
        }
    }

    #[inline]
    fn flash_offset(&self, offset: u64) -> u32 {
        self.region.start_offset + offset as u32
    }
}

impl<F: MultiwriteNorFlash> NorFlashDevice<F> {
    /// Wraps a flash whose words may be programmed more than once between
    /// erases, enabling byte-granular writes.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn with_multiwrite(flash: F, region: NorFlashRegion) -> Result<Self, DeviceError> {
        Self::build(flash, region, true)
    }
}

fn media<E: NorFlashError>(err: E) -> DeviceError {
    #[cfg(feature = "log")]
    log::error!("nor flash error: {:?}", err.kind());
    match err.kind() {
        NorFlashErrorKind::NotAligned => DeviceError::Media("flash access not aligned"),
        NorFlashErrorKind::OutOfBounds => DeviceError::Media("flash access out of bounds"),
        _ => DeviceError::Media("flash operation failed"),
    }
}

impl<F: NorFlash + Send> BlockDevice for NorFlashDevice<F> {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        let word = F::READ_SIZE;
        let mut addr = self.flash_offset(offset);
        let mut done = 0;
        while done < buf.len() {
            let remaining = buf.len() - done;
            let misalign = addr as usize % word;
            if misalign == 0 && remaining >= word {
                let len = remaining - remaining % word;
                self.flash
                    .read(addr, &mut buf[done..done + len])
                    .map_err(media)?;
                done += len;
                addr += len as u32;
            } else {
                let scratch = &mut self.scratch[..word];
                self.flash
                    .read(addr - misalign as u32, scratch)
                    .map_err(media)?;
                let take = (word - misalign).min(remaining);
                buf[done..done + take].copy_from_slice(&scratch[misalign..misalign + take]);
                done += take;
                addr += take as u32;
            }
        }
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        self.check_words(offset, buf.len())?;
        let word = F::WRITE_SIZE;
        let mut addr = self.flash_offset(offset);
        let mut done = 0;
        while done < buf.len() {
            let remaining = buf.len() - done;
            let misalign = addr as usize % word;
            if misalign == 0 && remaining >= word {
                let len = remaining - remaining % word;
                self.flash
                    .write(addr, &buf[done..done + len])
                    .map_err(media)?;
                done += len;
                addr += len as u32;
            } else {
                // Read-modify-write of a partial word, multiwrite chips only
                let base = addr - misalign as u32;
                let scratch = &mut self.scratch[..word];
                self.flash.read(base, scratch).map_err(media)?;
                let take = (word - misalign).min(remaining);
                scratch[misalign..misalign + take].copy_from_slice(&buf[done..done + take]);
                self.flash.write(base, scratch).map_err(media)?;
                done += take;
                addr += take as u32;
            }
        }
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.geometry.size()
    }

    fn write_block_size(&self) -> u64 {
        self.geometry.write_block_size()
    }

    fn erase_block_size(&self) -> u64 {
        self.geometry.erase_block_size()
    }

    fn erase_blocks(&mut self, start: u64, count: u64) -> Result<(), DeviceError> {
        self.geometry.check_blocks(start, count)?;
        if count == 0 {
            return Ok(());
        }
        let from = self.flash_offset(self.geometry.block_offset(start));
        let to = from + (count * self.geometry.erase_block_size()) as u32;
        self.flash.erase(from, to).map_err(media)
    }
}
