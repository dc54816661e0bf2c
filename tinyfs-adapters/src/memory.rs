//! RAM-backed block device.

use alloc::vec;
use alloc::vec::Vec;

use tinyfs_block_device::{BlockDevice, DeviceError, Geometry};

/// Block device backed by a byte buffer.
///
/// The whole buffer starts erased (`0xFF`), and erasing copies a pre-built
/// blank block over the addressed range, so engines see exactly the same
/// bytes they would on freshly erased NOR flash. Erase-before-write is not
/// enforced; that discipline belongs to the engine.
///
/// Accesses outside the device fail with [`DeviceError::OutOfBounds`]; no
/// partial reads or writes are ever performed.
///
/// # Example
///
/// ```
/// use tinyfs_adapters::{BlockDevice, MemoryDevice};
///
/// let mut dev = MemoryDevice::new(64, 4096, 64).unwrap();
/// assert_eq!(dev.size(), 4096 * 64);
///
/// dev.write_at(b"hello", 10).unwrap();
/// let mut buf = [0u8; 5];
/// dev.read_at(&mut buf, 10).unwrap();
/// assert_eq!(&buf, b"hello");
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    memory: Vec<u8>,
    blank_block: Vec<u8>,
    geometry: Geometry,
}

impl MemoryDevice {
    /// Value of every byte after an erase.
    pub const ERASED_BYTE: u8 = 0xFF;

    /// Creates an erased device of `block_count` blocks of `block_size` bytes.
    ///
    /// `page_size` is reported as the write block size.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidGeometry`] if the sizes do not describe a
    /// valid flash layout.
    pub fn new(page_size: usize, block_size: usize, block_count: usize) -> Result<Self, DeviceError> {
        let geometry = Geometry::new(page_size as u64, block_size as u64, block_count as u64)?;
        Ok(Self {
            memory: vec![Self::ERASED_BYTE; block_size * block_count],
            blank_block: vec![Self::ERASED_BYTE; block_size],
            geometry,
        })
    }

    /// Device geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Raw contents of the whole device.
    pub fn as_slice(&self) -> &[u8] {
        &self.memory
    }

    fn erase_block(&mut self, block: u64) {
        let start = self.geometry.block_offset(block) as usize;
        let end = start + self.blank_block.len();
        self.memory[start..end].copy_from_slice(&self.blank_block);
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.memory[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        let start = offset as usize;
        self.memory[start..start + buf.len()].copy_from_slice(buf);
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
        for block in start..start + count {
            self.erase_block(block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 64;
    const BLOCK: usize = 256;
    const COUNT: usize = 16;

    fn device() -> MemoryDevice {
        MemoryDevice::new(PAGE, BLOCK, COUNT).unwrap()
    }

    #[test]
    fn test_new_device_is_erased() {
        let dev = device();
        assert!(dev.as_slice().iter().all(|&b| b == MemoryDevice::ERASED_BYTE));
        assert_eq!(dev.size(), (BLOCK * COUNT) as u64);
        assert_eq!(dev.write_block_size(), PAGE as u64);
        assert_eq!(dev.erase_block_size(), BLOCK as u64);
    }

    #[test]
    fn test_erase_resets_every_block_to_blank() {
        let mut dev = device();
        let junk = [0x5Au8; BLOCK];
        for block in 0..COUNT as u64 {
            dev.write_at(&junk, block * BLOCK as u64).unwrap();
        }
        for block in 0..COUNT as u64 {
            dev.erase_blocks(block, 1).unwrap();
            let mut buf = [0u8; BLOCK];
            dev.read_at(&mut buf, block * BLOCK as u64).unwrap();
            assert!(buf.iter().all(|&b| b == 0xFF), "block {} not blank", block);
        }
    }

    #[test]
    fn test_erase_leaves_neighbours_alone() {
        let mut dev = device();
        dev.write_at(&[0u8; BLOCK * 3], 0).unwrap();
        dev.erase_blocks(1, 1).unwrap();

        let mem = dev.as_slice();
        assert!(mem[..BLOCK].iter().all(|&b| b == 0));
        assert!(mem[BLOCK..2 * BLOCK].iter().all(|&b| b == 0xFF));
        assert!(mem[2 * BLOCK..3 * BLOCK].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut dev = device();
        dev.erase_blocks(2, 3).unwrap();
        dev.erase_blocks(2, 3).unwrap();
        assert!(dev.as_slice().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_read_round_trip_inside_block() {
        let mut dev = device();
        let data: Vec<u8> = (0..100u8).collect();
        dev.write_at(&data, 3 * BLOCK as u64 + 17).unwrap();

        let mut buf = vec![0u8; data.len()];
        assert_eq!(dev.read_at(&mut buf, 3 * BLOCK as u64 + 17).unwrap(), data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn test_out_of_range_access_fails() {
        let mut dev = device();
        let size = dev.size();
        let mut buf = [0u8; 8];
        assert!(matches!(
            dev.read_at(&mut buf, size - 4),
            Err(DeviceError::OutOfBounds { .. })
        ));
        assert!(dev.write_at(&buf, size).is_err());
        assert!(dev.erase_blocks(COUNT as u64 - 1, 2).is_err());
        // Nothing was written by the failed calls
        assert!(dev.as_slice().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(MemoryDevice::new(64, 1000, 4).is_err());
        assert!(MemoryDevice::new(0, 256, 4).is_err());
    }

    #[test]
    fn test_memory_device_has_no_syncer() {
        let mut dev = device();
        assert!(dev.as_syncer().is_none());
    }
}
