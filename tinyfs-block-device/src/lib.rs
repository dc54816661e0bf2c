//! Block device contract for tinyfs.
//!
//! A [`BlockDevice`] is the raw medium a filesystem engine is stored on: RAM,
//! a host file, or SPI/QSPI NOR flash. It exposes byte-addressed reads and
//! writes plus flash-style erase of whole blocks.
//!
//! The contract deliberately mirrors NOR flash semantics:
//!
//! - writes do not erase implicitly; engines only program erased regions
//! - erase works on whole erase blocks, addressed by index
//! - every adapter documents its erased byte value
//!
//! Buffered media additionally implement [`Syncer`] and advertise it through
//! [`BlockDevice::as_syncer`].

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

mod error;
mod geometry;

pub use error::DeviceError;
pub use geometry::Geometry;

/// A raw device that a filesystem is stored on.
///
/// Offsets are absolute byte offsets. Block indices passed to
/// [`erase_blocks`](BlockDevice::erase_blocks) map to byte offset
/// `block * erase_block_size()`.
pub trait BlockDevice: Send {
    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// Implementations never report partial success silently: a short read is
    /// either zero-filled or an error, as documented per adapter.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError>;

    /// Writes `buf.len()` bytes starting at `offset`.
    ///
    /// The region is not erased first. Callers are responsible for only
    /// programming erased regions on media that require it.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError>;

    /// Total number of addressable bytes. Constant for the device lifetime.
    fn size(&self) -> u64;

    /// Preferred write granularity. Advisory only; unaligned writes still work.
    fn write_block_size(&self) -> u64;

    /// Smallest erasable unit in bytes. Always a power of two.
    fn erase_block_size(&self) -> u64;

    /// Resets `count` blocks starting at block `start` to the erased value.
    ///
    /// Fails fast on the first block that cannot be erased. Blocks inside the
    /// requested range are then in an unspecified state; blocks outside it are
    /// untouched.
    fn erase_blocks(&mut self, start: u64, count: u64) -> Result<(), DeviceError>;

    /// Returns the sync capability if this device buffers writes.
    fn as_syncer(&mut self) -> Option<&mut dyn Syncer> {
        None
    }
}

/// Optional capability of devices that buffer or cache writes.
pub trait Syncer {
    /// Commits any pending or cached operations to the medium.
    fn sync(&mut self) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError> {
        (**self).write_at(buf, offset)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn write_block_size(&self) -> u64 {
        (**self).write_block_size()
    }

    fn erase_block_size(&self) -> u64 {
        (**self).erase_block_size()
    }

    fn erase_blocks(&mut self, start: u64, count: u64) -> Result<(), DeviceError> {
        (**self).erase_blocks(start, count)
    }

    fn as_syncer(&mut self) -> Option<&mut dyn Syncer> {
        (**self).as_syncer()
    }
}

#[cfg(feature = "std")]
impl<D: BlockDevice + ?Sized> BlockDevice for std::boxed::Box<D> {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError> {
        (**self).write_at(buf, offset)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn write_block_size(&self) -> u64 {
        (**self).write_block_size()
    }

    fn erase_block_size(&self) -> u64 {
        (**self).erase_block_size()
    }

    fn erase_blocks(&mut self, start: u64, count: u64) -> Result<(), DeviceError> {
        (**self).erase_blocks(start, count)
    }

    fn as_syncer(&mut self) -> Option<&mut dyn Syncer> {
        (**self).as_syncer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl BlockDevice for Plain {
        fn read_at(&mut self, buf: &mut [u8], _offset: u64) -> Result<usize, DeviceError> {
            Ok(buf.len())
        }

        fn write_at(&mut self, buf: &[u8], _offset: u64) -> Result<usize, DeviceError> {
            Ok(buf.len())
        }

        fn size(&self) -> u64 {
            1024
        }

        fn write_block_size(&self) -> u64 {
            1
        }

        fn erase_block_size(&self) -> u64 {
            256
        }

        fn erase_blocks(&mut self, _start: u64, _count: u64) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct Buffered {
        synced: bool,
    }

    impl Syncer for Buffered {
        fn sync(&mut self) -> Result<(), DeviceError> {
            self.synced = true;
            Ok(())
        }
    }

    impl BlockDevice for Buffered {
        fn read_at(&mut self, buf: &mut [u8], _offset: u64) -> Result<usize, DeviceError> {
            Ok(buf.len())
        }

        fn write_at(&mut self, buf: &[u8], _offset: u64) -> Result<usize, DeviceError> {
            self.synced = false;
            Ok(buf.len())
        }

        fn size(&self) -> u64 {
            1024
        }

        fn write_block_size(&self) -> u64 {
            1
        }

        fn erase_block_size(&self) -> u64 {
            256
        }

        fn erase_blocks(&mut self, _start: u64, _count: u64) -> Result<(), DeviceError> {
            Ok(())
        }

        fn as_syncer(&mut self) -> Option<&mut dyn Syncer> {
            Some(self)
        }
    }

    #[test]
    fn sync_capability_defaults_to_none() {
        let mut dev = Plain;
        assert!(dev.as_syncer().is_none());
    }

    #[test]
    fn sync_capability_through_trait_object() {
        let mut dev: Box<dyn BlockDevice> = Box::new(Buffered { synced: false });
        dev.write_at(&[1, 2, 3], 0).unwrap();
        dev.as_syncer().expect("buffered device syncs").sync().unwrap();
    }
}
