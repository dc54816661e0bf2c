//! Host file backed block device.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use tinyfs_block_device::{BlockDevice, DeviceError, Geometry, Syncer};

/// Block device backed by a host file.
///
/// All I/O is positioned at absolute offsets; the file cursor is never used.
/// The device size comes from the configured geometry, not from the live
/// file length.
///
/// The erased value is `0x00`. Reads past the current end of the file are
/// zero-filled, so an unwritten region of a sparse or short image reads the
/// same as an erased one.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    blank_block: Vec<u8>,
    geometry: Geometry,
}

impl FileDevice {
    /// Value of every byte after an erase.
    pub const ERASED_BYTE: u8 = 0x00;

    /// Wraps an already opened read/write file.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidGeometry`] for an invalid layout.
    pub fn new(
        file: File,
        page_size: usize,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, DeviceError> {
        let geometry = Geometry::new(page_size as u64, block_size as u64, block_count as u64)?;
        Ok(Self {
            file,
            blank_block: vec![Self::ERASED_BYTE; block_size],
            geometry,
        })
    }

    /// Opens (creating if needed) the image at `path` and extends it to the
    /// configured size. Existing contents are kept.
    pub fn create<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let device = Self::new(file, page_size, block_size, block_count)?;
        if device.file.metadata()?.len() < device.geometry.size() {
            #[cfg(feature = "log")]
            log::debug!("file device: extending image to {} bytes", device.geometry.size());
            device.file.set_len(device.geometry.size())?;
        }
        Ok(device)
    }

    /// Device geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Consumes the device and returns the file.
    pub fn into_inner(self) -> File {
        self.file
    }

    fn erase_block(&mut self, block: u64) -> Result<(), DeviceError> {
        write_all_at(&self.file, &self.blank_block, self.geometry.block_offset(block))?;
        Ok(())
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        let mut filled = 0;
        while filled < buf.len() {
            match pread(&self.file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        // Past the end of the image
        buf[filled..].fill(Self::ERASED_BYTE);
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, DeviceError> {
        self.geometry.check_range(offset, buf.len() as u64)?;
        write_all_at(&self.file, buf, offset)?;
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
            self.erase_block(block)?;
        }
        Ok(())
    }

    fn as_syncer(&mut self) -> Option<&mut dyn Syncer> {
        Some(self)
    }
}

impl Syncer for FileDevice {
    fn sync(&mut self) -> Result<(), DeviceError> {
        self.file.sync_data()?;
        Ok(())
    }
}

fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match pwrite(file, buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 512;
    const COUNT: usize = 8;

    fn device() -> FileDevice {
        let file = tempfile::tempfile().unwrap();
        FileDevice::new(file, 64, BLOCK, COUNT).unwrap()
    }

    #[test]
    fn test_size_comes_from_geometry() {
        let dev = device();
        assert_eq!(dev.size(), (BLOCK * COUNT) as u64);
        assert_eq!(dev.file.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_short_file_reads_as_erased() {
        let mut dev = device();
        let mut buf = [0xAAu8; BLOCK];
        assert_eq!(dev.read_at(&mut buf, BLOCK as u64).unwrap(), BLOCK);
        assert!(buf.iter().all(|&b| b == FileDevice::ERASED_BYTE));
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut dev = device();
        dev.write_at(b"tinyfs", 700).unwrap();
        let mut buf = [0u8; 6];
        dev.read_at(&mut buf, 700).unwrap();
        assert_eq!(&buf, b"tinyfs");
    }

    #[test]
    fn test_erase_writes_zero_blocks() {
        let mut dev = device();
        dev.write_at(&[0x77u8; BLOCK * 2], 0).unwrap();
        dev.erase_blocks(1, 1).unwrap();

        let mut buf = [0u8; BLOCK * 2];
        dev.read_at(&mut buf, 0).unwrap();
        assert!(buf[..BLOCK].iter().all(|&b| b == 0x77));
        assert!(buf[BLOCK..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_out_of_range_fails() {
        let mut dev = device();
        assert!(dev.write_at(&[1, 2], (BLOCK * COUNT) as u64 - 1).is_err());
        assert!(dev.erase_blocks(COUNT as u64, 1).is_err());
    }

    #[test]
    fn test_sync_capability() {
        let mut dev = device();
        dev.write_at(&[1, 2, 3], 0).unwrap();
        dev.as_syncer().expect("file device syncs").sync().unwrap();
    }

    #[test]
    fn test_create_extends_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        {
            let mut dev = FileDevice::create(&path, 64, BLOCK, COUNT).unwrap();
            dev.write_at(b"keep", 0).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), (BLOCK * COUNT) as u64);

        // Reopening keeps existing contents
        let mut dev = FileDevice::create(&path, 64, BLOCK, COUNT).unwrap();
        let mut buf = [0u8; 4];
        dev.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"keep");
    }
}
