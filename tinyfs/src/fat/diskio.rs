//! Sector-addressed disk layer.
//!
//! The FAT engine sees the volume as a byte stream ([`DiskStream`]); the
//! stream turns every access into whole-sector [`disk_read`] and
//! [`disk_write`] calls, addressed by the registry [`Handle`] of the mount
//! session. Partial sectors are read, patched and written back.

use std::io;
use std::sync::Arc;

use aligned::{A4, Aligned};

use crate::registry::{self, Handle, Volume};

/// Largest supported sector size.
pub(crate) const MAX_SECTOR_SIZE: usize = 4096;

/// Disk function result (`RES_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskResult {
    /// RES_OK
    Ok = 0,
    /// RES_ERROR: read/write error
    Error = 1,
    /// RES_WRPRT: write protected
    WriteProtected = 2,
    /// RES_NOTRDY: not ready
    NotReady = 3,
    /// RES_PARERR: invalid parameter
    ParameterError = 4,
}

impl DiskResult {
    fn into_result(self) -> Result<(), DiskResult> {
        match self {
            DiskResult::Ok => Ok(()),
            err => Err(err),
        }
    }
}

/// Disk control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ioctl {
    /// Complete pending writes
    CtrlSync,
    /// Number of sectors on the volume
    GetSectorCount,
    /// Sector size in bytes
    GetSectorSize,
    /// Erase block size in sectors
    GetBlockSize,
    /// Sectors are no longer in use
    CtrlTrim,
    /// Initialise the drive
    Init,
    /// Drive status
    Status,
    /// A command this layer does not know
    Unknown(u8),
}

impl Ioctl {
    /// Decodes a native command code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::CtrlSync,
            1 => Self::GetSectorCount,
            2 => Self::GetSectorSize,
            3 => Self::GetBlockSize,
            4 => Self::CtrlTrim,
            101 => Self::Init,
            102 => Self::Status,
            other => Self::Unknown(other),
        }
    }
}

/// Data returned by [`disk_ioctl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlReply {
    /// Command executed, nothing to report
    Done,
    /// Reply to [`Ioctl::GetSectorCount`]
    SectorCount(u32),
    /// Reply to [`Ioctl::GetSectorSize`]
    SectorSize(u16),
    /// Reply to [`Ioctl::GetBlockSize`]
    BlockSize(u32),
    /// Reply to [`Ioctl::Init`] and [`Ioctl::Status`]; zero is ready
    Status(u8),
}

/// A disk result carried through an [`io::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskFailure(pub DiskResult);

impl core::fmt::Display for DiskFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "disk error: {:?}", self.0)
    }
}

impl std::error::Error for DiskFailure {}

impl From<DiskFailure> for io::Error {
    fn from(failure: DiskFailure) -> Self {
        io::Error::new(io::ErrorKind::Other, failure)
    }
}

fn volume(drv: Handle) -> Result<Arc<Volume>, DiskResult> {
    registry::lookup(drv).ok_or_else(|| {
        error!("fat: no volume registered for drive {:?}", drv);
        DiskResult::NotReady
    })
}

fn sector_span(volume: &Volume, buf_len: usize, sector: u64, count: u32) -> Result<u64, DiskResult> {
    let len = volume.unit() * u64::from(count);
    if count == 0 || buf_len as u64 != len {
        return Err(DiskResult::ParameterError);
    }
    Ok(volume.offset_of(sector, 0))
}

/// Reads `count` sectors starting at `sector`. `buf` must hold exactly
/// `count` sectors.
pub(crate) fn disk_read(drv: Handle, buf: &mut [u8], sector: u64, count: u32) -> DiskResult {
    trace!("disk_read: sector={} count={}", sector, count);
    let result = volume(drv).and_then(|volume| {
        let addr = sector_span(&volume, buf.len(), sector, count)?;
        volume.device().read_at(buf, addr).map(drop).map_err(|e| {
            error!("disk_read error: {}", e);
            DiskResult::Error
        })
    });
    result.err().unwrap_or(DiskResult::Ok)
}

/// Writes `count` sectors starting at `sector`.
pub(crate) fn disk_write(drv: Handle, buf: &[u8], sector: u64, count: u32) -> DiskResult {
    trace!("disk_write: sector={} count={}", sector, count);
    let result = volume(drv).and_then(|volume| {
        let addr = sector_span(&volume, buf.len(), sector, count)?;
        volume.device().write_at(buf, addr).map(drop).map_err(|e| {
            error!("disk_write error: {}", e);
            DiskResult::Error
        })
    });
    result.err().unwrap_or(DiskResult::Ok)
}

/// Disk control. Commands without an effect on this layer succeed.
pub(crate) fn disk_ioctl(drv: Handle, cmd: Ioctl) -> Result<IoctlReply, DiskResult> {
    trace!("disk_ioctl: {:?}", cmd);
    let volume = volume(drv)?;
    let sector_size = volume.unit();
    let mut device = volume.device();
    let reply = match cmd {
        Ioctl::CtrlSync => {
            if let Some(syncer) = device.as_syncer() {
                syncer.sync().map_err(|e| {
                    error!("disk sync error: {}", e);
                    DiskResult::Error
                })?;
            }
            IoctlReply::Done
        }
        Ioctl::GetSectorCount => {
            let count = device.size() / sector_size;
            IoctlReply::SectorCount(u32::try_from(count).map_err(|_| DiskResult::ParameterError)?)
        }
        Ioctl::GetSectorSize => {
            IoctlReply::SectorSize(u16::try_from(sector_size).map_err(|_| DiskResult::ParameterError)?)
        }
        Ioctl::GetBlockSize => {
            let sectors = (device.erase_block_size() / sector_size).max(1);
            IoctlReply::BlockSize(u32::try_from(sectors).unwrap_or(u32::MAX))
        }
        Ioctl::Init | Ioctl::Status => IoctlReply::Status(0),
        Ioctl::CtrlTrim | Ioctl::Unknown(_) => IoctlReply::Done,
    };
    Ok(reply)
}

/// Byte stream over the sectors of one mount session.
pub(crate) struct DiskStream {
    drv: Handle,
    sector_size: u64,
    size: u64,
    pos: u64,
    scratch: Aligned<A4, [u8; MAX_SECTOR_SIZE]>,
}

impl DiskStream {
    /// Initialises the drive and queries its geometry.
    pub(crate) fn open(drv: Handle) -> Result<Self, DiskResult> {
        if let IoctlReply::Status(status) = disk_ioctl(drv, Ioctl::Init)? {
            if status != 0 {
                return Err(DiskResult::NotReady);
            }
        }
        let IoctlReply::SectorSize(sector_size) = disk_ioctl(drv, Ioctl::GetSectorSize)? else {
            return Err(DiskResult::ParameterError);
        };
        let IoctlReply::SectorCount(count) = disk_ioctl(drv, Ioctl::GetSectorCount)? else {
            return Err(DiskResult::ParameterError);
        };
        let sector_size = u64::from(sector_size);
        if sector_size == 0 || sector_size as usize > MAX_SECTOR_SIZE {
            return Err(DiskResult::ParameterError);
        }
        Ok(Self {
            drv,
            sector_size,
            size: u64::from(count) * sector_size,
            pos: 0,
            scratch: Aligned([0; MAX_SECTOR_SIZE]),
        })
    }

    pub(crate) fn sector_count(&self) -> u32 {
        (self.size / self.sector_size) as u32
    }

    pub(crate) fn sector_size(&self) -> u16 {
        self.sector_size as u16
    }

    fn load_scratch(&mut self, sector: u64) -> io::Result<()> {
        let len = self.sector_size as usize;
        read_sectors(self.drv, self.sector_size, &mut self.scratch[..len], sector)
    }

    fn store_scratch(&mut self, sector: u64) -> io::Result<()> {
        let len = self.sector_size as usize;
        write_sectors(self.drv, self.sector_size, &self.scratch[..len], sector)
    }
}

fn read_sectors(drv: Handle, sector_size: u64, buf: &mut [u8], sector: u64) -> io::Result<()> {
    let count = (buf.len() as u64 / sector_size) as u32;
    disk_read(drv, buf, sector, count)
        .into_result()
        .map_err(|e| DiskFailure(e).into())
}

fn write_sectors(drv: Handle, sector_size: u64, buf: &[u8], sector: u64) -> io::Result<()> {
    let count = (buf.len() as u64 / sector_size) as u32;
    disk_write(drv, buf, sector, count)
        .into_result()
        .map_err(|e| DiskFailure(e).into())
}

impl io::Read for DiskStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        let len = (buf.len() as u64).min(remaining) as usize;
        if len == 0 {
            return Ok(0);
        }
        let ss = self.sector_size;
        let sector = self.pos / ss;
        let offset = (self.pos % ss) as usize;

        let n = if offset == 0 && len as u64 >= ss {
            let whole = (len as u64 / ss * ss) as usize;
            read_sectors(self.drv, ss, &mut buf[..whole], sector)?;
            whole
        } else {
            self.load_scratch(sector)?;
            let n = len.min(ss as usize - offset);
            buf[..n].copy_from_slice(&self.scratch[offset..offset + n]);
            n
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl io::Write for DiskStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.size.saturating_sub(self.pos);
        let len = (buf.len() as u64).min(remaining) as usize;
        if len == 0 {
            return Ok(0);
        }
        let ss = self.sector_size;
        let sector = self.pos / ss;
        let offset = (self.pos % ss) as usize;

        let n = if offset == 0 && len as u64 >= ss {
            let whole = (len as u64 / ss * ss) as usize;
            write_sectors(self.drv, ss, &buf[..whole], sector)?;
            whole
        } else {
            let n = len.min(ss as usize - offset);
            self.load_scratch(sector)?;
            self.scratch[offset..offset + n].copy_from_slice(&buf[..n]);
            self.store_scratch(sector)?;
            n
        };
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        disk_ioctl(self.drv, Ioctl::CtrlSync)
            .map(drop)
            .map_err(|e| DiskFailure(e).into())
    }
}

impl io::Seek for DiskStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(n) => Some(n),
            io::SeekFrom::Current(n) => self.pos.checked_add_signed(n),
            io::SeekFrom::End(n) => self.size.checked_add_signed(n),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of disk")
        })?;
        self.pos = target;
        Ok(target)
    }
}
