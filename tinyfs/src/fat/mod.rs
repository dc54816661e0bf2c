//! FAT12/16/32 engine.
//!
//! Built on the `fatfs` crate. The engine talks to the device through
//! sector calls resolved via the handle registry, so a mounted volume holds
//! nothing but its session handle.
//!
//! Handles do not keep engine objects open between calls: each operation
//! reopens the entry by path, which keeps [`FatFile`] free of borrows into
//! the mounted filesystem.

mod diskio;
mod error;
mod file;
mod time;

use std::io::Write as _;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use fatfs::{FormatVolumeOptions, FsOptions};
use tinyfs_block_device::BlockDevice;

use crate::fs::{FileType, Filesystem, Info, OpenFlags};
use crate::registry::{self, Handle, Registration, SharedDevice, Volume, lock};
use crate::{Error, Result};

pub use diskio::{DiskFailure, DiskResult, Ioctl, IoctlReply};
pub use error::FatResult;
pub use file::FatFile;
pub use time::{FatTimestamp, get_fattime};

use diskio::{DiskStream, MAX_SECTOR_SIZE};
use error::{from_io, is_disk_failure};

pub(crate) type FatFileSystem = fatfs::FileSystem<DiskStream>;

const MIN_SECTOR_SIZE: u64 = 512;

bitflags! {
    /// FAT directory entry attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FatAttributes: u8 {
        /// Read only
        const READ_ONLY = 0x01;
        /// Hidden
        const HIDDEN = 0x02;
        /// System
        const SYSTEM = 0x04;
        /// Volume label
        const VOLUME_ID = 0x08;
        /// Directory
        const DIRECTORY = 0x10;
        /// Archive
        const ARCHIVE = 0x20;
    }
}

/// FAT variant of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    /// 12-bit allocation table
    Fat12,
    /// 16-bit allocation table
    Fat16,
    /// 32-bit allocation table
    Fat32,
}

impl From<fatfs::FatType> for FatType {
    fn from(fat_type: fatfs::FatType) -> Self {
        match fat_type {
            fatfs::FatType::Fat12 => Self::Fat12,
            fatfs::FatType::Fat16 => Self::Fat16,
            fatfs::FatType::Fat32 => Self::Fat32,
        }
    }
}

impl core::fmt::Display for FatType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Fat12 => "FAT12",
            Self::Fat16 => "FAT16",
            Self::Fat32 => "FAT32",
        })
    }
}

/// FAT engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatConfig {
    /// Sector size in bytes: a power of two between 512 and 4096 that
    /// divides the device size.
    pub sector_size: u16,
}

impl Default for FatConfig {
    fn default() -> Self {
        Self { sector_size: 512 }
    }
}

fn validate(config: &FatConfig, device: &dyn BlockDevice) -> Result<()> {
    let sector_size = u64::from(config.sector_size);
    if !sector_size.is_power_of_two()
        || !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE as u64).contains(&sector_size)
    {
        return Err(Error::Configuration(
            "sector size must be a power of two between 512 and 4096",
        ));
    }
    let size = device.size();
    if size == 0 || size % sector_size != 0 {
        return Err(Error::Configuration("sector size must divide the device size"));
    }
    if size / sector_size > u64::from(u32::MAX) {
        return Err(Error::Configuration("device has more than 2^32 sectors"));
    }
    Ok(())
}

const FA_READ: u8 = 0x01;
const FA_WRITE: u8 = 0x02;
const FA_OPEN_EXISTING: u8 = 0x00;
const FA_CREATE_NEW: u8 = 0x04;
const FA_CREATE_ALWAYS: u8 = 0x08;
const FA_OPEN_ALWAYS: u8 = 0x10;
const FA_OPEN_APPEND: u8 = 0x30;

/// Translates open flags into an `FA_*` mode byte.
fn fa_mode(flags: OpenFlags) -> u8 {
    let mut mode = FA_OPEN_EXISTING;
    if flags.readable() {
        mode |= FA_READ;
    }
    if flags.writable() {
        mode |= FA_WRITE;
    }
    let create = flags.contains(OpenFlags::CREATE);
    mode |= if create && flags.contains(OpenFlags::EXCLUSIVE) {
        FA_CREATE_NEW
    } else if flags.contains(OpenFlags::TRUNCATE) {
        FA_CREATE_ALWAYS
    } else if flags.contains(OpenFlags::APPEND) {
        FA_OPEN_APPEND
    } else if create {
        FA_OPEN_ALWAYS
    } else {
        FA_OPEN_EXISTING
    };
    mode
}

/// What to do with the path, decoded from a mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    OpenExisting,
    CreateNew,
    CreateAlways,
    OpenAlways,
    OpenAppend,
}

impl Disposition {
    fn from_mode(mode: u8) -> Self {
        if mode & FA_CREATE_NEW != 0 {
            Self::CreateNew
        } else if mode & FA_CREATE_ALWAYS != 0 {
            Self::CreateAlways
        } else if mode & FA_OPEN_APPEND == FA_OPEN_APPEND {
            Self::OpenAppend
        } else if mode & FA_OPEN_ALWAYS != 0 {
            Self::OpenAlways
        } else {
            Self::OpenExisting
        }
    }
}

/// Engine paths are relative to the root directory.
pub(crate) fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

pub(crate) fn open_dir<'a>(fs: &'a FatFileSystem, path: &str) -> Result<fatfs::Dir<'a, DiskStream>> {
    let path = normalize(path);
    let root = fs.root_dir();
    if path.is_empty() {
        Ok(root)
    } else {
        root.open_dir(path).map_err(from_io)
    }
}

pub(crate) fn entry_info(entry: &fatfs::DirEntry<'_, DiskStream>) -> Info {
    let (size, kind) = if entry.is_dir() {
        (0, FileType::Dir)
    } else {
        (entry.len(), FileType::File)
    };
    let mut info = Info::new(entry.file_name(), size, kind);
    info.attributes = Some(FatAttributes::from_bits_truncate(entry.attributes().bits()));
    info.modified = Some(FatTimestamp::from(entry.modified()));
    info
}

/// Looks `path` up in its parent directory. Names compare case-insensitively.
pub(crate) fn stat_in(fs: &FatFileSystem, path: &str) -> Result<Info> {
    let path = normalize(path);
    if path.is_empty() {
        let mut info = Info::new("/", 0, FileType::Dir);
        info.attributes = Some(FatAttributes::DIRECTORY);
        return Ok(info);
    }
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    for entry in open_dir(fs, parent)?.iter() {
        let entry = entry.map_err(from_io)?;
        if entry.file_name().eq_ignore_ascii_case(name) {
            return Ok(entry_info(&entry));
        }
    }
    Err(Error::NotFound)
}

/// A mounted engine together with the registry entry its stream resolves.
pub(crate) struct FatState {
    fs: FatFileSystem,
    id: Handle,
    _registration: Registration,
}

// SAFETY: the engine's time provider is a `'static` stateless value; the
// filesystem itself is only reached through the owning Mutex.
unsafe impl Send for FatState {}

pub(crate) type SharedState = Arc<Mutex<Option<FatState>>>;

/// Runs `op` on the filesystem if the volume is still mounted under `mount`.
pub(crate) fn with_session<T>(
    state: &SharedState,
    mount: Handle,
    op: impl FnOnce(&FatFileSystem) -> Result<T>,
) -> Result<T> {
    let guard = lock(state);
    match guard.as_ref() {
        Some(session) if session.id == mount => op(&session.fs),
        _ => Err(Error::BadHandle),
    }
}

fn disk_error(result: DiskResult) -> Error {
    FatResult::from(result).into()
}

/// A FAT volume on a block device.
pub struct FatFs {
    device: SharedDevice,
    config: Option<FatConfig>,
    state: SharedState,
}

impl FatFs {
    /// Wraps `device`. Call [`configure`](Self::configure) before
    /// formatting or mounting.
    pub fn new<D: BlockDevice + 'static>(device: D) -> Self {
        let device: Box<dyn BlockDevice> = Box::new(device);
        Self {
            device: Arc::new(Mutex::new(device)),
            config: None,
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Validates `config` against the device. No device I/O happens here.
    pub fn configure(&mut self, config: FatConfig) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        validate(&config, &**lock(&self.device))?;
        debug!("fat: configured with {} byte sectors", config.sector_size);
        self.config = Some(config);
        Ok(())
    }

    /// FAT variant of the mounted volume.
    pub fn fat_type(&self) -> Result<FatType> {
        let guard = lock(&self.state);
        let state = guard.as_ref().ok_or(Error::NotMounted)?;
        Ok(state.fs.fat_type().into())
    }

    /// Registers a session and opens a stream on it.
    fn session(&self) -> Result<(Registration, DiskStream)> {
        let config = self.config.ok_or(Error::NotConfigured)?;
        let volume = Volume::new(Arc::clone(&self.device), u64::from(config.sector_size));
        let registration = registry::register(Arc::new(volume));
        let stream = DiskStream::open(registration.handle()).map_err(disk_error)?;
        Ok((registration, stream))
    }

    fn mounted<T>(&self, op: impl FnOnce(&FatFileSystem) -> Result<T>) -> Result<T> {
        let guard = lock(&self.state);
        let state = guard.as_ref().ok_or(Error::NotMounted)?;
        op(&state.fs)
    }
}

impl Filesystem for FatFs {
    type File = FatFile;

    fn format(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let (_registration, mut stream) = self.session()?;
        let options = FormatVolumeOptions::new()
            .bytes_per_sector(stream.sector_size())
            .total_sectors(stream.sector_count());
        fatfs::format_volume(&mut stream, options).map_err(|e| {
            debug!("fat: format failed: {}", e);
            if is_disk_failure(&e) {
                FatResult::DiskErr.into()
            } else {
                Error::from(FatResult::MkfsAborted)
            }
        })?;
        stream.flush().map_err(from_io)?;
        debug!("fat: formatted {} sectors", stream.sector_count());
        Ok(())
    }

    fn mount(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let (registration, stream) = self.session()?;
        let options = FsOptions::new().time_provider(&time::TIME_PROVIDER);
        let fs = fatfs::FileSystem::new(stream, options).map_err(|e| {
            debug!("fat: mount failed: {}", e);
            if is_disk_failure(&e) {
                Error::from(FatResult::DiskErr)
            } else {
                FatResult::NoFilesystem.into()
            }
        })?;
        let id = registration.handle();
        debug!("fat: mounted {} volume as handle {:?}", FatType::from(fs.fat_type()), id);
        *lock(&self.state) = Some(FatState {
            fs,
            id,
            _registration: registration,
        });
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        let state = lock(&self.state).take().ok_or(Error::NotMounted)?;
        let FatState {
            fs,
            _registration: registration,
            ..
        } = state;
        let result = fs.unmount().map_err(from_io);
        drop(registration);
        result
    }

    fn is_mounted(&self) -> bool {
        lock(&self.state).is_some()
    }

    fn open_file(&self, path: &str, flags: OpenFlags) -> Result<FatFile> {
        let guard = lock(&self.state);
        let state = guard.as_ref().ok_or(Error::NotMounted)?;
        let fs = &state.fs;

        let existing = match stat_in(fs, path) {
            Ok(info) => Some(info),
            Err(Error::NotFound) => None,
            Err(e) => return Err(e),
        };
        if let Some(mut info) = existing.clone().filter(Info::is_dir) {
            info.name = path.into();
            return Ok(FatFile::new(Arc::clone(&self.state), state.id, flags, info, 0));
        }

        let disposition = Disposition::from_mode(fa_mode(flags));
        match (disposition, existing.is_some()) {
            (Disposition::OpenExisting, false) => return Err(Error::NotFound),
            (Disposition::CreateNew, true) => return Err(Error::AlreadyExists),
            _ => {}
        }

        let target = normalize(path);
        let root = fs.root_dir();
        if existing.is_some() {
            let mut file = root.open_file(target).map_err(from_io)?;
            if disposition == Disposition::CreateAlways {
                file.truncate().map_err(from_io)?;
                file.flush().map_err(from_io)?;
            }
        } else {
            let mut file = root.create_file(target).map_err(from_io)?;
            file.flush().map_err(from_io)?;
        }

        let mut info = stat_in(fs, path)?;
        info.name = path.into();
        let pos = if disposition == Disposition::OpenAppend {
            info.size
        } else {
            0
        };
        trace!("fat: opened {} ({:?})", path, disposition);
        Ok(FatFile::new(Arc::clone(&self.state), state.id, flags, info, pos))
    }

    fn mkdir(&mut self, path: &str) -> Result<()> {
        self.mounted(|fs| {
            match stat_in(fs, path) {
                Ok(_) => return Err(Error::AlreadyExists),
                Err(Error::NotFound) => {}
                Err(e) => return Err(e),
            }
            fs.root_dir().create_dir(normalize(path)).map_err(from_io)?;
            Ok(())
        })
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        self.mounted(|fs| {
            let target = normalize(path);
            if target.is_empty() {
                return Err(Error::InvalidArgument);
            }
            fs.root_dir().remove(target).map_err(from_io)
        })
    }

    fn rename(&mut self, _old_path: &str, _new_path: &str) -> Result<()> {
        Err(FatResult::NotImplemented.into())
    }

    fn stat(&self, path: &str) -> Result<Info> {
        self.mounted(|fs| stat_in(fs, path))
    }

    fn free(&self) -> Result<u64> {
        self.mounted(|fs| {
            let stats = fs.stats().map_err(from_io)?;
            Ok(u64::from(stats.free_clusters()) * u64::from(stats.cluster_size()))
        })
    }
}

impl Drop for FatFs {
    fn drop(&mut self) {
        if self.is_mounted() {
            if let Err(e) = self.unmount() {
                warn!("fat: unmount on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::File;
    use tinyfs_adapters::MemoryDevice;

    fn mounted() -> FatFs {
        let mut fs = FatFs::new(MemoryDevice::new(64, 4096, 64).unwrap());
        fs.configure(FatConfig::default()).unwrap();
        fs.format().unwrap();
        fs.mount().unwrap();
        fs
    }

    #[test]
    fn test_config_validation() {
        let mut fs = FatFs::new(MemoryDevice::new(64, 4096, 64).unwrap());
        for sector_size in [0, 256, 768, 8192] {
            let config = FatConfig { sector_size };
            assert!(matches!(fs.configure(config), Err(Error::Configuration(_))));
        }
        fs.configure(FatConfig { sector_size: 4096 }).unwrap();

        // 3 x 512 bytes is not a whole number of 1024-byte sectors
        let mut odd = FatFs::new(MemoryDevice::new(64, 512, 3).unwrap());
        assert!(matches!(
            odd.configure(FatConfig { sector_size: 1024 }),
            Err(Error::Configuration(_))
        ));
        odd.configure(FatConfig::default()).unwrap();
    }

    #[test]
    fn test_requires_configure() {
        let mut fs = FatFs::new(MemoryDevice::new(64, 4096, 64).unwrap());
        assert!(matches!(fs.format(), Err(Error::NotConfigured)));
        assert!(matches!(fs.mount(), Err(Error::NotConfigured)));
    }

    #[test]
    fn test_fa_mode_table() {
        let w = OpenFlags::WRITE;
        let rw = OpenFlags::READ | OpenFlags::WRITE;
        let create = OpenFlags::CREATE;
        assert_eq!(fa_mode(OpenFlags::READ), FA_READ);
        assert_eq!(fa_mode(OpenFlags::empty()), FA_READ);
        assert_eq!(fa_mode(w | create | OpenFlags::TRUNCATE), FA_CREATE_ALWAYS | FA_WRITE);
        assert_eq!(fa_mode(w | create | OpenFlags::APPEND), FA_OPEN_APPEND | FA_WRITE);
        assert_eq!(fa_mode(rw), FA_READ | FA_WRITE);
        assert_eq!(
            fa_mode(rw | create | OpenFlags::TRUNCATE),
            FA_CREATE_ALWAYS | FA_WRITE | FA_READ
        );
        assert_eq!(
            fa_mode(rw | create | OpenFlags::APPEND),
            FA_OPEN_APPEND | FA_WRITE | FA_READ
        );
        assert_eq!(fa_mode(w | create | OpenFlags::EXCLUSIVE), FA_CREATE_NEW | FA_WRITE);
        assert_eq!(fa_mode(w | create), FA_OPEN_ALWAYS | FA_WRITE);
    }

    #[test]
    fn test_disposition_decoding() {
        assert_eq!(Disposition::from_mode(FA_READ), Disposition::OpenExisting);
        assert_eq!(Disposition::from_mode(FA_OPEN_APPEND | FA_WRITE), Disposition::OpenAppend);
        assert_eq!(Disposition::from_mode(FA_OPEN_ALWAYS), Disposition::OpenAlways);
        assert_eq!(Disposition::from_mode(FA_CREATE_NEW), Disposition::CreateNew);
    }

    #[test]
    fn test_unformatted_mount_is_corrupt() {
        let mut fs = FatFs::new(MemoryDevice::new(64, 4096, 64).unwrap());
        fs.configure(FatConfig::default()).unwrap();
        assert!(matches!(fs.mount(), Err(Error::Corrupt)));
        assert!(!fs.is_mounted());
    }

    #[test]
    fn test_root_stat_and_type() {
        let fs = mounted();
        let root = fs.stat("/").unwrap();
        assert!(root.is_dir());
        assert_eq!(root.name, "/");
        assert_eq!(fs.fat_type().unwrap(), FatType::Fat12);
        assert_eq!(FatType::Fat32.to_string(), "FAT32");
    }

    #[test]
    fn test_open_dispositions() {
        let fs = mounted();
        assert!(matches!(fs.open("/missing"), Err(Error::NotFound)));

        let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
        let mut file = fs.open_file("/new.txt", flags).unwrap();
        File::write(&mut file, b"0123456789").unwrap();
        file.close().unwrap();
        assert!(matches!(fs.open_file("/new.txt", flags), Err(Error::AlreadyExists)));

        let mut append = fs
            .open_file("/new.txt", OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND)
            .unwrap();
        assert_eq!(append.tell().unwrap(), 10);
        File::write(&mut append, b"ab").unwrap();
        assert_eq!(fs.stat("/NEW.TXT").unwrap().size, 12);

        let truncated = fs
            .open_file("/new.txt", OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)
            .unwrap();
        assert_eq!(truncated.stat().size, 0);
    }

    #[test]
    fn test_mkdir_remove_rename() {
        let mut fs = mounted();
        fs.mkdir("/logs").unwrap();
        assert!(matches!(fs.mkdir("/logs"), Err(Error::AlreadyExists)));
        let info = fs.stat("/logs").unwrap();
        assert!(info.is_dir());
        assert!(info.attributes.unwrap().contains(FatAttributes::DIRECTORY));
        assert!(info.modified.is_some());

        let mut f = fs.open_file("/logs/a", OpenFlags::WRITE | OpenFlags::CREATE).unwrap();
        f.close().unwrap();
        assert!(matches!(fs.remove("/logs"), Err(Error::DirectoryNotEmpty)));
        fs.remove("/logs/a").unwrap();
        fs.remove("/logs").unwrap();
        assert!(matches!(fs.stat("/logs"), Err(Error::NotFound)));

        assert!(matches!(fs.rename("/a", "/b"), Err(Error::NotImplemented)));
    }

    #[test]
    fn test_unmount_releases_session() {
        let mut fs = mounted();
        fs.unmount().unwrap();
        assert!(!fs.is_mounted());
        assert!(matches!(fs.stat("/"), Err(Error::NotMounted)));
        assert!(matches!(fs.unmount(), Err(Error::NotMounted)));
        fs.mount().unwrap();
    }
}
