//! littlefs engine.
//!
//! Wraps the littlefs C library. All memory littlefs works with (read and
//! program caches, the lookahead bitmap, per-file caches) is allocated here;
//! the library itself never allocates.
//!
//! ```no_run
//! use tinyfs::littlefs::{LfsConfig, Littlefs};
//! use tinyfs::{Error, Filesystem};
//! use tinyfs_adapters::MemoryDevice;
//!
//! # fn main() -> Result<(), Error> {
//! let mut fs = Littlefs::new(MemoryDevice::new(64, 4096, 64)?);
//! fs.configure(LfsConfig::default())?;
//! match fs.mount() {
//!     Err(Error::Corrupt) => {
//!         fs.format()?;
//!         fs.mount()?;
//!     }
//!     other => other?,
//! }
//! fs.mkdir("/logs")?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod error;
mod file;

use core::ffi::{CStr, c_int};
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};

use littlefs2_sys as ll;
use tinyfs_block_device::BlockDevice;

use crate::fs::{FileType, Filesystem, Info, OpenFlags};
use crate::registry::{self, Handle, Registration, SharedDevice, Volume, lock};
use crate::{Error, Result};

pub use error::LfsError;
pub use file::LfsFile;

use error::check;

const LFS_O_RDONLY: c_int = 1;
const LFS_O_WRONLY: c_int = 2;
const LFS_O_CREAT: c_int = 0x0100;
const LFS_O_EXCL: c_int = 0x0200;
const LFS_O_TRUNC: c_int = 0x0400;
const LFS_O_APPEND: c_int = 0x0800;

const LFS_TYPE_DIR: u8 = 2;

const MIN_BLOCK_SIZE: u64 = 128;

/// Engine tuning parameters.
///
/// Read and program sizes, block size and block count are always taken
/// from the device geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LfsConfig {
    /// Size of the read, program and per-file caches in bytes. Must be a
    /// multiple of the device write block size and divide the erase block
    /// size.
    pub cache_size: u32,
    /// Size of the lookahead bitmap in bytes; a multiple of 8. Each byte
    /// tracks 8 blocks.
    pub lookahead_size: u32,
    /// Erase cycles before metadata is relocated. Negative disables
    /// block-level wear levelling.
    pub block_cycles: i32,
}

impl Default for LfsConfig {
    fn default() -> Self {
        Self {
            cache_size: 128,
            lookahead_size: 128,
            block_cycles: 500,
        }
    }
}

/// Device-derived geometry after validation.
#[derive(Debug, Clone, Copy)]
struct LfsGeometry {
    read_size: u64,
    block_size: u64,
    block_count: u64,
}

fn validate(config: &LfsConfig, device: &dyn BlockDevice) -> Result<LfsGeometry> {
    let read_size = device.write_block_size();
    let block_size = device.erase_block_size();
    if read_size == 0 || block_size == 0 {
        return Err(Error::Configuration("device reports a zero block size"));
    }
    let block_count = device.size() / block_size;
    if block_size < MIN_BLOCK_SIZE {
        return Err(Error::Configuration("erase block size must be at least 128 bytes"));
    }
    if block_count < 2 {
        return Err(Error::Configuration("device must hold at least two blocks"));
    }
    if block_size > u64::from(u32::MAX) || block_count > u64::from(u32::MAX) {
        return Err(Error::Configuration("device geometry exceeds 32-bit addressing"));
    }
    let cache_size = u64::from(config.cache_size);
    if cache_size == 0 || cache_size % read_size != 0 {
        return Err(Error::Configuration(
            "cache size must be a non-zero multiple of the write block size",
        ));
    }
    if block_size % cache_size != 0 {
        return Err(Error::Configuration("cache size must divide the erase block size"));
    }
    if config.lookahead_size == 0 || config.lookahead_size % 8 != 0 {
        return Err(Error::Configuration("lookahead size must be a non-zero multiple of 8"));
    }
    if config.block_cycles == 0 {
        return Err(Error::Configuration("block cycles must not be zero"));
    }
    Ok(LfsGeometry {
        read_size,
        block_size,
        block_count,
    })
}

/// Word-aligned scratch memory handed to littlefs.
fn buffer(bytes: usize) -> Box<[u32]> {
    vec![0u32; bytes.div_ceil(4)].into_boxed_slice()
}

fn c_path(path: &str) -> Result<CString> {
    CString::new(path).map_err(|_| Error::InvalidArgument)
}

fn lfs_flags(flags: OpenFlags) -> c_int {
    let mut result = 0;
    if flags.readable() {
        result |= LFS_O_RDONLY;
    }
    if flags.writable() {
        result |= LFS_O_WRONLY;
    }
    if flags.contains(OpenFlags::CREATE) {
        result |= LFS_O_CREAT;
    }
    if flags.contains(OpenFlags::EXCLUSIVE) {
        result |= LFS_O_EXCL;
    }
    if flags.contains(OpenFlags::TRUNCATE) {
        result |= LFS_O_TRUNC;
    }
    if flags.contains(OpenFlags::APPEND) {
        result |= LFS_O_APPEND;
    }
    result
}

pub(crate) fn info_from_native(info: &ll::lfs_info) -> Info {
    // SAFETY: littlefs always NUL-terminates entry names
    let name = unsafe { CStr::from_ptr(info.name.as_ptr()) };
    let kind = if info.type_ == LFS_TYPE_DIR {
        FileType::Dir
    } else {
        FileType::File
    };
    Info::new(name.to_string_lossy(), u64::from(info.size), kind)
}

/// Native littlefs state plus every buffer it points into.
pub(crate) struct LfsState {
    lfs: Box<ll::lfs_t>,
    cfg: Box<ll::lfs_config>,
    _read_buffer: Box<[u32]>,
    _prog_buffer: Box<[u32]>,
    _lookahead_buffer: Box<[u32]>,
    cache_size: usize,
    geometry: LfsGeometry,
    volume: Arc<Volume>,
    session: Option<Registration>,
    /// Files open under the current session, synced on unmount
    open_files: Vec<*mut ll::lfs_file_t>,
}

// SAFETY: the raw pointers only reference heap memory owned by this struct,
// and all access goes through the owning Mutex.
unsafe impl Send for LfsState {}

impl LfsState {
    fn new(config: &LfsConfig, geometry: LfsGeometry, device: SharedDevice) -> Self {
        let cache_size = config.cache_size as usize;
        let mut read_buffer = buffer(cache_size);
        let mut prog_buffer = buffer(cache_size);
        let mut lookahead_buffer = buffer(config.lookahead_size as usize);

        // SAFETY: lfs_config and lfs_t are plain C data; all-zero is their
        // documented initial state
        let mut cfg: Box<ll::lfs_config> = Box::new(unsafe { core::mem::zeroed() });
        let lfs: Box<ll::lfs_t> = Box::new(unsafe { core::mem::zeroed() });

        cfg.read = Some(bridge::read);
        cfg.prog = Some(bridge::prog);
        cfg.erase = Some(bridge::erase);
        cfg.sync = Some(bridge::sync);
        cfg.read_size = geometry.read_size as ll::lfs_size_t;
        cfg.prog_size = geometry.read_size as ll::lfs_size_t;
        cfg.block_size = geometry.block_size as ll::lfs_size_t;
        cfg.block_count = geometry.block_count as ll::lfs_size_t;
        cfg.cache_size = config.cache_size;
        cfg.lookahead_size = config.lookahead_size;
        cfg.block_cycles = config.block_cycles;
        cfg.read_buffer = read_buffer.as_mut_ptr().cast();
        cfg.prog_buffer = prog_buffer.as_mut_ptr().cast();
        cfg.lookahead_buffer = lookahead_buffer.as_mut_ptr().cast();

        Self {
            lfs,
            cfg,
            _read_buffer: read_buffer,
            _prog_buffer: prog_buffer,
            _lookahead_buffer: lookahead_buffer,
            cache_size,
            geometry,
            volume: Arc::new(Volume::new(device, geometry.block_size)),
            session: None,
            open_files: Vec::new(),
        }
    }

    fn lfs(&mut self) -> *mut ll::lfs_t {
        &mut *self.lfs
    }

    /// Registers the volume and points the callback context at it.
    fn begin_session(&mut self) -> Registration {
        let registration = registry::register(Arc::clone(&self.volume));
        self.cfg.context = registration.handle().as_ptr();
        registration
    }

    fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    /// Handle of the current mount.
    fn mounted(&self) -> Result<Handle> {
        self.session
            .as_ref()
            .map(Registration::handle)
            .ok_or(Error::NotMounted)
    }

    /// Checks that handles opened under `mount` are still valid.
    pub(crate) fn check_session(&self, mount: Handle) -> Result<()> {
        match &self.session {
            Some(session) if session.handle() == mount => Ok(()),
            _ => Err(Error::BadHandle),
        }
    }

    fn format(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let _session = self.begin_session();
        let lfs = self.lfs();
        // SAFETY: lfs and cfg are live boxed allocations owned by self
        check(unsafe { ll::lfs_format(lfs, &*self.cfg) })?;
        debug!("lfs: formatted {} blocks", self.geometry.block_count);
        Ok(())
    }

    fn mount(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let session = self.begin_session();
        let lfs = self.lfs();
        // SAFETY: see format
        check(unsafe { ll::lfs_mount(lfs, &*self.cfg) })?;
        debug!("lfs: mounted as handle {:?}", session.handle());
        self.session = Some(session);
        Ok(())
    }

    /// Syncs every open file, then unmounts. Handles opened under this
    /// session go stale either way; the first failure is returned.
    fn unmount(&mut self) -> Result<()> {
        self.mounted()?;
        let mut result = Ok(());
        for file in core::mem::take(&mut self.open_files) {
            let lfs = self.lfs();
            // SAFETY: open files are boxed by their LfsFile and only leave
            // this list when closed
            if let Err(e) = check(unsafe { ll::lfs_file_sync(lfs, file) }) {
                warn!("lfs: syncing open file on unmount failed: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        let lfs = self.lfs();
        // SAFETY: the filesystem is mounted
        let unmounted = check(unsafe { ll::lfs_unmount(lfs) });
        self.session = None;
        result?;
        unmounted?;
        Ok(())
    }

    fn stat(&mut self, path: &CString) -> Result<Info> {
        self.mounted()?;
        // SAFETY: lfs_info is plain data
        let mut info: ll::lfs_info = unsafe { core::mem::zeroed() };
        let lfs = self.lfs();
        check(unsafe { ll::lfs_stat(lfs, path.as_ptr(), &mut info) })?;
        Ok(info_from_native(&info))
    }

    fn mkdir(&mut self, path: &CString) -> Result<()> {
        self.mounted()?;
        let lfs = self.lfs();
        check(unsafe { ll::lfs_mkdir(lfs, path.as_ptr()) })?;
        Ok(())
    }

    fn remove(&mut self, path: &CString) -> Result<()> {
        self.mounted()?;
        let lfs = self.lfs();
        check(unsafe { ll::lfs_remove(lfs, path.as_ptr()) })?;
        Ok(())
    }

    fn rename(&mut self, old_path: &CString, new_path: &CString) -> Result<()> {
        self.mounted()?;
        let lfs = self.lfs();
        check(unsafe { ll::lfs_rename(lfs, old_path.as_ptr(), new_path.as_ptr()) })?;
        Ok(())
    }

    /// Blocks in use, best effort: shared copy-on-write structures may be
    /// counted twice.
    fn used_blocks(&mut self) -> Result<u64> {
        self.mounted()?;
        let lfs = self.lfs();
        let used = check(unsafe { ll::lfs_fs_size(lfs) })?;
        Ok(used as u64)
    }
}

impl Drop for LfsState {
    fn drop(&mut self) {
        if self.is_mounted() {
            if let Err(e) = self.unmount() {
                warn!("lfs: unmount on drop failed: {}", e);
            }
        }
    }
}

/// A littlefs volume on a block device.
pub struct Littlefs {
    device: SharedDevice,
    state: Option<Arc<Mutex<LfsState>>>,
}

impl Littlefs {
    /// Wraps `device`. Call [`configure`](Self::configure) before
    /// formatting or mounting.
    pub fn new<D: BlockDevice + 'static>(device: D) -> Self {
        let device: Box<dyn BlockDevice> = Box::new(device);
        Self {
            device: Arc::new(Mutex::new(device)),
            state: None,
        }
    }

    /// Validates `config` against the device geometry and allocates the
    /// engine state. No device I/O happens here.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for invalid combinations,
    /// [`Error::AlreadyMounted`] while mounted.
    pub fn configure(&mut self, config: LfsConfig) -> Result<()> {
        if self.is_mounted() {
            return Err(Error::AlreadyMounted);
        }
        let geometry = validate(&config, &**lock(&self.device))?;
        debug!(
            "lfs: configured {} blocks of {} bytes, cache {}",
            geometry.block_count, geometry.block_size, config.cache_size
        );
        let state = LfsState::new(&config, geometry, Arc::clone(&self.device));
        self.state = Some(Arc::new(Mutex::new(state)));
        Ok(())
    }

    /// Number of blocks currently allocated.
    pub fn used_blocks(&self) -> Result<u64> {
        lock(self.shared()?).used_blocks()
    }

    /// Erase block size used as the littlefs block.
    pub fn block_size(&self) -> Result<u64> {
        Ok(lock(self.shared()?).geometry.block_size)
    }

    /// Number of blocks on the volume.
    pub fn block_count(&self) -> Result<u64> {
        Ok(lock(self.shared()?).geometry.block_count)
    }

    fn shared(&self) -> Result<&Arc<Mutex<LfsState>>> {
        self.state.as_ref().ok_or(Error::NotConfigured)
    }

    fn state(&self) -> Result<MutexGuard<'_, LfsState>> {
        self.shared().map(|state| lock(state))
    }
}

impl Filesystem for Littlefs {
    type File = LfsFile;

    fn format(&mut self) -> Result<()> {
        self.state()?.format()
    }

    fn mount(&mut self) -> Result<()> {
        self.state()?.mount()
    }

    fn unmount(&mut self) -> Result<()> {
        self.state()?.unmount()
    }

    fn is_mounted(&self) -> bool {
        self.state().is_ok_and(|state| state.is_mounted())
    }

    fn open_file(&self, path: &str, flags: OpenFlags) -> Result<LfsFile> {
        let shared = self.shared()?;
        let cpath = c_path(path)?;
        let mut state = lock(shared);
        let mount = state.mounted()?;

        let mut info = Info::new(path, 0, FileType::File);
        match state.stat(&cpath) {
            Ok(found) => {
                info.size = found.size;
                info.kind = found.kind;
            }
            Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        let handle = if info.is_dir() {
            file::NativeHandle::open_dir(&mut state, &cpath)?
        } else {
            file::NativeHandle::open_file(&mut state, &cpath, lfs_flags(flags))?
        };
        trace!("lfs: opened {} ({:?})", path, info.kind);
        Ok(LfsFile::new(Arc::clone(shared), mount, flags, info, handle))
    }

    fn mkdir(&mut self, path: &str) -> Result<()> {
        let cpath = c_path(path)?;
        self.state()?.mkdir(&cpath)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        let cpath = c_path(path)?;
        self.state()?.remove(&cpath)
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()> {
        let (old, new) = (c_path(old_path)?, c_path(new_path)?);
        self.state()?.rename(&old, &new)
    }

    fn stat(&self, path: &str) -> Result<Info> {
        let cpath = c_path(path)?;
        self.state()?.stat(&cpath)
    }

    fn free(&self) -> Result<u64> {
        let mut state = self.state()?;
        let used = state.used_blocks()?;
        let geometry = state.geometry;
        Ok(geometry.block_count.saturating_sub(used) * geometry.block_size)
    }
}

impl Drop for Littlefs {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state() {
            if state.is_mounted() {
                if let Err(e) = state.unmount() {
                    warn!("lfs: unmount on drop failed: {}", e);
                }
            }
        }
    }
}
