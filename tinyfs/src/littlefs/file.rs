use core::ffi::c_int;
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_io::{ErrorType, SeekFrom};
use littlefs2_sys as ll;

use super::error::check;
use super::{LfsState, buffer, info_from_native};
use crate::fs::{File, Info, OpenFlags};
use crate::registry::{Handle, lock};
use crate::{Error, Result};

const LFS_SEEK_SET: c_int = 0;
const LFS_SEEK_CUR: c_int = 1;
const LFS_SEEK_END: c_int = 2;

/// Native handle memory. littlefs links open files into a list on the
/// mounted filesystem, so these allocations must not move until closed.
pub(crate) enum NativeHandle {
    File {
        file: Box<ll::lfs_file_t>,
        _config: Box<ll::lfs_file_config>,
        _cache: Box<[u32]>,
    },
    Dir(Box<ll::lfs_dir_t>),
}

impl NativeHandle {
    pub(crate) fn open_file(state: &mut LfsState, path: &CString, flags: c_int) -> Result<Self> {
        let mut cache = buffer(state.cache_size);
        // SAFETY: plain C data, zero is the expected initial state
        let mut config: Box<ll::lfs_file_config> = Box::new(unsafe { core::mem::zeroed() });
        config.buffer = cache.as_mut_ptr().cast();
        let mut file: Box<ll::lfs_file_t> = Box::new(unsafe { core::mem::zeroed() });

        let lfs = state.lfs();
        // SAFETY: the filesystem is mounted and every pointer targets a
        // boxed allocation that outlives the open handle
        check(unsafe { ll::lfs_file_opencfg(lfs, &mut *file, path.as_ptr(), flags, &*config) })?;
        state.open_files.push(&mut *file);
        Ok(Self::File {
            file,
            _config: config,
            _cache: cache,
        })
    }

    pub(crate) fn open_dir(state: &mut LfsState, path: &CString) -> Result<Self> {
        let mut dir: Box<ll::lfs_dir_t> = Box::new(unsafe { core::mem::zeroed() });
        let lfs = state.lfs();
        check(unsafe { ll::lfs_dir_open(lfs, &mut *dir, path.as_ptr()) })?;
        Ok(Self::Dir(dir))
    }

    fn close(&mut self, state: &mut LfsState) -> Result<()> {
        let lfs = state.lfs();
        match self {
            Self::File { file, .. } => {
                let file: *mut ll::lfs_file_t = &mut **file;
                state.open_files.retain(|&open| open != file);
                check(unsafe { ll::lfs_file_close(lfs, file) })?
            }
            Self::Dir(dir) => check(unsafe { ll::lfs_dir_close(lfs, &mut **dir) })?,
        };
        Ok(())
    }
}

/// An open littlefs file or directory.
pub struct LfsFile {
    state: Arc<Mutex<LfsState>>,
    mount: Handle,
    flags: OpenFlags,
    info: Info,
    handle: Option<NativeHandle>,
}

// SAFETY: native handles are only touched while holding the state lock of
// the filesystem they belong to.
unsafe impl Send for LfsFile {}

impl LfsFile {
    pub(crate) fn new(
        state: Arc<Mutex<LfsState>>,
        mount: Handle,
        flags: OpenFlags,
        info: Info,
        handle: NativeHandle,
    ) -> Self {
        Self {
            state,
            mount,
            flags,
            info,
            handle: Some(handle),
        }
    }

    /// Resets the position to the start of the file.
    pub fn rewind(&mut self) -> Result<()> {
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_rewind(lfs, file) }).map(drop))
    }

    fn session(state: &Arc<Mutex<LfsState>>, mount: Handle) -> Result<MutexGuard<'_, LfsState>> {
        let state = lock(state);
        state.check_session(mount)?;
        Ok(state)
    }

    fn with_file<T>(
        &mut self,
        op: impl FnOnce(*mut ll::lfs_t, *mut ll::lfs_file_t) -> core::result::Result<T, super::LfsError>,
    ) -> Result<T> {
        let file = match self.handle.as_mut() {
            Some(NativeHandle::File { file, .. }) => &mut **file as *mut ll::lfs_file_t,
            Some(NativeHandle::Dir(_)) => return Err(Error::IsADirectory),
            None => return Err(Error::BadHandle),
        };
        let mut state = Self::session(&self.state, self.mount)?;
        Ok(op(state.lfs(), file)?)
    }

    fn with_dir<T>(
        &mut self,
        op: impl FnOnce(*mut ll::lfs_t, *mut ll::lfs_dir_t) -> Result<T>,
    ) -> Result<T> {
        let dir = match self.handle.as_mut() {
            Some(NativeHandle::Dir(dir)) => &mut **dir as *mut ll::lfs_dir_t,
            Some(NativeHandle::File { .. }) => return Err(Error::NotADirectory),
            None => return Err(Error::BadHandle),
        };
        let mut state = Self::session(&self.state, self.mount)?;
        op(state.lfs(), dir)
    }
}

/// Reads one entry, `None` once the directory is exhausted.
fn next_entry(lfs: *mut ll::lfs_t, dir: *mut ll::lfs_dir_t) -> Result<Option<Info>> {
    loop {
        // SAFETY: lfs_info is plain data
        let mut raw: ll::lfs_info = unsafe { core::mem::zeroed() };
        if check(unsafe { ll::lfs_dir_read(lfs, dir, &mut raw) })? == 0 {
            return Ok(None);
        }
        let info = info_from_native(&raw);
        if info.name != "." && info.name != ".." {
            return Ok(Some(info));
        }
    }
}

impl File for LfsFile {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if matches!(self.handle, Some(NativeHandle::Dir(_))) {
            return Err(Error::IsADirectory);
        }
        if !self.flags.readable() {
            return Err(Error::PermissionDenied);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(i32::MAX as usize) as ll::lfs_size_t;
        self.with_file(|lfs, file| {
            check(unsafe { ll::lfs_file_read(lfs, file, buf.as_mut_ptr().cast(), len) })
                .map(|n| n as usize)
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if matches!(self.handle, Some(NativeHandle::Dir(_))) {
            return Err(Error::IsADirectory);
        }
        if !self.flags.writable() {
            return Err(Error::PermissionDenied);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(i32::MAX as usize) as ll::lfs_size_t;
        self.with_file(|lfs, file| {
            check(unsafe { ll::lfs_file_write(lfs, file, buf.as_ptr().cast(), len) })
                .map(|n| n as usize)
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let (off, whence) = match pos {
            SeekFrom::Start(n) => (i64::try_from(n).unwrap_or(i64::MAX), LFS_SEEK_SET),
            SeekFrom::Current(n) => (n, LFS_SEEK_CUR),
            SeekFrom::End(n) => (n, LFS_SEEK_END),
        };
        let off = ll::lfs_soff_t::try_from(off).map_err(|_| Error::InvalidArgument)?;
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_seek(lfs, file, off, whence) }))
            .map(|pos| pos as u64)
    }

    fn tell(&mut self) -> Result<u64> {
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_tell(lfs, file) }))
            .map(|pos| pos as u64)
    }

    fn size(&mut self) -> Result<u64> {
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_size(lfs, file) }))
            .map(|size| size as u64)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if matches!(self.handle, Some(NativeHandle::Dir(_))) {
            return Err(Error::IsADirectory);
        }
        if !self.flags.writable() {
            return Err(Error::PermissionDenied);
        }
        let size = ll::lfs_off_t::try_from(size).map_err(|_| Error::FileTooLarge)?;
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_truncate(lfs, file, size) }).map(drop))
    }

    fn sync(&mut self) -> Result<()> {
        if matches!(self.handle, Some(NativeHandle::Dir(_))) {
            return Ok(());
        }
        self.with_file(|lfs, file| check(unsafe { ll::lfs_file_sync(lfs, file) }).map(drop))
    }

    fn readdir(&mut self, n: usize) -> Result<Vec<Info>> {
        self.with_dir(|lfs, dir| {
            let mut entries = Vec::new();
            if n == 0 {
                check(unsafe { ll::lfs_dir_rewind(lfs, dir) })?;
            }
            while n == 0 || entries.len() < n {
                match next_entry(lfs, dir)? {
                    Some(info) => entries.push(info),
                    None => break,
                }
            }
            Ok(entries)
        })
    }

    fn stat(&self) -> &Info {
        &self.info
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        let mut state = Self::session(&self.state, self.mount)?;
        let result = handle.close(&mut state);
        trace!("lfs: closed {}", self.info.name);
        result
    }
}

impl Drop for LfsFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            if !matches!(e, Error::BadHandle) {
                warn!("lfs: closing {} on drop failed: {}", self.info.name, e);
            }
        }
    }
}

impl ErrorType for LfsFile {
    type Error = Error;
}

impl embedded_io::Read for LfsFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }
}

impl embedded_io::Write for LfsFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        File::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        File::sync(self)
    }
}

impl embedded_io::Seek for LfsFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        File::seek(self, pos)
    }
}
