use std::io::{self, Read as _, Seek as _, Write as _};

use embedded_io::{ErrorType, SeekFrom};

use super::error::from_io;
use super::{FatFileSystem, SharedState, entry_info, normalize, open_dir, with_session};
use crate::fs::{File, Info, OpenFlags};
use crate::registry::Handle;
use crate::{Error, Result};

/// An open FAT file or directory.
pub struct FatFile {
    state: SharedState,
    mount: Handle,
    flags: OpenFlags,
    info: Info,
    pos: u64,
    cursor: usize,
    open: bool,
}

fn open_native<'a>(fs: &'a FatFileSystem, path: &str) -> Result<fatfs::File<'a, super::DiskStream>> {
    fs.root_dir().open_file(normalize(path)).map_err(from_io)
}

impl FatFile {
    pub(crate) fn new(state: SharedState, mount: Handle, flags: OpenFlags, info: Info, pos: u64) -> Self {
        Self {
            state,
            mount,
            flags,
            info,
            pos,
            cursor: 0,
            open: true,
        }
    }

    fn session<T>(&self, op: impl FnOnce(&FatFileSystem) -> Result<T>) -> Result<T> {
        if !self.open {
            return Err(Error::BadHandle);
        }
        with_session(&self.state, self.mount, op)
    }

    fn regular(&self) -> Result<()> {
        if self.info.is_dir() {
            Err(Error::IsADirectory)
        } else {
            Ok(())
        }
    }
}

impl File for FatFile {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn is_dir(&self) -> bool {
        self.info.is_dir()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.regular()?;
        if !self.flags.readable() {
            return Err(Error::PermissionDenied);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        let n = self.session(|fs| {
            let mut file = open_native(fs, &self.info.name)?;
            file.seek(io::SeekFrom::Start(pos)).map_err(from_io)?;
            let mut done = 0;
            while done < buf.len() {
                match file.read(&mut buf[done..]) {
                    Ok(0) => break,
                    Ok(n) => done += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(from_io(e)),
                }
            }
            Ok(done)
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.regular()?;
        if !self.flags.writable() {
            return Err(Error::PermissionDenied);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let pos = self.pos;
        let n = self.session(|fs| {
            let mut file = open_native(fs, &self.info.name)?;
            file.seek(io::SeekFrom::Start(pos)).map_err(from_io)?;
            let mut done = 0;
            while done < buf.len() {
                match file.write(&buf[done..]) {
                    Ok(0) => break,
                    Ok(n) => done += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => match from_io(e) {
                        // Volume full: report what was stored
                        Error::NoSpace if done > 0 => break,
                        err => return Err(err),
                    },
                }
            }
            file.flush().map_err(from_io)?;
            if done == 0 {
                return Err(Error::NoSpace);
            }
            Ok(done)
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.regular()?;
        let size = self.size()?;
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(n) => i128::from(self.pos) + i128::from(n),
            SeekFrom::End(n) => i128::from(size) + i128::from(n),
        };
        if target < 0 {
            return Err(Error::InvalidArgument);
        }
        // The engine cannot leave holes; positions stop at end of file
        self.pos = target.min(i128::from(size)) as u64;
        Ok(self.pos)
    }

    fn tell(&mut self) -> Result<u64> {
        self.regular()?;
        self.session(|_| Ok(()))?;
        Ok(self.pos)
    }

    fn size(&mut self) -> Result<u64> {
        self.regular()?;
        self.session(|fs| {
            let mut file = open_native(fs, &self.info.name)?;
            file.seek(io::SeekFrom::End(0)).map_err(from_io)
        })
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.regular()?;
        if !self.flags.writable() {
            return Err(Error::PermissionDenied);
        }
        if size > self.size()? {
            return Err(Error::InvalidArgument);
        }
        self.session(|fs| {
            let mut file = open_native(fs, &self.info.name)?;
            file.seek(io::SeekFrom::Start(size)).map_err(from_io)?;
            file.truncate().map_err(from_io)?;
            file.flush().map_err(from_io)
        })?;
        self.pos = self.pos.min(size);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.info.is_dir() {
            return self.session(|_| Ok(()));
        }
        self.session(|fs| open_native(fs, &self.info.name)?.flush().map_err(from_io))
    }

    fn readdir(&mut self, n: usize) -> Result<Vec<Info>> {
        if !self.info.is_dir() {
            return Err(Error::NotADirectory);
        }
        let skip = if n == 0 { 0 } else { self.cursor };
        let take = if n == 0 { usize::MAX } else { n };
        let entries = self.session(|fs| {
            let mut entries = Vec::new();
            for entry in open_dir(fs, &self.info.name)?.iter() {
                let entry = entry.map_err(from_io)?;
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                entries.push(entry_info(&entry));
            }
            Ok(entries.into_iter().skip(skip).take(take).collect::<Vec<_>>())
        })?;
        self.cursor = skip + entries.len();
        Ok(entries)
    }

    fn stat(&self) -> &Info {
        &self.info
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let result = self.session(|_| Ok(()));
        self.open = false;
        trace!("fat: closed {}", self.info.name);
        result
    }
}

impl ErrorType for FatFile {
    type Error = Error;
}

impl embedded_io::Read for FatFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }
}

impl embedded_io::Write for FatFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        File::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        File::sync(self)
    }
}

impl embedded_io::Seek for FatFile {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        File::seek(self, pos)
    }
}
