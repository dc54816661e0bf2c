//! Engine-independent filesystem and file handle contracts.

use bitflags::bitflags;
use embedded_io::SeekFrom;

use crate::Result;
use crate::fat::{FatAttributes, FatTimestamp};

bitflags! {
    /// How [`Filesystem::open_file`] opens a path.
    ///
    /// With neither `READ` nor `WRITE` set the file is opened read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for reading
        const READ = 0x01;
        /// Open for writing
        const WRITE = 0x02;
        /// Create the file if it does not exist
        const CREATE = 0x04;
        /// With `CREATE`, fail if the file already exists
        const EXCLUSIVE = 0x08;
        /// Truncate an existing file to zero length
        const TRUNCATE = 0x10;
        /// Position writes at the end of the file
        const APPEND = 0x20;
    }
}

impl OpenFlags {
    /// Whether the handle may read.
    pub fn readable(self) -> bool {
        self.contains(Self::READ) || !self.contains(Self::WRITE)
    }

    /// Whether the handle may write.
    pub fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file
    File,
    /// Directory
    Dir,
}

/// Metadata of a file or directory.
///
/// Handles keep the `Info` captured when they were opened; it is not
/// refreshed by later writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// Entry name. For [`File::stat`] this is the path given to `open_file`.
    pub name: String,
    /// Size in bytes; zero for directories
    pub size: u64,
    /// File or directory
    pub kind: FileType,
    /// FAT attribute bits, only reported by FAT volumes
    pub attributes: Option<FatAttributes>,
    /// Last modification time, only reported by FAT volumes
    pub modified: Option<FatTimestamp>,
}

impl Info {
    pub(crate) fn new(name: impl Into<String>, size: u64, kind: FileType) -> Self {
        Self {
            name: name.into(),
            size,
            kind,
            attributes: None,
            modified: None,
        }
    }

    /// Whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Dir
    }

    /// Whether the entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }
}

/// A mountable volume on top of one block device.
///
/// Engine state exists only between a successful [`mount`](Self::mount) and
/// the matching [`unmount`](Self::unmount); every operation except `format`
/// and `mount` fails with [`Error::NotMounted`](crate::Error::NotMounted)
/// outside that window. Configuration is engine specific and happens
/// through an inherent `configure` method before the first `format` or
/// `mount`.
pub trait Filesystem: Send {
    /// Handle type returned by [`open_file`](Self::open_file).
    type File: File;

    /// Destructively writes an empty volume. The filesystem must not be
    /// mounted.
    fn format(&mut self) -> Result<()>;

    /// Mounts the volume.
    ///
    /// Fails with [`Error::Corrupt`](crate::Error::Corrupt) if the device
    /// does not hold a valid volume.
    fn mount(&mut self) -> Result<()>;

    /// Flushes and releases engine state. Handles opened under this mount
    /// become invalid.
    fn unmount(&mut self) -> Result<()>;

    /// Whether the volume is currently mounted.
    fn is_mounted(&self) -> bool;

    /// Opens `path` read-only.
    fn open(&self, path: &str) -> Result<Self::File> {
        self.open_file(path, OpenFlags::READ)
    }

    /// Opens a file or directory.
    ///
    /// Directories are detected by a stat of `path` and always opened as
    /// directory handles, whatever the flags.
    fn open_file(&self, path: &str, flags: OpenFlags) -> Result<Self::File>;

    /// Creates a directory.
    fn mkdir(&mut self, path: &str) -> Result<()>;

    /// Removes a file or an empty directory.
    fn remove(&mut self, path: &str) -> Result<()>;

    /// Renames or moves an entry.
    fn rename(&mut self, old_path: &str, new_path: &str) -> Result<()>;

    /// Returns metadata for `path`.
    fn stat(&self, path: &str) -> Result<Info>;

    /// Remaining free space in bytes.
    fn free(&self) -> Result<u64>;
}

/// An open file or directory.
///
/// Type-specific operations fail fast: data operations on a directory handle
/// return [`Error::IsADirectory`](crate::Error::IsADirectory) and
/// [`readdir`](Self::readdir) on a file returns
/// [`Error::NotADirectory`](crate::Error::NotADirectory).
pub trait File: Send {
    /// The path given to `open_file`.
    fn name(&self) -> &str;

    /// Whether this is a directory handle.
    fn is_dir(&self) -> bool;

    /// Reads into `buf`, returning `Ok(0)` at end of file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf`, returning the number of bytes written.
    ///
    /// A volume that fills up mid-write yields a short count; a write that
    /// cannot store anything fails with [`Error::NoSpace`](crate::Error::NoSpace).
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Moves the position cursor and returns the new position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current position.
    fn tell(&mut self) -> Result<u64>;

    /// Current size of the file, including unflushed writes.
    fn size(&mut self) -> Result<u64>;

    /// Shrinks or extends the file to `size` bytes.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Writes any pending data out to the device.
    fn sync(&mut self) -> Result<()>;

    /// Lists directory entries.
    ///
    /// `n == 0` rewinds and returns every entry. `n > 0` returns up to `n`
    /// entries from the current position, and an empty list once exhausted.
    /// `.` and `..` are never returned.
    fn readdir(&mut self, n: usize) -> Result<Vec<Info>>;

    /// Metadata captured when the handle was opened.
    fn stat(&self) -> &Info;

    /// Flushes pending writes and releases the handle. Closing twice is a
    /// no-op.
    fn close(&mut self) -> Result<()>;
}
