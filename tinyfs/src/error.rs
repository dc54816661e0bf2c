//! Filesystem-level errors shared by every engine.

use tinyfs_block_device::DeviceError;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by filesystems and file handles.
///
/// Each engine translates its native result codes into this taxonomy through
/// a one-to-one table ([`LfsError`](crate::littlefs::LfsError),
/// [`FatResult`](crate::fat::FatResult)). [`Error::Corrupt`] is kept apart
/// from [`Error::Io`] so callers can decide to format instead of retrying.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The backing medium failed.
    Io,
    /// Path or directory entry does not exist.
    NotFound,
    /// Entry already exists.
    AlreadyExists,
    /// A path component, or the handle, is not a directory.
    NotADirectory,
    /// The entry, or the handle, is a directory.
    IsADirectory,
    /// Directory still has entries.
    DirectoryNotEmpty,
    /// Bad flags, offsets or names.
    InvalidArgument,
    /// A path component exceeds the engine's name limit.
    NameTooLong,
    /// File would exceed the engine's size limit.
    FileTooLarge,
    /// No free space left on the volume.
    NoSpace,
    /// The engine ran out of working memory.
    NoMemory,
    /// The handle was not opened with the required access.
    PermissionDenied,
    /// The volume is read-only.
    ReadOnly,
    /// The engine's open file limit is reached.
    TooManyOpenFiles,
    /// On-disk metadata failed validation; the device is not a valid volume.
    Corrupt,
    /// The engine does not support this operation.
    NotImplemented,
    /// Rejected engine configuration.
    Configuration(&'static str),
    /// The filesystem has not been configured.
    NotConfigured,
    /// The filesystem is not mounted.
    NotMounted,
    /// The filesystem is already mounted.
    AlreadyMounted,
    /// The handle is closed or belongs to an earlier mount.
    BadHandle,
    /// A device error outside any engine callback.
    Device(DeviceError),
}

impl Error {
    /// Closest `embedded-io` error kind.
    pub fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::PermissionDenied | Self::ReadOnly => ErrorKind::PermissionDenied,
            Self::NotADirectory
            | Self::IsADirectory
            | Self::InvalidArgument
            | Self::NameTooLong
            | Self::BadHandle
            | Self::Configuration(_) => ErrorKind::InvalidInput,
            Self::Corrupt => ErrorKind::InvalidData,
            Self::NotImplemented => ErrorKind::Unsupported,
            Self::NoMemory => ErrorKind::OutOfMemory,
            _ => ErrorKind::Other,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error on the backing device"),
            Self::NotFound => write!(f, "No such file or directory"),
            Self::AlreadyExists => write!(f, "Entry already exists"),
            Self::NotADirectory => write!(f, "Not a directory"),
            Self::IsADirectory => write!(f, "Is a directory"),
            Self::DirectoryNotEmpty => write!(f, "Directory not empty"),
            Self::InvalidArgument => write!(f, "Invalid argument"),
            Self::NameTooLong => write!(f, "File name too long"),
            Self::FileTooLarge => write!(f, "File too large"),
            Self::NoSpace => write!(f, "No space left on device"),
            Self::NoMemory => write!(f, "Out of memory"),
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::ReadOnly => write!(f, "Read-only filesystem"),
            Self::TooManyOpenFiles => write!(f, "Too many open files"),
            Self::Corrupt => write!(f, "Corrupted or unformatted volume"),
            Self::NotImplemented => write!(f, "Operation not implemented"),
            Self::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Self::NotConfigured => write!(f, "Filesystem not configured"),
            Self::NotMounted => write!(f, "Filesystem not mounted"),
            Self::AlreadyMounted => write!(f, "Filesystem already mounted"),
            Self::BadHandle => write!(f, "Bad file handle"),
            Self::Device(e) => write!(f, "Device error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        Self::Device(err)
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        Error::kind(self)
    }
}
