//! littlefs result codes.

use core::ffi::c_int;

use crate::Error;

pub(crate) const LFS_ERR_OK: c_int = 0;
pub(crate) const LFS_ERR_IO: c_int = -5;
const LFS_ERR_CORRUPT: c_int = -84;
const LFS_ERR_NOENT: c_int = -2;
const LFS_ERR_EXIST: c_int = -17;
const LFS_ERR_NOTDIR: c_int = -20;
const LFS_ERR_ISDIR: c_int = -21;
const LFS_ERR_NOTEMPTY: c_int = -39;
const LFS_ERR_BADF: c_int = -9;
const LFS_ERR_FBIG: c_int = -27;
const LFS_ERR_INVAL: c_int = -22;
const LFS_ERR_NOSPC: c_int = -28;
const LFS_ERR_NOMEM: c_int = -12;
const LFS_ERR_NOATTR: c_int = -61;
const LFS_ERR_NAMETOOLONG: c_int = -36;

/// A negative littlefs result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfsError {
    /// Error during device operation
    Io,
    /// Corrupted
    Corrupt,
    /// No directory entry
    NoEntry,
    /// Entry already exists
    Exists,
    /// Entry is not a dir
    NotDir,
    /// Entry is a dir
    IsDir,
    /// Dir is not empty
    NotEmpty,
    /// Bad file number
    BadFile,
    /// File too large
    FileTooLarge,
    /// Invalid parameter
    Invalid,
    /// No space left on device
    NoSpace,
    /// No more memory available
    NoMemory,
    /// No data/attr available
    NoAttr,
    /// File name too long
    NameTooLong,
    /// A code littlefs does not document
    Unknown(i32),
}

impl LfsError {
    /// Decodes a negative result code.
    pub fn from_code(code: i32) -> Self {
        match code {
            LFS_ERR_IO => Self::Io,
            LFS_ERR_CORRUPT => Self::Corrupt,
            LFS_ERR_NOENT => Self::NoEntry,
            LFS_ERR_EXIST => Self::Exists,
            LFS_ERR_NOTDIR => Self::NotDir,
            LFS_ERR_ISDIR => Self::IsDir,
            LFS_ERR_NOTEMPTY => Self::NotEmpty,
            LFS_ERR_BADF => Self::BadFile,
            LFS_ERR_FBIG => Self::FileTooLarge,
            LFS_ERR_INVAL => Self::Invalid,
            LFS_ERR_NOSPC => Self::NoSpace,
            LFS_ERR_NOMEM => Self::NoMemory,
            LFS_ERR_NOATTR => Self::NoAttr,
            LFS_ERR_NAMETOOLONG => Self::NameTooLong,
            other => Self::Unknown(other),
        }
    }

    /// The native result code.
    pub fn code(self) -> i32 {
        match self {
            Self::Io => LFS_ERR_IO,
            Self::Corrupt => LFS_ERR_CORRUPT,
            Self::NoEntry => LFS_ERR_NOENT,
            Self::Exists => LFS_ERR_EXIST,
            Self::NotDir => LFS_ERR_NOTDIR,
            Self::IsDir => LFS_ERR_ISDIR,
            Self::NotEmpty => LFS_ERR_NOTEMPTY,
            Self::BadFile => LFS_ERR_BADF,
            Self::FileTooLarge => LFS_ERR_FBIG,
            Self::Invalid => LFS_ERR_INVAL,
            Self::NoSpace => LFS_ERR_NOSPC,
            Self::NoMemory => LFS_ERR_NOMEM,
            Self::NoAttr => LFS_ERR_NOATTR,
            Self::NameTooLong => LFS_ERR_NAMETOOLONG,
            Self::Unknown(code) => code,
        }
    }
}

/// Splits a littlefs return value into a count or an error.
pub(crate) fn check(code: c_int) -> Result<c_int, LfsError> {
    if code < LFS_ERR_OK {
        Err(LfsError::from_code(code))
    } else {
        Ok(code)
    }
}

impl core::fmt::Display for LfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::Io => "Error during device operation",
            Self::Corrupt => "Corrupted",
            Self::NoEntry => "No directory entry",
            Self::Exists => "Entry already exists",
            Self::NotDir => "Entry is not a dir",
            Self::IsDir => "Entry is a dir",
            Self::NotEmpty => "Dir is not empty",
            Self::BadFile => "Bad file number",
            Self::FileTooLarge => "File too large",
            Self::Invalid => "Invalid parameter",
            Self::NoSpace => "No space left on device",
            Self::NoMemory => "No more memory available",
            Self::NoAttr => "No data/attr available",
            Self::NameTooLong => "File name too long",
            Self::Unknown(_) => "Unknown error",
        };
        write!(f, "littlefs: {}", msg)
    }
}

impl std::error::Error for LfsError {}

impl From<LfsError> for Error {
    fn from(err: LfsError) -> Self {
        match err {
            LfsError::Io | LfsError::Unknown(_) => Error::Io,
            LfsError::Corrupt => Error::Corrupt,
            LfsError::NoEntry | LfsError::NoAttr => Error::NotFound,
            LfsError::Exists => Error::AlreadyExists,
            LfsError::NotDir => Error::NotADirectory,
            LfsError::IsDir => Error::IsADirectory,
            LfsError::NotEmpty => Error::DirectoryNotEmpty,
            LfsError::BadFile => Error::BadHandle,
            LfsError::FileTooLarge => Error::FileTooLarge,
            LfsError::Invalid => Error::InvalidArgument,
            LfsError::NoSpace => Error::NoSpace,
            LfsError::NoMemory => Error::NoMemory,
            LfsError::NameTooLong => Error::NameTooLong,
        }
    }
}
