//! FAT result codes.

use std::io;

use super::diskio::{DiskFailure, DiskResult};
use crate::Error;

/// A FatFs `FR_*` result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FatResult {
    /// FR_DISK_ERR
    DiskErr = 1,
    /// FR_INT_ERR
    IntErr = 2,
    /// FR_NOT_READY
    NotReady = 3,
    /// FR_NO_FILE
    NoFile = 4,
    /// FR_NO_PATH
    NoPath = 5,
    /// FR_INVALID_NAME
    InvalidName = 6,
    /// FR_DENIED
    Denied = 7,
    /// FR_EXIST
    Exist = 8,
    /// FR_INVALID_OBJECT
    InvalidObject = 9,
    /// FR_WRITE_PROTECTED
    WriteProtected = 10,
    /// FR_INVALID_DRIVE
    InvalidDrive = 11,
    /// FR_NOT_ENABLED
    NotEnabled = 12,
    /// FR_NO_FILESYSTEM
    NoFilesystem = 13,
    /// FR_MKFS_ABORTED
    MkfsAborted = 14,
    /// FR_TIMEOUT
    Timeout = 15,
    /// FR_LOCKED
    Locked = 16,
    /// FR_NOT_ENOUGH_CORE
    NotEnoughCore = 17,
    /// FR_TOO_MANY_OPEN_FILES
    TooManyOpenFiles = 18,
    /// FR_INVALID_PARAMETER
    InvalidParameter = 19,
    /// Volume mounted read-only
    ReadOnly = 99,
    /// Operation the FAT engine does not provide
    NotImplemented = 0xE0,
}

impl FatResult {
    const ALL: [Self; 21] = [
        Self::DiskErr,
        Self::IntErr,
        Self::NotReady,
        Self::NoFile,
        Self::NoPath,
        Self::InvalidName,
        Self::Denied,
        Self::Exist,
        Self::InvalidObject,
        Self::WriteProtected,
        Self::InvalidDrive,
        Self::NotEnabled,
        Self::NoFilesystem,
        Self::MkfsAborted,
        Self::Timeout,
        Self::Locked,
        Self::NotEnoughCore,
        Self::TooManyOpenFiles,
        Self::InvalidParameter,
        Self::ReadOnly,
        Self::NotImplemented,
    ];

    /// The numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a non-zero code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    fn message(self) -> &'static str {
        match self {
            Self::DiskErr => "(1) A hard error occurred in the low level disk I/O layer",
            Self::IntErr => "(2) Assertion failed",
            Self::NotReady => "(3) The physical drive cannot work",
            Self::NoFile => "(4) Could not find the file",
            Self::NoPath => "(5) Could not find the path",
            Self::InvalidName => "(6) The path name format is invalid",
            Self::Denied => "(7) Access denied due to prohibited access or directory full",
            Self::Exist => "(8) Access denied due to prohibited access",
            Self::InvalidObject => "(9) The file/directory object is invalid",
            Self::WriteProtected => "(10) The physical drive is write protected",
            Self::InvalidDrive => "(11) The logical drive number is invalid",
            Self::NotEnabled => "(12) The volume has no work area",
            Self::NoFilesystem => "(13) There is no valid FAT volume",
            Self::MkfsAborted => "(14) The f_mkfs() aborted due to any problem",
            Self::Timeout => "(15) Could not get a grant to access the volume within defined period",
            Self::Locked => "(16) The operation is rejected according to the file sharing policy",
            Self::NotEnoughCore => "(17) LFN working buffer could not be allocated",
            Self::TooManyOpenFiles => "(18) Number of open files > FF_FS_LOCK",
            Self::InvalidParameter => "(19) Given parameter is invalid",
            Self::ReadOnly => "(99) Read-only filesystem",
            Self::NotImplemented => "(e0) Feature Not Implemented",
        }
    }
}

impl core::fmt::Display for FatResult {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "fatfs: {}", self.message())
    }
}

impl std::error::Error for FatResult {}

impl From<FatResult> for Error {
    fn from(result: FatResult) -> Self {
        match result {
            FatResult::DiskErr | FatResult::NotReady | FatResult::MkfsAborted | FatResult::Timeout => {
                Error::Io
            }
            FatResult::IntErr | FatResult::NoFilesystem => Error::Corrupt,
            FatResult::NoFile | FatResult::NoPath => Error::NotFound,
            FatResult::InvalidName | FatResult::InvalidDrive | FatResult::InvalidParameter => {
                Error::InvalidArgument
            }
            FatResult::Denied | FatResult::Locked => Error::PermissionDenied,
            FatResult::Exist => Error::AlreadyExists,
            FatResult::InvalidObject => Error::BadHandle,
            FatResult::WriteProtected | FatResult::ReadOnly => Error::ReadOnly,
            FatResult::NotEnabled => Error::NotMounted,
            FatResult::NotEnoughCore => Error::NoMemory,
            FatResult::TooManyOpenFiles => Error::TooManyOpenFiles,
            FatResult::NotImplemented => Error::NotImplemented,
        }
    }
}

impl From<DiskResult> for FatResult {
    fn from(result: DiskResult) -> Self {
        match result {
            DiskResult::NotReady => Self::NotReady,
            DiskResult::WriteProtected => Self::WriteProtected,
            DiskResult::ParameterError => Self::InvalidParameter,
            DiskResult::Ok | DiskResult::Error => Self::DiskErr,
        }
    }
}

/// Whether `err` carries a failure from the disk layer.
pub(crate) fn is_disk_failure(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<DiskFailure>())
}

/// Messages `fatfs` 0.3.6 attaches to `ErrorKind::Other` for conditions
/// `io::ErrorKind` has no variant for. The crate version is pinned to match.
const FATFS_NO_SPACE: &str = "No space left on device";
const FATFS_DIR_NOT_EMPTY: &str = "Directory not empty";

/// Classifies an engine error.
pub(crate) fn from_io(err: io::Error) -> Error {
    if is_disk_failure(&err) {
        error!("fat: {}", err);
        return FatResult::DiskErr.into();
    }
    let result = match err.kind() {
        io::ErrorKind::Other => {
            let message = err.get_ref().map(ToString::to_string);
            match message.as_deref() {
                Some(FATFS_NO_SPACE) => return Error::NoSpace,
                Some(FATFS_DIR_NOT_EMPTY) => return Error::DirectoryNotEmpty,
                _ => {
                    debug!("fat: unclassified engine error: {}", err);
                    return Error::Io;
                }
            }
        }
        io::ErrorKind::NotFound => FatResult::NoFile,
        io::ErrorKind::AlreadyExists => FatResult::Exist,
        io::ErrorKind::PermissionDenied => FatResult::Denied,
        io::ErrorKind::InvalidInput => FatResult::InvalidParameter,
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => FatResult::IntErr,
        io::ErrorKind::WriteZero => return Error::NoSpace,
        _ => {
            debug!("fat: unclassified engine error: {}", err);
            return Error::Io;
        }
    };
    result.into()
}
