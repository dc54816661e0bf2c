//! Device-level errors.

use core::fmt;

/// Errors reported by [`BlockDevice`](crate::BlockDevice) implementations.
#[derive(Debug)]
#[non_exhaustive]
pub enum DeviceError {
    /// The requested byte range does not fit inside the device.
    OutOfBounds {
        /// First byte of the request.
        offset: u64,
        /// Length of the request in bytes.
        len: u64,
        /// Device size in bytes.
        size: u64,
    },

    /// The device geometry is unusable (zero sizes, non power-of-two erase
    /// blocks, and so on).
    InvalidGeometry(&'static str),

    /// The medium rejected the operation.
    Media(&'static str),

    /// Host I/O failure.
    #[cfg(feature = "std")]
    Io(std::io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len, size } => write!(
                f,
                "Access of {} bytes at offset {} exceeds device size {}",
                len, offset, size
            ),
            Self::InvalidGeometry(msg) => write!(f, "Invalid device geometry: {}", msg),
            Self::Media(msg) => write!(f, "Media error: {}", msg),
            #[cfg(feature = "std")]
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl core::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            #[cfg(feature = "std")]
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
