//! A uniform filesystem layer for embedded block devices.
//!
//! `tinyfs` mounts one of two filesystem engines on any
//! [`BlockDevice`]:
//!
//! - [`littlefs::Littlefs`]: the littlefs copy-on-write, wear-levelling
//!   filesystem, driven through its C callback interface
//! - [`fat::FatFs`]: FAT12/16/32, driven through a sector-addressed disk
//!   I/O layer
//!
//! Both engines implement [`Filesystem`] and hand out handles implementing
//! [`File`], so callers can work with either volume through one API.
//!
//! Engine callbacks only carry an opaque context value. Each mounted volume
//! is therefore entered in a process-wide handle registry for as long as the
//! engine can call back into it.
//!
//! # Example
//!
//! ```no_run
//! use tinyfs::littlefs::{LfsConfig, Littlefs};
//! use tinyfs::{File, Filesystem, OpenFlags};
//! use tinyfs_adapters::MemoryDevice;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = MemoryDevice::new(64, 4096, 64)?;
//! let mut fs = Littlefs::new(device);
//! fs.configure(LfsConfig::default())?;
//! fs.format()?;
//! fs.mount()?;
//!
//! let mut file = fs.open_file("/hello.txt", OpenFlags::WRITE | OpenFlags::CREATE)?;
//! file.write(b"hello")?;
//! file.close()?;
//! fs.unmount()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `log`: Emit callback tracing and diagnostics through the `log` facade
//!   (enabled by default)

#![warn(missing_docs)]

#[macro_use]
mod log_macros;

mod error;
mod fs;
mod registry;
mod view;

pub mod fat;
pub mod littlefs;

pub use embedded_io::SeekFrom;
pub use error::{Error, Result};
pub use fs::{File, FileType, Filesystem, Info, OpenFlags};
pub use tinyfs_block_device::{BlockDevice, DeviceError, Syncer};
pub use view::ReadOnlyFs;
