//! Block device adapters for tinyfs.
//!
//! Every adapter here implements [`BlockDevice`] and emulates flash
//! erase/program semantics, whatever the backing medium:
//!
//! - [`MemoryDevice`]: a process-resident buffer, erased value `0xFF`
//! - [`FileDevice`]: a host file with positioned I/O, erased value `0x00`
//! - [`NorFlashDevice`]: any `embedded-storage` NOR flash, erased value `0xFF`
//!
//! # Features
//!
//! - `alloc`: Enable [`MemoryDevice`]
//! - `std`: Enable [`FileDevice`] (implies `alloc`)
//! - `embedded-storage`: Enable [`NorFlashDevice`]
//! - `log`: Log media failures and image resizing

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod memory;

#[cfg(feature = "std")]
mod file;

#[cfg(feature = "embedded-storage")]
mod nor_flash;

#[cfg(feature = "alloc")]
pub use memory::MemoryDevice;

#[cfg(feature = "std")]
pub use file::FileDevice;

#[cfg(feature = "embedded-storage")]
pub use nor_flash::{NorFlashDevice, NorFlashRegion};

// Re-export the contract so users can depend on this crate alone
pub use tinyfs_block_device::{BlockDevice, DeviceError, Geometry, Syncer};
