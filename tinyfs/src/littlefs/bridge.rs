//! littlefs block device callbacks.
//!
//! littlefs addresses the device as `(block, offset, size)` and hands back
//! only `lfs_config::context`, which carries a registry [`Handle`]. Every
//! callback resolves that handle, maps the address to an absolute byte
//! offset with the erase block as unit, and calls the [`BlockDevice`].
//! Device errors are logged and flattened to `LFS_ERR_IO`.
//!
//! [`Handle`]: crate::registry::Handle
//! [`BlockDevice`]: tinyfs_block_device::BlockDevice

use core::ffi::{c_int, c_void};
use std::sync::Arc;

use littlefs2_sys as ll;
use tinyfs_block_device::DeviceError;

use super::error::{LFS_ERR_IO, LFS_ERR_OK};
use crate::registry::{self, Volume};

/// # Safety
///
/// `c` must be null or point to a live `lfs_config`.
unsafe fn volume_of(c: *const ll::lfs_config) -> Option<Arc<Volume>> {
    if c.is_null() {
        error!("lfs: callback without config");
        return None;
    }
    registry::lookup_ptr(unsafe { (*c).context })
}

fn errval(op: &str, result: Result<(), DeviceError>) -> c_int {
    match result {
        Ok(()) => LFS_ERR_OK,
        Err(e) => {
            error!("lfs {} error: {}", op, e);
            LFS_ERR_IO
        }
    }
}

pub(crate) unsafe extern "C" fn read(
    c: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *mut c_void,
    size: ll::lfs_size_t,
) -> c_int {
    trace!("lfs read: block={} off={} size={}", block, off, size);
    let Some(volume) = (unsafe { volume_of(c) }) else {
        return LFS_ERR_IO;
    };
    if size == 0 {
        return LFS_ERR_OK;
    }
    // SAFETY: littlefs passes a writable buffer of `size` bytes
    let buf = unsafe { core::slice::from_raw_parts_mut(buffer.cast::<u8>(), size as usize) };
    let addr = volume.offset_of(u64::from(block), u64::from(off));
    errval("read", volume.device().read_at(buf, addr).map(drop))
}

pub(crate) unsafe extern "C" fn prog(
    c: *const ll::lfs_config,
    block: ll::lfs_block_t,
    off: ll::lfs_off_t,
    buffer: *const c_void,
    size: ll::lfs_size_t,
) -> c_int {
    trace!("lfs prog: block={} off={} size={}", block, off, size);
    let Some(volume) = (unsafe { volume_of(c) }) else {
        return LFS_ERR_IO;
    };
    if size == 0 {
        return LFS_ERR_OK;
    }
    // SAFETY: littlefs passes a readable buffer of `size` bytes
    let buf = unsafe { core::slice::from_raw_parts(buffer.cast::<u8>(), size as usize) };
    let addr = volume.offset_of(u64::from(block), u64::from(off));
    errval("program", volume.device().write_at(buf, addr).map(drop))
}

pub(crate) unsafe extern "C" fn erase(c: *const ll::lfs_config, block: ll::lfs_block_t) -> c_int {
    trace!("lfs erase: block={}", block);
    let Some(volume) = (unsafe { volume_of(c) }) else {
        return LFS_ERR_IO;
    };
    errval("erase", volume.device().erase_blocks(u64::from(block), 1))
}

pub(crate) unsafe extern "C" fn sync(c: *const ll::lfs_config) -> c_int {
    trace!("lfs sync");
    let Some(volume) = (unsafe { volume_of(c) }) else {
        return LFS_ERR_IO;
    };
    let mut device = volume.device();
    match device.as_syncer() {
        Some(syncer) => errval("sync", syncer.sync()),
        None => LFS_ERR_OK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SharedDevice, register};
    use std::sync::Mutex;
    use tinyfs_adapters::MemoryDevice;
    use tinyfs_block_device::BlockDevice;

    const BLOCK: u32 = 256;

    fn shared_device() -> SharedDevice {
        let device: Box<dyn BlockDevice> = Box::new(MemoryDevice::new(16, BLOCK as usize, 8).unwrap());
        Arc::new(Mutex::new(device))
    }

    fn config_for(context: *mut c_void) -> ll::lfs_config {
        // SAFETY: lfs_config is plain data; zero is a valid bit pattern
        let mut cfg: ll::lfs_config = unsafe { core::mem::zeroed() };
        cfg.context = context;
        cfg
    }

    #[test]
    fn test_prog_then_read_uses_block_offset() {
        let device = shared_device();
        let registration = register(Arc::new(Volume::new(device.clone(), BLOCK as u64)));
        let cfg = config_for(registration.handle().as_ptr());

        let data = *b"littlefs";
        let rc = unsafe { prog(&cfg, 2, 10, data.as_ptr().cast(), data.len() as u32) };
        assert_eq!(rc, LFS_ERR_OK);

        let mut raw = [0u8; 8];
        device.lock().unwrap().read_at(&mut raw, 2 * BLOCK as u64 + 10).unwrap();
        assert_eq!(raw, data);

        let mut back = [0u8; 8];
        let rc = unsafe { read(&cfg, 2, 10, back.as_mut_ptr().cast(), back.len() as u32) };
        assert_eq!(rc, LFS_ERR_OK);
        assert_eq!(back, data);
    }

    #[test]
    fn test_erase_and_sync() {
        let device = shared_device();
        let registration = register(Arc::new(Volume::new(device.clone(), BLOCK as u64)));
        let cfg = config_for(registration.handle().as_ptr());

        device.lock().unwrap().write_at(&[0u8; 4], BLOCK as u64).unwrap();
        assert_eq!(unsafe { erase(&cfg, 1) }, LFS_ERR_OK);
        let mut raw = [0u8; 4];
        device.lock().unwrap().read_at(&mut raw, BLOCK as u64).unwrap();
        assert_eq!(raw, [0xFF; 4]);

        // Memory devices have no sync capability
        assert_eq!(unsafe { sync(&cfg) }, LFS_ERR_OK);
    }

    #[test]
    fn test_device_errors_become_lfs_io() {
        let device = shared_device();
        let registration = register(Arc::new(Volume::new(device, BLOCK as u64)));
        let cfg = config_for(registration.handle().as_ptr());

        let mut buf = [0u8; 16];
        let rc = unsafe { read(&cfg, 8, 0, buf.as_mut_ptr().cast(), buf.len() as u32) };
        assert_eq!(rc, LFS_ERR_IO);
        assert_eq!(unsafe { erase(&cfg, 100) }, LFS_ERR_IO);
    }

    #[test]
    fn test_unregistered_context_reports_io() {
        let registration = register(Arc::new(Volume::new(shared_device(), BLOCK as u64)));
        let cfg = config_for(registration.handle().as_ptr());
        drop(registration);

        assert_eq!(unsafe { erase(&cfg, 0) }, LFS_ERR_IO);
        assert_eq!(unsafe { sync(core::ptr::null()) }, LFS_ERR_IO);
    }
}
