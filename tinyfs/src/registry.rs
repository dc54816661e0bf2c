//! Process-wide handle registry.
//!
//! Native engine callbacks only receive an opaque context value. Every
//! engine session (a format run, or a mount) registers its [`Volume`] here
//! and passes the resulting [`Handle`] as that context; the callback bridge
//! resolves it back with [`lookup`].
//!
//! Entries are owned by a [`Registration`] guard and removed when it drops,
//! so every teardown path (unmount, failed mount, end of format, engine
//! drop) releases its entry. Handles are never reused, which lets a stale
//! context be detected instead of resolving to a newer volume.

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tinyfs_block_device::BlockDevice;

/// Block device shared between a filesystem and its registry entry.
pub(crate) type SharedDevice = Arc<Mutex<Box<dyn BlockDevice>>>;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a callback needs to reach the device.
pub(crate) struct Volume {
    device: SharedDevice,
    unit: u64,
}

impl Volume {
    /// `unit` is the callback addressing unit: the erase block for littlefs,
    /// the sector for FAT.
    pub(crate) fn new(device: SharedDevice, unit: u64) -> Self {
        Self { device, unit }
    }

    pub(crate) fn unit(&self) -> u64 {
        self.unit
    }

    /// Absolute byte offset of `offset` inside addressing unit `index`.
    pub(crate) fn offset_of(&self, index: u64, offset: u64) -> u64 {
        index * self.unit + offset
    }

    pub(crate) fn device(&self) -> MutexGuard<'_, Box<dyn BlockDevice>> {
        lock(&self.device)
    }
}

/// Opaque registry key, handed to native code as its context pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Handle(NonZeroUsize);

impl Handle {
    pub(crate) fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub(crate) fn from_ptr(ptr: *const c_void) -> Option<Self> {
        NonZeroUsize::new(ptr as usize).map(Self)
    }
}

struct Registry {
    next: NonZeroUsize,
    entries: BTreeMap<Handle, Arc<Volume>>,
}

impl Registry {
    const fn new() -> Self {
        Self {
            next: NonZeroUsize::MIN,
            entries: BTreeMap::new(),
        }
    }

    /// Next unused handle. The counter only wraps after `usize::MAX`
    /// registrations; keys still live at that point are skipped.
    fn allocate(&mut self) -> Handle {
        loop {
            let handle = Handle(self.next);
            self.next = self.next.checked_add(1).unwrap_or(NonZeroUsize::MIN);
            if !self.entries.contains_key(&handle) {
                return handle;
            }
        }
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

/// Keeps a registry entry alive; dropping it removes the entry.
#[derive(Debug)]
pub(crate) struct Registration {
    handle: Handle,
}

impl Registration {
    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = lock(&REGISTRY).entries.remove(&self.handle);
        if removed.is_some() {
            debug!("registry: released handle {}", self.handle.0);
        }
    }
}

/// Enters `volume` in the registry under a fresh handle.
pub(crate) fn register(volume: Arc<Volume>) -> Registration {
    let mut registry = lock(&REGISTRY);
    let handle = registry.allocate();
    registry.entries.insert(handle, volume);
    debug!(
        "registry: registered handle {} ({} active)",
        handle.0,
        registry.entries.len()
    );
    Registration { handle }
}

/// Resolves `handle`. The registry lock is released before returning, so
/// callers may perform device I/O on the result.
pub(crate) fn lookup(handle: Handle) -> Option<Arc<Volume>> {
    lock(&REGISTRY).entries.get(&handle).cloned()
}

/// Resolves a raw native context pointer.
pub(crate) fn lookup_ptr(ptr: *const c_void) -> Option<Arc<Volume>> {
    let volume = Handle::from_ptr(ptr).and_then(lookup);
    if volume.is_none() {
        error!("registry: no volume registered for context {:p}", ptr);
    }
    volume
}

#[cfg(test)]
pub(crate) fn is_registered(handle: Handle) -> bool {
    lock(&REGISTRY).entries.contains_key(&handle)
}
