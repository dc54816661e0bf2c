//! Read-only hierarchical view over a mounted filesystem.

use crate::fs::{File, Filesystem, Info};
use crate::{Error, Result};

/// Read-only access to a mounted [`Filesystem`].
///
/// Paths are absolute, as for the wrapped filesystem.
pub struct ReadOnlyFs<'a, F: Filesystem> {
    fs: &'a F,
}

impl<'a, F: Filesystem> ReadOnlyFs<'a, F> {
    /// Wraps `fs`.
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Opens `path` for reading.
    pub fn open(&self, path: &str) -> Result<F::File> {
        self.fs.open(path)
    }

    /// Reads the whole file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open(path)?;
        if file.is_dir() {
            return Err(Error::IsADirectory);
        }
        let mut data = Vec::with_capacity(file.stat().size as usize);
        let mut chunk = [0u8; 512];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        file.close()?;
        Ok(data)
    }

    /// Lists the directory at `path`, sorted by name.
    pub fn read_dir(&self, path: &str) -> Result<Vec<Info>> {
        let mut dir = self.open(path)?;
        let mut entries = dir.readdir(0)?;
        dir.close()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Metadata for `path`.
    pub fn stat(&self, path: &str) -> Result<Info> {
        self.fs.stat(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpenFlags;
    use crate::littlefs::{LfsConfig, Littlefs};
    use tinyfs_adapters::MemoryDevice;

    fn populated() -> Littlefs {
        let mut fs = Littlefs::new(MemoryDevice::new(64, 4096, 32).unwrap());
        fs.configure(LfsConfig::default()).unwrap();
        fs.format().unwrap();
        fs.mount().unwrap();
        fs.mkdir("/etc").unwrap();
        for (name, body) in [("/etc/zeta", "z"), ("/etc/alpha", "alpha body"), ("/etc/mid", "")] {
            let mut f = fs
                .open_file(name, OpenFlags::WRITE | OpenFlags::CREATE)
                .unwrap();
            f.write(body.as_bytes()).unwrap();
            f.close().unwrap();
        }
        fs
    }

    #[test]
    fn test_read_whole_file() {
        let fs = populated();
        let view = ReadOnlyFs::new(&fs);
        assert_eq!(view.read("/etc/alpha").unwrap(), b"alpha body");
        assert!(view.read("/etc/mid").unwrap().is_empty());
        assert!(matches!(view.read("/etc"), Err(Error::IsADirectory)));
        assert!(matches!(view.read("/nope"), Err(Error::NotFound)));
    }

    #[test]
    fn test_read_dir_sorted() {
        let fs = populated();
        let view = ReadOnlyFs::new(&fs);
        let names: Vec<_> = view
            .read_dir("/etc")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
        assert_eq!(view.stat("/etc/zeta").unwrap().size, 1);
    }
}
