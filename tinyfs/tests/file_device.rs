//! Both engines on file-backed devices, including reopening the image.

use anyhow::Result;
use tinyfs::fat::{FatConfig, FatFs};
use tinyfs::littlefs::{LfsConfig, Littlefs};
use tinyfs::{Error, File, Filesystem, OpenFlags};
use tinyfs_adapters::FileDevice;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_text<F: Filesystem>(fs: &F, path: &str, text: &str) -> Result<()> {
    let mut file = fs.open_file(path, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)?;
    file.write(text.as_bytes())?;
    file.close()?;
    Ok(())
}

#[test]
fn littlefs_image_persists() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("lfs.img");

    {
        let mut fs = Littlefs::new(FileDevice::create(&image, 64, 4096, 32)?);
        fs.configure(LfsConfig::default())?;
        fs.format()?;
        fs.mount()?;
        fs.mkdir("/cfg")?;
        write_text(&fs, "/cfg/name", "tinyfs")?;
        fs.unmount()?;
    }

    assert_eq!(std::fs::metadata(&image)?.len(), 32 * 4096);

    let mut fs = Littlefs::new(FileDevice::create(&image, 64, 4096, 32)?);
    fs.configure(LfsConfig::default())?;
    fs.mount()?;
    let info = fs.stat("/cfg/name")?;
    assert_eq!(info.size, 6);
    let mut file = fs.open("/cfg/name")?;
    let mut buf = [0u8; 16];
    let n = file.read(&mut buf)?;
    assert_eq!(&buf[..n], b"tinyfs");
    Ok(())
}

#[test]
fn fat_image_persists() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("fat.img");

    {
        let mut fs = FatFs::new(FileDevice::create(&image, 512, 4096, 128)?);
        fs.configure(FatConfig::default())?;
        fs.format()?;
        fs.mount()?;
        write_text(&fs, "/readme.txt", "hello fat")?;
        // Dropping a mounted volume unmounts it
    }

    let mut fs = FatFs::new(FileDevice::create(&image, 512, 4096, 128)?);
    fs.configure(FatConfig::default())?;
    fs.mount()?;
    assert_eq!(fs.stat("/README.TXT")?.size, 9);
    Ok(())
}

#[test]
fn blank_image_is_not_a_volume() -> Result<()> {
    init();
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("blank.img");

    let mut lfs = Littlefs::new(FileDevice::create(&image, 64, 4096, 16)?);
    lfs.configure(LfsConfig::default())?;
    assert!(matches!(lfs.mount(), Err(Error::Corrupt)));
    drop(lfs);

    let mut fat = FatFs::new(FileDevice::create(&image, 64, 4096, 16)?);
    fat.configure(FatConfig::default())?;
    assert!(matches!(fat.mount(), Err(Error::Corrupt)));
    Ok(())
}
