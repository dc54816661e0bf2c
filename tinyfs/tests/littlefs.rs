//! littlefs volumes on memory-backed devices.

use anyhow::Result;
use tinyfs::littlefs::{LfsConfig, Littlefs};
use tinyfs::{Error, File, Filesystem, OpenFlags, ReadOnlyFs, SeekFrom};
use tinyfs_adapters::MemoryDevice;

const PAGE_SIZE: usize = 64;
const BLOCK_SIZE: usize = 256;
const BLOCK_COUNT: usize = 2048;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_fs(page: usize, block: usize, count: usize) -> Result<Littlefs> {
    init();
    let mut fs = Littlefs::new(MemoryDevice::new(page, block, count)?);
    fs.configure(LfsConfig::default())?;
    fs.format()?;
    fs.mount()?;
    Ok(fs)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn write_file(fs: &Littlefs, path: &str, data: &[u8]) -> Result<()> {
    let mut file = fs.open_file(path, OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE)?;
    for chunk in data.chunks(1000) {
        assert_eq!(file.write(chunk)?, chunk.len());
    }
    file.close()?;
    Ok(())
}

fn read_file(fs: &Littlefs, path: &str) -> Result<Vec<u8>> {
    let mut file = fs.open(path)?;
    let mut data = Vec::new();
    let mut chunk = [0u8; 333];
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

#[test]
fn format_mount_write_read_scenario() -> Result<()> {
    let mut fs = create_fs(64, 4096, 64)?;
    fs.mkdir("/tmp")?;

    let mut file = fs.open_file("/tmp/test.txt", OpenFlags::WRITE | OpenFlags::CREATE)?;
    for _ in 0..20 {
        assert_eq!(file.write(b"0123456789abcdef\r\n")?, 18);
    }
    file.close()?;

    let info = fs.stat("/tmp/test.txt")?;
    assert_eq!(info.size, 360);
    assert!(!info.is_dir());

    let mut file = fs.open("/tmp/test.txt")?;
    let mut total = 0;
    let mut chunk = [0u8; 57];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    file.close()?;
    assert_eq!(total, 360);

    fs.unmount()?;
    Ok(())
}

#[test]
fn mount_unformatted_is_corrupt() -> Result<()> {
    init();
    let mut fs = Littlefs::new(MemoryDevice::new(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?);
    fs.configure(LfsConfig::default())?;
    assert!(matches!(fs.mount(), Err(Error::Corrupt)));
    fs.format()?;
    fs.mount()?;
    Ok(())
}

#[test]
fn expanding_superblock() -> Result<()> {
    let mut fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    for _ in 0..100 {
        fs.mkdir("dummy")?;
        fs.remove("dummy")?;
    }
    fs.unmount()?;
    fs.mount()?;
    fs.mkdir("dummy")?;
    Ok(())
}

#[test]
fn file_sizes_round_trip() -> Result<()> {
    let fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    for (name, size) in [
        ("noavocado", 0),
        ("smallavocado", 32),
        ("mediumavocado", 8192),
        ("largeavocado", 262144),
    ] {
        let data = pattern(size, size as u8);
        write_file(&fs, name, &data)?;
        assert_eq!(fs.stat(name)?.size, size as u64);
        assert_eq!(read_file(&fs, name)?, data, "{} differs", name);
    }
    Ok(())
}

#[test]
fn empty_file_stat() -> Result<()> {
    let fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    let mut file = fs.open_file("/empty", OpenFlags::WRITE | OpenFlags::CREATE)?;
    file.close()?;
    let info = fs.stat("/empty")?;
    assert_eq!(info.size, 0);
    assert!(!info.is_dir());
    assert_eq!(info.name, "empty");
    Ok(())
}

#[test]
fn free_space_shrinks_until_full() -> Result<()> {
    let fs = create_fs(64, 4096, 64)?;
    let chunk = pattern(8192, 7);
    let mut previous = fs.free()?;
    assert!(previous > 0);

    let mut filled = false;
    for i in 0..64 {
        let mut file = match fs.open_file(&format!("/fill{}", i), OpenFlags::WRITE | OpenFlags::CREATE) {
            Ok(file) => file,
            Err(Error::NoSpace) => {
                filled = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };
        let written = file.write(&chunk);
        let closed = file.close();
        match (written, closed) {
            (Ok(_), Ok(())) => {}
            (Err(Error::NoSpace), _) | (_, Err(Error::NoSpace)) => {
                filled = true;
                break;
            }
            (Err(e), _) | (_, Err(e)) => return Err(e.into()),
        }
        let free = fs.free()?;
        assert!(free <= previous, "free grew from {} to {}", previous, free);
        previous = free;
    }
    assert!(filled, "volume never reported NoSpace");
    Ok(())
}

#[test]
fn directories_and_readdir() -> Result<()> {
    let mut fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    let mut root = fs.open("/")?;
    assert!(root.is_dir());
    root.close()?;

    fs.mkdir("potato")?;
    assert!(matches!(fs.mkdir("potato"), Err(Error::AlreadyExists)));
    write_file(&fs, "burrito", b"beans")?;
    write_file(&fs, "potato/fries", b"salt")?;

    let view = ReadOnlyFs::new(&fs);
    let names: Vec<_> = view.read_dir("/")?.into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["burrito", "potato"]);
    assert_eq!(view.read("/potato/fries")?, b"salt");

    assert!(matches!(fs.remove("potato"), Err(Error::DirectoryNotEmpty)));
    fs.rename("potato/fries", "chips")?;
    fs.remove("potato")?;
    assert!(matches!(fs.stat("potato"), Err(Error::NotFound)));
    assert_eq!(read_file(&fs, "chips")?, b"salt");
    Ok(())
}

#[test]
fn append_and_seek() -> Result<()> {
    let fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    write_file(&fs, "log", b"first")?;

    let mut file = fs.open_file("log", OpenFlags::WRITE | OpenFlags::APPEND)?;
    file.write(b" second")?;
    file.close()?;
    assert_eq!(read_file(&fs, "log")?, b"first second");

    let mut file = fs.open("log")?;
    assert_eq!(file.seek(SeekFrom::End(-6))?, 6);
    let mut buf = [0u8; 6];
    assert_eq!(file.read(&mut buf)?, 6);
    assert_eq!(&buf, b"second");
    Ok(())
}

#[test]
fn handles_go_stale_on_unmount() -> Result<()> {
    let mut fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    let mut file = fs.open_file("stale", OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE)?;
    file.write(b"data")?;
    file.sync()?;

    fs.unmount()?;
    assert!(matches!(file.read(&mut [0u8; 4]), Err(Error::BadHandle)));
    assert!(matches!(fs.stat("stale"), Err(Error::NotMounted)));

    fs.mount()?;
    assert!(matches!(file.size(), Err(Error::BadHandle)));
    assert_eq!(fs.stat("stale")?.size, 4);
    Ok(())
}

#[test]
fn unmount_flushes_open_files() -> Result<()> {
    let mut fs = create_fs(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?;
    let data = pattern(100, 3);
    let mut file = fs.open_file("pending", OpenFlags::WRITE | OpenFlags::CREATE)?;
    assert_eq!(file.write(&data)?, data.len());

    let mut log = fs.open_file("log", OpenFlags::WRITE | OpenFlags::CREATE)?;
    log.write(b"kept")?;
    log.close()?;

    fs.unmount()?;
    assert!(matches!(file.close(), Err(Error::BadHandle)));
    drop(file);

    fs.mount()?;
    assert_eq!(fs.stat("pending")?.size, 100);
    assert_eq!(read_file(&fs, "pending")?, data);
    assert_eq!(read_file(&fs, "log")?, b"kept");
    Ok(())
}

#[test]
fn operations_require_mount() -> Result<()> {
    init();
    let mut fs = Littlefs::new(MemoryDevice::new(PAGE_SIZE, BLOCK_SIZE, BLOCK_COUNT)?);
    fs.configure(LfsConfig::default())?;
    fs.format()?;
    assert!(matches!(fs.open("/"), Err(Error::NotMounted)));
    assert!(matches!(fs.free(), Err(Error::NotMounted)));
    fs.mount()?;
    assert!(matches!(fs.mount(), Err(Error::AlreadyMounted)));
    assert!(matches!(fs.configure(LfsConfig::default()), Err(Error::AlreadyMounted)));
    assert!(matches!(fs.format(), Err(Error::AlreadyMounted)));
    Ok(())
}
