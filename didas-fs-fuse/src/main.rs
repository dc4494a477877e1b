use std::fs::{read_dir, File};
use std::io::{self, Read};
use std::path::Path;
use std::process;

use clap::{value_t, App, Arg};
use didas_fs::{DfsError, OpenFlags, Partition, PartitionOptions};
use log::{info, warn};
use thiserror::Error;

mod logging;

const MIB: u64 = 1 << 20;
/// Longest name an entry keeps
const NAME_LEN: usize = 20;

/// Failure of the packer: either the partition or the host side
#[derive(Debug, Error)]
enum PackError {
    #[error("{0}")]
    Fs(#[from] DfsError),
    #[error("host: {0}")]
    Host(#[from] io::Error),
}

impl PackError {
    fn code(&self) -> i32 {
        match self {
            PackError::Fs(e) => e.code(),
            PackError::Host(_) => 1,
        }
    }
}

fn main() {
    logging::init();
    if let Err(e) = fs_pack() {
        eprintln!("didas-fs-fuse: {}", e);
        process::exit(e.code());
    }
}

fn fs_pack() -> Result<(), PackError> {
    let matches = App::new("DidasFS packer")
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .required(true)
                .help("Partition image file"),
        )
        .arg(
            Arg::with_name("size")
                .short("s")
                .long("size")
                .takes_value(true)
                .default_value("32")
                .help("Partition size in MiB"),
        )
        .arg(
            Arg::with_name("source")
                .short("d")
                .long("source")
                .takes_value(true)
                .help("Host directory packed into the image"),
        )
        .arg(
            Arg::with_name("list")
                .short("l")
                .long("list")
                .help("Print the tree of the image"),
        )
        .get_matches();

    let size = value_t!(matches, "size", u64).unwrap_or_else(|e| e.exit());
    let image = matches.value_of("image").unwrap_or_default();
    let options = PartitionOptions::default().with_log_level(log::max_level());

    let list_only = matches.is_present("list") && !matches.is_present("source");
    if !list_only {
        let total = size.checked_mul(MIB).ok_or(DfsError::InvalidArguments(
            "partition size overflows",
        ))?;
        Partition::create(image, total)?;
        info!("formatted {} ({} MiB)", image, size);
    }

    let mut pt = Partition::open_with(image, options)?;
    if let Some(src) = matches.value_of("source") {
        let (dirs, files) = pack_dir(&mut pt, Path::new(src), "")?;
        info!("packed {} directories and {} files from {}", dirs, files, src);
        let report = pt.scan()?;
        if !report.is_clean() {
            warn!("image is inconsistent after packing: {:?}", report);
        }
    }
    if matches.is_present("list") {
        println!("/");
        print_tree(&pt, "", 1)?;
        println!(
            "{} of {} blocks free",
            pt.free_blocks(),
            pt.block_count()
        );
    }
    pt.close()?;
    Ok(())
}

/// Copy the host directory `host` into the partition directory `prefix`.
/// Returns the number of directories and files created.
fn pack_dir(pt: &mut Partition, host: &Path, prefix: &str) -> Result<(usize, usize), PackError> {
    let mut children = read_dir(host)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|entry| entry.file_name());

    let (mut dirs, mut files) = (0, 0);
    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        if name.len() > NAME_LEN {
            warn!("{:?} is longer than {} bytes and will be truncated", name, NAME_LEN);
        }
        let target = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        let file_type = child.file_type()?;
        if file_type.is_dir() {
            pt.make_dir(&target)?;
            let (d, f) = pack_dir(pt, &child.path(), &target)?;
            dirs += d + 1;
            files += f;
        } else if file_type.is_file() {
            let mut data = Vec::new();
            File::open(child.path())?.read_to_end(&mut data)?;
            pt.make_file(&target)?;
            if !data.is_empty() {
                let fd = pt.open_file(&target, OpenFlags::WRITE)?;
                pt.write(fd, &data)?;
                pt.close_file(fd)?;
            }
            info!("{} <- {} bytes", target, data.len());
            files += 1;
        } else {
            warn!("skipping {:?}: not a regular file or directory", child.path());
        }
    }
    Ok((dirs, files))
}

/// Print the subtree under `path`, one entry per line
fn print_tree(pt: &Partition, path: &str, depth: usize) -> Result<(), DfsError> {
    let count = pt.entry_count(path)?;
    if count == 0 {
        return Ok(());
    }
    for entry in pt.list_dir(path, count)? {
        let indent = "  ".repeat(depth);
        if entry.is_dir {
            println!("{}{}/", indent, entry.name);
            let child = format!("{}/{}", path, entry.name);
            print_tree(pt, &child, depth + 1)?;
        } else {
            let flag = if entry.read_only { " (ro)" } else { "" };
            println!("{}{} {}{}", indent, entry.name, entry.size, flag);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use didas_fs::{Whence, BLOCK_DATA_SIZE, BLOCK_SIZE};
    use rand::{Rng, RngCore};

    use super::*;

    /// Scratch path under the system temp directory, removed on drop
    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "didas-fs-{}-{}-{}",
                name,
                process::id(),
                rand::thread_rng().gen::<u32>()
            ));
            Scratch(path)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
            let _ = fs::remove_file(&self.0);
        }
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }

    fn read_all(pt: &mut Partition, path: &str) -> Vec<u8> {
        let fd = pt.open_file(path, OpenFlags::READ).unwrap();
        let mut data = vec![0u8; pt.stat(path).unwrap().size as usize + 1];
        let n = pt.read(fd, &mut data).unwrap();
        pt.close_file(fd).unwrap();
        data.truncate(n);
        data
    }

    #[test]
    fn hello_on_image_file() {
        let image = Scratch::new("hello");
        Partition::create(&image.0, MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        pt.make_file("a.txt").unwrap();
        let fd = pt.open_file("a.txt", OpenFlags::WRITE).unwrap();
        assert_eq!(pt.write(fd, b"hello").unwrap(), 5);
        pt.close_file(fd).unwrap();

        let fd2 = pt.open_file("a.txt", OpenFlags::READ).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(pt.read(fd2, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(pt.read(fd2, &mut [0u8; 8]).unwrap(), 0);
        pt.close().unwrap();

        // survives a remount
        let mut pt = Partition::open(&image.0).unwrap();
        assert_eq!(read_all(&mut pt, "a.txt"), b"hello");
        pt.close().unwrap();
    }

    #[test]
    fn pack_and_read_back() {
        let src = Scratch::new("src");
        fs::create_dir_all(src.0.join("bin")).unwrap();
        fs::create_dir_all(src.0.join("etc/conf.d")).unwrap();
        let big = random_bytes(2 * BLOCK_DATA_SIZE + 777);
        let small = random_bytes(100);
        fs::write(src.0.join("bin/big"), &big).unwrap();
        fs::write(src.0.join("etc/conf.d/small"), &small).unwrap();
        fs::write(src.0.join("empty"), b"").unwrap();

        let image = Scratch::new("packed");
        Partition::create(&image.0, 4 * MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        let (dirs, files) = pack_dir(&mut pt, &src.0, "").unwrap();
        assert_eq!((dirs, files), (3, 3));
        pt.close().unwrap();

        let mut pt = Partition::open(&image.0).unwrap();
        let names: Vec<_> = pt
            .list_dir("/", 8)
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, ["bin", "empty", "etc"]);
        assert_eq!(read_all(&mut pt, "bin/big"), big);
        assert_eq!(read_all(&mut pt, "/etc/conf.d/small"), small);
        assert_eq!(pt.stat("empty").unwrap().size, 0);
        assert!(pt.scan().unwrap().is_clean());
        print_tree(&pt, "", 0).unwrap();
        pt.close().unwrap();
    }

    #[test]
    fn random_round_trips() {
        let image = Scratch::new("random");
        Partition::create(&image.0, 8 * MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        let mut rng = rand::thread_rng();
        let mut expected = Vec::new();
        for i in 0..8 {
            let path = format!("file{}", i);
            let data = random_bytes(rng.gen_range(1..3 * BLOCK_DATA_SIZE));
            pt.make_file(&path).unwrap();
            let fd = pt.open_file(&path, OpenFlags::WRITE).unwrap();
            // write in random pieces
            let mut offset = 0;
            while offset < data.len() {
                let len = rng.gen_range(1..=data.len() - offset);
                assert_eq!(pt.write(fd, &data[offset..offset + len]).unwrap(), len);
                offset += len;
            }
            pt.close_file(fd).unwrap();
            expected.push((path, data));
        }
        pt.close().unwrap();

        let mut pt = Partition::open(&image.0).unwrap();
        for (path, data) in &expected {
            assert_eq!(&read_all(&mut pt, path), data);
        }
        pt.close().unwrap();
    }

    #[test]
    fn overwrite_in_the_middle() {
        let image = Scratch::new("overwrite");
        Partition::create(&image.0, MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        pt.make_file("f").unwrap();
        let mut data = random_bytes(BLOCK_DATA_SIZE + 4000);
        let fd = pt.open_file("f", OpenFlags::RDWR).unwrap();
        pt.write(fd, &data).unwrap();

        let patch = random_bytes(3000);
        let at = BLOCK_DATA_SIZE - 1000;
        pt.seek(fd, at as i64, Whence::Set).unwrap();
        pt.write(fd, &patch).unwrap();
        data[at..at + patch.len()].copy_from_slice(&patch);
        assert_eq!(pt.tell(fd).unwrap(), (at + patch.len()) as u64);
        pt.close_file(fd).unwrap();

        assert_eq!(pt.stat("f").unwrap().size, data.len() as u64);
        assert_eq!(read_all(&mut pt, "f"), data);
    }

    #[test]
    fn free_block_accounting() {
        let image = Scratch::new("full");
        let blocks = 10u32;
        Partition::create(&image.0, Partition::footprint(blocks)).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        assert_eq!(pt.block_count(), blocks);
        for i in 0..blocks - 1 {
            if i % 2 == 0 {
                pt.make_file(&format!("f{}", i)).unwrap();
            } else {
                pt.make_dir(&format!("d{}", i)).unwrap();
            }
        }
        assert_eq!(pt.free_blocks(), 0);
        assert!(matches!(pt.make_file("last"), Err(DfsError::NoSpace)));
        assert_eq!(pt.entry_count("/").unwrap(), blocks as usize - 1);
        pt.close().unwrap();

        let pt = Partition::open(&image.0).unwrap();
        assert_eq!(pt.free_blocks(), 0);
        pt.close().unwrap();
    }

    #[test]
    fn duplicate_names() {
        let image = Scratch::new("dups");
        Partition::create(&image.0, MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        pt.make_dir("x").unwrap();
        assert!(matches!(pt.make_dir("x"), Err(DfsError::AlreadyExists)));
        assert!(matches!(pt.make_file("x"), Err(DfsError::AlreadyExists)));
        pt.make_file("x/y").unwrap();
        assert!(matches!(pt.make_dir("/x/y"), Err(DfsError::AlreadyExists)));
        let listing = pt.list_dir("", 10).unwrap();
        assert_eq!(listing.iter().filter(|e| e.name == "x").count(), 1);
        pt.close().unwrap();
    }

    #[test]
    fn corrupted_images_are_rejected() {
        for (addr, byte) in [(0usize, 0u8), (9, 1)] {
            let image = Scratch::new("corrupt");
            Partition::create(&image.0, MIB).unwrap();
            let mut raw = fs::read(&image.0).unwrap();
            raw[addr] = byte;
            fs::write(&image.0, &raw).unwrap();
            assert!(matches!(
                Partition::open(&image.0),
                Err(DfsError::CorruptedPartition(_))
            ));
        }

        let image = Scratch::new("short");
        fs::write(&image.0, vec![0u8; BLOCK_SIZE]).unwrap();
        assert!(matches!(
            Partition::open(&image.0),
            Err(DfsError::CorruptedPartition(_))
        ));
    }

    #[test]
    fn pack_errors_keep_their_codes() {
        let image = Scratch::new("errors");
        Partition::create(&image.0, MIB).unwrap();
        let mut pt = Partition::open(&image.0).unwrap();
        let missing = Scratch::new("missing-dir");
        let err = pack_dir(&mut pt, &missing.0, "").unwrap_err();
        assert!(matches!(err, PackError::Host(_)));
        assert_eq!(err.code(), 1);
        assert!(err.to_string().starts_with("host: "));

        pt.make_file("f").unwrap();
        let err = PackError::from(pt.make_file("f").unwrap_err());
        assert!(matches!(err, PackError::Fs(DfsError::AlreadyExists)));
        assert_eq!(err.code(), 16);
        assert_eq!(err.to_string(), "object already exists");
    }

    #[test]
    fn create_rejects_tiny_sizes() {
        let image = Scratch::new("tiny");
        let min = Partition::footprint(1);
        assert!(matches!(
            Partition::create(&image.0, min - 1),
            Err(DfsError::InvalidArguments(_))
        ));
        assert!(!image.0.exists());
        Partition::create(&image.0, min).unwrap();
        assert_eq!(fs::metadata(&image.0).unwrap().len(), min);
    }
}
