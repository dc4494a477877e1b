//! didas-fs
//!
//! didas-fs is a single-file embedded file system: it carves a flat file (or
//! any seekable byte device) into fixed-size blocks and keeps directories,
//! files and a free-space bitmap on top of them.
//!
//! The on-disk format is described by [`layout`]: a small [`PartitionHeader`],
//! the root [`EntryPointer`], the bitmap, then the blocks. Files and
//! directories are forward-linked chains of blocks; directory blocks hold
//! packed entry pointers.
//!
//! The crate is divided into the following levels, from bottom to top:
//!
//! - Raw device interface layer ([`BlockDevice`])
//! - Device adapter layer, address mapping and checked transfers
//! - Disk layout & data structure layer
//! - Free-space bitmap layer
//! - Partition layer: format, mount and block-chain management
//! - Directory and file handle layer
//!
//! ```no_run
//! use didas_fs::{OpenFlags, Partition};
//!
//! Partition::create("disk.img", 1 << 20)?;
//! let mut pt = Partition::open("disk.img")?;
//! pt.make_file("a.txt")?;
//! let fd = pt.open_file("a.txt", OpenFlags::WRITE)?;
//! pt.write(fd, b"hello")?;
//! pt.close_file(fd)?;
//! pt.close()?;
//! # Ok::<(), didas_fs::DfsError>(())
//! ```

#[macro_use]
mod logging;

pub mod bitmap;
pub mod block_dev;
mod chain;
pub mod config;
pub mod device;
mod dir;
pub mod error;
mod file;
pub mod layout;
mod partition;
pub mod path;
mod scan;

pub use block_dev::{BlockDevice, FileDevice, MemoryDevice};
pub use config::{PartitionOptions, BLOCK_DATA_SIZE, BLOCK_SIZE};
pub use dir::DirEntry;
pub use error::{DfsError, DfsResult};
pub use file::{Descriptor, FileHandle, OpenFlags, Whence};
pub use layout::{EntryFlags, EntryLoc, EntryPointer, PartitionHeader};
pub use partition::Partition;
pub use scan::ScanReport;
