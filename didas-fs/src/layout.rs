//! Disk layout & data structure layer
//!
//! ```text
//! offset 0                    PartitionHeader      16 B
//! offset 16                   root EntryPointer    32 B
//! offset 48                   bitmap, one bit per block
//! next sector boundary        block 0 .. block N-1, BLOCK_SIZE each
//! ```
//!
//! Every block starts with a [`BlockHeader`] followed by either raw file data
//! or a dense array of [`EntryPointer`] records.
use core::mem::size_of;

use bitflags::bitflags;

use crate::config::{
    BLOCK_HEADER_SIZE, BLOCK_SIZE, ENTRY_SIZE, MAGIC, MAX_BLOCKS, MAX_NAME_LEN, ROOT_NAME,
    SECTOR_SIZE,
};

/// Index of a block inside the partition
pub type BlockId = u32;

/// Block holding the first entries of the root directory
pub const ROOT_BLOCK: BlockId = 0;
/// Chain terminator in `next`
pub const NO_BLOCK: BlockId = 0;

/// Device offset of the root entry pointer
pub const ROOT_ENTRY_ADDR: u64 = size_of::<PartitionHeader>() as u64;
/// Device offset of the bitmap
pub const BITMAP_ADDR: u64 = ROOT_ENTRY_ADDR + size_of::<EntryPointer>() as u64;

const _: () = assert!(size_of::<PartitionHeader>() == 16);
const _: () = assert!(size_of::<BlockHeader>() == BLOCK_HEADER_SIZE);
const _: () = assert!(size_of::<EntryPointer>() == ENTRY_SIZE);

/// Bytes needed by the bitmap of `block_count` blocks
pub fn bitmap_len(block_count: u32) -> usize {
    (block_count as usize + 7) / 8
}

/// Device offset of block 0 for a partition of `block_count` blocks
pub fn first_block_addr(block_count: u32) -> u64 {
    let end = BITMAP_ADDR + bitmap_len(block_count) as u64;
    let sector = SECTOR_SIZE as u64;
    (end + sector - 1) / sector * sector
}

/// Total bytes taken by a partition of `block_count` blocks
pub fn footprint(block_count: u32) -> u64 {
    first_block_addr(block_count) + block_count as u64 * BLOCK_SIZE as u64
}

/// View a plain-old-data on-disk record as bytes
macro_rules! impl_as_bytes {
    ($ty:ty) => {
        impl $ty {
            pub fn as_bytes(&self) -> &[u8] {
                unsafe {
                    core::slice::from_raw_parts(self as *const _ as *const u8, size_of::<$ty>())
                }
            }
            pub fn as_bytes_mut(&mut self) -> &mut [u8] {
                unsafe {
                    core::slice::from_raw_parts_mut(self as *mut _ as *mut u8, size_of::<$ty>())
                }
            }
        }
    };
}

/// Header at device offset 0
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionHeader {
    pub magic: u32,
    pub block_count: u32,
    pub reserved: u64,
}

impl PartitionHeader {
    pub fn new(block_count: u32) -> Self {
        Self {
            magic: MAGIC,
            block_count,
            reserved: 0,
        }
    }

    /// Check the header, returning the reason it is unusable
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != MAGIC {
            return Err("bad magic number");
        }
        if self.reserved != 0 {
            return Err("reserved header field is not zero");
        }
        if self.block_count == 0 || self.block_count > MAX_BLOCKS {
            return Err("block count out of range");
        }
        Ok(())
    }
}

impl_as_bytes!(PartitionHeader);

/// Header at the start of every block
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// previous block of the chain
    pub prev: BlockId,
    /// next block of the chain, [`NO_BLOCK`] at the tail
    pub next: BlockId,
    /// bytes of the data area in use
    pub used: u32,
    pub reserved: u32,
}

impl BlockHeader {
    pub fn new(prev: BlockId) -> Self {
        Self {
            prev,
            ..Self::default()
        }
    }

    pub fn is_tail(&self) -> bool {
        self.next == NO_BLOCK
    }

    /// Number of entry records in a directory block
    pub fn entry_count(&self) -> usize {
        self.used as usize / ENTRY_SIZE
    }
}

impl_as_bytes!(BlockHeader);

bitflags! {
    /// Attribute bits of an entry
    pub struct EntryFlags: u16 {
        /// entry is a directory
        const DIR = 1 << 0;
        /// entry may not be opened for writing
        const READONLY = 1 << 1;
        const SYSTEM = 1 << 2;
        const HIDDEN = 1 << 3;
    }
}

/// Directory slot naming a child file or directory
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EntryPointer {
    pub first: BlockId,
    pub last: BlockId,
    flags: u16,
    reserved: u16,
    name: [u8; MAX_NAME_LEN],
}

impl core::fmt::Debug for EntryPointer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntryPointer")
            .field("name", &self.name_lossy())
            .field("first", &self.first)
            .field("last", &self.last)
            .field("flags", &self.flags())
            .finish()
    }
}

impl EntryPointer {
    /// Empty entry, used as a read buffer
    pub fn empty() -> Self {
        Self {
            first: 0,
            last: 0,
            flags: 0,
            reserved: 0,
            name: [0u8; MAX_NAME_LEN],
        }
    }

    /// New entry whose chain is the single block `block`.
    ///
    /// Names longer than [`MAX_NAME_LEN`] bytes are truncated.
    pub fn new(name: &str, block: BlockId, flags: EntryFlags) -> Self {
        let mut bytes = [0u8; MAX_NAME_LEN];
        let len = name.len().min(MAX_NAME_LEN);
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            first: block,
            last: block,
            flags: flags.bits(),
            reserved: 0,
            name: bytes,
        }
    }

    /// The root directory entry written at format time
    pub fn root() -> Self {
        Self {
            first: ROOT_BLOCK,
            last: ROOT_BLOCK,
            flags: EntryFlags::DIR.bits(),
            reserved: 0,
            name: *ROOT_NAME,
        }
    }

    /// Stored name bytes without the padding
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        &self.name[..len]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    /// Compare with `name`, looking at no more than [`MAX_NAME_LEN`] bytes
    pub fn name_matches(&self, name: &str) -> bool {
        let name = name.as_bytes();
        let name = &name[..name.len().min(MAX_NAME_LEN)];
        self.name_bytes() == name
    }

    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: EntryFlags) {
        self.flags = flags.bits();
    }

    pub fn is_dir(&self) -> bool {
        self.flags().contains(EntryFlags::DIR)
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    pub fn is_writable(&self) -> bool {
        !self.flags().contains(EntryFlags::READONLY)
    }
}

impl_as_bytes!(EntryPointer);

/// Where an entry pointer lives: a slot of a directory block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryLoc {
    pub block: BlockId,
    pub slot: u32,
}

impl EntryLoc {
    /// Location of the root entry, stored ahead of the bitmap
    pub const ROOT: EntryLoc = EntryLoc {
        block: u32::MAX,
        slot: u32::MAX,
    };

    pub fn new(block: BlockId, slot: u32) -> Self {
        Self { block, slot }
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}
