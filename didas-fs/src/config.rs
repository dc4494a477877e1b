//! Constants of the on-disk format and runtime options of a partition

use log::LevelFilter;

/// sector size the first block is aligned to
pub const SECTOR_SIZE: usize = 512;
/// block size in bytes, header included
pub const BLOCK_SIZE: usize = 32768;
/// size of the header at the start of every block
pub const BLOCK_HEADER_SIZE: usize = 16;
/// usable bytes in a block
pub const BLOCK_DATA_SIZE: usize = BLOCK_SIZE - BLOCK_HEADER_SIZE;
/// size of a directory entry record
pub const ENTRY_SIZE: usize = 32;
/// entry records that fit in the data area of one block
pub const ENTRIES_PER_BLOCK: usize = BLOCK_DATA_SIZE / ENTRY_SIZE;
/// partition magic number
pub const MAGIC: u32 = 0x69AD_DE69;
/// longest name an entry can store
pub const MAX_NAME_LEN: usize = 20;
/// longest path accepted by any operation
pub const MAX_PATH_LEN: usize = 1024;
/// largest block count a header may declare
pub const MAX_BLOCKS: u32 = u32::MAX - 1;
/// default size of the open-handle table
pub const DEFAULT_MAX_HANDLES: usize = 64;
/// name written into the root entry
pub const ROOT_NAME: &[u8; MAX_NAME_LEN] = b"FSRoot!PlsNoTouchy:)";

/// Runtime options of an open partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOptions {
    /// capacity of the descriptor table
    pub max_handles: usize,
    /// most verbose level this partition emits
    pub log_level: LevelFilter,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            log_level: LevelFilter::Error,
        }
    }
}

impl PartitionOptions {
    pub fn with_max_handles(mut self, max_handles: usize) -> Self {
        self.max_handles = max_handles;
        self
    }

    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }
}
