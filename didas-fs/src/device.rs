//! Device adapter
//!
//! Maps block indices and entry locations to device addresses and turns every
//! transfer into an all-or-nothing operation: a read or write that moves fewer
//! bytes than asked for is an error.

use std::sync::Arc;

use log::LevelFilter;

use crate::block_dev::BlockDevice;
use crate::config::{BLOCK_HEADER_SIZE, BLOCK_SIZE, ENTRY_SIZE};
use crate::error::{DfsError, DfsResult};
use crate::layout::{BlockHeader, BlockId, EntryLoc, EntryPointer, ROOT_ENTRY_ADDR};

/// Checked access to the backing store of one partition
pub struct Device {
    dev: Arc<dyn BlockDevice>,
    /// address of block 0
    root_block_addr: u64,
    log_level: LevelFilter,
}

impl Device {
    pub fn new(dev: Arc<dyn BlockDevice>, root_block_addr: u64, log_level: LevelFilter) -> Self {
        Self {
            dev,
            root_block_addr,
            log_level,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn raw(&self) -> &Arc<dyn BlockDevice> {
        &self.dev
    }

    pub fn root_block_addr(&self) -> u64 {
        self.root_block_addr
    }

    /// Fill `buf` from `addr`
    pub fn read_at(&self, addr: u64, buf: &mut [u8]) -> DfsResult<()> {
        let len = buf.len();
        let err = || DfsError::DeviceRead { addr, len };
        if self.dev.seek(addr).is_err() {
            pt_error!(self, "seek to {:#x} failed", addr);
            return Err(err());
        }
        match self.dev.read(buf) {
            Ok(n) if n == len => Ok(()),
            Ok(n) => {
                pt_error!(self, "short read at {:#x}: {} of {} bytes", addr, n, len);
                Err(err())
            }
            Err(e) => {
                pt_error!(self, "read at {:#x} failed: {}", addr, e);
                Err(err())
            }
        }
    }

    /// Write all of `buf` at `addr`
    pub fn write_at(&self, addr: u64, buf: &[u8]) -> DfsResult<()> {
        let len = buf.len();
        let err = || DfsError::DeviceWrite { addr, len };
        if self.dev.seek(addr).is_err() {
            pt_error!(self, "seek to {:#x} failed", addr);
            return Err(err());
        }
        match self.dev.write(buf) {
            Ok(n) if n == len => Ok(()),
            Ok(n) => {
                pt_error!(self, "short write at {:#x}: {} of {} bytes", addr, n, len);
                Err(err())
            }
            Err(e) => {
                pt_error!(self, "write at {:#x} failed: {}", addr, e);
                Err(err())
            }
        }
    }

    pub fn sync(&self) -> DfsResult<()> {
        self.dev.sync().map_err(|e| {
            pt_error!(self, "device sync failed: {}", e);
            DfsError::DeviceWrite { addr: 0, len: 0 }
        })
    }

    pub fn block_addr(&self, block: BlockId) -> u64 {
        self.root_block_addr + block as u64 * BLOCK_SIZE as u64
    }

    /// Address of byte `offset` of the data area of `block`
    pub fn block_offset_addr(&self, block: BlockId, offset: usize) -> u64 {
        self.block_addr(block) + (BLOCK_HEADER_SIZE + offset) as u64
    }

    pub fn entry_loc_addr(&self, loc: EntryLoc) -> u64 {
        if loc.is_root() {
            ROOT_ENTRY_ADDR
        } else {
            self.block_offset_addr(loc.block, loc.slot as usize * ENTRY_SIZE)
        }
    }

    pub fn read_header(&self, block: BlockId) -> DfsResult<BlockHeader> {
        let mut header = BlockHeader::default();
        self.read_at(self.block_addr(block), header.as_bytes_mut())?;
        Ok(header)
    }

    pub fn write_header(&self, block: BlockId, header: &BlockHeader) -> DfsResult<()> {
        self.write_at(self.block_addr(block), header.as_bytes())
    }

    pub fn read_entry(&self, loc: EntryLoc) -> DfsResult<EntryPointer> {
        let mut entry = EntryPointer::empty();
        self.read_at(self.entry_loc_addr(loc), entry.as_bytes_mut())?;
        Ok(entry)
    }

    pub fn write_entry(&self, loc: EntryLoc, entry: &EntryPointer) -> DfsResult<()> {
        self.write_at(self.entry_loc_addr(loc), entry.as_bytes())
    }

    /// Read the data area of `block`, return its header and the bytes in use
    pub fn read_block_data(&self, block: BlockId, data: &mut [u8]) -> DfsResult<BlockHeader> {
        let header = self.read_header(block)?;
        let used = (header.used as usize).min(data.len());
        if used > 0 {
            self.read_at(self.block_offset_addr(block, 0), &mut data[..used])?;
        }
        Ok(header)
    }
}
