//! Block-chain allocator
//!
//! Files and directories store their data in a forward-linked chain of
//! blocks. The owner entry records the first and last block so the tail can be
//! reached without walking the chain.
use crate::config::{BLOCK_DATA_SIZE, ENTRY_SIZE};
use crate::error::{DfsError, DfsResult};
use crate::layout::{BlockHeader, BlockId, EntryLoc, EntryPointer};
use crate::partition::Partition;

impl Partition {
    /// Take the lowest free block and persist the bitmap
    pub(crate) fn reserve_block(&mut self) -> DfsResult<BlockId> {
        let block = self.bitmap.find_free().map_err(|e| {
            pt_warn!(self, "no free block left");
            e
        })?;
        self.bitmap.set_used(block, true)?;
        if let Err(e) = self.bitmap.flush(&self.device) {
            self.bitmap.set_used(block, false)?;
            return Err(e);
        }
        pt_trace!(self, "reserved block {}", block);
        Ok(block)
    }

    /// Give back a block taken by [`Partition::reserve_block`]
    pub(crate) fn release_block(&mut self, block: BlockId) -> DfsResult<()> {
        self.bitmap.set_used(block, false)?;
        self.bitmap.flush(&self.device)?;
        pt_trace!(self, "released block {}", block);
        Ok(())
    }

    /// Link a fresh block at the tail of the chain owned by the entry at `owner`.
    ///
    /// Steps run in this order: reserve the block, point the owner entry at
    /// it, initialise its header, then link the old tail forward. Stopping
    /// after the second step leaves an allocated block the chain does not
    /// reach yet, never a link to an uninitialised block.
    pub(crate) fn append_block(&mut self, owner: EntryLoc) -> DfsResult<BlockId> {
        let block = self.reserve_block()?;

        let mut entry = match self.device.read_entry(owner) {
            Ok(entry) => entry,
            Err(e) => {
                self.release_block(block)?;
                return Err(e);
            }
        };
        let old_last = entry.last;
        entry.last = block;
        if let Err(e) = self.device.write_entry(owner, &entry) {
            self.release_block(block)?;
            return Err(e);
        }

        self.device.write_header(block, &BlockHeader::new(old_last))?;
        let mut tail = self.device.read_header(old_last)?;
        tail.next = block;
        self.device.write_header(old_last, &tail)?;

        pt_debug!(
            self,
            "chain of {:?} grew: {} -> {}",
            entry.name_lossy(),
            old_last,
            block
        );
        Ok(block)
    }

    /// Store `entry` in the first free slot of the directory at `dir`
    pub(crate) fn append_entry_to_dir(
        &mut self,
        dir: EntryLoc,
        entry: &EntryPointer,
    ) -> DfsResult<EntryLoc> {
        let dir_entry = self.device.read_entry(dir)?;
        let mut block = dir_entry.last;
        let mut header = self.device.read_header(block)?;
        if header.used as usize + ENTRY_SIZE > BLOCK_DATA_SIZE {
            block = self.append_block(dir)?;
            header = self.device.read_header(block)?;
        }

        let slot = header.entry_count() as u32;
        self.device.write_at(
            self.device.block_offset_addr(block, header.used as usize),
            entry.as_bytes(),
        )?;
        header.used += ENTRY_SIZE as u32;
        self.device.write_header(block, &header)?;
        Ok(EntryLoc::new(block, slot))
    }

    /// Visit every block of the chain starting at `first`, in order
    pub(crate) fn walk_chain(
        &self,
        first: BlockId,
        mut f: impl FnMut(BlockId, &BlockHeader) -> DfsResult<()>,
    ) -> DfsResult<()> {
        let mut block = first;
        // a sound chain is never longer than the partition
        for _ in 0..self.block_count() {
            self.check_block(block)?;
            let header = self.device.read_header(block)?;
            f(block, &header)?;
            if header.is_tail() {
                return Ok(());
            }
            block = header.next;
        }
        pt_error!(self, "chain starting at {} loops", first);
        Err(DfsError::CorruptedPartition("block chain loops"))
    }

    /// Bytes stored in the chain starting at `first`
    pub(crate) fn chain_size(&self, first: BlockId) -> DfsResult<u64> {
        let mut size = 0u64;
        self.walk_chain(first, |_, header| {
            size += header.used as u64;
            Ok(())
        })?;
        Ok(size)
    }

    pub(crate) fn check_block(&self, block: BlockId) -> DfsResult<()> {
        if block >= self.block_count() {
            pt_error!(self, "block index {} past end of partition", block);
            return Err(DfsError::CorruptedPartition("block index out of range"));
        }
        Ok(())
    }
}
