//! Free-space bitmap
//!
//! One bit per block, 0 means free and 1 means allocated. The whole map is
//! loaded at mount time, mutated in memory and written back in one piece by
//! [`Bitmap::flush`]. Single bits are never written to the device on their own.
use crate::device::Device;
use crate::error::{DfsError, DfsResult};
use crate::layout::{bitmap_len, BlockId, BITMAP_ADDR};

/// In-memory copy of the block allocation map
pub struct Bitmap {
    bits: Vec<u8>,
    blocks: u32,
}

/// Decompose a block index into (byte_pos, inner_pos)
fn decomposition(block: BlockId) -> (usize, u8) {
    ((block / 8) as usize, (block % 8) as u8)
}

impl Bitmap {
    /// All-free map of `blocks` bits
    pub fn new(blocks: u32) -> DfsResult<Self> {
        let len = bitmap_len(blocks);
        let mut bits = Vec::new();
        bits.try_reserve_exact(len).map_err(|_| DfsError::Alloc)?;
        bits.resize(len, 0);
        Ok(Self { bits, blocks })
    }

    /// Load the map of a `blocks`-block partition from the device
    pub fn load(device: &Device, blocks: u32) -> DfsResult<Self> {
        let mut bitmap = Self::new(blocks)?;
        device.read_at(BITMAP_ADDR, &mut bitmap.bits)?;
        Ok(bitmap)
    }

    /// Are any of the padding bits past the last block set
    pub fn padding_used(&self) -> bool {
        let tail = self.blocks % 8;
        match self.bits.last() {
            Some(&byte) if tail != 0 => byte >> tail != 0,
            _ => false,
        }
    }

    pub fn get_used(&self, block: BlockId) -> DfsResult<bool> {
        if block >= self.blocks {
            return Err(DfsError::InvalidArguments("block index out of range"));
        }
        let (byte_pos, inner_pos) = decomposition(block);
        Ok(self.bits[byte_pos] & (1u8 << inner_pos) != 0)
    }

    pub fn set_used(&mut self, block: BlockId, used: bool) -> DfsResult<()> {
        if block >= self.blocks {
            return Err(DfsError::InvalidArguments("block index out of range"));
        }
        let (byte_pos, inner_pos) = decomposition(block);
        if used {
            self.bits[byte_pos] |= 1u8 << inner_pos;
        } else {
            self.bits[byte_pos] &= !(1u8 << inner_pos);
        }
        Ok(())
    }

    /// Write the whole map back to its place on the device
    pub fn flush(&self, device: &Device) -> DfsResult<()> {
        device.write_at(BITMAP_ADDR, &self.bits)
    }

    /// Lowest free block index
    pub fn find_free(&self) -> DfsResult<BlockId> {
        self.bits
            .iter()
            .enumerate()
            .find(|(_, byte)| **byte != u8::MAX)
            .map(|(byte_pos, byte)| byte_pos as u32 * 8 + byte.trailing_ones())
            // mount rejects maps with padding bits set
            .filter(|&block| block < self.blocks)
            .ok_or(DfsError::NoSpace)
    }

    pub fn count_free(&self) -> u32 {
        let used: u32 = self.bits.iter().map(|byte| byte.count_ones()).sum();
        self.blocks - used
    }
}
