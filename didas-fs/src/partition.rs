//! Partition manager
//!
//! [`Partition`] owns the device, the in-memory [`Bitmap`] and the table of
//! open file handles. Formatting lays out a fresh partition on a device,
//! mounting validates one and brings it up.
use std::path::Path as HostPath;
use std::sync::Arc;

use log::LevelFilter;

use crate::bitmap::Bitmap;
use crate::block_dev::{BlockDevice, FileDevice};
use crate::config::{PartitionOptions, MAX_BLOCKS};
use crate::device::Device;
use crate::error::{DfsError, DfsResult};
use crate::file::FileHandle;
use crate::layout::{
    bitmap_len, first_block_addr, footprint, BlockHeader, EntryLoc, EntryPointer,
    PartitionHeader, ROOT_BLOCK,
};

/// Binary search rounds before giving up on sizing a partition
const MAX_SIZE_ROUNDS: usize = 64;

/// A mounted partition
pub struct Partition {
    pub(crate) device: Device,
    block_count: u32,
    pub(crate) bitmap: Bitmap,
    /// slot index is the descriptor
    pub(crate) handles: Vec<Option<FileHandle>>,
    options: PartitionOptions,
    closed: bool,
}

impl Partition {
    /// Format the file at `path` into a partition of at most `total_size` bytes.
    ///
    /// The file is created if missing and truncated otherwise.
    pub fn create<P: AsRef<HostPath>>(path: P, total_size: u64) -> DfsResult<()> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DfsError::InvalidArguments("empty partition path"));
        }
        // reject bad sizes before truncating anything
        Self::block_count_for(total_size)?;
        let dev = FileDevice::create(path).map_err(DfsError::DeviceOpen)?;
        Self::format(Arc::new(dev), total_size)
    }

    /// Lay out an empty partition of at most `total_size` bytes on `dev`
    pub fn format(dev: Arc<dyn BlockDevice>, total_size: u64) -> DfsResult<()> {
        let block_count = Self::block_count_for(total_size)?;
        let options = PartitionOptions::default();
        let device = Device::new(dev, first_block_addr(block_count), options.log_level);
        let len = footprint(block_count);
        pt_debug!(
            device,
            "formatting {} blocks, {} of {} bytes",
            block_count,
            len,
            total_size
        );

        device.raw().set_len(len).map_err(|e| {
            pt_error!(device, "failed to resize device to {} bytes: {}", len, e);
            DfsError::DeviceWrite { addr: len, len: 0 }
        })?;
        device.write_at(0, PartitionHeader::new(block_count).as_bytes())?;
        device.write_entry(EntryLoc::ROOT, &EntryPointer::root())?;

        let mut bitmap = Bitmap::new(block_count)?;
        bitmap.set_used(ROOT_BLOCK, true)?;
        bitmap.flush(&device)?;
        device.write_header(ROOT_BLOCK, &BlockHeader::default())?;
        device.sync()
    }

    /// Open the partition stored in the file at `path`
    pub fn open<P: AsRef<HostPath>>(path: P) -> DfsResult<Self> {
        Self::open_with(path, PartitionOptions::default())
    }

    pub fn open_with<P: AsRef<HostPath>>(path: P, options: PartitionOptions) -> DfsResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DfsError::InvalidArguments("empty partition path"));
        }
        let dev = FileDevice::open(path).map_err(DfsError::DeviceOpen)?;
        Self::mount_with(Arc::new(dev), options)
    }

    /// Bring up the partition stored on `dev`
    pub fn mount(dev: Arc<dyn BlockDevice>) -> DfsResult<Self> {
        Self::mount_with(dev, PartitionOptions::default())
    }

    pub fn mount_with(dev: Arc<dyn BlockDevice>, options: PartitionOptions) -> DfsResult<Self> {
        if options.max_handles == 0 {
            return Err(DfsError::InvalidArguments("handle table must not be empty"));
        }
        let probe = Device::new(dev.clone(), 0, options.log_level);
        let corrupted = |reason: &'static str| {
            pt_error!(probe, "refusing to mount: {}", reason);
            DfsError::CorruptedPartition(reason)
        };

        let mut header = PartitionHeader::default();
        probe
            .read_at(0, header.as_bytes_mut())
            .map_err(|_| corrupted("device too small for a header"))?;
        header.validate().map_err(corrupted)?;
        let block_count = header.block_count;
        let dev_len = dev.len().map_err(|_| corrupted("device length unknown"))?;
        if dev_len < footprint(block_count) {
            return Err(corrupted("device shorter than partition"));
        }

        let device = Device::new(dev, first_block_addr(block_count), options.log_level);
        let bitmap = Bitmap::load(&device, block_count)?;
        if bitmap.padding_used() {
            return Err(corrupted("bitmap marks blocks past the end"));
        }
        if !bitmap.get_used(ROOT_BLOCK)? {
            return Err(corrupted("root block is not allocated"));
        }
        let root = device.read_entry(EntryLoc::ROOT)?;
        if !root.is_dir() || root.first != ROOT_BLOCK {
            return Err(corrupted("bad root entry"));
        }

        let mut handles = Vec::new();
        handles
            .try_reserve_exact(options.max_handles)
            .map_err(|_| DfsError::Alloc)?;
        handles.resize_with(options.max_handles, || None);

        pt_debug!(
            device,
            "mounted {} blocks, block 0 at {:#x}, {} free",
            block_count,
            device.root_block_addr(),
            bitmap.count_free()
        );
        Ok(Self {
            device,
            block_count,
            bitmap,
            handles,
            options,
            closed: false,
        })
    }

    /// Flush the bitmap and release the device. Open handles die with the partition.
    pub fn close(mut self) -> DfsResult<()> {
        self.closed = true;
        self.bitmap.flush(&self.device)?;
        self.device.sync()
    }

    /// Bytes taken by a partition of `block_count` blocks
    pub fn footprint(block_count: u32) -> u64 {
        footprint(block_count)
    }

    /// Largest block count whose footprint fits in `total_size` bytes
    pub fn block_count_for(total_size: u64) -> DfsResult<u32> {
        if total_size == 0 {
            return Err(DfsError::InvalidArguments("partition size is zero"));
        }
        let (mut lo, mut hi) = (0u32, MAX_BLOCKS);
        let mut rounds = 0;
        while lo < hi && rounds < MAX_SIZE_ROUNDS {
            let mid = lo + (hi - lo + 1) / 2;
            if footprint(mid) <= total_size {
                lo = mid;
            } else {
                hi = mid - 1;
            }
            rounds += 1;
        }
        if lo == 0 {
            return Err(DfsError::InvalidArguments("partition size below one block"));
        }
        Ok(lo)
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn free_blocks(&self) -> u32 {
        self.bitmap.count_free()
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    pub fn log_level(&self) -> LevelFilter {
        self.options.log_level
    }

    /// Bytes of the on-disk bitmap
    pub fn bitmap_bytes(&self) -> usize {
        bitmap_len(self.block_count)
    }
}

impl Drop for Partition {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        pt_warn!(self, "partition dropped without close, flushing bitmap");
        if let Err(e) = self.bitmap.flush(&self.device) {
            pt_error!(self, "bitmap flush on drop failed: {}", e);
        }
    }
}
