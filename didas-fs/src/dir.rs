//! Directory and entry resolution
//!
//! A directory is a block chain whose data areas hold packed [`EntryPointer`]
//! records. Lookups walk that chain one path segment at a time, matching
//! names only; whether a match is a file or a directory is checked by the
//! caller that cares.
use crate::config::{BLOCK_DATA_SIZE, ENTRY_SIZE};
use crate::error::{DfsError, DfsResult};
use crate::layout::{BlockHeader, BlockId, EntryFlags, EntryLoc, EntryPointer, ROOT_BLOCK};
use crate::partition::Partition;
use crate::path::Path;

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    /// bytes stored in the object's chain
    pub size: u64,
    pub read_only: bool,
}

/// Decode the first `count` slots of a directory data area
fn entries(data: &[u8], count: usize) -> impl Iterator<Item = (u32, EntryPointer)> + '_ {
    data.chunks_exact(ENTRY_SIZE)
        .take(count)
        .enumerate()
        .map(|(slot, bytes)| {
            let mut entry = EntryPointer::empty();
            entry.as_bytes_mut().copy_from_slice(bytes);
            (slot as u32, entry)
        })
}

impl Partition {
    /// Resolve `path` to its entry and the place the entry is stored.
    ///
    /// The root resolves to its own entry at [`EntryLoc::ROOT`].
    pub fn find_entry(&self, path: &str) -> DfsResult<(EntryPointer, EntryLoc)> {
        self.resolve(&Path::new(path)?)
    }

    pub(crate) fn resolve(&self, path: &Path) -> DfsResult<(EntryPointer, EntryLoc)> {
        let mut segments = path.segments();
        let mut target = match segments.next() {
            Some(seg) => seg,
            None => return Ok((self.device.read_entry(EntryLoc::ROOT)?, EntryLoc::ROOT)),
        };

        let mut data = vec![0u8; BLOCK_DATA_SIZE];
        let mut block = ROOT_BLOCK;
        // every visited block is a distinct directory block in a sound partition
        let mut budget = self.block_count() as u64 + 1;
        loop {
            budget -= 1;
            if budget == 0 {
                pt_error!(self, "directory walk for {:?} does not end", path.as_str());
                return Err(DfsError::CorruptedPartition("directory chain loops"));
            }
            self.check_block(block)?;
            let header = self.device.read_block_data(block, &mut data)?;
            let found =
                entries(&data, header.entry_count()).find(|(_, entry)| entry.name_matches(target));
            match found {
                Some((slot, entry)) => match segments.next() {
                    None => return Ok((entry, EntryLoc::new(block, slot))),
                    Some(next) if entry.is_dir() => {
                        block = entry.first;
                        target = next;
                    }
                    Some(_) => {
                        pt_debug!(self, "{:?} is a file inside {:?}", target, path.as_str());
                        return Err(DfsError::InvalidPath("file used as a directory"));
                    }
                },
                None if header.is_tail() => {
                    pt_debug!(self, "{:?} not found", path.as_str());
                    return Err(DfsError::PathNotFound);
                }
                None => block = header.next,
            }
        }
    }

    pub fn make_dir(&mut self, path: &str) -> DfsResult<()> {
        self.create_object(path, EntryFlags::DIR)
    }

    pub fn make_file(&mut self, path: &str) -> DfsResult<()> {
        self.create_object(path, EntryFlags::empty())
    }

    fn create_object(&mut self, path: &str, flags: EntryFlags) -> DfsResult<()> {
        let path = Path::new(path)?;
        if path.is_root() {
            return Err(DfsError::InvalidPath("missing object name"));
        }
        match self.resolve(&path) {
            Ok(_) => {
                pt_debug!(self, "{:?} already exists", path.as_str());
                return Err(DfsError::AlreadyExists);
            }
            Err(DfsError::PathNotFound) => {}
            Err(e) => return Err(e),
        }
        let (parent, parent_loc) = self.resolve(&path.parent())?;
        if !parent.is_dir() {
            return Err(DfsError::InvalidPath("parent is not a directory"));
        }

        let block = self.reserve_block()?;
        let entry = EntryPointer::new(path.name(), block, flags);
        let linked = self
            .device
            .write_header(block, &BlockHeader::default())
            .and_then(|_| self.append_entry_to_dir(parent_loc, &entry));
        match linked {
            Ok(loc) => {
                pt_debug!(
                    self,
                    "created {:?} at {:?}, first block {}",
                    path.as_str(),
                    loc,
                    block
                );
                Ok(())
            }
            Err(e) => {
                pt_error!(self, "failed to link {:?}: {}", path.as_str(), e);
                self.release_block(block)?;
                Err(e)
            }
        }
    }

    /// Up to `capacity` entries of the directory at `path`, in chain order
    pub fn list_dir(&self, path: &str, capacity: usize) -> DfsResult<Vec<DirEntry>> {
        if capacity == 0 {
            return Err(DfsError::InvalidArguments("zero listing capacity"));
        }
        let first = self.dir_first_block(path)?;
        let mut found = Vec::new();
        self.for_each_entry(first, |entry| {
            if found.len() < capacity {
                found.push(entry);
            }
            Ok(found.len() < capacity)
        })?;

        found
            .into_iter()
            .map(|entry| self.describe(&entry))
            .collect()
    }

    /// Number of entries in the directory at `path`
    pub fn entry_count(&self, path: &str) -> DfsResult<usize> {
        let first = self.dir_first_block(path)?;
        let mut count = 0;
        self.walk_chain(first, |_, header| {
            count += header.entry_count();
            Ok(())
        })?;
        Ok(count)
    }

    /// Describe the object at `path`
    pub fn stat(&self, path: &str) -> DfsResult<DirEntry> {
        let (entry, _) = self.find_entry(path)?;
        self.describe(&entry)
    }

    /// Set or clear the read-only flag of the object at `path`
    pub fn set_read_only(&mut self, path: &str, read_only: bool) -> DfsResult<()> {
        let (mut entry, loc) = self.find_entry(path)?;
        if loc.is_root() {
            return Err(DfsError::InvalidPath("the root entry is fixed"));
        }
        let mut flags = entry.flags();
        flags.set(EntryFlags::READONLY, read_only);
        entry.set_flags(flags);
        self.device.write_entry(loc, &entry)
    }

    fn dir_first_block(&self, path: &str) -> DfsResult<BlockId> {
        let (entry, _) = self.find_entry(path)?;
        if !entry.is_dir() {
            return Err(DfsError::InvalidPath("not a directory"));
        }
        Ok(entry.first)
    }

    /// Feed entries of the directory chain at `first` to `f` until it returns false
    pub(crate) fn for_each_entry(
        &self,
        first: BlockId,
        mut f: impl FnMut(EntryPointer) -> DfsResult<bool>,
    ) -> DfsResult<()> {
        let mut data = vec![0u8; BLOCK_DATA_SIZE];
        let mut more = true;
        self.walk_chain(first, |block, _| {
            if !more {
                return Ok(());
            }
            let header = self.device.read_block_data(block, &mut data)?;
            for (_, entry) in entries(&data, header.entry_count()) {
                more = f(entry)?;
                if !more {
                    break;
                }
            }
            Ok(())
        })
    }

    fn describe(&self, entry: &EntryPointer) -> DfsResult<DirEntry> {
        Ok(DirEntry {
            name: entry.name_lossy(),
            is_dir: entry.is_dir(),
            size: self.chain_size(entry.first)?,
            read_only: !entry.is_writable(),
        })
    }
}
