//! File handles and the read/write/seek engine
//!
//! Every open file is a slot in the partition's handle table; the slot index
//! is the descriptor handed back to the caller. A handle tracks its byte
//! position together with the block it falls in, so transfers never walk the
//! chain from the start.
//!
//! A cursor whose block offset equals [`BLOCK_DATA_SIZE`] sits at the end of
//! its block. It moves on to the next block only when the next transfer
//! needs data from there, so parking on a block boundary never allocates.
use bitflags::bitflags;

use crate::config::BLOCK_DATA_SIZE;
use crate::error::{DfsError, DfsResult};
use crate::layout::{BlockId, EntryLoc, NO_BLOCK};
use crate::partition::Partition;
use crate::path::Path;

/// Index into the handle table
pub type Descriptor = usize;

bitflags! {
    /// Access requested by an open and access granted to later opens
    pub struct OpenFlags: u32 {
        /// read access
        const READ = 1 << 0;
        /// write access
        const WRITE = 1 << 1;
        const RDWR = Self::READ.bits | Self::WRITE.bits;
        /// others may read while this handle is open
        const SHARE_READ = 1 << 2;
        /// others may write while this handle is open
        const SHARE_WRITE = 1 << 3;
        const SHARE_RDWR = Self::SHARE_READ.bits | Self::SHARE_WRITE.bits;
    }
}

impl OpenFlags {
    fn validate(self) -> DfsResult<Self> {
        if (self & Self::RDWR).is_empty() {
            return Err(DfsError::InvalidArguments("no access mode requested"));
        }
        Ok(self)
    }

    /// Access bits expressed as share bits
    fn access_as_share(self) -> Self {
        Self::from_bits_truncate((self & Self::RDWR).bits() << 2)
    }

    /// Can a handle opened with `self` coexist with one opened with `held`
    fn compatible_with(self, held: Self) -> bool {
        held.contains(self.access_as_share()) && self.contains(held.access_as_share())
    }

    pub fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}

/// Origin of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl TryFrom<i32> for Whence {
    type Error = DfsError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(DfsError::InvalidSeek),
        }
    }
}

/// Position of a handle inside its chain
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// byte offset from the start of the file
    head: u64,
    /// cached file size, refreshed by open and `Whence::End`, raised by growth
    size: u64,
    first: BlockId,
    current: BlockId,
    /// offset inside the data area of `current`, at most `BLOCK_DATA_SIZE`
    block_offset: usize,
    /// where the file's entry lives, identifies the file and grows its chain
    loc: EntryLoc,
}

/// An open file
pub struct FileHandle {
    /// normalized path the file was opened by
    path: String,
    flags: OpenFlags,
    cursor: Cursor,
}

impl FileHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}

impl Partition {
    /// Open the file at `path`, returning the lowest free descriptor
    pub fn open_file(&mut self, path: &str, flags: OpenFlags) -> DfsResult<Descriptor> {
        let flags = OpenFlags::from_bits(flags.bits())
            .ok_or(DfsError::InvalidArguments("unknown open flags"))?
            .validate()?;
        let path = Path::new(path)?;
        if path.is_root() {
            return Err(DfsError::InvalidPath("missing file name"));
        }
        let (entry, loc) = self.resolve(&path)?;
        if entry.is_dir() {
            return Err(DfsError::InvalidPath("not a file"));
        }
        if flags.writable() && !entry.is_writable() {
            pt_warn!(self, "{:?} is read-only", path.as_str());
            return Err(DfsError::UnauthorizedAccess);
        }
        let conflict = self
            .handles
            .iter()
            .flatten()
            .any(|held| held.cursor.loc == loc && !flags.compatible_with(held.flags));
        if conflict {
            pt_warn!(self, "{:?} is open with incompatible sharing", path.as_str());
            return Err(DfsError::UnauthorizedAccess);
        }
        let fd = self
            .handles
            .iter()
            .position(Option::is_none)
            .ok_or(DfsError::MaxHandlesReached)?;

        let size = self.chain_size(entry.first)?;
        self.handles[fd] = Some(FileHandle {
            path: path.as_str().to_owned(),
            flags,
            cursor: Cursor {
                head: 0,
                size,
                first: entry.first,
                current: entry.first,
                block_offset: 0,
                loc,
            },
        });
        pt_debug!(
            self,
            "opened {:?} as {} ({:?}, {} bytes)",
            path.as_str(),
            fd,
            flags,
            size
        );
        Ok(fd)
    }

    pub fn close_file(&mut self, fd: Descriptor) -> DfsResult<()> {
        self.handle(fd)?;
        self.handles[fd] = None;
        pt_trace!(self, "closed descriptor {}", fd);
        Ok(())
    }

    /// Write all of `buf` at the cursor, growing the chain as needed
    pub fn write(&mut self, fd: Descriptor, buf: &[u8]) -> DfsResult<usize> {
        if buf.is_empty() {
            return Err(DfsError::InvalidArguments("empty write buffer"));
        }
        let handle = self.handle(fd)?;
        if !handle.flags.writable() {
            return Err(DfsError::UnauthorizedAccess);
        }
        let mut cursor = handle.cursor;
        let written = self.write_chain(&mut cursor, buf);
        self.store_cursor(fd, cursor);
        written
    }

    /// Read up to `buf.len()` bytes; fewer means the end of the file was reached
    pub fn read(&mut self, fd: Descriptor, buf: &mut [u8]) -> DfsResult<usize> {
        if buf.is_empty() {
            return Err(DfsError::InvalidArguments("empty read buffer"));
        }
        let handle = self.handle(fd)?;
        if !handle.flags.readable() {
            return Err(DfsError::UnauthorizedAccess);
        }
        let mut cursor = handle.cursor;
        let read = self.read_chain(&mut cursor, buf);
        self.store_cursor(fd, cursor);
        read
    }

    /// Move the cursor. Targets past the end grow the file without clearing
    /// the bytes in between.
    pub fn seek(&mut self, fd: Descriptor, offset: i64, whence: Whence) -> DfsResult<()> {
        let mut cursor = self.handle(fd)?.cursor;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => cursor.head,
            Whence::End => {
                cursor.size = self.chain_size(cursor.first)?;
                cursor.size
            }
        };
        let target = i128::from(base) + i128::from(offset);
        let target = u64::try_from(target).map_err(|_| DfsError::InvalidSeek)?;

        let saved = cursor;
        match self.seek_chain(&mut cursor, target) {
            Ok(()) => {
                self.store_cursor(fd, cursor);
                Ok(())
            }
            Err(e) => {
                // keep the old position but not the size grown on the way
                self.store_cursor(
                    fd,
                    Cursor {
                        size: cursor.size,
                        ..saved
                    },
                );
                Err(e)
            }
        }
    }

    /// Current byte offset of `fd`
    pub fn tell(&self, fd: Descriptor) -> DfsResult<u64> {
        Ok(self.handle(fd)?.cursor.head)
    }

    /// Cached size of the file open as `fd`
    pub fn file_size(&self, fd: Descriptor) -> DfsResult<u64> {
        Ok(self.handle(fd)?.cursor.size)
    }

    pub fn handle(&self, fd: Descriptor) -> DfsResult<&FileHandle> {
        self.handles
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(DfsError::InvalidDescriptor(fd))
    }

    fn store_cursor(&mut self, fd: Descriptor, cursor: Cursor) {
        if let Some(Some(handle)) = self.handles.get_mut(fd) {
            handle.cursor = cursor;
        }
    }

    /// Step a cursor parked at the end of its block into the next one,
    /// appending a block when `grow` allows it. Returns false at the tail.
    fn advance_block(
        &mut self,
        cursor: &mut Cursor,
        next: BlockId,
        grow: bool,
    ) -> DfsResult<bool> {
        let next = if next != NO_BLOCK {
            self.check_block(next)?;
            next
        } else if grow {
            self.append_block(cursor.loc)?
        } else {
            return Ok(false);
        };
        cursor.current = next;
        cursor.block_offset = 0;
        Ok(true)
    }

    fn write_chain(&mut self, cursor: &mut Cursor, buf: &[u8]) -> DfsResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            let mut header = self.device.read_header(cursor.current)?;
            if cursor.block_offset == BLOCK_DATA_SIZE {
                self.advance_block(cursor, header.next, true)?;
                header = self.device.read_header(cursor.current)?;
            }
            let chunk = (buf.len() - done).min(BLOCK_DATA_SIZE - cursor.block_offset);
            let addr = self
                .device
                .block_offset_addr(cursor.current, cursor.block_offset);
            self.device.write_at(addr, &buf[done..done + chunk])?;

            let end = cursor.block_offset + chunk;
            if end > header.used as usize {
                header.used = end as u32;
                self.device.write_header(cursor.current, &header)?;
            }
            cursor.block_offset = end;
            cursor.head += chunk as u64;
            cursor.size = cursor.size.max(cursor.head);
            done += chunk;
        }
        pt_trace!(self, "wrote {} bytes, head at {}", done, cursor.head);
        Ok(done)
    }

    fn read_chain(&mut self, cursor: &mut Cursor, buf: &mut [u8]) -> DfsResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            let mut header = self.device.read_header(cursor.current)?;
            if cursor.block_offset == BLOCK_DATA_SIZE {
                if !self.advance_block(cursor, header.next, false)? {
                    break;
                }
                header = self.device.read_header(cursor.current)?;
            }
            let available = (header.used as usize).saturating_sub(cursor.block_offset);
            let chunk = (buf.len() - done).min(available);
            if chunk == 0 {
                break;
            }
            let addr = self
                .device
                .block_offset_addr(cursor.current, cursor.block_offset);
            self.device.read_at(addr, &mut buf[done..done + chunk])?;
            cursor.block_offset += chunk;
            cursor.head += chunk as u64;
            done += chunk;
        }
        pt_trace!(self, "read {} bytes, head at {}", done, cursor.head);
        Ok(done)
    }

    fn seek_chain(&mut self, cursor: &mut Cursor, target: u64) -> DfsResult<()> {
        if target < cursor.head {
            cursor.head = 0;
            cursor.current = cursor.first;
            cursor.block_offset = 0;
        }
        while cursor.head < target {
            let mut header = self.device.read_header(cursor.current)?;
            if cursor.block_offset == BLOCK_DATA_SIZE {
                self.advance_block(cursor, header.next, true)?;
                header = self.device.read_header(cursor.current)?;
            }
            let left = usize::try_from(target - cursor.head).unwrap_or(usize::MAX);
            let step = left.min(BLOCK_DATA_SIZE - cursor.block_offset);
            if cursor.block_offset + step > header.used as usize {
                header.used = (cursor.block_offset + step) as u32;
                self.device.write_header(cursor.current, &header)?;
            }
            cursor.block_offset += step;
            cursor.head += step as u64;
            cursor.size = cursor.size.max(cursor.head);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::Rng;

    use super::*;
    use crate::block_dev::MemoryDevice;
    use crate::config::PartitionOptions;

    const MIB: u64 = 1 << 20;

    fn mounted(size: u64) -> Partition {
        let mem = Arc::new(MemoryDevice::new());
        Partition::format(mem.clone(), size).unwrap();
        Partition::mount(mem).unwrap()
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len).map(|_| rng.gen()).collect()
    }

    #[test]
    fn hello() {
        let mut pt = mounted(MIB);
        pt.make_file("a.txt").unwrap();
        let fd = pt.open_file("a.txt", OpenFlags::WRITE).unwrap();
        assert_eq!(pt.write(fd, b"hello").unwrap(), 5);
        pt.close_file(fd).unwrap();

        let fd2 = pt.open_file("a.txt", OpenFlags::READ).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(pt.read(fd2, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        let mut more = [0u8; 16];
        assert_eq!(pt.read(fd2, &mut more).unwrap(), 0);
        pt.close_file(fd2).unwrap();
    }

    #[test]
    fn multi_block_round_trip() {
        let mut pt = mounted(MIB);
        pt.make_dir("data").unwrap();
        pt.make_file("data/blob").unwrap();
        let payload = random_bytes(3 * BLOCK_DATA_SIZE + 1234);

        let fd = pt.open_file("/data/blob", OpenFlags::WRITE).unwrap();
        // uneven pieces so chunks straddle block boundaries
        for piece in payload.chunks(10_000) {
            assert_eq!(pt.write(fd, piece).unwrap(), piece.len());
        }
        assert_eq!(pt.tell(fd).unwrap(), payload.len() as u64);
        pt.close_file(fd).unwrap();
        assert_eq!(pt.stat("data/blob").unwrap().size, payload.len() as u64);

        let fd = pt.open_file("data/blob", OpenFlags::READ).unwrap();
        assert_eq!(pt.file_size(fd).unwrap(), payload.len() as u64);
        let mut read_back = vec![0u8; payload.len() + 100];
        assert_eq!(pt.read(fd, &mut read_back).unwrap(), payload.len());
        assert_eq!(&read_back[..payload.len()], &payload[..]);
        pt.close_file(fd).unwrap();

        let (entry, _) = pt.find_entry("data/blob").unwrap();
        assert_eq!(entry.last, entry.first + 3);
    }

    #[test]
    fn block_boundary() {
        let mut pt = mounted(MIB);
        pt.make_file("f").unwrap();
        let first = random_bytes(BLOCK_DATA_SIZE);
        let fd = pt.open_file("f", OpenFlags::WRITE).unwrap();
        pt.write(fd, &first).unwrap();
        pt.close_file(fd).unwrap();
        // filling a block exactly does not allocate the next one
        assert_eq!(pt.free_blocks(), 29);

        let fd = pt.open_file("f", OpenFlags::READ).unwrap();
        let mut buf = vec![0u8; BLOCK_DATA_SIZE];
        assert_eq!(pt.read(fd, &mut buf).unwrap(), BLOCK_DATA_SIZE);
        assert_eq!(buf, first);
        assert_eq!(pt.read(fd, &mut buf).unwrap(), 0);
        pt.close_file(fd).unwrap();

        let second = random_bytes(BLOCK_DATA_SIZE);
        let fd = pt.open_file("f", OpenFlags::RDWR).unwrap();
        pt.seek(fd, 0, Whence::End).unwrap();
        pt.write(fd, &second).unwrap();
        assert_eq!(pt.free_blocks(), 28);
        pt.seek(fd, BLOCK_DATA_SIZE as i64, Whence::Set).unwrap();
        assert_eq!(pt.read(fd, &mut buf).unwrap(), BLOCK_DATA_SIZE);
        assert_eq!(buf, second);
        assert_eq!(pt.read(fd, &mut buf).unwrap(), 0);
        pt.close_file(fd).unwrap();
    }

    #[test]
    fn seek_and_tell() {
        let mut pt = mounted(MIB);
        pt.make_file("f").unwrap();
        let payload = random_bytes(BLOCK_DATA_SIZE + 500);
        let fd = pt.open_file("f", OpenFlags::RDWR).unwrap();
        pt.write(fd, &payload).unwrap();
        let len = payload.len() as u64;

        let data = BLOCK_DATA_SIZE as u64;
        for k in [0, 1, 499, data - 1, data, len - 1, len] {
            pt.seek(fd, k as i64, Whence::Set).unwrap();
            assert_eq!(pt.tell(fd).unwrap(), k);
            let mut byte = [0u8; 1];
            let n = pt.read(fd, &mut byte).unwrap();
            if k < len {
                assert_eq!((n, byte[0]), (1, payload[k as usize]));
            } else {
                assert_eq!(n, 0);
            }
        }

        pt.seek(fd, 10, Whence::Set).unwrap();
        pt.seek(fd, 5, Whence::Cur).unwrap();
        assert_eq!(pt.tell(fd).unwrap(), 15);
        pt.seek(fd, -15, Whence::Cur).unwrap();
        assert_eq!(pt.tell(fd).unwrap(), 0);
        pt.seek(fd, -1, Whence::End).unwrap();
        assert_eq!(pt.tell(fd).unwrap(), len - 1);

        assert!(matches!(pt.seek(fd, -1, Whence::Set), Err(DfsError::InvalidSeek)));
        assert!(matches!(
            pt.seek(fd, -(len as i64) - 1, Whence::End),
            Err(DfsError::InvalidSeek)
        ));
        assert_eq!(pt.tell(fd).unwrap(), len - 1);
        assert!(matches!(Whence::try_from(3), Err(DfsError::InvalidSeek)));
        assert_eq!(Whence::try_from(2).unwrap(), Whence::End);
    }

    #[test]
    fn seek_past_end_grows() {
        let mut pt = mounted(MIB);
        pt.make_file("sparse").unwrap();
        let fd = pt.open_file("sparse", OpenFlags::RDWR).unwrap();
        pt.write(fd, b"head").unwrap();

        let target = 2 * BLOCK_DATA_SIZE as u64 + 10;
        pt.seek(fd, target as i64, Whence::Set).unwrap();
        assert_eq!(pt.tell(fd).unwrap(), target);
        assert_eq!(pt.free_blocks(), 27);
        pt.write(fd, b"tail").unwrap();
        assert_eq!(pt.tell(fd).unwrap(), target + 4);
        pt.seek(fd, 0, Whence::End).unwrap();
        assert_eq!(pt.tell(fd).unwrap(), target + 4);

        pt.seek(fd, 0, Whence::Set).unwrap();
        let mut buf = [0u8; 4];
        pt.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"head");
        pt.seek(fd, target as i64, Whence::Set).unwrap();
        pt.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"tail");

        // a boundary target does not allocate
        pt.make_file("edge").unwrap();
        let edge = pt.open_file("edge", OpenFlags::RDWR).unwrap();
        pt.seek(edge, BLOCK_DATA_SIZE as i64, Whence::Set).unwrap();
        assert_eq!(pt.free_blocks(), 26);
        assert_eq!(pt.stat("edge").unwrap().size, BLOCK_DATA_SIZE as u64);
    }

    #[test]
    fn readers_can_seek_past_end() {
        let mut pt = mounted(MIB);
        pt.make_file("f").unwrap();
        let r = pt.open_file("f", OpenFlags::READ).unwrap();
        pt.seek(r, 10, Whence::Set).unwrap();
        assert_eq!(pt.tell(r).unwrap(), 10);
        assert_eq!(pt.file_size(r).unwrap(), 10);
        assert_eq!(pt.stat("f").unwrap().size, 10);
        let mut buf = [0u8; 4];
        assert_eq!(pt.read(r, &mut buf).unwrap(), 0);

        let target = BLOCK_DATA_SIZE as i64 + 1;
        pt.seek(r, target, Whence::Set).unwrap();
        assert_eq!(pt.tell(r).unwrap(), target as u64);
        assert_eq!(pt.free_blocks(), 28);
        assert!(matches!(pt.write(r, b"x"), Err(DfsError::UnauthorizedAccess)));
        pt.close_file(r).unwrap();

        let w = pt.open_file("f", OpenFlags::WRITE).unwrap();
        assert!(matches!(pt.read(w, &mut buf), Err(DfsError::UnauthorizedAccess)));
    }

    #[test]
    fn failed_seek_keeps_grown_size() {
        // root plus two blocks
        let mut pt = mounted(3 * 32768 + 512);
        pt.make_file("f").unwrap();
        let fd = pt.open_file("f", OpenFlags::RDWR).unwrap();
        pt.write(fd, b"abc").unwrap();
        assert!(matches!(
            pt.seek(fd, 3 * BLOCK_DATA_SIZE as i64, Whence::Set),
            Err(DfsError::NoSpace)
        ));
        assert_eq!(pt.tell(fd).unwrap(), 3);
        let size = pt.stat("f").unwrap().size;
        assert_eq!(size, 2 * BLOCK_DATA_SIZE as u64);
        assert_eq!(pt.file_size(fd).unwrap(), size);

        let mut buf = [0u8; 3];
        pt.seek(fd, 0, Whence::Set).unwrap();
        pt.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn sharing_rules() {
        let mut pt = mounted(MIB);
        pt.make_file("f").unwrap();

        let a = pt.open_file("f", OpenFlags::READ).unwrap();
        // the holder shares nothing
        assert!(matches!(
            pt.open_file("f", OpenFlags::READ | OpenFlags::SHARE_RDWR),
            Err(DfsError::UnauthorizedAccess)
        ));
        pt.close_file(a).unwrap();

        let a = pt.open_file("/f/", OpenFlags::READ | OpenFlags::SHARE_READ).unwrap();
        let b = pt.open_file("f", OpenFlags::READ | OpenFlags::SHARE_READ).unwrap();
        assert_ne!(a, b);
        // a writer is not shared by either reader
        assert!(matches!(
            pt.open_file("f", OpenFlags::WRITE | OpenFlags::SHARE_READ),
            Err(DfsError::UnauthorizedAccess)
        ));
        pt.close_file(a).unwrap();
        pt.close_file(b).unwrap();

        let w = pt.open_file("f", OpenFlags::RDWR | OpenFlags::SHARE_RDWR).unwrap();
        // the newcomer must share what the holder uses
        assert!(matches!(
            pt.open_file("f", OpenFlags::READ | OpenFlags::SHARE_READ),
            Err(DfsError::UnauthorizedAccess)
        ));
        let r = pt.open_file("f", OpenFlags::READ | OpenFlags::SHARE_RDWR).unwrap();
        pt.close_file(w).unwrap();
        pt.close_file(r).unwrap();
    }

    #[test]
    fn sharing_follows_the_entry() {
        let mut pt = mounted(MIB);
        // names are stored with their first 20 bytes only
        pt.make_file("twenty_characters_xx_one").unwrap();
        let a = pt
            .open_file("twenty_characters_xx_one", OpenFlags::WRITE)
            .unwrap();
        assert!(matches!(
            pt.open_file("twenty_characters_xx_two", OpenFlags::WRITE),
            Err(DfsError::UnauthorizedAccess)
        ));
        assert!(matches!(
            pt.open_file("/twenty_characters_xx/", OpenFlags::READ | OpenFlags::SHARE_RDWR),
            Err(DfsError::UnauthorizedAccess)
        ));
        pt.close_file(a).unwrap();
        let b = pt
            .open_file("twenty_characters_xx_two", OpenFlags::WRITE)
            .unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn open_rules() {
        let mut pt = mounted(MIB);
        pt.make_dir("d").unwrap();
        pt.make_file("d/f").unwrap();

        assert!(matches!(pt.open_file("", OpenFlags::READ), Err(DfsError::InvalidPath(_))));
        assert!(matches!(pt.open_file("d", OpenFlags::READ), Err(DfsError::InvalidPath(_))));
        assert!(matches!(pt.open_file("d/g", OpenFlags::READ), Err(DfsError::PathNotFound)));
        assert!(matches!(
            pt.open_file("d/f", OpenFlags::SHARE_READ),
            Err(DfsError::InvalidArguments(_))
        ));
        assert!(matches!(
            pt.open_file("d/f", unsafe { OpenFlags::from_bits_unchecked(0x11) }),
            Err(DfsError::InvalidArguments(_))
        ));

        pt.set_read_only("d/f", true).unwrap();
        assert!(matches!(
            pt.open_file("d/f", OpenFlags::WRITE),
            Err(DfsError::UnauthorizedAccess)
        ));
        let fd = pt.open_file("d/f", OpenFlags::READ).unwrap();
        pt.close_file(fd).unwrap();

        assert!(matches!(pt.close_file(fd), Err(DfsError::InvalidDescriptor(_))));
        assert!(matches!(pt.tell(1000), Err(DfsError::InvalidDescriptor(1000))));
        let mut buf = [0u8; 4];
        assert!(matches!(pt.read(fd, &mut buf), Err(DfsError::InvalidDescriptor(_))));
        let fd = pt.open_file("d/f", OpenFlags::READ).unwrap();
        assert!(matches!(pt.read(fd, &mut []), Err(DfsError::InvalidArguments(_))));
        assert!(matches!(pt.write(fd, &[]), Err(DfsError::InvalidArguments(_))));
    }

    #[test]
    fn handle_table() {
        let mem = Arc::new(MemoryDevice::new());
        Partition::format(mem.clone(), MIB).unwrap();
        let options = PartitionOptions::default().with_max_handles(3);
        let mut pt = Partition::mount_with(mem, options).unwrap();
        pt.make_file("f").unwrap();

        let flags = OpenFlags::READ | OpenFlags::SHARE_READ;
        let fds: Vec<_> = (0..3).map(|_| pt.open_file("f", flags).unwrap()).collect();
        assert_eq!(fds, [0, 1, 2]);
        assert!(matches!(pt.open_file("f", flags), Err(DfsError::MaxHandlesReached)));
        pt.close_file(1).unwrap();
        assert_eq!(pt.open_file("f", flags).unwrap(), 1);
        assert_eq!(pt.handle(2).unwrap().path(), "f");
    }

    #[test]
    fn full_partition_write() {
        // root plus two blocks
        let mut pt = mounted(3 * 32768 + 512);
        pt.make_file("f").unwrap();
        let fd = pt.open_file("f", OpenFlags::WRITE).unwrap();
        let payload = random_bytes(BLOCK_DATA_SIZE + 100);
        assert_eq!(pt.write(fd, &payload).unwrap(), payload.len());
        assert!(matches!(
            pt.write(fd, &payload),
            Err(DfsError::NoSpace)
        ));
        // the part that fit stays written
        let size = pt.stat("f").unwrap().size;
        assert_eq!(size, 2 * BLOCK_DATA_SIZE as u64);
        assert_eq!(pt.tell(fd).unwrap(), size);
    }
}
