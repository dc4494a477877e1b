//! Raw device interface.
//!
//! Define the byte-addressable read-write interface [BlockDevice] the
//! backing store must implement, plus a file-backed and an in-memory store.

use core::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use spin::Mutex;

pub trait BlockDevice: Send + Sync + Any {
    /// Move the device cursor to `offset` bytes from the start.
    fn seek(&self, offset: u64) -> io::Result<()>;
    /// Read into `buf` from the cursor, return the number of bytes read.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    /// Write `buf` at the cursor, return the number of bytes written.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    /// Current length of the device in bytes.
    fn len(&self) -> io::Result<u64>;
    /// Resize the device, zero-filling any new space.
    fn set_len(&self, len: u64) -> io::Result<()>;
    /// Push buffered data to stable storage.
    fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A regular file used as a device
pub struct FileDevice(Mutex<File>);

impl FileDevice {
    /// Open an existing file for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self(Mutex::new(file)))
    }

    /// Create (or truncate) a file to be formatted.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self(Mutex::new(file)))
    }
}

impl BlockDevice for FileDevice {
    fn seek(&self, offset: u64) -> io::Result<()> {
        self.0.lock().seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn len(&self) -> io::Result<u64> {
        self.0.lock().metadata().map(|meta| meta.len())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.0.lock().set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.0.lock().sync_data()
    }
}

struct MemoryInner {
    data: Vec<u8>,
    pos: usize,
    /// Transfers crossing this address are cut short
    limit: Option<usize>,
}

/// A device held in memory.
///
/// Reads stop at the end of the buffer and writes never grow it, which
/// mirrors a fixed-size block device. A transfer limit can be set to make
/// every read or write crossing it come back short.
pub struct MemoryDevice(Mutex<MemoryInner>);

impl MemoryDevice {
    pub fn new() -> Self {
        Self(Mutex::new(MemoryInner {
            data: Vec::new(),
            pos: 0,
            limit: None,
        }))
    }

    /// Cut short every transfer that reaches past `addr`.
    pub fn set_transfer_limit(&self, addr: Option<usize>) {
        self.0.lock().limit = addr;
    }

    /// Copy of the raw device contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().data.clone()
    }

    /// Overwrite raw bytes, bypassing the cursor.
    pub fn patch(&self, addr: usize, bytes: &[u8]) {
        let mut inner = self.0.lock();
        let end = (addr + bytes.len()).min(inner.data.len());
        if addr < end {
            inner.data[addr..end].copy_from_slice(&bytes[..end - addr]);
        }
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    fn transfer_end(&self, len: usize) -> usize {
        let mut end = (self.pos + len).min(self.data.len());
        if let Some(limit) = self.limit {
            end = end.min(limit.max(self.pos));
        }
        end.max(self.pos)
    }
}

impl BlockDevice for MemoryDevice {
    fn seek(&self, offset: u64) -> io::Result<()> {
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        self.0.lock().pos = offset;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.lock();
        let start = inner.pos;
        let end = inner.transfer_end(buf.len());
        let n = end - start;
        if n == 0 {
            return Ok(0);
        }
        buf[..n].copy_from_slice(&inner.data[start..end]);
        inner.pos = end;
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock();
        let start = inner.pos;
        let end = inner.transfer_end(buf.len());
        let n = end - start;
        if n == 0 {
            return Ok(0);
        }
        inner.data[start..end].copy_from_slice(&buf[..n]);
        inner.pos = end;
        Ok(n)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.0.lock().data.len() as u64)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
        self.0.lock().data.resize(len, 0);
        Ok(())
    }
}
