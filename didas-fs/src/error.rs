//! Error types

use std::io;

use thiserror::Error;

/// Result type of every partition operation
pub type DfsResult<T> = Result<T, DfsError>;

/// Errors reported by the file system
#[derive(Debug, Error)]
pub enum DfsError {
    /// A required argument was empty, zero or malformed
    #[error("invalid arguments: {0}")]
    InvalidArguments(&'static str),
    /// The backing file could not be opened or created
    #[error("failed to open device: {0}")]
    DeviceOpen(#[source] io::Error),
    /// A device read failed or transferred fewer bytes than requested
    #[error("failed to read {len} bytes from device at {addr:#x}")]
    DeviceRead { addr: u64, len: usize },
    /// A device write failed or transferred fewer bytes than requested
    #[error("failed to write {len} bytes to device at {addr:#x}")]
    DeviceWrite { addr: u64, len: usize },
    /// Host memory could not be reserved
    #[error("failed to allocate host memory")]
    Alloc,
    /// The partition header or root structures are invalid
    #[error("corrupted partition: {0}")]
    CorruptedPartition(&'static str),
    /// Part of the requested path does not exist
    #[error("path not found")]
    PathNotFound,
    /// Every block is allocated
    #[error("no free block left in partition")]
    NoSpace,
    /// An object with the same name already exists in the parent directory
    #[error("object already exists")]
    AlreadyExists,
    /// The path is empty where a name is needed or names the wrong kind of object
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),
    /// Share flags or the read-only flag forbid the requested access
    #[error("unauthorized access")]
    UnauthorizedAccess,
    /// The descriptor is out of range or closed
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(usize),
    /// Seek target is negative or the whence value is unknown
    #[error("invalid seek")]
    InvalidSeek,
    /// Every slot of the open-handle table is in use
    #[error("maximum number of open handles reached")]
    MaxHandlesReached,
}

impl DfsError {
    /// Numeric code of the error, stable across versions of the format tools
    pub fn code(&self) -> i32 {
        match self {
            DfsError::InvalidArguments(_) => 2,
            DfsError::DeviceOpen(_) => 3,
            DfsError::DeviceWrite { .. } => 5,
            DfsError::DeviceRead { .. } => 6,
            DfsError::Alloc => 7,
            DfsError::CorruptedPartition(_) => 8,
            DfsError::PathNotFound => 10,
            DfsError::NoSpace => 11,
            DfsError::InvalidSeek => 12,
            DfsError::MaxHandlesReached => 13,
            DfsError::UnauthorizedAccess => 14,
            DfsError::InvalidDescriptor(_) => 15,
            DfsError::AlreadyExists => 16,
            DfsError::InvalidPath(_) => 17,
        }
    }
}
