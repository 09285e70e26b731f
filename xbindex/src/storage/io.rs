//! Block store abstraction.
//!
//! The index engine only ever asks for byte ranges at absolute file
//! offsets; node and header layout live above this layer. Production code
//! uses [`crate::storage::BlockFile`], tests use the fault-injecting
//! [`crate::simulation::MemoryStore`].
//!
//! Implementations must ensure:
//! - `read_at` either fills the whole buffer or fails
//! - a failed `write_at` leaves the caller's buffer untouched
//! - `modified` changes after every successful write or length change

/// Errors that can occur during block store operations.
#[derive(Debug)]
pub enum StorageError {
    /// Positioning the file cursor failed.
    Seek { offset: u64, source: std::io::Error },
    /// Reading a block failed or hit end of file.
    Read { offset: u64, source: std::io::Error },
    /// Writing a block failed.
    Write { offset: u64, source: std::io::Error },
    /// Opening, creating, syncing, truncating or removing the file failed.
    File(std::io::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seek { offset, source } => write!(f, "seek to offset {offset} failed: {source}"),
            Self::Read { offset, source } => write!(f, "read at offset {offset} failed: {source}"),
            Self::Write { offset, source } => {
                write!(f, "write at offset {offset} failed: {source}")
            }
            Self::File(e) => write!(f, "file error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Seek { source, .. } | Self::Read { source, .. } | Self::Write { source, .. } => {
                Some(source)
            }
            Self::File(e) => Some(e),
        }
    }
}

/// Random access byte store backing one index file.
pub trait BlockStore {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `buf` at `offset`, extending the store if needed.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError>;

    /// Current length in bytes.
    fn len(&mut self) -> Result<u64, StorageError>;

    /// True when the store holds no bytes at all.
    fn is_empty(&mut self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Truncate or extend to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Opaque modification stamp, compared against the stamp captured when
    /// a node chain was built. Larger means newer.
    fn modified(&mut self) -> Result<u64, StorageError>;
}

impl<T: BlockStore + ?Sized> BlockStore for Box<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        (**self).write_at(offset, buf)
    }

    fn len(&mut self) -> Result<u64, StorageError> {
        (**self).len()
    }

    fn set_len(&mut self, len: u64) -> Result<(), StorageError> {
        (**self).set_len(len)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        (**self).sync()
    }

    fn modified(&mut self) -> Result<u64, StorageError> {
        (**self).modified()
    }
}
