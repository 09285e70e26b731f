//! Byte-level access to index files.
//!
//! Everything above this layer addresses an index file as a flat byte
//! range through [`BlockStore`]:
//!
//! - [`BlockFile`]: a file on disk
//! - [`crate::simulation::MemoryStore`]: an in-memory image with fault
//!   injection, for tests
//!
//! Multi-byte fields are little-endian; see [`endian`].

pub mod endian;
mod file;
mod io;
pub(crate) mod time;

pub use file::{BlockFile, FileError};
pub use io::{BlockStore, StorageError};
pub use time::{SystemTimeSource, TimeSource};
