//! Index file I/O.
//!
//! This module handles reading and writing byte ranges of an index file on
//! disk. Every operation seeks explicitly; the engine is single threaded and
//! never relies on the cursor position left by a previous call.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::storage::io::{BlockStore, StorageError};

/// An index file handle.
#[derive(Debug)]
pub struct BlockFile {
    file: File,
    path: PathBuf,
}

impl BlockFile {
    /// Create a new, empty index file.
    ///
    /// Fails with [`FileError::AlreadyExists`] unless `overlay` is set, in
    /// which case an existing file is truncated.
    pub fn create(path: &Path, overlay: bool) -> Result<Self, FileError> {
        if path.exists() && !overlay {
            return Err(FileError::AlreadyExists(path.to_path_buf()));
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if overlay {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                FileError::AlreadyExists(path.to_path_buf())
            } else {
                FileError::Io(e)
            }
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing index file for reading and writing.
    pub fn open(path: &Path) -> Result<Self, FileError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(FileError::Io)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing index file without write access.
    pub fn open_read_only(path: &Path) -> Result<Self, FileError> {
        let file = File::open(path).map_err(FileError::Io)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path this file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockStore for BlockFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StorageError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek { offset, source })?;
        self.file
            .read_exact(buf)
            .map_err(|source| StorageError::Read { offset, source })
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), StorageError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| StorageError::Seek { offset, source })?;
        self.file
            .write_all(buf)
            .map_err(|source| StorageError::Write { offset, source })
    }

    fn len(&mut self) -> Result<u64, StorageError> {
        Ok(self.file.metadata().map_err(StorageError::File)?.len())
    }

    fn set_len(&mut self, len: u64) -> Result<(), StorageError> {
        self.file.set_len(len).map_err(StorageError::File)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all().map_err(StorageError::File)
    }

    #[allow(clippy::cast_possible_truncation)] // Nanoseconds fit u64 until the year 2554
    fn modified(&mut self) -> Result<u64, StorageError> {
        let modified = self
            .file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(StorageError::File)?;
        Ok(modified
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64))
    }
}

/// Errors that can occur when opening or creating an index file.
#[derive(Debug)]
pub enum FileError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(path) => write!(f, "file already exists: {}", path.display()),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::AlreadyExists(_) => None,
        }
    }
}

impl From<FileError> for crate::IndexError {
    fn from(e: FileError) -> Self {
        match e {
            FileError::Io(e) => Self::Storage(StorageError::File(e)),
            FileError::AlreadyExists(path) => Self::FileExists(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("test.ndx");
        (dir, path)
    }

    #[test]
    fn test_create_and_reopen() {
        let (_dir, path) = create_test_file();
        {
            let mut file = BlockFile::create(&path, false).expect("create file");
            file.write_at(512, b"block one").expect("write");
            file.sync().expect("sync");
            assert_eq!(file.len().expect("len"), 521);
        }

        let mut file = BlockFile::open(&path).expect("open file");
        let mut buf = [0u8; 9];
        file.read_at(512, &mut buf).expect("read");
        assert_eq!(&buf, b"block one");
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let (_dir, path) = create_test_file();
        BlockFile::create(&path, false).expect("create file");

        let err = BlockFile::create(&path, false).unwrap_err();
        assert!(matches!(err, FileError::AlreadyExists(_)));

        let mut file = BlockFile::create(&path, true).expect("overlay");
        assert_eq!(file.len().expect("len"), 0);
    }

    #[test]
    fn test_read_past_end_is_read_error() {
        let (_dir, path) = create_test_file();
        let mut file = BlockFile::create(&path, false).expect("create file");
        file.write_at(0, &[1, 2, 3]).expect("write");

        let mut buf = [0u8; 512];
        let err = file.read_at(0, &mut buf).unwrap_err();
        assert!(matches!(err, StorageError::Read { offset: 0, .. }));
    }

    #[test]
    fn test_set_len_truncates() {
        let (_dir, path) = create_test_file();
        let mut file = BlockFile::create(&path, false).expect("create file");
        file.write_at(0, &[7u8; 2048]).expect("write");
        file.set_len(1024).expect("truncate");
        assert_eq!(file.len().expect("len"), 1024);
    }
}
