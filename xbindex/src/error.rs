//! Error type shared by every layer of the index engine.
//!
//! Physical I/O failures surface from the block store as [`StorageError`]
//! and are carried unchanged inside [`IndexError::Storage`]. Multi-step
//! structural changes attach the name of the failing step with
//! [`ResultExt::context`]; [`IndexError::root_cause`] sees through those
//! layers when a caller needs to match on the underlying kind.
//!
//! Navigation outcomes (end of file, empty tag, key not found) are not
//! errors; see [`crate::FindOutcome`] and [`crate::Position`].

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors returned by index operations.
#[derive(Debug)]
pub enum IndexError {
    /// Seek, read or write failure in the block store.
    Storage(StorageError),
    /// A node buffer could not be sized for the requested layout.
    NoMemory,
    /// The tag definition is not acceptable (name, expression, key length).
    InvalidTag(String),
    /// No tag with the given name exists in the index file.
    TagNotFound(String),
    /// The multi-tag file already holds the maximum number of tags.
    LimitReached,
    /// A unique tag already contains the key (strict mode only).
    DuplicateKey,
    /// Structural inconsistency found by an integrity check or while
    /// decoding on-disk data.
    InvalidIndex(String),
    /// Refused to overwrite an existing index file.
    FileExists(PathBuf),
    /// The index was closed or its file removed.
    NotOpen,
    /// Key type byte is not one the engine understands.
    InvalidKeyType(char),
    /// Caller passed an option outside the accepted range.
    InvalidOption(String),
    /// Record store or expression evaluator failure.
    Record(String),
    /// Engine configuration could not be loaded.
    Config(ConfigError),
    /// A step of a multi-step structural change failed.
    Context {
        step: &'static str,
        source: Box<Self>,
    },
}

impl IndexError {
    /// Strip any [`IndexError::Context`] layers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        let mut err = self;
        while let Self::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// True for physical I/O failures, however deeply wrapped.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self.root_cause(), Self::Storage(_))
    }
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::NoMemory => write!(f, "unable to allocate node buffer"),
            Self::InvalidTag(msg) => write!(f, "invalid tag: {msg}"),
            Self::TagNotFound(name) => write!(f, "tag not found: {name}"),
            Self::LimitReached => write!(f, "tag limit reached"),
            Self::DuplicateKey => write!(f, "duplicate key on unique tag"),
            Self::InvalidIndex(msg) => write!(f, "invalid index: {msg}"),
            Self::FileExists(path) => write!(f, "file already exists: {}", path.display()),
            Self::NotOpen => write!(f, "index is not open"),
            Self::InvalidKeyType(c) => write!(f, "invalid key type '{c}'"),
            Self::InvalidOption(msg) => write!(f, "invalid option: {msg}"),
            Self::Record(msg) => write!(f, "record error: {msg}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Context { step, source } => write!(f, "{step}: {source}"),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Context { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for IndexError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for IndexError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Attach the failing step to an error on its way up.
pub trait ResultExt<T> {
    fn context(self, step: &'static str) -> Result<T, IndexError>;
}

impl<T, E: Into<IndexError>> ResultExt<T> for Result<T, E> {
    fn context(self, step: &'static str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::Context {
            step,
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_sees_through_context() {
        let err: Result<(), IndexError> = Err(IndexError::DuplicateKey);
        let err = err.context("insert leaf").context("add key").unwrap_err();
        assert!(matches!(err.root_cause(), IndexError::DuplicateKey));
        assert_eq!(
            err.to_string(),
            "add key: insert leaf: duplicate key on unique tag"
        );
    }

    #[test]
    fn test_storage_error_is_storage() {
        let io = std::io::Error::other("disk gone");
        let err: IndexError = StorageError::Write { offset: 512, source: io }.into();
        let err = Err::<(), _>(err).context("split leaf").unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("offset 512"));
    }
}
