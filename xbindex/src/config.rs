//! Engine configuration.
//!
//! Options that change how the index engine behaves, loaded from
//! environment variables. Every variable is optional.
//!
//! # Environment Variables
//!
//! - `XBINDEX_DUPLICATE_KEY_MODE`: `compat` or `strict` (default: `compat`)
//! - `XBINDEX_REUSE_EMPTY_NODES`: reclaim emptied blocks (default: `true`)
//! - `XBINDEX_MDX_BLOCK_SIZE`: node size for new multi-tag files, a multiple
//!   of 512 from 512 to 16384 (default: `1024`)

/// How unique tags treat a second record with an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeyMode {
    /// The first record wins; later records with the same key are left out
    /// of the tag without an error. Deleted records keep their keys.
    #[default]
    Compat,
    /// The add fails with `DuplicateKey`. Deleted records are not indexed.
    Strict,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub duplicate_key_mode: DuplicateKeyMode,
    /// Push blocks that empty during deletes onto the free list.
    pub reuse_empty_nodes: bool,
    /// Block size for newly created multi-tag files.
    pub mdx_block_size: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            duplicate_key_mode: DuplicateKeyMode::default(),
            reuse_empty_nodes: Self::DEFAULT_REUSE_EMPTY_NODES,
            mdx_block_size: Self::DEFAULT_MDX_BLOCK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Default node size of new multi-tag files.
    pub const DEFAULT_MDX_BLOCK_SIZE: usize = 1024;
    /// Emptied blocks are reclaimed unless told otherwise.
    pub const DEFAULT_REUSE_EMPTY_NODES: bool = true;
    /// Largest multi-tag block size (block factor 32).
    pub const MAX_MDX_BLOCK_SIZE: usize = 16384;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a value outside its range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            duplicate_key_mode: Self::load_duplicate_key_mode(
                lookup("XBINDEX_DUPLICATE_KEY_MODE").as_deref(),
            )?,
            reuse_empty_nodes: Self::load_reuse_empty_nodes(
                lookup("XBINDEX_REUSE_EMPTY_NODES").as_deref(),
            )?,
            mdx_block_size: Self::load_mdx_block_size(lookup("XBINDEX_MDX_BLOCK_SIZE").as_deref())?,
        })
    }

    fn load_duplicate_key_mode(value: Option<&str>) -> Result<DuplicateKeyMode, ConfigError> {
        match value.map(str::trim) {
            None => Ok(DuplicateKeyMode::default()),
            Some(v) if v.eq_ignore_ascii_case("compat") => Ok(DuplicateKeyMode::Compat),
            Some(v) if v.eq_ignore_ascii_case("strict") => Ok(DuplicateKeyMode::Strict),
            Some(v) => Err(ConfigError::InvalidValue {
                name: "XBINDEX_DUPLICATE_KEY_MODE".to_string(),
                message: format!("'{v}' is not one of compat, strict"),
            }),
        }
    }

    fn load_reuse_empty_nodes(value: Option<&str>) -> Result<bool, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::DEFAULT_REUSE_EMPTY_NODES);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: "XBINDEX_REUSE_EMPTY_NODES".to_string(),
                message: format!("'{value}' is not a boolean"),
            }),
        }
    }

    fn load_mdx_block_size(value: Option<&str>) -> Result<usize, ConfigError> {
        let Some(value) = value else {
            return Ok(Self::DEFAULT_MDX_BLOCK_SIZE);
        };
        let invalid = || ConfigError::InvalidValue {
            name: "XBINDEX_MDX_BLOCK_SIZE".to_string(),
            message: format!(
                "'{value}' is not a multiple of 512 between 512 and {}",
                Self::MAX_MDX_BLOCK_SIZE
            ),
        };
        let size = value.trim().parse::<usize>().map_err(|_| invalid())?;
        if size == 0 || size % 512 != 0 || size > Self::MAX_MDX_BLOCK_SIZE {
            return Err(invalid());
        }
        Ok(size)
    }

    #[must_use]
    pub const fn with_duplicate_key_mode(mut self, mode: DuplicateKeyMode) -> Self {
        self.duplicate_key_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_reuse_empty_nodes(mut self, reuse: bool) -> Self {
        self.reuse_empty_nodes = reuse;
        self
    }

    #[must_use]
    pub const fn with_mdx_block_size(mut self, size: usize) -> Self {
        self.mdx_block_size = size;
        self
    }
}
