//! Single-tag index files.
//!
//! One tag per file, 512-byte blocks, the header in block 0 and the
//! initial root in block 1. New blocks are always appended: the format
//! has no free list, so blocks emptied by deletes are never reused.
//! Numeric keys are stored as 8-byte doubles.

mod header;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use header::{BLOCK_SIZE, MAX_KEY_LEN, NdxHeader};

use crate::config::EngineConfig;
use crate::index::Index;
use crate::key::KeyType;
use crate::record::{Evaluator, ExprType};
use crate::storage::{BlockFile, BlockStore, endian};
use crate::tag::{Tag, TagDefinition, next_ndx_serial};
use crate::tree::node::{Format, Layout, Node};
use crate::tree::{self, FindOutcome, Position, TreeIo};
use crate::{IndexError, ResultExt};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// Block access for one single-tag file.
struct NdxIo<S> {
    store: S,
    total_blocks: u32,
}

impl<S: BlockStore> NdxIo<S> {
    /// Persist root and block count after a split, then bump the serial.
    fn commit_insert(&mut self, tag: &mut Tag, split: bool) -> Result<(), IndexError> {
        if split {
            let mut buf = [0u8; 8];
            endian::put_u32(&mut buf, 0, tag.root);
            endian::put_u32(&mut buf, 4, self.total_blocks);
            self.store.write_at(0, &buf)?;
        }
        tag.serial = next_ndx_serial(tag.serial);
        self.store.write_at(20, &[tag.serial])?;
        Ok(())
    }
}

impl<S: BlockStore> TreeIo for NdxIo<S> {
    fn read_node(&mut self, tag: &Tag, page: u32) -> Result<Node, IndexError> {
        if page == 0 || page >= self.total_blocks {
            return Err(IndexError::InvalidIndex(format!(
                "block {page} outside 1..{}",
                self.total_blocks
            )));
        }
        let mut node = Node::empty(page, BLOCK_SIZE)?;
        self.store.read_at(u64::from(page) * BLOCK, &mut node.data)?;
        node.check_key_count(&tag.layout)?;
        Ok(node)
    }

    fn write_node(&mut self, _tag: &Tag, node: &Node) -> Result<(), IndexError> {
        self.store
            .write_at(u64::from(node.page) * BLOCK, &node.data[..BLOCK_SIZE])?;
        Ok(())
    }

    fn allocate_node(&mut self, _tag: &mut Tag, _provenance: u32) -> Result<Node, IndexError> {
        let node = Node::empty(self.total_blocks, BLOCK_SIZE)?;
        self.total_blocks += 1;
        Ok(node)
    }

    fn harvest_node(
        &mut self,
        _tag: &mut Tag,
        _node: &mut Node,
        _write: bool,
    ) -> Result<(), IndexError> {
        Ok(())
    }

    fn set_root(&mut self, tag: &mut Tag, page: u32) -> Result<(), IndexError> {
        tag.root = page;
        Ok(())
    }

    fn refresh_tag(&mut self, tag: &mut Tag) -> Result<(), IndexError> {
        let mut buf = [0u8; 21];
        self.store.read_at(0, &mut buf)?;
        tag.root = endian::get_u32(&buf, 0);
        self.total_blocks = endian::get_u32(&buf, 4);
        tag.serial = buf[20];
        Ok(())
    }

    fn stamp(&mut self) -> Result<u64, IndexError> {
        Ok(self.store.modified()?)
    }

    fn reuse_empty_nodes(&self) -> bool {
        false
    }
}

/// An open single-tag index.
pub struct NdxIndex<S: BlockStore = BlockFile> {
    io: NdxIo<S>,
    tags: [Tag; 1],
    path: Option<PathBuf>,
}

impl NdxIndex<BlockFile> {
    /// Create an index file at `path`. The tag is named after the file.
    pub fn create(
        path: &Path,
        definition: &TagDefinition,
        evaluator: &dyn Evaluator,
        config: &EngineConfig,
        overlay: bool,
    ) -> Result<Self, IndexError> {
        let name = file_tag_name(path);
        let store = BlockFile::create(path, overlay)?;
        let mut index = Self::create_in(store, &name, definition, evaluator, config)?;
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, IndexError> {
        let store = BlockFile::open(path)?;
        let mut index = Self::open_in(store, &file_tag_name(path), config)?;
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    /// Open without write access, for inspection.
    pub fn open_read_only(path: &Path, config: &EngineConfig) -> Result<Self, IndexError> {
        let store = BlockFile::open_read_only(path)?;
        Self::open_in(store, &file_tag_name(path), config)
    }

    /// Delete the tag, which removes the whole file.
    pub fn delete(self) -> Result<(), IndexError> {
        let Self { io, tags, path } = self;
        drop(io);
        if let Some(path) = path {
            std::fs::remove_file(&path)
                .map_err(crate::storage::StorageError::File)
                .context("remove index file")?;
            info!(tag = %tags[0].name, path = %path.display(), "deleted single-tag index");
        }
        Ok(())
    }
}

impl<S: BlockStore> NdxIndex<S> {
    /// Write a new single-tag index into an empty store.
    ///
    /// Descending order and filters cannot be stored in this format and
    /// are ignored.
    pub fn create_in(
        mut store: S,
        name: &str,
        definition: &TagDefinition,
        evaluator: &dyn Evaluator,
        config: &EngineConfig,
    ) -> Result<Self, IndexError> {
        let expression = definition.key_expression.trim();
        if expression.is_empty() || expression.len() > header::MAX_EXPRESSION_LEN {
            return Err(IndexError::InvalidTag(format!(
                "key expression must be 1 to {} bytes",
                header::MAX_EXPRESSION_LEN
            )));
        }
        if definition.descending || definition.filter.is_some() {
            warn!(tag = name, "single-tag files store neither direction nor filter");
        }
        let (key_type, key_len) = match evaluator.describe(expression)? {
            ExprType::Char(len) => (KeyType::Char, len),
            ExprType::Numeric => (KeyType::Float, 8),
            ExprType::Date => (KeyType::Date, 8),
            ExprType::Logical => {
                return Err(IndexError::InvalidIndex(
                    "logical key expressions cannot be indexed".to_string(),
                ));
            }
        };
        if key_len == 0 || key_len > MAX_KEY_LEN {
            return Err(IndexError::InvalidTag(format!(
                "key length {key_len} outside 1..={MAX_KEY_LEN}"
            )));
        }

        let header = NdxHeader::new(key_type, key_len, definition.unique, expression);
        store.set_len(0)?;
        store.write_at(0, &header.encode()).context("write header")?;
        store
            .write_at(BLOCK, &[0u8; BLOCK_SIZE])
            .context("write root block")?;
        store.sync()?;

        info!(
            tag = name,
            key_len,
            keys_per_block = header.keys_per_block,
            "created single-tag index"
        );
        Ok(Self::from_header(store, name, &header, config))
    }

    /// Open a single-tag index held by `store`.
    pub fn open_in(mut store: S, name: &str, config: &EngineConfig) -> Result<Self, IndexError> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        store.read_at(0, &mut buf).context("read header")?;
        let header = NdxHeader::decode(&buf)?;
        debug!(
            tag = name,
            root = header.root,
            blocks = header.total_blocks,
            "opened single-tag index"
        );
        Ok(Self::from_header(store, name, &header, config))
    }

    fn from_header(store: S, name: &str, header: &NdxHeader, config: &EngineConfig) -> Self {
        let layout = Layout {
            format: Format::Ndx,
            key_type: header.key_type,
            key_len: header.key_len,
            item_len: header.item_len,
            keys_per_block: header.keys_per_block,
            block_size: BLOCK_SIZE,
            descending: false,
        };
        let mut tag = Tag::new(
            name,
            &header.key_expression,
            None,
            header.unique,
            layout,
            config.duplicate_key_mode,
        );
        tag.root = header.root;
        tag.serial = header.serial;
        Self {
            io: NdxIo {
                store,
                total_blocks: header.total_blocks,
            },
            tags: [tag],
            path: None,
        }
    }

    /// Blocks in the file, header included.
    #[must_use]
    pub const fn total_blocks(&self) -> u32 {
        self.io.total_blocks
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.io.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.io.store
    }

    /// Flush and hand back the store.
    pub fn close(mut self) -> Result<S, IndexError> {
        self.io.store.sync()?;
        Ok(self.io.store)
    }

    fn single(&mut self, tag: usize) -> Result<&mut Tag, IndexError> {
        if tag == 0 {
            Ok(&mut self.tags[0])
        } else {
            Err(IndexError::TagNotFound(format!("#{tag}")))
        }
    }
}

fn file_tag_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl<S: BlockStore> Index for NdxIndex<S> {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tag_mut(&mut self, tag: usize) -> Result<&mut Tag, IndexError> {
        self.single(tag)
    }

    fn find_key_bytes(&mut self, tag: usize, search: &[u8]) -> Result<FindOutcome, IndexError> {
        self.single(tag)?;
        tree::find(&mut self.io, &mut self.tags[0], search)
    }

    fn first_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.single(tag)?;
        tree::first(&mut self.io, &mut self.tags[0])
    }

    fn last_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.single(tag)?;
        tree::last(&mut self.io, &mut self.tags[0])
    }

    fn next_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.single(tag)?;
        tree::next(&mut self.io, &mut self.tags[0])
    }

    fn prev_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.single(tag)?;
        tree::prev(&mut self.io, &mut self.tags[0])
    }

    fn add_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<(), IndexError> {
        self.single(tag)?;
        let tag = &mut self.tags[0];
        let split = tree::add_key(&mut self.io, tag, key, record)?;
        self.io.commit_insert(tag, split).context("update header")
    }

    fn delete_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError> {
        self.single(tag)?;
        tree::delete_key(&mut self.io, &mut self.tags[0], key, record)
    }

    fn locate(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError> {
        self.single(tag)?;
        tree::locate(&mut self.io, &mut self.tags[0], key, record)
    }

    fn clear_tag(&mut self, tag: usize) -> Result<(), IndexError> {
        self.single(tag)?;
        let tag = &mut self.tags[0];
        tag.chain.clear();
        tag.root = 1;
        self.io.total_blocks = 2;
        self.io.store.set_len(2 * BLOCK)?;
        self.io
            .store
            .write_at(BLOCK, &[0u8; BLOCK_SIZE])
            .context("clear root block")?;
        self.io.commit_insert(tag, true).context("update header")
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        Ok(self.io.store.sync()?)
    }
}
