//! Multi-tag index files.
//!
//! Up to 47 tags share one file. Pages are 512 bytes; nodes span a whole
//! block of `block factor` pages. Each tag owns a header block and a tree
//! whose blocks are allocated from the file's page counter or, when empty
//! node reuse is on, from the free list threaded through harvested blocks.

mod header;
mod table;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

pub use header::{
    FILE_HEADER_LEN, MAX_FILTER_LEN, MAX_KEY_EXPRESSION_LEN, MAX_KEY_LEN, MdxHeader, PAGE_SIZE,
    TAG_HEADER_LEN, TagHeader,
};
pub use table::{MAX_TAGS, TagEntry};

use crate::config::EngineConfig;
use crate::index::Index;
use crate::key::KeyType;
use crate::record::{Evaluator, ExprType};
use crate::storage::{BlockFile, BlockStore, StorageError, SystemTimeSource, TimeSource, endian};
use crate::tag::{Tag, TagDefinition};
use crate::tree::node::{Format, Layout, Node};
use crate::tree::{self, FindOutcome, Position, TreeIo};
use crate::{IndexError, ResultExt};
use header::date_bytes;
use table::{TAG_ENTRY_LEN, TAG_TABLE_LEN, TAG_TABLE_OFFSET};

/// What [`MdxIndex::delete_tag`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDeleted {
    /// The tag is gone; the file keeps its other tags.
    Tag,
    /// It was the only tag, so the whole file was removed and the index
    /// is closed.
    File,
}

const fn byte_offset(page: u32) -> u64 {
    page as u64 * PAGE_SIZE as u64
}

/// Pages a tag header occupies.
const fn header_pages(block_factor: u32) -> u32 {
    let min = (TAG_HEADER_LEN / PAGE_SIZE) as u32;
    if block_factor > min { block_factor } else { min }
}

/// Block access and file-level bookkeeping for one multi-tag file.
struct MdxIo<S> {
    store: S,
    header: MdxHeader,
    reuse: bool,
    clock: Box<dyn TimeSource>,
}

impl<S: BlockStore> MdxIo<S> {
    fn block_size(&self) -> usize {
        self.header.block_size()
    }

    fn block_factor(&self) -> u32 {
        u32::from(self.header.block_factor)
    }

    /// Persist the file header counters and stamp the update date.
    /// `with_tags` also writes the tag counts.
    fn write_counters(&mut self, with_tags: bool) -> Result<(), IndexError> {
        self.header.updated = date_bytes(self.clock.today());
        let mut buf = [0u8; 48];
        self.header.encode_counters(&mut buf);
        let start = if with_tags { 28 } else { 32 };
        self.store.write_at(start as u64, &buf[start..47])?;
        Ok(())
    }

    fn write_tag_field(&mut self, tag: &Tag, at: usize, bytes: &[u8]) -> Result<(), IndexError> {
        self.store
            .write_at(byte_offset(tag.header_page) + at as u64, bytes)?;
        Ok(())
    }

    fn write_tag_u32(&mut self, tag: &Tag, at: usize, value: u32) -> Result<(), IndexError> {
        let mut buf = [0u8; 4];
        endian::put_u32(&mut buf, 0, value);
        self.write_tag_field(tag, at, &buf)
    }

    fn bump_serial(&mut self, tag: &mut Tag) -> Result<(), IndexError> {
        tag.serial = tag.serial.wrapping_add(1);
        self.write_tag_field(tag, 20, &[tag.serial])
    }

    fn read_block(&mut self, page: u32) -> Result<Node, IndexError> {
        let mut node = Node::empty(page, self.block_size())?;
        self.store.read_at(byte_offset(page), &mut node.data)?;
        Ok(node)
    }

    /// Zero a node and push it on the free list. The tag's root is only
    /// cleared in place unless `release_root` is set.
    fn harvest(
        &mut self,
        tag: &mut Tag,
        node: &mut Node,
        write: bool,
        release_root: bool,
    ) -> Result<(), IndexError> {
        let keep_root = node.page == tag.root && !release_root;
        node.clear();
        if keep_root {
            if tag.has_keys {
                tag.has_keys = false;
                self.write_tag_field(tag, 246, &[0])?;
            }
        } else {
            node.set_link(self.header.first_free);
            self.header.first_free = node.page;
            let mut buf = [0u8; 4];
            endian::put_u32(&mut buf, 0, node.page);
            self.store.write_at(36, &buf)?;
            debug!(tag = %tag.name, page = node.page, "harvested block");
        }
        if write {
            self.write_node(tag, node)?;
        }
        Ok(())
    }

    /// Pages on the free list, head first.
    fn free_pages(&mut self) -> Result<Vec<u32>, IndexError> {
        let mut pages = Vec::new();
        let mut page = self.header.first_free;
        while page != 0 {
            if pages.len() as u64 > u64::from(self.header.page_count) {
                return Err(IndexError::InvalidIndex("free list loops".to_string()));
            }
            pages.push(page);
            let mut link = [0u8; 4];
            self.store.read_at(byte_offset(page) + 4, &mut link)?;
            page = endian::get_u32(&link, 0);
        }
        Ok(pages)
    }
}

impl<S: BlockStore> TreeIo for MdxIo<S> {
    fn read_node(&mut self, tag: &Tag, page: u32) -> Result<Node, IndexError> {
        if page < header::FIRST_TAG_PAGE || page >= self.header.page_count {
            return Err(IndexError::InvalidIndex(format!(
                "page {page} outside {}..{}",
                header::FIRST_TAG_PAGE,
                self.header.page_count
            )));
        }
        let node = self.read_block(page)?;
        node.check_key_count(&tag.layout)?;
        Ok(node)
    }

    fn write_node(&mut self, _tag: &Tag, node: &Node) -> Result<(), IndexError> {
        let size = self.block_size();
        self.store.write_at(byte_offset(node.page), &node.data[..size])?;
        Ok(())
    }

    fn allocate_node(&mut self, tag: &mut Tag, provenance: u32) -> Result<Node, IndexError> {
        let mut node = if self.header.first_free > 0 && self.reuse {
            let page = self.header.first_free;
            let mut node = self.read_block(page)?;
            self.header.first_free = node.link();
            self.store.write_at(36, &node.data[4..8])?;
            node.clear();
            debug!(tag = %tag.name, page, "reused free block");
            node
        } else {
            let node = Node::empty(self.header.page_count, self.block_size())?;
            self.header.page_count += self.block_factor();
            node
        };
        tag.tag_size += self.block_factor();
        if provenance > 0 {
            node.set_link(provenance);
        }
        Ok(node)
    }

    fn harvest_node(
        &mut self,
        tag: &mut Tag,
        node: &mut Node,
        write: bool,
    ) -> Result<(), IndexError> {
        self.harvest(tag, node, write, false)
    }

    fn set_root(&mut self, tag: &mut Tag, page: u32) -> Result<(), IndexError> {
        tag.root = page;
        self.write_tag_u32(tag, 0, page)
    }

    fn refresh_tag(&mut self, tag: &mut Tag) -> Result<(), IndexError> {
        let mut buf = [0u8; 256];
        self.store.read_at(byte_offset(tag.header_page), &mut buf)?;
        tag.root = endian::get_u32(&buf, 0);
        tag.tag_size = endian::get_u32(&buf, 4);
        tag.serial = buf[20];
        tag.has_keys = buf[246] != 0;
        tag.left_sibling = endian::get_u32(&buf, 248);
        tag.right_sibling = endian::get_u32(&buf, 252);

        let mut counters = [0u8; 48];
        self.store.read_at(28, &mut counters[28..47])?;
        self.header.decode_counters(&counters);
        Ok(())
    }

    fn stamp(&mut self) -> Result<u64, IndexError> {
        Ok(self.store.modified()?)
    }

    fn reuse_empty_nodes(&self) -> bool {
        self.reuse
    }
}

/// An open multi-tag index.
pub struct MdxIndex<S: BlockStore = BlockFile> {
    io: MdxIo<S>,
    entries: Vec<TagEntry>,
    tags: Vec<Tag>,
    config: EngineConfig,
    path: Option<PathBuf>,
    open: bool,
}

impl MdxIndex<BlockFile> {
    /// Create an empty multi-tag file at `path`.
    pub fn create(path: &Path, config: &EngineConfig, overlay: bool) -> Result<Self, IndexError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let store = BlockFile::create(path, overlay)?;
        let mut index = Self::create_in(store, &name, config, Box::new(SystemTimeSource))?;
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self, IndexError> {
        let store = BlockFile::open(path)?;
        let mut index = Self::open_in(store, config)?;
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    /// Open without write access, for inspection.
    pub fn open_read_only(path: &Path, config: &EngineConfig) -> Result<Self, IndexError> {
        let store = BlockFile::open_read_only(path)?;
        Self::open_in(store, config)
    }
}

impl<S: BlockStore> MdxIndex<S> {
    /// Write an empty multi-tag file into `store`, using the configured
    /// block size.
    pub fn create_in(
        mut store: S,
        file_name: &str,
        config: &EngineConfig,
        clock: Box<dyn TimeSource>,
    ) -> Result<Self, IndexError> {
        let block_size = config.mdx_block_size;
        if block_size == 0
            || block_size % PAGE_SIZE != 0
            || block_size > EngineConfig::MAX_MDX_BLOCK_SIZE
        {
            return Err(IndexError::InvalidOption(format!(
                "block size {block_size} is not a multiple of {PAGE_SIZE} up to {}",
                EngineConfig::MAX_MDX_BLOCK_SIZE
            )));
        }
        let header = MdxHeader::new(file_name, block_size, clock.today());
        store.set_len(0)?;
        store.write_at(0, &header.encode()).context("write file header")?;
        store.sync()?;
        info!(file = %header.file_name, block_size, "created multi-tag index");

        Ok(Self {
            io: MdxIo {
                store,
                header,
                reuse: config.reuse_empty_nodes,
                clock,
            },
            entries: Vec::new(),
            tags: Vec::new(),
            config: *config,
            path: None,
            open: true,
        })
    }

    /// Open the multi-tag file held by `store` and load every tag.
    pub fn open_in(mut store: S, config: &EngineConfig) -> Result<Self, IndexError> {
        let mut buf = vec![0u8; FILE_HEADER_LEN];
        store.read_at(0, &mut buf).context("read file header")?;
        let header = MdxHeader::decode(&buf)?;
        let block_size = header.block_size();

        let mut entries = Vec::with_capacity(usize::from(header.tags_in_use));
        let mut tags = Vec::with_capacity(entries.capacity());
        for i in 0..usize::from(header.tags_in_use) {
            let at = TAG_TABLE_OFFSET + i * TAG_ENTRY_LEN;
            let entry = TagEntry::decode(&buf[at..at + TAG_ENTRY_LEN])?;

            let mut block = vec![0u8; TAG_HEADER_LEN];
            store
                .read_at(byte_offset(entry.header_page), &mut block)
                .context("read tag header")?;
            let tag_header = TagHeader::decode(&block)?;
            if tag_header.keys_per_block
                != header::keys_per_block(block_size, tag_header.item_len)
            {
                warn!(
                    tag = %entry.name,
                    stored = tag_header.keys_per_block,
                    "keys per block disagrees with block size"
                );
            }
            tags.push(build_tag(&entry, &tag_header, block_size, config));
            entries.push(entry);
        }
        debug!(file = %header.file_name, tags = tags.len(), "opened multi-tag index");

        Ok(Self {
            io: MdxIo {
                store,
                header,
                reuse: config.reuse_empty_nodes,
                clock: Box::new(SystemTimeSource),
            },
            entries,
            tags,
            config: *config,
            path: None,
            open: true,
        })
    }

    /// Replace the calendar used for update dates.
    pub fn set_time_source(&mut self, clock: Box<dyn TimeSource>) {
        self.io.clock = clock;
    }

    /// Add a tag and return its position.
    pub fn create_tag(
        &mut self,
        definition: &TagDefinition,
        evaluator: &dyn Evaluator,
    ) -> Result<usize, IndexError> {
        self.ensure_open()?;
        if self.tags.len() >= MAX_TAGS {
            return Err(IndexError::LimitReached);
        }
        definition.validate_name()?;
        let name = definition.name.to_ascii_uppercase();
        if self.tag_id(&name).is_ok() {
            return Err(IndexError::InvalidTag(format!("tag {name} already exists")));
        }

        if let Some(filter) = &definition.filter {
            if filter.len() > MAX_FILTER_LEN {
                return Err(IndexError::InvalidTag(format!(
                    "filter longer than {MAX_FILTER_LEN} bytes"
                )));
            }
            if evaluator.describe(filter)? != ExprType::Logical {
                return Err(IndexError::InvalidTag(format!(
                    "filter of tag {name} is not logical"
                )));
            }
        }
        let expression = definition.key_expression.trim();
        if expression.is_empty() || expression.len() > MAX_KEY_EXPRESSION_LEN {
            return Err(IndexError::InvalidTag(format!(
                "key expression must be 1 to {MAX_KEY_EXPRESSION_LEN} bytes"
            )));
        }
        let (key_type, key_len) = match evaluator.describe(expression)? {
            ExprType::Char(len) => (KeyType::Char, len),
            ExprType::Numeric => (KeyType::Numeric, KeyType::Numeric.fixed_len().unwrap_or(12)),
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

        let factor = self.io.block_factor();
        let block_size = self.io.block_size();
        let header_page = self.io.header.page_count;
        let root = header_page + header_pages(factor);
        self.io.header.page_count = root + factor;

        let item_len = header::item_len(key_len);
        let tag_header = TagHeader {
            root,
            tag_size: factor,
            key_type,
            key_len,
            keys_per_block: header::keys_per_block(block_size, item_len),
            item_len,
            serial: 1,
            unique: definition.unique,
            descending: definition.descending,
            key_expression: expression.to_string(),
            filter: definition.filter.clone(),
            has_keys: false,
            left_sibling: root,
            right_sibling: root,
            created: date_bytes(self.io.clock.today()),
            single_field: is_single_field(expression),
        };
        let entry = TagEntry::new(header_page, &name, key_type);
        let slot = self.entries.len();

        let store = &mut self.io.store;
        store
            .write_at((TAG_TABLE_OFFSET + slot * TAG_ENTRY_LEN) as u64, &entry.encode())
            .context("write tag table entry")?;
        store
            .write_at(
                byte_offset(header_page),
                &tag_header.encode(header_pages(factor) as usize * PAGE_SIZE),
            )
            .context("write tag header")?;
        store
            .write_at(byte_offset(root), &vec![0u8; block_size])
            .context("write root block")?;

        self.io.header.tags_in_use += 1;
        self.io.header.next_tag = self.io.header.next_tag.wrapping_add(1);
        self.io.write_counters(true).context("update file header")?;

        self.tags
            .push(build_tag(&entry, &tag_header, block_size, &self.config));
        self.entries.push(entry);
        self.write_name_links().context("update tag tree")?;
        self.io.store.sync()?;

        info!(
            tag = %name,
            key_len,
            keys_per_block = tag_header.keys_per_block,
            root,
            "created tag"
        );
        Ok(slot)
    }

    /// Remove a tag. Deleting the only tag removes the file and closes the
    /// index.
    pub fn delete_tag(&mut self, tag: usize) -> Result<TagDeleted, IndexError> {
        self.live(tag)?;
        let name = self.tags[tag].name.clone();

        if self.tags.len() == 1 {
            self.io.store.set_len(0)?;
            if let Some(path) = &self.path {
                std::fs::remove_file(path)
                    .map_err(StorageError::File)
                    .context("remove index file")?;
            }
            self.tags.clear();
            self.entries.clear();
            self.open = false;
            info!(tag = %name, "deleted last tag, removed index file");
            return Ok(TagDeleted::File);
        }

        self.harvest_tag(tag, true).context("harvest tag blocks")?;

        let mut table = vec![0u8; TAG_TABLE_LEN];
        self.io
            .store
            .read_at(TAG_TABLE_OFFSET as u64, &mut table)
            .context("read tag table")?;
        let start = tag * TAG_ENTRY_LEN;
        table.copy_within(start + TAG_ENTRY_LEN.., start);
        let tail = TAG_TABLE_LEN - TAG_ENTRY_LEN;
        table[tail..].fill(0);
        self.io
            .store
            .write_at(TAG_TABLE_OFFSET as u64, &table)
            .context("write tag table")?;

        self.tags.remove(tag);
        self.entries.remove(tag);
        self.io.header.tags_in_use -= 1;
        self.io.header.next_tag = self.io.header.next_tag.wrapping_sub(1);
        self.io.write_counters(true).context("update file header")?;
        self.write_name_links().context("update tag tree")?;
        self.io.store.sync()?;

        info!(tag = %name, remaining = self.tags.len(), "deleted tag");
        Ok(TagDeleted::Tag)
    }

    /// Push every block of a tag on the free list. The root stays in
    /// place, emptied, unless `release_root` is set, in which case the
    /// tag header goes too.
    fn harvest_tag(&mut self, id: usize, release_root: bool) -> Result<(), IndexError> {
        let tag = &mut self.tags[id];
        tag.chain.clear();
        let mut pages = tree::reachable_pages(&mut self.io, tag)?;
        if release_root {
            let factor = self.io.block_factor();
            let header_blocks = header_pages(factor).div_ceil(factor);
            pages.extend((0..header_blocks).map(|b| tag.header_page + b * factor));
        }
        pages.sort_unstable();
        for page in &pages {
            let mut node = self.io.read_block(*page)?;
            self.io.harvest(tag, &mut node, true, release_root)?;
        }
        self.io.write_counters(false)?;
        debug!(tag = %tag.name, blocks = pages.len(), "harvested tag");
        Ok(())
    }

    /// Recompute the name tree and write the links of every entry.
    fn write_name_links(&mut self) -> Result<(), IndexError> {
        table::link_names(&mut self.entries);
        for (i, entry) in self.entries.iter().enumerate() {
            let at = TAG_TABLE_OFFSET + i * TAG_ENTRY_LEN + 16;
            self.io
                .store
                .write_at(at as u64, &[entry.left, entry.right, entry.parent])?;
        }
        Ok(())
    }

    fn commit_insert(
        &mut self,
        id: usize,
        size_before: u32,
        right_before: u32,
    ) -> Result<(), IndexError> {
        self.io.write_counters(false)?;
        let tag = &mut self.tags[id];
        if tag.tag_size != size_before {
            self.io.write_tag_u32(tag, 4, tag.tag_size)?;
        }
        if !tag.has_keys {
            tag.has_keys = true;
            self.io.write_tag_field(tag, 246, &[1])?;
        }
        if tag.right_sibling != right_before {
            self.io.write_tag_u32(tag, 252, tag.right_sibling)?;
        }
        self.io.bump_serial(tag)
    }

    fn commit_delete(&mut self, id: usize) -> Result<(), IndexError> {
        self.io.write_counters(false)?;
        let tag = &mut self.tags[id];
        if tag.has_keys {
            // An interior root without separators still has a child.
            let root = self.io.read_node(tag, tag.root)?;
            if root.key_count() == 0 && root.is_leaf(&tag.layout) {
                tag.has_keys = false;
                self.io.write_tag_field(tag, 246, &[0])?;
            }
        }
        self.io.bump_serial(tag)
    }

    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.open {
            Ok(())
        } else {
            Err(IndexError::NotOpen)
        }
    }

    fn live(&self, tag: usize) -> Result<(), IndexError> {
        self.ensure_open()?;
        if tag < self.tags.len() {
            Ok(())
        } else {
            Err(IndexError::TagNotFound(format!("#{tag}")))
        }
    }

    #[must_use]
    pub const fn header(&self) -> &MdxHeader {
        &self.io.header
    }

    #[must_use]
    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Pages on the free list, most recently harvested first.
    pub fn free_pages(&mut self) -> Result<Vec<u32>, IndexError> {
        self.ensure_open()?;
        self.io.free_pages()
    }

    /// Every page the tree of `tag` uses.
    pub fn tag_pages(&mut self, tag: usize) -> Result<Vec<u32>, IndexError> {
        self.live(tag)?;
        tree::reachable_pages(&mut self.io, &self.tags[tag])
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
        if self.open {
            self.io.store.sync()?;
        }
        Ok(self.io.store)
    }
}

fn build_tag(
    entry: &TagEntry,
    header: &TagHeader,
    block_size: usize,
    config: &EngineConfig,
) -> Tag {
    let layout = Layout {
        format: Format::Mdx,
        key_type: header.key_type,
        key_len: header.key_len,
        item_len: header.item_len,
        keys_per_block: header.keys_per_block,
        block_size,
        descending: header.descending,
    };
    let mut tag = Tag::new(
        &entry.name,
        &header.key_expression,
        header.filter.clone(),
        header.unique,
        layout,
        config.duplicate_key_mode,
    );
    tag.root = header.root;
    tag.header_page = entry.header_page;
    tag.tag_size = header.tag_size;
    tag.has_keys = header.has_keys;
    tag.left_sibling = header.left_sibling;
    tag.right_sibling = header.right_sibling;
    tag.serial = header.serial;
    tag
}

/// A key expression naming one field and nothing else.
fn is_single_field(expression: &str) -> bool {
    let mut bytes = expression.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl<S: BlockStore> Index for MdxIndex<S> {
    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn tag_mut(&mut self, tag: usize) -> Result<&mut Tag, IndexError> {
        self.live(tag)?;
        Ok(&mut self.tags[tag])
    }

    fn tag_id(&self, name: &str) -> Result<usize, IndexError> {
        self.ensure_open()?;
        table::search_names(&self.entries, name)
            .or_else(|| {
                self.tags
                    .iter()
                    .position(|t| t.name.eq_ignore_ascii_case(name.trim()))
            })
            .ok_or_else(|| IndexError::TagNotFound(name.to_string()))
    }

    fn find_key_bytes(&mut self, tag: usize, search: &[u8]) -> Result<FindOutcome, IndexError> {
        self.live(tag)?;
        tree::find(&mut self.io, &mut self.tags[tag], search)
    }

    fn first_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.live(tag)?;
        tree::first(&mut self.io, &mut self.tags[tag])
    }

    fn last_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.live(tag)?;
        tree::last(&mut self.io, &mut self.tags[tag])
    }

    fn next_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.live(tag)?;
        tree::next(&mut self.io, &mut self.tags[tag])
    }

    fn prev_key(&mut self, tag: usize) -> Result<Position, IndexError> {
        self.live(tag)?;
        tree::prev(&mut self.io, &mut self.tags[tag])
    }

    fn add_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<(), IndexError> {
        self.live(tag)?;
        let t = &mut self.tags[tag];
        let (size_before, right_before) = (t.tag_size, t.right_sibling);
        tree::add_key(&mut self.io, t, key, record)?;
        self.commit_insert(tag, size_before, right_before)
            .context("update tag header")
    }

    fn delete_key(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError> {
        self.live(tag)?;
        if !tree::delete_key(&mut self.io, &mut self.tags[tag], key, record)? {
            return Ok(false);
        }
        self.commit_delete(tag).context("update tag header")?;
        Ok(true)
    }

    fn locate(&mut self, tag: usize, key: &[u8], record: u32) -> Result<bool, IndexError> {
        self.live(tag)?;
        tree::locate(&mut self.io, &mut self.tags[tag], key, record)
    }

    fn clear_tag(&mut self, tag: usize) -> Result<(), IndexError> {
        self.live(tag)?;
        self.harvest_tag(tag, false)?;
        let t = &mut self.tags[tag];
        t.left_sibling = t.root;
        t.right_sibling = t.root;
        let mut siblings = [0u8; 8];
        endian::put_u32(&mut siblings, 0, t.root);
        endian::put_u32(&mut siblings, 4, t.root);
        self.io.write_tag_field(t, 248, &siblings)?;
        self.io.bump_serial(t)
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        self.ensure_open()?;
        Ok(self.io.store.sync()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{FixedTimeSource, MemoryStore};
    use crate::testing::FieldEvaluator;
    use crate::key::Date;

    fn clock() -> Box<dyn TimeSource> {
        Box::new(FixedTimeSource::new(Date::new(2024, 5, 17).expect("valid date")))
    }

    fn evaluator() -> FieldEvaluator {
        FieldEvaluator::new()
            .char_field("NAME", 10)
            .char_field("CITY", 8)
            .numeric_field("BALANCE")
            .date_field("HIRED")
            .logical_field("ACTIVE")
    }

    fn new_index(config: &EngineConfig) -> MdxIndex<MemoryStore> {
        MdxIndex::create_in(MemoryStore::new(3), "people", config, clock()).expect("create")
    }

    #[test]
    fn test_create_tag_layout() {
        let mut index = new_index(&EngineConfig::default());
        let id = index
            .create_tag(&TagDefinition::new("name", "NAME").unique(), &evaluator())
            .expect("create tag");
        assert_eq!(id, 0);

        let header = index.header().clone();
        assert_eq!(header.tags_in_use, 1);
        assert_eq!(header.next_tag, 2);
        assert_eq!(header.page_count, 8);

        let tag = index.tag(0).expect("tag");
        assert_eq!(tag.name(), "NAME");
        assert_eq!((tag.header_page, tag.root_page(), tag.tag_size()), (4, 6, 2));
        assert_eq!(tag.key_len(), 10);
        assert_eq!(tag.keys_per_block(), 63);

        let bytes = index.store().bytes();
        assert_eq!(endian::get_u32(bytes, 544), 4);
        assert_eq!(&bytes[548..552], b"NAME");
        assert_eq!(bytes[564], b'C');
        assert_eq!(endian::get_u32(bytes, 4 * 512), 6);
        assert_eq!(bytes[4 * 512 + 8], 0x50);
        assert_eq!(bytes[4 * 512 + 480], 0x01);
        assert_eq!(endian::get_u32(bytes, 4 * 512 + 252), 6);
    }

    #[test]
    fn test_create_tag_rejects_bad_definitions() {
        let mut index = new_index(&EngineConfig::default());
        let eval = evaluator();
        index
            .create_tag(&TagDefinition::new("NAME", "NAME"), &eval)
            .expect("create tag");

        let duplicate = index.create_tag(&TagDefinition::new("name", "CITY"), &eval);
        assert!(matches!(duplicate, Err(IndexError::InvalidTag(_))));

        let long = index.create_tag(&TagDefinition::new("ELEVENCHARS", "CITY"), &eval);
        assert!(matches!(long, Err(IndexError::InvalidTag(_))));

        let filter = index.create_tag(
            &TagDefinition::new("CITY", "CITY").with_filter("NAME"),
            &eval,
        );
        assert!(matches!(filter, Err(IndexError::InvalidTag(_))));

        let logical = index.create_tag(&TagDefinition::new("ACT", "ACTIVE"), &eval);
        assert!(matches!(logical, Err(IndexError::InvalidIndex(_))));
        assert_eq!(index.tag_count(), 1);
    }

    #[test]
    fn test_tag_limit() {
        let mut index = new_index(&EngineConfig::default().with_mdx_block_size(512));
        let eval = evaluator();
        for i in 0..MAX_TAGS {
            index
                .create_tag(&TagDefinition::new(&format!("T{i}"), "CITY"), &eval)
                .expect("create tag");
        }
        let err = index.create_tag(&TagDefinition::new("ONEMORE", "CITY"), &eval);
        assert!(matches!(err, Err(IndexError::LimitReached)));
    }

    #[test]
    fn test_reopen_finds_tags_by_name() {
        let config = EngineConfig::default();
        let mut index = new_index(&config);
        let eval = evaluator();
        for (name, expr) in [
            ("NAME", "NAME"),
            ("CITY", "CITY"),
            ("BAL", "BALANCE"),
            ("HIRED", "HIRED"),
        ] {
            index
                .create_tag(&TagDefinition::new(name, expr), &eval)
                .expect("create tag");
        }
        let store = index.close().expect("close");

        let index = MdxIndex::open_in(store, &config).expect("reopen");
        assert_eq!(index.tag_count(), 4);
        assert_eq!(index.tag_id("hired").expect("lookup"), 3);
        assert_eq!(index.tag_id("BAL").expect("lookup"), 2);
        assert!(matches!(index.tag_id("ZIP"), Err(IndexError::TagNotFound(_))));
        assert_eq!(index.tag(2).expect("tag").key_type(), KeyType::Numeric);
        assert_eq!(index.tag(3).expect("tag").key_type(), KeyType::Date);
        assert_eq!(index.entries()[0].left, 2);
    }

    #[test]
    fn test_delete_only_tag_closes_index() {
        let mut index = new_index(&EngineConfig::default());
        index
            .create_tag(&TagDefinition::new("NAME", "NAME"), &evaluator())
            .expect("create tag");
        assert_eq!(index.delete_tag(0).expect("delete"), TagDeleted::File);
        assert!(!index.is_open());
        assert!(matches!(index.first_key(0), Err(IndexError::NotOpen)));
        assert!(index.store().bytes().is_empty());
    }

    #[test]
    fn test_delete_tag_compacts_table_and_frees_blocks() {
        let mut index = new_index(&EngineConfig::default());
        let eval = evaluator();
        for name in ["NAME", "CITY", "ZIP"] {
            index
                .create_tag(&TagDefinition::new(name, "CITY"), &eval)
                .expect("create tag");
        }
        let city = index.tag(1).expect("tag");
        let (header_page, root) = (city.header_page, city.root_page());

        assert_eq!(index.delete_tag(1).expect("delete"), TagDeleted::Tag);
        assert_eq!(index.tag_count(), 2);
        assert_eq!(index.header().tags_in_use, 2);
        assert_eq!(index.tag_id("ZIP").expect("lookup"), 1);

        let mut free = index.free_pages().expect("free list");
        free.sort_unstable();
        assert_eq!(free, vec![header_page, root]);

        let bytes = index.store().bytes();
        assert_eq!(&bytes[548 + 32..551 + 32], b"ZIP");
        assert!(bytes[544 + 64..544 + 96].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_block_size_is_rejected() {
        let config = EngineConfig::default().with_mdx_block_size(700);
        let err = MdxIndex::create_in(MemoryStore::new(1), "X", &config, clock());
        assert!(matches!(err, Err(IndexError::InvalidOption(_))));
    }
}
