//! Format-independent B-tree algorithms.
//!
//! Navigation, insertion with splits and deletion with upward repair are
//! written once against [`TreeIo`]; the single-tag and multi-tag formats
//! supply node I/O, block allocation and header bookkeeping.

mod chain;
mod delete;
mod insert;
mod navigator;
pub mod node;

pub use chain::Chain;
pub(crate) use delete::delete_key;
pub(crate) use insert::add_key;
pub(crate) use navigator::{
    current_key, current_record, find, first, last, locate, next, prev, reachable_pages,
};

use crate::IndexError;
use crate::record::RecordSource;
use crate::tag::Tag;
use node::Node;

/// Result of looking up a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindOutcome {
    /// The key exists; the tag is positioned on it.
    Found(u32),
    /// The key does not exist; the tag is positioned on the next greater
    /// key, whose record is returned.
    NotFound(u32),
    /// The key is greater than every key in the tag.
    Eof,
    /// The tag holds no keys.
    Empty,
}

impl FindOutcome {
    /// Record of an exact match.
    #[must_use]
    pub const fn found(self) -> Option<u32> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }

    /// Load the record the lookup landed on into the record store.
    pub fn retrieve(self, records: &mut dyn RecordSource) -> Result<Self, IndexError> {
        if let Self::Found(record) | Self::NotFound(record) = self {
            records.get_record(record)?;
        }
        Ok(self)
    }
}

/// Result of a positional move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Positioned on a key of this record.
    At(u32),
    /// Moved past the last key; position unchanged.
    Eof,
    /// Moved before the first key; position unchanged.
    Bof,
    /// The tag holds no keys.
    Empty,
}

impl Position {
    #[must_use]
    pub const fn record(self) -> Option<u32> {
        match self {
            Self::At(record) => Some(record),
            _ => None,
        }
    }

    /// Load the positioned record into the record store.
    pub fn retrieve(self, records: &mut dyn RecordSource) -> Result<Self, IndexError> {
        if let Self::At(record) = self {
            records.get_record(record)?;
        }
        Ok(self)
    }
}

/// Node storage and per-format bookkeeping used by the tree algorithms.
pub(crate) trait TreeIo {
    /// Read the node starting at `page`.
    fn read_node(&mut self, tag: &Tag, page: u32) -> Result<Node, IndexError>;

    /// Write a node back to its page.
    fn write_node(&mut self, tag: &Tag, node: &Node) -> Result<(), IndexError>;

    /// Hand out a zeroed node. `provenance` is the page whose split
    /// requested it.
    fn allocate_node(&mut self, tag: &mut Tag, provenance: u32) -> Result<Node, IndexError>;

    /// Return an emptied node to the free list, writing it when `write`
    /// is set. Formats without a free list leave the node alone.
    fn harvest_node(&mut self, tag: &mut Tag, node: &mut Node, write: bool)
    -> Result<(), IndexError>;

    /// Record a new root page.
    fn set_root(&mut self, tag: &mut Tag, page: u32) -> Result<(), IndexError>;

    /// Reload tag fields another writer may have changed.
    fn refresh_tag(&mut self, tag: &mut Tag) -> Result<(), IndexError>;

    /// Current modification stamp of the file.
    fn stamp(&mut self) -> Result<u64, IndexError>;

    /// Whether emptied leaves are reclaimed as soon as they empty.
    fn reuse_empty_nodes(&self) -> bool;
}
