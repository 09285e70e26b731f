// Layers, bottom up:
//  - storage: byte ranges of one index file (disk or memory)
//  - key: typed keys and their stored byte forms
//  - tree: B-tree navigation, insertion and deletion over a TreeIo
//  - ndx / mdx: the single-tag and multi-tag file formats
//  - index: record-level maintenance, reindex and integrity checks
//
// The record store and the expression evaluator are collaborators the
// caller supplies; see record.rs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
mod error;
pub mod index;
pub mod key;
pub mod mdx;
pub mod ndx;
pub mod record;
pub mod simulation;
pub mod storage;
pub mod tag;
pub mod testing;
pub mod tree;

#[cfg(test)]
mod tests;

pub use config::{DuplicateKeyMode, EngineConfig};
pub use error::{IndexError, ResultExt};
pub use index::{Index, IntegrityReport};
pub use mdx::{MdxIndex, TagDeleted};
pub use ndx::NdxIndex;
pub use tag::TagDefinition;
pub use tree::{FindOutcome, Position};
