//! Key deletion with upward repair.
//!
//! Removing the only key of a node removes that node's entry from its
//! parent, repeating upward while ancestors empty. Removing the last key
//! of a leaf rewrites the separator that described the leaf's maximum in
//! the nearest ancestor that stores one. Nodes are never merged.

use std::mem;

use tracing::debug;

use super::TreeIo;
use super::navigator::position_on;
use super::node::Node;
use crate::tag::Tag;
use crate::{IndexError, ResultExt};

/// Remove the entry for `key` and `record`.
///
/// Returns `false` without touching the tree when no such entry exists.
/// The caller's position is kept and revalidated on its next move; it
/// lands on the following key when the removed entry was the current one.
pub fn delete_key<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    let saved = mem::take(&mut tag.chain);
    match remove(io, tag, key, record) {
        Ok(removed) => {
            tag.chain = saved;
            if removed {
                tag.chain.invalidate();
            }
            Ok(removed)
        }
        Err(e) => {
            tag.chain.clear();
            Err(e)
        }
    }
}

fn remove<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    if !position_on(io, tag, key, record).context("position for delete")? {
        debug!(tag = %tag.name, record, "key to delete not found");
        tag.chain.clear();
        return Ok(false);
    }
    let layout = tag.layout;
    let mut leaf = tag
        .chain
        .pop()
        .ok_or_else(|| IndexError::InvalidIndex("no leaf to delete from".to_string()))?;
    let count = leaf.key_count();
    let slot = leaf.cur;
    let removed_last = slot + 1 == count;
    let old_last = leaf.key(&layout, slot).to_vec();

    remove_entry(io, tag, &mut leaf, slot).context("remove leaf entry")?;

    if count == 1 {
        // The leaf emptied: drop its entry from the parent, and keep going
        // while parents empty too.
        while let Some(mut parent) = tag.chain.pop() {
            let keys = parent.key_count();
            if keys > 0 {
                let cur = parent.cur;
                remove_entry(io, tag, &mut parent, cur).context("remove interior entry")?;
                break;
            }
            io.harvest_node(tag, &mut parent, true)
                .context("harvest interior")?;
        }
    } else if removed_last {
        let new_last = leaf.key(&layout, slot - 1).to_vec();
        if new_last != old_last {
            while let Some(mut parent) = tag.chain.pop() {
                if parent.cur < parent.key_count() {
                    let cur = parent.cur;
                    parent.set_key(&layout, cur, &new_last);
                    io.write_node(tag, &parent).context("update separator")?;
                    break;
                }
            }
        }
    }
    tag.chain.clear();
    Ok(true)
}

/// Remove entry `slot` from `node` and write it, reclaiming a leaf that
/// empties when the file reuses blocks.
fn remove_entry<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    node: &mut Node,
    slot: usize,
) -> Result<(), IndexError> {
    let layout = tag.layout;
    let emptied_leaf = node.is_leaf(&layout) && node.key_count() == 1;
    node.remove_entry(&layout, slot);
    if emptied_leaf && io.reuse_empty_nodes() {
        io.harvest_node(tag, node, false)?;
    }
    io.write_node(tag, node)
}
