//! Key insertion with leaf and interior splits.

use tracing::debug;

use super::navigator::{seek, step_forward};
use super::node::Node;
use super::{Position, TreeIo};
use crate::tag::Tag;
use crate::{IndexError, ResultExt};

/// Insert `key` for `record`. Returns whether any node split.
///
/// Duplicates of a non-unique tag are kept in record order. The chain is
/// discarded afterwards, successful or not.
pub fn add_key<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    let result = insert(io, tag, key, record);
    tag.chain.clear();
    result
}

fn insert<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    position_for_insert(io, tag, key, record).context("position for insert")?;
    let layout = tag.layout;

    let mut leaf = tag
        .chain
        .pop()
        .ok_or_else(|| IndexError::InvalidIndex("no leaf to insert into".to_string()))?;
    let slot = leaf.cur;

    if leaf.key_count() < layout.keys_per_block {
        leaf.insert_leaf(&layout, slot, key, record);
        io.write_node(tag, &leaf).context("write leaf")?;
        return Ok(false);
    }

    let mut right = io.allocate_node(tag, leaf.page).context("allocate leaf")?;
    if leaf.page == tag.right_sibling {
        tag.right_sibling = right.page;
    }
    leaf.insert_leaf(&layout, slot, key, record);
    leaf.split_leaf_into(&layout, &mut right);
    io.write_node(tag, &leaf).context("write split leaf")?;
    io.write_node(tag, &right).context("write new leaf")?;
    debug!(
        tag = %tag.name,
        left = leaf.page,
        right = right.page,
        left_keys = leaf.key_count(),
        right_keys = right.key_count(),
        "split leaf"
    );

    let (mut left_page, mut right_page) = (leaf.page, right.page);
    while let Some(mut parent) = tag.chain.pop() {
        let slot = parent.cur;
        let separator = last_key_below(io, tag, left_page).context("read separator")?;

        if parent.key_count() < layout.keys_per_block {
            parent.insert_separator(&layout, slot, &separator, right_page);
            io.write_node(tag, &parent).context("write interior")?;
            return Ok(true);
        }

        let mut sibling = io.allocate_node(tag, parent.page).context("allocate interior")?;
        parent.insert_separator(&layout, slot, &separator, right_page);
        parent.split_interior_into(&layout, &mut sibling);
        io.write_node(tag, &parent).context("write split interior")?;
        io.write_node(tag, &sibling).context("write new interior")?;
        debug!(
            tag = %tag.name,
            left = parent.page,
            right = sibling.page,
            "split interior"
        );
        left_page = parent.page;
        right_page = sibling.page;
    }

    add_root(io, tag, left_page, right_page).context("add root")?;
    Ok(true)
}

/// Position on the slot `key` goes into. Equal keys of a non-unique tag
/// are passed over while their record number is smaller.
fn position_for_insert<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<(), IndexError> {
    if !seek(io, tag, key)? || tag.unique {
        return Ok(());
    }
    let layout = tag.layout;
    let leaf = current_leaf(tag)?;
    let mut current = leaf.record(&layout, leaf.cur);
    while record > current {
        match step_forward(io, tag)? {
            Position::At(next) => {
                let leaf = current_leaf(tag)?;
                if leaf.key(&layout, leaf.cur) != key {
                    break;
                }
                current = next;
            }
            _ => {
                // Past the last key: append to the rightmost leaf.
                let leaf = tag
                    .chain
                    .top_mut()
                    .ok_or_else(|| IndexError::InvalidIndex("node chain is empty".to_string()))?;
                leaf.cur = leaf.key_count();
                break;
            }
        }
    }
    Ok(())
}

fn current_leaf(tag: &Tag) -> Result<&Node, IndexError> {
    tag.chain
        .top()
        .ok_or_else(|| IndexError::InvalidIndex("node chain is empty".to_string()))
}

/// Largest key stored under `page`, following trailing children down.
fn last_key_below<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &Tag,
    mut page: u32,
) -> Result<Vec<u8>, IndexError> {
    let layout = tag.layout;
    loop {
        let node = io.read_node(tag, page)?;
        if node.is_leaf(&layout) {
            return node.last_key(&layout).map(<[u8]>::to_vec).ok_or_else(|| {
                IndexError::InvalidIndex(format!("leaf {page} of tag {} has no keys", tag.name))
            });
        }
        page = node.child(&layout, node.key_count());
    }
}

/// Grow the tree by one level above `left` and `right`.
fn add_root<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    left: u32,
    right: u32,
) -> Result<(), IndexError> {
    let layout = tag.layout;
    let separator = last_key_below(io, tag, left)?;
    let mut root = io.allocate_node(tag, right)?;
    root.make_root(&layout, left, &separator, right);
    io.write_node(tag, &root)?;
    io.set_root(tag, root.page)?;
    debug!(tag = %tag.name, root = root.page, left, right, "new root");
    Ok(())
}
