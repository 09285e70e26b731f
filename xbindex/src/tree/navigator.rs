//! Positioning within a tag: find, first, last, next, previous.
//!
//! Every move leaves the tag's [`Chain`](super::Chain) describing the path
//! from the root to the current leaf entry. A chain built before the file
//! last changed is not trusted: lookups restart from the root and
//! sequential moves first re-find the entry they were on.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::debug;

use super::node::{Layout, Node};
use super::{FindOutcome, Position, TreeIo};
use crate::IndexError;
use crate::key::{KeyType, compare_directed};
use crate::tag::Tag;

/// Deeper than any tree a 512-byte block can produce.
const MAX_DEPTH: usize = 64;

fn broken_chain() -> IndexError {
    IndexError::InvalidIndex("node chain is empty".to_string())
}

/// Order of a stored key relative to the search key. Character searches
/// shorter than the key compare on the prefix only.
fn compare_stored(layout: &Layout, stored: &[u8], search: &[u8]) -> Ordering {
    let stored = if layout.key_type == KeyType::Char && search.len() < stored.len() {
        &stored[..search.len()]
    } else {
        stored
    };
    compare_directed(layout.key_type, layout.descending, stored, search)
}

/// First slot whose key is not before `search`, and whether it matches.
fn lower_bound(layout: &Layout, node: &Node, search: &[u8]) -> (usize, bool) {
    let (mut lo, mut hi) = (0, node.key_count());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if compare_stored(layout, node.key(layout, mid), search) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    let exact = lo < node.key_count()
        && compare_stored(layout, node.key(layout, lo), search) == Ordering::Equal;
    (lo, exact)
}

fn push_child<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag, page: u32) -> Result<(), IndexError> {
    if tag.chain.len() >= MAX_DEPTH {
        return Err(IndexError::InvalidIndex(format!(
            "tag {} is deeper than {MAX_DEPTH} levels",
            tag.name
        )));
    }
    let node = io.read_node(tag, page)?;
    tag.chain.push(node);
    Ok(())
}

/// Drop the chain and start again at the root.
fn load_root<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<(), IndexError> {
    tag.chain.clear();
    io.refresh_tag(tag)?;
    let stamp = io.stamp()?;
    push_child(io, tag, tag.root)?;
    tag.chain.set_stamp(stamp);
    Ok(())
}

fn descend_leftmost<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<(), IndexError> {
    let layout = tag.layout;
    loop {
        let node = tag.chain.top_mut().ok_or_else(broken_chain)?;
        node.cur = 0;
        if node.is_leaf(&layout) {
            return Ok(());
        }
        let child = node.child(&layout, 0);
        push_child(io, tag, child)?;
    }
}

fn descend_rightmost<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<(), IndexError> {
    let layout = tag.layout;
    loop {
        let node = tag.chain.top_mut().ok_or_else(broken_chain)?;
        let count = node.key_count();
        if node.is_leaf(&layout) {
            node.cur = count.saturating_sub(1);
            return Ok(());
        }
        node.cur = count;
        let child = node.child(&layout, count);
        push_child(io, tag, child)?;
    }
}

/// Every node on the path is keyless, which only an empty tree allows.
fn holds_no_keys(tag: &Tag) -> bool {
    (0..tag.chain.len()).all(|d| tag.chain.get(d).is_some_and(|n| n.key_count() == 0))
}

/// Key and record of the current leaf entry.
fn current_entry(tag: &Tag) -> Option<(Vec<u8>, u32)> {
    let layout = &tag.layout;
    let leaf = tag.chain.top()?;
    (leaf.is_leaf(layout) && leaf.cur < leaf.key_count())
        .then(|| (leaf.key(layout, leaf.cur).to_vec(), leaf.record(layout, leaf.cur)))
}

/// Record number of the current key.
#[must_use]
pub fn current_record(tag: &Tag) -> Option<u32> {
    current_entry(tag).map(|(_, record)| record)
}

/// Stored bytes of the current key.
#[must_use]
pub fn current_key(tag: &Tag) -> Option<&[u8]> {
    let layout = &tag.layout;
    let leaf = tag.chain.top()?;
    (leaf.is_leaf(layout) && leaf.cur < leaf.key_count()).then(|| leaf.key(layout, leaf.cur))
}

/// Descend to the leaf slot where `search` is or would be.
///
/// A still-valid chain is reused: levels are dropped only while the key
/// falls outside the top node's range. Returns whether the leaf slot
/// holds an equal key.
pub(super) fn seek<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    search: &[u8],
) -> Result<bool, IndexError> {
    let layout = tag.layout;
    if !tag.chain.is_empty() && tag.chain.is_stale(io.stamp()?) {
        debug!(tag = %tag.name, "node chain out of date");
        tag.chain.clear();
    }

    while tag.chain.len() > 1 {
        let top = tag.chain.top().ok_or_else(broken_chain)?;
        let count = top.key_count();
        let outside = count == 0
            || compare_stored(&layout, top.key(&layout, 0), search) != Ordering::Less
            || compare_stored(&layout, top.key(&layout, count - 1), search) == Ordering::Less;
        if !outside {
            break;
        }
        tag.chain.pop();
    }
    if tag.chain.is_empty() {
        load_root(io, tag)?;
    }

    loop {
        let node = tag.chain.top_mut().ok_or_else(broken_chain)?;
        let (slot, exact) = lower_bound(&layout, node, search);
        node.cur = slot;
        if node.is_leaf(&layout) {
            return Ok(exact);
        }
        let child = node.child(&layout, slot);
        push_child(io, tag, child)?;
    }
}

/// Position on the entry holding exactly `key` and `record`, scanning
/// forward through duplicates of a non-unique tag.
///
/// When the entry is missing the chain is left on the entry that would
/// follow it, or past the last key.
pub(super) fn position_on<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    if !seek(io, tag, key)? {
        return Ok(false);
    }
    loop {
        let Some((stored, stored_record)) = current_entry(tag) else {
            return Ok(false);
        };
        if stored != key || stored_record > record {
            return Ok(false);
        }
        if stored_record == record {
            return Ok(true);
        }
        if tag.unique {
            return Ok(false);
        }
        if !matches!(step_forward(io, tag)?, Position::At(_)) {
            let leaf = tag.chain.top_mut().ok_or_else(broken_chain)?;
            leaf.cur = leaf.key_count();
            return Ok(false);
        }
    }
}

/// Position on the entry for `key` and `record`; `false` when absent.
pub fn locate<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    key: &[u8],
    record: u32,
) -> Result<bool, IndexError> {
    let found = position_on(io, tag, key, record)?;
    if !found {
        debug!(tag = %tag.name, record, "entry not located");
    }
    Ok(found)
}

/// Re-find the entry a stale chain was on. A chain past the last key
/// moves to the new end.
fn reposition<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<bool, IndexError> {
    let Some((key, record)) = current_entry(tag) else {
        if tag.chain.is_empty() {
            return Ok(false);
        }
        last(io, tag)?;
        let leaf = tag.chain.top_mut().ok_or_else(broken_chain)?;
        leaf.cur = leaf.key_count();
        return Ok(false);
    };
    debug!(tag = %tag.name, record, "repositioning after file change");
    tag.chain.clear();
    position_on(io, tag, &key, record)
}

pub(super) fn step_forward<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
) -> Result<Position, IndexError> {
    let layout = tag.layout;
    loop {
        let leaf = tag.chain.top_mut().ok_or_else(broken_chain)?;
        if leaf.cur + 1 < leaf.key_count() {
            leaf.cur += 1;
            return Ok(Position::At(leaf.record(&layout, leaf.cur)));
        }

        let depth = (0..tag.chain.len().saturating_sub(1)).rev().find(|&d| {
            tag.chain
                .get(d)
                .is_some_and(|n| n.cur < n.key_count())
        });
        let Some(depth) = depth else {
            return Ok(Position::Eof);
        };
        tag.chain.truncate(depth + 1);
        let parent = tag.chain.get_mut(depth).ok_or_else(broken_chain)?;
        parent.cur += 1;
        let child = parent.child(&layout, parent.cur);
        push_child(io, tag, child)?;
        descend_leftmost(io, tag)?;

        let leaf = tag.chain.top().ok_or_else(broken_chain)?;
        if leaf.key_count() > 0 {
            return Ok(Position::At(leaf.record(&layout, 0)));
        }
    }
}

fn step_back<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<Position, IndexError> {
    let layout = tag.layout;
    loop {
        let leaf = tag.chain.top_mut().ok_or_else(broken_chain)?;
        let cur = leaf.cur.min(leaf.key_count());
        if cur > 0 {
            leaf.cur = cur - 1;
            return Ok(Position::At(leaf.record(&layout, leaf.cur)));
        }

        let depth = (0..tag.chain.len().saturating_sub(1))
            .rev()
            .find(|&d| tag.chain.get(d).is_some_and(|n| n.cur > 0));
        let Some(depth) = depth else {
            return Ok(Position::Bof);
        };
        tag.chain.truncate(depth + 1);
        let parent = tag.chain.get_mut(depth).ok_or_else(broken_chain)?;
        parent.cur -= 1;
        let child = parent.child(&layout, parent.cur);
        push_child(io, tag, child)?;
        descend_rightmost(io, tag)?;

        let leaf = tag.chain.top().ok_or_else(broken_chain)?;
        if leaf.key_count() > 0 {
            return Ok(Position::At(leaf.record(&layout, leaf.cur)));
        }
    }
}

/// Look up `search`.
pub fn find<I: TreeIo + ?Sized>(
    io: &mut I,
    tag: &mut Tag,
    search: &[u8],
) -> Result<FindOutcome, IndexError> {
    let layout = tag.layout;
    let exact = seek(io, tag, search)?;
    if holds_no_keys(tag) {
        return Ok(FindOutcome::Empty);
    }
    let leaf = tag.chain.top().ok_or_else(broken_chain)?;
    let count = leaf.key_count();

    if exact {
        return Ok(FindOutcome::Found(leaf.record(&layout, leaf.cur)));
    }
    if leaf.cur < count {
        return Ok(FindOutcome::NotFound(leaf.record(&layout, leaf.cur)));
    }
    match step_forward(io, tag)? {
        Position::At(record) => Ok(FindOutcome::NotFound(record)),
        _ => Ok(FindOutcome::Eof),
    }
}

/// Position on the first key.
pub fn first<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<Position, IndexError> {
    load_root(io, tag)?;
    descend_leftmost(io, tag)?;
    let layout = tag.layout;
    let leaf = tag.chain.top().ok_or_else(broken_chain)?;
    if leaf.key_count() > 0 {
        return Ok(Position::At(leaf.record(&layout, 0)));
    }
    match step_forward(io, tag)? {
        Position::At(record) => Ok(Position::At(record)),
        _ => Ok(Position::Empty),
    }
}

/// Position on the last key.
pub fn last<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<Position, IndexError> {
    load_root(io, tag)?;
    descend_rightmost(io, tag)?;
    let layout = tag.layout;
    let leaf = tag.chain.top().ok_or_else(broken_chain)?;
    if leaf.key_count() > 0 {
        return Ok(Position::At(leaf.record(&layout, leaf.cur)));
    }
    match step_back(io, tag)? {
        Position::At(record) => Ok(Position::At(record)),
        _ => Ok(Position::Empty),
    }
}

/// Move to the next key. Without a position this is [`first`].
pub fn next<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<Position, IndexError> {
    if !tag.chain.is_empty() && tag.chain.is_stale(io.stamp()?) && !reposition(io, tag)? {
        // The entry we were on is gone; the chain now sits on its successor.
        if let Some(record) = current_record(tag) {
            return Ok(Position::At(record));
        }
    }
    if tag.chain.is_empty() {
        return first(io, tag);
    }
    match step_forward(io, tag)? {
        Position::Eof if holds_no_keys(tag) => Ok(Position::Empty),
        position => Ok(position),
    }
}

/// Move to the previous key. Without a position this is [`last`].
pub fn prev<I: TreeIo + ?Sized>(io: &mut I, tag: &mut Tag) -> Result<Position, IndexError> {
    if !tag.chain.is_empty() && tag.chain.is_stale(io.stamp()?) {
        reposition(io, tag)?;
    }
    if tag.chain.is_empty() {
        return last(io, tag);
    }
    match step_back(io, tag)? {
        Position::Bof if holds_no_keys(tag) => Ok(Position::Empty),
        position => Ok(position),
    }
}

/// Every page reachable from the tag's root, ascending.
///
/// Fails when a page is reachable along two paths, which only a damaged
/// tree can produce.
pub fn reachable_pages<I: TreeIo + ?Sized>(io: &mut I, tag: &Tag) -> Result<Vec<u32>, IndexError> {
    let layout = tag.layout;
    let mut seen = BTreeSet::new();
    let mut pending = vec![(tag.root, 0usize)];
    while let Some((page, depth)) = pending.pop() {
        if !seen.insert(page) {
            return Err(IndexError::InvalidIndex(format!(
                "page {page} of tag {} is reachable twice",
                tag.name
            )));
        }
        if depth >= MAX_DEPTH {
            return Err(IndexError::InvalidIndex(format!(
                "tag {} is deeper than {MAX_DEPTH} levels",
                tag.name
            )));
        }
        let node = io.read_node(tag, page)?;
        if !node.is_leaf(&layout) {
            for i in 0..=node.key_count() {
                pending.push((node.child(&layout, i), depth + 1));
            }
        }
    }
    Ok(seen.into_iter().collect())
}
