//! Node buffers and the per-format entry layout.
//!
//! Both formats store a `u32` key count at byte 0 followed by fixed-size
//! entries. Single-tag (NDX) entries are `child | record | key` starting at
//! byte 4; multi-tag (MDX) entries are `pointer | key` starting at byte 8,
//! where the pointer is a record number in leaves and a child page in
//! interior nodes. Interior nodes carry one more child pointer than keys;
//! it sits where entry `count` would start.
//!
//! All edits happen on the in-memory buffer. Callers write the node back
//! through [`crate::tree::TreeIo`].

#![allow(clippy::cast_possible_truncation)]

use crate::IndexError;
use crate::key::KeyType;
use crate::storage::endian;

/// Index file format of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ndx,
    Mdx,
}

/// Entry geometry shared by every node of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub format: Format,
    pub key_type: KeyType,
    pub key_len: usize,
    pub item_len: usize,
    pub keys_per_block: usize,
    pub block_size: usize,
    pub descending: bool,
}

impl Layout {
    #[must_use]
    pub const fn entry_base(&self) -> usize {
        match self.format {
            Format::Ndx => 4,
            Format::Mdx => 8,
        }
    }

    const fn record_offset(&self) -> usize {
        match self.format {
            Format::Ndx => 4,
            Format::Mdx => 0,
        }
    }

    const fn key_offset(&self) -> usize {
        match self.format {
            Format::Ndx => 8,
            Format::Mdx => 4,
        }
    }

    /// Byte offset of entry `i`.
    #[must_use]
    pub const fn entry(&self, i: usize) -> usize {
        self.entry_base() + i * self.item_len
    }

    /// Keys kept on the left of an interior split, out of `n + 1` after the
    /// pending insert. The key at this index moves up and is dropped.
    const fn interior_split_point(&self, n: usize) -> usize {
        match self.format {
            Format::Ndx => (n + 1) / 2 + 1,
            Format::Mdx => (n + 1) / 2,
        }
    }

    /// Buffer length able to hold one entry more than a full node plus
    /// the trailing child pointer.
    const fn overflow_len(&self) -> usize {
        self.entry(self.keys_per_block + 1) + 4
    }
}

/// One node read from disk, plus the traversal cursor inside it.
///
/// `cur` is the entry the chain descended through (interior) or the
/// current key (leaf). For interior nodes `cur == count` means the
/// trailing child.
#[derive(Debug, Clone)]
pub struct Node {
    pub page: u32,
    pub data: Vec<u8>,
    pub cur: usize,
}

impl Node {
    /// A zeroed node buffer for `page`.
    pub fn empty(page: u32, block_size: usize) -> Result<Self, IndexError> {
        let mut data = Vec::new();
        data.try_reserve_exact(block_size)
            .map_err(|_| IndexError::NoMemory)?;
        data.resize(block_size, 0);
        Ok(Self { page, data, cur: 0 })
    }

    /// Reject a stored key count the block cannot hold.
    pub fn check_key_count(&self, layout: &Layout) -> Result<(), IndexError> {
        let count = self.key_count();
        if count > layout.keys_per_block {
            return Err(IndexError::InvalidIndex(format!(
                "block {} holds {count} keys, at most {} fit",
                self.page, layout.keys_per_block
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        endian::get_u32(&self.data, 0) as usize
    }

    pub fn set_key_count(&mut self, count: usize) {
        endian::put_u32(&mut self.data, 0, count as u32);
    }

    /// Free-chain link (harvested blocks) or split provenance (live
    /// blocks). Multi-tag nodes only.
    #[must_use]
    pub fn link(&self) -> u32 {
        endian::get_u32(&self.data, 4)
    }

    pub fn set_link(&mut self, page: u32) {
        endian::put_u32(&mut self.data, 4, page);
    }

    #[must_use]
    pub fn is_leaf(&self, layout: &Layout) -> bool {
        match layout.format {
            Format::Ndx => self.child(layout, 0) == 0,
            Format::Mdx => self.child(layout, self.key_count()) == 0,
        }
    }

    #[must_use]
    pub fn key(&self, layout: &Layout, i: usize) -> &[u8] {
        let at = layout.entry(i) + layout.key_offset();
        &self.data[at..at + layout.key_len]
    }

    pub fn set_key(&mut self, layout: &Layout, i: usize, key: &[u8]) {
        let at = layout.entry(i) + layout.key_offset();
        let n = key.len().min(layout.key_len);
        self.data[at..at + n].copy_from_slice(&key[..n]);
        self.data[at + n..at + layout.key_len].fill(0);
    }

    /// Child page of entry `i`; `i == count` is the trailing child.
    #[must_use]
    pub fn child(&self, layout: &Layout, i: usize) -> u32 {
        endian::get_u32(&self.data, layout.entry(i))
    }

    pub fn set_child(&mut self, layout: &Layout, i: usize, page: u32) {
        endian::put_u32(&mut self.data, layout.entry(i), page);
    }

    #[must_use]
    pub fn record(&self, layout: &Layout, i: usize) -> u32 {
        endian::get_u32(&self.data, layout.entry(i) + layout.record_offset())
    }

    fn set_record(&mut self, layout: &Layout, i: usize, record: u32) {
        endian::put_u32(&mut self.data, layout.entry(i) + layout.record_offset(), record);
    }

    /// Last key of the node, `None` when it holds no keys.
    #[must_use]
    pub fn last_key(&self, layout: &Layout) -> Option<&[u8]> {
        self.key_count()
            .checked_sub(1)
            .map(|i| self.key(layout, i))
    }

    fn grow(&mut self, layout: &Layout) {
        let len = layout.overflow_len().max(layout.block_size);
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
    }

    /// Shift `start..end` by one entry toward the end of the buffer.
    fn open_gap(&mut self, layout: &Layout, start: usize, end: usize) {
        if start < end {
            self.data.copy_within(start..end, start + layout.item_len);
        }
    }

    /// Insert a leaf entry at `slot`. The node may overflow its block; a
    /// split must follow before it is written.
    pub fn insert_leaf(&mut self, layout: &Layout, slot: usize, key: &[u8], record: u32) {
        self.grow(layout);
        let count = self.key_count();
        self.open_gap(layout, layout.entry(slot), layout.entry(count));
        self.data[layout.entry(slot)..layout.entry(slot + 1)].fill(0);
        self.set_key(layout, slot, key);
        self.set_record(layout, slot, record);
        self.set_key_count(count + 1);
    }

    /// Record that child `slot` split into itself and `right`.
    ///
    /// `separator` is the last key of the left half. Afterwards the keys
    /// read `.., separator, old key[slot], ..` and the children
    /// `.., child[slot], right, old child[slot + 1], ..`.
    pub fn insert_separator(
        &mut self,
        layout: &Layout,
        slot: usize,
        separator: &[u8],
        right: u32,
    ) {
        self.grow(layout);
        let count = self.key_count();
        self.open_gap(layout, layout.entry(slot), layout.entry(count) + 4);
        self.set_key(layout, slot, separator);
        self.set_child(layout, slot + 1, right);
        self.set_key_count(count + 1);
    }

    /// Remove entry `slot`. In an interior node the entries after it,
    /// including the trailing child, shift down one position.
    pub fn remove_entry(&mut self, layout: &Layout, slot: usize) {
        let count = self.key_count();
        let leaf = self.is_leaf(layout);
        let end = if leaf {
            layout.entry(count)
        } else {
            layout.entry(count) + 4
        };
        let start = layout.entry(slot + 1);
        if start < end {
            self.data.copy_within(start..end, layout.entry(slot));
        }
        if count > 0 {
            let clear_from = if leaf {
                layout.entry(count - 1)
            } else {
                layout.entry(count - 1) + 4
            };
            let clear_to = (clear_from + layout.item_len).min(self.data.len());
            self.data[clear_from..clear_to].fill(0);
            self.set_key_count(count - 1);
        }
    }

    /// Move the upper part of an overfull leaf into the empty `right` node.
    ///
    /// `self` holds `n + 1` entries after the insert that overflowed it;
    /// `(n + 1) / 2 + 1` stay on the left.
    pub fn split_leaf_into(&mut self, layout: &Layout, right: &mut Self) {
        right.grow(layout);
        let total = self.key_count();
        let n = total - 1;
        let keep = (n + 1) / 2 + 1;
        let moved = total - keep;

        let from = layout.entry(keep);
        let to = layout.entry(total);
        let dest = layout.entry(0);
        right.data[dest..dest + (to - from)].copy_from_slice(&self.data[from..to]);
        right.set_key_count(moved);

        self.data[from..].fill(0);
        self.set_key_count(keep);
        self.data.truncate(layout.block_size);
        right.data.truncate(layout.block_size);
    }

    /// Move the upper part of an overfull interior node into `right`.
    ///
    /// The key at the split point is dropped: its left neighbour's subtree
    /// ends the left node through the kept trailing child.
    pub fn split_interior_into(&mut self, layout: &Layout, right: &mut Self) {
        right.grow(layout);
        let total = self.key_count();
        let n = total - 1;
        let keep = layout.interior_split_point(n);
        let moved = n - keep;

        let from = layout.entry(keep + 1);
        let to = layout.entry(total) + 4;
        let dest = layout.entry(0);
        right.data[dest..dest + (to - from)].copy_from_slice(&self.data[from..to]);
        right.set_key_count(moved);

        self.data[layout.entry(keep) + 4..].fill(0);
        self.set_key_count(keep);
        self.data.truncate(layout.block_size);
        right.data.truncate(layout.block_size);
    }

    /// Turn the node into a single-key root over `left` and `right`.
    pub fn make_root(&mut self, layout: &Layout, left: u32, separator: &[u8], right: u32) {
        self.grow(layout);
        self.set_key_count(1);
        self.set_child(layout, 0, left);
        self.set_key(layout, 0, separator);
        self.set_child(layout, 1, right);
        self.data.truncate(layout.block_size);
    }

    /// Zero everything but the page number.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.cur = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(format: Format, keys_per_block: usize) -> Layout {
        let item_len = match format {
            Format::Ndx => 12,
            Format::Mdx => 8,
        };
        let block_size = match format {
            Format::Ndx => 512,
            Format::Mdx => 1024,
        };
        Layout {
            format,
            key_type: KeyType::Char,
            key_len: 4,
            item_len,
            keys_per_block,
            block_size,
            descending: false,
        }
    }

    fn leaf_with(layout: &Layout, keys: &[&[u8]]) -> Node {
        let mut node = Node::empty(1, layout.block_size).expect("node");
        for (i, key) in keys.iter().enumerate() {
            node.insert_leaf(layout, i, key, i as u32 + 1);
        }
        node
    }

    fn keys(node: &Node, layout: &Layout) -> Vec<Vec<u8>> {
        (0..node.key_count()).map(|i| node.key(layout, i).to_vec()).collect()
    }

    #[test]
    fn test_insert_leaf_keeps_order_of_slots() {
        let layout = layout(Format::Mdx, 4);
        let mut node = leaf_with(&layout, &[b"aaaa", b"cccc"]);
        node.insert_leaf(&layout, 1, b"bbbb", 9);

        assert_eq!(node.key_count(), 3);
        assert_eq!(
            keys(&node, &layout),
            vec![b"aaaa".to_vec(), b"bbbb".to_vec(), b"cccc".to_vec()]
        );
        assert_eq!(node.record(&layout, 1), 9);
        assert_eq!(node.record(&layout, 2), 2);
        assert!(node.is_leaf(&layout));
    }

    #[test]
    fn test_ndx_leaf_detection_uses_first_child() {
        let layout = layout(Format::Ndx, 4);
        let mut node = leaf_with(&layout, &[b"aaaa"]);
        assert!(node.is_leaf(&layout));
        node.set_child(&layout, 0, 7);
        assert!(!node.is_leaf(&layout));
    }

    #[test]
    fn test_insert_separator_places_right_child_after_slot() {
        for format in [Format::Ndx, Format::Mdx] {
            let layout = layout(format, 4);
            let mut node = Node::empty(3, layout.block_size).expect("node");
            node.make_root(&layout, 10, b"mmmm", 20);

            // child 10 split into 10 and 30, left half now ends at "ffff"
            node.insert_separator(&layout, 0, b"ffff", 30);

            assert_eq!(node.key_count(), 2);
            assert_eq!(keys(&node, &layout), vec![b"ffff".to_vec(), b"mmmm".to_vec()]);
            assert_eq!(node.child(&layout, 0), 10);
            assert_eq!(node.child(&layout, 1), 30);
            assert_eq!(node.child(&layout, 2), 20);
            assert!(!node.is_leaf(&layout));
        }
    }

    #[test]
    fn test_remove_entry_from_interior_shifts_trailing_child() {
        let layout = layout(Format::Mdx, 4);
        let mut node = Node::empty(3, layout.block_size).expect("node");
        node.make_root(&layout, 10, b"ffff", 20);
        node.insert_separator(&layout, 1, b"mmmm", 30);

        node.remove_entry(&layout, 1);

        assert_eq!(node.key_count(), 1);
        assert_eq!(node.key(&layout, 0), b"ffff");
        assert_eq!(node.child(&layout, 0), 10);
        assert_eq!(node.child(&layout, 1), 30);
    }

    #[test]
    fn test_remove_last_leaf_entry_keeps_leaf_marker() {
        let layout = layout(Format::Mdx, 4);
        let mut node = leaf_with(&layout, &[b"aaaa", b"bbbb"]);
        node.remove_entry(&layout, 1);
        node.remove_entry(&layout, 0);
        assert_eq!(node.key_count(), 0);
        assert!(node.is_leaf(&layout));
    }

    #[test]
    fn test_split_leaf_moves_upper_half() {
        let layout = layout(Format::Mdx, 4);
        let mut left = leaf_with(&layout, &[b"aaaa", b"bbbb", b"cccc", b"dddd"]);
        left.insert_leaf(&layout, 4, b"eeee", 5);
        let mut right = Node::empty(2, layout.block_size).expect("node");

        left.split_leaf_into(&layout, &mut right);

        assert_eq!(left.key_count(), 3);
        assert_eq!(right.key_count(), 2);
        assert_eq!(right.key(&layout, 0), b"dddd");
        assert_eq!(right.record(&layout, 1), 5);
        assert_eq!(left.data.len(), layout.block_size);
        assert!(left.is_leaf(&layout));
        assert!(right.is_leaf(&layout));
    }

    #[test]
    fn test_split_interior_drops_middle_key() {
        for (format, kept) in [(Format::Ndx, 3), (Format::Mdx, 2)] {
            let layout = layout(format, 4);
            let mut node = Node::empty(3, layout.block_size).expect("node");
            node.make_root(&layout, 10, b"aaaa", 11);
            node.insert_separator(&layout, 1, b"bbbb", 12);
            node.insert_separator(&layout, 2, b"cccc", 13);
            node.insert_separator(&layout, 3, b"dddd", 14);
            node.insert_separator(&layout, 4, b"eeee", 15);
            let mut right = Node::empty(4, layout.block_size).expect("node");

            node.split_interior_into(&layout, &mut right);

            assert_eq!(node.key_count(), kept);
            assert_eq!(node.child(&layout, kept), 10 + kept as u32);
            assert_eq!(right.key_count(), 4 - kept);
            assert_eq!(right.child(&layout, 0), 11 + kept as u32);
            assert_eq!(right.child(&layout, right.key_count()), 15);
            assert!(!right.is_leaf(&layout));
        }
    }

    #[test]
    fn test_unallocatable_buffer_is_no_memory() {
        assert!(matches!(Node::empty(1, usize::MAX), Err(IndexError::NoMemory)));
    }

    #[test]
    fn test_key_count_beyond_block_is_rejected() {
        let layout = layout(Format::Ndx, 4);
        let mut node = leaf_with(&layout, &[b"aaaa", b"bbbb"]);
        assert!(node.check_key_count(&layout).is_ok());
        node.set_key_count(0xFFFF);
        assert!(matches!(
            node.check_key_count(&layout),
            Err(IndexError::InvalidIndex(_))
        ));
    }
}
