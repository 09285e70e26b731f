//! Root-to-leaf path of the current position.

use super::node::Node;

/// The nodes from the root down to the current leaf.
///
/// The chain is only trusted while the file's modification stamp matches
/// the one captured when it was built; [`Chain::invalidate`] forces the
/// next navigation to reposition from the root.
#[derive(Debug, Default)]
pub struct Chain {
    nodes: Vec<Node>,
    stamp: u64,
    stale: bool,
}

impl Chain {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.stale = false;
    }

    /// Keep the nodes but distrust them until repositioned.
    pub const fn invalidate(&mut self) {
        self.stale = true;
    }

    pub(crate) const fn is_stale(&self, stamp: u64) -> bool {
        self.stale || stamp > self.stamp
    }

    pub(crate) const fn set_stamp(&mut self, stamp: u64) {
        self.stamp = stamp;
        self.stale = false;
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub(crate) fn pop(&mut self) -> Option<Node> {
        self.nodes.pop()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    #[must_use]
    pub fn top(&self) -> Option<&Node> {
        self.nodes.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Node> {
        self.nodes.last_mut()
    }

    pub(crate) fn get(&self, depth: usize) -> Option<&Node> {
        self.nodes.get(depth)
    }

    pub(crate) fn get_mut(&mut self, depth: usize) -> Option<&mut Node> {
        self.nodes.get_mut(depth)
    }
}
