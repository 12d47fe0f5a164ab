use std::collections::BTreeMap;

use crate::free_list::NodeId;

/// Ordered map from free-block size to the set of free-list node ids of
/// that size. Supports "smallest entry with size >= k" in O(log n), the
/// abstract contract the big-object allocator's best-fit search depends on.
///
/// A red-black tree gives the same contract with an "any node >= k" search;
/// `BTreeMap::range` gives the stronger minimum-key guarantee for free,
/// which is true best-fit rather than merely first-fit-among-candidates.
#[derive(Default)]
pub struct OrderedSizeIndex {
    by_size: BTreeMap<usize, Vec<NodeId>>,
}

impl OrderedSizeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, size: usize, node: NodeId) {
        self.by_size.entry(size).or_default().push(node);
    }

    /// Removes one occurrence of `node` under `size`. Panics if `size` has
    /// no entries or `node` is not among them, since that indicates the
    /// index and free list have desynchronised.
    pub fn remove(&mut self, size: usize, node: NodeId) {
        let entries = self.by_size.get_mut(&size).expect("size index missing entry for live free block");
        let pos = entries.iter().position(|&n| n == node).expect("node not registered under this size");
        entries.swap_remove(pos);
        if entries.is_empty() {
            self.by_size.remove(&size);
        }
    }

    /// Returns the smallest free block with size >= `size`, if any.
    pub fn search_at_least(&self, size: usize) -> Option<(usize, NodeId)> {
        self.by_size.range(size..).next().map(|(&s, nodes)| (s, nodes[0]))
    }

    pub fn len(&self) -> usize {
        self.by_size.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_size.is_empty()
    }

    /// Whether `node` is registered under `size`. Used by structural
    /// audits to confirm the index mirrors the free list exactly.
    pub fn contains(&self, size: usize, node: NodeId) -> bool {
        self.by_size.get(&size).is_some_and(|nodes| nodes.contains(&node))
    }
}
