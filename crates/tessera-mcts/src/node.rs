use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::stats::AtomicF32;

// ---------------------------------------------------------------------------
// NodeIndex — typed arena index
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeIndex(u32);

impl NodeIndex {
    /// The root always lives in slot 0.
    pub const ROOT: NodeIndex = NodeIndex(0);

    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize);
        Self(index as u32)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Sentinel in the node's move slot: the root carries no incoming move.
const MOVE_NONE: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One (position, incoming move) pair in the shared search tree.
///
/// All fields are atomics so the arena can be mutated through shared
/// references from every worker:
///
/// * `children` packs (first child index, child count) into one word. It is
///   the publication point for expansion: child slots are fully written
///   before the pair is stored with release ordering, and readers load it
///   with acquire, so a non-zero child count guarantees initialized
///   children. Publication is a compare-exchange from the empty state —
///   if two workers race to expand the same leaf, the first one wins and
///   the loser's slots stay unreachable (one more flavor of lost update).
/// * The statistics pairs follow the dirty lock-free contract (see
///   `stats::DirtyStatistics`): relaxed loads/stores, lost increments and
///   torn count/mean pairs are tolerated.
pub struct Node {
    mv: AtomicU32,
    count: AtomicF32,
    value: AtomicF32,
    rave_count: AtomicF32,
    rave_value: AtomicF32,
    children: AtomicU64,
}

/// Pack (first, nu_children) into the publication word.
fn pack_children(first: NodeIndex, nu_children: u32) -> u64 {
    ((first.0 as u64) << 32) | nu_children as u64
}

fn unpack_children(word: u64) -> (NodeIndex, u32) {
    (NodeIndex((word >> 32) as u32), word as u32)
}

impl Node {
    pub(crate) fn empty() -> Self {
        Self {
            mv: AtomicU32::new(MOVE_NONE),
            count: AtomicF32::new(0.0),
            value: AtomicF32::new(0.0),
            rave_count: AtomicF32::new(0.0),
            rave_value: AtomicF32::new(0.0),
            children: AtomicU64::new(0),
        }
    }

    /// Initialize a freshly allocated slot. The slot is exclusively owned by
    /// the allocating thread until its parent publishes the child range.
    pub(crate) fn init(&self, mv: u32, init_count: f32, init_value: f32) {
        self.mv.store(mv, Ordering::Relaxed);
        self.count.store(init_count);
        self.value.store(init_value);
        self.rave_count.store(init_count);
        self.rave_value.store(init_value);
        self.children.store(0, Ordering::Relaxed);
    }

    pub(crate) fn init_root(&self, value: f32) {
        self.init(MOVE_NONE, 0.0, value);
    }

    /// Raw move id; `MOVE_NONE` at the root.
    pub(crate) fn move_index(&self) -> u32 {
        self.mv.load(Ordering::Relaxed)
    }

    pub(crate) fn has_move(&self) -> bool {
        self.move_index() != MOVE_NONE
    }

    /// Visit count. Monotone during a search; approximate under contention.
    pub fn count(&self) -> f32 {
        self.count.load()
    }

    /// Mean of the evaluations backed up through this node, from the
    /// perspective of the player to move at its parent. Meaningful prior to
    /// the first visit as well: expansion seeds it with the init value.
    pub fn value(&self) -> f32 {
        self.value.load()
    }

    pub fn rave_count(&self) -> f32 {
        self.rave_count.load()
    }

    pub fn rave_value(&self) -> f32 {
        self.rave_value.load()
    }

    /// Published child range, or `None` while the node is an unexpanded leaf.
    pub fn children(&self) -> Option<(NodeIndex, u32)> {
        let word = self.children.load(Ordering::Acquire);
        if word == 0 {
            None
        } else {
            Some(unpack_children(word))
        }
    }

    pub fn has_children(&self) -> bool {
        self.children.load(Ordering::Acquire) != 0
    }

    /// Publish a fully initialized child range. Returns `false` if another
    /// thread linked children first; the linkage is then immutable for the
    /// lifetime of the tree instance.
    pub(crate) fn link_children(&self, first: NodeIndex, nu_children: u32) -> bool {
        debug_assert!(nu_children > 0);
        self.children
            .compare_exchange(
                0,
                pack_children(first, nu_children),
                Ordering::Release,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    pub(crate) fn add_value(&self, x: f32) {
        let count = self.count.load() + 1.0;
        let mean = self.value.load();
        self.value.store(mean + (x - mean) / count);
        self.count.store(count);
    }

    pub(crate) fn add_rave_value(&self, x: f32, weight: f32) {
        let count = self.rave_count.load() + weight;
        let mean = self.rave_value.load();
        self.rave_value.store(mean + weight * (x - mean) / count);
        self.rave_count.store(count);
    }

    /// Copy another node's payload into this slot. Only used by the
    /// single-threaded subtree copy, with no concurrent readers of `self`.
    pub(crate) fn copy_payload_from(&self, other: &Node) {
        self.mv.store(other.move_index(), Ordering::Relaxed);
        self.count.store(other.count());
        self.value.store(other.value());
        self.rave_count.store(other.rave_count());
        self.rave_value.store(other.rave_value());
        self.children.store(0, Ordering::Relaxed);
    }

    /// Relink during a single-threaded subtree copy (no concurrent readers,
    /// may overwrite an earlier linkage of the same copy pass).
    pub(crate) fn set_children(&self, first: NodeIndex, nu_children: u32) {
        let word = if nu_children == 0 {
            0
        } else {
            pack_children(first, nu_children)
        };
        self.children.store(word, Ordering::Relaxed);
    }

    /// Drop the incoming move. Used on the new root after a subtree copy.
    pub(crate) fn clear_move(&self) {
        self.mv.store(MOVE_NONE, Ordering::Relaxed);
    }

    /// Reset the value statistics, keeping move and children. Used on the
    /// root of a reused subtree, whose stored value is a move value from the
    /// previous search while the root value of a search is a position value.
    pub(crate) fn clear_value(&self, value: f32) {
        self.count.store(0.0);
        self.value.store(value);
        self.rave_count.store(0.0);
        self.rave_value.store(value);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- statistics ----

    #[test]
    fn add_value_running_mean() {
        let node = Node::empty();
        node.init(3, 0.0, 0.0);
        node.add_value(1.0);
        node.add_value(0.0);
        node.add_value(0.5);
        assert_eq!(node.count(), 3.0);
        assert!((node.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn init_count_acts_as_prior() {
        let node = Node::empty();
        // Two pseudo-visits at 0.8.
        node.init(0, 2.0, 0.8);
        node.add_value(0.2);
        // Mean of [0.8, 0.8, 0.2]
        assert_eq!(node.count(), 3.0);
        assert!((node.value() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn counts_are_monotone() {
        let node = Node::empty();
        node.init(0, 0.0, 0.5);
        let mut last = node.count();
        for i in 0..50 {
            node.add_value((i % 2) as f32);
            assert!(node.count() >= last);
            last = node.count();
        }
    }

    #[test]
    fn weighted_rave_update() {
        let node = Node::empty();
        node.init(0, 0.0, 0.0);
        node.add_rave_value(1.0, 2.0);
        node.add_rave_value(0.0, 1.0);
        assert_eq!(node.rave_count(), 3.0);
        // Weighted mean of [1 (w=2), 0 (w=1)] = 2/3
        assert!((node.rave_value() - 2.0 / 3.0).abs() < 1e-6);
    }

    // ---- child linkage ----

    #[test]
    fn link_children_publishes_range() {
        let node = Node::empty();
        node.init_root(0.5);
        assert!(node.children().is_none());
        assert!(node.link_children(NodeIndex::new(1), 3));
        assert_eq!(node.children(), Some((NodeIndex::new(1), 3)));
    }

    #[test]
    fn link_children_first_writer_wins() {
        let node = Node::empty();
        node.init_root(0.5);
        assert!(node.link_children(NodeIndex::new(1), 2));
        assert!(!node.link_children(NodeIndex::new(5), 4));
        assert_eq!(node.children(), Some((NodeIndex::new(1), 2)));
    }

    #[test]
    fn clear_value_keeps_children() {
        let node = Node::empty();
        node.init(7, 5.0, 0.9);
        node.link_children(NodeIndex::new(2), 2);
        node.clear_value(0.5);
        assert_eq!(node.count(), 0.0);
        assert!((node.value() - 0.5).abs() < 1e-6);
        assert_eq!(node.children(), Some((NodeIndex::new(2), 2)));
        assert_eq!(node.move_index(), 7);
    }
}
