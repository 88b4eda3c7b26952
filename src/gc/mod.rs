//! Garbage collection of tombstone trees.
//!
//! Deleted data lingers in tombstone leaves as insertion/deletion pairs
//! spread over different leaves. Two passes remove it: [`rebuild`] reloads
//! the live data into a fresh, densely packed tree, [`vacuum`] annihilates
//! pairs in place.

mod rebuild;
mod vacuum;

pub(crate) use rebuild::rebuild;
pub(crate) use vacuum::vacuum;

use crate::disk::{ChildEntry, DiskTree, NodeId};
use crate::error::Result;
use crate::geometry::SpatialData;
use crate::storage::{IndexNodeCache, NodeContainer};

/// Outcome of a garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub old_leaf_nodes: usize,
    pub old_index_nodes: usize,
    pub new_leaf_nodes: usize,
    pub new_index_nodes: usize,
    /// Container reads spent on the discarded tree
    pub clearing_gets: u64,
    /// Container removals spent on the discarded tree
    pub clearing_removes: u64,
    pub annihilated_pairs: usize,
    /// Deletions without a matching insertion anywhere in the tree
    pub dropped_tombstones: usize,
    /// Extra copies of data stored more than once
    pub collapsed_duplicates: usize,
    pub vacuumed_leaves: usize,
    /// Buffered operations applied while vacuuming
    pub piggybacked_ops: usize,
    pub peak_leaves_resident: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Shape of a tree as seen by one depth-first walk.
struct TreeWalk {
    /// Leaf entries in visit order
    leaves: Vec<ChildEntry>,
    /// Index nodes in visit order, each with its child identifiers
    index_nodes: Vec<(NodeId, Vec<NodeId>)>,
}

/// Walk the tree through `cache`, which keeps index nodes resident.
fn walk<E, C>(disk: &mut DiskTree<E, C>, cache: &mut IndexNodeCache<E>) -> Result<TreeWalk>
where
    E: SpatialData,
    C: NodeContainer<E>,
{
    let mut walk = TreeWalk {
        leaves: Vec::new(),
        index_nodes: Vec::new(),
    };
    let Some(root) = disk.root() else {
        return Ok(walk);
    };
    if root.level == 0 {
        walk.leaves.push(ChildEntry::new(root.id, root.bbox));
        return Ok(walk);
    }

    let mut pending = vec![root.id];
    while let Some(id) = pending.pop() {
        let node = cache.get_or_load(id, disk.container_mut())?;
        let children = node.children();
        walk.index_nodes
            .push((id, children.iter().map(|child| child.id).collect()));
        if node.level == 1 {
            walk.leaves.extend_from_slice(children);
        } else {
            pending.extend(children.iter().rev().map(|child| child.id));
        }
    }
    Ok(walk)
}
