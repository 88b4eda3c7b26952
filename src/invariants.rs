//! Structural checks of a tree between public calls.

use crate::buffer::Buffer;
use crate::disk::{DiskTree, NodeId};
use crate::error::{RRTreeError, Result};
use crate::geometry::{BoundingBox, SpatialData};
use crate::storage::NodeContainer;

fn corrupt(message: String) -> RRTreeError {
    RRTreeError::CorruptTree(message)
}

/// Verify the container-resident tree and the buffer.
///
/// Checked: fan-out bounds (the root only has an upper bound), child levels,
/// parent boxes covering child boxes, no empty nodes, no unreachable nodes
/// in the container, buffer size and absence of annihilating pairs.
pub(crate) fn check<E, C>(disk: &mut DiskTree<E, C>, buffer: &Buffer<E>) -> Result<()>
where
    E: SpatialData,
    C: NodeContainer<E>,
{
    if buffer.len() > buffer.max_size() {
        return Err(corrupt(format!(
            "buffer holds {} operations, capacity {}",
            buffer.len(),
            buffer.max_size()
        )));
    }
    if buffer.has_annihilating_pair() {
        return Err(corrupt("buffer holds an annihilating pair".to_string()));
    }

    let Some(root) = disk.root() else {
        if !disk.container().is_empty() {
            return Err(corrupt(format!(
                "empty tree with {} stored nodes",
                disk.container().len()
            )));
        }
        return Ok(());
    };

    let mut reachable = 0;
    let mut pending: Vec<(NodeId, usize, BoundingBox, bool)> =
        vec![(root.id, root.level, root.bbox, true)];
    while let Some((id, level, bbox, is_root)) = pending.pop() {
        let node = disk.load(id)?;
        reachable += 1;

        if node.level != level {
            return Err(corrupt(format!(
                "node {id} is on level {}, expected {level}",
                node.level
            )));
        }
        if node.is_leaf() != (level == 0) {
            return Err(corrupt(format!("node {id} has the wrong kind for level {level}")));
        }
        if node.is_empty() {
            return Err(corrupt(format!("node {id} is empty")));
        }
        if node.overflows(disk.max()) {
            return Err(corrupt(format!("node {id} overflows with {} entries", node.len())));
        }
        if !is_root && node.underflows(disk.min()) {
            return Err(corrupt(format!("node {id} underflows with {} entries", node.len())));
        }
        if let Some(actual) = node.bbox()
            && !bbox.contains(&actual)
        {
            return Err(corrupt(format!("entry box of node {id} does not cover its content")));
        }

        for child in node.children() {
            pending.push((child.id, level - 1, child.bbox, false));
        }
    }

    let stored = disk.container().len();
    if stored != reachable {
        return Err(corrupt(format!(
            "{stored} stored nodes but {reachable} reachable from the root"
        )));
    }
    Ok(())
}
