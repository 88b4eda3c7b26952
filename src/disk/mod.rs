//! The container-resident R-tree that buffered operations are merged into.
//!
//! [`DiskTree`] owns the node container and the root reference. It offers
//! the node-level building blocks of a group update (loading, storing split
//! pieces under reused identifiers, growing a new root) while the update
//! algorithm itself lives in [`RRTree`](crate::RRTree).

mod node;
mod representation;
mod split;

pub use node::{ChildEntry, Node, NodeEntries, NodeId, choose_subtree};
pub use representation::{DiskRepresentation, LeafEffect};
pub use split::{GroupSplitter, RecursiveTwoWaySplitter};

use crate::error::{RRTreeError, Result};
use crate::geometry::{BoundingBox, SpatialData};
use crate::storage::NodeContainer;

/// Location and shape of the tree root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootEntry {
    pub id: NodeId,
    pub level: usize,
    pub bbox: BoundingBox,
}

pub struct DiskTree<E: SpatialData, C: NodeContainer<E>> {
    container: C,
    root: Option<RootEntry>,
    min: usize,
    max: usize,
    representation: DiskRepresentation,
    splitter: Box<dyn GroupSplitter<E>>,
}

impl<E: SpatialData, C: NodeContainer<E>> DiskTree<E, C> {
    pub fn new(container: C, min: usize, max: usize, representation: DiskRepresentation) -> Self {
        Self {
            container,
            root: None,
            min,
            max,
            representation,
            splitter: Box::new(RecursiveTwoWaySplitter::new(min, max)),
        }
    }

    pub fn root(&self) -> Option<RootEntry> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<RootEntry>) {
        self.root = root;
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        self.root.map_or(0, |root| root.level + 1)
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn representation(&self) -> DiskRepresentation {
        self.representation
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut C {
        &mut self.container
    }

    pub fn load(&mut self, id: NodeId) -> Result<Node<E>> {
        self.container.get(id)
    }

    pub fn free(&mut self, id: NodeId) -> Result<()> {
        self.container.remove(id)
    }

    fn check_fits(&self, node: &Node<E>) -> Result<()> {
        if node.overflows(self.max) {
            return Err(RRTreeError::NodeOverflow {
                entries: node.len(),
                max: self.max,
            });
        }
        Ok(())
    }

    /// Write `node` under `id` and return the parent entry for it.
    pub fn write(&mut self, id: NodeId, node: Node<E>) -> Result<ChildEntry> {
        self.check_fits(&node)?;
        let bbox = node_bbox(&node);
        self.container.update(id, node)?;
        Ok(ChildEntry::new(id, bbox))
    }

    /// Store `node`, taking over `reuse` when given.
    pub fn store_piece(&mut self, node: Node<E>, reuse: Option<NodeId>) -> Result<ChildEntry> {
        match reuse {
            Some(id) => self.write(id, node),
            None => {
                self.check_fits(&node)?;
                let bbox = node_bbox(&node);
                let id = self.container.put(node)?;
                Ok(ChildEntry::new(id, bbox))
            }
        }
    }

    /// Store split pieces. The first piece takes over `original`; without
    /// pieces the original node is freed.
    pub fn store_nodes(
        &mut self,
        pieces: Vec<Node<E>>,
        original: Option<NodeId>,
    ) -> Result<Vec<ChildEntry>> {
        let mut reuse = original;
        let mut entries = Vec::with_capacity(pieces.len());
        for piece in pieces {
            entries.push(self.store_piece(piece, reuse.take())?);
        }
        if let Some(id) = reuse {
            self.free(id)?;
        }
        Ok(entries)
    }

    pub fn split(&self, node: Node<E>) -> Vec<Node<E>> {
        self.splitter.group_split(node)
    }

    /// Install the result of updating the root: no piece empties the tree,
    /// one piece becomes the root, several pieces get a new root above them
    /// (repeated while that root overflows).
    pub fn grow_tree(&mut self, pieces: Vec<Node<E>>, original: Option<NodeId>) -> Result<()> {
        let mut pieces: Vec<Node<E>> = pieces.into_iter().filter(|p| !p.is_empty()).collect();
        let mut original = original;
        loop {
            match pieces.len() {
                0 => {
                    if let Some(id) = original {
                        self.free(id)?;
                    }
                    self.root = None;
                    return Ok(());
                }
                1 => {
                    let Some(node) = pieces.pop() else {
                        unreachable!("one piece present");
                    };
                    let level = node.level;
                    let entry = self.store_piece(node, original)?;
                    self.root = Some(RootEntry {
                        id: entry.id,
                        level,
                        bbox: entry.bbox,
                    });
                    return Ok(());
                }
                _ => {
                    let level = pieces[0].level + 1;
                    let entries = self.store_nodes(pieces, original.take())?;
                    pieces = self.split(Node::new_index(level, entries));
                }
            }
        }
    }

    /// Drop every node and reset the root.
    pub fn clear(&mut self) -> Result<()> {
        self.container.clear()?;
        self.root = None;
        Ok(())
    }
}

fn node_bbox<E: SpatialData>(node: &Node<E>) -> BoundingBox {
    node.bbox().unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0))
}
