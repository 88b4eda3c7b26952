//! Container-resident tree nodes.

use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::Operation;
use serde::{Deserialize, Serialize};

/// Identifier of a node inside a [`NodeContainer`](crate::storage::NodeContainer).
pub type NodeId = u64;

/// Reference from an index node to one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub id: NodeId,
    pub bbox: BoundingBox,
}

impl ChildEntry {
    pub fn new(id: NodeId, bbox: BoundingBox) -> Self {
        Self { id, bbox }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeEntries<E> {
    Leaf(Vec<Operation<E>>),
    Index(Vec<ChildEntry>),
}

/// A tree node. Leaves are level 0 and hold operations directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node<E> {
    pub level: usize,
    pub entries: NodeEntries<E>,
}

impl<E: SpatialData> Node<E> {
    pub fn new_leaf(entries: Vec<Operation<E>>) -> Self {
        Self {
            level: 0,
            entries: NodeEntries::Leaf(entries),
        }
    }

    /// # Panics
    ///
    /// Panics if `level` is 0.
    pub fn new_index(level: usize, children: Vec<ChildEntry>) -> Self {
        assert!(level > 0, "index nodes live above the leaf level");
        Self {
            level,
            entries: NodeEntries::Index(children),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.entries, NodeEntries::Leaf(_))
    }

    pub fn len(&self) -> usize {
        match &self.entries {
            NodeEntries::Leaf(ops) => ops.len(),
            NodeEntries::Index(children) => children.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overflows(&self, max: usize) -> bool {
        self.len() > max
    }

    pub fn underflows(&self, min: usize) -> bool {
        self.len() < min
    }

    /// Leaf operations; empty for an index node.
    pub fn operations(&self) -> &[Operation<E>] {
        match &self.entries {
            NodeEntries::Leaf(ops) => ops,
            NodeEntries::Index(_) => &[],
        }
    }

    pub fn operations_mut(&mut self) -> Option<&mut Vec<Operation<E>>> {
        match &mut self.entries {
            NodeEntries::Leaf(ops) => Some(ops),
            NodeEntries::Index(_) => None,
        }
    }

    /// Child references; empty for a leaf.
    pub fn children(&self) -> &[ChildEntry] {
        match &self.entries {
            NodeEntries::Leaf(_) => &[],
            NodeEntries::Index(children) => children,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ChildEntry>> {
        match &mut self.entries {
            NodeEntries::Leaf(_) => None,
            NodeEntries::Index(children) => Some(children),
        }
    }

    pub fn entry_bboxes(&self) -> Vec<BoundingBox> {
        match &self.entries {
            NodeEntries::Leaf(ops) => ops.iter().map(Operation::bbox).collect(),
            NodeEntries::Index(children) => children.iter().map(|c| c.bbox).collect(),
        }
    }

    /// Covering box of all entries, `None` for an empty node.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.entry_bboxes())
    }

    pub fn child_position(&self, id: NodeId) -> Option<usize> {
        self.children().iter().position(|child| child.id == id)
    }

    /// Remove and return the child at `position`.
    pub fn detach_child(&mut self, position: usize) -> Option<ChildEntry> {
        let children = self.children_mut()?;
        (position < children.len()).then(|| children.swap_remove(position))
    }

    pub fn attach_children<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = ChildEntry>,
    {
        if let Some(children) = self.children_mut() {
            children.extend(entries);
        }
    }

    /// Move every entry of `other` into this node. Leaf operations are not
    /// annihilated against each other.
    ///
    /// # Panics
    ///
    /// Panics if the nodes are of different kinds.
    pub fn append(&mut self, other: Node<E>) {
        match (&mut self.entries, other.entries) {
            (NodeEntries::Leaf(ops), NodeEntries::Leaf(incoming)) => {
                ops.extend(incoming);
            }
            (NodeEntries::Index(children), NodeEntries::Index(incoming)) => {
                children.extend(incoming);
            }
            _ => panic!("cannot merge a leaf with an index node"),
        }
    }

    /// Drop all entries, keeping the kind and level.
    pub fn cleared(&self) -> Self {
        let entries = match &self.entries {
            NodeEntries::Leaf(_) => NodeEntries::Leaf(Vec::new()),
            NodeEntries::Index(_) => NodeEntries::Index(Vec::new()),
        };
        Self {
            level: self.level,
            entries,
        }
    }
}

/// Pick the child that should receive an entry with box `bbox`.
///
/// Among children containing the box the one with the smallest area wins.
/// Otherwise the child needing the least area enlargement wins, ties going to
/// the smaller area.
///
/// # Panics
///
/// Panics on an empty child list.
pub fn choose_subtree(children: &[ChildEntry], bbox: &BoundingBox) -> usize {
    assert!(!children.is_empty(), "choose_subtree on a childless node");

    let containing = children
        .iter()
        .enumerate()
        .filter(|(_, child)| child.bbox.contains(bbox))
        .min_by(|(_, a), (_, b)| a.bbox.area().total_cmp(&b.bbox.area()));
    if let Some((position, _)) = containing {
        return position;
    }

    children
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.bbox
                .enlargement(bbox)
                .total_cmp(&b.bbox.enlargement(bbox))
                .then_with(|| a.bbox.area().total_cmp(&b.bbox.area()))
        })
        .map(|(position, _)| position)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpatialItem;
    use geo::Point;

    fn point_op(id: u64, x: f64, y: f64) -> Operation<SpatialItem> {
        Operation::insertion(SpatialItem::from_point(id, Point::new(x, y)))
    }

    #[test]
    fn test_choose_subtree_prefers_smallest_container() {
        let children = vec![
            ChildEntry::new(1, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            ChildEntry::new(2, BoundingBox::new(0.0, 0.0, 2.0, 2.0)),
            ChildEntry::new(3, BoundingBox::new(20.0, 20.0, 30.0, 30.0)),
        ];

        assert_eq!(choose_subtree(&children, &BoundingBox::new(1.0, 1.0, 1.0, 1.0)), 1);
        assert_eq!(choose_subtree(&children, &BoundingBox::new(5.0, 5.0, 5.0, 5.0)), 0);
        // outside all: least enlargement
        assert_eq!(choose_subtree(&children, &BoundingBox::new(31.0, 31.0, 31.0, 31.0)), 2);
    }

    #[test]
    fn test_choose_subtree_ties_by_area() {
        let children = vec![
            ChildEntry::new(1, BoundingBox::new(3.0, 0.0, 5.0, 1.0)),
            ChildEntry::new(2, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
        ];
        // both grow by one unit of area
        let target = BoundingBox::new(2.0, 0.5, 2.0, 0.5);
        let chosen = choose_subtree(&children, &target);
        assert_eq!(children[chosen].id, 2);
    }

    #[test]
    fn test_leaf_bookkeeping() {
        let mut leaf = Node::new_leaf(vec![point_op(1, 0.0, 0.0), point_op(2, 3.0, 4.0)]);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.bbox(), Some(BoundingBox::new(0.0, 0.0, 3.0, 4.0)));
        assert!(leaf.children().is_empty());

        leaf.append(Node::new_leaf(vec![point_op(2, 3.0, 4.0), point_op(3, 1.0, 1.0)]));
        assert_eq!(leaf.len(), 4);
        assert!(leaf.overflows(2));
        assert!(leaf.cleared().is_empty());
    }

    #[test]
    fn test_detach_and_attach_children() {
        let mut node: Node<SpatialItem> = Node::new_index(
            1,
            vec![
                ChildEntry::new(4, BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
                ChildEntry::new(5, BoundingBox::new(2.0, 2.0, 3.0, 3.0)),
            ],
        );

        let position = node.child_position(4).expect("child present");
        let detached = node.detach_child(position).expect("detached");
        assert_eq!(detached.id, 4);
        assert_eq!(node.len(), 1);
        assert!(node.detach_child(7).is_none());

        node.attach_children([detached]);
        assert_eq!(node.bbox(), Some(BoundingBox::new(0.0, 0.0, 3.0, 3.0)));
    }
}
