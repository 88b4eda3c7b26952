//! The in-memory staging index of pending operations.
//!
//! The buffer is a small `rstar` R-tree of [`Operation`]s. Annihilation is
//! applied eagerly: an insertion and a deletion of equal data are never
//! stored together.

use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::{Operation, OperationGroup, OperationKind};
use rstar::RTree;

pub struct Buffer<E: SpatialData> {
    tree: RTree<Operation<E>>,
    max_size: usize,
    insertion_deletion_annihilations: u64,
    deletion_insertion_annihilations: u64,
}

impl<E: SpatialData> Buffer<E> {
    pub fn new(max_size: usize) -> Self {
        Self {
            tree: RTree::new(),
            max_size,
            insertion_deletion_annihilations: 0,
            deletion_insertion_annihilations: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.tree.size() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Buffer an insertion of `data`.
    ///
    /// A buffered deletion of equal data is annihilated instead. Returns true
    /// when that happened.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full; callers must empty it first.
    pub fn insert(&mut self, data: E) -> bool {
        assert!(!self.is_full(), "insert into a full buffer");
        let deletion = Operation::deletion(data);
        if self.tree.remove(&deletion).is_some() {
            self.insertion_deletion_annihilations += 1;
            return true;
        }
        let insertion = Operation::insertion(deletion.data);
        if !self.tree.contains(&insertion) {
            self.tree.insert(insertion);
        }
        false
    }

    /// Buffer a deletion of `data`.
    ///
    /// Returns the data when it annihilated a buffered insertion, `None` when
    /// a deletion was buffered.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full.
    pub fn remove(&mut self, data: E) -> Option<E> {
        assert!(!self.is_full(), "remove from a full buffer");
        let insertion = Operation::insertion(data);
        if let Some(annihilated) = self.tree.remove(&insertion) {
            self.deletion_insertion_annihilations += 1;
            return Some(annihilated.data);
        }
        let deletion = Operation::deletion(insertion.data);
        if !self.tree.contains(&deletion) {
            self.tree.insert(deletion);
        }
        None
    }

    /// Live data of buffered insertions intersecting `bbox`.
    pub fn query(&self, bbox: &BoundingBox) -> Vec<E> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.to_aabb())
            .filter(|op| op.is_insertion())
            .map(|op| op.data.clone())
            .collect()
    }

    /// Buffered operations of both kinds intersecting `bbox`.
    pub fn query_any_type(&self, bbox: &BoundingBox) -> Vec<Operation<E>> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.to_aabb())
            .cloned()
            .collect()
    }

    /// Buffered insertions whose data lies inside `bbox`.
    pub fn copy_query_insertions(&self, bbox: &BoundingBox) -> Vec<Operation<E>> {
        self.tree
            .locate_in_envelope(&bbox.to_aabb())
            .filter(|op| op.is_insertion())
            .cloned()
            .collect()
    }

    /// Buffered operations of both kinds whose data lies inside `bbox`.
    pub fn copy_query_all_ops(&self, bbox: &BoundingBox) -> Vec<Operation<E>> {
        self.tree.locate_in_envelope(&bbox.to_aabb()).cloned().collect()
    }

    /// Everything currently buffered.
    pub fn flatten(&self) -> OperationGroup<E> {
        self.tree.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation<E>> {
        self.tree.iter()
    }

    pub fn contains(&self, op: &Operation<E>) -> bool {
        self.tree.contains(op)
    }

    /// Store an operation without annihilation checks.
    ///
    /// The operation must not be buffered already, nor its opposite.
    pub fn insert_entry(&mut self, op: Operation<E>) {
        debug_assert!(!self.tree.contains(&op), "duplicate buffered operation");
        debug_assert!(
            !self.tree.contains(&op.opposite()),
            "annihilating pair in buffer"
        );
        self.tree.insert(op);
    }

    pub fn add_entry_if_not_exists(&mut self, op: Operation<E>) -> bool {
        if self.tree.contains(&op) {
            return false;
        }
        self.insert_entry(op);
        true
    }

    /// Remove exactly `op`, comparing data and kind.
    pub fn remove_exact_entry(&mut self, op: &Operation<E>) -> bool {
        self.tree.remove(op).is_some()
    }

    pub fn remove_group(&mut self, group: &OperationGroup<E>) {
        for op in group.iter() {
            self.tree.remove(op);
        }
    }

    /// Drop every buffered deletion and return the deleted data.
    pub fn remove_all_deletions(&mut self) -> Vec<E> {
        let deletions: Vec<Operation<E>> = self
            .tree
            .iter()
            .filter(|op| op.kind == OperationKind::Deletion)
            .cloned()
            .collect();
        deletions
            .into_iter()
            .filter_map(|op| self.tree.remove(&op))
            .map(|op| op.data)
            .collect()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    /// Bounding box of all buffered operations, `None` when empty.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.tree.iter().map(Operation::bbox))
    }

    /// Number of insertions that cancelled a buffered deletion.
    pub fn insertion_deletion_annihilations(&self) -> u64 {
        self.insertion_deletion_annihilations
    }

    /// Number of deletions that cancelled a buffered insertion.
    pub fn deletion_insertion_annihilations(&self) -> u64 {
        self.deletion_insertion_annihilations
    }

    /// True when some data is buffered with both kinds.
    pub fn has_annihilating_pair(&self) -> bool {
        self.tree
            .iter()
            .filter(|op| op.is_insertion())
            .any(|op| self.tree.contains(&op.opposite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpatialItem;
    use geo::Point;

    fn item(id: u64, x: f64, y: f64) -> SpatialItem {
        SpatialItem::from_point(id, Point::new(x, y))
    }

    #[test]
    fn test_insert_then_remove_annihilates() {
        let mut buffer = Buffer::new(4);
        assert!(!buffer.insert(item(1, 1.0, 1.0)));
        assert_eq!(buffer.len(), 1);

        assert_eq!(buffer.remove(item(1, 1.0, 1.0)), Some(item(1, 1.0, 1.0)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.deletion_insertion_annihilations(), 1);
        assert_eq!(buffer.insertion_deletion_annihilations(), 0);
    }

    #[test]
    fn test_remove_then_insert_annihilates() {
        let mut buffer = Buffer::new(4);
        assert_eq!(buffer.remove(item(1, 1.0, 1.0)), None);
        assert_eq!(buffer.len(), 1);

        assert!(buffer.insert(item(1, 1.0, 1.0)));
        assert!(buffer.is_empty());
        assert_eq!(buffer.insertion_deletion_annihilations(), 1);
    }

    #[test]
    fn test_rebuffering_is_noop() {
        let mut buffer = Buffer::new(4);
        buffer.insert(item(1, 1.0, 1.0));
        buffer.insert(item(1, 1.0, 1.0));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    #[should_panic(expected = "full buffer")]
    fn test_insert_into_full_buffer_panics() {
        let mut buffer = Buffer::new(2);
        buffer.insert(item(1, 1.0, 1.0));
        buffer.insert(item(2, 2.0, 2.0));
        buffer.insert(item(3, 3.0, 3.0));
    }

    #[test]
    fn test_queries_by_kind() {
        let mut buffer = Buffer::new(10);
        buffer.insert(item(1, 1.0, 1.0));
        buffer.insert(item(2, 5.0, 5.0));
        buffer.remove(item(3, 1.5, 1.5));

        let window = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(buffer.query(&window), vec![item(1, 1.0, 1.0)]);
        assert_eq!(buffer.query_any_type(&window).len(), 2);
        assert_eq!(buffer.copy_query_insertions(&window).len(), 1);
        assert_eq!(buffer.copy_query_all_ops(&window).len(), 2);
        assert_eq!(buffer.bbox(), Some(BoundingBox::new(1.0, 1.0, 5.0, 5.0)));
    }

    #[test]
    fn test_group_removal_and_deletion_purge() {
        let mut buffer = Buffer::new(10);
        buffer.insert(item(1, 1.0, 1.0));
        buffer.remove(item(2, 2.0, 2.0));
        buffer.remove(item(3, 3.0, 3.0));

        let group: OperationGroup<SpatialItem> =
            std::iter::once(Operation::insertion(item(1, 1.0, 1.0))).collect();
        buffer.remove_group(&group);
        assert_eq!(buffer.len(), 2);

        let mut purged = buffer.remove_all_deletions();
        purged.sort_by_key(|item| item.id);
        assert_eq!(purged, vec![item(2, 2.0, 2.0), item(3, 3.0, 3.0)]);
        assert!(buffer.is_empty());
        assert!(!buffer.has_annihilating_pair());
    }

    #[test]
    fn test_exact_entry_handling() {
        let mut buffer = Buffer::new(10);
        let op = Operation::deletion(item(4, 0.0, 0.0));

        assert!(buffer.add_entry_if_not_exists(op.clone()));
        assert!(!buffer.add_entry_if_not_exists(op.clone()));
        assert!(!buffer.remove_exact_entry(&op.opposite()));
        assert!(buffer.remove_exact_entry(&op));
        assert!(buffer.is_empty());
    }
}
