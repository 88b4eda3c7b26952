//! Buffered operations and unordered groups of them.

use crate::geometry::{BoundingBox, SpatialData};
use rstar::{AABB, RTreeObject};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Whether an operation adds or removes its data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Insertion,
    Deletion,
}

impl OperationKind {
    pub fn opposite(self) -> Self {
        match self {
            OperationKind::Insertion => OperationKind::Deletion,
            OperationKind::Deletion => OperationKind::Insertion,
        }
    }
}

/// A data item tagged with the kind of update to perform on it.
///
/// Equality and hashing cover both the data and the kind. An insertion and a
/// deletion of equal data form an annihilating pair, see [`Operation::opposite`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation<E> {
    pub data: E,
    pub kind: OperationKind,
}

impl<E> Operation<E> {
    pub fn new(data: E, kind: OperationKind) -> Self {
        Self { data, kind }
    }

    pub fn insertion(data: E) -> Self {
        Self::new(data, OperationKind::Insertion)
    }

    pub fn deletion(data: E) -> Self {
        Self::new(data, OperationKind::Deletion)
    }

    pub fn is_insertion(&self) -> bool {
        self.kind == OperationKind::Insertion
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == OperationKind::Deletion
    }
}

impl<E: Clone> Operation<E> {
    /// The operation that annihilates this one.
    pub fn opposite(&self) -> Self {
        Self::new(self.data.clone(), self.kind.opposite())
    }
}

impl<E: SpatialData> Operation<E> {
    pub fn bbox(&self) -> BoundingBox {
        self.data.bbox()
    }
}

impl<E: SpatialData> RTreeObject for Operation<E> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.data.bbox().to_aabb()
    }
}

/// An unordered set of operations without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationGroup<E: SpatialData> {
    ops: FxHashSet<Operation<E>>,
}

impl<E: SpatialData> Default for OperationGroup<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SpatialData> OperationGroup<E> {
    pub fn new() -> Self {
        Self {
            ops: FxHashSet::default(),
        }
    }

    /// Add an operation; returns false if it was already present.
    pub fn insert(&mut self, op: Operation<E>) -> bool {
        self.ops.insert(op)
    }

    pub fn remove(&mut self, op: &Operation<E>) -> bool {
        self.ops.remove(op)
    }

    pub fn contains(&self, op: &Operation<E>) -> bool {
        self.ops.contains(op)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation<E>> {
        self.ops.iter()
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Operation<E>) -> bool,
    {
        self.ops.retain(keep);
    }

    pub fn insertion_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_insertion()).count()
    }

    pub fn deletion_count(&self) -> usize {
        self.len() - self.insertion_count()
    }

    pub fn is_insertion_only(&self) -> bool {
        self.ops.iter().all(Operation::is_insertion)
    }

    /// Size measure used by push-down thresholds: insertions only, or all operations.
    pub fn size_in_significant_ops(&self, by_insertions: bool) -> usize {
        if by_insertions {
            self.insertion_count()
        } else {
            self.len()
        }
    }

    /// Bounding box of all operations, `None` for an empty group.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.ops.iter().map(Operation::bbox))
    }

    pub fn into_vec(self) -> Vec<Operation<E>> {
        self.ops.into_iter().collect()
    }
}

impl<E: SpatialData> FromIterator<Operation<E>> for OperationGroup<E> {
    fn from_iter<I: IntoIterator<Item = Operation<E>>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl<E: SpatialData> Extend<Operation<E>> for OperationGroup<E> {
    fn extend<I: IntoIterator<Item = Operation<E>>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

impl<E: SpatialData> IntoIterator for OperationGroup<E> {
    type Item = Operation<E>;
    type IntoIter = std::collections::hash_set::IntoIter<Operation<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
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
    fn test_opposite_pairs() {
        let ins = Operation::insertion(item(1, 0.0, 0.0));
        let del = ins.opposite();

        assert!(del.is_deletion());
        assert_ne!(ins, del);
        assert_eq!(del.opposite(), ins);
    }

    #[test]
    fn test_group_counts() {
        let group: OperationGroup<SpatialItem> = vec![
            Operation::insertion(item(1, 0.0, 0.0)),
            Operation::insertion(item(2, 4.0, 2.0)),
            Operation::deletion(item(3, 1.0, 1.0)),
            Operation::insertion(item(1, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();

        assert_eq!(group.len(), 3);
        assert_eq!(group.insertion_count(), 2);
        assert_eq!(group.deletion_count(), 1);
        assert!(!group.is_insertion_only());
        assert_eq!(group.size_in_significant_ops(true), 2);
        assert_eq!(group.size_in_significant_ops(false), 3);
        assert_eq!(group.bbox(), Some(BoundingBox::new(0.0, 0.0, 4.0, 2.0)));
    }

    #[test]
    fn test_empty_group() {
        let group = OperationGroup::<SpatialItem>::new();
        assert!(group.is_insertion_only());
        assert_eq!(group.bbox(), None);
    }
}
