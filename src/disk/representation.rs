//! How leaves represent deletions.

use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::Operation;
use serde::{Deserialize, Serialize};

/// Leaf storage policy of the container-resident tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskRepresentation {
    /// Leaves hold insertions and deletion tombstones. A deletion that
    /// reaches its insertion annihilates it, otherwise it is stored.
    #[default]
    Tombstones,
    /// Leaves hold live data only. A deletion completes only at the leaf
    /// that physically contains its data.
    Physical,
}

/// What executing an operation does to a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafEffect {
    /// A new entry is stored
    Grow,
    /// The operation annihilates a stored entry
    Shrink,
    /// The data is already stored (physical leaves only)
    Unchanged,
    /// The operation cannot complete at this leaf
    Blocked,
}

impl DiskRepresentation {
    /// Deletions are routed, piggybacked and stored like insertions.
    pub fn deletions_like_insertions(self) -> bool {
        matches!(self, DiskRepresentation::Tombstones)
    }

    pub fn effect<E: SpatialData>(self, entries: &[Operation<E>], op: &Operation<E>) -> LeafEffect {
        let opposite = op.opposite();
        if entries.contains(&opposite) {
            return LeafEffect::Shrink;
        }
        match self {
            DiskRepresentation::Tombstones => LeafEffect::Grow,
            DiskRepresentation::Physical if op.is_deletion() => LeafEffect::Blocked,
            DiskRepresentation::Physical if entries.contains(op) => LeafEffect::Unchanged,
            DiskRepresentation::Physical => LeafEffect::Grow,
        }
    }

    /// Apply `op` to the leaf entries. Returns whether the operation completed.
    pub fn execute<E: SpatialData>(self, entries: &mut Vec<Operation<E>>, op: &Operation<E>) -> bool {
        match self.effect(entries, op) {
            LeafEffect::Shrink => {
                let opposite = op.opposite();
                if let Some(position) = entries.iter().position(|entry| *entry == opposite) {
                    entries.swap_remove(position);
                }
                true
            }
            LeafEffect::Grow => {
                entries.push(op.clone());
                true
            }
            LeafEffect::Unchanged => true,
            LeafEffect::Blocked => false,
        }
    }

    /// Whether `op` may be piggybacked onto a leaf covering `area`.
    pub fn fits<E: SpatialData>(effect: LeafEffect, area: &BoundingBox, op: &Operation<E>) -> bool {
        match effect {
            LeafEffect::Blocked => false,
            LeafEffect::Shrink => true,
            LeafEffect::Grow | LeafEffect::Unchanged => area.contains(&op.bbox()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SpatialItem;
    use geo::Point;

    fn item(id: u64) -> SpatialItem {
        SpatialItem::from_point(id, Point::new(id as f64, 0.0))
    }

    #[test]
    fn test_tombstones_store_unmatched_deletions() {
        let rep = DiskRepresentation::Tombstones;
        let mut entries = vec![Operation::insertion(item(1))];

        assert!(rep.execute(&mut entries, &Operation::deletion(item(2))));
        assert_eq!(entries.len(), 2);

        assert!(rep.execute(&mut entries, &Operation::deletion(item(1))));
        assert_eq!(entries, vec![Operation::deletion(item(2))]);

        assert!(rep.execute(&mut entries, &Operation::insertion(item(2))));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_tombstone_leaves_keep_copies() {
        let rep = DiskRepresentation::Tombstones;
        let mut entries = vec![Operation::insertion(item(1))];
        let again = Operation::insertion(item(1));

        assert_eq!(rep.effect(&entries, &again), LeafEffect::Grow);
        assert!(rep.execute(&mut entries, &again));
        assert_eq!(entries.len(), 2);

        assert!(rep.execute(&mut entries, &Operation::deletion(item(1))));
        assert_eq!(entries, vec![Operation::insertion(item(1))]);
    }

    #[test]
    fn test_physical_blocks_unmatched_deletions() {
        let rep = DiskRepresentation::Physical;
        let mut entries = vec![Operation::insertion(item(1))];

        assert!(!rep.execute(&mut entries, &Operation::deletion(item(2))));
        assert_eq!(entries.len(), 1);
        assert_eq!(
            rep.effect(&entries, &Operation::insertion(item(1))),
            LeafEffect::Unchanged
        );
        assert!(rep.execute(&mut entries, &Operation::insertion(item(1))));
        assert_eq!(entries.len(), 1);
        assert!(rep.execute(&mut entries, &Operation::deletion(item(1))));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_fit_rules() {
        let area = BoundingBox::new(0.0, -1.0, 1.5, 1.0);
        let inside = Operation::insertion(item(1));
        let outside = Operation::insertion(item(5));

        assert!(DiskRepresentation::fits(LeafEffect::Grow, &area, &inside));
        assert!(!DiskRepresentation::fits(LeafEffect::Grow, &area, &outside));
        assert!(DiskRepresentation::fits(LeafEffect::Shrink, &area, &outside));
        assert!(!DiskRepresentation::fits(LeafEffect::Blocked, &area, &inside));
    }
}
