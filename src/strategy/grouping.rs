//! Partitioning operations by the child they should descend into.

use crate::disk::{ChildEntry, choose_subtree};
use crate::geometry::SpatialData;
use crate::group_map::{GroupKey, IndexEntryOpGroupMap};
use crate::operation::{Operation, OperationGroup};
use crate::stats::GroupingStats;
use smallvec::SmallVec;

/// Assigns each operation to a child of an index node, or to the orphan group.
///
/// Every operation must end up in at least one group. Only makers that
/// report [`splits_deletions`](Self::splits_deletions) may place a deletion
/// in more than one group.
pub trait OperationGroupMaker<E: SpatialData> {
    /// # Panics
    ///
    /// Implementations panic when `children` is empty.
    fn group_operations(
        &self,
        children: &[ChildEntry],
        ops: OperationGroup<E>,
        stats: &mut GroupingStats,
    ) -> IndexEntryOpGroupMap<E>;

    fn splits_deletions(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

fn route_by_subtree<E: SpatialData>(
    children: &[ChildEntry],
    op: Operation<E>,
    groups: &mut IndexEntryOpGroupMap<E>,
) {
    let position = choose_subtree(children, &op.bbox());
    groups.add_entry(GroupKey::Child(children[position].id), op);
}

fn assert_has_children(children: &[ChildEntry]) {
    assert!(!children.is_empty(), "cannot group operations for a node without children");
}

/// Insertions follow `choose_subtree`; a deletion is copied to every child
/// whose box contains its data.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialGroupMaker;

impl<E: SpatialData> OperationGroupMaker<E> for TrivialGroupMaker {
    fn group_operations(
        &self,
        children: &[ChildEntry],
        ops: OperationGroup<E>,
        stats: &mut GroupingStats,
    ) -> IndexEntryOpGroupMap<E> {
        assert_has_children(children);
        let mut groups = IndexEntryOpGroupMap::new();
        for op in ops {
            if op.is_insertion() {
                route_by_subtree(children, op, &mut groups);
                continue;
            }
            let bbox = op.bbox();
            let targets: SmallVec<[GroupKey; 4]> = children
                .iter()
                .filter(|child| child.bbox.contains(&bbox))
                .map(|child| GroupKey::Child(child.id))
                .collect();
            if targets.is_empty() {
                stats.orphaned_deletions += 1;
                groups.add_entry(GroupKey::Orphan, op);
                continue;
            }
            stats.deletion_splits.record(targets.len());
            for key in targets {
                groups.add_entry(key, op.clone());
            }
        }
        groups
    }

    fn splits_deletions(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "trivial"
    }
}

/// Every operation follows `choose_subtree`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletionsAsInsertionsGroupMaker;

impl<E: SpatialData> OperationGroupMaker<E> for DeletionsAsInsertionsGroupMaker {
    fn group_operations(
        &self,
        children: &[ChildEntry],
        ops: OperationGroup<E>,
        _stats: &mut GroupingStats,
    ) -> IndexEntryOpGroupMap<E> {
        assert_has_children(children);
        let mut groups = IndexEntryOpGroupMap::new();
        for op in ops {
            route_by_subtree(children, op, &mut groups);
        }
        groups
    }

    fn name(&self) -> &'static str {
        "deletions_as_insertions"
    }
}

/// Insertions follow `choose_subtree`; deletions are orphaned.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertionsOnlyGroupMaker;

impl<E: SpatialData> OperationGroupMaker<E> for InsertionsOnlyGroupMaker {
    fn group_operations(
        &self,
        children: &[ChildEntry],
        ops: OperationGroup<E>,
        stats: &mut GroupingStats,
    ) -> IndexEntryOpGroupMap<E> {
        assert_has_children(children);
        let mut groups = IndexEntryOpGroupMap::new();
        for op in ops {
            if op.is_insertion() {
                route_by_subtree(children, op, &mut groups);
            } else {
                stats.orphaned_deletions += 1;
                groups.add_entry(GroupKey::Orphan, op);
            }
        }
        groups
    }

    fn name(&self) -> &'static str {
        "insertions_only"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, SpatialItem};
    use geo::Point;

    fn children() -> Vec<ChildEntry> {
        vec![
            ChildEntry::new(1, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            ChildEntry::new(2, BoundingBox::new(5.0, 5.0, 15.0, 15.0)),
            ChildEntry::new(3, BoundingBox::new(20.0, 0.0, 30.0, 10.0)),
        ]
    }

    fn item(id: u64, x: f64, y: f64) -> SpatialItem {
        SpatialItem::from_point(id, Point::new(x, y))
    }

    fn ops() -> OperationGroup<SpatialItem> {
        vec![
            Operation::insertion(item(1, 1.0, 1.0)),
            Operation::insertion(item(2, 25.0, 5.0)),
            Operation::deletion(item(3, 7.0, 7.0)),
            Operation::deletion(item(4, 50.0, 50.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_trivial_splits_deletions() {
        let mut stats = GroupingStats::default();
        let groups = TrivialGroupMaker.group_operations(&children(), ops(), &mut stats);

        let overlap = Operation::deletion(item(3, 7.0, 7.0));
        assert!(groups.get(&GroupKey::Child(1)).is_some_and(|g| g.contains(&overlap)));
        assert!(groups.get(&GroupKey::Child(2)).is_some_and(|g| g.contains(&overlap)));
        assert_eq!(groups.get(&GroupKey::Child(3)).map(|g| g.len()), Some(1));
        assert_eq!(groups.get(&GroupKey::Orphan).map(|g| g.len()), Some(1));
        assert_eq!(groups.flatten().len(), 4);
        assert_eq!(stats.deletion_splits.frequency(2), 1);
        assert_eq!(stats.orphaned_deletions, 1);
        assert!(OperationGroupMaker::<SpatialItem>::splits_deletions(&TrivialGroupMaker));
    }

    #[test]
    fn test_deletions_as_insertions_never_orphans() {
        let mut stats = GroupingStats::default();
        let groups =
            DeletionsAsInsertionsGroupMaker.group_operations(&children(), ops(), &mut stats);

        assert!(!groups.contains_key(&GroupKey::Orphan));
        let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_insertions_only_orphans_deletions() {
        let mut stats = GroupingStats::default();
        let groups = InsertionsOnlyGroupMaker.group_operations(&children(), ops(), &mut stats);

        let orphans = groups.get(&GroupKey::Orphan).expect("orphan group");
        assert_eq!(orphans.len(), 2);
        assert_eq!(orphans.deletion_count(), 2);
        assert_eq!(stats.orphaned_deletions, 2);
    }

    #[test]
    #[should_panic(expected = "without children")]
    fn test_grouping_childless_node_panics() {
        let mut stats = GroupingStats::default();
        DeletionsAsInsertionsGroupMaker.group_operations(&[], ops(), &mut stats);
    }
}
