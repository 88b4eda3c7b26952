//! Per-child operation groups of one index node.

use crate::disk::NodeId;
use crate::geometry::SpatialData;
use crate::operation::{Operation, OperationGroup};
use std::collections::BTreeMap;

/// Target of an operation group: a child of the grouped node, or nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Child(NodeId),
    /// Operations that could not be associated with any child
    Orphan,
}

/// Maps each child of an index node to the operations destined for it.
///
/// Groups are kept ordered by key so strategies see them deterministically.
/// A deletion may be present in several child groups when the grouping
/// splits deletions; [`flatten`](Self::flatten) reports it once.
#[derive(Debug, Clone)]
pub struct IndexEntryOpGroupMap<E: SpatialData> {
    groups: BTreeMap<GroupKey, OperationGroup<E>>,
}

impl<E: SpatialData> Default for IndexEntryOpGroupMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SpatialData> IndexEntryOpGroupMap<E> {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    pub fn add_entry(&mut self, key: GroupKey, op: Operation<E>) {
        self.groups.entry(key).or_default().insert(op);
    }

    /// Add `op` under `key` unless some group already holds it.
    pub fn add_if_not_exists(&mut self, key: GroupKey, op: Operation<E>) -> bool {
        if self.contains_op(&op) {
            return false;
        }
        self.add_entry(key, op);
        true
    }

    pub fn contains_op(&self, op: &Operation<E>) -> bool {
        self.groups.values().any(|group| group.contains(op))
    }

    /// Replace the group stored under `key`. Empty groups are not stored.
    pub fn put_group(&mut self, key: GroupKey, group: OperationGroup<E>) {
        if group.is_empty() {
            self.groups.remove(&key);
        } else {
            self.groups.insert(key, group);
        }
    }

    pub fn take_group(&mut self, key: &GroupKey) -> Option<OperationGroup<E>> {
        self.groups.remove(key)
    }

    /// Move the group under `key` from `other` into this map, merging with
    /// whatever is already stored here.
    pub fn move_group_from(&mut self, other: &mut IndexEntryOpGroupMap<E>, key: &GroupKey) {
        if let Some(group) = other.take_group(key) {
            self.groups.entry(*key).or_default().extend(group);
        }
    }

    pub fn get(&self, key: &GroupKey) -> Option<&OperationGroup<E>> {
        self.groups.get(key)
    }

    pub fn contains_key(&self, key: &GroupKey) -> bool {
        self.groups.contains_key(key)
    }

    /// Number of groups, the orphan group included.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &OperationGroup<E>)> {
        self.groups.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    /// All operations of all groups; duplicated deletions appear once.
    pub fn flatten(&self) -> OperationGroup<E> {
        self.groups
            .values()
            .flat_map(|group| group.iter().cloned())
            .collect()
    }

    pub fn flatten_only_insertions(&self) -> OperationGroup<E> {
        self.groups
            .values()
            .flat_map(|group| group.iter().filter(|op| op.is_insertion()).cloned())
            .collect()
    }

    /// Key of the biggest child group by significant size.
    ///
    /// Ties resolve to the smallest key. The orphan group never qualifies.
    pub fn biggest(&self, by_insertions: bool) -> Option<GroupKey> {
        let mut best: Option<(GroupKey, usize)> = None;
        for (key, group) in self.groups.iter() {
            if *key == GroupKey::Orphan {
                continue;
            }
            let size = group.size_in_significant_ops(by_insertions);
            if best.is_none_or(|(_, best_size)| size > best_size) {
                best = Some((*key, size));
            }
        }
        best.map(|(key, _)| key)
    }

    /// Sum of the significant sizes of all groups.
    pub fn total_size(&self, by_insertions: bool) -> usize {
        self.groups
            .values()
            .map(|group| group.size_in_significant_ops(by_insertions))
            .sum()
    }
}

impl<E: SpatialData> IntoIterator for IndexEntryOpGroupMap<E> {
    type Item = (GroupKey, OperationGroup<E>);
    type IntoIter = std::collections::btree_map::IntoIter<GroupKey, OperationGroup<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}
