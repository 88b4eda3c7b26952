//! Deciding which operation groups descend now and which stay buffered.

use crate::geometry::SpatialData;
use crate::group_map::{GroupKey, IndexEntryOpGroupMap};
use crate::stats::PushDownStats;

/// Where in the tree a push-down decision is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushDownContext {
    /// Level of the node whose children the groups target
    pub level: usize,
    /// Number of children of that node
    pub fanout: usize,
    pub tree_height: usize,
    pub min_node_capacity: usize,
    pub max_node_capacity: usize,
    /// The node's group update was restarted after a structural change
    pub restarted: bool,
}

impl PushDownContext {
    pub fn is_root(&self) -> bool {
        self.tree_height == self.level + 1
    }

    /// Mean of the node capacity bounds.
    pub fn average_node_capacity(&self) -> usize {
        (self.min_node_capacity + self.max_node_capacity) / 2
    }
}

/// Disjoint partition of the input groups.
#[derive(Debug, Clone)]
pub struct PushDownAndBufferGroups<E: SpatialData> {
    pub push_down: IndexEntryOpGroupMap<E>,
    pub buffer: IndexEntryOpGroupMap<E>,
}

impl<E: SpatialData> PushDownAndBufferGroups<E> {
    fn new() -> Self {
        Self {
            push_down: IndexEntryOpGroupMap::new(),
            buffer: IndexEntryOpGroupMap::new(),
        }
    }

    fn all(groups: IndexEntryOpGroupMap<E>) -> Self {
        let mut result = Self::new();
        for (key, group) in groups {
            if key == GroupKey::Orphan {
                result.buffer.put_group(key, group);
            } else {
                result.push_down.put_group(key, group);
            }
        }
        result
    }

    /// Deletions descending to some child also descend to every other child
    /// whose buffered group holds a copy of them.
    fn move_split_deletions(&mut self) {
        let descending = self.push_down.flatten();
        let buffered: Vec<GroupKey> = self
            .buffer
            .keys()
            .filter(|key| **key != GroupKey::Orphan)
            .copied()
            .collect();
        for key in buffered {
            let Some(mut group) = self.buffer.take_group(&key) else {
                continue;
            };
            let split: Vec<_> = group
                .iter()
                .filter(|op| op.is_deletion() && descending.contains(op))
                .cloned()
                .collect();
            for op in split {
                group.remove(&op);
                self.push_down.add_entry(key, op);
            }
            self.buffer.put_group(key, group);
        }
    }

    fn by_keys(groups: IndexEntryOpGroupMap<E>, push: &[GroupKey]) -> Self {
        let mut result = Self::new();
        for (key, group) in groups {
            if key != GroupKey::Orphan && push.contains(&key) {
                result.push_down.put_group(key, group);
            } else {
                result.buffer.put_group(key, group);
            }
        }
        result
    }
}

/// Chooses the groups that descend from a node.
///
/// The partition is exhaustive and disjoint. An orphan group, should one be
/// passed in, always lands in the buffer part.
pub trait PushDownGroupsStrategy<E: SpatialData> {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E>;

    /// Whether a decision at the root usually moves most of the buffer, in
    /// which case the buffer is cleared and the rest reinserted.
    fn will_empty_big_part_of_buffer(&self) -> bool;
}

/// Groups reaching `threshold` descend. When none does and `fallback` is
/// set, the biggest group descends alone.
fn threshold_partition<E: SpatialData>(
    groups: IndexEntryOpGroupMap<E>,
    threshold: usize,
    by_insertions: bool,
    fallback: bool,
    stats: &mut PushDownStats,
) -> PushDownAndBufferGroups<E> {
    let mut keys: Vec<GroupKey> = groups
        .iter()
        .filter(|(key, group)| {
            **key != GroupKey::Orphan && group.size_in_significant_ops(by_insertions) >= threshold
        })
        .map(|(key, _)| *key)
        .collect();

    let candidates = groups.keys().filter(|key| **key != GroupKey::Orphan).count();
    if keys.is_empty() && candidates > 0 {
        stats.threshold_unsatisfied += 1;
        if fallback {
            keys.extend(groups.biggest(by_insertions));
        }
    } else {
        stats.threshold_satisfied += 1;
    }
    PushDownAndBufferGroups::by_keys(groups, &keys)
}

/// Everything descends.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushDownAllStrategy;

impl<E: SpatialData> PushDownGroupsStrategy<E> for PushDownAllStrategy {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        _context: &PushDownContext,
        _stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        PushDownAndBufferGroups::all(groups)
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        true
    }
}

/// Groups with at least `threshold` significant operations descend, at every
/// level and on restarts.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdStrategy {
    pub threshold: usize,
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for ThresholdStrategy {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        _context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        threshold_partition(groups, self.threshold, self.by_insertions, true, stats)
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        true
    }
}

/// Threshold at the root, everything below it.
#[derive(Debug, Clone, Copy)]
pub struct RootLevelThresholdStrategy {
    pub threshold: usize,
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for RootLevelThresholdStrategy {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.is_root() {
            threshold_partition(groups, self.threshold, self.by_insertions, true, stats)
        } else {
            PushDownAndBufferGroups::all(groups)
        }
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}

/// Keys of the largest child groups, all of them on a tie.
fn largest_keys<E: SpatialData>(
    groups: &IndexEntryOpGroupMap<E>,
    by_insertions: bool,
    stats: &mut PushDownStats,
) -> Vec<GroupKey> {
    let largest = groups
        .iter()
        .filter(|(key, _)| **key != GroupKey::Orphan)
        .map(|(_, group)| group.size_in_significant_ops(by_insertions))
        .max();
    let Some(largest) = largest else {
        return Vec::new();
    };
    let keys: Vec<GroupKey> = groups
        .iter()
        .filter(|(key, group)| {
            **key != GroupKey::Orphan && group.size_in_significant_ops(by_insertions) == largest
        })
        .map(|(key, _)| *key)
        .collect();
    stats.equal_largest_groups += keys.len().saturating_sub(1) as u64;
    keys
}

/// At the root only the largest group descends (all of them on a tie);
/// below the root and on restarts everything descends.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestGroupStrategy {
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for LargestGroupStrategy {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.restarted || !context.is_root() {
            return PushDownAndBufferGroups::all(groups);
        }
        let keys = largest_keys(&groups, self.by_insertions, stats);
        if keys.is_empty() {
            return PushDownAndBufferGroups::all(groups);
        }
        PushDownAndBufferGroups::by_keys(groups, &keys)
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}

/// Like [`LargestGroupStrategy`], but a deletion copied into several child
/// groups follows the descending copy into every child that holds it.
///
/// The copies are split off the buffered groups and descend under their own
/// child keys, so the same key may then appear in both parts of the result.
/// The deletion thereby leaves the buffer completely.
#[derive(Debug, Clone, Copy, Default)]
pub struct LargestGroupSplitDeletesStrategy {
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for LargestGroupSplitDeletesStrategy {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.restarted || !context.is_root() {
            return PushDownAndBufferGroups::all(groups);
        }
        let keys = largest_keys(&groups, self.by_insertions, stats);
        if keys.is_empty() {
            return PushDownAndBufferGroups::all(groups);
        }
        let mut result = PushDownAndBufferGroups::by_keys(groups, &keys);
        result.move_split_deletions();
        result
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}

/// Delegates at the root; below it, groups reaching the threshold descend
/// with a biggest-group fallback.
pub struct ThresholdBelowRootStrategy<E: SpatialData> {
    pub root: Box<dyn PushDownGroupsStrategy<E>>,
    pub threshold: usize,
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for ThresholdBelowRootStrategy<E> {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.is_root() {
            self.root.choose_push_down_groups(groups, context, stats)
        } else {
            threshold_partition(groups, self.threshold, self.by_insertions, true, stats)
        }
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}

/// Delegates at the root; below it the threshold is `constant` times the
/// average group size per child (`total / fanout`). Nothing descending is
/// acceptable.
pub struct DivideByFanoutBelowRootStrategy<E: SpatialData> {
    pub root: Box<dyn PushDownGroupsStrategy<E>>,
    pub constant: f64,
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for DivideByFanoutBelowRootStrategy<E> {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.is_root() {
            return self.root.choose_push_down_groups(groups, context, stats);
        }
        let total = groups.total_size(self.by_insertions);
        let fanout = context.fanout.max(1);
        let threshold = (self.constant * total as f64 / fanout as f64) as usize;
        threshold_partition(groups, threshold, self.by_insertions, false, stats)
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}

/// Delegates at the root; below it the threshold is the total group size
/// divided by `coefficient` times the average node capacity. Nothing
/// descending is acceptable.
pub struct DivideByConstantBelowRootStrategy<E: SpatialData> {
    pub root: Box<dyn PushDownGroupsStrategy<E>>,
    pub coefficient: f64,
    pub by_insertions: bool,
}

impl<E: SpatialData> PushDownGroupsStrategy<E> for DivideByConstantBelowRootStrategy<E> {
    fn choose_push_down_groups(
        &self,
        groups: IndexEntryOpGroupMap<E>,
        context: &PushDownContext,
        stats: &mut PushDownStats,
    ) -> PushDownAndBufferGroups<E> {
        if context.is_root() {
            return self.root.choose_push_down_groups(groups, context, stats);
        }
        let total = groups.total_size(self.by_insertions);
        let divisor = context.average_node_capacity().max(1) as f64 * self.coefficient;
        let threshold = (total as f64 / divisor) as usize;
        threshold_partition(groups, threshold, self.by_insertions, false, stats)
    }

    fn will_empty_big_part_of_buffer(&self) -> bool {
        false
    }
}
