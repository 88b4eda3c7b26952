//! Write-only counters describing what the tree did.
//!
//! Nothing in the update algorithm reads these values back; they exist for
//! tuning strategies and for tests.

use std::collections::BTreeMap;

/// Frequency table of small non-negative values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    buckets: BTreeMap<usize, u64>,
}

impl Histogram {
    pub fn record(&mut self, value: usize) {
        *self.buckets.entry(value).or_insert(0) += 1;
    }

    /// Number of recorded samples.
    pub fn count(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// How often `value` was recorded.
    pub fn frequency(&self, value: usize) -> u64 {
        self.buckets.get(&value).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.buckets
            .iter()
            .map(|(value, count)| *value as u64 * count)
            .sum()
    }

    pub fn mean(&self) -> Option<f64> {
        let count = self.count();
        (count > 0).then(|| self.total() as f64 / count as f64)
    }

    pub fn max(&self) -> Option<usize> {
        self.buckets.keys().next_back().copied()
    }

    /// Add the samples of `other` to this histogram.
    pub fn merge(&mut self, other: &Histogram) {
        for (value, count) in other.iter() {
            *self.buckets.entry(value).or_insert(0) += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.buckets.iter().map(|(value, count)| (*value, *count))
    }
}

/// Counters kept by operation group makers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Number of child groups a split deletion was copied into
    pub deletion_splits: Histogram,
    /// Deletions that no child could contain
    pub orphaned_deletions: u64,
}

/// Counters kept by push-down strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushDownStats {
    /// Threshold decisions where some group reached the threshold
    pub threshold_satisfied: u64,
    /// Threshold decisions that fell back to a single group
    pub threshold_unsatisfied: u64,
    /// Extra groups pushed because they tied for largest
    pub equal_largest_groups: u64,
}

/// Statistics of an [`RRTree`](crate::RRTree).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RRTreeStats {
    pub insertions: u64,
    pub deletions: u64,
    /// Buffer emptyings, forced ones included
    pub emptyings: u64,
    pub full_emptyings: u64,
    /// Emptyings that could not shrink the buffer selectively
    pub failed_emptyings: u64,
    pub restarts: u64,
    pub group_updates: u64,
    pub leaf_updates: u64,
    pub completed_insertions: u64,
    pub completed_deletions: u64,
    pub put_backs: u64,
    /// Deletions dropped after a full emptying because no data matched them
    pub discarded_deletions: u64,
    pub index_piggybacked: u64,
    pub leaf_piggybacked: u64,
    pub query_piggybacked: u64,
    /// Candidates refused because the leaf would leave its fan-out bounds
    pub piggyback_refused: u64,
    pub elided_nodes: u64,
    pub subtree_insertions: u64,
    pub subtree_merges: u64,
    pub splits: u64,
    pub queries: u64,
    pub gc_runs: u64,
    /// Sizes of groups pushed towards the leaves
    pub pushed_group_sizes: Histogram,
    /// Sizes of groups returned to the buffer
    pub buffered_group_sizes: Histogram,
    /// Number of emptyings each completed operation stayed buffered
    pub operation_lifetimes: Histogram,
    pub grouping: GroupingStats,
    pub push_down: PushDownStats,
}

impl RRTreeStats {
    pub fn completed_operations(&self) -> u64 {
        self.completed_insertions + self.completed_deletions
    }
}
