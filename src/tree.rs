//! The RR-tree: an operation buffer in front of a container-resident R-tree.
//!
//! Updates are buffered. When the buffer fills up it is emptied by a group
//! update: buffered operations are grouped by the root child they belong to,
//! a push-down strategy picks the groups worth the I/O, and those groups
//! descend recursively, splitting and merging nodes on the way back up.
//! Queries combine a tree descent with a buffer scan.

use crate::buffer::Buffer;
use crate::config::{GroupingConfig, RRTreeConfig};
use crate::disk::{ChildEntry, DiskTree, Node, NodeId, RootEntry, choose_subtree};
use crate::error::{RRTreeError, Result};
use crate::gc::{self, GcReport};
use crate::geometry::{BoundingBox, SpatialData};
use crate::group_map::{GroupKey, IndexEntryOpGroupMap};
use crate::invariants;
use crate::operation::{Operation, OperationGroup};
use crate::piggyback::{LeafPiggybacker, LeafPiggybackingInfo};
use crate::stats::RRTreeStats;
use crate::storage::{ContainerStats, MemoryContainer, NodeContainer};
use crate::strategy::{
    OperationGroupMaker, PushDownAllStrategy, PushDownContext, PushDownGroupsStrategy,
    TrivialGroupMaker,
};
use crate::trace::{NoopTracer, ObjectTracer, TraceEvent};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::num::NonZeroUsize;

/// A buffered R-tree over data of type `E`.
///
/// # Examples
///
/// ```
/// use rrtree::{BoundingBox, RRTree, RRTreeConfig, SpatialItem};
/// use geo::Point;
///
/// let config = RRTreeConfig::default()
///     .with_node_capacity(2, 4)
///     .with_max_buffer_size(4);
/// let mut tree = RRTree::new(config).unwrap();
///
/// for id in 0..4 {
///     tree.insert(SpatialItem::from_point(id, Point::new(id as f64, 1.0))).unwrap();
/// }
/// assert!(tree.was_buffer_emptied());
/// assert_eq!(tree.buffer_len(), 0);
///
/// let found = tree.range_query(&BoundingBox::new(0.0, 0.0, 1.5, 2.0)).unwrap();
/// assert_eq!(found.len(), 2);
/// ```
pub struct RRTree<E: SpatialData, C: NodeContainer<E> = MemoryContainer<E>> {
    config: RRTreeConfig,
    buffer: Buffer<E>,
    disk: DiskTree<E, C>,
    group_maker: Box<dyn OperationGroupMaker<E>>,
    push_down: Box<dyn PushDownGroupsStrategy<E>>,
    tracer: Box<dyn ObjectTracer<E>>,
    stats: RRTreeStats,
    /// Deletions completed during the current emptying, kept while the
    /// group maker may route one deletion into several subtrees
    completed_deletions: Option<FxHashSet<Operation<E>>>,
    force_full: bool,
    buffer_emptied: bool,
    /// Emptying count at the time each buffered operation arrived
    births: FxHashMap<Operation<E>, u64>,
    peak_nodes_loaded_during_gc: usize,
}

impl<E: SpatialData> RRTree<E> {
    /// Create a tree backed by an in-memory container.
    pub fn new(config: RRTreeConfig) -> Result<Self> {
        Self::with_container(config, MemoryContainer::new())
    }
}

impl<E: SpatialData, C: NodeContainer<E>> RRTree<E, C> {
    /// Create a tree on top of an empty node container.
    pub fn with_container(config: RRTreeConfig, container: C) -> Result<Self> {
        config.validate().map_err(RRTreeError::InvalidConfig)?;
        let disk = DiskTree::new(
            container,
            config.min_node_capacity,
            config.max_node_capacity,
            config.representation,
        );
        Ok(Self {
            buffer: Buffer::new(config.max_buffer_size),
            disk,
            group_maker: config.grouping.build(),
            push_down: config.push_down.build(),
            tracer: Box::new(NoopTracer),
            stats: RRTreeStats::default(),
            completed_deletions: None,
            force_full: false,
            buffer_emptied: false,
            births: FxHashMap::default(),
            peak_nodes_loaded_during_gc: 0,
            config,
        })
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn ObjectTracer<E>>) {
        self.tracer = tracer;
    }

    pub fn config(&self) -> &RRTreeConfig {
        &self.config
    }

    pub fn stats(&self) -> &RRTreeStats {
        &self.stats
    }

    pub fn container(&self) -> &C {
        self.disk.container()
    }

    pub fn container_stats(&self) -> ContainerStats {
        self.disk.container().stats()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of container-resident levels; 0 while nothing was emptied.
    pub fn height(&self) -> usize {
        self.disk.height()
    }

    /// Box covering both the container-resident tree and the buffer.
    pub fn root_bbox(&self) -> Option<BoundingBox> {
        let disk = self.disk.root().map(|root| root.bbox);
        match (disk, self.buffer.bbox()) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        }
    }

    pub fn insertion_deletion_annihilations(&self) -> u64 {
        self.buffer.insertion_deletion_annihilations()
    }

    pub fn deletion_insertion_annihilations(&self) -> u64 {
        self.buffer.deletion_insertion_annihilations()
    }

    /// Largest number of leaves a vacuum pass kept loaded at once.
    pub fn peak_nodes_loaded_during_gc(&self) -> usize {
        self.peak_nodes_loaded_during_gc
    }

    /// Whether the last `insert` or `remove` emptied the buffer.
    pub fn was_buffer_emptied(&self) -> bool {
        self.buffer_emptied
    }

    /// Make the next emptying push the whole buffer down.
    pub fn on_next_empty_buffer_force_full(&mut self) {
        self.force_full = true;
    }

    /// Buffer an insertion of `data`, emptying the buffer when it fills up.
    pub fn insert(&mut self, data: E) -> Result<()> {
        self.buffer_emptied = false;
        if self.buffer.is_full() {
            self.empty_buffer()?;
        }
        self.stats.insertions += 1;
        self.trace(TraceEvent::InsertToBuffer, &data);
        let annihilated = self.buffer.insert(data.clone());
        let op = Operation::insertion(data);
        if annihilated {
            self.births.remove(&op.opposite());
        } else {
            self.births.entry(op).or_insert(self.stats.emptyings);
        }
        if self.buffer.is_full() {
            self.empty_buffer()?;
        }
        Ok(())
    }

    /// Buffer a deletion of `data`.
    ///
    /// Returns the data when the deletion cancelled a buffered insertion.
    pub fn remove(&mut self, data: E) -> Result<Option<E>> {
        self.buffer_emptied = false;
        if self.buffer.is_full() {
            self.empty_buffer()?;
        }
        self.stats.deletions += 1;
        self.trace(TraceEvent::RemoveFromBuffer, &data);
        let annihilated = self.buffer.remove(data.clone());
        let op = Operation::deletion(data);
        if annihilated.is_some() {
            self.births.remove(&op.opposite());
        } else {
            self.births.entry(op).or_insert(self.stats.emptyings);
        }
        if self.buffer.is_full() {
            self.empty_buffer()?;
        }
        Ok(annihilated)
    }

    /// Empty the buffer now, whatever its fill level.
    pub fn force_empty_buffer(&mut self) -> Result<()> {
        self.empty_buffer()
    }

    /// Live data intersecting `bbox`. Only the leaf level (0) can be queried.
    pub fn query(&mut self, bbox: &BoundingBox, level: usize) -> Result<Vec<E>> {
        if level != 0 {
            return Err(RRTreeError::InvalidInput(format!(
                "queries target the leaf level, got level {level}"
            )));
        }
        self.stats.queries += 1;

        let mut found = Vec::new();
        if let Some(root) = self.disk.root()
            && root.bbox.intersects(bbox)
        {
            let contained = bbox.contains(&root.bbox);
            self.query_node(root.id, true, bbox, contained, &mut found)?;
        }
        let buffered = self.buffer.query_any_type(bbox);

        if self.tracer.is_enabled() {
            for op in &found {
                self.tracer.trace(TraceEvent::QueryDiskResult, &op.data);
            }
            for op in &buffered {
                self.tracer.trace(TraceEvent::QueryBufferResult, &op.data);
            }
        }
        Ok(live_data(found.into_iter().chain(buffered)))
    }

    /// Shorthand for a leaf level [`query`](Self::query).
    pub fn range_query(&mut self, bbox: &BoundingBox) -> Result<Vec<E>> {
        self.query(bbox, 0)
    }

    /// Remove obsolete leaf entries, either by rebuilding the tree
    /// (`rebuild`) or by vacuuming it in place.
    ///
    /// Only tombstone trees collect garbage; physical trees return an empty
    /// report. A container failure aborts the pass without rollback.
    pub fn clean_garbage(&mut self, rebuild: bool) -> Result<GcReport> {
        self.stats.gc_runs += 1;
        if !self.config.representation.deletions_like_insertions() {
            return Ok(GcReport::default());
        }
        let cache_size =
            NonZeroUsize::new(self.config.gc_index_cache_size).unwrap_or(NonZeroUsize::MIN);
        let report = if rebuild {
            gc::rebuild(&mut self.disk, cache_size, self.tracer.as_mut())?
        } else {
            let piggybacker = LeafPiggybacker {
                allow_reorganization: false,
                epsilon: 0.0,
                min: self.disk.min(),
                max: self.disk.max(),
                representation: self.config.representation,
            };
            let (report, executed) =
                gc::vacuum(&mut self.disk, &mut self.buffer, &piggybacker, cache_size)?;
            for op in executed {
                self.complete_operation(op);
            }
            report
        };
        self.peak_nodes_loaded_during_gc = self
            .peak_nodes_loaded_during_gc
            .max(report.peak_leaves_resident);
        debug!(
            "garbage collection ({}): {} -> {} leaves, {} -> {} index nodes",
            if rebuild { "rebuild" } else { "vacuum" },
            report.old_leaf_nodes,
            report.new_leaf_nodes,
            report.old_index_nodes,
            report.new_index_nodes
        );
        Ok(report)
    }

    /// Number of entries stored in leaves, tombstones included.
    pub fn data_items(&mut self) -> Result<usize> {
        Ok(self.leaf_operations()?.len())
    }

    /// Stored leaf entries per live datum; 1.0 for a garbage-free tree.
    pub fn physical_to_logical_ratio(&mut self) -> Result<f64> {
        let ops = self.leaf_operations()?;
        let physical = ops.len();
        let logical = live_data(ops).len();
        if logical == 0 {
            return Ok(if physical == 0 { 1.0 } else { f64::INFINITY });
        }
        Ok(physical as f64 / logical as f64)
    }

    /// Verify fan-out, level, box and buffer invariants.
    pub fn check_invariants(&mut self) -> Result<()> {
        invariants::check(&mut self.disk, &self.buffer)
    }

    fn trace(&mut self, event: TraceEvent, data: &E) {
        if self.tracer.is_enabled() {
            self.tracer.trace(event, data);
        }
    }

    fn trace_group(&mut self, event: TraceEvent, group: &OperationGroup<E>) {
        if self.tracer.is_enabled() {
            for op in group.iter() {
                self.tracer.trace(event, &op.data);
            }
        }
    }

    fn leaf_operations(&mut self) -> Result<Vec<Operation<E>>> {
        let mut ops = Vec::new();
        let mut pending: Vec<NodeId> = self.disk.root().map(|root| root.id).into_iter().collect();
        while let Some(id) = pending.pop() {
            let node = self.disk.load(id)?;
            if node.is_leaf() {
                ops.extend_from_slice(node.operations());
            } else {
                pending.extend(node.children().iter().map(|child| child.id));
            }
        }
        Ok(ops)
    }

    fn query_node(
        &mut self,
        id: NodeId,
        is_root: bool,
        bbox: &BoundingBox,
        contained: bool,
        found: &mut Vec<Operation<E>>,
    ) -> Result<()> {
        let mut node = self.disk.load(id)?;
        if node.is_leaf() {
            if self.config.query_piggybacking {
                self.query_piggyback(id, is_root, &mut node)?;
            }
            found.extend(
                node.operations()
                    .iter()
                    .filter(|op| contained || bbox.intersects(&op.bbox()))
                    .cloned(),
            );
            return Ok(());
        }
        for child in node.children().to_vec() {
            if contained || bbox.contains(&child.bbox) {
                self.query_node(child.id, false, bbox, true, found)?;
            } else if bbox.intersects(&child.bbox) {
                self.query_node(child.id, false, bbox, false, found)?;
            }
        }
        Ok(())
    }

    fn query_piggyback(&mut self, id: NodeId, is_root: bool, node: &mut Node<E>) -> Result<()> {
        let piggybacker = LeafPiggybacker {
            allow_reorganization: false,
            epsilon: 0.0,
            min: if is_root { 1 } else { self.disk.min() },
            max: self.disk.max(),
            representation: self.config.representation,
        };
        let Some(entries) = node.operations_mut() else {
            return Ok(());
        };
        let mut info = LeafPiggybackingInfo::default();
        let executed = piggybacker.piggyback(entries, &mut self.buffer, &mut info);
        self.stats.piggyback_refused += info.refused as u64;
        if executed.is_empty() {
            return Ok(());
        }

        self.stats.query_piggybacked += executed.len() as u64;
        let entry = self.disk.write(id, node.clone())?;
        if is_root {
            self.disk.set_root(Some(RootEntry {
                id,
                level: 0,
                bbox: entry.bbox,
            }));
        }
        for op in executed {
            self.trace(TraceEvent::LeafNodePiggybacking, &op.data);
            self.complete_operation(op);
        }
        Ok(())
    }

    fn empty_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.stats.emptyings += 1;
        self.buffer_emptied = true;
        let before = self.buffer.len();
        let force_full = std::mem::take(&mut self.force_full);

        let result = match self.disk.root() {
            Some(root) if !force_full && root.level > 0 => self.empty_from_root(root),
            _ => self.empty_everything(),
        };
        self.completed_deletions = None;
        result?;

        debug!(
            "emptied buffer: {} -> {} operations, height {}",
            before,
            self.buffer.len(),
            self.disk.height()
        );
        Ok(())
    }

    fn empty_from_root(&mut self, root: RootEntry) -> Result<()> {
        self.completed_deletions = self.group_maker.splits_deletions().then(FxHashSet::default);
        let node = self.disk.load(root.id)?;
        let ops = self.buffer.flatten();
        let total = ops.len();
        self.trace_group(TraceEvent::GroupUpdateStart, &ops);

        let mut groups =
            self.group_maker
                .group_operations(node.children(), ops, &mut self.stats.grouping);
        let orphans = groups.take_group(&GroupKey::Orphan).unwrap_or_default();
        if orphans.len() == total {
            self.stats.failed_emptyings += 1;
            warn!("none of {total} buffered operations could be grouped at the root, pushing everything down");
            return self.empty_everything();
        }

        let ctx = PushDownContext {
            level: node.level,
            fanout: node.len(),
            tree_height: self.disk.height(),
            min_node_capacity: self.disk.min(),
            max_node_capacity: self.disk.max(),
            restarted: false,
        };
        let chosen = self
            .push_down
            .choose_push_down_groups(groups, &ctx, &mut self.stats.push_down);
        self.record_group_sizes(&chosen.push_down, &chosen.buffer);

        let mut stay = chosen.buffer.flatten();
        stay.extend(orphans);
        if self.push_down.will_empty_big_part_of_buffer() {
            self.buffer.clear();
            for op in stay {
                self.buffer.add_entry_if_not_exists(op);
            }
        } else {
            for (_, group) in chosen.push_down.iter() {
                for op in group.iter().filter(|op| !stay.contains(op)) {
                    self.buffer.remove_exact_entry(op);
                }
            }
        }

        let pieces = self.process_push_down(node, chosen.push_down, true)?;
        self.disk.grow_tree(pieces, Some(root.id))?;

        if self.buffer.is_full() {
            self.stats.failed_emptyings += 1;
            warn!(
                "buffer still full after a selective emptying ({} operations), pushing everything down",
                self.buffer.len()
            );
            return self.empty_everything();
        }
        Ok(())
    }

    /// Push the whole buffer down with every group selected. Deletions left
    /// over afterwards have no data to delete anywhere and are dropped.
    fn empty_everything(&mut self) -> Result<()> {
        self.stats.full_emptyings += 1;
        let keep_grouping = self.config.representation.deletions_like_insertions()
            && self.config.grouping == GroupingConfig::DeletionsAsInsertions;
        let push_down = std::mem::replace(&mut self.push_down, Box::new(PushDownAllStrategy));
        let group_maker = (!keep_grouping)
            .then(|| std::mem::replace(&mut self.group_maker, Box::new(TrivialGroupMaker)));

        let result = self.push_everything();

        self.push_down = push_down;
        if let Some(group_maker) = group_maker {
            self.group_maker = group_maker;
        }
        result?;

        let discarded = self.buffer.remove_all_deletions();
        if !discarded.is_empty() {
            warn!(
                "discarding {} buffered deletions without matching data",
                discarded.len()
            );
            self.stats.discarded_deletions += discarded.len() as u64;
            for data in discarded {
                self.births.remove(&Operation::deletion(data));
            }
        }
        Ok(())
    }

    fn push_everything(&mut self) -> Result<()> {
        self.completed_deletions = self.group_maker.splits_deletions().then(FxHashSet::default);
        let ops = self.buffer.flatten();
        self.buffer.clear();
        let (node, original) = match self.disk.root() {
            Some(root) => (self.disk.load(root.id)?, Some(root.id)),
            None => (Node::new_leaf(Vec::new()), None),
        };
        let pieces = self.group_update(node, ops, true, false)?;
        self.disk.grow_tree(pieces, original)
    }

    fn record_group_sizes(
        &mut self,
        push_down: &IndexEntryOpGroupMap<E>,
        buffer: &IndexEntryOpGroupMap<E>,
    ) {
        for (_, group) in push_down.iter() {
            self.stats.pushed_group_sizes.record(group.len());
        }
        for (_, group) in buffer.iter() {
            self.stats.buffered_group_sizes.record(group.len());
        }
    }

    /// Apply `ops` to the subtree rooted at `node` and return the nodes
    /// replacing it: none when it emptied, several when it split.
    fn group_update(
        &mut self,
        node: Node<E>,
        mut ops: OperationGroup<E>,
        update_stats: bool,
        restarted: bool,
    ) -> Result<Vec<Node<E>>> {
        self.stats.group_updates += 1;
        if let Some(done) = &self.completed_deletions {
            ops.retain(|op| !done.contains(op));
        }
        if node.is_leaf() {
            return self.update_leaf_node(node, ops);
        }
        if ops.is_empty() {
            return self.finish_group_update(node);
        }
        if node.is_empty() {
            for op in ops {
                self.put_op_back(op);
            }
            return Ok(Vec::new());
        }
        self.trace_group(TraceEvent::GroupUpdateStart, &ops);

        let mut groups =
            self.group_maker
                .group_operations(node.children(), ops, &mut self.stats.grouping);
        if let Some(orphans) = groups.take_group(&GroupKey::Orphan) {
            for op in orphans {
                self.put_op_back(op);
            }
        }

        let ctx = PushDownContext {
            level: node.level,
            fanout: node.len(),
            tree_height: self.disk.height(),
            min_node_capacity: self.disk.min(),
            max_node_capacity: self.disk.max(),
            restarted,
        };
        let chosen = self
            .push_down
            .choose_push_down_groups(groups, &ctx, &mut self.stats.push_down);
        if update_stats {
            self.record_group_sizes(&chosen.push_down, &chosen.buffer);
        }
        for (_, group) in chosen.buffer {
            for op in group {
                self.put_op_back(op);
            }
        }
        self.process_push_down(node, chosen.push_down, update_stats)
    }

    fn process_push_down(
        &mut self,
        node: Node<E>,
        push_down: IndexEntryOpGroupMap<E>,
        update_stats: bool,
    ) -> Result<Vec<Node<E>>> {
        let group_count = push_down.len();
        let (node, remaining) = self.update_non_leaf_node(node, push_down)?;
        match remaining {
            Some(remaining) => {
                debug_assert!(remaining.len() < group_count, "restart without progress");
                self.stats.restarts += 1;
                let ops = remaining.flatten();
                self.group_update(node, ops, update_stats, true)
            }
            None => self.finish_group_update(node),
        }
    }

    /// Send each group into its child. Returns the groups left unprocessed
    /// when an integration split nodes under `node`.
    fn update_non_leaf_node(
        &mut self,
        mut node: Node<E>,
        push_down: IndexEntryOpGroupMap<E>,
    ) -> Result<(Node<E>, Option<IndexEntryOpGroupMap<E>>)> {
        let mut pending = push_down.into_iter();
        while let Some((key, mut group)) = pending.next() {
            if let Some(done) = &self.completed_deletions {
                group.retain(|op| !done.contains(op));
            }
            if group.is_empty() {
                continue;
            }
            let position = match key {
                GroupKey::Child(id) => node.child_position(id),
                GroupKey::Orphan => None,
            };
            let Some(entry) = position.and_then(|position| node.detach_child(position)) else {
                for op in group {
                    self.put_op_back(op);
                }
                continue;
            };

            let child = self.disk.load(entry.id)?;
            if self.config.index_piggybacking {
                self.index_piggyback(&mut group);
            }
            let pieces = self.group_update(child, group, true, false)?;
            let split = self.integrate_child(&mut node, entry.id, pieces)?;

            if split {
                let mut remaining = IndexEntryOpGroupMap::new();
                for (key, group) in pending.by_ref() {
                    remaining.put_group(key, group);
                }
                if !remaining.is_empty() {
                    return Ok((node, Some(remaining)));
                }
            }
        }
        Ok((node, None))
    }

    fn index_piggyback(&mut self, group: &mut OperationGroup<E>) {
        let Some(mut area) = group.bbox() else {
            return;
        };
        if self.config.piggyback_epsilon > 0.0 {
            area = area.expand_relative(self.config.piggyback_epsilon);
        }
        self.trace_group(TraceEvent::BeforeIndexPiggybacking, group);
        let candidates = if self.config.representation.deletions_like_insertions() {
            self.buffer.copy_query_all_ops(&area)
        } else {
            self.buffer.copy_query_insertions(&area)
        };
        for op in candidates {
            self.buffer.remove_exact_entry(&op);
            self.trace(TraceEvent::IndexNodePiggybacking, &op.data);
            if group.insert(op) {
                self.stats.index_piggybacked += 1;
            }
        }
        self.trace_group(TraceEvent::AfterIndexPiggybacking, group);
    }

    /// Put the nodes that replaced child `child_id` back under `node`.
    /// Returns whether a node under `node` split in the process.
    fn integrate_child(
        &mut self,
        node: &mut Node<E>,
        child_id: NodeId,
        pieces: Vec<Node<E>>,
    ) -> Result<bool> {
        let mut pieces: Vec<Node<E>> = pieces.into_iter().filter(|p| !p.is_empty()).collect();
        if pieces.is_empty() {
            self.disk.free(child_id)?;
            return Ok(false);
        }
        if node.is_empty() && pieces.len() == 1 {
            self.disk.free(child_id)?;
            if let Some(piece) = pieces.pop() {
                *node = piece;
            }
            return Ok(false);
        }
        if node.is_empty() {
            *node = Node::new_index(pieces[0].level + 1, Vec::new());
        }

        let mut reuse = Some(child_id);
        let mut split = false;
        for piece in pieces {
            let can_merge = node.level > piece.level && !node.children().is_empty();
            if piece.underflows(self.disk.min()) && can_merge {
                self.stats.subtree_merges += 1;
                split |= self.merge_subtree(node, piece)?;
            } else {
                self.stats.subtree_insertions += 1;
                let level = piece.level;
                let entry = self.disk.store_piece(piece, reuse.take())?;
                split |= self.insert_subtree(node, entry, level)?;
            }
        }
        if let Some(id) = reuse {
            self.disk.free(id)?;
        }
        Ok(split)
    }

    /// Attach `entry`, the root of a subtree at `level`, below `node`.
    fn insert_subtree(&mut self, node: &mut Node<E>, entry: ChildEntry, level: usize) -> Result<bool> {
        if node.level == level + 1 {
            node.attach_children([entry]);
            return Ok(false);
        }
        let target = self.detach_target(node, level, &entry.bbox)?;
        let mut child = self.disk.load(target.id)?;
        let below = self.insert_subtree(&mut child, entry, level)?;
        let split = self.replace_child(node, target.id, child)?;
        Ok(below || split)
    }

    /// Splice the entries of an underflowing `subtree` into the node on its
    /// level that `choose_subtree` selects below `node`.
    fn merge_subtree(&mut self, node: &mut Node<E>, subtree: Node<E>) -> Result<bool> {
        let bbox = subtree.bbox().ok_or_else(|| {
            RRTreeError::CorruptTree("merging an empty subtree".to_string())
        })?;
        let target = self.detach_target(node, subtree.level, &bbox)?;
        let mut child = self.disk.load(target.id)?;
        let below = if child.level == subtree.level {
            child.append(subtree);
            false
        } else {
            self.merge_subtree(&mut child, subtree)?
        };
        let split = self.replace_child(node, target.id, child)?;
        Ok(below || split)
    }

    fn detach_target(
        &mut self,
        node: &mut Node<E>,
        level: usize,
        bbox: &BoundingBox,
    ) -> Result<ChildEntry> {
        if node.level <= level || node.children().is_empty() {
            return Err(RRTreeError::CorruptTree(format!(
                "cannot descend from a level {} node with {} children towards level {}",
                node.level,
                node.len(),
                level
            )));
        }
        let position = choose_subtree(node.children(), bbox);
        node.detach_child(position)
            .ok_or_else(|| RRTreeError::CorruptTree("chosen child vanished".to_string()))
    }

    /// Split `child`, store it under `id` and attach the pieces to `node`.
    fn replace_child(&mut self, node: &mut Node<E>, id: NodeId, child: Node<E>) -> Result<bool> {
        let pieces = self.split(child);
        let split = pieces.len() > 1;
        let entries = self.disk.store_nodes(pieces, Some(id))?;
        node.attach_children(entries);
        Ok(split)
    }

    fn split(&mut self, node: Node<E>) -> Vec<Node<E>> {
        let pieces = self.disk.split(node);
        if pieces.len() > 1 {
            self.stats.splits += 1;
        }
        pieces
    }

    /// Elide single-child index nodes and split overflowing ones.
    fn finish_group_update(&mut self, node: Node<E>) -> Result<Vec<Node<E>>> {
        let mut node = node;
        while !node.is_leaf() && node.len() == 1 {
            let only = node.children()[0].id;
            node = self.disk.load(only)?;
            self.disk.free(only)?;
            self.stats.elided_nodes += 1;
        }
        if node.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.split(node))
    }

    fn update_leaf_node(&mut self, node: Node<E>, ops: OperationGroup<E>) -> Result<Vec<Node<E>>> {
        self.stats.leaf_updates += 1;
        let mut node = node;
        let representation = self.config.representation;
        let Some(entries) = node.operations_mut() else {
            return Err(RRTreeError::CorruptTree(
                "leaf update on an index node".to_string(),
            ));
        };

        let mut completed = Vec::with_capacity(ops.len());
        let mut leftovers = Vec::new();
        for op in ops {
            if self.tracer.is_enabled() {
                self.tracer.trace(TraceEvent::UpdateLeafNode, &op.data);
            }
            if representation.execute(entries, &op) {
                completed.push(op);
            } else {
                leftovers.push(op);
            }
        }

        if self.config.leaf_piggybacking && !entries.is_empty() {
            let piggybacker = LeafPiggybacker {
                allow_reorganization: true,
                epsilon: self.config.piggyback_epsilon,
                min: self.disk.min(),
                max: self.disk.max(),
                representation,
            };
            let mut info = LeafPiggybackingInfo::default();
            let executed = piggybacker.piggyback(entries, &mut self.buffer, &mut info);
            self.stats.leaf_piggybacked += executed.len() as u64;
            if self.tracer.is_enabled() {
                for op in &executed {
                    self.tracer.trace(TraceEvent::LeafNodePiggybacking, &op.data);
                }
            }
            completed.extend(executed);
        }

        for op in completed {
            self.complete_operation(op);
        }
        for op in leftovers {
            self.put_op_back(op);
        }
        self.finish_group_update(node)
    }

    fn complete_operation(&mut self, op: Operation<E>) {
        if op.is_insertion() {
            self.stats.completed_insertions += 1;
        } else {
            self.stats.completed_deletions += 1;
            if let Some(done) = &mut self.completed_deletions {
                done.insert(op.clone());
            }
        }
        self.buffer.remove_exact_entry(&op);
        if let Some(birth) = self.births.remove(&op) {
            let lifetime = self.stats.emptyings.saturating_sub(birth + 1);
            self.stats.operation_lifetimes.record(lifetime as usize);
        }
        self.trace(TraceEvent::CompleteOperation, &op.data);
    }

    fn put_op_back(&mut self, op: Operation<E>) {
        if op.is_deletion()
            && self
                .completed_deletions
                .as_ref()
                .is_some_and(|done| done.contains(&op))
        {
            return;
        }
        self.trace(TraceEvent::PutBackToBuffer, &op.data);
        if self.buffer.add_entry_if_not_exists(op) {
            self.stats.put_backs += 1;
        }
    }
}

/// Data whose insertions outnumber its deletions among `ops`, in order of
/// first appearance.
fn live_data<E: SpatialData>(ops: impl IntoIterator<Item = Operation<E>>) -> Vec<E> {
    let mut balance: FxHashMap<E, i64> = FxHashMap::default();
    let mut order = Vec::new();
    for op in ops {
        let delta = if op.is_insertion() { 1 } else { -1 };
        match balance.entry(op.data) {
            Entry::Occupied(mut entry) => *entry.get_mut() += delta,
            Entry::Vacant(entry) => {
                order.push(entry.key().clone());
                entry.insert(delta);
            }
        }
    }
    order
        .into_iter()
        .filter(|data| balance.get(data).is_some_and(|count| *count > 0))
        .collect()
}
