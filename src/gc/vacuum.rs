use super::{GcReport, walk};
use crate::buffer::Buffer;
use crate::disk::{DiskTree, NodeId, RootEntry};
use crate::error::Result;
use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::Operation;
use crate::piggyback::{LeafPiggybacker, LeafPiggybackingInfo};
use crate::storage::{IndexNodeCache, NodeContainer};
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;

/// Annihilate insertion/deletion pairs in place and fold buffered
/// operations into the visited leaves.
///
/// Each leaf is paired with the not yet visited leaves its box intersects.
/// No leaf is shrunk below the minimum fill, so the tree shape is kept and
/// only bounding boxes are refreshed. Returns the buffered operations that
/// were applied.
pub(crate) fn vacuum<E, C>(
    disk: &mut DiskTree<E, C>,
    buffer: &mut Buffer<E>,
    piggybacker: &LeafPiggybacker,
    cache_size: NonZeroUsize,
) -> Result<(GcReport, Vec<Operation<E>>)>
where
    E: SpatialData,
    C: NodeContainer<E>,
{
    let mut cache = IndexNodeCache::new(cache_size);
    let walk = walk(disk, &mut cache)?;
    let mut report = GcReport {
        old_leaf_nodes: walk.leaves.len(),
        old_index_nodes: walk.index_nodes.len(),
        new_leaf_nodes: walk.leaves.len(),
        new_index_nodes: walk.index_nodes.len(),
        ..GcReport::default()
    };
    let Some(root) = disk.root() else {
        return Ok((report, Vec::new()));
    };
    let root_is_leaf = root.level == 0;
    let min = if root_is_leaf { 0 } else { disk.min() };
    let piggybacker = LeafPiggybacker { min, ..*piggybacker };

    let mut boxes: FxHashMap<NodeId, BoundingBox> = FxHashMap::default();
    let mut executed = Vec::new();
    for (position, leaf) in walk.leaves.iter().enumerate() {
        let leaf_box = boxes.get(&leaf.id).copied().unwrap_or(leaf.bbox);
        let mut node = disk.load(leaf.id)?;
        let Some(entries) = node.operations_mut() else {
            continue;
        };
        let mut changed = false;

        let pairs = annihilate_within(entries, min);
        report.annihilated_pairs += pairs;
        changed |= pairs > 0;

        let mut partners = Vec::new();
        for other in &walk.leaves[position + 1..] {
            let other_box = boxes.get(&other.id).copied().unwrap_or(other.bbox);
            if other_box.intersects(&leaf_box) {
                partners.push((other.id, disk.load(other.id)?));
            }
        }
        report.peak_leaves_resident = report.peak_leaves_resident.max(partners.len() + 1);
        for (other_id, mut other) in partners {
            let Some(other_entries) = other.operations_mut() else {
                continue;
            };
            let pairs = annihilate_across(entries, other_entries, min);
            if pairs > 0 {
                report.annihilated_pairs += pairs;
                report.vacuumed_leaves += 1;
                changed = true;
                let entry = disk.write(other_id, other)?;
                boxes.insert(other_id, entry.bbox);
            }
        }

        let mut info = LeafPiggybackingInfo::default();
        let applied = piggybacker.piggyback(entries, buffer, &mut info);
        report.piggybacked_ops += applied.len();
        changed |= !applied.is_empty();
        executed.extend(applied);

        if !changed {
            continue;
        }
        report.vacuumed_leaves += 1;
        if root_is_leaf && node.is_empty() {
            disk.free(leaf.id)?;
            disk.set_root(None);
            report.new_leaf_nodes = 0;
            continue;
        }
        let entry = disk.write(leaf.id, node)?;
        boxes.insert(leaf.id, entry.bbox);
    }

    // Parents follow their children in reverse visit order.
    for (id, children) in walk.index_nodes.iter().rev() {
        if !children.iter().any(|child| boxes.contains_key(child)) {
            continue;
        }
        let mut node = cache.get_or_load(*id, disk.container_mut())?;
        if let Some(entries) = node.children_mut() {
            for entry in entries.iter_mut() {
                if let Some(bbox) = boxes.get(&entry.id) {
                    entry.bbox = *bbox;
                }
            }
        }
        cache.invalidate(*id);
        let entry = disk.write(*id, node)?;
        boxes.insert(*id, entry.bbox);
    }
    if let Some(root) = disk.root()
        && let Some(bbox) = boxes.get(&root.id)
    {
        disk.set_root(Some(RootEntry {
            bbox: *bbox,
            ..root
        }));
    }

    report.cache_hits = cache.hits();
    report.cache_misses = cache.misses();
    Ok((report, executed))
}

fn annihilate_within<E: SpatialData>(entries: &mut Vec<Operation<E>>, min: usize) -> usize {
    let mut pairs = 0;
    let mut i = 0;
    while i < entries.len() && entries.len() >= min + 2 {
        let opposite = entries[i].opposite();
        match entries[i + 1..].iter().position(|op| *op == opposite) {
            Some(offset) => {
                entries.swap_remove(i + 1 + offset);
                entries.swap_remove(i);
                pairs += 1;
            }
            None => i += 1,
        }
    }
    pairs
}

fn annihilate_across<E: SpatialData>(
    a: &mut Vec<Operation<E>>,
    b: &mut Vec<Operation<E>>,
    min: usize,
) -> usize {
    let mut pairs = 0;
    let mut i = 0;
    while i < a.len() && a.len() > min && b.len() > min {
        let opposite = a[i].opposite();
        match b.iter().position(|op| *op == opposite) {
            Some(position) => {
                b.swap_remove(position);
                a.swap_remove(i);
                pairs += 1;
            }
            None => i += 1,
        }
    }
    pairs
}
