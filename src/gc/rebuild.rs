use super::{GcReport, walk};
use crate::disk::{ChildEntry, DiskTree, Node, RootEntry};
use crate::error::Result;
use crate::geometry::SpatialData;
use crate::hilbert::sort_by_hilbert;
use crate::operation::Operation;
use crate::storage::{IndexNodeCache, NodeContainer};
use crate::trace::{ObjectTracer, TraceEvent};
use log::warn;
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;

/// Share of the node capacity filled by bulk loading.
const FILL_FACTOR: f64 = 0.8;

/// Replace the tree with a bulk-loaded one holding only live data.
///
/// Insertions and deletions of equal data cancel out. A deletion left
/// without insertion, and extra copies of the same data, are dropped.
pub(crate) fn rebuild<E, C>(
    disk: &mut DiskTree<E, C>,
    cache_size: NonZeroUsize,
    tracer: &mut dyn ObjectTracer<E>,
) -> Result<GcReport>
where
    E: SpatialData,
    C: NodeContainer<E>,
{
    let start = disk.container().stats();
    let mut cache = IndexNodeCache::new(cache_size);
    let walk = walk(disk, &mut cache)?;
    let mut report = GcReport {
        old_leaf_nodes: walk.leaves.len(),
        old_index_nodes: walk.index_nodes.len(),
        ..GcReport::default()
    };

    let mut counts: FxHashMap<E, (usize, usize)> = FxHashMap::default();
    let mut order = Vec::new();
    for leaf in &walk.leaves {
        let node = disk.load(leaf.id)?;
        for op in node.operations() {
            if tracer.is_enabled() {
                tracer.trace(TraceEvent::GcRebuildLoad, &op.data);
            }
            let (insertions, deletions) = counts.entry(op.data.clone()).or_insert_with(|| {
                order.push(op.data.clone());
                (0, 0)
            });
            if op.is_insertion() {
                *insertions += 1;
            } else {
                *deletions += 1;
            }
        }
    }

    let mut live = Vec::with_capacity(order.len());
    for data in order {
        let Some(&(insertions, deletions)) = counts.get(&data) else {
            continue;
        };
        report.annihilated_pairs += insertions.min(deletions);
        if deletions > insertions {
            report.dropped_tombstones += deletions - insertions;
        } else if insertions > deletions {
            report.collapsed_duplicates += insertions - deletions - 1;
            live.push(data);
        }
    }
    if report.dropped_tombstones > 0 {
        warn!(
            "rebuild dropped {} tombstones without matching data",
            report.dropped_tombstones
        );
    }
    if report.collapsed_duplicates > 0 {
        warn!(
            "rebuild collapsed {} duplicate data copies",
            report.collapsed_duplicates
        );
    }
    sort_by_hilbert(&mut live);

    let old_nodes = walk
        .leaves
        .iter()
        .map(|leaf| leaf.id)
        .chain(walk.index_nodes.iter().map(|(id, _)| *id));
    for id in old_nodes {
        cache.invalidate(id);
        disk.free(id)?;
    }
    disk.set_root(None);
    let clearing = disk.container().stats().since(&start);
    report.clearing_gets = clearing.gets;
    report.clearing_removes = clearing.removes;
    report.cache_hits = cache.hits();
    report.cache_misses = cache.misses();

    bulk_load(disk, live, tracer, &mut report)?;
    Ok(report)
}

/// Pack sorted data bottom-up into evenly filled nodes.
fn bulk_load<E, C>(
    disk: &mut DiskTree<E, C>,
    items: Vec<E>,
    tracer: &mut dyn ObjectTracer<E>,
    report: &mut GcReport,
) -> Result<()>
where
    E: SpatialData,
    C: NodeContainer<E>,
{
    let (min, max) = (disk.min(), disk.max());
    let mut level_entries: Vec<ChildEntry> = Vec::new();
    let sizes = chunk_sizes(items.len(), min, max);
    let mut ops = items.into_iter().map(Operation::insertion);
    for size in sizes {
        let chunk: Vec<Operation<E>> = ops.by_ref().take(size).collect();
        if tracer.is_enabled() {
            for op in &chunk {
                tracer.trace(TraceEvent::GcRebuildWrite, &op.data);
            }
        }
        level_entries.push(disk.store_piece(Node::new_leaf(chunk), None)?);
    }
    report.new_leaf_nodes = level_entries.len();

    let mut level = 0;
    while level_entries.len() > 1 {
        level += 1;
        let sizes = chunk_sizes(level_entries.len(), min, max);
        let mut entries = level_entries.into_iter();
        let mut next = Vec::with_capacity(sizes.len());
        for size in sizes {
            let chunk: Vec<ChildEntry> = entries.by_ref().take(size).collect();
            next.push(disk.store_piece(Node::new_index(level, chunk), None)?);
        }
        report.new_index_nodes += next.len();
        level_entries = next;
    }

    if let Some(root) = level_entries.pop() {
        disk.set_root(Some(RootEntry {
            id: root.id,
            level,
            bbox: root.bbox,
        }));
    }
    Ok(())
}

/// Sizes of the nodes holding `n` entries: filled to about `FILL_FACTOR`
/// and evenly distributed so that none but a lone root falls below `min`.
fn chunk_sizes(n: usize, min: usize, max: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let target = ((max as f64 * FILL_FACTOR).ceil() as usize).clamp(1, max);
    let mut count = n.div_ceil(target);
    if count > 1 && n / count < min {
        count = n.div_ceil(max);
    }
    let base = n / count;
    let extra = n % count;
    (0..count).map(|i| base + usize::from(i < extra)).collect()
}
