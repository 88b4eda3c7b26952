//! Overflow resolution for nodes that received many entries at once.

use super::node::{Node, NodeEntries};
use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::Operation;

/// Splits an overflowing node into pieces that each respect the fan-out.
pub trait GroupSplitter<E: SpatialData> {
    /// Returns the node itself when it does not overflow, otherwise two or
    /// more pieces of the same level, each holding between min and max
    /// entries.
    fn group_split(&self, node: Node<E>) -> Vec<Node<E>>;
}

/// Applies R*-style two-way splits on a worklist until no piece overflows.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveTwoWaySplitter {
    min: usize,
    max: usize,
}

impl RecursiveTwoWaySplitter {
    /// # Panics
    ///
    /// Panics unless `1 <= min <= max / 2`.
    pub fn new(min: usize, max: usize) -> Self {
        assert!(min >= 1 && min * 2 <= max, "invalid fan-out bounds {min}..{max}");
        Self { min, max }
    }

    fn split_once<E: SpatialData>(&self, node: Node<E>) -> (Node<E>, Node<E>) {
        let level = node.level;
        match node.entries {
            NodeEntries::Leaf(ops) => {
                let (a, b) = two_way_split(ops, Operation::bbox, self.min);
                (Node::new_leaf(a), Node::new_leaf(b))
            }
            NodeEntries::Index(children) => {
                let (a, b) = two_way_split(children, |c| c.bbox, self.min);
                (Node::new_index(level, a), Node::new_index(level, b))
            }
        }
    }
}

impl<E: SpatialData> GroupSplitter<E> for RecursiveTwoWaySplitter {
    fn group_split(&self, node: Node<E>) -> Vec<Node<E>> {
        let mut pending = vec![node];
        let mut done = Vec::new();
        while let Some(node) = pending.pop() {
            if node.overflows(self.max) {
                let (a, b) = self.split_once(node);
                pending.push(a);
                pending.push(b);
            } else {
                done.push(node);
            }
        }
        done
    }
}

struct Distribution {
    sorted: usize,
    split_at: usize,
    overlap: f64,
    area: f64,
}

/// One R* split: choose the axis with the smallest margin sum, then the
/// distribution with the least overlap, ties broken by total area.
fn two_way_split<T, F>(entries: Vec<T>, bbox_of: F, min: usize) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> BoundingBox,
{
    let boxes: Vec<BoundingBox> = entries.iter().map(&bbox_of).collect();
    let n = boxes.len();
    debug_assert!(n >= 2 * min, "not enough entries to split");

    let mut best_axis: Option<(f64, Vec<Vec<usize>>)> = None;
    for axis in 0..2 {
        let orders = sorted_orders(&boxes, axis);
        let margin: f64 = orders
            .iter()
            .map(|order| {
                (min..=n - min)
                    .map(|k| {
                        let (a, b) = group_boxes(&boxes, order, k);
                        a.margin() + b.margin()
                    })
                    .sum::<f64>()
            })
            .sum();
        if best_axis.as_ref().is_none_or(|(best, _)| margin < *best) {
            best_axis = Some((margin, orders));
        }
    }
    let orders = best_axis.map(|(_, orders)| orders).unwrap_or_default();

    let mut best: Option<Distribution> = None;
    for (sorted, order) in orders.iter().enumerate() {
        for split_at in min..=n - min {
            let (a, b) = group_boxes(&boxes, order, split_at);
            let candidate = Distribution {
                sorted,
                split_at,
                overlap: a.overlap_area(&b),
                area: a.area() + b.area(),
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.overlap < current.overlap
                        || (candidate.overlap == current.overlap
                            && (candidate.area < current.area
                                || (candidate.area == current.area
                                    && imbalance(candidate.split_at, n)
                                        < imbalance(current.split_at, n))))
                }
            };
            if better {
                best = Some(candidate);
            }
        }
    }

    let Some(choice) = best else {
        let mut first = entries;
        let second = first.split_off(n / 2);
        return (first, second);
    };

    let order = &orders[choice.sorted];
    let mut in_first = vec![false; n];
    for &position in &order[..choice.split_at] {
        in_first[position] = true;
    }
    let mut first = Vec::with_capacity(choice.split_at);
    let mut second = Vec::with_capacity(n - choice.split_at);
    for (position, entry) in entries.into_iter().enumerate() {
        if in_first[position] {
            first.push(entry);
        } else {
            second.push(entry);
        }
    }
    (first, second)
}

fn imbalance(split_at: usize, n: usize) -> usize {
    split_at.abs_diff(n - split_at)
}

/// Entry orders along `axis`: by lower bound, and by upper bound.
fn sorted_orders(boxes: &[BoundingBox], axis: usize) -> Vec<Vec<usize>> {
    let lower = |b: &BoundingBox| if axis == 0 { b.min_x() } else { b.min_y() };
    let upper = |b: &BoundingBox| if axis == 0 { b.max_x() } else { b.max_y() };

    let mut by_lower: Vec<usize> = (0..boxes.len()).collect();
    by_lower.sort_by(|&a, &b| {
        lower(&boxes[a])
            .total_cmp(&lower(&boxes[b]))
            .then_with(|| upper(&boxes[a]).total_cmp(&upper(&boxes[b])))
    });
    let mut by_upper: Vec<usize> = (0..boxes.len()).collect();
    by_upper.sort_by(|&a, &b| {
        upper(&boxes[a])
            .total_cmp(&upper(&boxes[b]))
            .then_with(|| lower(&boxes[a]).total_cmp(&lower(&boxes[b])))
    });
    vec![by_lower, by_upper]
}

fn group_boxes(boxes: &[BoundingBox], order: &[usize], split_at: usize) -> (BoundingBox, BoundingBox) {
    let cover = |positions: &[usize]| {
        BoundingBox::union_all(positions.iter().map(|&p| boxes[p]))
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    };
    (cover(&order[..split_at]), cover(&order[split_at..]))
}
