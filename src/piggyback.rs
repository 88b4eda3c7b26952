//! Folding nearby buffered operations into a leaf that is being written anyway.

use crate::buffer::Buffer;
use crate::disk::{DiskRepresentation, LeafEffect};
use crate::geometry::{BoundingBox, SpatialData};
use crate::operation::Operation;

/// Candidate counts of one leaf visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafPiggybackingInfo {
    /// Candidates that add an entry
    pub increasing: usize,
    /// Candidates that annihilate an entry
    pub decreasing: usize,
    /// Candidates turned away to keep the leaf within its fan-out bounds
    pub refused: usize,
}

/// Selects and executes buffered operations on a leaf.
///
/// Without reorganization the leaf must stay within `min..=max` entries and
/// its box may not grow. With reorganization the leaf may overflow (the
/// caller splits it) and the search area is widened by `epsilon`.
#[derive(Debug, Clone, Copy)]
pub struct LeafPiggybacker {
    pub allow_reorganization: bool,
    pub epsilon: f64,
    pub min: usize,
    pub max: usize,
    pub representation: DiskRepresentation,
}

impl LeafPiggybacker {
    /// Execute fitting buffered operations on `entries` and remove them from
    /// the buffer. Returns the executed operations.
    pub fn piggyback<E: SpatialData>(
        &self,
        entries: &mut Vec<Operation<E>>,
        buffer: &mut Buffer<E>,
        info: &mut LeafPiggybackingInfo,
    ) -> Vec<Operation<E>> {
        let Some(mut area) = BoundingBox::union_all(entries.iter().map(Operation::bbox)) else {
            return Vec::new();
        };
        if self.allow_reorganization && self.epsilon > 0.0 {
            area = area.expand_relative(self.epsilon);
        }

        let mut increasing = Vec::new();
        let mut decreasing = Vec::new();
        let mut neutral = Vec::new();
        for op in buffer.query_any_type(&area) {
            let effect = self.representation.effect(entries, &op);
            if !DiskRepresentation::fits(effect, &area, &op) {
                continue;
            }
            match effect {
                LeafEffect::Grow => increasing.push(op),
                LeafEffect::Shrink => decreasing.push(op),
                LeafEffect::Unchanged => neutral.push(op),
                LeafEffect::Blocked => {}
            }
        }
        info.increasing += increasing.len();
        info.decreasing += decreasing.len();

        if !self.allow_reorganization {
            self.limit(entries.len(), &mut increasing, &mut decreasing, info);
        }

        let mut executed = Vec::with_capacity(increasing.len() + decreasing.len() + neutral.len());
        for op in decreasing.into_iter().chain(increasing).chain(neutral) {
            if self.representation.execute(entries, &op) {
                buffer.remove_exact_entry(&op);
                executed.push(op);
            }
        }
        executed
    }

    fn limit<E: SpatialData>(
        &self,
        len: usize,
        increasing: &mut Vec<Operation<E>>,
        decreasing: &mut Vec<Operation<E>>,
        info: &mut LeafPiggybackingInfo,
    ) {
        let potential = len + increasing.len();
        let potential = potential.saturating_sub(decreasing.len());
        if potential > self.max {
            let allowed = increasing.len().saturating_sub(potential - self.max);
            info.refused += increasing.len() - allowed;
            increasing.truncate(allowed);
        } else if potential < self.min {
            let allowed = decreasing.len().saturating_sub(self.min - potential);
            info.refused += decreasing.len() - allowed;
            decreasing.truncate(allowed);
        }
    }
}
