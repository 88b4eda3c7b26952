//! Hilbert-curve ordering over raw IEEE-754 bit patterns.
//!
//! The comparator treats every `f64` coordinate as a very long fixed-point
//! number (sign, 2048 exponent positions and 52 mantissa bits) and walks the
//! Hilbert curve of the two coordinates from the most significant differing
//! position downwards. It needs no normalization of the data space and
//! orders negative, denormal and huge values consistently.
//!
//! The rebuild garbage collector uses [`compare_boxes`] to linearize the
//! surviving entries before bulk loading.

use crate::geometry::{BoundingBox, SpatialData};
use std::cmp::Ordering;

const IEEE_SIG_BITS: i32 = 52;
const IEEE_REP_BITS: i32 = (1 << 11) + IEEE_SIG_BITS;
const SIGNIFICAND_MASK: u64 = (1 << 52) - 1;

#[derive(Debug, Clone, Copy)]
struct CurveState {
    rotation: u32,
    bits: u64,
    index: u64,
}

fn sign_bit(value: f64) -> u64 {
    value.to_bits() >> 63
}

fn exponent(value: f64) -> i32 {
    ((value.to_bits() >> 52) & 0x7ff) as i32
}

fn sign_bits(point: [f64; 2]) -> u64 {
    sign_bit(point[0]) | (sign_bit(point[1]) << 1)
}

fn exponent_max(point: [f64; 2]) -> i32 {
    let max = exponent(point[0]).max(exponent(point[1]));
    if max != 0 { max - 1 } else { max }
}

/// Bit `y` of the expanded representation of `value`.
fn ieee_bit(value: f64, y: i32) -> u64 {
    let mut bit = sign_bit(value);
    let exponent = exponent(value);
    let normalized = i32::from(exponent != 0);
    let diff = y - (exponent - normalized);
    if diff <= IEEE_SIG_BITS {
        debug_assert!(diff >= 0, "bit position below the significand");
        let significand_bit = if diff < 0 {
            0
        } else if diff < IEEE_SIG_BITS {
            (value.to_bits() & SIGNIFICAND_MASK) >> diff
        } else {
            normalized as u64
        };
        bit ^= significand_bit & 1;
    } else if y == IEEE_REP_BITS - 1 {
        bit ^= 1;
    }
    bit
}

fn ieee_bits(point: [f64; 2], y: i32) -> u64 {
    ieee_bit(point[0], y) | (ieee_bit(point[1], y) << 1)
}

fn rotate_right(arg: u64, rotations: u32) -> u64 {
    ((arg >> rotations) | (arg << (2 - rotations))) & 3
}

fn adjust_rotation(rotation: u32, bits: u64) -> u32 {
    // rotation + 1 + ffs(bits) restricted to the lowest bit, modulo the dimension count
    (rotation + (bits & 1) as u32 + 1) % 2
}

fn initial_state(point: [f64; 2], y: i32) -> CurveState {
    let sign_bits = sign_bits(point);
    let sign_parity = (sign_bits ^ (sign_bits >> 1)) & 1;
    let least_zero_bit = i32::from(sign_bits & 1 != 0);
    let stray_bit = 1 - least_zero_bit;

    if y & 1 == 1 {
        let rotation = ((IEEE_REP_BITS - y + 1 + least_zero_bit) % 2) as u32;
        let bits = if y < IEEE_REP_BITS - 1 {
            sign_bits ^ (1 << ((rotation as i32 + stray_bit) % 2))
        } else {
            sign_bits ^ 2
        };
        CurveState {
            rotation,
            bits,
            index: sign_parity,
        }
    } else if y < IEEE_REP_BITS {
        let shift = (IEEE_REP_BITS - y + least_zero_bit) % 2;
        CurveState {
            rotation: ((shift + 2 + stray_bit) % 2) as u32,
            bits: sign_bits ^ (1 << shift),
            index: sign_parity ^ 1,
        }
    } else {
        CurveState {
            rotation: 0,
            bits: 1 << 1,
            index: 1,
        }
    }
}

fn compare_work(max: i32, mut y: i32, a: [f64; 2], b: [f64; 2], mut state: CurveState) -> Ordering {
    const WORD_BITS: u64 = 64;

    while y > max {
        y -= 1;
        let mut reflection = ieee_bits(a, y);
        let mut diff = reflection ^ ieee_bits(b, y);
        state.bits ^= reflection;
        state.bits = rotate_right(state.bits, state.rotation);
        if diff != 0 {
            diff = rotate_right(diff, state.rotation);
            state.index ^= state.index >> 1;
            state.bits ^= state.bits >> 1;
            diff ^= diff >> 1;
            let parity = (state.index ^ y as u64 ^ WORD_BITS) & 1;
            let ascending = u64::from(state.bits < (state.bits ^ diff));
            return if parity == ascending {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        state.index ^= state.bits;
        reflection ^= 1 << state.rotation;
        state.rotation = adjust_rotation(state.rotation, state.bits);
        state.bits = reflection;
    }
    Ordering::Equal
}

/// Compare two points by their position along the Hilbert curve.
///
/// Points whose coordinates differ only in the lowest significand bit
/// compare equal.
pub fn compare_points(a: [f64; 2], b: [f64; 2]) -> Ordering {
    let max = if sign_bits(a) != sign_bits(b) {
        2047
    } else {
        exponent_max(a).max(exponent_max(b))
    };
    let y = max + IEEE_SIG_BITS + 1;
    compare_work(max, y, a, b, initial_state(a, y))
}

/// Total order over boxes: Hilbert order of the centers, then corners.
pub fn compare_boxes(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    let ca = a.center();
    let cb = b.center();
    compare_points([ca.x(), ca.y()], [cb.x(), cb.y()])
        .then_with(|| a.min_x().total_cmp(&b.min_x()))
        .then_with(|| a.min_y().total_cmp(&b.min_y()))
        .then_with(|| a.max_x().total_cmp(&b.max_x()))
        .then_with(|| a.max_y().total_cmp(&b.max_y()))
}

/// Sort data items along the Hilbert curve of their bounding boxes.
pub fn sort_by_hilbert<E: SpatialData>(items: &mut [E]) {
    items.sort_by(|a, b| compare_boxes(&a.bbox(), &b.bbox()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points(side: usize) -> Vec<[f64; 2]> {
        let step = 1.0 / side as f64;
        let mut points = Vec::new();
        for i in 0..side {
            for j in 0..side {
                points.push([1.0 + i as f64 * step, 1.0 + j as f64 * step]);
            }
        }
        points
    }

    #[test]
    fn test_equal_points() {
        assert_eq!(compare_points([1.0, 2.0], [1.0, 2.0]), Ordering::Equal);
        assert_eq!(compare_points([0.0, 0.0], [0.0, 0.0]), Ordering::Equal);
    }

    #[test]
    fn test_antisymmetric() {
        let points = [
            [0.0, 0.0],
            [1.0, 0.5],
            [-3.0, 2.0],
            [1e-300, 7.5],
            [1e200, -1e200],
            [-0.25, -0.75],
        ];
        for a in points {
            for b in points {
                assert_eq!(compare_points(a, b), compare_points(b, a).reverse());
            }
        }
    }

    #[test]
    fn test_consecutive_grid_cells_are_adjacent() {
        let side = 4;
        let mut points = grid_points(side);
        points.sort_by(|a, b| compare_points(*a, *b));

        for pair in points.windows(2) {
            let dx = ((pair[0][0] - pair[1][0]) * side as f64).abs().round() as i64;
            let dy = ((pair[0][1] - pair[1][1]) * side as f64).abs().round() as i64;
            assert_eq!(dx + dy, 1, "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_sorting_is_transitive() {
        let mut points = grid_points(8);
        points.extend([[-1.0, 5.0], [3.0, -2.0], [-4.0, -4.0], [0.0, 0.0]]);
        points.sort_by(|a, b| compare_points(*a, *b));

        for i in 0..points.len() {
            for j in i + 1..points.len() {
                assert_ne!(compare_points(points[i], points[j]), Ordering::Greater);
            }
        }
    }

    #[test]
    fn test_box_order_breaks_ties() {
        let a = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BoundingBox::new(0.5, 0.5, 1.5, 1.5);
        assert_eq!(a.center(), b.center());
        assert_eq!(compare_boxes(&a, &b), Ordering::Less);
        assert_eq!(compare_boxes(&b, &a), Ordering::Greater);
        assert_eq!(compare_boxes(&a, &a), Ordering::Equal);
    }
}
