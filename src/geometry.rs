//! Bounding-box descriptors and the data contract of indexed items.
//!
//! Every item stored in an [`RRTree`](crate::RRTree) exposes a
//! [`BoundingBox`] through [`SpatialData`]. The box is a thin wrapper around
//! `geo::Rect` with the set of predicates the R-tree algorithms need: union,
//! containment, intersection, area, margin, enlargement and overlap.

use geo::{Point, Rect};
use rstar::AABB;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

/// A 2D axis-aligned bounding box.
///
/// Equality and hashing are defined over the raw bit patterns of the
/// corners, so boxes can be used inside hashed data items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The underlying geometric rectangle
    pub rect: Rect<f64>,
}

impl BoundingBox {
    /// Create a new bounding box from minimum and maximum coordinates.
    ///
    /// Corners are normalized, so swapped coordinates produce the same box.
    ///
    /// # Examples
    ///
    /// ```
    /// use rrtree::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
    /// assert_eq!(bbox.area(), 2.0);
    /// ```
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            ),
        }
    }

    /// Create a bounding box from a `geo::Rect`.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self { rect }
    }

    /// Degenerate box covering a single point.
    pub fn from_point(point: Point<f64>) -> Self {
        Self::new(point.x(), point.y(), point.x(), point.y())
    }

    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }

    /// Get the center point of the bounding box.
    pub fn center(&self) -> Point<f64> {
        Point::new(
            (self.min_x() + self.max_x()) / 2.0,
            (self.min_y() + self.max_y()) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    pub fn height(&self) -> f64 {
        self.max_y() - self.min_y()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Half perimeter, the R*-tree margin measure.
    pub fn margin(&self) -> f64 {
        self.width() + self.height()
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x().min(other.min_x()),
            self.min_y().min(other.min_y()),
            self.max_x().max(other.max_x()),
            self.max_y().max(other.max_y()),
        )
    }

    /// Union of all boxes in the iterator, `None` when it is empty.
    pub fn union_all<I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        boxes
            .into_iter()
            .reduce(|acc, bbox| acc.union(&bbox))
    }

    /// Check if `other` lies completely inside this box (boundaries included).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x() <= other.min_x()
            && self.min_y() <= other.min_y()
            && self.max_x() >= other.max_x()
            && self.max_y() >= other.max_y()
    }

    /// Check if a point is contained within this bounding box.
    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        point.x() >= self.min_x()
            && point.x() <= self.max_x()
            && point.y() >= self.min_y()
            && point.y() <= self.max_y()
    }

    /// Check if this bounding box intersects with another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x() < other.min_x()
            || self.min_x() > other.max_x()
            || self.max_y() < other.min_y()
            || self.min_y() > other.max_y())
    }

    /// Area growth needed for this box to also cover `other`.
    pub fn enlargement(&self, other: &BoundingBox) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Area of the intersection, zero when the boxes are disjoint.
    pub fn overlap_area(&self, other: &BoundingBox) -> f64 {
        let width = self.max_x().min(other.max_x()) - self.min_x().max(other.min_x());
        let height = self.max_y().min(other.max_y()) - self.min_y().max(other.min_y());
        if width <= 0.0 || height <= 0.0 {
            0.0
        } else {
            width * height
        }
    }

    /// Grow every side length by `epsilon` times its length, keeping the center.
    ///
    /// Used to widen the piggybacking area around a group of operations.
    pub fn expand_relative(&self, epsilon: f64) -> BoundingBox {
        let center = self.center();
        let half_width = self.width() * (1.0 + epsilon) / 2.0;
        let half_height = self.height() * (1.0 + epsilon) / 2.0;
        BoundingBox::new(
            center.x() - half_width,
            center.y() - half_height,
            center.x() + half_width,
            center.y() + half_height,
        )
    }

    /// Convert to an rstar envelope.
    pub fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x(), self.min_y()], [self.max_x(), self.max_y()])
    }

    fn bits(&self) -> [u64; 4] {
        [
            self.min_x().to_bits(),
            self.min_y().to_bits(),
            self.max_x().to_bits(),
            self.max_y().to_bits(),
        ]
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::from_rect(rect)
    }
}

impl From<BoundingBox> for AABB<[f64; 2]> {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_aabb()
    }
}

/// Data that can be indexed by the RR-tree.
///
/// Two items annihilate each other when they are equal and carry opposite
/// operation kinds, so `Eq` and `Hash` must identify an item uniquely.
pub trait SpatialData: Clone + Eq + Hash + Debug + 'static {
    /// Bounding box used for routing, queries and splitting.
    fn bbox(&self) -> BoundingBox;
}

/// A ready-made data item: an identifier with its bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialItem {
    /// Unique identifier for this object
    pub id: u64,
    /// Extent of the object
    pub bbox: BoundingBox,
}

impl SpatialItem {
    pub fn new(id: u64, bbox: BoundingBox) -> Self {
        Self { id, bbox }
    }

    /// Create an item covering a single point.
    pub fn from_point(id: u64, point: Point<f64>) -> Self {
        Self::new(id, BoundingBox::from_point(point))
    }
}

impl SpatialData for SpatialItem {
    fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_containment() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(2.0, 2.0, 3.0, 4.0);
        let u = a.union(&b);

        assert_eq!(u, BoundingBox::new(0.0, 0.0, 3.0, 4.0));
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert!(!a.contains(&u));
        assert!(a.contains(&a));
    }

    #[test]
    fn test_intersection_predicates() {
        let a = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BoundingBox::new(1.0, 1.0, 3.0, 3.0);
        let touching = BoundingBox::new(2.0, 0.0, 4.0, 2.0);
        let far = BoundingBox::new(10.0, 10.0, 11.0, 11.0);

        assert!(a.intersects(&b));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&far));
        assert_eq!(a.overlap_area(&b), 1.0);
        assert_eq!(a.overlap_area(&touching), 0.0);
        assert_eq!(a.enlargement(&b), 5.0);
    }

    #[test]
    fn test_expand_relative_keeps_center() {
        let bbox = BoundingBox::new(-3.0, -1.0, -1.0, 1.0);
        let expanded = bbox.expand_relative(0.5);

        assert_eq!(expanded.center(), bbox.center());
        assert_eq!(expanded.width(), 3.0);
        assert_eq!(expanded.height(), 3.0);
        assert_eq!(bbox.expand_relative(0.0), bbox);
    }

    #[test]
    fn test_normalized_corners_and_equality() {
        let a = BoundingBox::new(1.0, 1.0, 0.0, 0.0);
        let b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(a, b);
        assert_eq!(BoundingBox::union_all(Vec::new()), None);
        assert_eq!(BoundingBox::union_all(vec![a, b]), Some(b));
    }

    #[test]
    fn test_spatial_item_point() {
        let item = SpatialItem::from_point(7, Point::new(1.5, -2.0));
        assert_eq!(item.bbox().area(), 0.0);
        assert!(item.bbox().contains_point(&Point::new(1.5, -2.0)));
    }
}
