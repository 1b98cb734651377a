// Axis-aligned bounding boxes used by the broad phase and queries.

use crate::math::vec2::Vec2;

/// An axis-aligned bounding box given by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    /// Creates a box from two corners in any order.
    pub fn new(min: Vec2, max: Vec2) -> Self {
        AABB {
            min: Vec2::new(min.x.min(max.x), min.y.min(max.y)),
            max: Vec2::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    /// Box centered on `center` with half-extents `hw`, `hh`.
    pub fn for_extents(center: Vec2, hw: f64, hh: f64) -> Self {
        AABB {
            min: Vec2::new(center.x - hw, center.y - hh),
            max: Vec2::new(center.x + hw, center.y + hh),
        }
    }

    pub fn for_circle(center: Vec2, radius: f64) -> Self {
        Self::for_extents(center, radius, radius)
    }

    /// Smallest box containing all `points`.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bb = AABB {
            min: *first,
            max: *first,
        };
        for point in rest {
            bb = bb.expand(*point);
        }
        Some(bb)
    }

    /// Strict overlap test, touching edges do not count.
    pub fn overlaps(&self, other: &AABB) -> bool {
        self.max.x > other.min.x
            && self.min.x < other.max.x
            && self.max.y > other.min.y
            && self.min.y < other.max.y
    }

    /// Closed-interval overlap test, touching edges count.
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.max.x >= other.max.x
            && self.min.y <= other.min.y
            && self.max.y >= other.max.y
    }

    pub fn contains_point(&self, p: Vec2) -> bool {
        self.min.x <= p.x && self.max.x >= p.x && self.min.y <= p.y && self.max.y >= p.y
    }

    /// Grows this box in place to also cover `other`.
    pub fn merge(&mut self, other: &AABB) {
        *self = self.merged(other);
    }

    pub fn merged(&self, other: &AABB) -> AABB {
        AABB {
            min: Vec2::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Vec2::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Smallest box containing `self` and the point `p`.
    pub fn expand(&self, p: Vec2) -> AABB {
        AABB {
            min: Vec2::new(self.min.x.min(p.x), self.min.y.min(p.y)),
            max: Vec2::new(self.max.x.max(p.x), self.max.y.max(p.y)),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn area(&self) -> f64 {
        (self.max.x - self.min.x) * (self.max.y - self.min.y)
    }

    /// Area of the union box of `self` and `other`.
    pub fn merged_area(&self, other: &AABB) -> f64 {
        self.merged(other).area()
    }

    /// Manhattan distance between the two box centers, times two. Used
    /// to break insertion-cost ties in the tree.
    pub fn proximity(&self, other: &AABB) -> f64 {
        (self.min.x + self.max.x - other.min.x - other.max.x).abs()
            + (self.min.y + self.max.y - other.min.y - other.max.y).abs()
    }

    /// Fraction along `a -> b` where the segment enters the box, or
    /// infinity if it misses.
    pub fn segment_query(&self, a: Vec2, b: Vec2) -> f64 {
        let delta = b - a;
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;

        if delta.x == 0.0 {
            if a.x < self.min.x || self.max.x < a.x {
                return f64::INFINITY;
            }
        } else {
            let t1 = (self.min.x - a.x) / delta.x;
            let t2 = (self.max.x - a.x) / delta.x;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }

        if delta.y == 0.0 {
            if a.y < self.min.y || self.max.y < a.y {
                return f64::INFINITY;
            }
        } else {
            let t1 = (self.min.y - a.y) / delta.y;
            let t2 = (self.max.y - a.y) / delta.y;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }

        if t_min <= t_max && 0.0 <= t_max && t_min <= 1.0 {
            t_min.max(0.0)
        } else {
            f64::INFINITY
        }
    }

    pub fn intersects_segment(&self, a: Vec2, b: Vec2) -> bool {
        self.segment_query(a, b) != f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    fn unit_box() -> AABB {
        AABB::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0))
    }

    #[test]
    fn test_aabb_overlap_vs_intersect_on_touching_edges() {
        let a = unit_box();
        let b = AABB::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        assert!(!a.overlaps(&b));
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_aabb_contains_and_merge() {
        let a = unit_box();
        let inner = AABB::new(Vec2::new(0.25, 0.25), Vec2::new(0.5, 0.5));
        assert!(a.contains(&inner));
        assert!(!inner.contains(&a));

        let far = AABB::new(Vec2::new(3.0, 3.0), Vec2::new(4.0, 4.0));
        let merged = a.merged(&far);
        assert_eq!(merged.min, Vec2::new(0.0, 0.0));
        assert_eq!(merged.max, Vec2::new(4.0, 4.0));
        assert!((a.merged_area(&far) - 16.0).abs() < EPSILON);
    }

    #[test]
    fn test_aabb_segment_query() {
        let a = unit_box();
        let t = a.segment_query(Vec2::new(-1.0, 0.5), Vec2::new(3.0, 0.5));
        assert!((t - 0.25).abs() < EPSILON);
        // Starting inside reports zero.
        assert_eq!(a.segment_query(Vec2::new(0.5, 0.5), Vec2::new(5.0, 5.0)), 0.0);
        assert_eq!(
            a.segment_query(Vec2::new(-1.0, 2.0), Vec2::new(3.0, 2.0)),
            f64::INFINITY
        );
        assert!(!a.intersects_segment(Vec2::new(-3.0, 0.5), Vec2::new(-2.0, 0.5)));
    }

    #[test]
    fn test_aabb_from_points() {
        let bb = AABB::from_points(&[Vec2::new(1.0, -1.0), Vec2::new(-2.0, 4.0)]).unwrap();
        assert_eq!(bb.min, Vec2::new(-2.0, -1.0));
        assert_eq!(bb.max, Vec2::new(1.0, 4.0));
        assert!(AABB::from_points(&[]).is_none());
    }
}
