use crate::collision::AABB;
use crate::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

use super::circle::circle_segment_query;
use super::{PointQuery, SegmentQuery, MAGIC_EPSILON};

/// A segment from `a` to `b` with rounded caps of `radius`. Chained
/// segments record the direction to their neighbors so that contacts on
/// interior end caps can be discarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub a: Vec2,
    pub b: Vec2,
    pub radius: f64,
    /// Local normal, `rperp` of the direction `a -> b`.
    pub(crate) normal: Vec2,
    pub(crate) a_tangent: Vec2,
    pub(crate) b_tangent: Vec2,
    pub(crate) world_a: Vec2,
    pub(crate) world_b: Vec2,
    pub(crate) world_normal: Vec2,
    pub(crate) world_a_tangent: Vec2,
    pub(crate) world_b_tangent: Vec2,
}

impl LineSegment {
    pub fn new(a: Vec2, b: Vec2, radius: f64) -> Result<Self> {
        if !(radius >= 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidRadius(radius));
        }
        let mut normal = (b - a).normalize().rperp();
        if normal == Vec2::ZERO {
            // Zero-length segments behave like a circle with an arbitrary face.
            normal = Vec2::Y;
        }
        Ok(Self {
            a,
            b,
            radius,
            normal,
            a_tangent: Vec2::ZERO,
            b_tangent: Vec2::ZERO,
            world_a: a,
            world_b: b,
            world_normal: normal,
            world_a_tangent: Vec2::ZERO,
            world_b_tangent: Vec2::ZERO,
        })
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// Records the endpoints of the previous and next segments in a chain.
    pub fn set_neighbors(&mut self, prev: Vec2, next: Vec2) {
        self.a_tangent = prev - self.a;
        self.b_tangent = next - self.b;
    }

    pub fn world_endpoints(&self) -> (Vec2, Vec2) {
        (self.world_a, self.world_b)
    }

    pub fn world_normal(&self) -> Vec2 {
        self.world_normal
    }

    pub(crate) fn update(&mut self, transform: Transform) -> AABB {
        self.world_a = transform.apply(self.a);
        self.world_b = transform.apply(self.b);
        self.world_normal = transform.apply_vector(self.normal);
        self.world_a_tangent = transform.apply_vector(self.a_tangent);
        self.world_b_tangent = transform.apply_vector(self.b_tangent);
        let r = self.radius;
        AABB {
            min: Vec2::new(
                self.world_a.x.min(self.world_b.x) - r,
                self.world_a.y.min(self.world_b.y) - r,
            ),
            max: Vec2::new(
                self.world_a.x.max(self.world_b.x) + r,
                self.world_a.y.max(self.world_b.y) + r,
            ),
        }
    }

    pub(crate) fn point_query(&self, p: Vec2) -> PointQuery {
        let closest = closest_point_on_segment(p, self.world_a, self.world_b);
        let delta = p - closest;
        let d = delta.magnitude();
        let g = if d > 0.0 { delta * (1.0 / d) } else { Vec2::ZERO };
        PointQuery {
            point: closest + g * self.radius,
            distance: d - self.radius,
            gradient: if d > MAGIC_EPSILON { g } else { self.world_normal },
        }
    }

    pub(crate) fn segment_query(&self, a: Vec2, b: Vec2, r2: f64) -> Option<SegmentQuery> {
        let n = self.world_normal;
        let d = (self.world_a - a).dot(n);
        let r = self.radius + r2;

        let flipped_n = if d > 0.0 { -n } else { n };
        let seg_offset = flipped_n * r - a;

        // Endpoints relative to `a`, pushed out by the combined thickness.
        let seg_a = self.world_a + seg_offset;
        let seg_b = self.world_b + seg_offset;
        let delta = b - a;

        if delta.cross(seg_a) * delta.cross(seg_b) <= 0.0 {
            let d_offset = d + if d > 0.0 { -r } else { r };
            let ad = -d_offset;
            let bd = delta.dot(n) - d_offset;
            if ad * bd < 0.0 {
                let t = ad / (ad - bd);
                return Some(SegmentQuery {
                    point: a.lerp(b, t) - flipped_n * r2,
                    normal: flipped_n,
                    alpha: t,
                });
            }
            None
        } else if r != 0.0 {
            let cap_a = circle_segment_query(self.world_a, self.radius, a, b, r2);
            let cap_b = circle_segment_query(self.world_b, self.radius, a, b, r2);
            match (cap_a, cap_b) {
                (Some(x), Some(y)) => Some(if x.alpha < y.alpha { x } else { y }),
                (x, y) => x.or(y),
            }
        } else {
            None
        }
    }
}

/// Point on segment `a`-`b` closest to `p`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let delta = a - b;
    let len_sq = delta.magnitude_squared();
    if len_sq == 0.0 {
        return a;
    }
    let t = (delta.dot(p - b) / len_sq).clamp(0.0, 1.0);
    b + delta * t
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    fn floor() -> LineSegment {
        let mut seg = LineSegment::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), 0.0).unwrap();
        seg.update(Transform::identity());
        seg
    }

    #[test]
    fn test_segment_normal_is_right_perpendicular() {
        let seg = floor();
        assert_eq!(seg.world_normal(), Vec2::new(0.0, -1.0));
        assert!((seg.length() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_segment_bb_includes_radius() {
        let mut seg = LineSegment::new(Vec2::new(0.0, 0.0), Vec2::new(2.0, 0.0), 0.5).unwrap();
        let bb = seg.update(Transform::new(Vec2::new(1.0, 1.0), 0.0));
        assert_eq!(bb.min, Vec2::new(0.5, 0.5));
        assert_eq!(bb.max, Vec2::new(3.5, 1.5));
    }

    #[test]
    fn test_closest_point_on_segment_clamps() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(4.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(2.0, 3.0), a, b), Vec2::new(2.0, 0.0));
        assert_eq!(closest_point_on_segment(Vec2::new(-2.0, 3.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(9.0, -1.0), a, b), b);
    }

    #[test]
    fn test_segment_point_query() {
        let seg = floor();
        let q = seg.point_query(Vec2::new(1.0, 2.0));
        assert!((q.distance - 2.0).abs() < EPSILON);
        assert_eq!(q.point, Vec2::new(1.0, 0.0));
        assert_eq!(q.gradient, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_segment_segment_query_from_above() {
        let seg = floor();
        let hit = seg
            .segment_query(Vec2::new(0.0, 4.0), Vec2::new(0.0, -4.0), 0.0)
            .unwrap();
        assert!((hit.alpha - 0.5).abs() < EPSILON);
        assert!(hit.point.y.abs() < EPSILON);
        assert_eq!(hit.normal, Vec2::new(0.0, 1.0));

        assert!(seg
            .segment_query(Vec2::new(6.0, 4.0), Vec2::new(6.0, -4.0), 0.0)
            .is_none());
    }
}
