use crate::collision::AABB;
use crate::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

use super::{PointQuery, SegmentQuery, MAGIC_EPSILON};

/// A circle attached to a body at a local offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Center in body-local coordinates.
    pub offset: Vec2,
    pub radius: f64,
    /// Center in world coordinates, refreshed by [`Circle::update`].
    pub(crate) world_center: Vec2,
}

impl Circle {
    pub fn new(radius: f64, offset: Vec2) -> Result<Self> {
        if !(radius >= 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidRadius(radius));
        }
        Ok(Self {
            offset,
            radius,
            world_center: offset,
        })
    }

    pub fn world_center(&self) -> Vec2 {
        self.world_center
    }

    pub(crate) fn update(&mut self, transform: Transform) -> AABB {
        self.world_center = transform.apply(self.offset);
        AABB::for_circle(self.world_center, self.radius)
    }

    pub(crate) fn point_query(&self, p: Vec2) -> PointQuery {
        let delta = p - self.world_center;
        let d = delta.magnitude();
        let r_over_d = if d > 0.0 { self.radius / d } else { self.radius };
        PointQuery {
            point: self.world_center + delta * r_over_d,
            distance: d - self.radius,
            gradient: if d > MAGIC_EPSILON { delta * (1.0 / d) } else { Vec2::Y },
        }
    }

    pub(crate) fn segment_query(&self, a: Vec2, b: Vec2, radius: f64) -> Option<SegmentQuery> {
        circle_segment_query(self.world_center, self.radius, a, b, radius)
    }
}

/// Sweeps a circle of radius `r2` from `a` to `b` against a circle of
/// radius `r1` at `center`.
pub(crate) fn circle_segment_query(
    center: Vec2,
    r1: f64,
    a: Vec2,
    b: Vec2,
    r2: f64,
) -> Option<SegmentQuery> {
    let da = a - center;
    let db = b - center;
    let rsum = r1 + r2;

    let qa = da.dot(da) - 2.0 * da.dot(db) + db.dot(db);
    let qb = da.dot(db) - da.dot(da);
    let det = qb * qb - qa * (da.dot(da) - rsum * rsum);
    if det < 0.0 || qa == 0.0 {
        return None;
    }

    let t = (-qb - det.sqrt()) / qa;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let n = da.lerp(db, t).normalize();
    Some(SegmentQuery {
        point: a.lerp(b, t) - n * r2,
        normal: n,
        alpha: t,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-10;

    #[test]
    fn test_circle_rejects_negative_radius() {
        assert_eq!(
            Circle::new(-1.0, Vec2::ZERO),
            Err(PhysicsError::InvalidRadius(-1.0))
        );
        assert!(Circle::new(f64::NAN, Vec2::ZERO).is_err());
    }

    #[test]
    fn test_circle_update_moves_center_and_bb() {
        let mut c = Circle::new(2.0, Vec2::new(1.0, 0.0)).unwrap();
        let bb = c.update(Transform::new(Vec2::new(10.0, 0.0), std::f64::consts::PI));
        assert!((c.world_center().x - 9.0).abs() < EPSILON);
        assert!((bb.min.x - 7.0).abs() < EPSILON);
        assert!((bb.max.y - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_circle_point_query_signed_distance() {
        let mut c = Circle::new(1.0, Vec2::ZERO).unwrap();
        c.update(Transform::identity());
        let outside = c.point_query(Vec2::new(3.0, 0.0));
        assert!((outside.distance - 2.0).abs() < EPSILON);
        assert_eq!(outside.point, Vec2::new(1.0, 0.0));
        assert_eq!(outside.gradient, Vec2::new(1.0, 0.0));

        let inside = c.point_query(Vec2::new(0.0, 0.5));
        assert!((inside.distance + 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_circle_segment_query_hit_and_miss() {
        let mut c = Circle::new(1.0, Vec2::ZERO).unwrap();
        c.update(Transform::identity());
        let hit = c
            .segment_query(Vec2::new(-4.0, 0.0), Vec2::new(4.0, 0.0), 0.0)
            .unwrap();
        assert!((hit.alpha - 3.0 / 8.0).abs() < EPSILON);
        assert!((hit.point.x + 1.0).abs() < EPSILON);
        assert!((hit.normal.x + 1.0).abs() < EPSILON);

        assert!(c
            .segment_query(Vec2::new(-4.0, 2.0), Vec2::new(4.0, 2.0), 0.0)
            .is_none());
        // A fat ray reaches further.
        assert!(c
            .segment_query(Vec2::new(-4.0, 1.5), Vec2::new(4.0, 1.5), 0.6)
            .is_some());
    }
}
