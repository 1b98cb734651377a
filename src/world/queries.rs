//! Read-only spatial queries against a space's shapes.

use crate::collision::{collide, CollisionInfo, ContactPoint, AABB};
use crate::common::ShapeHandle;
use crate::math::{Transform, Vec2};
use crate::shapes::{Shape, ShapeFilter};

use super::space::Space;

/// A shape near a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointQueryInfo {
    pub shape: ShapeHandle,
    /// Closest point on the shape's surface.
    pub point: Vec2,
    /// Signed distance from the query point, negative inside the shape.
    pub distance: f64,
    pub gradient: Vec2,
}

/// A shape hit by a ray or swept circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentQueryInfo {
    pub shape: ShapeHandle,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the query segment.
    pub alpha: f64,
}

/// A shape overlapping a query shape. The normal points from the query
/// shape towards the hit shape and `point_a` lies on the query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeQueryInfo {
    pub shape: ShapeHandle,
    pub normal: Vec2,
    pub points: Vec<ContactPoint>,
}

fn swept_bb(a: Vec2, b: Vec2, radius: f64) -> AABB {
    AABB::new(a, b).merged(&AABB::for_circle(a, radius)).merged(&AABB::for_circle(b, radius))
}

impl Space {
    /// Shapes within `max_distance` of `point`.
    pub fn point_query(&self, point: Vec2, max_distance: f64, filter: ShapeFilter) -> Vec<PointQueryInfo> {
        let mut hits = Vec::new();
        let bb = AABB::for_circle(point, max_distance.max(0.0));
        self.tree.query(bb, |handle| {
            let Some(shape) = self.shapes.get(handle.0) else {
                return;
            };
            if shape.filter.reject(&filter) {
                return;
            }
            let query = shape.point_query(point);
            if query.distance < max_distance {
                hits.push(PointQueryInfo {
                    shape: handle,
                    point: query.point,
                    distance: query.distance,
                    gradient: query.gradient,
                });
            }
        });
        hits
    }

    /// Closest shape within `max_distance` of `point`.
    pub fn point_query_nearest(
        &self,
        point: Vec2,
        max_distance: f64,
        filter: ShapeFilter,
    ) -> Option<PointQueryInfo> {
        self.point_query(point, max_distance, filter)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Every shape hit by a circle of `radius` swept from `a` to `b`.
    /// A zero radius casts a ray.
    pub fn segment_query(&self, a: Vec2, b: Vec2, radius: f64, filter: ShapeFilter) -> Vec<SegmentQueryInfo> {
        let mut hits = Vec::new();
        let mut visit = |handle: ShapeHandle| {
            let Some(shape) = self.shapes.get(handle.0) else {
                return;
            };
            if shape.filter.reject(&filter) {
                return;
            }
            if let Some(hit) = shape.segment_query(a, b, radius) {
                hits.push(SegmentQueryInfo {
                    shape: handle,
                    point: hit.point,
                    normal: hit.normal,
                    alpha: hit.alpha,
                });
            }
        };

        if radius > 0.0 {
            self.tree.query(swept_bb(a, b, radius), visit);
        } else {
            self.tree.segment_query(a, b, 1.0, |handle| {
                visit(handle);
                1.0
            });
        }
        hits
    }

    /// First shape hit by a circle of `radius` swept from `a` to `b`.
    pub fn segment_query_first(
        &self,
        a: Vec2,
        b: Vec2,
        radius: f64,
        filter: ShapeFilter,
    ) -> Option<SegmentQueryInfo> {
        if radius > 0.0 {
            return self
                .segment_query(a, b, radius, filter)
                .into_iter()
                .min_by(|x, y| x.alpha.total_cmp(&y.alpha));
        }

        let mut best: Option<SegmentQueryInfo> = None;
        self.tree.segment_query(a, b, 1.0, |handle| {
            let best_alpha = best.map_or(1.0, |hit| hit.alpha);
            let Some(shape) = self.shapes.get(handle.0) else {
                return best_alpha;
            };
            if shape.filter.reject(&filter) {
                return best_alpha;
            }
            match shape.segment_query(a, b, 0.0) {
                Some(hit) if hit.alpha < best_alpha => {
                    best = Some(SegmentQueryInfo {
                        shape: handle,
                        point: hit.point,
                        normal: hit.normal,
                        alpha: hit.alpha,
                    });
                    hit.alpha
                }
                _ => best_alpha,
            }
        });
        best
    }

    /// Shapes whose bounding boxes overlap `bb`.
    pub fn bb_query(&self, bb: AABB, filter: ShapeFilter) -> Vec<ShapeHandle> {
        let mut hits = Vec::new();
        self.tree.query(bb, |handle| {
            let Some(shape) = self.shapes.get(handle.0) else {
                return;
            };
            if !shape.filter.reject(&filter) && shape.bb.intersects(&bb) {
                hits.push(handle);
            }
        });
        hits
    }

    /// Shapes overlapping `query` placed at `transform`. The query shape does
    /// not need to belong to the space; its own filter applies.
    pub fn shape_query(&self, query: &Shape, transform: Transform) -> Vec<ShapeQueryInfo> {
        let mut query = query.clone();
        let bb = query.update(transform);
        let mut info = CollisionInfo::default();
        let mut hits = Vec::new();

        self.tree.query(bb, |handle| {
            let Some(shape) = self.shapes.get(handle.0) else {
                return;
            };
            if query.filter.reject(&shape.filter) || !shape.bb.intersects(&bb) {
                return;
            }
            collide(&query, shape, 0, self.config.narrow_phase, &mut info);
            if info.is_empty() {
                return;
            }

            let points = info
                .contacts()
                .iter()
                .map(|con| {
                    let (point_a, point_b) = if info.swapped {
                        (con.r_b, con.r_a)
                    } else {
                        (con.r_a, con.r_b)
                    };
                    ContactPoint {
                        point_a,
                        point_b,
                        distance: con.distance,
                    }
                })
                .collect();
            hits.push(ShapeQueryInfo {
                shape: handle,
                normal: if info.swapped { -info.normal } else { info.normal },
                points,
            });
        });
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::rigid_body::RigidBody;
    use approx::assert_abs_diff_eq;

    const EPSILON: f64 = 1e-9;

    /// Two unit circles at (0, 0) and (5, 0) on static bodies, and a
    /// dynamic sensor circle at (0, 5).
    fn scene() -> (Space, ShapeHandle, ShapeHandle, ShapeHandle) {
        let mut space = Space::new();
        let ground = space.static_body();
        let left = space
            .add_shape(Shape::circle(ground, 1.0, Vec2::ZERO).unwrap())
            .unwrap();
        let right = space
            .add_shape(Shape::circle(ground, 1.0, Vec2::new(5.0, 0.0)).unwrap())
            .unwrap();

        let mut body = RigidBody::new_dynamic(1.0, 1.0).unwrap();
        body.set_position(Vec2::new(0.0, 5.0));
        let body = space.add_body(body).unwrap();
        let sensor = space
            .add_shape(Shape::circle(body, 1.0, Vec2::ZERO).unwrap().with_sensor(true))
            .unwrap();
        (space, left, right, sensor)
    }

    #[test]
    fn test_point_query_respects_max_distance() {
        let (space, left, _, _) = scene();
        let hits = space.point_query(Vec2::new(2.0, 0.0), 2.0, ShapeFilter::ALL);
        // The right circle is exactly 2 away and excluded.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape, left);
        assert!((hits[0].distance - 1.0).abs() < EPSILON);
        assert_eq!(hits[0].point, Vec2::new(1.0, 0.0));
        assert_eq!(hits[0].gradient, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_point_query_nearest_inside_is_negative() {
        let (space, _, right, _) = scene();
        let nearest = space
            .point_query_nearest(Vec2::new(4.5, 0.0), 10.0, ShapeFilter::ALL)
            .unwrap();
        assert_eq!(nearest.shape, right);
        assert!((nearest.distance + 0.5).abs() < EPSILON);
        assert!(space
            .point_query_nearest(Vec2::new(2.5, -3.0), 0.5, ShapeFilter::ALL)
            .is_none());
    }

    #[test]
    fn test_point_query_reports_sensors() {
        let (space, _, _, sensor) = scene();
        let hits = space.point_query(Vec2::new(0.0, 5.0), 0.0, ShapeFilter::ALL);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape, sensor);
    }

    #[test]
    fn test_segment_query_hits_in_order() {
        let (space, left, right, _) = scene();
        let mut hits = space.segment_query(Vec2::new(-5.0, 0.0), Vec2::new(10.0, 0.0), 0.0, ShapeFilter::ALL);
        hits.sort_by(|a, b| a.alpha.total_cmp(&b.alpha));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].shape, left);
        assert_eq!(hits[1].shape, right);
        assert_abs_diff_eq!(hits[0].alpha, 4.0 / 15.0, epsilon = EPSILON);

        let first = space
            .segment_query_first(Vec2::new(-5.0, 0.0), Vec2::new(10.0, 0.0), 0.0, ShapeFilter::ALL)
            .unwrap();
        assert_eq!(first.shape, left);
        assert_abs_diff_eq!(first.point.x, -1.0, epsilon = EPSILON);
        assert_abs_diff_eq!(first.normal.x, -1.0, epsilon = EPSILON);

        // Cast from the far side.
        let first = space
            .segment_query_first(Vec2::new(10.0, 0.0), Vec2::new(-5.0, 0.0), 0.0, ShapeFilter::ALL)
            .unwrap();
        assert_eq!(first.shape, right);
    }

    #[test]
    fn test_swept_segment_query_widens_the_ray() {
        let (space, left, right, _) = scene();
        let (a, b) = (Vec2::new(-5.0, 1.4), Vec2::new(10.0, 1.4));
        assert!(space.segment_query(a, b, 0.0, ShapeFilter::ALL).is_empty());

        let hits = space.segment_query(a, b, 0.5, ShapeFilter::ALL);
        assert_eq!(hits.len(), 2);
        let first = space.segment_query_first(a, b, 0.5, ShapeFilter::ALL).unwrap();
        assert_eq!(first.shape, left);
        assert!(hits.iter().any(|hit| hit.shape == right));
    }

    #[test]
    fn test_queries_apply_filter() {
        let (mut space, left, _, _) = scene();
        space.shape_mut(left).unwrap().filter = ShapeFilter::new(0, 0b10, u32::MAX);
        let only_ones = ShapeFilter::new(0, u32::MAX, 0b01);
        assert!(space.point_query(Vec2::ZERO, 1.0, only_ones).is_empty());
        assert!(space
            .segment_query_first(Vec2::new(-5.0, 0.0), Vec2::new(2.0, 0.0), 0.0, only_ones)
            .is_none());
    }

    #[test]
    fn test_bb_query_uses_exact_boxes() {
        let (space, _, right, _) = scene();
        let hits = space.bb_query(AABB::new(Vec2::new(3.5, -1.0), Vec2::new(4.5, 1.0)), ShapeFilter::ALL);
        assert_eq!(hits, vec![right]);
        assert!(space
            .bb_query(AABB::new(Vec2::new(2.0, -1.0), Vec2::new(3.0, 1.0)), ShapeFilter::ALL)
            .is_empty());
    }

    #[test]
    fn test_shape_query_reports_overlaps() {
        let (space, left, _, _) = scene();
        let query = Shape::boxed(space.static_body(), 1.0, 1.0, 0.0).unwrap();
        let hits = space.shape_query(&query, Transform::new(Vec2::new(1.25, 0.0), 0.0));

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape, left);
        // Points away from the query box, towards the circle.
        assert_abs_diff_eq!(hits[0].normal.x, -1.0, epsilon = 1e-6);
        assert!(hits[0].points.iter().all(|p| p.distance < 0.0));
        assert!(hits[0].points.iter().all(|p| p.point_a.x < p.point_b.x + 1.0));

        let far = space.shape_query(&query, Transform::new(Vec2::new(2.5, 0.0), 0.0));
        assert!(far.is_empty());
    }
}
