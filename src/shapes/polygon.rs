use crate::collision::AABB;
use crate::error::{PhysicsError, Result};
use crate::math::{Transform, Vec2};

use super::circle::circle_segment_query;
use super::line_segment::closest_point_on_segment;
use super::{PointQuery, SegmentQuery, MAGIC_EPSILON};

/// A convex polygon with optionally rounded corners.
///
/// Vertices are stored counter-clockwise. Edge `i` runs from vertex `i`
/// to vertex `i + 1` and `normals[i]` is its outward unit normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Vec2>,
    normals: Vec<Vec2>,
    pub radius: f64,
    pub(crate) world_vertices: Vec<Vec2>,
    pub(crate) world_normals: Vec<Vec2>,
}

impl Polygon {
    /// Builds a polygon from body-local vertices wound consistently in
    /// either direction.
    ///
    /// Fails for fewer than 3 vertices, repeated consecutive vertices,
    /// zero area, or a non-convex outline.
    pub fn new(vertices: Vec<Vec2>, radius: f64) -> Result<Self> {
        if !(radius >= 0.0 && radius.is_finite()) {
            return Err(PhysicsError::InvalidRadius(radius));
        }
        let n = vertices.len();
        if n < 3 {
            return Err(PhysicsError::TooFewVertices(n));
        }
        for i in 0..n {
            if vertices[i] == vertices[(i + 1) % n] {
                return Err(PhysicsError::DegenerateEdge(i));
            }
        }

        let mut vertices = vertices;
        let signed_area: f64 = (0..n)
            .map(|i| vertices[i].cross(vertices[(i + 1) % n]))
            .sum::<f64>()
            * 0.5;
        if signed_area.abs() < f64::EPSILON {
            return Err(PhysicsError::ZeroArea);
        }
        if signed_area < 0.0 {
            vertices.reverse();
        }

        // Every vertex must sit on the inner side of every edge. This also
        // rejects self-intersecting stars whose turns all share one sign.
        let scale = vertices
            .iter()
            .map(|v| v.magnitude_squared())
            .fold(1.0_f64, f64::max);
        let tolerance = 1e-12 * scale;
        for i in 0..n {
            let v0 = vertices[i];
            let edge = vertices[(i + 1) % n] - v0;
            for (j, v) in vertices.iter().enumerate() {
                if edge.cross(*v - v0) < -tolerance {
                    return Err(PhysicsError::NonConvexPolygon(j));
                }
            }
        }

        let normals: Vec<Vec2> = (0..n)
            .map(|i| (vertices[(i + 1) % n] - vertices[i]).normalize().rperp())
            .collect();

        Ok(Polygon {
            world_vertices: vertices.clone(),
            world_normals: normals.clone(),
            vertices,
            normals,
            radius,
        })
    }

    /// Axis-aligned box of `width` by `height` centered on the body origin.
    pub fn boxed(width: f64, height: f64, radius: f64) -> Result<Self> {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self::from_bb(
            AABB {
                min: Vec2::new(-hw, -hh),
                max: Vec2::new(hw, hh),
            },
            radius,
        )
    }

    /// Polygon covering `bb` in body-local coordinates.
    pub fn from_bb(bb: AABB, radius: f64) -> Result<Self> {
        Self::new(
            vec![
                Vec2::new(bb.max.x, bb.min.y),
                Vec2::new(bb.max.x, bb.max.y),
                Vec2::new(bb.min.x, bb.max.y),
                Vec2::new(bb.min.x, bb.min.y),
            ],
            radius,
        )
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn world_vertices(&self) -> &[Vec2] {
        &self.world_vertices
    }

    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    pub(crate) fn update(&mut self, transform: Transform) -> AABB {
        let mut min = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..self.vertices.len() {
            let v = transform.apply(self.vertices[i]);
            self.world_vertices[i] = v;
            self.world_normals[i] = transform.apply_vector(self.normals[i]);
            min = Vec2::new(min.x.min(v.x), min.y.min(v.y));
            max = Vec2::new(max.x.max(v.x), max.y.max(v.y));
        }
        let r = Vec2::new(self.radius, self.radius);
        AABB {
            min: min - r,
            max: max + r,
        }
    }

    /// Index of the world vertex furthest along `n`.
    pub(crate) fn support_index(&self, n: Vec2) -> usize {
        let mut best = 0;
        let mut max = f64::NEG_INFINITY;
        for (i, v) in self.world_vertices.iter().enumerate() {
            let d = v.dot(n);
            if d > max {
                max = d;
                best = i;
            }
        }
        best
    }

    /// Signed distance of the world edge plane `i` to `p`, positive outside.
    pub(crate) fn plane_distance(&self, i: usize, p: Vec2) -> f64 {
        self.world_normals[i].dot(p - self.world_vertices[i])
    }

    /// Smallest value of `dot(n, v) - d` over the world vertices.
    pub(crate) fn value_on_axis(&self, n: Vec2, d: f64) -> f64 {
        self.world_vertices
            .iter()
            .map(|v| n.dot(*v))
            .fold(f64::INFINITY, f64::min)
            - d
    }

    pub(crate) fn contains_vertex(&self, v: Vec2) -> bool {
        (0..self.count()).all(|i| self.plane_distance(i, v) <= 0.0)
    }

    /// Containment test that only considers edges facing along `n`.
    pub(crate) fn contains_vertex_partial(&self, v: Vec2, n: Vec2) -> bool {
        (0..self.count())
            .filter(|&i| self.world_normals[i].dot(n) >= 0.0)
            .all(|i| self.plane_distance(i, v) <= 0.0)
    }

    pub(crate) fn point_query(&self, p: Vec2) -> PointQuery {
        let count = self.count();
        let mut min_dist = f64::INFINITY;
        let mut closest_point = Vec2::ZERO;
        let mut closest_normal = Vec2::ZERO;
        let mut outside = false;

        for i in 0..count {
            let v0 = self.world_vertices[i];
            let v1 = self.world_vertices[(i + 1) % count];
            outside = outside || self.world_normals[i].dot(p - v0) > 0.0;

            let closest = closest_point_on_segment(p, v0, v1);
            let dist = p.distance(closest);
            if dist < min_dist {
                min_dist = dist;
                closest_point = closest;
                closest_normal = self.world_normals[i];
            }
        }

        let dist = if outside { min_dist } else { -min_dist };
        let g = if dist != 0.0 {
            (p - closest_point) * (1.0 / dist)
        } else {
            closest_normal
        };
        PointQuery {
            point: closest_point + g * self.radius,
            distance: dist - self.radius,
            gradient: if min_dist > MAGIC_EPSILON { g } else { closest_normal },
        }
    }

    pub(crate) fn segment_query(&self, a: Vec2, b: Vec2, r2: f64) -> Option<SegmentQuery> {
        let count = self.count();
        let rsum = self.radius + r2;
        let mut best: Option<SegmentQuery> = None;

        for i in 0..count {
            let n = self.world_normals[i];
            let an = a.dot(n);
            let d = an - self.world_vertices[i].dot(n) - rsum;
            if d < 0.0 {
                continue;
            }
            let bn = b.dot(n);
            let t = d / (an - bn).max(f64::MIN_POSITIVE);
            if !(0.0..=1.0).contains(&t) {
                continue;
            }

            let point = a.lerp(b, t);
            let dt = n.cross(point);
            let dt_min = n.cross(self.world_vertices[i]);
            let dt_max = n.cross(self.world_vertices[(i + 1) % count]);
            if dt_min <= dt && dt <= dt_max {
                best = Some(SegmentQuery {
                    point: point - n * r2,
                    normal: n,
                    alpha: t,
                });
            }
        }

        // Rounded corners.
        if rsum > 0.0 {
            for v in &self.world_vertices {
                if let Some(hit) = circle_segment_query(*v, self.radius, a, b, r2) {
                    if best.map_or(true, |b| hit.alpha < b.alpha) {
                        best = Some(hit);
                    }
                }
            }
        }
        best
    }
}
