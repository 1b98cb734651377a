// Support-function collision for convex shapes with rounded radii.
//
// GJK walks an edge of the Minkowski difference `B - A` towards the
// origin. If the origin ends up enclosed, EPA expands the hull until the
// closest edge is found. Either way the closest pair of features is then
// clipped against each other to produce up to two contacts.

use std::mem;

use log::warn;

use super::detection::check_segment_segment;
use super::manifold::{hash_pair, CollisionInfo};
use crate::math::Vec2;
use crate::shapes::{Geometry, LineSegment, Polygon, Shape};

const MAX_GJK_ITERATIONS: u32 = 30;
const MAX_EPA_ITERATIONS: u32 = 30;
const WARN_GJK_ITERATIONS: u32 = 20;
const WARN_EPA_ITERATIONS: u32 = 20;
const EPA_HULL_CAPACITY: usize = MAX_EPA_ITERATIONS as usize + 4;
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Geometry seen only through its vertices.
#[derive(Clone, Copy)]
enum Support<'a> {
    Point(Vec2),
    Segment(&'a LineSegment),
    Polygon(&'a Polygon),
}

impl<'a> Support<'a> {
    fn of(geometry: &'a Geometry) -> Self {
        match geometry {
            Geometry::Circle(c) => Support::Point(c.world_center),
            Geometry::Segment(s) => Support::Segment(s),
            Geometry::Polygon(p) => Support::Polygon(p),
        }
    }

    fn support_point(self, n: Vec2) -> SupportPoint {
        match self {
            Support::Point(p) => SupportPoint { p, index: 0 },
            Support::Segment(seg) => {
                if seg.world_a.dot(n) > seg.world_b.dot(n) {
                    SupportPoint {
                        p: seg.world_a,
                        index: 0,
                    }
                } else {
                    SupportPoint {
                        p: seg.world_b,
                        index: 1,
                    }
                }
            }
            Support::Polygon(poly) => {
                let i = poly.support_index(n);
                SupportPoint {
                    p: poly.world_vertices[i],
                    index: i as u32,
                }
            }
        }
    }

    /// Vertex `i`, used to rebuild a cached simplex.
    fn point(self, i: u32) -> SupportPoint {
        match self {
            Support::Point(p) => SupportPoint { p, index: 0 },
            Support::Segment(seg) => SupportPoint {
                p: if i == 0 { seg.world_a } else { seg.world_b },
                index: i.min(1),
            },
            Support::Polygon(poly) => {
                // The vertex count may have changed since the id was cached.
                let index = if (i as usize) < poly.count() { i } else { 0 };
                SupportPoint {
                    p: poly.world_vertices[index as usize],
                    index,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SupportPoint {
    p: Vec2,
    index: u32,
}

/// A vertex of `B - A` together with the two vertices it came from.
#[derive(Debug, Clone, Copy, Default)]
struct MinkowskiPoint {
    a: Vec2,
    b: Vec2,
    ab: Vec2,
    id: u32,
}

impl MinkowskiPoint {
    fn new(a: SupportPoint, b: SupportPoint) -> Self {
        MinkowskiPoint {
            a: a.p,
            b: b.p,
            ab: b.p - a.p,
            id: (a.index & 0xFF) << 8 | (b.index & 0xFF),
        }
    }
}

#[derive(Clone, Copy)]
struct SupportContext<'a> {
    shape_a: Support<'a>,
    shape_b: Support<'a>,
}

impl SupportContext<'_> {
    fn support(&self, n: Vec2) -> MinkowskiPoint {
        MinkowskiPoint::new(self.shape_a.support_point(-n), self.shape_b.support_point(n))
    }
}

/// Closest features of two shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClosestPoints {
    /// Point on the first shape's core geometry.
    pub a: Vec2,
    /// Point on the second shape's core geometry.
    pub b: Vec2,
    /// Unit normal from the first shape to the second.
    pub n: Vec2,
    /// Separation of the core geometries, negative when they overlap.
    pub d: f64,
    pub id: u32,
}

/// Parameter in `[-1, 1]` of the point on `a`-`b` closest to the origin.
fn closest_t(a: Vec2, b: Vec2) -> f64 {
    let delta = b - a;
    -(delta.dot(a + b) / (delta.magnitude_squared() + f64::MIN_POSITIVE)).clamp(-1.0, 1.0)
}

fn lerp_t(a: Vec2, b: Vec2, t: f64) -> Vec2 {
    let ht = 0.5 * t;
    a * (0.5 - ht) + b * (0.5 + ht)
}

fn closest_dist(v0: Vec2, v1: Vec2) -> f64 {
    lerp_t(v0, v1, closest_t(v0, v1)).magnitude_squared()
}

/// True if `c` lies to the left of the directed line through `a` and `b`
/// relative to their midpoint.
fn check_point_greater(a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b.y - a.y) * (a.x + b.x - 2.0 * c.x) > (b.x - a.x) * (a.y + b.y - 2.0 * c.y)
}

/// True if `p` is no further along `n` than the edge `v0`-`v1`.
fn check_axis(v0: Vec2, v1: Vec2, p: Vec2, n: Vec2) -> bool {
    p.dot(n) <= v0.dot(n).max(v1.dot(n))
}

fn closest_points(v0: MinkowskiPoint, v1: MinkowskiPoint) -> ClosestPoints {
    let t = closest_t(v0.ab, v1.ab);
    let p = lerp_t(v0.ab, v1.ab, t);
    let pa = lerp_t(v0.a, v1.a, t);
    let pb = lerp_t(v0.b, v1.b, t);
    let id = (v0.id & 0xFFFF) << 16 | (v1.id & 0xFFFF);

    let delta = v1.ab - v0.ab;
    let n = delta.rperp().normalize();
    let d = n.dot(p);

    if d <= 0.0 || (-1.0 < t && t < 1.0) {
        ClosestPoints {
            a: pa,
            b: pb,
            n,
            d,
            id,
        }
    } else {
        // The closest point is a vertex, so point the normal straight at it.
        let d2 = p.magnitude();
        ClosestPoints {
            a: pa,
            b: pb,
            n: p * (1.0 / (d2 + f64::MIN_POSITIVE)),
            d: d2,
            id,
        }
    }
}

fn epa(
    ctx: &SupportContext,
    v0: MinkowskiPoint,
    v1: MinkowskiPoint,
    v2: MinkowskiPoint,
) -> ClosestPoints {
    let mut hull = [MinkowskiPoint::default(); EPA_HULL_CAPACITY];
    let mut next = [MinkowskiPoint::default(); EPA_HULL_CAPACITY];
    hull[..3].copy_from_slice(&[v0, v1, v2]);
    let mut count = 3;
    let mut iteration = 1;

    loop {
        // Hull edge closest to the origin.
        let mut mini = 0;
        let mut min_dist = f64::INFINITY;
        let mut i = count - 1;
        for j in 0..count {
            let d = closest_dist(hull[i].ab, hull[j].ab);
            if d < min_dist {
                min_dist = d;
                mini = i;
            }
            i = j;
        }

        let v0 = hull[mini];
        let v1 = hull[(mini + 1) % count];
        debug_assert!(v0.ab != v1.ab, "EPA hull vertices {} and {} coincide", mini, (mini + 1) % count);

        let p = ctx.support((v1.ab - v0.ab).perpendicular());
        let area2x = (v1.ab - v0.ab).cross((p.ab - v0.ab) + (p.ab - v1.ab));

        if area2x > 0.0 && iteration < MAX_EPA_ITERATIONS && count < EPA_HULL_CAPACITY {
            // Rebuild the hull with `p` inserted after the closest edge.
            let mut count2 = 1;
            next[0] = p;
            for i in 0..count {
                let index = (mini + 1 + i) % count;
                let h0 = next[count2 - 1].ab;
                let h1 = hull[index].ab;
                let h2 = if i + 1 < count {
                    hull[(index + 1) % count].ab
                } else {
                    p.ab
                };
                if (h2 - h0).cross((h1 - h0) + (h1 - h2)) > 0.0 {
                    next[count2] = hull[index];
                    count2 += 1;
                }
            }
            mem::swap(&mut hull, &mut next);
            count = count2;
            iteration += 1;
        } else {
            if iteration >= WARN_EPA_ITERATIONS {
                warn!("high EPA iterations: {}", iteration);
            }
            return closest_points(v0, v1);
        }
    }
}

fn gjk_from(ctx: &SupportContext, mut v0: MinkowskiPoint, mut v1: MinkowskiPoint) -> ClosestPoints {
    let mut iteration = 1;
    loop {
        if iteration > MAX_GJK_ITERATIONS {
            warn!("high GJK iterations: {}", iteration);
            return closest_points(v0, v1);
        }

        if check_point_greater(v1.ab, v0.ab, Vec2::ZERO) {
            // Origin is behind the edge; flip it and retry.
            mem::swap(&mut v0, &mut v1);
            continue;
        }

        let t = closest_t(v0.ab, v1.ab);
        let n = if -1.0 < t && t < 1.0 {
            (v1.ab - v0.ab).perpendicular()
        } else {
            -lerp_t(v0.ab, v1.ab, t)
        };
        let p = ctx.support(n);

        if check_point_greater(p.ab, v0.ab, Vec2::ZERO) && check_point_greater(v1.ab, p.ab, Vec2::ZERO) {
            // The triangle v0, p, v1 encloses the origin.
            if iteration >= WARN_GJK_ITERATIONS {
                warn!("high GJK->EPA iterations: {}", iteration);
            }
            return epa(ctx, v0, p, v1);
        }

        if check_axis(v0.ab, v1.ab, p.ab, n) {
            // `p` is no closer than the current edge.
            if iteration >= WARN_GJK_ITERATIONS {
                warn!("high GJK iterations: {}", iteration);
            }
            return closest_points(v0, v1);
        }

        // Keep whichever half of the new triangle lies closer.
        if closest_dist(v0.ab, p.ab) < closest_dist(p.ab, v1.ab) {
            v1 = p;
        } else {
            v0 = p;
        }
        iteration += 1;
    }
}

/// Closest points between the core geometry of two shapes. A non-zero
/// `id` rebuilds the starting edge from last frame's features; the id of
/// the final edge is written back.
pub(crate) fn gjk(a: &Shape, b: &Shape, id: &mut u32) -> ClosestPoints {
    let ctx = SupportContext {
        shape_a: Support::of(&a.geometry),
        shape_b: Support::of(&b.geometry),
    };

    let (v0, v1) = if *id != 0 {
        (
            MinkowskiPoint::new(ctx.shape_a.point((*id >> 24) & 0xFF), ctx.shape_b.point((*id >> 16) & 0xFF)),
            MinkowskiPoint::new(ctx.shape_a.point((*id >> 8) & 0xFF), ctx.shape_b.point(*id & 0xFF)),
        )
    } else {
        let axis = (a.bb.center() - b.bb.center()).perpendicular();
        (ctx.support(axis), ctx.support(-axis))
    };

    let points = gjk_from(&ctx, v0, v1);
    *id = points.id;
    points
}

#[derive(Debug, Clone, Copy)]
struct EdgePoint {
    p: Vec2,
    hash: u64,
}

/// A feature edge with its rounding radius and outward normal.
#[derive(Debug, Clone, Copy)]
struct Edge {
    a: EdgePoint,
    b: EdgePoint,
    r: f64,
    n: Vec2,
}

/// Polygon edge adjacent to the support vertex that faces `n` the most.
fn support_edge_for_poly(poly: &Polygon, hash_id: u64, n: Vec2) -> Edge {
    let count = poly.count();
    let i1 = poly.support_index(n);
    let i0 = (i1 + count - 1) % count;
    let i2 = (i1 + 1) % count;
    let verts = &poly.world_vertices;
    let normals = &poly.world_normals;

    let point = |i: usize| EdgePoint {
        p: verts[i],
        hash: hash_pair(hash_id, i as u64),
    };
    if n.dot(normals[i0]) > n.dot(normals[i1]) {
        Edge {
            a: point(i0),
            b: point(i1),
            r: poly.radius,
            n: normals[i0],
        }
    } else {
        Edge {
            a: point(i1),
            b: point(i2),
            r: poly.radius,
            n: normals[i1],
        }
    }
}

fn support_edge_for_segment(seg: &LineSegment, hash_id: u64, n: Vec2) -> Edge {
    let a = EdgePoint {
        p: seg.world_a,
        hash: hash_pair(hash_id, 0),
    };
    let b = EdgePoint {
        p: seg.world_b,
        hash: hash_pair(hash_id, 1),
    };
    if seg.world_normal.dot(n) > 0.0 {
        Edge {
            a,
            b,
            r: seg.radius,
            n: seg.world_normal,
        }
    } else {
        Edge {
            a: b,
            b: a,
            r: seg.radius,
            n: -seg.world_normal,
        }
    }
}

/// Clips two facing edges against each other and pushes the overlapping
/// endpoints as contacts.
fn contact_points(e1: Edge, e2: Edge, points: ClosestPoints, info: &mut CollisionInfo) {
    let min_dist = e1.r + e2.r;
    if points.d > min_dist {
        return;
    }
    let n = points.n;
    info.normal = n;

    // Positions of the endpoints across the normal.
    let d_e1_a = e1.a.p.cross(n);
    let d_e1_b = e1.b.p.cross(n);
    let d_e2_a = e2.a.p.cross(n);
    let d_e2_b = e2.b.p.cross(n);

    let e1_denom = 1.0 / (d_e1_b - d_e1_a + f64::MIN_POSITIVE);
    let e2_denom = 1.0 / (d_e2_b - d_e2_a + f64::MIN_POSITIVE);

    {
        let p1 = n * e1.r + e1.a.p.lerp(e1.b.p, ((d_e2_b - d_e1_a) * e1_denom).clamp(0.0, 1.0));
        let p2 = n * -e2.r + e2.a.p.lerp(e2.b.p, ((d_e1_a - d_e2_a) * e2_denom).clamp(0.0, 1.0));
        let dist = (p2 - p1).dot(n);
        if dist <= 0.0 {
            info.push_with_distance(p1, p2, dist, hash_pair(e1.a.hash, e2.b.hash));
        }
    }
    {
        let p1 = n * e1.r + e1.a.p.lerp(e1.b.p, ((d_e2_a - d_e1_a) * e1_denom).clamp(0.0, 1.0));
        let p2 = n * -e2.r + e2.a.p.lerp(e2.b.p, ((d_e1_b - d_e2_a) * e2_denom).clamp(0.0, 1.0));
        let dist = (p2 - p1).dot(n);
        if dist <= 0.0 {
            info.push_with_distance(p1, p2, dist, hash_pair(e1.b.hash, e2.a.hash));
        }
    }
}

/// End caps of chained segments only collide on their outward side.
fn segment_cap_allowed(seg: &LineSegment, point: Vec2, n: Vec2) -> bool {
    (point != seg.world_a || n.dot(seg.world_a_tangent) <= 0.0)
        && (point != seg.world_b || n.dot(seg.world_b_tangent) <= 0.0)
}

/// Both segments lie on one line, so their Minkowski difference has no
/// area and no edge of it gives a usable normal.
fn segments_collinear(seg1: &LineSegment, seg2: &LineSegment) -> bool {
    let v1 = seg1.world_b - seg1.world_a;
    let v2 = seg2.world_b - seg2.world_a;
    let tolerance = COLLINEAR_TOLERANCE * v1.magnitude() * v2.magnitude();
    v1.cross(v2).abs() <= tolerance
        && v1.cross(seg2.world_a - seg1.world_a).abs() <= COLLINEAR_TOLERANCE * v1.magnitude()
}

pub(crate) fn segment_to_segment(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Segment(seg1), Geometry::Segment(seg2)) = (&a.geometry, &b.geometry) else {
        return;
    };
    if segments_collinear(seg1, seg2) {
        check_segment_segment(a, b, info);
        return;
    }
    let points = gjk(a, b, &mut info.id);
    let n = points.n;

    if points.d <= seg1.radius + seg2.radius
        && segment_cap_allowed(seg1, points.a, n)
        && segment_cap_allowed(seg2, points.b, -n)
    {
        contact_points(
            support_edge_for_segment(seg1, a.hash_id, n),
            support_edge_for_segment(seg2, b.hash_id, -n),
            points,
            info,
        );
    }
}

pub(crate) fn poly_to_poly(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Polygon(poly1), Geometry::Polygon(poly2)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let points = gjk(a, b, &mut info.id);

    if points.d - poly1.radius - poly2.radius <= 0.0 {
        contact_points(
            support_edge_for_poly(poly1, a.hash_id, points.n),
            support_edge_for_poly(poly2, b.hash_id, -points.n),
            points,
            info,
        );
    }
}

pub(crate) fn segment_to_poly(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Segment(seg), Geometry::Polygon(poly)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let points = gjk(a, b, &mut info.id);
    let n = points.n;

    if (points.b - points.a).dot(n) - seg.radius - poly.radius <= 0.0
        && segment_cap_allowed(seg, points.a, n)
    {
        contact_points(
            support_edge_for_segment(seg, a.hash_id, n),
            support_edge_for_poly(poly, b.hash_id, -n),
            points,
            info,
        );
    }
}

pub(crate) fn circle_to_poly(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Circle(circle), Geometry::Polygon(poly)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let points = gjk(a, b, &mut info.id);

    if points.d <= circle.radius + poly.radius {
        let n = points.n;
        info.normal = n;
        info.push(points.a + n * circle.radius, points.b - n * poly.radius, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Arena, BodyHandle};
    use crate::math::Transform;

    const EPSILON: f64 = 1e-9;

    fn body() -> BodyHandle {
        let mut arena = Arena::new();
        BodyHandle(arena.insert(()))
    }

    fn placed(mut shape: Shape, hash_id: u64, x: f64, y: f64) -> Shape {
        shape.hash_id = hash_id;
        shape.update(Transform::new(Vec2::new(x, y), 0.0));
        shape
    }

    fn unit_box(hash_id: u64, x: f64, y: f64) -> Shape {
        placed(Shape::boxed(body(), 2.0, 2.0, 0.0).unwrap(), hash_id, x, y)
    }

    #[test]
    fn test_separated_boxes_produce_no_contacts() {
        let a = unit_box(1, 0.0, 0.0);
        let b = unit_box(2, 10.0, 0.0);
        let mut info = CollisionInfo::new(0);
        poly_to_poly(&a, &b, &mut info);
        assert!(info.is_empty());
    }

    #[test]
    fn test_overlapping_boxes_report_depth() {
        let a = unit_box(1, 0.0, 0.0);
        let b = unit_box(2, 1.0, 0.0);
        let mut info = CollisionInfo::new(0);
        poly_to_poly(&a, &b, &mut info);

        assert_eq!(info.count(), 2);
        assert!((info.normal - Vec2::X).magnitude() < EPSILON);
        for contact in info.contacts() {
            assert!((contact.distance + 1.0).abs() < EPSILON);
        }
        assert_ne!(info.contacts()[0].hash, info.contacts()[1].hash);

        // The cached feature id reproduces the same manifold.
        let mut again = CollisionInfo::new(info.id);
        poly_to_poly(&a, &b, &mut again);
        assert_eq!(again.contacts(), info.contacts());
    }

    #[test]
    fn test_gjk_separation_distance() {
        let a = unit_box(1, 0.0, 0.0);
        let b = unit_box(2, 4.0, 3.0);
        let mut id = 0;
        let points = gjk(&a, &b, &mut id);
        // Corner (1, 1) to corner (3, 2).
        assert!((points.d - 5.0f64.sqrt()).abs() < EPSILON);
        assert!((points.a - Vec2::new(1.0, 1.0)).magnitude() < EPSILON);
        assert!((points.b - Vec2::new(3.0, 2.0)).magnitude() < EPSILON);
    }

    #[test]
    fn test_circle_resting_on_box() {
        let circle = placed(Shape::circle(body(), 0.5, Vec2::ZERO).unwrap(), 1, 0.0, 1.25);
        let ground = unit_box(2, 0.0, 0.0);
        let mut info = CollisionInfo::new(0);
        circle_to_poly(&circle, &ground, &mut info);

        assert_eq!(info.count(), 1);
        assert!((info.normal - Vec2::new(0.0, -1.0)).magnitude() < EPSILON);
        assert!((info.contacts()[0].distance + 0.25).abs() < EPSILON);
    }

    #[test]
    fn test_rounded_segments_overlap() {
        let seg = |hash, y| {
            placed(
                Shape::segment(body(), Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.1).unwrap(),
                hash,
                0.0,
                y,
            )
        };
        let a = seg(1, 0.0);
        let b = seg(2, 0.15);
        let mut info = CollisionInfo::new(0);
        segment_to_segment(&a, &b, &mut info);

        assert_eq!(info.count(), 2);
        assert!((info.normal - Vec2::Y).magnitude() < EPSILON);
        for contact in info.contacts() {
            assert!((contact.distance + 0.05).abs() < EPSILON);
        }
    }

    #[test]
    fn test_segment_on_box_face() {
        let seg = placed(
            Shape::segment(body(), Vec2::new(-0.5, 0.0), Vec2::new(0.5, 0.0), 0.0).unwrap(),
            1,
            0.0,
            0.9,
        );
        let ground = unit_box(2, 0.0, 0.0);
        let mut info = CollisionInfo::new(0);
        segment_to_poly(&seg, &ground, &mut info);

        assert_eq!(info.count(), 2);
        assert!((info.normal - Vec2::new(0.0, -1.0)).magnitude() < EPSILON);
        for contact in info.contacts() {
            assert!((contact.distance + 0.1).abs() < EPSILON);
        }
    }

    #[test]
    fn test_closest_t_on_degenerate_edge() {
        let p = Vec2::new(-1.9, 0.0);
        let t = closest_t(p, p);
        assert!(t.is_finite());
        assert!(lerp_t(p, p, t).near(p, EPSILON));
    }

    #[test]
    fn test_collinear_segments_overlap() {
        let seg = |hash, x| {
            placed(
                Shape::segment(body(), Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.1).unwrap(),
                hash,
                x,
                0.0,
            )
        };
        let mut info = CollisionInfo::new(0);
        segment_to_segment(&seg(1, 0.0), &seg(2, 1.9), &mut info);

        assert!(!info.is_empty());
        assert!((info.normal - Vec2::X).magnitude() < EPSILON);
        for contact in info.contacts() {
            assert!(contact.distance < 0.0);
            assert!(contact.r_a.x.is_finite() && contact.r_b.x.is_finite());
        }

        // End to end with a gap stays apart.
        let mut info = CollisionInfo::new(0);
        segment_to_segment(&seg(1, 0.0), &seg(2, 2.5), &mut info);
        assert!(info.is_empty());
    }
}
