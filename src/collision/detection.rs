use crate::math::vec2::Vec2;
use crate::shapes::{Geometry, LineSegment, Polygon, Shape, ShapeKind};

use super::gjk;
use super::manifold::{hash_pair, CollisionInfo, MAX_CONTACTS_PER_ARBITER};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which routines handle the pairs that involve a segment or polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NarrowPhase {
    /// Support-function distance queries with edge clipping. Handles
    /// rounded polygons and caches closest features between steps.
    #[default]
    Gjk,
    /// Separating-axis tests. Rounded polygons still go through GJK.
    Sat,
}

/// Collides two shapes whose boxes overlap, writing contacts into `info`.
///
/// The lower shape kind is always collided first (and, for equal kinds,
/// the lower hash id). `info.swapped` tells whether that reversed the
/// order of the arguments; the normal and contacts follow the collided
/// order. `cached_id` is the closest-feature id returned by the previous
/// query between the same pair (or 0); the updated one is left in
/// `info.id`.
pub fn collide(
    a: &Shape,
    b: &Shape,
    cached_id: u32,
    narrow_phase: NarrowPhase,
    info: &mut CollisionInfo,
) {
    info.reset(cached_id);

    let swapped = a.kind() > b.kind() || (a.kind() == b.kind() && a.hash_id > b.hash_id);
    let (a, b) = if swapped { (b, a) } else { (a, b) };
    info.swapped = swapped;

    match (a.kind(), b.kind()) {
        (ShapeKind::Circle, ShapeKind::Circle) => check_circle_circle(a, b, info),
        (ShapeKind::Circle, ShapeKind::Segment) => check_circle_segment(a, b, info),
        (ShapeKind::Circle, ShapeKind::Polygon) => match narrow_phase {
            NarrowPhase::Sat if !is_rounded(b) => check_circle_polygon(a, b, info),
            _ => gjk::circle_to_poly(a, b, info),
        },
        (ShapeKind::Segment, ShapeKind::Segment) => match narrow_phase {
            NarrowPhase::Sat => check_segment_segment(a, b, info),
            NarrowPhase::Gjk => gjk::segment_to_segment(a, b, info),
        },
        (ShapeKind::Segment, ShapeKind::Polygon) => match narrow_phase {
            NarrowPhase::Sat if !is_rounded(b) => check_segment_polygon(a, b, info),
            _ => gjk::segment_to_poly(a, b, info),
        },
        (ShapeKind::Polygon, ShapeKind::Polygon) => match narrow_phase {
            NarrowPhase::Sat if !is_rounded(a) && !is_rounded(b) => check_polygon_polygon(a, b, info),
            _ => gjk::poly_to_poly(a, b, info),
        },
        // Unreachable after ordering by kind.
        _ => {}
    }
}

fn is_rounded(shape: &Shape) -> bool {
    shape.geometry.radius() > 0.0
}

/// Pushes a contact centered on `p`, dropping it once the buffer is full.
/// The surface points straddle `p` along `n` so that the solver sees the
/// full overlap between them.
fn push_point(info: &mut CollisionInfo, p: Vec2, n: Vec2, distance: f64, hash: u64) {
    if info.count() < MAX_CONTACTS_PER_ARBITER {
        let half = n * (distance * 0.5);
        info.push_with_distance(p - half, p + half, distance, hash);
    }
}

/// Contact between two discs. Coincident centers collide along +X.
pub fn check_circle_circle(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Circle(c1), Geometry::Circle(c2)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let min_dist = c1.radius + c2.radius;
    let delta = c2.world_center - c1.world_center;
    let dist_sq = delta.magnitude_squared();
    if dist_sq >= min_dist * min_dist {
        return;
    }

    let dist = dist_sq.sqrt();
    let n = if dist != 0.0 { delta * (1.0 / dist) } else { Vec2::X };
    info.normal = n;
    info.push(
        c1.world_center + n * c1.radius,
        c2.world_center - n * c2.radius,
        0,
    );
}

/// Circle against the nearest point of a segment, skipping end caps that
/// continue into a neighboring segment.
pub fn check_circle_segment(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Circle(circle), Geometry::Segment(seg)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let center = circle.world_center;
    let seg_delta = seg.world_b - seg.world_a;
    let len_sq = seg_delta.magnitude_squared();
    let closest_t = if len_sq > 0.0 {
        (seg_delta.dot(center - seg.world_a) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = seg.world_a + seg_delta * closest_t;

    let min_dist = circle.radius + seg.radius;
    let delta = closest - center;
    let dist_sq = delta.magnitude_squared();
    if dist_sq >= min_dist * min_dist {
        return;
    }

    let dist = dist_sq.sqrt();
    let n = if dist != 0.0 {
        delta * (1.0 / dist)
    } else {
        seg.world_normal
    };

    if (closest_t != 0.0 || n.dot(seg.world_a_tangent) >= 0.0)
        && (closest_t != 1.0 || n.dot(seg.world_b_tangent) >= 0.0)
    {
        info.normal = n;
        info.push(center + n * circle.radius, closest - n * seg.radius, 0);
    }
}

/// Disc-disc test with a single contact between the two surface points.
/// Returns the normal when the discs touch.
fn circle_point_query(
    info: &mut CollisionInfo,
    p1: Vec2,
    p2: Vec2,
    r1: f64,
    r2: f64,
    hash: u64,
) -> Option<Vec2> {
    let min_dist = r1 + r2;
    let delta = p2 - p1;
    let dist_sq = delta.magnitude_squared();
    if dist_sq >= min_dist * min_dist {
        return None;
    }
    let dist = dist_sq.sqrt();
    let n = if dist != 0.0 { delta * (1.0 / dist) } else { Vec2::X };
    if info.count() < MAX_CONTACTS_PER_ARBITER {
        info.push_with_distance(p1 + n * r1, p2 - n * r2, dist - min_dist, hash);
    }
    Some(n)
}

/// Face or vertex of a sharp polygon nearest to a circle.
pub fn check_circle_polygon(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Circle(circle), Geometry::Polygon(poly)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let center = circle.world_center;
    let count = poly.count();

    let mut mini = 0;
    let mut min = f64::NEG_INFINITY;
    for i in 0..count {
        let dist = poly.plane_distance(i, center) - circle.radius;
        if dist > 0.0 {
            return;
        }
        if dist > min {
            min = dist;
            mini = i;
        }
    }

    let n = poly.world_normals[mini];
    let va = poly.world_vertices[mini];
    let next = (mini + 1) % count;
    let vb = poly.world_vertices[next];
    let edge = vb - va;
    let t = (center - va).dot(edge);

    let normal = if t <= 0.0 {
        circle_point_query(info, center, va, circle.radius, 0.0, hash_pair(b.hash_id, mini as u64))
    } else if t >= edge.magnitude_squared() {
        circle_point_query(info, center, vb, circle.radius, 0.0, hash_pair(b.hash_id, next as u64))
    } else {
        let face = hash_pair(a.hash_id, hash_pair(b.hash_id, mini as u64));
        push_point(info, center - n * (circle.radius + min / 2.0), -n, min, face);
        Some(-n)
    };
    if let Some(normal) = normal {
        info.normal = normal;
    }
}

/// Projects each segment's endpoints onto the other and tests the four
/// resulting pairs of rounded caps.
pub fn check_segment_segment(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Segment(seg1), Geometry::Segment(seg2)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let clamp_to = |p: Vec2, v: Vec2| {
        let along = p.dot(v);
        if along < 0.0 {
            Vec2::ZERO
        } else if along > 0.0 && p.magnitude_squared() > v.magnitude_squared() {
            v
        } else {
            p
        }
    };
    let project = |p: Vec2, v: Vec2| {
        if v.magnitude_squared() > 0.0 {
            p.project(v)
        } else {
            Vec2::ZERO
        }
    };

    let v1 = seg1.world_b - seg1.world_a;
    let v2 = seg2.world_b - seg2.world_a;
    let p1a = seg1.world_a + clamp_to(project(seg2.world_a - seg1.world_a, v1), v1);
    let p1b = seg1.world_a + clamp_to(project(seg2.world_b - seg1.world_a, v1), v1);
    let p2a = seg2.world_a + clamp_to(project(seg1.world_a - seg2.world_a, v2), v2);
    let p2b = seg2.world_a + clamp_to(project(seg1.world_b - seg2.world_a, v2), v2);

    let candidates = [
        (p1a, seg2.world_a, hash_pair(a.hash_id, hash_pair(b.hash_id, 0))),
        (p1b, seg2.world_b, hash_pair(a.hash_id, hash_pair(b.hash_id, 1))),
        (seg1.world_a, p2a, hash_pair(hash_pair(a.hash_id, 0), b.hash_id)),
        (seg1.world_b, p2b, hash_pair(hash_pair(a.hash_id, 1), b.hash_id)),
    ];

    // The closest pair of caps decides the normal.
    let mut best: Option<(f64, Vec2)> = None;
    for &(p1, p2, hash) in &candidates {
        let before = info.count();
        if let Some(n) = circle_point_query(info, p1, p2, seg1.radius, seg2.radius, hash) {
            let added = info.contacts()[before];
            // Crossing segments can project several caps onto one point.
            let duplicate = info.contacts()[..before]
                .iter()
                .any(|c| c.r_a.near(added.r_a, 1e-9));
            if duplicate {
                info.reset_to(before);
                continue;
            }
            if best.map_or(true, |(d, _)| added.distance < d) {
                best = Some((added.distance, n));
            }
        }
    }
    if let Some((_, n)) = best {
        info.normal = n;
    }
}

/// Smallest value of the rounded segment along the plane `n`, `d`.
fn segment_value_on_axis(seg: &LineSegment, n: Vec2, d: f64) -> f64 {
    let a = n.dot(seg.world_a) - seg.radius;
    let b = n.dot(seg.world_b) - seg.radius;
    a.min(b) - d
}

/// Polygon vertices lying behind the face of a segment.
fn find_points_behind_segment(
    info: &mut CollisionInfo,
    seg: &LineSegment,
    poly: &Polygon,
    poly_hash: u64,
    dist: f64,
    coef: f64,
) {
    let tn = seg.world_normal;
    let dir = seg.world_b - seg.world_a;
    let (lo, hi) = (dir.dot(seg.world_a), dir.dot(seg.world_b));
    let n = tn * coef;

    for (i, &v) in poly.world_vertices.iter().enumerate() {
        if v.dot(n) < tn.dot(seg.world_a) * coef + seg.radius {
            let along = dir.dot(v);
            if lo <= along && along <= hi {
                push_point(info, v, n, dist, hash_pair(poly_hash, i as u64));
            }
        }
    }
}

/// Separating-axis test between a rounded segment and a sharp polygon.
pub fn check_segment_polygon(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Segment(seg), Geometry::Polygon(poly)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let tn = seg.world_normal;
    let seg_d = tn.dot(seg.world_a);
    let min_norm = poly.value_on_axis(tn, seg_d) - seg.radius;
    let min_neg = poly.value_on_axis(-tn, -seg_d) - seg.radius;
    if min_neg > 0.0 || min_norm > 0.0 {
        return;
    }

    let mut mini = 0;
    let mut poly_min = f64::NEG_INFINITY;
    for i in 0..poly.count() {
        let n = poly.world_normals[i];
        let dist = segment_value_on_axis(seg, n, n.dot(poly.world_vertices[i]));
        if dist > 0.0 {
            return;
        }
        if dist > poly_min {
            poly_min = dist;
            mini = i;
        }
    }

    // Every contact of the manifold is measured along the one normal it
    // reports. The segment's own face goes first when it is the shallower
    // axis, and again as a retry when the polygon face found nothing.
    let seg_min = min_norm.max(min_neg);
    let coef = if min_norm > min_neg { 1.0 } else { -1.0 };
    let seg_face_first = seg_min >= poly_min;
    if seg_face_first {
        info.normal = tn * coef;
        find_points_behind_segment(info, seg, poly, b.hash_id, seg_min, coef);
    }

    if info.is_empty() {
        let poly_n = -poly.world_normals[mini];
        info.normal = poly_n;
        let va = seg.world_a + poly_n * seg.radius;
        let vb = seg.world_b + poly_n * seg.radius;
        if poly.contains_vertex(va) {
            push_point(info, va, poly_n, poly_min, hash_pair(a.hash_id, 0));
        }
        if poly.contains_vertex(vb) {
            push_point(info, vb, poly_n, poly_min, hash_pair(a.hash_id, 1));
        }
    }

    if info.is_empty() && !seg_face_first {
        info.normal = tn * coef;
        find_points_behind_segment(info, seg, poly, b.hash_id, seg_min, coef);
    }

    if info.is_empty() {
        // Nothing crossed a face; fall back to the segment caps against
        // the nearest polygon edge's corners.
        let next = (mini + 1) % poly.count();
        let poly_a = poly.world_vertices[mini];
        let poly_b = poly.world_vertices[next];
        for (cap_i, cap, corner_i, corner) in [
            (0, seg.world_a, mini, poly_a),
            (1, seg.world_b, mini, poly_a),
            (0, seg.world_a, next, poly_b),
            (1, seg.world_b, next, poly_b),
        ] {
            let hash = hash_pair(hash_pair(a.hash_id, cap_i), hash_pair(b.hash_id, corner_i as u64));
            if let Some(n) = circle_point_query(info, cap, corner, seg.radius, 0.0, hash) {
                info.normal = n;
                return;
            }
        }
    }
}

/// Axis of `planes_of` with the least penetration of `poly`, or `None`
/// if any axis separates them.
fn find_min_separating_axis(poly: &Polygon, planes_of: &Polygon) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for i in 0..planes_of.count() {
        let n = planes_of.world_normals[i];
        let d = n.dot(planes_of.world_vertices[i]);
        let dist = poly.value_on_axis(n, d);
        if dist > 0.0 {
            return None;
        }
        if best.map_or(true, |(_, min)| dist > min) {
            best = Some((i, dist));
        }
    }
    best
}

fn find_vertices(
    info: &mut CollisionInfo,
    (poly1, hash1): (&Polygon, u64),
    (poly2, hash2): (&Polygon, u64),
    n: Vec2,
    dist: f64,
) {
    for (i, &v) in poly1.world_vertices.iter().enumerate() {
        if poly2.contains_vertex(v) {
            push_point(info, v, n, dist, hash_pair(hash1, i as u64));
        }
    }
    for (i, &v) in poly2.world_vertices.iter().enumerate() {
        if poly1.contains_vertex(v) {
            push_point(info, v, n, dist, hash_pair(hash2, i as u64));
        }
    }
    if !info.is_empty() {
        return;
    }

    // Overlapping with no vertex inside the other shape, as with two
    // crossed boxes. Retry with only the facing edges.
    for (i, &v) in poly1.world_vertices.iter().enumerate() {
        if poly2.contains_vertex_partial(v, -n) {
            push_point(info, v, n, dist, hash_pair(hash1, i as u64));
        }
    }
    for (i, &v) in poly2.world_vertices.iter().enumerate() {
        if poly1.contains_vertex_partial(v, n) {
            push_point(info, v, n, dist, hash_pair(hash2, i as u64));
        }
    }
}

/// Separating-axis test between two sharp polygons.
pub fn check_polygon_polygon(a: &Shape, b: &Shape, info: &mut CollisionInfo) {
    let (Geometry::Polygon(poly1), Geometry::Polygon(poly2)) = (&a.geometry, &b.geometry) else {
        return;
    };
    let Some((mini1, min1)) = find_min_separating_axis(poly2, poly1) else {
        return;
    };
    let Some((mini2, min2)) = find_min_separating_axis(poly1, poly2) else {
        return;
    };

    let (n, dist) = if min1 > min2 {
        (poly1.world_normals[mini1], min1)
    } else {
        (-poly2.world_normals[mini2], min2)
    };
    info.normal = n;
    find_vertices(info, (poly1, a.hash_id), (poly2, b.hash_id), n, dist);
}
