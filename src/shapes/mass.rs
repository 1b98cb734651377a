//! Area, centroid and moment of inertia helpers for building bodies.
//!
//! Moments are about the body's center of gravity; `offset` is where the
//! shape's own centroid sits relative to it.

use crate::math::Vec2;
use std::f64::consts::PI;

/// Moment of a hollow circle with inner radius `r1` and outer radius
/// `r2`. Use `r1 = 0` for a solid disc.
pub fn moment_for_circle(mass: f64, r1: f64, r2: f64, offset: Vec2) -> f64 {
    mass * (0.5 * (r1 * r1 + r2 * r2) + offset.magnitude_squared())
}

pub fn area_for_circle(r1: f64, r2: f64) -> f64 {
    PI * (r1 * r1 - r2 * r2).abs()
}

/// Moment of a rounded segment, approximated as a box.
pub fn moment_for_segment(mass: f64, a: Vec2, b: Vec2, radius: f64) -> f64 {
    let offset = a.lerp(b, 0.5);
    let length = b.distance(a) + 2.0 * radius;
    mass * ((length * length + 4.0 * radius * radius) / 12.0 + offset.magnitude_squared())
}

pub fn area_for_segment(a: Vec2, b: Vec2, radius: f64) -> f64 {
    radius * (PI * radius + 2.0 * a.distance(b))
}

/// Moment of a solid polygon of counter-clockwise `vertices`, shifted by
/// `offset`. The corner radius is not included.
pub fn moment_for_polygon(mass: f64, vertices: &[Vec2], offset: Vec2) -> f64 {
    let n = vertices.len();
    if n == 2 {
        return moment_for_segment(mass, vertices[0], vertices[1], 0.0);
    }
    let mut weighted = 0.0;
    let mut total = 0.0;
    for i in 0..n {
        let v1 = vertices[i] + offset;
        let v2 = vertices[(i + 1) % n] + offset;
        let a = v2.cross(v1);
        let b = v1.dot(v1) + v1.dot(v2) + v2.dot(v2);
        weighted += a * b;
        total += a;
    }
    (mass * weighted) / (6.0 * total)
}

/// Signed area of a polygon (positive for counter-clockwise winding),
/// including the band added by a corner radius.
pub fn area_for_polygon(vertices: &[Vec2], radius: f64) -> f64 {
    let n = vertices.len();
    let mut area = 0.0;
    let mut perimeter = 0.0;
    for i in 0..n {
        let v1 = vertices[i];
        let v2 = vertices[(i + 1) % n];
        area += v1.cross(v2);
        perimeter += v1.distance(v2);
    }
    radius * (PI * radius.abs() + perimeter) + area / 2.0
}

/// Area-weighted centroid of a polygon.
pub fn centroid_for_polygon(vertices: &[Vec2]) -> Vec2 {
    let n = vertices.len();
    let mut sum = 0.0;
    let mut weighted = Vec2::ZERO;
    for i in 0..n {
        let v1 = vertices[i];
        let v2 = vertices[(i + 1) % n];
        let cross = v1.cross(v2);
        sum += cross;
        weighted += (v1 + v2) * cross;
    }
    weighted * (1.0 / (3.0 * sum))
}

/// Moment of a solid box centered on the center of gravity.
pub fn moment_for_box(mass: f64, width: f64, height: f64) -> f64 {
    mass * (width * width + height * height) / 12.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(half: f64) -> Vec<Vec2> {
        vec![
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(half, half),
            Vec2::new(-half, half),
        ]
    }

    #[test]
    fn test_polygon_moment_matches_box_formula() {
        let verts = square(1.0);
        assert_relative_eq!(
            moment_for_polygon(3.0, &verts, Vec2::ZERO),
            moment_for_box(3.0, 2.0, 2.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_polygon_moment_parallel_axis() {
        let verts = square(1.0);
        let offset = Vec2::new(2.0, 0.0);
        let expected = moment_for_box(1.0, 2.0, 2.0) + 4.0;
        assert_relative_eq!(moment_for_polygon(1.0, &verts, offset), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_area_and_centroid() {
        let verts: Vec<Vec2> = square(1.0)
            .into_iter()
            .map(|v| v + Vec2::new(3.0, -1.0))
            .collect();
        assert_relative_eq!(area_for_polygon(&verts, 0.0), 4.0, epsilon = 1e-12);
        let c = centroid_for_polygon(&verts);
        assert_relative_eq!(c.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(c.y, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_circle_and_segment_helpers() {
        assert_relative_eq!(moment_for_circle(2.0, 0.0, 1.0, Vec2::ZERO), 1.0);
        assert_relative_eq!(area_for_circle(0.0, 2.0), 4.0 * PI);
        let m = moment_for_segment(12.0, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.0);
        assert_relative_eq!(m, 4.0, epsilon = 1e-12);
        assert_relative_eq!(
            area_for_segment(Vec2::ZERO, Vec2::new(2.0, 0.0), 1.0),
            PI + 4.0,
            epsilon = 1e-12
        );
    }
}
