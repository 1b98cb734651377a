pub mod circle;
pub mod line_segment;
pub mod mass;
pub mod polygon;

pub use circle::Circle;
pub use line_segment::LineSegment;
pub use polygon::Polygon;

use crate::collision::AABB;
use crate::common::{BodyHandle, Material};
use crate::error::Result;
use crate::math::{Transform, Vec2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distances below this count as touching when picking a query gradient.
pub(crate) const MAGIC_EPSILON: f64 = 1e-5;

/// Geometry of a shape. The declaration order is the dispatch order of
/// the narrow phase: the lower kind is always collided as the first shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Circle(Circle),
    Segment(LineSegment),
    Polygon(Polygon),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeKind {
    Circle = 0,
    Segment = 1,
    Polygon = 2,
}

impl Geometry {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Geometry::Circle(_) => ShapeKind::Circle,
            Geometry::Segment(_) => ShapeKind::Segment,
            Geometry::Polygon(_) => ShapeKind::Polygon,
        }
    }

    /// Corner rounding of the geometry. A circle's radius is its size, so
    /// it counts here too.
    pub fn radius(&self) -> f64 {
        match self {
            Geometry::Circle(c) => c.radius,
            Geometry::Segment(s) => s.radius,
            Geometry::Polygon(p) => p.radius,
        }
    }
}

/// Collision filtering. Two shapes are rejected if they share a non-zero
/// `group`, or if either one's `categories` misses the other's `mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeFilter {
    pub group: u32,
    pub categories: u32,
    pub mask: u32,
}

impl ShapeFilter {
    /// Collides with everything.
    pub const ALL: ShapeFilter = ShapeFilter {
        group: 0,
        categories: u32::MAX,
        mask: u32::MAX,
    };
    /// Collides with nothing.
    pub const NONE: ShapeFilter = ShapeFilter {
        group: 0,
        categories: 0,
        mask: 0,
    };

    pub fn new(group: u32, categories: u32, mask: u32) -> Self {
        Self {
            group,
            categories,
            mask,
        }
    }

    pub fn reject(&self, other: &ShapeFilter) -> bool {
        (self.group != 0 && self.group == other.group)
            || (self.categories & other.mask) == 0
            || (other.categories & self.mask) == 0
    }
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self::ALL
    }
}

/// Nearest-point result for a single shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointQuery {
    /// Closest point on the shape's surface.
    pub point: Vec2,
    /// Signed distance to the surface, negative inside.
    pub distance: f64,
    /// Direction of increasing distance at the query point.
    pub gradient: Vec2,
}

/// Ray or swept-circle hit for a single shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentQuery {
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the query segment where the hit occurs.
    pub alpha: f64,
}

/// A collision shape attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub(crate) body: BodyHandle,
    pub geometry: Geometry,
    pub(crate) bb: AABB,
    pub material: Material,
    /// Tangential velocity of the surface, for conveyor belts.
    pub surface_velocity: Vec2,
    /// Sensors report collisions to handlers but never push back.
    pub sensor: bool,
    /// Tag used to look up collision handlers.
    pub collision_type: u32,
    pub filter: ShapeFilter,
    pub(crate) hash_id: u64,
}

impl Shape {
    pub fn new(body: BodyHandle, geometry: Geometry) -> Self {
        Shape {
            body,
            geometry,
            bb: AABB {
                min: Vec2::ZERO,
                max: Vec2::ZERO,
            },
            material: Material::default(),
            surface_velocity: Vec2::ZERO,
            sensor: false,
            collision_type: 0,
            filter: ShapeFilter::ALL,
            hash_id: 0,
        }
    }

    pub fn circle(body: BodyHandle, radius: f64, offset: Vec2) -> Result<Self> {
        Ok(Self::new(body, Geometry::Circle(Circle::new(radius, offset)?)))
    }

    pub fn segment(body: BodyHandle, a: Vec2, b: Vec2, radius: f64) -> Result<Self> {
        Ok(Self::new(
            body,
            Geometry::Segment(LineSegment::new(a, b, radius)?),
        ))
    }

    pub fn polygon(body: BodyHandle, vertices: Vec<Vec2>, radius: f64) -> Result<Self> {
        Ok(Self::new(
            body,
            Geometry::Polygon(Polygon::new(vertices, radius)?),
        ))
    }

    /// Box of `width` by `height` centered on the body origin.
    pub fn boxed(body: BodyHandle, width: f64, height: f64, radius: f64) -> Result<Self> {
        Ok(Self::new(
            body,
            Geometry::Polygon(Polygon::boxed(width, height, radius)?),
        ))
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.material.restitution = elasticity.clamp(0.0, 1.0);
        self
    }

    pub fn with_friction(mut self, friction: f64) -> Self {
        self.material.friction = friction.max(0.0);
        self
    }

    pub fn with_filter(mut self, filter: ShapeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_collision_type(mut self, collision_type: u32) -> Self {
        self.collision_type = collision_type;
        self
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// World bounding box as of the last update.
    pub fn bb(&self) -> AABB {
        self.bb
    }

    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    /// Stable id assigned when the shape joins a space; feeds contact hashes.
    pub fn hash_id(&self) -> u64 {
        self.hash_id
    }

    /// Recomputes world geometry and the bounding box from the body pose.
    pub fn update(&mut self, transform: Transform) -> AABB {
        self.bb = match &mut self.geometry {
            Geometry::Circle(c) => c.update(transform),
            Geometry::Segment(s) => s.update(transform),
            Geometry::Polygon(p) => p.update(transform),
        };
        self.bb
    }

    pub fn point_query(&self, p: Vec2) -> PointQuery {
        match &self.geometry {
            Geometry::Circle(c) => c.point_query(p),
            Geometry::Segment(s) => s.point_query(p),
            Geometry::Polygon(poly) => poly.point_query(p),
        }
    }

    /// Sweeps a circle of `radius` from `a` to `b` against the shape.
    pub fn segment_query(&self, a: Vec2, b: Vec2, radius: f64) -> Option<SegmentQuery> {
        match &self.geometry {
            Geometry::Circle(c) => c.segment_query(a, b, radius),
            Geometry::Segment(s) => s.segment_query(a, b, radius),
            Geometry::Polygon(poly) => poly.segment_query(a, b, radius),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Index;

    fn body() -> BodyHandle {
        let mut arena = crate::common::Arena::new();
        let index: Index = arena.insert(());
        BodyHandle(index)
    }

    #[test]
    fn test_filter_groups_and_masks() {
        let a = ShapeFilter::new(1, 0b01, u32::MAX);
        let same_group = ShapeFilter::new(1, 0b10, u32::MAX);
        assert!(a.reject(&same_group));

        let other_group = ShapeFilter::new(2, 0b10, 0b10);
        // `a`'s category is not in the other's mask.
        assert!(a.reject(&other_group));

        let open = ShapeFilter::new(2, 0b10, 0b01);
        assert!(!a.reject(&open));
        assert!(ShapeFilter::ALL.reject(&ShapeFilter::NONE));
        assert!(!ShapeFilter::ALL.reject(&ShapeFilter::ALL));
    }

    #[test]
    fn test_shape_kind_ordering() {
        assert!(ShapeKind::Circle < ShapeKind::Segment);
        assert!(ShapeKind::Segment < ShapeKind::Polygon);
        let s = Shape::boxed(body(), 1.0, 1.0, 0.0).unwrap();
        assert_eq!(s.kind(), ShapeKind::Polygon);
    }

    #[test]
    fn test_shape_update_caches_bb() {
        let mut s = Shape::circle(body(), 0.5, Vec2::ZERO)
            .unwrap()
            .with_friction(0.7)
            .with_collision_type(3);
        let bb = s.update(Transform::new(Vec2::new(2.0, 3.0), 0.0));
        assert_eq!(bb, s.bb());
        assert_eq!(bb.min, Vec2::new(1.5, 2.5));
        assert_eq!(s.collision_type, 3);
        assert_eq!(s.material.friction, 0.7);
    }
}
