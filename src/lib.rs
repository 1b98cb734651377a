//! Fixed-timestep 2D rigid-body physics.
//!
//! A [`Space`] owns bodies, shapes and joints and advances them with
//! [`Space::step`]: bounding-volume broad phase, GJK/SAT narrow phase,
//! a sequential-impulse solver with warm starting, and island sleeping.

pub mod math;
pub mod objects;
pub mod constraints;
pub mod integration;
pub mod collision;
pub mod shapes;
pub mod world;
pub mod common;
pub mod error;

// Re-export key types for easier use
pub use math::{Transform, Vec2};
pub use objects::{BodyType, RigidBody};
pub use shapes::{Geometry, Shape, ShapeFilter, Circle, LineSegment, Polygon};
pub use shapes::mass::{moment_for_box, moment_for_circle, moment_for_polygon, moment_for_segment};
pub use constraints::{
    Constraint, DampedRotarySpring, DampedSpring, GearJoint, GrooveJoint, Joint, PinJoint,
    PivotJoint, RatchetJoint, RotaryLimitJoint, SimpleMotor, SlideJoint,
};
pub use collision::{Arbiter, ArbiterState, Contact, ContactPoint, AABB};
pub use world::{
    CollisionHandler, NarrowPhase, PointQueryInfo, PostStepQueue, SegmentQueryInfo,
    ShapeQueryInfo, Space, SpaceConfig,
};
pub use common::{ArbiterHandle, BodyHandle, ConstraintHandle, Material, ShapeHandle};
pub use error::{PhysicsError, Result};
