//! Errors reported when building bodies, shapes, joints and spaces.

use thiserror::Error;

/// Configuration errors and handle misuse. Numerical trouble inside a
/// step is never reported through this type; the step degrades instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("polygon is not convex at vertex {0}")]
    NonConvexPolygon(usize),
    #[error("polygon edge starting at vertex {0} has zero length")]
    DegenerateEdge(usize),
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("radius must be finite and non-negative, got {0}")]
    InvalidRadius(f64),
    #[error("dynamic body mass must be finite and positive, got {0}")]
    InvalidMass(f64),
    #[error("dynamic body moment of inertia must be positive, got {0}")]
    InvalidMoment(f64),
    #[error("{0} handle is stale or was never added to this space")]
    StaleHandle(&'static str),
    #[error("the space's own static body cannot be removed")]
    StaticBodyRemoval,
    #[error("a constraint cannot connect a body to itself")]
    SelfConstraint,
    #[error("invalid joint parameter: {0}")]
    InvalidJoint(&'static str),
    #[error("invalid space configuration: {0}")]
    InvalidConfig(String),
    #[error("the space is locked; schedule this change with a post-step callback")]
    SpaceLocked,
}

pub type Result<T, E = PhysicsError> = std::result::Result<T, E>;
