//! Typed handles into a space's arenas.

use super::arena::Index;

/// Identifies a body owned by a `Space`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) Index);

/// Identifies a shape owned by a `Space`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeHandle(pub(crate) Index);

/// Identifies a constraint owned by a `Space`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintHandle(pub(crate) Index);

/// Identifies a pooled arbiter. Only valid while the arbiter is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArbiterHandle(pub(crate) Index);
