pub mod aabb;
pub mod arbiter;
pub mod bb_tree;
pub mod detection;
mod gjk;
pub mod manifold;

pub use aabb::AABB;
pub use arbiter::{Arbiter, ArbiterState};
pub use bb_tree::BBTree;
pub use detection::{collide, NarrowPhase};
pub use manifold::{hash_pair, CollisionInfo, Contact, ContactPoint, MAX_CONTACTS_PER_ARBITER};
