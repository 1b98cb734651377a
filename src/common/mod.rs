pub mod arena;
pub mod handle;
pub mod material;

pub use arena::{Arena, Index};
pub use handle::{ArbiterHandle, BodyHandle, ConstraintHandle, ShapeHandle};
pub use material::Material;
