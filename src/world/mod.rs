mod components;
pub mod config;
pub mod handlers;
mod queries;
mod space;

pub use config::{NarrowPhase, SpaceConfig};
pub use handlers::{CollisionHandler, FilterFn, NotifyFn, PostStepFn, PostStepQueue};
pub use queries::{PointQueryInfo, SegmentQueryInfo, ShapeQueryInfo};
pub use space::Space;
